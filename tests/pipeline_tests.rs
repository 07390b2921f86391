//! Integration tests for the decision pipeline
//!
//! Drives the engine end-to-end against a mock broker: zone generation,
//! the full signal evaluation (risk gate through order placement), and the
//! trailing-stop passes.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use gold_engine::broker::{BrokerError, MarketData, OrderService, Timeframe};
use gold_engine::calendar::TradingCalendar;
use gold_engine::engine::Engine;
use gold_engine::regime::{
    CandleKind, ChoppyParams, ChoppyVerdict, MarketCondition, MarketStatus, RangeVerdict,
    SymbolRange,
};
use gold_engine::risk::DailyRiskState;
use gold_engine::store::{keys, JsonStore};
use gold_engine::trailing::{self, TrailMode, TrailState, TrailingConfig};
use gold_engine::zones::{build_zone_table, DEFAULT_BAND_POINTS};
use gold_engine::{
    Candle, Config, Deal, DealEntry, InstrumentInfo, Money, OrderRequest, OrderResult, Position,
    Side, Symbol, Tick, Ticket,
};

// =============================================================================
// Test utilities
// =============================================================================

fn sym() -> Symbol {
    Symbol::new("XAUUSD")
}

fn utc_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 6, 7, 30, 0).unwrap()
}

/// Wednesday morning inside the 10-12 trading window
fn cycle_time() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 8, 6, 10, 30, 0).unwrap()
}

fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            time: utc_now() + chrono::Duration::minutes(2 * i as i64),
            open: close - 0.2,
            high: close + 0.5,
            low: close - 0.7,
            close,
        })
        .collect()
}

/// Entry-timeframe window producing a bullish crossover on the last bar,
/// closing at a price outside every zone band
fn bullish_entry_window() -> Vec<Candle> {
    let mut closes = vec![3500.0; 20];
    closes.push(3506.0);
    candles_from_closes(&closes)
}

#[derive(Default)]
struct MockBroker {
    bars: HashMap<&'static str, Vec<Candle>>,
    tick: Option<Tick>,
    point: f64,
    positions: Mutex<Vec<Position>>,
    deals: Vec<Deal>,
    reject_modifications: bool,
    placed: Mutex<Vec<OrderRequest>>,
    modifications: Mutex<Vec<(Ticket, f64)>>,
}

impl MockBroker {
    fn new() -> Self {
        Self {
            point: 0.01,
            ..Default::default()
        }
    }

    fn with_bars(mut self, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.bars.insert(timeframe.as_str(), candles);
        self
    }

    fn with_tick(mut self, bid: f64, ask: f64) -> Self {
        self.tick = Some(Tick { bid, ask });
        self
    }

    fn with_position(self, position: Position) -> Self {
        self.positions.lock().unwrap().push(position);
        self
    }

    fn with_deals(mut self, deals: Vec<Deal>) -> Self {
        self.deals = deals;
        self
    }

    fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    fn stop_modifications(&self) -> Vec<(Ticket, f64)> {
        self.modifications.lock().unwrap().clone()
    }
}

impl MarketData for MockBroker {
    async fn recent_bars(
        &self,
        _symbol: &Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let candles = self
            .bars
            .get(timeframe.as_str())
            .cloned()
            .ok_or_else(|| BrokerError::Unavailable(format!("bars {timeframe}")))?;
        let start = candles.len().saturating_sub(count);
        Ok(candles[start..].to_vec())
    }

    async fn tick(&self, symbol: &Symbol) -> Result<Tick, BrokerError> {
        self.tick
            .ok_or_else(|| BrokerError::Unavailable(format!("tick for {symbol}")))
    }

    async fn instrument_info(&self, _symbol: &Symbol) -> Result<InstrumentInfo, BrokerError> {
        Ok(InstrumentInfo { point: self.point })
    }
}

impl OrderService for MockBroker {
    async fn place_market_order(
        &self,
        request: &OrderRequest,
    ) -> Result<OrderResult, BrokerError> {
        self.placed.lock().unwrap().push(request.clone());
        Ok(OrderResult::Accepted { ticket: 9001 })
    }

    async fn modify_stop_loss(
        &self,
        ticket: Ticket,
        stop_loss: f64,
    ) -> Result<OrderResult, BrokerError> {
        if self.reject_modifications {
            return Ok(OrderResult::Rejected {
                code: 10016,
                message: "invalid stops".to_string(),
            });
        }
        self.modifications.lock().unwrap().push((ticket, stop_loss));
        let mut positions = self.positions.lock().unwrap();
        if let Some(position) = positions.iter_mut().find(|p| p.ticket == ticket) {
            position.sl = stop_loss;
        }
        Ok(OrderResult::Accepted { ticket })
    }

    async fn open_positions(&self) -> Result<Vec<Position>, BrokerError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn closed_deals_since(&self, _since: DateTime<Utc>) -> Result<Vec<Deal>, BrokerError> {
        Ok(self.deals.clone())
    }
}

/// Config, store, calendar, and feed files rooted in one temp directory
struct Fixture {
    _dir: tempfile::TempDir,
    config: Config,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.state_dir = dir.path().join("state").to_string_lossy().into_owned();
        config.paths.trading_calendar = dir
            .path()
            .join("trading_schedule.json")
            .to_string_lossy()
            .into_owned();
        config.paths.volatility_feed = dir
            .path()
            .join("atr_data.json")
            .to_string_lossy()
            .into_owned();

        // Every August 2025 date is a trading day
        let mut schedule = HashMap::new();
        for day in 1..=31 {
            schedule.insert(
                NaiveDate::from_ymd_opt(2025, 8, day).unwrap(),
                TradingCalendar::TRADING_DAY.to_string(),
            );
        }
        let calendar = TradingCalendar {
            schedule,
            start_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 8, 31).unwrap(),
        };
        std::fs::write(
            &config.paths.trading_calendar,
            serde_json::to_string_pretty(&calendar).unwrap(),
        )
        .unwrap();

        std::fs::write(&config.paths.volatility_feed, r#"{"atr_value": 2.85}"#).unwrap();

        Fixture { _dir: dir, config }
    }

    fn store(&self) -> JsonStore {
        JsonStore::open(&self.config.paths.state_dir).unwrap()
    }

    /// Seed the store with a pipeline state that permits entries: trending
    /// (non-choppy) market, trending higher timeframe with a strong bullish
    /// candle, and a fresh zone table around 3500.
    fn seed_open_pipeline(&self, store: &JsonStore) {
        let choppy = ChoppyVerdict {
            timestamp: utc_now(),
            is_choppy: false,
            market_condition: MarketCondition::TrendingVolatile,
            avg_atr_points: 280.0,
            num_dojis: 1,
            price_range_points: 620.0,
            thresholds: ChoppyParams::default(),
        };
        store.put(keys::CHOPPY, &choppy).unwrap();

        let higher = RangeVerdict {
            timestamp: utc_now(),
            symbols: vec![SymbolRange {
                pair: sym(),
                market_status: MarketStatus::Trending,
                midpoint: 3500.0,
                candle_time: utc_now(),
                is_marubozu: true,
                candle_type: CandleKind::Bullish,
            }],
        };
        store.put(keys::RANGE_HIGHER, &higher).unwrap();

        let zones = build_zone_table(&sym(), 3500.0, 100.0, 0.01, DEFAULT_BAND_POINTS);
        store.put(keys::ZONES, &zones).unwrap();
    }
}

// =============================================================================
// Zone generation
// =============================================================================

#[tokio::test]
async fn test_zones_job_persists_table() {
    let fixture = Fixture::new();
    let store = fixture.store();
    let broker = MockBroker::new().with_tick(3500.0, 3500.3);

    let engine = Engine::new(&fixture.config, &store, &broker);
    engine.zones_job().await.unwrap();

    let table: gold_engine::zones::ZoneTable = store.get(keys::ZONES).unwrap();
    assert_eq!(table.zones.len(), 17);
    assert_eq!(table.reference_price, 3500.0);

    // MP3/MP1/MP2 land at 3400/3500/3600 for increment 100
    assert_eq!(table.zones[0].undershoot, 3397.5);
    assert_eq!(table.zones[8].overshoot, 3502.5);
    assert_eq!(table.zones[16].undershoot, 3597.5);

    // bands are symmetric and non-overlapping
    for zone in &table.zones {
        let mid = (zone.overshoot + zone.undershoot) / 2.0;
        assert!((zone.upper_limit - mid - (mid - zone.lower_limit)).abs() < 1e-9);
    }
    for pair in table.zones.windows(2) {
        assert!(pair[0].upper_limit < pair[1].lower_limit);
    }
}

// =============================================================================
// Signal evaluation end-to-end
// =============================================================================

#[tokio::test]
async fn test_signal_job_places_buy_order() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture.seed_open_pipeline(&store);

    let broker = MockBroker::new()
        .with_bars(Timeframe::M2, bullish_entry_window())
        .with_tick(3506.0, 3506.3);

    let engine = Engine::new(&fixture.config, &store, &broker);
    engine.signal_job_at(cycle_time()).await.unwrap();

    let placed = broker.placed_orders();
    assert_eq!(placed.len(), 1);
    let order = &placed[0];
    assert_eq!(order.side, Side::Buy);
    assert_eq!(order.volume, 0.04);
    assert_eq!(order.price, 3506.3);
    // initial stop sits 2 x volatility below the ask
    let sl = order.stop_loss.unwrap();
    assert!((sl - (3506.3 - 2.0 * 2.85)).abs() < 1e-9);
}

#[tokio::test]
async fn test_choppy_market_blocks_entries() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture.seed_open_pipeline(&store);

    // Overwrite with a choppy verdict
    let choppy = ChoppyVerdict {
        timestamp: utc_now(),
        is_choppy: true,
        market_condition: MarketCondition::Choppy,
        avg_atr_points: 80.0,
        num_dojis: 6,
        price_range_points: 150.0,
        thresholds: ChoppyParams::default(),
    };
    store.put(keys::CHOPPY, &choppy).unwrap();

    let broker = MockBroker::new()
        .with_bars(Timeframe::M2, bullish_entry_window())
        .with_tick(3506.0, 3506.3);

    let engine = Engine::new(&fixture.config, &store, &broker);
    engine.signal_job_at(cycle_time()).await.unwrap();
    assert!(broker.placed_orders().is_empty());
}

#[tokio::test]
async fn test_missing_choppy_verdict_defaults_to_choppy() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture.seed_open_pipeline(&store);
    store.remove(keys::CHOPPY);

    let broker = MockBroker::new()
        .with_bars(Timeframe::M2, bullish_entry_window())
        .with_tick(3506.0, 3506.3);

    let engine = Engine::new(&fixture.config, &store, &broker);
    engine.signal_job_at(cycle_time()).await.unwrap();
    assert!(broker.placed_orders().is_empty());
}

#[tokio::test]
async fn test_drawdown_pause_blocks_entries() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture.seed_open_pipeline(&store);

    // The day peaked at +50; P/L has since fallen to -5 with the default
    // -11 drawdown limit
    store
        .put(
            keys::RISK_STATE,
            &DailyRiskState {
                last_date: Some(NaiveDate::from_ymd_opt(2025, 8, 6).unwrap()),
                max_daily_pl: Money::from_f64(50.0),
            },
        )
        .unwrap();

    let losing_deal = Deal {
        ticket: 2,
        position_id: 1,
        symbol: sym(),
        side: Side::Sell,
        entry: DealEntry::Out,
        volume: 0.04,
        price: 3495.0,
        profit: Money::from_f64(-5.0),
        time: utc_now(),
    };

    let broker = MockBroker::new()
        .with_bars(Timeframe::M2, bullish_entry_window())
        .with_tick(3506.0, 3506.3)
        .with_deals(vec![losing_deal]);

    let engine = Engine::new(&fixture.config, &store, &broker);
    engine.signal_job_at(cycle_time()).await.unwrap();
    assert!(broker.placed_orders().is_empty());
}

#[tokio::test]
async fn test_weekend_blocks_entries() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture.seed_open_pipeline(&store);

    let broker = MockBroker::new()
        .with_bars(Timeframe::M2, bullish_entry_window())
        .with_tick(3506.0, 3506.3);

    let engine = Engine::new(&fixture.config, &store, &broker);
    // Saturday 2025-08-09
    let saturday = Local.with_ymd_and_hms(2025, 8, 9, 10, 30, 0).unwrap();
    engine.signal_job_at(saturday).await.unwrap();
    assert!(broker.placed_orders().is_empty());
}

#[tokio::test]
async fn test_unavailable_volatility_feed_blocks_entries() {
    let fixture = Fixture::new();
    let store = fixture.store();
    fixture.seed_open_pipeline(&store);
    std::fs::write(&fixture.config.paths.volatility_feed, r#"{"atr_value": 0.0}"#).unwrap();

    let broker = MockBroker::new()
        .with_bars(Timeframe::M2, bullish_entry_window())
        .with_tick(3506.0, 3506.3);

    let engine = Engine::new(&fixture.config, &store, &broker);
    engine.signal_job_at(cycle_time()).await.unwrap();
    assert!(broker.placed_orders().is_empty());
}

// =============================================================================
// Classifier jobs
// =============================================================================

#[tokio::test]
async fn test_choppy_job_writes_verdict() {
    let fixture = Fixture::new();
    let store = fixture.store();

    // Ten flat bars: unambiguously choppy
    let flat = candles_from_closes(&[3500.0; 10]);
    let broker = MockBroker::new().with_bars(Timeframe::M5, flat);

    let engine = Engine::new(&fixture.config, &store, &broker);
    engine.choppy_job().await.unwrap();

    let verdict: ChoppyVerdict = store.get(keys::CHOPPY).unwrap();
    assert_eq!(verdict.market_condition, MarketCondition::Choppy);
    assert!(verdict.is_choppy);
}

#[tokio::test]
async fn test_range_job_writes_verdict() {
    let fixture = Fixture::new();
    let store = fixture.store();

    // Current midpoint inside every previous bar's body: ranging
    let h4 = candles_from_closes(&[3500.0; 5]);
    let broker = MockBroker::new().with_bars(Timeframe::H4, h4);

    let engine = Engine::new(&fixture.config, &store, &broker);
    engine.range_job().await.unwrap();

    let verdict: RangeVerdict = store.get(keys::RANGE_HIGHER).unwrap();
    let entry = verdict.for_symbol(&sym()).unwrap();
    assert_eq!(entry.market_status, MarketStatus::Ranging);
}

// =============================================================================
// Trailing passes
// =============================================================================

fn ladder_config() -> TrailingConfig {
    TrailingConfig {
        mode: TrailMode::PhaseLadder,
        ..Default::default()
    }
}

fn buy_position(ticket: Ticket, open: f64, current: f64, sl: f64) -> Position {
    Position {
        ticket,
        symbol: sym(),
        side: Side::Buy,
        volume: 0.04,
        price_open: open,
        price_current: current,
        sl,
        tp: 0.0,
    }
}

#[tokio::test]
async fn test_ladder_never_advances_below_threshold() {
    let fixture = Fixture::new();
    let store = fixture.store();

    // distance from stop is 100 points, below phase 0's 140-point trigger
    let broker = MockBroker::new().with_position(buy_position(1, 3500.0, 3501.0, 3500.0));

    trailing::run_pass(&broker, &store, 2.85, &ladder_config())
        .await
        .unwrap();

    assert!(broker.stop_modifications().is_empty());
    let state: TrailState = store.get(keys::TRAIL_STATE).unwrap();
    assert_eq!(state.positions.get("1").unwrap().phase, -1);
}

#[tokio::test]
async fn test_ladder_advances_exactly_one_phase() {
    let fixture = Fixture::new();
    let store = fixture.store();

    // 150 points from the stop: phase 0 triggers, stop advances by exactly
    // phase 0's 105-point trail amount
    let broker = MockBroker::new().with_position(buy_position(1, 3500.0, 3501.5, 3500.0));

    trailing::run_pass(&broker, &store, 2.85, &ladder_config())
        .await
        .unwrap();

    let mods = broker.stop_modifications();
    assert_eq!(mods.len(), 1);
    assert_eq!(mods[0].0, 1);
    assert!((mods[0].1 - 3501.05).abs() < 1e-9);

    let state: TrailState = store.get(keys::TRAIL_STATE).unwrap();
    assert_eq!(state.positions.get("1").unwrap().phase, 0);

    // Second pass: the advanced stop is now 45 points from the price,
    // below phase 1's 50-point trigger, so the phase holds
    trailing::run_pass(&broker, &store, 2.85, &ladder_config())
        .await
        .unwrap();
    assert_eq!(broker.stop_modifications().len(), 1);
    let state: TrailState = store.get(keys::TRAIL_STATE).unwrap();
    assert_eq!(state.positions.get("1").unwrap().phase, 0);
}

#[tokio::test]
async fn test_ladder_rejected_modification_keeps_phase() {
    let fixture = Fixture::new();
    let store = fixture.store();

    let mut broker = MockBroker::new().with_position(buy_position(1, 3500.0, 3501.5, 3500.0));
    broker.reject_modifications = true;

    trailing::run_pass(&broker, &store, 2.85, &ladder_config())
        .await
        .unwrap();

    // phase does not advance on rejection; the next pass retries naturally
    let state: TrailState = store.get(keys::TRAIL_STATE).unwrap();
    assert_eq!(state.positions.get("1").unwrap().phase, -1);
}

#[tokio::test]
async fn test_volatility_trail_captures_baseline_and_tightens() {
    let fixture = Fixture::new();
    let store = fixture.store();

    // Buy from 3500 with initial stop 3496: captured baseline is 2.0.
    // Bid 3503 puts profit at 1.5 units: candidate = bid - 2 x baseline
    let broker = MockBroker::new()
        .with_position(buy_position(1, 3500.0, 3503.0, 3496.0))
        .with_tick(3503.0, 3503.3);

    let cfg = TrailingConfig::default();
    trailing::run_pass(&broker, &store, 2.85, &cfg).await.unwrap();

    let mods = broker.stop_modifications();
    assert_eq!(mods.len(), 1);
    assert!((mods[0].1 - 3499.0).abs() < 1e-9);

    let state: TrailState = store.get(keys::TRAIL_STATE).unwrap();
    assert_eq!(
        state.positions.get("1").unwrap().original_volatility,
        Some(2.0)
    );
}

#[tokio::test]
async fn test_volatility_trail_skips_without_feed() {
    let fixture = Fixture::new();
    let store = fixture.store();

    let broker = MockBroker::new()
        .with_position(buy_position(1, 3500.0, 3503.0, 3496.0))
        .with_tick(3503.0, 3503.3);

    trailing::run_pass(&broker, &store, 0.0, &TrailingConfig::default())
        .await
        .unwrap();
    assert!(broker.stop_modifications().is_empty());
}

#[tokio::test]
async fn test_trail_state_pruned_after_close() {
    let fixture = Fixture::new();
    let store = fixture.store();

    // Seed state for two positions, but only ticket 1 is still open
    let mut state = TrailState::default();
    state.positions.insert(
        "1".to_string(),
        gold_engine::trailing::PositionTrail {
            original_volatility: Some(2.0),
            phase: -1,
        },
    );
    state.positions.insert(
        "2".to_string(),
        gold_engine::trailing::PositionTrail {
            original_volatility: Some(1.5),
            phase: 4,
        },
    );
    store.put(keys::TRAIL_STATE, &state).unwrap();

    let broker = MockBroker::new()
        .with_position(buy_position(1, 3500.0, 3499.0, 3496.0))
        .with_tick(3499.0, 3499.3);

    trailing::run_pass(&broker, &store, 2.85, &TrailingConfig::default())
        .await
        .unwrap();

    let state: TrailState = store.get(keys::TRAIL_STATE).unwrap();
    assert!(state.positions.contains_key("1"));
    assert!(!state.positions.contains_key("2"));
}
