//! Job orchestration
//!
//! Each periodic job owns one slice of the pipeline: zone recomputation,
//! the two regime classifiers, the full signal-and-entry evaluation, and the
//! trailing pass. Jobs are independent; they communicate only through the
//! document store, so a failed or stale job degrades the pipeline to its
//! safe defaults instead of breaking it. Unavailable market data is logged
//! and retried on the next cycle, never raised.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use tracing::{debug, info, warn};

use crate::broker::{MarketData, OrderService, Timeframe};
use crate::config::Config;
use crate::feed::VolatilityFeed;
use crate::regime::{self, ChoppyVerdict, RangeParams, RangeVerdict, SymbolRange};
use crate::risk::{realized_pl, RiskGate};
use crate::signal::{compose, SignalContext};
use crate::store::{keys, JsonStore};
use crate::zones::{build_zone_table, InstrumentClass, ZoneTable};
use crate::{trailing, Money, OrderRequest, OrderResult, Side};

pub struct Engine<'a, B> {
    cfg: &'a Config,
    store: &'a JsonStore,
    broker: &'a B,
    feed: VolatilityFeed,
}

impl<'a, B> Engine<'a, B>
where
    B: MarketData + OrderService,
{
    pub fn new(cfg: &'a Config, store: &'a JsonStore, broker: &'a B) -> Self {
        let feed = VolatilityFeed::new(&cfg.paths.volatility_feed);
        Self {
            cfg,
            store,
            broker,
            feed,
        }
    }

    fn risk_gate(&self) -> RiskGate<'a> {
        RiskGate::new(
            self.cfg.risk.clone(),
            self.cfg.windows.clone(),
            &self.cfg.paths.trading_calendar,
            self.store,
        )
    }

    /// Recompute and persist the zone table from the current price
    pub async fn zones_job(&self) -> Result<()> {
        let symbol = &self.cfg.trading.symbol;

        let tick = match self.broker.tick(symbol).await {
            Ok(tick) => tick,
            Err(e) => {
                warn!("Zone recompute skipped, no tick for {symbol}: {e}");
                return Ok(());
            }
        };
        let info = match self.broker.instrument_info(symbol).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Zone recompute skipped, no instrument info for {symbol}: {e}");
                return Ok(());
            }
        };

        let increment = self
            .cfg
            .trading
            .increment
            .unwrap_or_else(|| InstrumentClass::of(symbol).default_increment());

        let table = build_zone_table(
            symbol,
            tick.bid,
            increment,
            info.point,
            self.cfg.trading.band_points,
        );
        let written = self.store.put(keys::ZONES, &table)?;
        info!(
            "Zone table for {symbol} regenerated around {} ({})",
            table.reference_price,
            if written { "updated" } else { "unchanged" }
        );
        Ok(())
    }

    /// Run the choppiness classifier and persist its verdict
    pub async fn choppy_job(&self) -> Result<()> {
        let symbol = &self.cfg.trading.symbol;
        let window = self.cfg.choppy.window;

        let candles = match self
            .broker
            .recent_bars(symbol, Timeframe::M5, window)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Choppiness check skipped, no bars for {symbol}: {e}");
                return Ok(());
            }
        };
        let point = match self.broker.instrument_info(symbol).await {
            Ok(info) => info.point,
            Err(e) => {
                warn!("Choppiness check skipped, no instrument info: {e}");
                return Ok(());
            }
        };

        let verdict = regime::choppy::classify(&candles, point, &self.cfg.choppy, Utc::now());
        info!(
            "Market condition: {:?} (ATR {} pts, {} dojis, range {} pts)",
            verdict.market_condition,
            verdict.avg_atr_points,
            verdict.num_dojis,
            verdict.price_range_points
        );
        self.store.put(keys::CHOPPY, &verdict)?;
        Ok(())
    }

    /// Run the higher-timeframe range classifier and persist its verdict
    pub async fn range_job(&self) -> Result<()> {
        let symbol = &self.cfg.trading.symbol;
        let params = RangeParams::higher_timeframe();

        let candles = match self
            .broker
            .recent_bars(symbol, Timeframe::H4, params.lookback + 1)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Range check skipped, no bars for {symbol}: {e}");
                return Ok(());
            }
        };

        let Some(entry) = regime::range::classify(symbol, &candles, &params) else {
            warn!("Range check skipped, empty window for {symbol}");
            return Ok(());
        };
        info!(
            "{symbol} on H4: {:?} (midpoint {})",
            entry.market_status, entry.midpoint
        );

        let verdict = RangeVerdict {
            timestamp: Utc::now(),
            symbols: vec![entry],
        };
        self.store.put(keys::RANGE_HIGHER, &verdict)?;
        Ok(())
    }

    /// The full entry evaluation at the current wall-clock time
    pub async fn signal_job(&self) -> Result<()> {
        self.signal_job_at(Local::now()).await
    }

    /// Entry evaluation for an explicit local timestamp.
    ///
    /// Control flow per cycle: risk gate first (cheap, short-circuits),
    /// then persisted regime verdicts, then the zone lookup and signal
    /// composition, and finally order placement.
    pub async fn signal_job_at(&self, now_local: DateTime<Local>) -> Result<()> {
        let symbol = &self.cfg.trading.symbol;

        // Risk gate: realized P/L is re-derived from deal history each
        // cycle; only the high-water mark is cached.
        let daily_pl = self.daily_pl(now_local).await;
        let gate = self.risk_gate();
        if let Err(block) = gate.evaluate(now_local.date_naive(), now_local.time(), daily_pl) {
            info!("{block}");
            return Ok(());
        }
        info!("Daily P/L: {daily_pl}");

        // Choppiness: missing or corrupt verdict defaults to choppy
        let choppy: ChoppyVerdict = self
            .store
            .get(keys::CHOPPY)
            .unwrap_or_else(|| ChoppyVerdict::assume_choppy(Utc::now(), &self.cfg.choppy));
        if choppy.blocks_entries() {
            info!(
                "Market choppy (as of {}), no trades placed",
                choppy.timestamp
            );
            return Ok(());
        }

        let candles = match self
            .broker
            .recent_bars(symbol, Timeframe::M2, self.cfg.signal.candle_count)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Signal evaluation skipped, no bars for {symbol}: {e}");
                return Ok(());
            }
        };

        // Entry-timeframe range classification over the same window,
        // persisted for observability
        let lower_tf = regime::range::classify(symbol, &candles, &RangeParams::lower_timeframe());
        if let Some(entry) = &lower_tf {
            let verdict = RangeVerdict {
                timestamp: Utc::now(),
                symbols: vec![entry.clone()],
            };
            if let Err(e) = self.store.put(keys::RANGE_LOWER, &verdict) {
                warn!("Failed to persist entry-timeframe verdict: {e}");
            }
        }

        let zones: Option<ZoneTable> = self.store.get(keys::ZONES);
        let higher_tf = self
            .store
            .get::<RangeVerdict>(keys::RANGE_HIGHER)
            .and_then(|v| v.for_symbol(symbol).cloned())
            .unwrap_or_else(|| {
                debug!("No higher-timeframe verdict, assuming ranging");
                SymbolRange::assume_ranging(symbol.clone(), Utc::now())
            });

        let ctx = SignalContext {
            candles: &candles,
            zones: zones.as_ref(),
            lower_tf: lower_tf.as_ref(),
            higher_tf: &higher_tf,
            volatility: self.feed.read(),
        };

        let signal = compose(symbol, &ctx, &self.cfg.signal, Utc::now());
        if let Some(side) = signal.direction {
            self.place_entry(side, ctx.volatility).await;
        }
        Ok(())
    }

    /// Place the market order for a surviving signal, with the initial stop
    /// at the configured multiple of the volatility estimate.
    async fn place_entry(&self, side: Side, volatility: f64) {
        let symbol = &self.cfg.trading.symbol;

        let tick = match self.broker.tick(symbol).await {
            Ok(tick) => tick,
            Err(e) => {
                warn!("Entry skipped, no tick for {symbol}: {e}");
                return;
            }
        };

        let stop_distance = self.cfg.trading.entry_stop_multiple * volatility;
        let (price, stop_loss) = match side {
            Side::Buy => (tick.ask, tick.ask - stop_distance),
            Side::Sell => (tick.bid, tick.bid + stop_distance),
        };

        let request = OrderRequest {
            symbol: symbol.clone(),
            side,
            volume: self.cfg.trading.volume,
            price,
            stop_loss: Some(stop_loss),
            take_profit: None,
            comment: "gold-engine open".to_string(),
        };

        match self.broker.place_market_order(&request).await {
            Ok(OrderResult::Accepted { ticket }) => {
                info!("{side} {symbol}: opened position {ticket} at {price}, SL {stop_loss}");
            }
            Ok(OrderResult::Rejected { code, message }) => {
                warn!(
                    "Order rejected (code {code}, {message}): {}",
                    serde_json::to_string(&request).unwrap_or_default()
                );
            }
            Err(e) => warn!("Order placement failed for {symbol}: {e}"),
        }
    }

    /// One trailing-stop pass over all open positions
    pub async fn trailing_job(&self) -> Result<()> {
        if let Err(e) =
            trailing::run_pass(self.broker, self.store, self.feed.read(), &self.cfg.trailing).await
        {
            warn!("Trailing pass failed: {e}");
        }
        Ok(())
    }

    /// External midnight reset of the drawdown high-water mark
    pub fn midnight_reset(&self, now_local: DateTime<Local>) {
        self.risk_gate().reset_at_midnight(now_local.date_naive());
    }

    /// Realized P/L since local midnight, zero when history is unavailable
    async fn daily_pl(&self, now_local: DateTime<Local>) -> Money {
        let midnight = now_local
            .date_naive()
            .and_time(chrono::NaiveTime::MIN)
            .and_local_timezone(Local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| now_local.with_timezone(&Utc));

        match self.broker.closed_deals_since(midnight).await {
            Ok(deals) => realized_pl(&deals),
            Err(e) => {
                warn!("Deal history unavailable ({e}), assuming zero P/L");
                Money::ZERO
            }
        }
    }
}
