//! Signal composer
//!
//! Merges the EMA-crossover direction, zone tradability, both range/trend
//! verdicts, and the strong-candle flag into a single directional decision
//! per evaluation cycle. Every gate here fails toward "no trade": a missing
//! zone table, a ranging or unknown regime, or an unavailable volatility
//! feed all resolve to a None signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::indicators::ema;
use crate::regime::{CandleKind, SymbolRange};
use crate::zones::ZoneTable;
use crate::{Candle, Side, Symbol, TradeSignal};

/// Composer parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    /// Entry-timeframe candles fetched per evaluation
    pub candle_count: usize,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            ema_fast: 2,
            ema_slow: 10,
            candle_count: 50,
        }
    }
}

/// Everything the composer consumes for one instrument on one cycle
pub struct SignalContext<'a> {
    /// Entry-timeframe window, most-recent-last
    pub candles: &'a [Candle],
    /// Latest persisted zone table, if any
    pub zones: Option<&'a ZoneTable>,
    /// Entry-timeframe range classification for this same window
    pub lower_tf: Option<&'a SymbolRange>,
    /// Latest persisted higher-timeframe verdict (or its safe default)
    pub higher_tf: &'a SymbolRange,
    /// Externally supplied volatility estimate; exactly 0.0 means
    /// unavailable and suppresses all signals
    pub volatility: f64,
}

/// Detect a crossover event on the most recent bar.
///
/// The bullish state is 1.0 while the fast EMA is strictly above the slow
/// one; a +1 state change between the previous and current bar is a bullish
/// crossover, -1 a bearish one. No event on any other difference.
pub fn crossover(closes: &[f64], fast_span: usize, slow_span: usize) -> Option<Side> {
    if closes.len() < 2 {
        return None;
    }

    let fast = ema(closes, fast_span);
    let slow = ema(closes, slow_span);

    let state = |i: usize| -> f64 {
        if fast[i] > slow[i] {
            1.0
        } else {
            0.0
        }
    };

    let last = closes.len() - 1;
    match state(last) - state(last - 1) {
        d if d == 1.0 => Some(Side::Buy),
        d if d == -1.0 => Some(Side::Sell),
        _ => None,
    }
}

/// Compose the final trade signal for one instrument.
pub fn compose(
    symbol: &Symbol,
    ctx: &SignalContext<'_>,
    params: &SignalParams,
    now: DateTime<Utc>,
) -> TradeSignal {
    let none = || TradeSignal::none(symbol.clone(), now);

    // Missing volatility is a global circuit breaker for the cycle
    if ctx.volatility == 0.0 {
        info!("Volatility feed unavailable, suppressing all signals for {symbol}");
        return none();
    }

    let Some(current) = ctx.candles.last() else {
        debug!("No candles for {symbol}, no signal");
        return none();
    };
    let current_price = current.close;

    // Zone tradability: no table means no known-tradable region
    let tradable = match ctx.zones {
        Some(table) => {
            if let Some(zone) = table.find_blocking_zone(current_price) {
                info!(
                    "{symbol}: price {current_price} inside untradable band of {}",
                    zone.label
                );
                false
            } else {
                true
            }
        }
        None => {
            debug!("No zone table for {symbol}, treating price as untradable");
            false
        }
    };
    if !tradable {
        return none();
    }

    // Entry-timeframe regime must be affirmatively non-ranging
    let lower_trending = ctx
        .lower_tf
        .map(|r| r.market_status == crate::regime::MarketStatus::Trending)
        .unwrap_or(false);
    if !lower_trending {
        debug!("{symbol}: entry timeframe not trending, no signal");
        return none();
    }

    let Some(raw) = crossover(
        &ctx.candles.iter().map(|c| c.close).collect::<Vec<_>>(),
        params.ema_fast,
        params.ema_slow,
    ) else {
        debug!("{symbol}: no crossover event this cycle");
        return none();
    };

    // Higher-timeframe filter: trending verdict, strong candle, direction
    // agreement. The verdict may be stale; its timestamp travels to the log.
    let higher = ctx.higher_tf;
    if !higher.permits_entries() || !higher.is_marubozu {
        info!(
            "{symbol}: raw {raw} dropped (higher TF status {:?} as of {}, marubozu {})",
            higher.market_status, higher.candle_time, higher.is_marubozu
        );
        return none();
    }

    let direction_matches = matches!(
        (raw, higher.candle_type),
        (Side::Buy, CandleKind::Bullish) | (Side::Sell, CandleKind::Bearish)
    );
    if !direction_matches {
        info!(
            "{symbol}: raw {raw} dropped, candle type {:?} disagrees",
            higher.candle_type
        );
        return none();
    }

    info!("{symbol}: {raw} signal at {current_price}");
    TradeSignal {
        symbol: symbol.clone(),
        direction: Some(raw),
        time: now,
    }
}
