//! Range/trend classifier
//!
//! Tests whether the most recent bar's midpoint sits inside the bodies of
//! recent bars. Run independently per timeframe with two parameterizations:
//! a shallow check on the higher timeframe and a deeper one on the entry
//! timeframe. Verdicts for different timeframes are never merged; the signal
//! composer picks the one matching its required timeframe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Candle, Symbol};

/// Midpoints are compared after rounding to this many decimal places
const MIDPOINT_DECIMALS: i32 = 5;

/// Body-to-span ratio at and above which a bar counts as a strong
/// directional (marubozu) candle
pub const MARUBOZU_BODY_RATIO: f64 = 0.8;

/// Lookback depth and containment-count threshold for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeParams {
    /// Previous bars tested for containment (excludes the current bar)
    pub lookback: usize,
    /// Ranging iff at least this many of them contain the midpoint
    pub containment: usize,
}

impl RangeParams {
    /// Shallow check used on the higher timeframe
    pub fn higher_timeframe() -> Self {
        Self {
            lookback: 4,
            containment: 2,
        }
    }

    /// Deeper check used on the entry timeframe
    pub fn lower_timeframe() -> Self {
        Self {
            lookback: 6,
            containment: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Ranging,
    Trending,
    #[serde(rename = "Insufficient Data")]
    InsufficientData,
}

/// Shape of the most recent bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleKind {
    Bullish,
    Bearish,
    Neutral,
}

/// Per-symbol classification result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRange {
    pub pair: Symbol,
    pub market_status: MarketStatus,
    pub midpoint: f64,
    pub candle_time: DateTime<Utc>,
    pub is_marubozu: bool,
    pub candle_type: CandleKind,
}

impl SymbolRange {
    /// Safe default used when the persisted verdict is missing or corrupt:
    /// assume ranging with no directional candle, which suppresses entries.
    pub fn assume_ranging(pair: Symbol, now: DateTime<Utc>) -> Self {
        Self {
            pair,
            market_status: MarketStatus::Ranging,
            midpoint: 0.0,
            candle_time: now,
            is_marubozu: false,
            candle_type: CandleKind::Neutral,
        }
    }

    /// Only a Trending verdict permits entries; insufficient data does not.
    pub fn permits_entries(&self) -> bool {
        self.market_status == MarketStatus::Trending
    }
}

/// Persisted multi-symbol verdict for one timeframe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeVerdict {
    pub timestamp: DateTime<Utc>,
    pub symbols: Vec<SymbolRange>,
}

impl RangeVerdict {
    pub fn for_symbol(&self, symbol: &Symbol) -> Option<&SymbolRange> {
        self.symbols.iter().find(|s| &s.pair == symbol)
    }
}

/// Classify one symbol's window. Returns `None` for an empty window.
///
/// With bars present but fewer than `lookback + 1`, the verdict is
/// `InsufficientData` rather than a default classification.
pub fn classify(symbol: &Symbol, candles: &[Candle], params: &RangeParams) -> Option<SymbolRange> {
    let current = candles.last()?;
    let midpoint = round_midpoint(current.midpoint());
    let (is_marubozu, candle_type) = candle_shape(current);

    if candles.len() < params.lookback + 1 {
        return Some(SymbolRange {
            pair: symbol.clone(),
            market_status: MarketStatus::InsufficientData,
            midpoint,
            candle_time: current.time,
            is_marubozu,
            candle_type,
        });
    }

    let previous = &candles[candles.len() - 1 - params.lookback..candles.len() - 1];
    let contained = previous
        .iter()
        .filter(|bar| bar.low <= midpoint && midpoint <= bar.high)
        .count();

    let market_status = if contained >= params.containment {
        MarketStatus::Ranging
    } else {
        MarketStatus::Trending
    };

    Some(SymbolRange {
        pair: symbol.clone(),
        market_status,
        midpoint,
        candle_time: current.time,
        is_marubozu,
        candle_type,
    })
}

/// Strong-directional-candle detection on the most recent bar
fn candle_shape(candle: &Candle) -> (bool, CandleKind) {
    let kind = if candle.close > candle.open {
        CandleKind::Bullish
    } else if candle.close < candle.open {
        CandleKind::Bearish
    } else {
        CandleKind::Neutral
    };

    let span = candle.span();
    let is_marubozu = span > 0.0 && candle.body() / span >= MARUBOZU_BODY_RATIO;
    (is_marubozu, kind)
}

fn round_midpoint(value: f64) -> f64 {
    let factor = 10f64.powi(MIDPOINT_DECIMALS);
    (value * factor).round() / factor
}
