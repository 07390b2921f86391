//! Choppiness classifier
//!
//! Flags a low-volatility, doji-heavy, tight-range market over the most
//! recent candle window. All thresholds are expressed in instrument points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicators::{avg_true_range_points, price_range_points};
use crate::Candle;

/// Classifier thresholds, all in instrument points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoppyParams {
    /// Number of most-recent candles analysed
    pub window: usize,
    /// Average true range must stay strictly below this
    pub atr_threshold: f64,
    /// At least this many doji candles required
    pub doji_count_threshold: usize,
    /// Window high-low span must stay strictly below this
    pub range_threshold: f64,
    /// A candle body below this many points counts as a doji
    pub doji_body_threshold: f64,
}

impl Default for ChoppyParams {
    fn default() -> Self {
        Self {
            window: 10,
            atr_threshold: 200.0,
            doji_count_threshold: 3,
            range_threshold: 500.0,
            doji_body_threshold: 50.0,
        }
    }
}

/// Classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketCondition {
    Choppy,
    #[serde(rename = "Trending/Volatile")]
    TrendingVolatile,
    #[serde(rename = "Insufficient Data")]
    InsufficientData,
}

/// Persisted classifier verdict with its supporting metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoppyVerdict {
    pub timestamp: DateTime<Utc>,
    pub is_choppy: bool,
    pub market_condition: MarketCondition,
    pub avg_atr_points: f64,
    pub num_dojis: usize,
    pub price_range_points: f64,
    pub thresholds: ChoppyParams,
}

impl ChoppyVerdict {
    /// Safe default used when the persisted verdict is missing or corrupt:
    /// assume choppy so no entries fire.
    pub fn assume_choppy(now: DateTime<Utc>, params: &ChoppyParams) -> Self {
        Self {
            timestamp: now,
            is_choppy: true,
            market_condition: MarketCondition::Choppy,
            avg_atr_points: 0.0,
            num_dojis: 0,
            price_range_points: 0.0,
            thresholds: params.clone(),
        }
    }

    /// Entries are blocked only by a positive Choppy verdict; an
    /// insufficient-data verdict is propagated, not treated as choppy.
    pub fn blocks_entries(&self) -> bool {
        self.market_condition == MarketCondition::Choppy
    }
}

/// Classify the window.
///
/// Fails closed on short windows: fewer than `params.window` bars yields an
/// `InsufficientData` verdict (never Choppy) with zeroed metrics.
pub fn classify(
    candles: &[Candle],
    point: f64,
    params: &ChoppyParams,
    now: DateTime<Utc>,
) -> ChoppyVerdict {
    if candles.len() < params.window {
        return ChoppyVerdict {
            timestamp: now,
            is_choppy: false,
            market_condition: MarketCondition::InsufficientData,
            avg_atr_points: 0.0,
            num_dojis: 0,
            price_range_points: 0.0,
            thresholds: params.clone(),
        };
    }

    let recent = &candles[candles.len() - params.window..];

    let avg_atr = avg_true_range_points(recent, point);
    let num_dojis = recent
        .iter()
        .filter(|c| c.body() / point < params.doji_body_threshold)
        .count();
    let range = price_range_points(recent, point);

    // All three must hold, each with strict inequality at the threshold
    let is_low_vol = avg_atr < params.atr_threshold;
    let is_many_dojis = num_dojis >= params.doji_count_threshold;
    let is_tight_range = range < params.range_threshold;

    let choppy = is_low_vol && is_many_dojis && is_tight_range;

    ChoppyVerdict {
        timestamp: now,
        is_choppy: choppy,
        market_condition: if choppy {
            MarketCondition::Choppy
        } else {
            MarketCondition::TrendingVolatile
        },
        avg_atr_points: round2(avg_atr),
        num_dojis,
        price_range_points: round2(range),
        thresholds: params.clone(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
