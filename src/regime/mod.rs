//! Market regime classifiers
//!
//! Two independent evaluators, each running on its own cadence and
//! publishing a timestamped verdict to the document store: the choppiness
//! classifier (volatility + doji count + range over a rolling window) and
//! the range/trend classifier (midpoint containment at two lookback depths).
//! Consumers read persisted verdicts on later cycles, so every verdict
//! carries its own timestamp and must be treated as possibly stale.

pub mod choppy;
pub mod range;

pub use choppy::{ChoppyParams, ChoppyVerdict, MarketCondition};
pub use range::{CandleKind, MarketStatus, RangeParams, RangeVerdict, SymbolRange};
