//! Core data types shared across the decision engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLC candlestick bar, immutable once fetched.
///
/// A slice of candles ordered most-recent-last forms the rolling window the
/// classifiers operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            time,
            open,
            high,
            low,
            close,
        };
        candle.validate()?;
        Ok(candle)
    }

    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Candle body size in price units
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Full high-low span in price units
    pub fn span(&self) -> f64 {
        self.high - self.low
    }

    /// Midpoint of the bar, used by the range classifier
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

/// Instrument symbol, e.g. "XAUUSD"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

/// Directional decision for one evaluation cycle.
///
/// Computed fresh each cycle and handed straight to order placement; never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: Symbol,
    pub direction: Option<Side>,
    pub time: DateTime<Utc>,
}

impl TradeSignal {
    pub fn none(symbol: Symbol, time: DateTime<Utc>) -> Self {
        Self {
            symbol,
            direction: None,
            time,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.direction.is_some()
    }
}

/// Current bid/ask quote
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
}

/// Static per-instrument metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// Smallest price step, e.g. 0.01 for XAUUSD
    pub point: f64,
}

/// Convert a distance expressed in instrument points to price units
pub fn points_to_price(points: f64, point: f64) -> f64 {
    points * point
}

/// Opaque broker position identifier
pub type Ticket = u64;

/// An open position as reported by the order service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub symbol: Symbol,
    pub side: Side,
    pub volume: f64,
    pub price_open: f64,
    pub price_current: f64,
    /// Current stop-loss price; 0.0 means no stop is set
    pub sl: f64,
    /// Current take-profit price; 0.0 means no target is set
    pub tp: f64,
}

/// Whether a deal opened or closed its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealEntry {
    In,
    Out,
}

/// A historical (closed) deal from the trade-history collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub ticket: Ticket,
    pub position_id: Ticket,
    pub symbol: Symbol,
    pub side: Side,
    pub entry: DealEntry,
    pub volume: f64,
    pub price: f64,
    pub profit: Money,
    pub time: DateTime<Utc>,
}

/// Market order request handed to the order service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub comment: String,
}

/// Order placement outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderResult {
    Accepted { ticket: Ticket },
    Rejected { code: i64, message: String },
}

impl OrderResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, OrderResult::Accepted { .. })
    }
}

// ============================================================================
// Money - precise decimal arithmetic for P/L accounting
// ============================================================================

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};

/// Monetary amount backed by `rust_decimal::Decimal`.
///
/// Daily P/L sums, loss limits, and high-water marks go through this type so
/// that repeated summation over deal history cannot drift the way f64
/// accumulation would. Prices and indicator math stay f64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Lossy conversion from f64; NaN and infinities collapse to zero
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or(Decimal::ZERO))
    }

    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_candle_validation() {
        assert!(Candle::new(ts(), 3500.0, 3502.0, 3499.0, 3501.0).is_ok());

        // high below low
        assert!(Candle::new(ts(), 3500.0, 3498.0, 3499.0, 3498.5).is_err());

        // close outside range
        assert!(Candle::new(ts(), 3500.0, 3502.0, 3499.0, 3503.0).is_err());

        // non-positive price
        assert!(Candle::new(ts(), 0.0, 3502.0, 3499.0, 3501.0).is_err());
    }

    #[test]
    fn test_candle_midpoint() {
        let c = Candle::new(ts(), 3500.0, 3504.0, 3498.0, 3501.0).unwrap();
        assert_eq!(c.midpoint(), 3501.0);
        assert_eq!(c.body(), 1.0);
        assert_eq!(c.span(), 6.0);
    }

    #[test]
    fn test_points_to_price() {
        // 60 points on XAUUSD (point = 0.01) is 0.60 in price units
        assert_eq!(points_to_price(60.0, 0.01), 0.6);
    }

    #[test]
    fn test_money_sum_precision() {
        let deals = vec![
            Money::from_f64(0.1),
            Money::from_f64(0.2),
            Money::from_f64(-0.3),
        ];
        let total: Money = deals.iter().sum();
        assert!(total.is_zero());
    }

    #[test]
    fn test_money_ordering() {
        let loss_limit = Money::from_f64(-20.0);
        let pl = Money::from_f64(-20.5);
        assert!(pl <= loss_limit);
        assert!(Money::ZERO.max(pl) == Money::ZERO);
    }

    #[test]
    fn test_money_serde_round_trip() {
        let m = Money::from_f64(-11.25);
        let json = serde_json::to_string(&m).unwrap();
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
