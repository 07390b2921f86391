//! Technical indicators
//!
//! Only the indicators the decision pipeline actually consumes: span-based
//! exponential moving averages for the crossover signal and true-range math
//! for the choppiness classifier.

use itertools::Itertools;

use crate::Candle;

/// Exponential moving average over `values` with the given span.
///
/// Seeded from the first value with alpha = 2 / (span + 1), so every input
/// position has a defined output (no warmup gap). This matches the recursive
/// form used by the signal pipeline's 2/10 crossover pair.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());

    if values.is_empty() || span == 0 {
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut current = values[0];
    result.push(current);

    for &value in &values[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        result.push(current);
    }

    result
}

/// True range of a single bar given the previous bar's close
pub fn true_range(candle: &Candle, prev_close: Option<f64>) -> f64 {
    let hl = candle.high - candle.low;
    match prev_close {
        Some(pc) => {
            let hc = (candle.high - pc).abs();
            let lc = (candle.low - pc).abs();
            hl.max(hc).max(lc)
        }
        None => hl,
    }
}

/// Simple-average true range over the whole window, expressed in instrument
/// points.
///
/// The first bar has no previous close and contributes its high-low span.
pub fn avg_true_range_points(candles: &[Candle], point: f64) -> f64 {
    if candles.is_empty() || point <= 0.0 {
        return 0.0;
    }

    let mut total = true_range(&candles[0], None);
    for (prev, current) in candles.iter().tuple_windows() {
        total += true_range(current, Some(prev.close));
    }

    total / candles.len() as f64 / point
}

/// High-to-low span of the whole window in instrument points
pub fn price_range_points(candles: &[Candle], point: f64) -> f64 {
    if candles.is_empty() || point <= 0.0 {
        return 0.0;
    }

    let max_high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let min_low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    (max_high - min_low) / point
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
        }
    }

    #[test]
    fn test_ema_constant_series() {
        let values = vec![3500.0; 20];
        let result = ema(&values, 10);
        assert_eq!(result.len(), 20);
        for v in result {
            assert_relative_eq!(v, 3500.0);
        }
    }

    #[test]
    fn test_ema_seeded_from_first_value() {
        let values = vec![100.0, 110.0];
        let result = ema(&values, 2);
        // alpha = 2/3: 100, then 2/3*110 + 1/3*100
        assert_relative_eq!(result[0], 100.0);
        assert_relative_eq!(result[1], 320.0 / 3.0);
    }

    #[test]
    fn test_ema_fast_tracks_closer_than_slow() {
        let values: Vec<f64> = (0..30).map(|i| 3500.0 + i as f64).collect();
        let fast = ema(&values, 2);
        let slow = ema(&values, 10);
        let last = values.len() - 1;
        // In a steady uptrend the fast EMA sits above the slow one
        assert!(fast[last] > slow[last]);
    }

    #[test]
    fn test_true_range_uses_prev_close_gap() {
        let current = bar(3510.0, 3512.0, 3508.0, 3511.0);
        // Gap up from a 3500 close dominates the 4-point high-low span
        assert_relative_eq!(true_range(&current, Some(3500.0)), 12.0);
        assert_relative_eq!(true_range(&current, None), 4.0);
    }

    #[test]
    fn test_avg_true_range_points() {
        let candles = vec![
            bar(3500.0, 3501.0, 3499.0, 3500.5),
            bar(3500.5, 3501.5, 3499.5, 3500.0),
        ];
        // TR = 2.0 (first, no prev close) and 2.0 -> mean 2.0 / 0.01 point
        assert_relative_eq!(avg_true_range_points(&candles, 0.01), 200.0);
    }

    #[test]
    fn test_price_range_points() {
        let candles = vec![
            bar(3500.0, 3503.0, 3499.0, 3502.0),
            bar(3502.0, 3504.0, 3500.0, 3501.0),
        ];
        assert_relative_eq!(price_range_points(&candles, 0.01), 500.0);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(ema(&[], 10).is_empty());
        assert_eq!(avg_true_range_points(&[], 0.01), 0.0);
        assert_eq!(price_range_points(&[], 0.01), 0.0);
    }
}
