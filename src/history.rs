//! Trade-history reporting
//!
//! Pairs opening and closing deals per position, annotates each completed
//! trade (bot attribution by lot size, entry-price trade range, time-of-day
//! interval, duration bucket), and writes a CSV report. The hardcoded
//! XAUUSD trade ranges are a reporting concern only and deliberately stay
//! separate from the zone engine's price-in-zone lookup.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tracing::info;

use crate::{Deal, DealEntry, Money, Side, Symbol, Ticket};

/// One tagged entry-price band used for report grouping
#[derive(Debug, Clone)]
pub struct TradeRange {
    pub lower: f64,
    pub upper: f64,
    pub tag: &'static str,
}

/// The XAUUSD report bands: alternating bottom/top tags on a 12.5 grid
pub fn xauusd_trade_ranges() -> Vec<TradeRange> {
    let mut ranges = Vec::with_capacity(32);
    // 16 band pairs climbing from 3203.1 in 12.5 steps
    for i in 0..16 {
        let base = 3203.1 + 12.5 * i as f64;
        let mid = base + 3.15;
        let top = mid + 3.15;
        ranges.push(TradeRange {
            lower: round1(base),
            upper: round2(mid),
            tag: "B",
        });
        ranges.push(TradeRange {
            lower: round2(mid),
            upper: round1(top),
            tag: "T",
        });
    }
    ranges
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Map a lot size to the bot that trades it
pub fn bot_name(lot: f64) -> &'static str {
    match (lot * 1000.0).round() as i64 {
        10 | 20 | 30 => "FreeStyler",
        25 | 50 | 100 => "Gladiator",
        370 | 380 | 750 | 1500 => "Wire",
        _ => "Unknown",
    }
}

/// Label for the band containing the entry price, half-open on the top edge
pub fn trade_range_label(ranges: &[TradeRange], entry_price: f64) -> String {
    for range in ranges {
        if range.lower <= entry_price && entry_price < range.upper {
            return format!("{} {}-{}", range.tag, range.lower, range.upper);
        }
    }
    "Outside Defined Ranges".to_string()
}

/// 5-minute duration bucket, e.g. "10-15 min"
pub fn duration_range(duration_minutes: f64) -> String {
    if duration_minutes < 0.0 {
        return "Negative Duration".to_string();
    }
    let lower = (duration_minutes / 5.0).floor() as i64 * 5;
    format!("{}-{} min", lower, lower + 5)
}

/// 2-hour time-of-day interval, e.g. "08-10"
pub fn time_interval(hour: u32) -> String {
    let start = hour - (hour % 2);
    format!("{:02}-{:02}", start, start + 2)
}

/// A fully paired open/close trade ready for the report
#[derive(Debug, Clone, Serialize)]
pub struct CompletedTrade {
    pub trade_id: Ticket,
    pub open_time: String,
    pub close_time: String,
    pub symbol: Symbol,
    pub lot: f64,
    pub profit: Money,
    pub bot_name: String,
    pub trade_time_interval: String,
    pub day: String,
    pub trade_type: Side,
    pub entry_price: f64,
    pub trade_range: String,
    pub outcome: String,
    pub duration_minutes: f64,
    pub duration_range: String,
}

#[derive(Debug, Default)]
struct PartialTrade {
    order_id: Ticket,
    symbol: Option<Symbol>,
    lot: f64,
    side: Option<Side>,
    entry_price: f64,
    open_time: Option<DateTime<Utc>>,
    close_time: Option<DateTime<Utc>>,
    profit: Money,
}

/// Pair In/Out deals by position id and annotate completed trades.
///
/// Positions missing either leg are dropped. Output is ordered by position
/// id for stable reports.
pub fn pair_deals(deals: &[Deal], ranges: &[TradeRange]) -> Vec<CompletedTrade> {
    let mut partials: BTreeMap<Ticket, PartialTrade> = BTreeMap::new();

    for deal in deals {
        let partial = partials.entry(deal.position_id).or_default();
        match deal.entry {
            DealEntry::In => {
                partial.order_id = deal.ticket;
                partial.symbol = Some(deal.symbol.clone());
                partial.lot = deal.volume;
                partial.side = Some(deal.side);
                partial.entry_price = deal.price;
                partial.open_time = Some(deal.time);
            }
            DealEntry::Out => {
                partial.close_time = Some(deal.time);
                partial.profit = deal.profit;
            }
        }
    }

    partials
        .into_values()
        .filter_map(|partial| {
            let open_time = partial.open_time?;
            let close_time = partial.close_time?;
            let symbol = partial.symbol?;
            let side = partial.side?;

            let duration_minutes = (close_time - open_time).num_seconds() as f64 / 60.0;
            let outcome = if partial.profit.is_positive() {
                "Profit"
            } else if partial.profit < Money::ZERO {
                "Loss"
            } else {
                "Break Even"
            };

            Some(CompletedTrade {
                trade_id: partial.order_id,
                open_time: open_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                close_time: close_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                symbol,
                lot: partial.lot,
                profit: partial.profit,
                bot_name: bot_name(partial.lot).to_string(),
                trade_time_interval: time_interval(open_time.hour()),
                day: open_time.format("%A").to_string(),
                trade_type: side,
                entry_price: partial.entry_price,
                trade_range: trade_range_label(ranges, partial.entry_price),
                outcome: outcome.to_string(),
                duration_minutes,
                duration_range: duration_range(duration_minutes),
            })
        })
        .collect()
}

/// Write the report CSV, one row per completed trade
pub fn write_csv(path: impl AsRef<Path>, trades: &[CompletedTrade]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report at {}", path.display()))?;
    for trade in trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;

    let total: Money = trades.iter().map(|t| t.profit).sum();
    info!(
        "Report written to {} ({} trades, total profit {})",
        path.display(),
        trades.len(),
        total
    );
    Ok(())
}
