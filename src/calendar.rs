//! Calendar gating
//!
//! Two independent calendar checks guard every evaluation cycle: the
//! per-weekday time-window table (no trading outside explicit windows, never
//! on weekends) and an externally maintained trading-day calendar file. Both
//! fail closed: a missing table entry, a date outside the calendar's
//! validity range, or an unreadable calendar all mean "no trading".

use std::collections::HashMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Why the calendar gate refused this cycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarBlock {
    #[error("not a weekday: no trading on {0}")]
    Weekend(String),

    #[error("no trading windows defined for {0}")]
    NoWindows(String),

    #[error("{day} {time} outside defined trading windows")]
    OutsideWindows { day: String, time: String },

    #[error("trading calendar unavailable: {0}")]
    CalendarUnavailable(String),

    #[error("{date} outside calendar range {start}..{end}")]
    OutsideCalendarRange {
        date: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("{0} not found in trading calendar")]
    DateNotListed(NaiveDate),

    #[error("{date} is marked '{status}', no trading")]
    NonTradingDay { date: NaiveDate, status: String },
}

/// One inclusive start..=end trading window within a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    fn from_hours(start: u32, end: u32) -> Self {
        Self {
            start: NaiveTime::from_hms_opt(start, 0, 0).expect("valid hour"),
            end: NaiveTime::from_hms_opt(end, 0, 0).expect("valid hour"),
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Per-weekday trading window table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingWindows {
    windows: HashMap<String, Vec<TimeWindow>>,
}

impl Default for TradingWindows {
    /// The production window table: 2-hour blocks with day-specific holes
    /// (no Monday open, no Tuesday evening block, Thursday/Friday afternoon
    /// gaps, early Friday close).
    fn default() -> Self {
        let two_hour_blocks = |hours: &[u32]| -> Vec<TimeWindow> {
            hours
                .iter()
                .map(|&h| TimeWindow::from_hours(h, h + 2))
                .collect()
        };

        let mut windows = HashMap::new();
        windows.insert(
            "Monday".to_string(),
            two_hour_blocks(&[2, 4, 6, 8, 10, 12, 14, 16, 18, 20]),
        );
        windows.insert(
            "Tuesday".to_string(),
            two_hour_blocks(&[0, 2, 4, 6, 8, 10, 12, 14, 16, 20]),
        );
        windows.insert(
            "Wednesday".to_string(),
            two_hour_blocks(&[0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20]),
        );
        windows.insert(
            "Thursday".to_string(),
            two_hour_blocks(&[0, 2, 4, 6, 8, 10, 12, 16, 18, 20]),
        );
        windows.insert(
            "Friday".to_string(),
            two_hour_blocks(&[0, 2, 4, 6, 8, 10, 12, 16, 18]),
        );
        Self { windows }
    }
}

impl TradingWindows {
    /// Check the weekday/time pair against the table
    pub fn check(&self, weekday: Weekday, time: NaiveTime) -> Result<(), CalendarBlock> {
        let day = weekday_name(weekday);

        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            return Err(CalendarBlock::Weekend(day.to_string()));
        }

        let day_windows = self
            .windows
            .get(day)
            .filter(|w| !w.is_empty())
            .ok_or_else(|| CalendarBlock::NoWindows(day.to_string()))?;

        if day_windows.iter().any(|w| w.contains(time)) {
            Ok(())
        } else {
            Err(CalendarBlock::OutsideWindows {
                day: day.to_string(),
                time: time.format("%H:%M:%S").to_string(),
            })
        }
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Externally maintained trading-day calendar document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingCalendar {
    pub schedule: HashMap<NaiveDate, String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TradingCalendar {
    /// Status string that marks a date as open for trading
    pub const TRADING_DAY: &'static str = "Trading Day";

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalendarBlock> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CalendarBlock::CalendarUnavailable(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| {
            warn!("Trading calendar {} malformed: {}", path.display(), e);
            CalendarBlock::CalendarUnavailable(e.to_string())
        })
    }

    pub fn check(&self, date: NaiveDate) -> Result<(), CalendarBlock> {
        if date < self.start_date || date > self.end_date {
            return Err(CalendarBlock::OutsideCalendarRange {
                date,
                start: self.start_date,
                end: self.end_date,
            });
        }

        match self.schedule.get(&date) {
            None => Err(CalendarBlock::DateNotListed(date)),
            Some(status) if status == Self::TRADING_DAY => Ok(()),
            Some(status) => Err(CalendarBlock::NonTradingDay {
                date,
                status: status.clone(),
            }),
        }
    }
}

/// Load the calendar file and check today's date in one step
pub fn check_trading_day(path: impl AsRef<Path>, date: NaiveDate) -> Result<(), CalendarBlock> {
    TradingCalendar::load(path)?.check(date)
}
