//! Daily risk gate
//!
//! Evaluated at the top of every cycle, before any market data is touched.
//! Two independent gates must both pass: the calendar gate (weekday, time
//! windows, trading-day calendar) and the loss/drawdown gate. Daily P/L is
//! re-derived from closed-deal history on every evaluation; only the
//! intraday high-water mark is cached, in the document store, so it survives
//! process restarts.

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::calendar::{check_trading_day, CalendarBlock, TradingWindows};
use crate::store::{keys, JsonStore};
use crate::{Deal, Money};

/// Daily loss and drawdown limits, both negative amounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    pub daily_loss_limit: Money,
    pub drawdown_limit: Money,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_loss_limit: Money::from_f64(-20.0),
            drawdown_limit: Money::from_f64(-11.0),
        }
    }
}

/// Persisted intraday high-water mark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRiskState {
    pub last_date: Option<NaiveDate>,
    pub max_daily_pl: Money,
}

impl Default for DailyRiskState {
    fn default() -> Self {
        Self {
            last_date: None,
            max_daily_pl: Money::ZERO,
        }
    }
}

/// Why the risk gate refused this cycle
#[derive(Debug, Error)]
pub enum GateBlock {
    #[error(transparent)]
    Calendar(#[from] CalendarBlock),

    #[error("daily loss limit hit: P/L {pl} breaches {limit}, trading paused for today")]
    LossLimit { pl: Money, limit: Money },

    #[error("daily drawdown hit: P/L dropped from {max} to {pl}, trading paused for today")]
    Drawdown { max: Money, pl: Money },
}

/// Sum of closed-deal profit; the day's realized P/L when fed the deals
/// closed since local midnight
pub fn realized_pl(deals: &[Deal]) -> Money {
    deals.iter().map(|d| d.profit).sum()
}

/// The combined calendar + loss/drawdown gate
pub struct RiskGate<'a> {
    limits: RiskLimits,
    windows: TradingWindows,
    calendar_path: PathBuf,
    store: &'a JsonStore,
}

impl<'a> RiskGate<'a> {
    pub fn new(
        limits: RiskLimits,
        windows: TradingWindows,
        calendar_path: impl AsRef<Path>,
        store: &'a JsonStore,
    ) -> Self {
        Self {
            limits,
            windows,
            calendar_path: calendar_path.as_ref().to_path_buf(),
            store,
        }
    }

    /// Run every gate for the given local date/time and realized P/L.
    ///
    /// Cheap checks run first so a blocked cycle costs almost nothing.
    pub fn evaluate(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        current_pl: Money,
    ) -> Result<(), GateBlock> {
        check_trading_day(&self.calendar_path, date)?;
        self.windows.check(date.weekday(), time)?;

        if current_pl <= self.limits.daily_loss_limit {
            return Err(GateBlock::LossLimit {
                pl: current_pl,
                limit: self.limits.daily_loss_limit,
            });
        }

        self.check_drawdown(date, current_pl)
    }

    /// Update the high-water mark and test the drawdown condition.
    ///
    /// The mark is monotonically non-decreasing within a day and resets to
    /// the day's first-observed P/L (not zero) on date change. A day that
    /// has never been profitable cannot trigger a drawdown pause.
    pub fn check_drawdown(&self, today: NaiveDate, current_pl: Money) -> Result<(), GateBlock> {
        let state: DailyRiskState = self.store.get(keys::RISK_STATE).unwrap_or_default();

        let max_daily_pl = if state.last_date == Some(today) {
            state.max_daily_pl.max(current_pl)
        } else {
            current_pl
        };

        let updated = DailyRiskState {
            last_date: Some(today),
            max_daily_pl,
        };
        if updated != state {
            if let Err(e) = self.store.put(keys::RISK_STATE, &updated) {
                warn!("Failed to persist drawdown state: {e}");
            }
        }

        if current_pl <= max_daily_pl + self.limits.drawdown_limit && max_daily_pl.is_positive() {
            return Err(GateBlock::Drawdown {
                max: max_daily_pl,
                pl: current_pl,
            });
        }

        Ok(())
    }

    /// External midnight reset: force the high-water mark to zero
    pub fn reset_at_midnight(&self, today: NaiveDate) {
        let reset = DailyRiskState {
            last_date: Some(today),
            max_daily_pl: Money::ZERO,
        };
        match self.store.put(keys::RISK_STATE, &reset) {
            Ok(_) => info!("Drawdown state reset to 0.0 at midnight {today}"),
            Err(e) => warn!("Failed to reset drawdown state: {e}"),
        }
    }
}
