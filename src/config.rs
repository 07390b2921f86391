//! Configuration management
//!
//! One `Config` struct is built at process start from an optional JSON file
//! plus environment overrides (credentials and risk limits come from the
//! environment, loaded via dotenv) and passed by reference into every
//! component. There is no ambient global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::broker::BridgeConfig;
use crate::calendar::TradingWindows;
use crate::regime::ChoppyParams;
use crate::risk::RiskLimits;
use crate::signal::SignalParams;
use crate::trailing::TrailingConfig;
use crate::zones::DEFAULT_BAND_POINTS;
use crate::{Money, Symbol};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub trading: TradingConfig,
    pub choppy: ChoppyParams,
    pub signal: SignalParams,
    pub risk: RiskLimits,
    pub trailing: TrailingConfig,
    pub windows: TradingWindows,
    pub schedule: ScheduleConfig,
    pub paths: PathsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            trading: TradingConfig::default(),
            choppy: ChoppyParams::default(),
            signal: SignalParams::default(),
            risk: RiskLimits::default(),
            trailing: TrailingConfig::default(),
            windows: TradingWindows::default(),
            schedule: ScheduleConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: the file when given, built-in defaults otherwise,
    /// then environment overrides on top.
    ///
    /// A present-but-unreadable file is a fatal configuration error.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config JSON {}", path.display()))
    }

    /// Credentials and risk limits may be supplied through the environment
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BRIDGE_URL") {
            self.bridge.base_url = url;
        }
        if let Ok(login) = std::env::var("BRIDGE_LOGIN") {
            self.bridge.login = Some(login);
        }
        if let Ok(password) = std::env::var("BRIDGE_PASSWORD") {
            self.bridge.password = Some(password);
        }
        if let Ok(server) = std::env::var("BRIDGE_SERVER") {
            self.bridge.server = Some(server);
        }
        if let Some(limit) = env_f64("DAILY_LOSS_LIMIT") {
            self.risk.daily_loss_limit = Money::from_f64(limit);
        }
        if let Some(limit) = env_f64("DAILY_DRAWDOWN_LIMIT") {
            self.risk.drawdown_limit = Money::from_f64(limit);
        }
        if let Ok(path) = std::env::var("VOLATILITY_FEED_PATH") {
            self.paths.volatility_feed = path;
        }
    }
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Instrument and order parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbol: Symbol,
    /// Fixed lot size for every entry
    pub volume: f64,
    /// Zone-grid increment; None uses the instrument class default
    pub increment: Option<f64>,
    /// Untradable band width around each zone level, in points
    pub band_points: f64,
    /// Entry stop distance as a multiple of the volatility feed value
    pub entry_stop_multiple: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: Symbol::new("XAUUSD"),
            volume: 0.04,
            increment: None,
            band_points: DEFAULT_BAND_POINTS,
            entry_stop_multiple: 2.0,
        }
    }
}

/// Job cadences for the scheduler loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub zones_every_hours: u64,
    pub choppy_every_minutes: u64,
    pub range_every_minutes: u64,
    pub signal_every_minutes: u64,
    pub trail_every_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            zones_every_hours: 8,
            choppy_every_minutes: 5,
            range_every_minutes: 60,
            signal_every_minutes: 5,
            trail_every_seconds: 5,
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_dir: String,
    pub volatility_feed: String,
    pub trading_calendar: String,
    pub report_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: "state".to_string(),
            volatility_feed: "state/atr_data.json".to_string(),
            trading_calendar: "state/trading_schedule.json".to_string(),
            report_dir: "reports".to_string(),
        }
    }
}
