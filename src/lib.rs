//! Gold Trading Decision Engine
//!
//! An automated trading decision engine for XAUUSD combining market-regime
//! classification, a 17-level price-zone lookup, an EMA-crossover entry
//! signal, daily risk gating, and post-entry stop-loss trailing. Components
//! run as independently scheduled jobs and share state through a file-backed
//! JSON document store.

pub mod broker;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod feed;
pub mod history;
pub mod indicators;
pub mod regime;
pub mod risk;
pub mod signal;
pub mod store;
pub mod trailing;
pub mod types;
pub mod zones;

pub use config::Config;
pub use types::*;
