//! One-shot job execution for operational debugging
//!
//! Runs a single evaluation of any scheduled job and exits, mirroring how
//! the jobs can be exercised independently in production.

use anyhow::Result;
use clap::ValueEnum;
use tracing::info;

use gold_engine::broker::BridgeClient;
use gold_engine::engine::Engine;
use gold_engine::store::JsonStore;
use gold_engine::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobKind {
    /// Recompute the zone table from the current price
    Zones,
    /// Run the choppiness classifier once
    Choppy,
    /// Run the higher-timeframe range classifier once
    Range,
    /// Run one full signal evaluation (risk gate included)
    Signal,
    /// Run one trailing-stop pass
    Trail,
}

pub async fn run(job: JobKind, config_path: Option<String>) -> Result<()> {
    let cfg = Config::load(config_path.as_deref())?;
    let store = JsonStore::open(&cfg.paths.state_dir)?;
    let broker = BridgeClient::connect(&cfg.bridge).await?;
    let engine = Engine::new(&cfg, &store, &broker);

    info!("Running {job:?} once");
    match job {
        JobKind::Zones => engine.zones_job().await,
        JobKind::Choppy => engine.choppy_job().await,
        JobKind::Range => engine.range_job().await,
        JobKind::Signal => engine.signal_job().await,
        JobKind::Trail => engine.trailing_job().await,
    }
}
