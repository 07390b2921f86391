//! The long-running scheduler command
//!
//! One process-wide cooperative loop drives every periodic job at its own
//! cadence. The loop ticks once a second; due jobs run to completion in
//! sequence, so no two evaluations ever overlap. Individual job failures
//! are logged and the loop keeps going; only startup (configuration and
//! bridge authentication) is fatal.

use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use tracing::{error, info};

use gold_engine::broker::BridgeClient;
use gold_engine::engine::Engine;
use gold_engine::store::JsonStore;
use gold_engine::Config;

/// Tracks when a job last ran and decides when it is due again
struct Cadence {
    every: Duration,
    last: Option<DateTime<Local>>,
}

impl Cadence {
    fn new(every: Duration) -> Self {
        Self { every, last: None }
    }

    fn due(&mut self, now: DateTime<Local>) -> bool {
        let is_due = match self.last {
            None => true,
            Some(last) => now - last >= self.every,
        };
        if is_due {
            self.last = Some(now);
        }
        is_due
    }
}

pub async fn run(config_path: Option<String>) -> Result<()> {
    let cfg = Config::load(config_path.as_deref())?;
    let store = JsonStore::open(&cfg.paths.state_dir)?;

    // Authentication failure here is the one fatal error class
    let broker = BridgeClient::connect(&cfg.bridge).await?;
    let engine = Engine::new(&cfg, &store, &broker);

    let schedule = &cfg.schedule;
    info!(
        "Scheduler started for {}: zones every {}h, choppiness every {}m, range every {}m, \
         signal every {}m, trailing every {}s",
        cfg.trading.symbol,
        schedule.zones_every_hours,
        schedule.choppy_every_minutes,
        schedule.range_every_minutes,
        schedule.signal_every_minutes,
        schedule.trail_every_seconds,
    );

    let mut zones = Cadence::new(Duration::hours(schedule.zones_every_hours as i64));
    let mut choppy = Cadence::new(Duration::minutes(schedule.choppy_every_minutes as i64));
    let mut range = Cadence::new(Duration::minutes(schedule.range_every_minutes as i64));
    let mut signal = Cadence::new(Duration::minutes(schedule.signal_every_minutes as i64));
    let mut trail = Cadence::new(Duration::seconds(schedule.trail_every_seconds as i64));

    let mut last_date = Local::now().date_naive();

    loop {
        let now = Local::now();

        if now.date_naive() != last_date {
            engine.midnight_reset(now);
            last_date = now.date_naive();
        }

        // Jobs run to completion in sequence; later jobs in the same tick
        // see the fresher state the earlier ones just wrote
        if zones.due(now) {
            log_failure("zones", engine.zones_job().await);
        }
        if choppy.due(now) {
            log_failure("choppiness", engine.choppy_job().await);
        }
        if range.due(now) {
            log_failure("range", engine.range_job().await);
        }
        if signal.due(now) {
            log_failure("signal", engine.signal_job().await);
        }
        if trail.due(now) {
            log_failure("trailing", engine.trailing_job().await);
        }

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

fn log_failure(job: &str, result: Result<()>) {
    if let Err(e) = result {
        error!("{job} job failed: {e:#}");
    }
}
