//! Trailing-stop engine
//!
//! Runs continuously against open positions, independent of the entry
//! pipeline. Two mutually substitutable strategies are supported, chosen
//! once per deployment: a volatility-phase trail driven by a per-position
//! baseline captured at first profitable observation, and a fixed 23-phase
//! ladder stepped in instrument points. Both only ever move a stop in the
//! position's favour; rejected modifications are logged and naturally
//! retried on the next pass, which re-derives everything from current state.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::broker::{BrokerError, MarketData, OrderService};
use crate::store::{keys, JsonStore};
use crate::{points_to_price, Position, Side, Ticket};

/// Which trailing strategy this deployment runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailMode {
    Volatility,
    PhaseLadder,
}

/// One rung of the phase ladder, all distances in instrument points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub max_dist_sl: f64,
    pub trail_amount: f64,
    #[serde(default = "default_seed_sl")]
    pub default_sl: f64,
}

fn default_seed_sl() -> f64 {
    100.0
}

impl PhaseConfig {
    fn new(max_dist_sl: f64, trail_amount: f64) -> Self {
        Self {
            max_dist_sl,
            trail_amount,
            default_sl: default_seed_sl(),
        }
    }
}

/// The production 23-phase ladder: a wide opening phase, then tightening
/// steps that loosen briefly around phase 9-11.
pub fn default_phases() -> Vec<PhaseConfig> {
    let mut phases = vec![
        PhaseConfig::new(140.0, 105.0),
        PhaseConfig::new(50.0, 20.0),
        PhaseConfig::new(40.0, 20.0),
    ];
    phases.extend(std::iter::repeat_with(|| PhaseConfig::new(30.0, 10.0)).take(6)); // 3-8
    phases.push(PhaseConfig::new(40.0, 20.0)); // 9
    phases.push(PhaseConfig::new(40.0, 10.0)); // 10
    phases.push(PhaseConfig::new(40.0, 20.0)); // 11
    phases.extend(std::iter::repeat_with(|| PhaseConfig::new(30.0, 10.0)).take(11)); // 12-22
    phases
}

/// Trailing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    pub mode: TrailMode,
    /// When true, the volatility strategy seeds a position's baseline from
    /// the external feed instead of half the initial stop distance
    pub use_feed_baseline: bool,
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseConfig>,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            mode: TrailMode::Volatility,
            use_feed_baseline: false,
            phases: default_phases(),
        }
    }
}

/// Per-position trailing state, keyed by ticket.
///
/// Created lazily the first time a position is seen in profit (volatility
/// mode) or checked at all (ladder mode); destroyed when the ticket vanishes
/// from the open-positions set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrailState {
    pub positions: HashMap<String, PositionTrail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTrail {
    /// Fixed for the life of the position once captured
    pub original_volatility: Option<f64>,
    /// Ladder phase; -1 means uninitialized
    pub phase: i32,
}

impl Default for PositionTrail {
    fn default() -> Self {
        Self {
            original_volatility: None,
            phase: -1,
        }
    }
}

impl TrailState {
    fn entry_mut(&mut self, ticket: Ticket) -> &mut PositionTrail {
        self.positions.entry(ticket.to_string()).or_default()
    }

    /// Drop state for tickets no longer open. Returns how many were removed.
    pub fn prune_closed(&mut self, open: &HashSet<Ticket>) -> usize {
        let before = self.positions.len();
        self.positions
            .retain(|ticket, _| ticket.parse::<Ticket>().map_or(false, |t| open.contains(&t)));
        before - self.positions.len()
    }
}

/// Candidate stop for the volatility-phase strategy.
///
/// Tiers by profit expressed in baseline units: under 2 units trail at 2x
/// the baseline, 2-4 units at 1.5x, and from 4 units the trail distance
/// grows by one baseline for every full 2 units of further profit, which
/// advances the stop by one baseline per 2 units gained.
pub fn volatility_candidate(side: Side, price_current: f64, profit: f64, baseline: f64) -> f64 {
    let units = profit / baseline;

    let trail_distance = if units >= 4.0 {
        let additional_steps = ((units - 4.0) / 2.0).floor().max(0.0);
        (1.0 + additional_steps) * baseline
    } else if units >= 2.0 {
        1.5 * baseline
    } else {
        2.0 * baseline
    };

    match side {
        Side::Buy => price_current - trail_distance,
        Side::Sell => price_current + trail_distance,
    }
}

/// A candidate is applied only when strictly more favourable than the
/// current stop. A sell position with no stop set never trails.
pub fn improves_stop(side: Side, candidate: f64, current_sl: f64) -> bool {
    match side {
        Side::Buy => candidate > current_sl,
        Side::Sell => current_sl != 0.0 && candidate < current_sl,
    }
}

/// Should the ladder advance into `next`? Either the stop has fallen far
/// enough behind the price, or no stop is set yet.
pub fn ladder_due(price_current: f64, sl: f64, next: &PhaseConfig, point: f64) -> bool {
    sl == 0.0 || (price_current - sl).abs() >= points_to_price(next.max_dist_sl, point)
}

/// New stop for one ladder step: advance an existing stop by the phase's
/// trail amount, or seed an unset stop at the default distance from entry.
pub fn ladder_candidate(
    side: Side,
    price_open: f64,
    sl: f64,
    next: &PhaseConfig,
    point: f64,
) -> f64 {
    if sl != 0.0 {
        let step = points_to_price(next.trail_amount, point);
        match side {
            Side::Buy => sl + step,
            Side::Sell => sl - step,
        }
    } else {
        let seed = points_to_price(next.default_sl, point);
        match side {
            Side::Buy => price_open - seed,
            Side::Sell => price_open + seed,
        }
    }
}

/// One full trailing pass over all open positions.
pub async fn run_pass<B>(
    broker: &B,
    store: &JsonStore,
    feed_value: f64,
    cfg: &TrailingConfig,
) -> Result<(), BrokerError>
where
    B: MarketData + OrderService,
{
    if cfg.mode == TrailMode::Volatility && feed_value == 0.0 {
        warn!("Volatility feed unavailable, skipping trailing pass");
        return Ok(());
    }

    let positions = broker.open_positions().await?;
    let mut state: TrailState = store.get(keys::TRAIL_STATE).unwrap_or_default();

    for position in &positions {
        let outcome = match cfg.mode {
            TrailMode::Volatility => {
                trail_volatility(broker, &mut state, position, feed_value, cfg).await
            }
            TrailMode::PhaseLadder => trail_ladder(broker, &mut state, position, cfg).await,
        };
        if let Err(e) = outcome {
            warn!("Trailing failed for position {}: {e}", position.ticket);
        }
    }

    let open: HashSet<Ticket> = positions.iter().map(|p| p.ticket).collect();
    let pruned = state.prune_closed(&open);
    if pruned > 0 {
        debug!("Pruned trail state for {pruned} closed position(s)");
    }

    if let Err(e) = store.put(keys::TRAIL_STATE, &state) {
        warn!("Failed to persist trail state: {e}");
    }

    Ok(())
}

async fn trail_volatility<B>(
    broker: &B,
    state: &mut TrailState,
    position: &Position,
    feed_value: f64,
    cfg: &TrailingConfig,
) -> Result<(), BrokerError>
where
    B: MarketData + OrderService,
{
    let tick = broker.tick(&position.symbol).await?;
    let (price_current, profit) = match position.side {
        Side::Buy => (tick.bid, tick.bid - position.price_open),
        Side::Sell => (tick.ask, position.price_open - tick.ask),
    };

    if profit <= 0.0 {
        return Ok(());
    }

    let entry = state.entry_mut(position.ticket);
    let baseline = match entry.original_volatility {
        Some(v) => v,
        None => {
            let captured = if cfg.use_feed_baseline {
                feed_value
            } else {
                (position.price_open - position.sl).abs() / 2.0
            };
            if captured == 0.0 {
                warn!(
                    "Captured baseline is 0.0 for position {}, skipping",
                    position.ticket
                );
                return Ok(());
            }
            entry.original_volatility = Some(captured);
            info!(
                "Captured baseline {captured} for position {}",
                position.ticket
            );
            captured
        }
    };

    let candidate = volatility_candidate(position.side, price_current, profit, baseline);
    if !improves_stop(position.side, candidate, position.sl) {
        return Ok(());
    }

    match broker.modify_stop_loss(position.ticket, candidate).await? {
        crate::OrderResult::Accepted { .. } => {
            info!(
                "Adjusted SL for {} position {} to {candidate}",
                position.side, position.ticket
            );
        }
        crate::OrderResult::Rejected { code, message } => {
            warn!(
                "Failed to adjust SL for {} to {candidate}: code {code} {message}",
                position.ticket
            );
        }
    }
    Ok(())
}

async fn trail_ladder<B>(
    broker: &B,
    state: &mut TrailState,
    position: &Position,
    cfg: &TrailingConfig,
) -> Result<(), BrokerError>
where
    B: MarketData + OrderService,
{
    let current_phase = state.entry_mut(position.ticket).phase;
    let next_index = (current_phase + 1) as usize;
    let Some(next) = cfg.phases.get(next_index) else {
        // final phase reached
        return Ok(());
    };

    let point = broker.instrument_info(&position.symbol).await?.point;
    if !ladder_due(position.price_current, position.sl, next, point) {
        return Ok(());
    }

    let candidate = ladder_candidate(
        position.side,
        position.price_open,
        position.sl,
        next,
        point,
    );

    match broker.modify_stop_loss(position.ticket, candidate).await? {
        crate::OrderResult::Accepted { .. } => {
            state.entry_mut(position.ticket).phase = next_index as i32;
            info!(
                "Position {} moved to phase {next_index}, SL {candidate}",
                position.ticket
            );
        }
        crate::OrderResult::Rejected { code, message } => {
            warn!(
                "Failed to trail SL for position {} in phase {next_index}: code {code} {message}",
                position.ticket
            );
        }
    }
    Ok(())
}
