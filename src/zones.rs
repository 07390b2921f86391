//! Zone engine ("shoot" levels)
//!
//! Derives the 17-level price ladder for an instrument from the current
//! price: a rounded reference price, two increment neighbours, recursively
//! bisected half- and quarter-points, and offset quarter-half points. Each
//! level carries an overshoot/undershoot pair plus an untradable band around
//! them. The table is a pure function of the price snapshot and instrument
//! parameters and is regenerated wholesale on every recompute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{points_to_price, Symbol};

/// Number of levels in a complete ladder
pub const ZONE_COUNT: usize = 17;

/// Default width of the untradable band on each side, in instrument points
pub const DEFAULT_BAND_POINTS: f64 = 60.0;

/// Instrument family, which fixes rounding and offset behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentClass {
    /// Gold crosses (XAU*): coarse 100-unit grid
    Metal,
    /// Yen-quoted pairs: 10-unit floor grid
    Yen,
    /// Everything else: 0.1 grid
    Major,
}

impl InstrumentClass {
    pub fn of(symbol: &Symbol) -> Self {
        let s = symbol.as_str();
        if s.contains("XAU") {
            InstrumentClass::Metal
        } else if s.contains("JPY") {
            InstrumentClass::Yen
        } else {
            InstrumentClass::Major
        }
    }

    /// Grid increment between the reference price and its neighbours
    pub fn default_increment(self) -> f64 {
        match self {
            InstrumentClass::Metal => 100.0,
            InstrumentClass::Yen => 10.0,
            InstrumentClass::Major => 0.1,
        }
    }

    /// Offset applied to quarter/half points (an eighth of the increment)
    fn quarter_half_offset(self) -> f64 {
        match self {
            InstrumentClass::Metal => 12.5,
            InstrumentClass::Yen => 1.25,
            InstrumentClass::Major => 0.0125,
        }
    }

    /// Offset between a level and its overshoot/undershoot prices
    fn shoot_offset(self) -> f64 {
        match self {
            InstrumentClass::Metal => 2.5,
            InstrumentClass::Yen => 0.25,
            InstrumentClass::Major => 0.0025,
        }
    }

    /// Round the current price onto the reference grid (MP1)
    fn reference_price(self, price: f64) -> f64 {
        match self {
            InstrumentClass::Metal => (price / 100.0).round() * 100.0,
            InstrumentClass::Yen => (price / 10.0).floor() * 10.0,
            InstrumentClass::Major => round_dp(price, 1),
        }
    }
}

/// One level of the ladder with its bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub label: String,
    pub overshoot: f64,
    pub undershoot: f64,
    pub upper_limit: f64,
    pub lower_limit: f64,
}

impl Zone {
    /// A price inside [lower_limit, upper_limit] is untradable
    pub fn contains(&self, price: f64) -> bool {
        self.lower_limit <= price && price <= self.upper_limit
    }
}

/// Complete ordered ladder for one instrument.
///
/// Replaced atomically in the store on every recompute; never mutated in
/// place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTable {
    pub symbol: Symbol,
    pub generated_at: DateTime<Utc>,
    pub reference_price: f64,
    pub zones: Vec<Zone>,
}

impl ZoneTable {
    /// Scan zones in label order; the first zone whose band contains the
    /// price makes it untradable and stops the scan.
    pub fn is_untradable(&self, price: f64) -> bool {
        self.find_blocking_zone(price).is_some()
    }

    pub fn find_blocking_zone(&self, price: f64) -> Option<&Zone> {
        self.zones.iter().find(|z| z.contains(price))
    }
}

/// The raw 17-point level sequence, before bands are attached.
///
/// Exposed separately so the monotonicity invariant can be checked against
/// the bare levels.
pub fn level_sequence(class: InstrumentClass, price: f64, increment: f64) -> [f64; ZONE_COUNT] {
    let mp1 = class.reference_price(price);
    let mp2 = round_dp(mp1 + increment, 1);
    let mp3 = round_dp(mp1 - increment, 1);

    let hp1 = (mp1 + mp3) / 2.0;
    let hp2 = (mp1 + mp2) / 2.0;

    let qp1 = (mp3 + hp1) / 2.0;
    let qp2 = (hp1 + mp1) / 2.0;
    let qp3 = (mp1 + hp2) / 2.0;
    let qp4 = (hp2 + mp2) / 2.0;

    let o = class.quarter_half_offset();
    let qhp = [
        round_dp(mp3 + o, 4),
        round_dp(qp1 + o, 4),
        round_dp(hp1 + o, 4),
        round_dp(qp2 + o, 4),
        // the offset below the central reference comes off the upper quarter
        round_dp(qp3 - o, 4),
        round_dp(qp3 + o, 4),
        round_dp(hp2 + o, 4),
        round_dp(qp4 + o, 4),
    ];

    [
        mp3, qhp[0], qp1, qhp[1], hp1, qhp[2], qp2, qhp[3], mp1, qhp[4], qp3, qhp[5], hp2, qhp[6],
        qp4, qhp[7], mp2,
    ]
}

/// Build the complete zone table for an instrument.
///
/// `point` is the instrument's smallest price step; `band_points` the
/// tradable-limit band width on each side of the shoot pair.
pub fn build_zone_table(
    symbol: &Symbol,
    price: f64,
    increment: f64,
    point: f64,
    band_points: f64,
) -> ZoneTable {
    let class = InstrumentClass::of(symbol);
    let levels = level_sequence(class, price, increment);
    let shoot = class.shoot_offset();
    let band = points_to_price(band_points, point);

    let zones = levels
        .iter()
        .enumerate()
        .map(|(idx, &level)| {
            let overshoot = round_dp(level + shoot, 4);
            let undershoot = round_dp(level - shoot, 4);
            Zone {
                label: format!("zone{}", idx + 1),
                overshoot,
                undershoot,
                upper_limit: round_dp(overshoot + band, 4),
                lower_limit: round_dp(undershoot - band, 4),
            }
        })
        .collect();

    ZoneTable {
        symbol: symbol.clone(),
        generated_at: Utc::now(),
        reference_price: class.reference_price(price),
        zones,
    }
}

fn round_dp(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round() / factor
}
