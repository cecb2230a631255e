//! Hierarchical utility planner and arbitration layer for ManaBots mages.
//!
//! Each planning tick walks a memoized goal graph from the root: nodes
//! compute heat, spread priority over their children, and stochastically
//! delegate execution; leaves answer by proposing movement and mote
//! casts. The arbiter then resolves all proposals into one coherent
//! [`manabots_core::Decision`] — a single movement command under
//! hysteresis plus at most two winning casts pushed through the agent's
//! budgeted [`ManaGrip`].

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod arbiter;
pub mod controller;
pub mod goal;
mod goals;
pub mod grip;
pub mod scale;
mod tree;

pub use controller::{MindController, register_utility_mind};
pub use goal::{GoalArg, GoalGraph, GoalId, GoalKey, GoalKind, GoalRecord};
pub use grip::ManaGrip;
pub use scale::{ScaleMap, ScaleMode};

/// Errors raised when constructing planner components.
#[derive(Debug, Error, PartialEq)]
pub enum MindError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Indicates a malformed scale breakpoint table.
    #[error("invalid scale table: {0}")]
    InvalidScale(&'static str),
}

/// Static configuration for one agent's planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MindConfig {
    /// Attention budget assigned to the root each tick.
    pub attention: f32,
    /// Maximum surviving children per tree node after pruning.
    pub max_goals: usize,
    /// Cumulative child score allowed before the rest are pruned.
    pub max_score: f32,
    /// Lower bound on the per-tick heat refresh probability.
    pub heat_floor: f32,
    /// Per-tick probability that a coordinator re-scans for new subgoals.
    pub spawn_chance: f32,
    /// Half-width of the world window scanned for rivals and motes.
    pub scan_radius: f32,
    /// Planner ticks a leaf's cached scan stays valid.
    pub scan_ttl: u64,
    /// Share of root attention given to the hotter of war and harvest.
    pub primary_share: f32,
    /// Seconds without proposals before the mover is stopped and cleared.
    pub grace_time: f32,
    /// Seconds a movement commitment holds against marginal challengers.
    pub hold_time: f32,
    /// Score factor a challenger must exceed to displace an incumbent
    /// before `hold_time` elapses.
    pub hold_margin: f32,
    /// Distance to a committed target below which the agent stops.
    pub arrive_radius: f32,
    /// Maximum cast proposals honored per tick.
    pub cast_cap: usize,
    /// Request magnitude below which an idle hold is released.
    pub release_threshold: f32,
    /// Preferred standoff distance when closing on a hunt target.
    pub standoff: f32,
    /// Distance within which a tapped mote no longer pulls the agent over.
    pub tap_reach: f32,
    /// How far an evading agent retreats from the nearest rival.
    pub flee_distance: f32,
    /// Mote power at which a tap target is maximally attractive.
    pub mote_worth: f32,
    /// Move intensity applied when driving a mote onto a hunt target.
    pub cast_gain: f32,
    /// Power intensity applied when charging a mote onto a hunt target.
    pub surge_gain: f32,
    /// Move intensity applied when pulling a tapped mote home.
    pub pull_gain: f32,
    /// Power intensity applied when exciting a tapped mote.
    pub spark_gain: f32,
    /// Optional RNG seed for a reproducible planner. Minds spawned
    /// through the registry are reseeded from the world RNG instead.
    pub rng_seed: Option<u64>,
}

impl Default for MindConfig {
    fn default() -> Self {
        Self {
            attention: 100.0,
            max_goals: 4,
            max_score: 150.0,
            heat_floor: 0.1,
            spawn_chance: 0.1,
            scan_radius: 40.0,
            scan_ttl: 5,
            primary_share: 0.7,
            grace_time: 2.0,
            hold_time: 1.0,
            hold_margin: 1.1,
            arrive_radius: 1.0,
            cast_cap: 2,
            release_threshold: 0.1,
            standoff: 6.0,
            tap_reach: 3.0,
            flee_distance: 15.0,
            mote_worth: 2.0,
            cast_gain: 2.0,
            surge_gain: 1.0,
            pull_gain: 1.5,
            spark_gain: 0.5,
            rng_seed: None,
        }
    }
}

impl MindConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), MindError> {
        if !(self.attention > 0.0) {
            return Err(MindError::InvalidConfig("attention must be positive"));
        }
        if self.max_goals == 0 {
            return Err(MindError::InvalidConfig("max_goals must be non-zero"));
        }
        if !(self.max_score > 0.0) {
            return Err(MindError::InvalidConfig("max_score must be positive"));
        }
        if !(self.heat_floor > 0.0) || self.heat_floor > 1.0 {
            return Err(MindError::InvalidConfig(
                "heat_floor must be within (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.spawn_chance) {
            return Err(MindError::InvalidConfig(
                "spawn_chance must be within [0, 1]",
            ));
        }
        if !(self.scan_radius > 0.0) {
            return Err(MindError::InvalidConfig("scan_radius must be positive"));
        }
        if !(self.primary_share > 0.0) || !(self.primary_share < 1.0) {
            return Err(MindError::InvalidConfig(
                "primary_share must be within (0, 1)",
            ));
        }
        if self.grace_time < 0.0 || self.hold_time < 0.0 {
            return Err(MindError::InvalidConfig(
                "grace_time and hold_time must be non-negative",
            ));
        }
        if !(self.hold_margin >= 1.0) {
            return Err(MindError::InvalidConfig("hold_margin must be at least 1"));
        }
        if !(self.arrive_radius > 0.0) {
            return Err(MindError::InvalidConfig("arrive_radius must be positive"));
        }
        if self.cast_cap == 0 {
            return Err(MindError::InvalidConfig("cast_cap must be non-zero"));
        }
        if self.release_threshold < 0.0 {
            return Err(MindError::InvalidConfig(
                "release_threshold must be non-negative",
            ));
        }
        if !(self.standoff > 0.0) || !(self.tap_reach > 0.0) || !(self.flee_distance > 0.0) {
            return Err(MindError::InvalidConfig(
                "standoff, tap_reach, and flee_distance must be positive",
            ));
        }
        if !(self.mote_worth > 0.0) {
            return Err(MindError::InvalidConfig("mote_worth must be positive"));
        }
        if self.cast_gain < 0.0
            || self.surge_gain < 0.0
            || self.pull_gain < 0.0
            || self.spark_gain < 0.0
        {
            return Err(MindError::InvalidConfig(
                "cast intensities must be non-negative",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeded from entropy if no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
