//! Budgeted mana allocator: one agent's hold over a set of motes.

use std::collections::HashMap;

use manabots_core::{Influence, InfluenceWrite, ParticleId};

/// Tracks the motes an agent currently influences and the intensities it
/// asks of each, under a hard energy budget.
///
/// Scarcity is expressed through a proportional shrink: when the summed
/// request magnitudes exceed the budget, every pair is scaled by
/// `budget / used`. Requests are never rejected outright.
#[derive(Debug, Clone, Default)]
pub struct ManaGrip {
    affects: HashMap<ParticleId, Influence>,
    budget: f32,
}

impl ManaGrip {
    /// New grip with the given budget and no holds.
    #[must_use]
    pub fn new(budget: f32) -> Self {
        Self {
            affects: HashMap::new(),
            budget: budget.max(0.0),
        }
    }

    /// Current budget ceiling.
    #[must_use]
    pub const fn budget(&self) -> f32 {
        self.budget
    }

    /// Update the budget (read fresh from the agent each tick) and shrink
    /// existing holds if they now overflow it.
    pub fn set_budget(&mut self, budget: f32) {
        self.budget = budget.max(0.0);
        self.rebalance();
    }

    /// Summed request magnitudes across every held mote.
    #[must_use]
    pub fn used(&self) -> f32 {
        self.affects.values().map(Influence::magnitude).sum()
    }

    /// Number of held motes.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.affects.len()
    }

    /// Whether `particle` is currently held.
    #[must_use]
    pub fn is_held(&self, particle: ParticleId) -> bool {
        self.affects.contains_key(&particle)
    }

    /// Current requested intensities on `particle`, if held.
    #[must_use]
    pub fn influence(&self, particle: ParticleId) -> Option<Influence> {
        self.affects.get(&particle).copied()
    }

    /// Begin influencing `particle` at zero intensity. Idempotent.
    pub fn capture(&mut self, particle: ParticleId) {
        self.affects.entry(particle).or_default();
    }

    /// Stop influencing `particle`. Returns whether it was held.
    pub fn release(&mut self, particle: ParticleId) -> bool {
        self.affects.remove(&particle).is_some()
    }

    /// Drop every hold, returning the motes that must be notified.
    pub fn release_all(&mut self) -> Vec<ParticleId> {
        let mut released: Vec<ParticleId> = self.affects.drain().map(|(id, _)| id).collect();
        released.sort_unstable();
        released
    }

    /// Release every mote whose requested intensities both fall below
    /// `threshold`, returning the released handles.
    pub fn release_idle(&mut self, threshold: f32) -> Vec<ParticleId> {
        let mut idle: Vec<ParticleId> = self
            .affects
            .iter()
            .filter(|(_, inf)| inf.mov.abs() < threshold && inf.power.abs() < threshold)
            .map(|(&id, _)| id)
            .collect();
        idle.sort_unstable();
        for id in &idle {
            self.affects.remove(id);
        }
        idle
    }

    /// Set the requested move intensity. No-op when `particle` is not held.
    pub fn set_move(&mut self, particle: ParticleId, value: f32) {
        if let Some(influence) = self.affects.get_mut(&particle) {
            influence.mov = value;
            self.rebalance();
        }
    }

    /// Set the requested power intensity. No-op when `particle` is not held.
    pub fn set_power(&mut self, particle: ParticleId, value: f32) {
        if let Some(influence) = self.affects.get_mut(&particle) {
            influence.power = value;
            self.rebalance();
        }
    }

    /// Add a delta to the requested move intensity. No-op when not held.
    pub fn nudge_move(&mut self, particle: ParticleId, delta: f32) {
        if let Some(influence) = self.affects.get_mut(&particle) {
            influence.mov += delta;
            self.rebalance();
        }
    }

    /// Add a delta to the requested power intensity. No-op when not held.
    pub fn nudge_power(&mut self, particle: ParticleId, delta: f32) {
        if let Some(influence) = self.affects.get_mut(&particle) {
            influence.power += delta;
            self.rebalance();
        }
    }

    /// Shrink every hold proportionally so the summed magnitudes respect
    /// the budget. `used == 0` skips the division entirely.
    pub fn rebalance(&mut self) {
        let used = self.used();
        if used <= self.budget || used <= 0.0 {
            return;
        }
        let scale = self.budget / used;
        for influence in self.affects.values_mut() {
            influence.mov *= scale;
            influence.power *= scale;
        }
    }

    /// Post-rebalance absolute intensities for every held mote, in stable
    /// handle order so decisions replay identically under one seed.
    #[must_use]
    pub fn writes(&self) -> Vec<InfluenceWrite> {
        let mut writes: Vec<InfluenceWrite> = self
            .affects
            .iter()
            .map(|(&particle, &influence)| InfluenceWrite {
                particle,
                influence,
            })
            .collect();
        writes.sort_unstable_by_key(|write| write.particle);
        writes
    }
}
