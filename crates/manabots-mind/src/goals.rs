//! Concrete goal variants: heat computation, priority policies, subgoal
//! spawning, and leaf proposal emission.
//!
//! Not every variant carries every capability: coordinators distribute
//! priority and spawn subgoals, leaves propose actions. Missing
//! capabilities are explicit no-ops rather than absence checks.

use manabots_core::{ActorKind, WorldView};

use crate::arbiter::Cast;
use crate::goal::{GoalGraph, GoalId, GoalKey, GoalKind, ScanNote};
use crate::scale::ScaleMap;
use crate::tree::WalkCtx;
use crate::{MindConfig, MindError};

/// Actor kinds a mage treats as rivals; the view already excludes self.
pub(crate) const RIVALS: &[ActorKind] = &[ActorKind::Mage, ActorKind::Beast];

const THREAT: &[(f32, f32)] = &[
    (4.0, 1.0),
    (12.0, 0.7),
    (24.0, 0.4),
    (40.0, 0.15),
    (60.0, 0.0),
];
const STRIKE: &[(f32, f32)] = &[(2.0, 1.0), (10.0, 0.8), (25.0, 0.4), (50.0, 0.1)];
const RESERVE: &[(f32, f32)] = &[(0.0, 1.0), (0.5, 0.8), (1.5, 0.3), (3.0, 0.0)];
const LURE: &[(f32, f32)] = &[(2.0, 1.0), (8.0, 0.6), (20.0, 0.2), (40.0, 0.0)];
const VIGOR: &[(f32, f32)] = &[(0.15, 1.0), (0.4, 0.7), (0.7, 0.3), (1.0, 0.0)];

/// Validated scale maps shared by every heat computation.
#[derive(Debug, Clone)]
pub(crate) struct HeatTables {
    /// Rival distance -> war urgency.
    pub threat: ScaleMap,
    /// Hunt target distance -> strike urgency.
    pub strike: ScaleMap,
    /// Local field value -> harvest urgency.
    pub reserve: ScaleMap,
    /// Mote distance -> tap urgency.
    pub lure: ScaleMap,
    /// Own health -> evasion urgency.
    pub vigor: ScaleMap,
}

impl HeatTables {
    pub fn new() -> Result<Self, MindError> {
        Ok(Self {
            threat: ScaleMap::stepped(THREAT)?,
            strike: ScaleMap::smooth(STRIKE)?,
            reserve: ScaleMap::smooth(RESERVE)?,
            lure: ScaleMap::smooth(LURE)?,
            vigor: ScaleMap::smooth(VIGOR)?,
        })
    }
}

/// Give the root its fixed coordinators. Idempotent through the cache.
pub(crate) fn seed_root(graph: &mut GoalGraph, root: GoalId) {
    let _ = graph.adopt(root, GoalKey::war());
    let _ = graph.adopt(root, GoalKey::harvest());
    let _ = graph.adopt(root, GoalKey::evade());
}

/// Urgency of one goal against the current world view. Pure: reads the
/// record and the view, mutates nothing.
pub(crate) fn compute_heat(
    graph: &GoalGraph,
    id: GoalId,
    view: &WorldView<'_>,
    tables: &HeatTables,
    config: &MindConfig,
) -> f32 {
    let Some(record) = graph.get(id) else {
        return 0.0;
    };
    match record.kind() {
        GoalKind::Root => 1.0,
        GoalKind::War => match view.nearest_actor(RIVALS, view.pos()) {
            Some((_, rival)) => tables.threat.eval((rival.pos - view.pos()).abs()),
            None => 0.0,
        },
        GoalKind::Hunt => {
            let Some(target) = record.key().target_actor() else {
                return 0.0;
            };
            let Some(rival) = view.actor(target) else {
                return 0.0;
            };
            let range = tables.strike.eval((rival.pos - view.pos()).abs());
            let frailty = 0.5 + 0.5 * (1.0 - rival.health.clamp(0.0, 1.0));
            (range * frailty).clamp(0.0, 1.0)
        }
        GoalKind::Harvest => tables.reserve.eval(view.field_value(view.pos())),
        GoalKind::Tap => {
            let Some(mote) = record.key().target_particle() else {
                return 0.0;
            };
            let Some(particle) = view.particle(mote) else {
                return 0.0;
            };
            let range = tables.lure.eval((particle.pos - view.pos()).abs());
            let charge = (particle.power / config.mote_worth).clamp(0.0, 1.0);
            (range * charge).clamp(0.0, 1.0)
        }
        GoalKind::Evade => tables.vigor.eval(view.health()),
    }
}

/// Spread one coordinator's priority into its children. Contributions add
/// onto whatever other parents granted this tick.
pub(crate) fn distribute_priority(graph: &mut GoalGraph, id: GoalId, config: &MindConfig) {
    let Some(record) = graph.get(id) else { return };
    let (kind, prio, children) = (record.kind(), record.prio, record.subgoals.clone());
    if children.is_empty() {
        return;
    }
    match kind {
        GoalKind::Root => {
            let mut war = None;
            let mut harvest = None;
            let mut evade = None;
            for &child in &children {
                match graph.get(child).map(|record| record.kind()) {
                    Some(GoalKind::War) => war = Some(child),
                    Some(GoalKind::Harvest) => harvest = Some(child),
                    Some(GoalKind::Evade) => evade = Some(child),
                    _ => {}
                }
            }
            match (war, harvest) {
                (Some(w), Some(h)) => {
                    let war_heat = graph.get(w).map_or(0.0, |r| r.heat);
                    let harvest_heat = graph.get(h).map_or(0.0, |r| r.heat);
                    let (hot, cold) = if war_heat >= harvest_heat { (w, h) } else { (h, w) };
                    add_prio(graph, hot, prio * config.primary_share);
                    add_prio(graph, cold, prio * (1.0 - config.primary_share));
                }
                (Some(only), None) | (None, Some(only)) => add_prio(graph, only, prio),
                (None, None) => {}
            }
            // evasion draws attention in proportion to its own urgency
            if let Some(e) = evade {
                let urgency = graph.get(e).map_or(0.0, |r| r.heat);
                add_prio(graph, e, prio * urgency);
            }
        }
        GoalKind::War | GoalKind::Harvest => {
            let heat_sum: f32 = children
                .iter()
                .filter_map(|&child| graph.get(child))
                .map(|record| record.heat)
                .sum();
            if heat_sum > 0.0 {
                for &child in &children {
                    let heat = graph.get(child).map_or(0.0, |r| r.heat);
                    add_prio(graph, child, prio * heat / heat_sum);
                }
            } else {
                let share = prio / children.len() as f32;
                for &child in &children {
                    add_prio(graph, child, share);
                }
            }
        }
        GoalKind::Hunt | GoalKind::Tap | GoalKind::Evade => {}
    }
}

fn add_prio(graph: &mut GoalGraph, id: GoalId, amount: f32) {
    if let Some(record) = graph.get_mut(id) {
        record.prio += amount;
    }
}

/// Scan the world and adopt missing subgoals; the cache deduplicates
/// anything already targeted.
pub(crate) fn spawn_subgoals(
    graph: &mut GoalGraph,
    id: GoalId,
    view: &WorldView<'_>,
    config: &MindConfig,
) {
    let Some(kind) = graph.get(id).map(|record| record.kind()) else {
        return;
    };
    let x = view.pos();
    match kind {
        GoalKind::Root => seed_root(graph, id),
        GoalKind::War => {
            for (rival, _) in view.actors_in(RIVALS, x - config.scan_radius, x + config.scan_radius)
            {
                let _ = graph.adopt(id, GoalKey::hunt(rival));
            }
        }
        GoalKind::Harvest => {
            for (mote, _) in view.particles_in(x - config.scan_radius, x + config.scan_radius) {
                let _ = graph.adopt(id, GoalKey::tap(mote));
            }
        }
        GoalKind::Hunt | GoalKind::Tap | GoalKind::Evade => {}
    }
}

/// Execute one leaf: compute the desired action and emit it through the
/// arbiter's proposal API. Leaves never mutate the world directly.
pub(crate) fn run_leaf(ctx: &mut WalkCtx<'_>, view: &WorldView<'_>, id: GoalId) {
    let Some(record) = ctx.graph.get(id) else { return };
    let (kind, score) = (record.kind(), record.score);
    match kind {
        GoalKind::Hunt => hunt_update(ctx, view, id, score),
        GoalKind::Tap => tap_update(ctx, view, id, score),
        GoalKind::Evade => evade_update(ctx, view, id, score),
        GoalKind::Root | GoalKind::War | GoalKind::Harvest => {}
    }
}

fn hunt_update(ctx: &mut WalkCtx<'_>, view: &WorldView<'_>, id: GoalId, score: f32) {
    let Some(target) = ctx.graph.get(id).and_then(|r| r.key().target_actor()) else {
        return;
    };
    let Some(rival) = view.actor(target) else {
        return;
    };
    let me = view.pos();
    let desired = if me <= rival.pos {
        rival.pos - ctx.config.standoff
    } else {
        rival.pos + ctx.config.standoff
    };
    ctx.arbiter.propose_move(id, score, desired);

    // drive a nearby mote onto the target, charged up
    if let Some(mote) = cached_mote(ctx, view, id, rival.pos)
        && let Some(particle) = view.particle(mote)
    {
        let push = (rival.pos - particle.pos).signum() * ctx.config.cast_gain;
        ctx.arbiter.propose_cast(
            id,
            score,
            Cast {
                particle: mote,
                d_mov: push,
                d_power: ctx.config.surge_gain,
            },
        );
    }
}

fn tap_update(ctx: &mut WalkCtx<'_>, view: &WorldView<'_>, id: GoalId, score: f32) {
    let Some(mote) = ctx.graph.get(id).and_then(|r| r.key().target_particle()) else {
        return;
    };
    let Some(particle) = view.particle(mote) else {
        return;
    };
    let me = view.pos();
    if (particle.pos - me).abs() > ctx.config.tap_reach {
        ctx.arbiter.propose_move(id, score, particle.pos);
    }
    let pull = (me - particle.pos).signum() * ctx.config.pull_gain;
    ctx.arbiter.propose_cast(
        id,
        score,
        Cast {
            particle: mote,
            d_mov: pull,
            d_power: ctx.config.spark_gain,
        },
    );
}

fn evade_update(ctx: &mut WalkCtx<'_>, view: &WorldView<'_>, id: GoalId, score: f32) {
    let me = view.pos();
    let Some(rival_pos) = cached_rival(ctx, view, id) else {
        return;
    };
    let away = if rival_pos >= me {
        me - ctx.config.flee_distance
    } else {
        me + ctx.config.flee_distance
    };
    ctx.arbiter.propose_move(id, score, away);
}

/// Mote scan for a hunt, cached for `scan_ttl` planner ticks.
fn cached_mote(
    ctx: &mut WalkCtx<'_>,
    view: &WorldView<'_>,
    id: GoalId,
    near: f32,
) -> Option<manabots_core::ParticleId> {
    if let Some(record) = ctx.graph.get(id)
        && let Some(note) = &record.scan
        && ctx.tick.0.saturating_sub(note.at.0) < ctx.config.scan_ttl
        && note.mote.is_some_and(|mote| view.particle(mote).is_some())
    {
        return note.mote;
    }
    let found = view.nearest_particle(near).map(|(mote, _)| mote);
    if let Some(record) = ctx.graph.get_mut(id) {
        record.scan = Some(ScanNote {
            at: ctx.tick,
            enemy: None,
            mote: found,
        });
    }
    found
}

/// Nearest-rival scan for evasion, cached for `scan_ttl` planner ticks.
fn cached_rival(ctx: &mut WalkCtx<'_>, view: &WorldView<'_>, id: GoalId) -> Option<f32> {
    if let Some(record) = ctx.graph.get(id)
        && let Some(note) = &record.scan
        && ctx.tick.0.saturating_sub(note.at.0) < ctx.config.scan_ttl
    {
        return note.enemy;
    }
    let found = view
        .nearest_actor(RIVALS, view.pos())
        .map(|(_, rival)| rival.pos);
    if let Some(record) = ctx.graph.get_mut(id) {
        record.scan = Some(ScanNote {
            at: ctx.tick,
            enemy: found,
            mote: None,
        });
    }
    found
}
