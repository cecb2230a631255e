//! The per-tick walk of the goal graph.
//!
//! Each executing tree node resets and redistributes priority, refreshes
//! child heat through a lottery biased toward already-urgent goals, sorts
//! and prunes by score, then delegates to at most one child picked by
//! weighted random draw. Coordinators with a spawn policy re-scan the
//! world afterwards.

use std::cmp::Reverse;

use manabots_core::{Tick, WorldView};
use ordered_float::OrderedFloat;
use rand::Rng;
use rand::rngs::SmallRng;

use crate::MindConfig;
use crate::arbiter::Arbiter;
use crate::goal::{GoalGraph, GoalId, GoalKind};
use crate::goals::{self, HeatTables};

/// Borrowed planner state threaded through one walk.
pub(crate) struct WalkCtx<'a> {
    pub graph: &'a mut GoalGraph,
    pub rng: &'a mut SmallRng,
    pub arbiter: &'a mut Arbiter,
    pub tables: &'a HeatTables,
    pub config: &'a MindConfig,
    pub tick: Tick,
}

/// Execute one goal: trees recurse, leaves propose.
pub(crate) fn run_goal(ctx: &mut WalkCtx<'_>, view: &WorldView<'_>, id: GoalId) {
    let Some(kind) = ctx.graph.get(id).map(|record| record.kind()) else {
        return;
    };
    match kind {
        GoalKind::Root | GoalKind::War | GoalKind::Harvest => run_tree(ctx, view, id),
        GoalKind::Hunt | GoalKind::Tap | GoalKind::Evade => goals::run_leaf(ctx, view, id),
    }
}

fn run_tree(ctx: &mut WalkCtx<'_>, view: &WorldView<'_>, id: GoalId) {
    let children: Vec<GoalId> = match ctx.graph.get(id) {
        Some(record) => record.subgoals.clone(),
        None => return,
    };

    // first touch this tick zeroes accumulated priority; later parents in
    // the same tick add onto the fresh value
    for &child in &children {
        if let Some(record) = ctx.graph.get_mut(child)
            && record.touched != ctx.tick
        {
            record.prio = 0.0;
            record.touched = ctx.tick;
        }
    }

    goals::distribute_priority(ctx.graph, id, ctx.config);

    // heat refresh lottery: urgent goals re-evaluate almost every tick,
    // cold ones at least at the configured floor
    for &child in &children {
        let stale = match ctx.graph.get(child) {
            Some(record) => record.heat,
            None => continue,
        };
        if ctx.rng.random::<f32>() < stale.max(ctx.config.heat_floor) {
            let heat = goals::compute_heat(ctx.graph, child, view, ctx.tables, ctx.config);
            if let Some(record) = ctx.graph.get_mut(child) {
                record.heat = heat.clamp(0.0, 1.0);
            }
        }
    }

    // score and order, newest goals last on ties
    let mut scored: Vec<(GoalId, f32)> = Vec::with_capacity(children.len());
    for &child in &children {
        if let Some(record) = ctx.graph.get_mut(child) {
            record.score = record.heat * record.prio;
            scored.push((child, record.score));
        }
    }
    scored.sort_by_key(|&(child, score)| {
        let seq = ctx.graph.get(child).map_or(u64::MAX, |record| record.seq());
        (Reverse(OrderedFloat(score)), seq)
    });
    if let Some(record) = ctx.graph.get_mut(id) {
        record.subgoals = scored.iter().map(|&(child, _)| child).collect();
    }

    let (kept, dropped) =
        partition_pruned(&scored, ctx.config.max_goals, ctx.config.max_score);
    for child in dropped {
        ctx.graph.abandon(id, child);
    }
    let total: f32 = kept.iter().map(|&(_, score)| score).sum();

    // weighted-random single winner; an empty total skips execution
    // entirely this tick
    if let Some(winner) = pick_weighted(ctx.rng, &kept, total) {
        run_goal(ctx, view, winner);
    }

    let population = ctx.graph.get(id).map_or(0, |record| record.subgoal_count());
    if population < 2 || ctx.rng.random::<f32>() < ctx.config.spawn_chance {
        goals::spawn_subgoals(ctx.graph, id, view, ctx.config);
    }
}

/// Split score-ordered children into survivors and prunees. Exceeding the
/// count bound, pushing the cumulative score past the cap, and a dead
/// score are each sufficient on their own.
pub(crate) fn partition_pruned<T: Copy>(
    scored: &[(T, f32)],
    max_goals: usize,
    max_score: f32,
) -> (Vec<(T, f32)>, Vec<T>) {
    let mut kept = Vec::with_capacity(scored.len().min(max_goals));
    let mut dropped = Vec::new();
    let mut cumulative = 0.0;
    for (index, &(child, score)) in scored.iter().enumerate() {
        cumulative += score;
        if index >= max_goals || cumulative > max_score || score <= 0.0 {
            dropped.push(child);
        } else {
            kept.push((child, score));
        }
    }
    (kept, dropped)
}

/// Weighted-random single-winner selection: walk the survivors in
/// descending score order, drawing against `score / total`, and stop at
/// the first success. Near-ties resolve probabilistically instead of
/// oscillating on floating-point argmax.
pub(crate) fn pick_weighted<T: Copy>(
    rng: &mut SmallRng,
    scored: &[(T, f32)],
    total: f32,
) -> Option<T> {
    if !(total > 0.0) {
        return None;
    }
    for &(item, score) in scored {
        if rng.random::<f32>() < score / total {
            return Some(item);
        }
    }
    None
}
