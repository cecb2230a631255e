//! Per-tick proposal collection and conflict resolution.
//!
//! Leaves executed during the graph walk append movement and cast
//! proposals; after the walk completes, arbitration picks one movement
//! winner under hysteresis and pushes the top casts through the grip.

use std::collections::HashMap;

use manabots_core::{InfluenceWrite, Motion, ParticleId};
use smallvec::SmallVec;

use crate::MindConfig;
use crate::goal::{GoalGraph, GoalId};
use crate::grip::ManaGrip;

/// A requested mote action: signed deltas composed through the grip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cast {
    pub particle: ParticleId,
    pub d_mov: f32,
    pub d_power: f32,
}

#[derive(Debug, Clone, Copy)]
struct MoveProposal {
    goal: GoalId,
    score: f32,
    target: f32,
}

#[derive(Debug, Clone, Copy)]
struct CastProposal {
    goal: GoalId,
    score: f32,
    cast: Cast,
}

/// The movement decision currently being steered toward.
#[derive(Debug, Clone, Copy)]
struct Commitment {
    goal: GoalId,
    target: f32,
    score: f32,
    at: f32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Arbiter {
    moves: Vec<MoveProposal>,
    casts: Vec<CastProposal>,
    committed: Option<Commitment>,
    /// Which goals last drove each held mote; bookkeeping only.
    influencers: HashMap<ParticleId, SmallVec<[GoalId; 2]>>,
}

impl Arbiter {
    /// Reset the proposal buffers; runs before every graph walk.
    pub fn begin_tick(&mut self) {
        self.moves.clear();
        self.casts.clear();
    }

    pub fn propose_move(&mut self, goal: GoalId, score: f32, target: f32) {
        self.moves.push(MoveProposal {
            goal,
            score,
            target,
        });
    }

    pub fn propose_cast(&mut self, goal: GoalId, score: f32, cast: Cast) {
        self.casts.push(CastProposal { goal, score, cast });
    }

    /// Goals recorded as actively influencing `particle`.
    #[cfg(test)]
    pub fn influencers_of(&self, particle: ParticleId) -> &[GoalId] {
        self.influencers
            .get(&particle)
            .map_or(&[], SmallVec::as_slice)
    }

    /// Resolve this tick's movement proposals into a command.
    ///
    /// The incumbent keeps steering until a challenger beats its score by
    /// the hold margin or the commitment goes stale; silence longer than
    /// the grace period stops the agent and clears the commitment.
    pub fn decide_movement(&mut self, now: f32, pos: f32, config: &MindConfig) -> Option<Motion> {
        if self.moves.is_empty() {
            return match self.committed {
                Some(commitment) if now - commitment.at > config.grace_time => {
                    tracing::debug!(goal = ?commitment.goal, "movement grace expired, stopping");
                    self.committed = None;
                    Some(Motion::Stop)
                }
                Some(commitment) => Some(steer(pos, commitment.target, config.arrive_radius)),
                None => None,
            };
        }

        self.moves.sort_by(|a, b| b.score.total_cmp(&a.score));
        let best = self.moves[0];
        let displace = match self.committed {
            None => true,
            Some(commitment) if commitment.goal == best.goal => true,
            Some(commitment) => {
                best.score > commitment.score * config.hold_margin
                    || now - commitment.at > config.hold_time
            }
        };
        if displace {
            tracing::debug!(
                goal = ?best.goal,
                score = best.score,
                target = best.target,
                "movement committed"
            );
            self.committed = Some(Commitment {
                goal: best.goal,
                target: best.target,
                score: best.score,
                at: now,
            });
        }
        self.committed
            .map(|commitment| steer(pos, commitment.target, config.arrive_radius))
    }

    /// Resolve this tick's cast proposals: the top `cast_cap` by score are
    /// pushed through the grip, idle holds are let go, and stale influence
    /// notes are garbage-collected.
    pub fn decide_casts(
        &mut self,
        grip: &mut ManaGrip,
        graph: &GoalGraph,
        config: &MindConfig,
    ) -> (Vec<InfluenceWrite>, Vec<ParticleId>) {
        self.casts.sort_by(|a, b| b.score.total_cmp(&a.score));
        let winners = self.casts.len().min(config.cast_cap);
        for proposal in &self.casts[..winners] {
            let cast = proposal.cast;
            grip.capture(cast.particle);
            let note = self.influencers.entry(cast.particle).or_default();
            if !note.contains(&proposal.goal) {
                note.push(proposal.goal);
            }
            grip.nudge_move(cast.particle, cast.d_mov);
            grip.nudge_power(cast.particle, cast.d_power);
            tracing::trace!(
                goal = ?proposal.goal,
                particle = ?cast.particle,
                d_mov = cast.d_mov,
                d_power = cast.d_power,
                "cast applied"
            );
        }

        let released = grip.release_idle(config.release_threshold);
        for id in &released {
            self.influencers.remove(id);
        }
        // forget notes whose goals died or whose mote is no longer held
        self.influencers.retain(|particle, goals| {
            goals.retain(|goal| graph.contains(*goal));
            grip.is_held(*particle) && !goals.is_empty()
        });

        (grip.writes(), released)
    }
}

fn steer(pos: f32, target: f32, arrive_radius: f32) -> Motion {
    if (target - pos).abs() < arrive_radius {
        Motion::Stop
    } else if target > pos {
        Motion::Right
    } else {
        Motion::Left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalKey;
    use manabots_core::{ActorData, WorldConfig, WorldState};

    fn config() -> MindConfig {
        MindConfig::default()
    }

    fn goals(count: usize) -> (GoalGraph, Vec<GoalId>) {
        let mut graph = GoalGraph::new();
        let root = graph.adopt_root(GoalKey::root());
        let mut world = WorldState::new(WorldConfig::default()).expect("world");
        let ids = (0..count)
            .map(|i| {
                let actor = world.spawn_actor(ActorData::mage(i as f32));
                graph.adopt(root, GoalKey::hunt(actor)).expect("adopt")
            })
            .collect();
        (graph, ids)
    }

    fn motes(count: usize) -> (WorldState, Vec<ParticleId>) {
        let mut world = WorldState::new(WorldConfig::default()).expect("world");
        let ids = (0..count)
            .map(|i| world.spawn_particle(10.0 + i as f32, 0.5))
            .collect();
        (world, ids)
    }

    #[test]
    fn best_proposal_wins_an_open_field() {
        let (_graph, ids) = goals(2);
        let mut arbiter = Arbiter::default();
        arbiter.begin_tick();
        arbiter.propose_move(ids[0], 2.0, 50.0);
        arbiter.propose_move(ids[1], 7.0, -50.0);
        let motion = arbiter.decide_movement(0.0, 0.0, &config());
        assert_eq!(motion, Some(Motion::Left), "higher score steers left");
    }

    #[test]
    fn marginal_challenger_cannot_displace_a_fresh_commitment() {
        let (_graph, ids) = goals(2);
        let mut arbiter = Arbiter::default();
        arbiter.begin_tick();
        arbiter.propose_move(ids[0], 5.0, 80.0);
        assert_eq!(arbiter.decide_movement(0.0, 0.0, &config()), Some(Motion::Right));

        // 5.1 at t=0.3: not past the margin, commitment not yet stale
        arbiter.begin_tick();
        arbiter.propose_move(ids[1], 5.1, -80.0);
        let motion = arbiter.decide_movement(0.3, 0.0, &config());
        assert_eq!(motion, Some(Motion::Right), "incumbent target still drives");

        // the same challenger after the hold window must displace
        arbiter.begin_tick();
        arbiter.propose_move(ids[1], 5.1, -80.0);
        let motion = arbiter.decide_movement(1.1, 0.0, &config());
        assert_eq!(motion, Some(Motion::Left));
    }

    #[test]
    fn decisive_challenger_displaces_immediately() {
        let (_graph, ids) = goals(2);
        let mut arbiter = Arbiter::default();
        arbiter.begin_tick();
        arbiter.propose_move(ids[0], 5.0, 80.0);
        arbiter.decide_movement(0.0, 0.0, &config());

        arbiter.begin_tick();
        arbiter.propose_move(ids[1], 6.0, -80.0);
        let motion = arbiter.decide_movement(0.1, 0.0, &config());
        assert_eq!(motion, Some(Motion::Left), "6.0 clears the 10% margin over 5.0");
    }

    #[test]
    fn incumbent_refreshes_its_own_commitment() {
        let (_graph, ids) = goals(1);
        let mut arbiter = Arbiter::default();
        arbiter.begin_tick();
        arbiter.propose_move(ids[0], 5.0, 80.0);
        arbiter.decide_movement(0.0, 0.0, &config());

        arbiter.begin_tick();
        arbiter.propose_move(ids[0], 3.0, 40.0);
        let motion = arbiter.decide_movement(0.5, 0.0, &config());
        assert_eq!(motion, Some(Motion::Right));
    }

    #[test]
    fn silence_past_the_grace_period_stops_the_agent() {
        let (_graph, ids) = goals(1);
        let mut arbiter = Arbiter::default();
        arbiter.begin_tick();
        arbiter.propose_move(ids[0], 5.0, 80.0);
        arbiter.decide_movement(0.0, 0.0, &config());

        // within grace: keep steering toward the committed target
        arbiter.begin_tick();
        assert_eq!(arbiter.decide_movement(1.5, 0.0, &config()), Some(Motion::Right));

        // past grace: stop and clear
        arbiter.begin_tick();
        assert_eq!(arbiter.decide_movement(2.6, 0.0, &config()), Some(Motion::Stop));
        arbiter.begin_tick();
        assert_eq!(arbiter.decide_movement(2.7, 0.0, &config()), None);
    }

    #[test]
    fn arrival_inside_the_radius_stops() {
        let (_graph, ids) = goals(1);
        let mut arbiter = Arbiter::default();
        arbiter.begin_tick();
        arbiter.propose_move(ids[0], 5.0, 10.4);
        let motion = arbiter.decide_movement(0.0, 10.0, &config());
        assert_eq!(motion, Some(Motion::Stop));
    }

    #[test]
    fn only_the_top_two_casts_are_applied() {
        let (graph, ids) = goals(5);
        let (_world, mote_ids) = motes(5);
        let mut grip = ManaGrip::new(100.0);
        let mut arbiter = Arbiter::default();
        arbiter.begin_tick();
        for (i, (&goal, &mote)) in ids.iter().zip(&mote_ids).enumerate() {
            arbiter.propose_cast(
                goal,
                i as f32 + 1.0,
                Cast {
                    particle: mote,
                    d_mov: 1.0,
                    d_power: 1.0,
                },
            );
        }
        let (writes, released) = arbiter.decide_casts(&mut grip, &graph, &config());
        assert!(released.is_empty());
        assert_eq!(writes.len(), 2, "hard concurrency cap");
        assert_eq!(grip.held_count(), 2);
        assert!(grip.is_held(mote_ids[4]), "highest score cast first");
        assert!(grip.is_held(mote_ids[3]));
        assert!(!grip.is_held(mote_ids[0]));
    }

    #[test]
    fn faded_holds_are_released_and_notes_collected() {
        let (graph, ids) = goals(1);
        let (_world, mote_ids) = motes(1);
        let mut grip = ManaGrip::new(100.0);
        let mut arbiter = Arbiter::default();

        arbiter.begin_tick();
        arbiter.propose_cast(
            ids[0],
            5.0,
            Cast {
                particle: mote_ids[0],
                d_mov: 0.05,
                d_power: 0.01,
            },
        );
        let (writes, released) = arbiter.decide_casts(&mut grip, &graph, &config());
        assert!(writes.is_empty(), "released holds emit no writes");
        assert_eq!(released, vec![mote_ids[0]]);
        assert!(arbiter.influencers_of(mote_ids[0]).is_empty());
    }

    #[test]
    fn notes_for_dead_goals_are_collected() {
        let (mut graph, ids) = goals(1);
        let (_world, mote_ids) = motes(1);
        let mut grip = ManaGrip::new(100.0);
        let mut arbiter = Arbiter::default();

        arbiter.begin_tick();
        arbiter.propose_cast(
            ids[0],
            5.0,
            Cast {
                particle: mote_ids[0],
                d_mov: 2.0,
                d_power: 1.0,
            },
        );
        arbiter.decide_casts(&mut grip, &graph, &config());
        assert_eq!(arbiter.influencers_of(mote_ids[0]), &[ids[0]]);

        // the proposing goal dies; its note must vanish on the next sweep
        let root = graph.lookup(&GoalKey::root()).expect("root");
        graph.abandon(root, ids[0]);
        arbiter.begin_tick();
        arbiter.decide_casts(&mut grip, &graph, &config());
        assert!(arbiter.influencers_of(mote_ids[0]).is_empty());
        assert!(grip.is_held(mote_ids[0]), "the hold itself is kept");
    }
}
