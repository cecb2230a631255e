//! Goal records, the signature cache, and shared-ownership teardown.
//!
//! Goals form a DAG, not a tree: two coordinators requesting the same
//! `(kind, args)` signature share one physical record whose priority
//! accumulates both demands. A record lives as long as at least one
//! parent references it; abandoning the last parent removes it from the
//! cache and recursively releases its own subgoals.

use std::collections::HashMap;

use manabots_core::{ActorId, ParticleId, Tick};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

new_key_type! {
    /// Stable handle for goal records.
    pub struct GoalId;
}

/// Behavioural identity of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoalKind {
    /// The fixed top of the graph; coordinates war, harvest, and evasion.
    Root,
    /// Coordinator spawning one hunt per visible rival.
    War,
    /// Leaf chasing a specific rival with movement and mote strikes.
    Hunt,
    /// Coordinator spawning one tap per nearby mote.
    Harvest,
    /// Leaf pulling a specific mote toward the agent.
    Tap,
    /// Leaf retreating from the nearest rival when health is low.
    Evade,
}

/// Normalized constructor argument; compares by stable handle, never by
/// structural actor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoalArg {
    Actor(ActorId),
    Particle(ParticleId),
}

/// Cache signature: kind plus the ordered argument tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GoalKey {
    kind: GoalKind,
    args: SmallVec<[GoalArg; 1]>,
}

impl GoalKey {
    #[must_use]
    pub fn root() -> Self {
        Self {
            kind: GoalKind::Root,
            args: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn war() -> Self {
        Self {
            kind: GoalKind::War,
            args: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn harvest() -> Self {
        Self {
            kind: GoalKind::Harvest,
            args: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn evade() -> Self {
        Self {
            kind: GoalKind::Evade,
            args: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn hunt(target: ActorId) -> Self {
        Self {
            kind: GoalKind::Hunt,
            args: SmallVec::from_slice(&[GoalArg::Actor(target)]),
        }
    }

    #[must_use]
    pub fn tap(mote: ParticleId) -> Self {
        Self {
            kind: GoalKind::Tap,
            args: SmallVec::from_slice(&[GoalArg::Particle(mote)]),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> GoalKind {
        self.kind
    }

    /// The actor argument, for kinds constructed around one.
    #[must_use]
    pub fn target_actor(&self) -> Option<ActorId> {
        self.args.iter().find_map(|arg| match arg {
            GoalArg::Actor(id) => Some(*id),
            GoalArg::Particle(_) => None,
        })
    }

    /// The mote argument, for kinds constructed around one.
    #[must_use]
    pub fn target_particle(&self) -> Option<ParticleId> {
        self.args.iter().find_map(|arg| match arg {
            GoalArg::Particle(id) => Some(*id),
            GoalArg::Actor(_) => None,
        })
    }
}

/// Most-recent world scan kept by a leaf between refreshes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanNote {
    pub at: Tick,
    pub enemy: Option<f32>,
    pub mote: Option<ParticleId>,
}

/// One node of the goal graph.
#[derive(Debug, Clone)]
pub struct GoalRecord {
    key: GoalKey,
    seq: u64,
    /// Urgency in `[0, 1]`; 0 means fully satisfied.
    pub heat: f32,
    /// Attention assigned this tick; additive across activating parents.
    pub prio: f32,
    /// `heat * prio`, the arbitration currency.
    pub score: f32,
    /// Planner tick at which `prio` was last reset.
    pub(crate) touched: Tick,
    parents: SmallVec<[GoalId; 2]>,
    /// Children, sorted by descending score after each walk of this node.
    pub(crate) subgoals: Vec<GoalId>,
    pub(crate) scan: Option<ScanNote>,
}

impl GoalRecord {
    fn new(key: GoalKey, seq: u64) -> Self {
        Self {
            key,
            seq,
            // fresh goals start maximally hot so the refresh lottery
            // evaluates them on first touch
            heat: 1.0,
            prio: 0.0,
            score: 0.0,
            touched: Tick::zero(),
            parents: SmallVec::new(),
            subgoals: Vec::new(),
            scan: None,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &GoalKey {
        &self.key
    }

    #[must_use]
    pub const fn kind(&self) -> GoalKind {
        self.key.kind()
    }

    /// Creation-order id; monotonic, never reused.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    #[must_use]
    pub fn subgoal_count(&self) -> usize {
        self.subgoals.len()
    }
}

/// Arena plus signature cache for one agent's goal graph.
#[derive(Debug, Clone, Default)]
pub struct GoalGraph {
    records: SlotMap<GoalId, GoalRecord>,
    cache: HashMap<GoalKey, GoalId>,
    next_seq: u64,
}

impl GoalGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: GoalId) -> bool {
        self.records.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: GoalId) -> Option<&GoalRecord> {
        self.records.get(id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: GoalId) -> Option<&mut GoalRecord> {
        self.records.get_mut(id)
    }

    /// Resolve a signature to its live record, if cached.
    #[must_use]
    pub fn lookup(&self, key: &GoalKey) -> Option<GoalId> {
        self.cache.get(key).copied()
    }

    /// Create a parentless goal. Used once, for the root, which is never
    /// abandoned while the agent lives.
    pub fn adopt_root(&mut self, key: GoalKey) -> GoalId {
        match self.cache.get(&key) {
            Some(&id) => id,
            None => self.alloc(key),
        }
    }

    /// Resolve `key` through the cache (allocating on miss) and link it
    /// under `parent`. Linking an already-linked pair is a no-op, so the
    /// same child may be requested every tick. Returns `None` only when
    /// `parent` itself is gone.
    pub fn adopt(&mut self, parent: GoalId, key: GoalKey) -> Option<GoalId> {
        if !self.records.contains_key(parent) {
            return None;
        }
        let child = match self.cache.get(&key) {
            Some(&id) => id,
            None => self.alloc(key),
        };
        if child == parent {
            return Some(child);
        }
        let record = self.records.get_mut(child)?;
        if !record.parents.contains(&parent) {
            record.parents.push(parent);
        }
        let parent_record = self.records.get_mut(parent)?;
        if !parent_record.subgoals.contains(&child) {
            parent_record.subgoals.push(child);
        }
        Some(child)
    }

    /// Unlink `child` from `parent`; the record is destroyed exactly when
    /// its last parent lets go, cascading through its own subgoals.
    pub fn abandon(&mut self, parent: GoalId, child: GoalId) {
        if let Some(parent_record) = self.records.get_mut(parent) {
            parent_record.subgoals.retain(|&g| g != child);
        }
        self.unlink(child, parent);
    }

    fn alloc(&mut self, key: GoalKey) -> GoalId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = self.records.insert(GoalRecord::new(key.clone(), seq));
        self.cache.insert(key, id);
        tracing::trace!(goal = ?id, seq, "goal created");
        id
    }

    fn unlink(&mut self, child: GoalId, parent: GoalId) {
        let orphaned = match self.records.get_mut(child) {
            Some(record) => {
                record.parents.retain(|p| *p != parent);
                record.parents.is_empty()
            }
            None => false,
        };
        if orphaned {
            self.drop_orphan(child);
        }
    }

    fn drop_orphan(&mut self, id: GoalId) {
        let Some(record) = self.records.remove(id) else {
            return;
        };
        self.cache.remove(&record.key);
        tracing::trace!(goal = ?id, seq = record.seq, "goal destroyed");
        for sub in record.subgoals {
            self.unlink(sub, id);
        }
    }
}
