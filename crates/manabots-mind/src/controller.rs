//! The per-agent planner: one graph walk and one arbitration per tick.

use manabots_core::{Decision, MindRegistry, MindRunner, Tick, WorldView};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::arbiter::Arbiter;
use crate::goal::{GoalGraph, GoalId, GoalKey};
use crate::goals::{self, HeatTables};
use crate::grip::ManaGrip;
use crate::tree::{self, WalkCtx};
use crate::{MindConfig, MindError};

/// Utility planner driving one mage.
///
/// Owns the goal graph, the budgeted grip, the arbiter, and a seeded RNG.
/// Each `think` call advances the planner clock, walks the root, and
/// resolves the collected proposals into a single [`Decision`].
#[derive(Debug, Clone)]
pub struct MindController {
    config: MindConfig,
    tables: HeatTables,
    graph: GoalGraph,
    root: GoalId,
    grip: ManaGrip,
    arbiter: Arbiter,
    rng: SmallRng,
    clock: f32,
    tick: Tick,
}

impl MindController {
    /// Registry identifier for this planner family.
    pub const KIND: &'static str = "mind.utility";

    /// Build a planner from a validated configuration. The root and its
    /// fixed coordinators exist from construction onward; the root is
    /// never torn down while the agent lives.
    pub fn new(config: MindConfig) -> Result<Self, MindError> {
        config.validate()?;
        let tables = HeatTables::new()?;
        let rng = config.seeded_rng();
        let mut graph = GoalGraph::new();
        let root = graph.adopt_root(GoalKey::root());
        goals::seed_root(&mut graph, root);
        Ok(Self {
            config,
            tables,
            graph,
            root,
            grip: ManaGrip::new(0.0),
            arbiter: Arbiter::default(),
            rng,
            clock: 0.0,
            tick: Tick::zero(),
        })
    }

    /// Replace the RNG stream, e.g. when cloning a prototype per agent.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    #[must_use]
    pub const fn config(&self) -> &MindConfig {
        &self.config
    }

    #[must_use]
    pub const fn graph(&self) -> &GoalGraph {
        &self.graph
    }

    #[must_use]
    pub const fn grip(&self) -> &ManaGrip {
        &self.grip
    }

    /// Planner ticks evaluated so far.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }
}

impl MindRunner for MindController {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn think(&mut self, view: &WorldView<'_>, dt: f32) -> Decision {
        self.tick = Tick(self.tick.0 + 1);
        self.clock += dt;
        self.arbiter.begin_tick();
        self.grip.set_budget(view.energy());

        if let Some(root) = self.graph.get_mut(self.root) {
            root.prio = self.config.attention;
            root.heat = 1.0;
            root.score = root.prio;
            root.touched = self.tick;
        }

        {
            let mut ctx = WalkCtx {
                graph: &mut self.graph,
                rng: &mut self.rng,
                arbiter: &mut self.arbiter,
                tables: &self.tables,
                config: &self.config,
                tick: self.tick,
            };
            tree::run_goal(&mut ctx, view, self.root);
        }

        let motion = self
            .arbiter
            .decide_movement(self.clock, view.pos(), &self.config);
        let (writes, releases) = self
            .arbiter
            .decide_casts(&mut self.grip, &self.graph, &self.config);

        Decision {
            motion,
            writes,
            releases,
        }
    }
}

/// Register the utility planner with a world's mind registry. The
/// prototype is validated once; each spawned mind is a clone reseeded
/// from the world RNG so agents diverge deterministically.
pub fn register_utility_mind(
    registry: &mut MindRegistry,
    config: MindConfig,
) -> Result<u64, MindError> {
    let prototype = MindController::new(config)?;
    Ok(registry.register(MindController::KIND, move |rng: &mut dyn RngCore| {
        let mut mind = prototype.clone();
        mind.reseed(rng.next_u64());
        Box::new(mind) as Box<dyn MindRunner>
    }))
}
