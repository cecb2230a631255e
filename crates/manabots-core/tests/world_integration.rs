use manabots_core::{
    ActorData, ActorKind, Decision, Influence, InfluenceWrite, Motion, MindRunner, Tick,
    WorldConfig, WorldState, WorldView,
};

fn quiet_config(seed: u64) -> WorldConfig {
    WorldConfig {
        world_width: 200.0,
        rng_seed: Some(seed),
        ..WorldConfig::default()
    }
}

#[test]
fn seeded_world_advances_deterministically() {
    let build = || {
        let mut world = WorldState::new(quiet_config(0xDEAD_BEEF)).expect("world");
        world.spawn_actor(ActorData::beast(40.0));
        world.spawn_actor(ActorData::beast(120.0));
        world.spawn_particle(60.0, 1.0);
        world.spawn_particle(150.0, 0.4);
        world
    };

    let mut world_a = build();
    let mut world_b = build();
    for _ in 0..64 {
        world_a.step(0.1);
        world_b.step(0.1);
    }

    assert_eq!(world_a.tick(), Tick(64));
    assert_eq!(world_b.tick(), Tick(64));
    let last_a = world_a.history().back().expect("summary");
    let last_b = world_b.history().back().expect("summary");
    assert_eq!(last_a, last_b);

    let beasts_a = world_a.actors_in(&[ActorKind::Beast], 0.0, 200.0);
    let beasts_b = world_b.actors_in(&[ActorKind::Beast], 0.0, 200.0);
    assert_eq!(beasts_a.len(), beasts_b.len());
    for ((_, a), (_, b)) in beasts_a.iter().zip(&beasts_b) {
        assert_eq!(a.pos, b.pos);
    }
}

#[test]
fn registry_executes_custom_mind() {
    struct Seeker;

    impl MindRunner for Seeker {
        fn kind(&self) -> &'static str {
            "test.seeker"
        }

        fn think(&mut self, view: &WorldView<'_>, _dt: f32) -> Decision {
            let motion = view.nearest_particle(view.pos()).map(|(_, mote)| {
                if mote.pos > view.pos() {
                    Motion::Right
                } else {
                    Motion::Left
                }
            });
            Decision {
                motion,
                ..Decision::default()
            }
        }
    }

    let mut world = WorldState::new(quiet_config(7)).expect("world");
    let key = world.registry_mut().register("test.seeker", |_rng| Box::new(Seeker));
    let mage = world.spawn_actor(ActorData::mage(20.0));
    let mote = world.spawn_particle(80.0, 1.0);
    assert!(world.bind_actor_mind(mage, key));
    assert_eq!(
        world.actor_runtime(mage).and_then(|r| r.mind.kind()),
        Some("test.seeker")
    );

    let start_gap = (world.actor(mage).expect("mage").pos
        - world.particle(mote).expect("mote").pos)
        .abs();
    for _ in 0..20 {
        world.step(0.1);
    }
    let end_gap = (world.actor(mage).expect("mage").pos
        - world.particle(mote).expect("mote").pos)
        .abs();
    assert!(end_gap < start_gap, "seeker must close on the mote");
}

#[test]
fn influences_from_two_casters_aggregate_and_release() {
    struct Pusher {
        mov: f32,
    }

    impl MindRunner for Pusher {
        fn kind(&self) -> &'static str {
            "test.pusher"
        }

        fn think(&mut self, view: &WorldView<'_>, _dt: f32) -> Decision {
            let Some((mote, _)) = view.nearest_particle(view.pos()) else {
                return Decision::default();
            };
            Decision {
                motion: None,
                writes: vec![InfluenceWrite {
                    particle: mote,
                    influence: Influence {
                        mov: self.mov,
                        power: 0.5,
                    },
                }],
                releases: Vec::new(),
            }
        }
    }

    let mut world = WorldState::new(quiet_config(3)).expect("world");
    let left = world.spawn_actor(ActorData::mage(40.0));
    let right = world.spawn_actor(ActorData::mage(60.0));
    let mote = world.spawn_particle(50.0, 0.5);
    world.attach_mind(left, Box::new(Pusher { mov: 2.0 }));
    world.attach_mind(right, Box::new(Pusher { mov: -1.5 }));

    world.step(0.1);
    let particle = world.particle(mote).expect("mote");
    assert_eq!(particle.influences.len(), 2);
    let total: f32 = particle.influences.values().map(|i| i.mov).sum();
    assert!((total - 0.5).abs() < 1e-5, "influences sum additively");

    // a caster that dies must be forgotten by the mote
    world.remove_actor(left);
    let particle = world.particle(mote).expect("mote");
    assert_eq!(particle.influences.len(), 1);
    assert!(particle.influences.contains_key(&right));
}

#[test]
fn sustained_field_exposure_burns_actors_down() {
    let mut world = WorldState::new(WorldConfig {
        world_width: 100.0,
        burn_threshold: 0.0,
        burn_rate: 10.0,
        power_relax: 0.0,
        mote_spawn_interval: 0,
        rng_seed: Some(2),
        ..WorldConfig::default()
    })
    .expect("world");
    let victim = world.spawn_actor(ActorData::beast(50.0));
    world.spawn_particle(50.0, 4.0);

    let mut observed_death = false;
    for _ in 0..40 {
        let events = world.step(0.1);
        if events.deaths > 0 {
            observed_death = true;
            break;
        }
    }
    assert!(observed_death, "standing in a hot field must be lethal");
    assert!(world.actor(victim).is_none());
    assert_eq!(world.actor_count(), 0);
}

#[test]
fn history_ring_is_bounded() {
    let mut world = WorldState::new(WorldConfig {
        history_capacity: 8,
        mote_spawn_interval: 0,
        rng_seed: Some(5),
        ..WorldConfig::default()
    })
    .expect("world");
    for _ in 0..32 {
        world.step(0.1);
    }
    assert_eq!(world.history().len(), 8);
    assert_eq!(world.history().back().expect("summary").tick, Tick(32));
    assert_eq!(world.history().front().expect("summary").tick, Tick(25));
}

#[test]
fn mote_respawns_honor_interval_and_cap() {
    let mut world = WorldState::new(WorldConfig {
        mote_spawn_interval: 4,
        mote_cap: 2,
        rng_seed: Some(9),
        ..WorldConfig::default()
    })
    .expect("world");
    assert_eq!(world.particle_count(), 0);

    let mut spawned = 0;
    for _ in 0..16 {
        if world.step(0.1).mote_spawned.is_some() {
            spawned += 1;
        }
    }
    assert_eq!(spawned, 2, "cap must stop further respawns");
    assert_eq!(world.particle_count(), 2);
}
