//! Episode lifecycle, collisions and multi-simulation registration

use intersection_sim::simulation::{
    EnvironmentPool, EpisodeStatus, LaneId, Position, SimConfig, SimWorld, SimulationId,
    StatsAggregator, TerminationReason, VehicleState, OBSERVATION_SIZE,
};

/// A world whose spawner never produces vehicles
fn quiet_config(seed: u64) -> SimConfig {
    let mut config = SimConfig::with_seed(seed);
    config.spawner.max_vehicles = 0;
    config
}

fn run_until_ended(world: &mut SimWorld, max_ticks: usize) {
    let delta = world.config.tick_delta;
    for _ in 0..max_ticks {
        if !world.is_running() {
            break;
        }
        world.tick(delta);
    }
}

#[test]
fn test_world_starts_idle() {
    let mut world = SimWorld::new(SimConfig::with_seed(1)).unwrap();
    assert_eq!(world.controller().status(), EpisodeStatus::NotStarted);
    world.tick(0.05);
    assert_eq!(world.time, 0.0);
    assert!(world.vehicles.is_empty());
}

#[test]
fn test_inactivity_ends_episode_once() {
    let mut config = quiet_config(1);
    config.controller.max_inactivity_time = 40.0;
    config.controller.decision_interval = 5.0;
    let mut world = SimWorld::new(config).unwrap();

    world.begin_episode();
    run_until_ended(&mut world, 10_000);

    assert_eq!(
        world.controller().status(),
        EpisodeStatus::Ended(TerminationReason::Inactivity)
    );
    let summary = world.last_summary().cloned().unwrap();
    assert_eq!(summary.reason, TerminationReason::Inactivity);
    assert_eq!(summary.inactivity_penalties, 1);
    assert!(summary.duration > 40.0 && summary.duration < 41.0);
    assert!(summary.decisions >= 7);
    assert!(summary.no_accident_bonus);
    let weights = world.controller().weights().clone();
    let expected_terminal = -weights.inactivity_penalty + weights.no_accident_bonus;
    assert!((summary.terminal_reward - expected_terminal).abs() < 1e-5);

    // Further ticks leave the ended episode alone
    let reward = world.controller().ledger().cumulative_reward;
    let time = world.time;
    for _ in 0..200 {
        world.tick(0.05);
    }
    assert_eq!(world.time, time);
    assert_eq!(world.controller().ledger().inactivity_penalties, 1);
    assert_eq!(world.controller().ledger().cumulative_reward, reward);
    assert!(world.end_episode(TerminationReason::Inactivity).is_none());
}

#[test]
fn test_time_limit_grants_bonus() {
    let mut config = SimConfig::with_seed(5);
    config.controller.max_episode_time = 10.0;
    let mut world = SimWorld::new(config).unwrap();

    let summary = world.run_episode().unwrap();
    assert_eq!(summary.reason, TerminationReason::TimeLimit);
    assert_eq!(summary.inactivity_penalties, 0);

    let weights = world.controller().weights().clone();
    let mut expected = weights.time_limit_bonus;
    if summary.no_accident_bonus {
        expected += weights.no_accident_bonus;
    }
    assert!((summary.terminal_reward - expected).abs() < 1e-5);
    assert_eq!(summary.no_accident_bonus, summary.accidents == 0);
}

#[test]
fn test_crossing_vehicles_collide() {
    let mut world = SimWorld::new(quiet_config(2)).unwrap();
    world.begin_episode();

    let a = world.spawn_vehicle_at(LaneId::North, Position::planar(-6.0, 6.0), None);
    let b = world.spawn_vehicle_at(LaneId::East, Position::planar(-5.0, 6.0), None);
    assert_eq!(world.stats().current_vehicle_count(), 2);

    world.tick(0.05);

    assert_eq!(world.vehicle(a).unwrap().state, VehicleState::Crashed);
    assert_eq!(world.vehicle(b).unwrap().state, VehicleState::Crashed);
    assert_eq!(world.stats().accidents(), 2);
    assert_eq!(world.stats().cars_on_lane(LaneId::North), 0);
    assert_eq!(world.stats().cars_on_lane(LaneId::East), 0);
    assert_eq!(world.stats().current_vehicle_count(), 0);
    assert_eq!(world.stats().cars_in_intersection(), 0);
    assert!(world.metrics().accidents >= 1);

    // Crashed vehicles stay in the scene until the removal delay passes
    let ticks = (world.config.vehicle.removal_delay / 0.05) as usize + 2;
    for _ in 0..ticks {
        world.tick(0.05);
    }
    assert!(world.vehicle(a).is_none());
    assert!(world.vehicle(b).is_none());

    let summary = world.end_episode(TerminationReason::TimeLimit).unwrap();
    assert!(!summary.no_accident_bonus);
    assert_eq!(summary.accidents, 2);
}

#[test]
fn test_same_lane_vehicles_do_not_collide() {
    let mut world = SimWorld::new(quiet_config(3)).unwrap();
    world.begin_episode();

    let spawn = world.layout.spawn_point(LaneId::West);
    let forward = world.layout.forward(LaneId::West);
    let a = world.spawn_vehicle_at(LaneId::West, spawn, None);
    let b = world.spawn_vehicle_at(LaneId::West, spawn + forward * 1.0, None);

    world.tick(0.05);
    assert_ne!(world.vehicle(a).unwrap().state, VehicleState::Crashed);
    assert_ne!(world.vehicle(b).unwrap().state, VehicleState::Crashed);
    assert_eq!(world.stats().accidents(), 0);
}

#[test]
fn test_episode_reset_round_trip() {
    let mut world = SimWorld::new(SimConfig::with_seed(4)).unwrap();
    world.begin_episode();
    for _ in 0..600 {
        world.tick(0.05);
    }
    assert!(!world.vehicles.is_empty());
    assert!(world.stats().current_vehicle_count() > 0);

    world.begin_episode();
    assert!(world.vehicles.is_empty());
    assert_eq!(world.stats().queue_lengths(), [0; 8]);
    assert_eq!(world.stats().cars_in_intersection(), 0);
    assert_eq!(world.stats().overall_anger_stats().reports, 0);
    assert_eq!(world.stats().completions(), 0);
    assert_eq!(world.controller().episode(), 2);
    assert!(world.is_running());
    assert_eq!(world.controller().ledger().decisions, 0);

    // Initial lights always come from the table
    let index = world.controller().current_index();
    let table = world.controller().table();
    assert_eq!(world.lights.states(), table.get(index).unwrap().states());
}

#[test]
fn test_episode_hooks() {
    let mut world = SimWorld::new(quiet_config(6)).unwrap();
    world.on_episode_begin();
    assert!(world.is_running());

    let summary = world.on_episode_end(true).unwrap();
    assert_eq!(summary.reason, TerminationReason::Inactivity);
    assert!(world.on_episode_end(false).is_none());
}

#[test]
fn test_end_episode_force_reports_vehicles() {
    let mut world = SimWorld::new(quiet_config(7)).unwrap();
    world.begin_episode();
    let spawn = world.layout.spawn_point(LaneId::South);
    world.spawn_vehicle_at(LaneId::South, spawn, None);
    for _ in 0..20 {
        world.tick(0.05);
    }

    let reports_before = world.stats().overall_anger_stats().reports;
    let summary = world.end_episode(TerminationReason::TimeLimit).unwrap();
    assert_eq!(summary.completions, 0);
    assert_eq!(world.stats().completions(), 1);
    assert!(world.stats().overall_anger_stats().reports > reports_before);
}

#[test]
fn test_observation_shape() {
    let mut world = SimWorld::new(SimConfig::with_seed(8)).unwrap();
    world.begin_episode();
    for _ in 0..100 {
        world.tick(0.05);
    }
    let observation = world
        .controller()
        .observe(world.time, &world.lights, world.stats());
    assert_eq!(observation.to_vec().len(), OBSERVATION_SIZE);
    assert_eq!(observation.light_states, world.lights.states());
    assert_eq!(observation.configuration_count, world.controller().table().len());
}

#[test]
fn test_duplicate_stats_aggregator_rejected() {
    let mut world = SimWorld::with_id(SimulationId(3), quiet_config(9)).unwrap();
    let spawn = world.layout.spawn_point(LaneId::South);
    world.spawn_vehicle_at(LaneId::South, spawn, None);

    // Same id and foreign id are both discarded
    assert!(!world.attach_stats(StatsAggregator::new(SimulationId(3))));
    assert!(!world.attach_stats(StatsAggregator::new(SimulationId(4))));
    assert_eq!(world.stats().simulation_id(), SimulationId(3));
    assert_eq!(world.stats().current_vehicle_count(), 1);
}

#[test]
fn test_pool_rejects_duplicate_simulation() {
    let mut config = SimConfig::with_seed(10);
    config.controller.max_episode_time = 5.0;

    let mut pool = EnvironmentPool::new();
    assert!(pool.add(SimWorld::with_id(SimulationId(1), config.clone()).unwrap()));
    assert!(!pool.add(SimWorld::with_id(SimulationId(1), config.clone()).unwrap()));
    assert!(pool.add(SimWorld::with_id(SimulationId(2), config).unwrap()));
    assert_eq!(pool.len(), 2);

    pool.begin_all();
    let summaries = pool.run_until_done(0.05);
    assert_eq!(summaries.len(), 2);
    assert!(summaries
        .iter()
        .all(|(_, summary)| summary.reason == TerminationReason::TimeLimit));
}

#[test]
fn test_seeded_worlds_are_reproducible() {
    let mut config = SimConfig::with_seed(42);
    config.controller.max_episode_time = 30.0;

    let mut first = SimWorld::new(config.clone()).unwrap();
    let mut second = SimWorld::new(config).unwrap();
    let a = first.run_episode().unwrap();
    let b = second.run_episode().unwrap();

    assert_eq!(a.completions, b.completions);
    assert_eq!(a.accidents, b.accidents);
    assert_eq!(a.cumulative_reward, b.cumulative_reward);
    assert_eq!(first.metrics().total_spawned, second.metrics().total_spawned);
}
