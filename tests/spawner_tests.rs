//! Demand schedule, spawn placement and wave behavior

use intersection_sim::simulation::{
    DemandSchedule, IntersectionLayout, LaneId, SceneEntry, SceneIndex, SceneQuery, SimId,
    SimulationId, SpawnContext, Spawner, SpawnerConfig, StatsAggregator, TrafficPeriod,
    VehicleConfig, VehicleId,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn entry(id: usize, lane: LaneId, position: intersection_sim::simulation::Position) -> SceneEntry {
    SceneEntry {
        id: VehicleId(SimId(id)),
        position,
        yaw: lane.approach().travel_yaw(),
    }
}

#[test]
fn test_period_mapping() {
    let schedule = DemandSchedule::new(&SpawnerConfig::default());
    assert_eq!(schedule.period(0.0), TrafficPeriod::EarlyMorning);
    assert_eq!(schedule.period(0.15), TrafficPeriod::MorningRush);
    assert_eq!(schedule.period(0.35), TrafficPeriod::MorningRush);
    assert_eq!(schedule.period(0.5), TrafficPeriod::Midday);
    assert_eq!(schedule.period(0.65), TrafficPeriod::AfternoonRush);
    assert_eq!(schedule.period(0.85), TrafficPeriod::AfternoonRush);
    assert_eq!(schedule.period(0.9), TrafficPeriod::Evening);
    assert_eq!(schedule.period(1.0), TrafficPeriod::Evening);
}

#[test]
fn test_rush_hour_spawns_faster() {
    let config = SpawnerConfig::default();
    let schedule = DemandSchedule::new(&config);
    let rush = schedule.base_interval(TrafficPeriod::MorningRush);
    let midday = schedule.base_interval(TrafficPeriod::Midday);
    let evening = schedule.base_interval(TrafficPeriod::Evening);
    assert!(rush < midday);
    assert!(midday < evening);
    for period in [
        TrafficPeriod::EarlyMorning,
        TrafficPeriod::MorningRush,
        TrafficPeriod::Midday,
        TrafficPeriod::AfternoonRush,
        TrafficPeriod::Evening,
    ] {
        let interval = schedule.base_interval(period);
        assert!(interval >= config.min_spawn_interval && interval <= config.max_spawn_interval);
    }
}

#[test]
fn test_spawn_point_used_when_clear() {
    let mut rng = StdRng::seed_from_u64(1);
    let layout = IntersectionLayout::default();
    let spawner = Spawner::new(&SpawnerConfig::default(), &mut rng);
    let scene = SceneIndex::default();

    let position = spawner.find_spawn_position(LaneId::West, &layout, &scene);
    assert_eq!(position, Some(layout.spawn_point(LaneId::West)));
}

#[test]
fn test_blocked_spawn_queues_backward() {
    let mut rng = StdRng::seed_from_u64(1);
    let layout = IntersectionLayout::default();
    let config = SpawnerConfig::default();
    let spawner = Spawner::new(&config, &mut rng);

    let spawn = layout.spawn_point(LaneId::North);
    let backward = layout.forward(LaneId::North) * -1.0;
    let scene = SceneIndex::new(vec![
        entry(1, LaneId::North, spawn),
        entry(2, LaneId::North, spawn + backward * config.queue_spacing),
    ]);

    let position = spawner
        .find_spawn_position(LaneId::North, &layout, &scene)
        .unwrap();
    let expected = spawn + backward * (2.0 * config.queue_spacing);
    assert!(position.distance(&expected) < 1e-4);
    assert!(scene.is_clear(&position, config.spawn_clearance_radius));
}

#[test]
fn test_full_queue_refuses_spawn() {
    let mut rng = StdRng::seed_from_u64(1);
    let layout = IntersectionLayout::default();
    let config = SpawnerConfig::default();
    let spawner = Spawner::new(&config, &mut rng);

    let spawn = layout.spawn_point(LaneId::East);
    let backward = layout.forward(LaneId::East) * -1.0;
    let entries = (0..=config.max_queue_length)
        .map(|slot| {
            entry(
                slot as usize,
                LaneId::East,
                spawn + backward * (slot as f32 * config.queue_spacing),
            )
        })
        .collect();
    let scene = SceneIndex::new(entries);

    assert_eq!(spawner.find_spawn_position(LaneId::East, &layout, &scene), None);
}

#[test]
fn test_spawner_respects_clearance_and_reports_spawns() {
    let mut rng = StdRng::seed_from_u64(11);
    let layout = IntersectionLayout::default();
    let vehicle_config = VehicleConfig::default();
    let config = SpawnerConfig {
        enable_wave_spawning: false,
        ..SpawnerConfig::default()
    };
    let mut spawner = Spawner::new(&config, &mut rng);
    let mut stats = StatsAggregator::new(SimulationId(0));
    let mut scene = SceneIndex::default();

    let mut spawned = 0;
    let mut now = 0.0;
    for tick in 0..2400 {
        now += 0.05;
        let ctx = SpawnContext {
            layout: &layout,
            scene: &scene,
            vehicle_config: &vehicle_config,
        };
        if let Some(vehicle) =
            spawner.tick(0.05, now, VehicleId(SimId(tick)), &ctx, &mut stats, &mut rng)
        {
            // Spawned vehicles never overlap the ones already placed
            assert!(scene.is_clear(&vehicle.position, config.spawn_clearance_radius));
            assert_eq!(vehicle.speed, 0.0);
            if vehicle.lane.is_left_turn() {
                assert_eq!(
                    vehicle.turn_plan,
                    Some(intersection_sim::simulation::TurnDirection::Left)
                );
            }
            scene.push(entry(tick, vehicle.lane, vehicle.position));
            spawned += 1;
        }
    }

    assert!(spawned > 0);
    assert_eq!(stats.current_vehicle_count() as usize, spawned);
}

#[test]
fn test_vehicle_cap_blocks_spawning() {
    let mut rng = StdRng::seed_from_u64(5);
    let layout = IntersectionLayout::default();
    let vehicle_config = VehicleConfig::default();
    let config = SpawnerConfig {
        max_vehicles: 0,
        ..SpawnerConfig::default()
    };
    let mut spawner = Spawner::new(&config, &mut rng);
    let mut stats = StatsAggregator::new(SimulationId(0));
    let scene = SceneIndex::default();
    let ctx = SpawnContext {
        layout: &layout,
        scene: &scene,
        vehicle_config: &vehicle_config,
    };

    let mut now = 0.0;
    for tick in 0..2000 {
        now += 0.05;
        assert!(spawner
            .tick(0.05, now, VehicleId(SimId(tick)), &ctx, &mut stats, &mut rng)
            .is_none());
    }
    assert_eq!(stats.current_vehicle_count(), 0);
}

#[test]
fn test_morning_rush_favors_residential_lane() {
    let mut rng = StdRng::seed_from_u64(9);
    let config = SpawnerConfig {
        residential_lane: Some(2),
        day_length: 10.0,
        ..SpawnerConfig::default()
    };
    let mut spawner = Spawner::new(&config, &mut rng);
    assert_eq!(spawner.residential_lane(), LaneId::East);

    let layout = IntersectionLayout::default();
    let vehicle_config = VehicleConfig::default();
    let mut stats = StatsAggregator::new(SimulationId(0));
    let scene = SceneIndex::default();
    let ctx = SpawnContext {
        layout: &layout,
        scene: &scene,
        vehicle_config: &vehicle_config,
    };

    // Advance into the morning rush window (0.15..0.35 of a 10 s day)
    let mut now = 0.0;
    while spawner.normalized_time() < 0.2 {
        now += 0.05;
        spawner.tick(0.05, now, VehicleId(SimId(0)), &ctx, &mut stats, &mut rng);
    }
    assert_eq!(spawner.period(), TrafficPeriod::MorningRush);

    let weights = spawner.lane_weights();
    let residential = weights[LaneId::East.index()];
    for lane in LaneId::ALL {
        assert!(weights[lane.index()] <= residential);
    }
    assert!(residential > weights[LaneId::North.index()]);
}

#[test]
fn test_rush_hour_waves_spawn_spaced_bursts() {
    let mut rng = StdRng::seed_from_u64(21);
    let layout = IntersectionLayout::default();
    let vehicle_config = VehicleConfig::default();
    let config = SpawnerConfig {
        day_length: 100.0,
        ..SpawnerConfig::default()
    };
    let mut spawner = Spawner::new(&config, &mut rng);
    let mut stats = StatsAggregator::new(SimulationId(0));
    // Nothing is ever placed, so every wave car finds the spawn point clear
    let scene = SceneIndex::default();
    let ctx = SpawnContext {
        layout: &layout,
        scene: &scene,
        vehicle_config: &vehicle_config,
    };

    let mut rush_spawns: Vec<(f32, LaneId)> = Vec::new();
    let mut now = 0.0;
    let mut tick = 0;
    while spawner.period() != TrafficPeriod::Midday {
        now += 0.05;
        tick += 1;
        let spawned =
            spawner.tick(0.05, now, VehicleId(SimId(tick)), &ctx, &mut stats, &mut rng);
        if let Some(vehicle) = spawned {
            if spawner.period() == TrafficPeriod::MorningRush {
                rush_spawns.push((now, vehicle.lane));
            }
        }
        assert!(tick < 10_000, "never left the morning rush");
    }

    // Split the rush spawns into bursts at any pause longer than a second
    let mut bursts: Vec<Vec<(f32, LaneId)>> = Vec::new();
    for spawn in rush_spawns {
        match bursts.last_mut() {
            Some(burst) if spawn.0 - burst[burst.len() - 1].0 < 1.0 => burst.push(spawn),
            _ => bursts.push(vec![spawn]),
        }
    }
    assert!(bursts.len() >= 2, "expected at least two waves, got {}", bursts.len());

    let cars_per_wave = config.cars_per_wave as usize;
    for (i, burst) in bursts.iter().enumerate() {
        // The final wave may be cut short when the rush ends
        if i + 1 < bursts.len() {
            assert_eq!(burst.len(), cars_per_wave, "wave {i} spawned {} cars", burst.len());
        } else {
            assert!(!burst.is_empty() && burst.len() <= cars_per_wave);
        }

        let lane = burst[0].1;
        assert!(burst.iter().all(|(_, l)| *l == lane), "wave {i} mixed lanes");

        for pair in burst.windows(2) {
            let spacing = pair[1].0 - pair[0].0;
            assert!(
                spacing >= config.car_spawn_delay - 0.01
                    && spacing <= config.car_spawn_delay + 0.06,
                "wave {i} cars spaced {spacing}s apart"
            );
        }
    }

    for pair in bursts.windows(2) {
        let gap = pair[1][0].0 - pair[0][pair[0].len() - 1].0;
        assert!(gap >= config.wave_gap_duration, "only {gap}s between waves");
    }
}

#[test]
fn test_blocked_wave_lane_stalls_wave() {
    let mut rng = StdRng::seed_from_u64(4);
    let layout = IntersectionLayout::default();
    let vehicle_config = VehicleConfig::default();
    let config = SpawnerConfig {
        day_length: 100.0,
        residential_lane: Some(0),
        wave_commute_chance: 1.0,
        ..SpawnerConfig::default()
    };
    let mut spawner = Spawner::new(&config, &mut rng);
    assert_eq!(spawner.residential_lane(), LaneId::North);
    let mut stats = StatsAggregator::new(SimulationId(0));

    // Every queue slot on the north lane is occupied
    let spawn = layout.spawn_point(LaneId::North);
    let backward = layout.forward(LaneId::North) * -1.0;
    let entries = (0..=config.max_queue_length)
        .map(|slot| {
            entry(
                slot as usize,
                LaneId::North,
                spawn + backward * (slot as f32 * config.queue_spacing),
            )
        })
        .collect();
    let scene = SceneIndex::new(entries);
    let ctx = SpawnContext {
        layout: &layout,
        scene: &scene,
        vehicle_config: &vehicle_config,
    };

    let mut now = 0.0;
    let mut tick = 100;
    let mut wave_started = false;
    while spawner.period() != TrafficPeriod::Midday {
        now += 0.05;
        tick += 1;
        let spawned =
            spawner.tick(0.05, now, VehicleId(SimId(tick)), &ctx, &mut stats, &mut rng);
        if spawner.period() != TrafficPeriod::MorningRush {
            continue;
        }

        assert!(spawned.is_none(), "wave skipped ahead of the blocked lane");
        if wave_started {
            assert!(spawner.in_wave(), "stalled wave ended during the rush");
        }
        wave_started |= spawner.in_wave();
        assert!(tick < 10_000, "never left the morning rush");
    }

    assert!(wave_started);
    // Leaving the rush abandons the stalled wave
    assert!(!spawner.in_wave());
}
