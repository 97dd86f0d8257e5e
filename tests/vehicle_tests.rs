//! Vehicle behavior at lights, in traffic and through turns

use intersection_sim::simulation::{
    outgoing_lane, normalize_yaw, ConfigurationTable, IntersectionLayout, LaneId, Position,
    SceneEntry, SceneIndex, SimId, SimVehicle, SimulationId, StatsAggregator, TrafficLights,
    TurnDirection, TurnManeuver, VehicleConfig, VehicleEnvironment, VehicleId, VehicleState,
    TURN_EPSILON_DEGREES,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const DT: f32 = 0.05;

fn make_vehicle(
    lane: LaneId,
    position: Position,
    turn_plan: Option<TurnDirection>,
    layout: &IntersectionLayout,
    config: &VehicleConfig,
) -> SimVehicle {
    let mut rng = StdRng::seed_from_u64(7);
    SimVehicle::new(
        VehicleId(SimId(0)),
        lane,
        position,
        turn_plan,
        0.0,
        layout,
        config,
        &mut rng,
    )
}

fn green_lights(lanes: &[LaneId]) -> TrafficLights {
    let table = ConfigurationTable::standard().unwrap();
    let mut lights = TrafficLights::new();
    let index = (0..table.len())
        .find(|i| {
            let configuration = table.get(*i).unwrap();
            lanes.iter().all(|lane| configuration.is_green(*lane))
        })
        .expect("no configuration greens the requested lanes");
    lights.apply(table.get(index).unwrap());
    lights
}

#[test]
fn test_vehicle_stops_exactly_at_red_light() {
    let layout = IntersectionLayout::default();
    let config = VehicleConfig::default();
    let lights = TrafficLights::new();
    let scene = SceneIndex::default();
    let mut stats = StatsAggregator::new(SimulationId(0));
    let env = VehicleEnvironment {
        lights: &lights,
        layout: &layout,
        scene: &scene,
        config: &config,
    };

    // 40 units before the north light
    let light = layout.light_position(LaneId::North);
    let start = light - layout.forward(LaneId::North) * 40.0;
    let mut vehicle = make_vehicle(LaneId::North, start, None, &layout, &config);

    // Cached checks may lag one interval behind the position
    let stale_margin = config.max_speed * config.light_check_interval;

    let mut now = 0.0;
    for _ in 0..600 {
        now += DT;
        vehicle.update(DT, now, &env, &mut stats);

        let distance = vehicle.position.distance(&light);
        let factor = vehicle.light_brake_factor();
        assert!((0.0..=1.0).contains(&factor));
        assert!(vehicle.speed >= 0.0 && vehicle.speed <= config.max_speed);
        assert!(
            distance >= config.stop_distance_to_light - 1e-3,
            "vehicle crept past the stop point: {distance}"
        );
        if distance > config.deceleration_distance + stale_margin {
            assert_eq!(factor, 0.0, "braking too early at distance {distance}");
        }
    }

    let distance = vehicle.position.distance(&light);
    assert!((distance - config.stop_distance_to_light).abs() < 1e-3);
    assert_eq!(vehicle.speed, 0.0);
    assert_eq!(vehicle.state, VehicleState::HardStopped);
    assert!(!vehicle.entered_intersection);
    assert_eq!(stats.cars_in_intersection(), 0);
}

#[test]
fn test_anger_grows_only_after_wait_threshold() {
    let layout = IntersectionLayout::default();
    let config = VehicleConfig::default();
    let lights = TrafficLights::new();
    let scene = SceneIndex::default();
    let mut stats = StatsAggregator::new(SimulationId(0));
    let env = VehicleEnvironment {
        lights: &lights,
        layout: &layout,
        scene: &scene,
        config: &config,
    };

    let light = layout.light_position(LaneId::East);
    let start = light - layout.forward(LaneId::East) * 20.0;
    let mut vehicle = make_vehicle(LaneId::East, start, None, &layout, &config);

    let mut now = 0.0;
    let mut last_anger = 0.0;
    for _ in 0..800 {
        now += DT;
        vehicle.update(DT, now, &env, &mut stats);

        let anger = vehicle.anger();
        assert!(anger >= last_anger, "anger decreased from {last_anger} to {anger}");
        if vehicle.cumulative_wait(now) <= config.wait_time_threshold {
            assert_eq!(anger, 0.0);
        }
        last_anger = anger;
    }

    assert!(vehicle.is_waiting());
    assert!(vehicle.anger() > 0.0);
    assert!(stats.lane_anger_stats(LaneId::East).reports > 0);
}

#[test]
fn test_vehicle_brakes_behind_stopped_car() {
    let layout = IntersectionLayout::default();
    let config = VehicleConfig::default();
    let lights = green_lights(&[LaneId::North]);
    let mut stats = StatsAggregator::new(SimulationId(0));

    let forward = layout.forward(LaneId::North);
    let spawn = layout.spawn_point(LaneId::North);
    let blocker = SceneEntry {
        id: VehicleId(SimId(99)),
        position: spawn + forward * 30.0,
        yaw: LaneId::North.approach().travel_yaw(),
    };
    let scene = SceneIndex::new(vec![blocker]);
    let env = VehicleEnvironment {
        lights: &lights,
        layout: &layout,
        scene: &scene,
        config: &config,
    };

    let mut vehicle = make_vehicle(LaneId::North, spawn, None, &layout, &config);
    let mut now = 0.0;
    for _ in 0..400 {
        now += DT;
        vehicle.update(DT, now, &env, &mut stats);
        let decision = vehicle.brake_decision();
        assert!((0.0..=1.0).contains(&decision.factor));
        assert!((0.0..=1.0).contains(&vehicle.car_brake_factor()));
    }

    let gap = vehicle.position.distance(&blocker.position);
    assert!(gap <= config.stop_distance_to_car + 1.0);
    assert!(gap > config.stop_distance_to_car - 1.0);
    assert_eq!(vehicle.speed, 0.0);
    assert!(vehicle.brake_decision().hard_stop);
}

#[test]
fn test_turn_maneuver_sweeps_exactly_ninety_degrees() {
    let layout = IntersectionLayout::default();
    let pivot = layout.pivot(LaneId::North, TurnDirection::Right);
    let mut position = Position::planar(-6.0, 19.0);
    let mut yaw = LaneId::North.approach().travel_yaw();
    let mut maneuver = TurnManeuver::begin(TurnDirection::Right, pivot, &position, yaw);

    let mut done = false;
    for _ in 0..1000 {
        if maneuver.step(&mut position, &mut yaw, 5.0, DT, 20.0, 120.0) {
            done = true;
            break;
        }
    }

    assert!(done);
    assert!((maneuver.swept_degrees - 90.0).abs() <= TURN_EPSILON_DEGREES);
    let expected_yaw = normalize_yaw(std::f32::consts::PI + std::f32::consts::FRAC_PI_2);
    assert!((normalize_yaw(yaw - expected_yaw)).abs() < 1e-4);
    assert!((position.x - pivot.x).abs() < 1e-2);
    assert!((position.z - (pivot.z - maneuver.radius)).abs() < 1e-2);
}

#[test]
fn test_turn_does_not_rotate_while_stopped() {
    let pivot = Position::planar(-19.0, 19.0);
    let mut position = Position::planar(-6.0, 19.0);
    let mut yaw = std::f32::consts::PI;
    let mut maneuver = TurnManeuver::begin(TurnDirection::Right, pivot, &position, yaw);

    assert!(!maneuver.step(&mut position, &mut yaw, 0.0, DT, 20.0, 120.0));
    assert_eq!(maneuver.swept_degrees, 0.0);
    assert_eq!(position, Position::planar(-6.0, 19.0));
}

#[test]
fn test_turning_vehicle_joins_outgoing_lane() {
    let layout = IntersectionLayout::default();
    let config = VehicleConfig::default();
    let lights = green_lights(&[LaneId::North]);
    let scene = SceneIndex::default();
    let mut stats = StatsAggregator::new(SimulationId(0));
    let env = VehicleEnvironment {
        lights: &lights,
        layout: &layout,
        scene: &scene,
        config: &config,
    };

    let light = layout.light_position(LaneId::North);
    let start = light - layout.forward(LaneId::North) * 25.0;
    let mut vehicle = make_vehicle(
        LaneId::North,
        start,
        Some(TurnDirection::Right),
        &layout,
        &config,
    );
    stats.report_spawn(LaneId::North);

    let mut now = 0.0;
    let mut saw_turn = false;
    for _ in 0..400 {
        now += DT;
        vehicle.update(DT, now, &env, &mut stats);
        saw_turn |= vehicle.state.is_turning();
        if saw_turn && !vehicle.state.is_turning() {
            break;
        }
    }

    assert!(saw_turn);
    assert!(vehicle.entered_intersection);
    assert_eq!(vehicle.lane, outgoing_lane(LaneId::North, TurnDirection::Right));
    assert_eq!(vehicle.lane, LaneId::East);
    assert_eq!(vehicle.origin_lane, LaneId::North);
    let expected_yaw = LaneId::East.approach().travel_yaw();
    assert!(normalize_yaw(vehicle.yaw - expected_yaw).abs() < 1e-4);
}

#[test]
fn test_outgoing_lane_table() {
    use TurnDirection::{Left, Right};
    assert_eq!(outgoing_lane(LaneId::North, Right), LaneId::East);
    assert_eq!(outgoing_lane(LaneId::North, Left), LaneId::West);
    assert_eq!(outgoing_lane(LaneId::NorthLeft, Left), LaneId::West);
    assert_eq!(outgoing_lane(LaneId::South, Right), LaneId::West);
    assert_eq!(outgoing_lane(LaneId::SouthLeft, Left), LaneId::East);
    assert_eq!(outgoing_lane(LaneId::East, Right), LaneId::South);
    assert_eq!(outgoing_lane(LaneId::EastLeft, Left), LaneId::North);
    assert_eq!(outgoing_lane(LaneId::West, Right), LaneId::North);
    assert_eq!(outgoing_lane(LaneId::WestLeft, Left), LaneId::South);
}

#[test]
fn test_vehicle_completes_through_green() {
    let layout = IntersectionLayout::default();
    let config = VehicleConfig::default();
    let lights = green_lights(&[LaneId::South]);
    let scene = SceneIndex::default();
    let mut stats = StatsAggregator::new(SimulationId(0));
    let env = VehicleEnvironment {
        lights: &lights,
        layout: &layout,
        scene: &scene,
        config: &config,
    };

    let spawn = layout.spawn_point(LaneId::South);
    let mut vehicle = make_vehicle(LaneId::South, spawn, None, &layout, &config);
    stats.report_spawn(LaneId::South);

    let mut now = 0.0;
    let mut exited = false;
    for _ in 0..1000 {
        now += DT;
        if vehicle.update(DT, now, &env, &mut stats)
            == intersection_sim::simulation::VehicleUpdateResult::Exited
        {
            exited = true;
            break;
        }
    }

    assert!(exited);
    assert_eq!(vehicle.state, VehicleState::Exited);
    assert_eq!(stats.completions(), 1);
    assert_eq!(stats.cars_on_lane(LaneId::South), 0);
    assert_eq!(stats.cars_in_intersection(), 0);
    assert!(stats.average_speed() > 0.0);
}

#[test]
fn test_anger_freezes_while_moving_and_resumes_from_frozen_value() {
    let layout = IntersectionLayout::default();
    let config = VehicleConfig::default();
    let red = TrafficLights::new();
    let green = green_lights(&[LaneId::North]);
    let empty = SceneIndex::default();
    let mut stats = StatsAggregator::new(SimulationId(0));

    let light = layout.light_position(LaneId::North);
    let start = light - layout.forward(LaneId::North) * 20.0;
    let mut vehicle = make_vehicle(LaneId::North, start, None, &layout, &config);
    let mut now = 0.0;

    // Held at red well past the wait threshold
    {
        let env = VehicleEnvironment {
            lights: &red,
            layout: &layout,
            scene: &empty,
            config: &config,
        };
        for _ in 0..300 {
            now += DT;
            vehicle.update(DT, now, &env, &mut stats);
        }
    }
    assert!(vehicle.is_waiting());
    assert!(vehicle.anger() > 0.0);

    // Green: anger freezes once the vehicle is moving again
    let (frozen, first_wait) = {
        let env = VehicleEnvironment {
            lights: &green,
            layout: &layout,
            scene: &empty,
            config: &config,
        };
        for _ in 0..100 {
            now += DT;
            vehicle.update(DT, now, &env, &mut stats);
            if !vehicle.is_waiting() {
                break;
            }
        }
        assert!(!vehicle.is_waiting());
        let frozen = vehicle.anger();
        let first_wait = vehicle.cumulative_wait(now);

        for _ in 0..20 {
            now += DT;
            vehicle.update(DT, now, &env, &mut stats);
            assert!(vehicle.speed > 0.0);
            assert_eq!(vehicle.anger(), frozen);
        }
        (frozen, first_wait)
    };
    assert!(frozen > 0.0);
    assert!(first_wait > config.wait_time_threshold);

    // Stopped again behind a car: anger never drops below the frozen value
    let blocker = SceneEntry {
        id: VehicleId(SimId(99)),
        position: vehicle.position + vehicle.forward() * 12.0,
        yaw: vehicle.yaw,
    };
    let blocked = SceneIndex::new(vec![blocker]);
    let env = VehicleEnvironment {
        lights: &green,
        layout: &layout,
        scene: &blocked,
        config: &config,
    };
    for _ in 0..200 {
        now += DT;
        vehicle.update(DT, now, &env, &mut stats);
        assert!(vehicle.anger() >= frozen);
    }

    assert!(vehicle.is_waiting());
    assert!(vehicle.anger() > frozen);
    assert!(vehicle.cumulative_wait(now) > first_wait);
}

#[test]
fn test_vehicle_without_light_drives_through() {
    let layout = IntersectionLayout::default();
    let config = VehicleConfig::default();
    let lights = TrafficLights::new();
    let scene = SceneIndex::default();
    let mut stats = StatsAggregator::new(SimulationId(0));
    let env = VehicleEnvironment {
        lights: &lights,
        layout: &layout,
        scene: &scene,
        config: &config,
    };

    let light = layout.light_position(LaneId::North);
    let start = light - layout.forward(LaneId::North) * 40.0;
    let mut vehicle = make_vehicle(
        LaneId::North,
        start,
        Some(TurnDirection::Right),
        &layout,
        &config,
    );
    vehicle.light = None;
    stats.report_spawn(LaneId::North);

    let mut now = 0.0;
    let mut exited = false;
    for _ in 0..1000 {
        now += DT;
        let result = vehicle.update(DT, now, &env, &mut stats);
        assert_eq!(vehicle.light_brake_factor(), 0.0);
        assert!(!vehicle.brake_decision().hard_stop);
        assert!(!vehicle.state.is_turning());
        if result == intersection_sim::simulation::VehicleUpdateResult::Exited {
            exited = true;
            break;
        }
    }

    assert!(exited);
    assert_eq!(vehicle.state, VehicleState::Exited);
    assert!(!vehicle.entered_intersection);
    assert_eq!(vehicle.lane, LaneId::North);
    assert_eq!(stats.cars_in_intersection(), 0);
    assert_eq!(stats.completions(), 1);
}
