//! Vehicle movement logic for the intersection simulation
//!
//! Each vehicle is an explicit state machine driven by `update`. Light and
//! car-ahead perception run on their own throttled timers and the results
//! are cached between checks.

use rand::Rng;

use super::config::VehicleConfig;
use super::layout::IntersectionLayout;
use super::scene::SceneQuery;
use super::stats::StatsAggregator;
use super::traffic_light::TrafficLights;
use super::turn::{outgoing_lane, TurnManeuver};
use super::types::{LaneId, Position, TurnDirection, VehicleId};

/// Slack below the stop distance before a vehicle counts as inside the intersection
const ENTRY_TOLERANCE: f32 = 1e-2;

/// Lifecycle of a vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleState {
    Cruising,
    Braking,
    HardStopped,
    Turning(TurnManeuver),
    Exited,
    Crashed,
}

impl VehicleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VehicleState::Exited | VehicleState::Crashed)
    }

    pub fn is_turning(&self) -> bool {
        matches!(self, VehicleState::Turning(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            VehicleState::Cruising => "cruising",
            VehicleState::Braking => "braking",
            VehicleState::HardStopped => "hard-stopped",
            VehicleState::Turning(_) => "turning",
            VehicleState::Exited => "exited",
            VehicleState::Crashed => "crashed",
        }
    }
}

/// Result of a vehicle update indicating what the world should do with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleUpdateResult {
    Continue, // Vehicle keeps running
    Exited,   // Vehicle crossed its exit boundary this tick; schedule removal
}

/// Combined braking request for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BrakeDecision {
    pub factor: f32,
    pub hard_stop: bool,
}

/// Read-only surroundings a vehicle needs for one update
pub struct VehicleEnvironment<'a> {
    pub lights: &'a TrafficLights,
    pub layout: &'a IntersectionLayout,
    pub scene: &'a dyn SceneQuery,
    pub config: &'a VehicleConfig,
}

/// Linear ramp from 0 at `far` to 1 at `near`
fn brake_ramp(distance: f32, far: f32, near: f32) -> f32 {
    if far <= near {
        return 1.0;
    }
    ((far - distance) / (far - near)).clamp(0.0, 1.0)
}

/// A vehicle in the intersection simulation
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub position: Position,
    /// Heading, clockwise from +z
    pub yaw: f32,
    pub speed: f32,
    /// Lane the vehicle currently travels on; reassigned after a turn
    pub lane: LaneId,
    /// Lane the vehicle spawned on; all lane accounting uses it
    pub origin_lane: LaneId,
    /// Light guarding the approach, if any
    ///
    /// Without a light the vehicle never brakes for a signal. Entry into the
    /// intersection is detected at the light, so such a vehicle also never
    /// reports entering and drives straight through, skipping its planned turn.
    pub light: Option<LaneId>,
    pub state: VehicleState,
    /// Turn the vehicle will take on entering the intersection
    pub turn_plan: Option<TurnDirection>,
    pub spawn_time: f32,
    /// Straight-line distance from spawn point to light
    pub distance_to_light: f32,
    pub entered_intersection: bool,

    light_check_timer: f32,
    car_detection_timer: f32,
    anger_log_timer: f32,

    // Cached perception
    light_brake_factor: f32,
    light_hard_stop: bool,
    light_hold: bool,
    car_distance: Option<f32>,
    car_brake_factor: f32,
    last_decision: BrakeDecision,

    // Frustration
    anger: f32,
    settled_anger: f32,
    waiting: bool,
    wait_start: f32,
    total_wait: f32,
}

impl SimVehicle {
    /// Create a vehicle at `position`, heading along `lane`
    ///
    /// Throttled timers start at a random phase so checks are spread
    /// across ticks.
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng>(
        id: VehicleId,
        lane: LaneId,
        position: Position,
        turn_plan: Option<TurnDirection>,
        spawn_time: f32,
        layout: &IntersectionLayout,
        config: &VehicleConfig,
        rng: &mut R,
    ) -> Self {
        let light = Some(lane);
        let distance_to_light = position.distance(&layout.light_position(lane));
        Self {
            id,
            position,
            yaw: lane.approach().travel_yaw(),
            speed: 0.0,
            lane,
            origin_lane: lane,
            light,
            state: VehicleState::Cruising,
            turn_plan,
            spawn_time,
            distance_to_light,
            entered_intersection: false,
            light_check_timer: rng.random_range(0.0..config.light_check_interval),
            car_detection_timer: rng.random_range(0.0..config.car_detection_interval),
            anger_log_timer: rng.random_range(0.0..config.anger_log_interval),
            light_brake_factor: 0.0,
            light_hard_stop: false,
            light_hold: false,
            car_distance: None,
            car_brake_factor: 0.0,
            last_decision: BrakeDecision::default(),
            anger: 0.0,
            settled_anger: 0.0,
            waiting: false,
            wait_start: spawn_time,
            total_wait: 0.0,
        }
    }

    pub fn forward(&self) -> Position {
        Position::from_yaw(self.yaw)
    }

    pub fn anger(&self) -> f32 {
        self.anger
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Finished waits plus the ongoing one, if any
    pub fn cumulative_wait(&self, now: f32) -> f32 {
        if self.waiting {
            self.total_wait + (now - self.wait_start)
        } else {
            self.total_wait
        }
    }

    pub fn light_brake_factor(&self) -> f32 {
        self.light_brake_factor
    }

    pub fn car_brake_factor(&self) -> f32 {
        self.car_brake_factor
    }

    /// Brake decision applied on the most recent tick
    pub fn brake_decision(&self) -> BrakeDecision {
        self.last_decision
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Update vehicle state for one tick
    pub fn update(
        &mut self,
        delta_secs: f32,
        now: f32,
        env: &VehicleEnvironment<'_>,
        stats: &mut StatsAggregator,
    ) -> VehicleUpdateResult {
        match self.state {
            VehicleState::Crashed => {
                self.speed = 0.0;
                return VehicleUpdateResult::Continue;
            }
            VehicleState::Exited => {
                // Coast out of the scene until removal
                self.position = self.position + self.forward() * (self.speed * delta_secs);
                return VehicleUpdateResult::Continue;
            }
            _ => {}
        }

        let config = env.config;

        // Check the light (throttled)
        self.light_check_timer -= delta_secs;
        if self.light_check_timer <= 0.0 {
            self.light_check_timer = config.light_check_interval;
            self.check_traffic_light(env, stats);
        }

        // Check for a car ahead (throttled)
        self.car_detection_timer -= delta_secs;
        if self.car_detection_timer <= 0.0 {
            self.car_detection_timer = config.car_detection_interval;
            self.detect_car_ahead(env);
        }

        let decision = self.combine_brakes(config);
        self.last_decision = decision;

        self.update_anger(
            decision.hard_stop || self.speed < config.floor_speed(),
            now,
            delta_secs,
            config,
            stats,
        );

        self.update_movement(decision, delta_secs, env);

        if env.layout.has_exited(self.lane, &self.position) {
            self.complete(now, stats);
            return VehicleUpdateResult::Exited;
        }

        VehicleUpdateResult::Continue
    }

    fn check_traffic_light(&mut self, env: &VehicleEnvironment<'_>, stats: &mut StatsAggregator) {
        self.light_brake_factor = 0.0;
        self.light_hard_stop = false;
        self.light_hold = false;

        // Committed to the turn; the light no longer applies
        if self.state.is_turning() {
            return;
        }

        let Some(light_lane) = self.light else {
            return;
        };
        let Some(light) = env.lights.get(light_lane) else {
            return;
        };

        let config = env.config;
        let to_light = env.layout.light_position(light_lane) - self.position;
        let distance = to_light.length();
        let alignment = to_light.normalized().dot(&self.forward());
        let approaching = alignment > config.approach_alignment_threshold;

        if !self.entered_intersection
            && ((approaching && distance < config.stop_distance_to_light - ENTRY_TOLERANCE)
                || alignment < 0.0)
        {
            self.enter_intersection(env, stats);
            return;
        }

        if approaching && !light.is_green {
            self.light_hold = !self.entered_intersection;
            if distance <= config.stop_distance_to_light {
                self.light_hard_stop = true;
            } else if distance <= config.deceleration_distance {
                self.light_brake_factor = brake_ramp(
                    distance,
                    config.deceleration_distance,
                    config.stop_distance_to_light,
                );
            }
        }
    }

    /// Fires once; starts the pre-assigned turn if there is one
    fn enter_intersection(&mut self, env: &VehicleEnvironment<'_>, stats: &mut StatsAggregator) {
        self.entered_intersection = true;
        stats.report_enter_intersection(self.origin_lane);

        if let Some(direction) = self.turn_plan.take() {
            let pivot = env.layout.pivot(self.origin_lane, direction);
            let maneuver = TurnManeuver::begin(direction, pivot, &self.position, self.yaw);
            self.state = VehicleState::Turning(maneuver);
        }
    }

    fn detect_car_ahead(&mut self, env: &VehicleEnvironment<'_>) {
        let config = env.config;
        self.car_distance = env.scene.forward_obstacle(
            &self.position,
            self.yaw,
            config.deceleration_distance,
            Some(self.id),
        );
        self.car_brake_factor = match self.car_distance {
            Some(distance) if distance > config.stop_distance_to_car => brake_ramp(
                distance,
                config.deceleration_distance,
                config.stop_distance_to_car,
            ),
            _ => 0.0,
        };
    }

    /// Max of the soft factors; a hard stop from either source wins
    fn combine_brakes(&self, config: &VehicleConfig) -> BrakeDecision {
        let mut factor = self.light_brake_factor;
        let mut hard_stop = self.light_hard_stop;

        if self
            .car_distance
            .is_some_and(|distance| distance <= config.stop_distance_to_car)
        {
            hard_stop = true;
        } else {
            factor = factor.max(self.car_brake_factor);
        }

        BrakeDecision {
            factor: factor.clamp(0.0, 1.0),
            hard_stop,
        }
    }

    fn update_anger(
        &mut self,
        currently_waiting: bool,
        now: f32,
        delta_secs: f32,
        config: &VehicleConfig,
        stats: &mut StatsAggregator,
    ) {
        if currently_waiting && !self.waiting {
            self.waiting = true;
            self.wait_start = now;
        } else if !currently_waiting && self.waiting {
            self.waiting = false;
            self.total_wait += now - self.wait_start;
            self.settled_anger = self.anger;
        }

        if self.waiting {
            let waited = now - self.wait_start;
            if waited > config.wait_time_threshold {
                let growth =
                    (config.anger_growth_rate * (waited - config.wait_time_threshold)).exp() - 1.0;
                self.anger = self.settled_anger + growth;
            }
        }

        self.anger_log_timer -= delta_secs;
        if self.anger_log_timer <= 0.0 {
            self.anger_log_timer = config.anger_log_interval;
            self.report_anger(now, stats);
        }
    }

    fn report_anger(&self, now: f32, stats: &mut StatsAggregator) {
        stats.report_anger(self.origin_lane, self.anger, self.cumulative_wait(now));
    }

    fn update_movement(
        &mut self,
        decision: BrakeDecision,
        delta_secs: f32,
        env: &VehicleEnvironment<'_>,
    ) {
        let config = env.config;

        if decision.hard_stop {
            self.speed = 0.0;
            if !self.state.is_turning() {
                self.state = VehicleState::HardStopped;
            }
            return;
        }

        let desired = if decision.factor > 0.0 {
            config.max_speed + (config.floor_speed() - config.max_speed) * decision.factor
        } else {
            config.max_speed
        };

        if self.speed > desired {
            let braking = config.acceleration * config.deceleration * delta_secs;
            self.speed = (self.speed - braking).max(desired);
        } else {
            self.speed = (self.speed + config.acceleration * delta_secs).min(desired);
        }
        self.speed = self.speed.clamp(0.0, config.max_speed);

        if let VehicleState::Turning(mut maneuver) = self.state {
            let done = maneuver.step(
                &mut self.position,
                &mut self.yaw,
                self.speed,
                delta_secs,
                config.min_turn_rate_degrees,
                config.max_turn_rate_degrees,
            );
            if done {
                self.lane = outgoing_lane(self.origin_lane, maneuver.direction);
                self.state = VehicleState::Cruising;
            } else {
                self.state = VehicleState::Turning(maneuver);
            }
            return;
        }

        let mut step = self.speed * delta_secs;
        let mut held_at_line = false;
        if self.light_hold {
            if let Some(remaining) = self.distance_to_stop_point(env) {
                if step >= remaining {
                    step = remaining.max(0.0);
                    self.speed = 0.0;
                    held_at_line = true;
                }
            }
        }
        self.position = self.position + self.forward() * step;

        self.state = if held_at_line {
            VehicleState::HardStopped
        } else if decision.factor > 0.0 {
            VehicleState::Braking
        } else {
            VehicleState::Cruising
        };
    }

    /// Distance along the heading left before the red-light stop point
    fn distance_to_stop_point(&self, env: &VehicleEnvironment<'_>) -> Option<f32> {
        let light_lane = self.light?;
        let to_light = env.layout.light_position(light_lane) - self.position;
        Some(to_light.dot(&self.forward()) - env.config.stop_distance_to_light)
    }

    /// Crossed the exit boundary: report transit and schedule removal
    fn complete(&mut self, now: f32, stats: &mut StatsAggregator) {
        if self.waiting {
            self.waiting = false;
            self.total_wait += now - self.wait_start;
        }

        let transit = now - self.spawn_time;
        let average_speed = if transit > 0.0 {
            self.distance_to_light / transit
        } else {
            0.0
        };

        self.report_anger(now, stats);
        stats.report_completed(transit, self.origin_lane, average_speed, now);
        stats.report_destroy(self.origin_lane);
        if self.entered_intersection {
            stats.report_exit_intersection(self.origin_lane);
        }
        self.state = VehicleState::Exited;
    }

    /// Mark the vehicle crashed and report the accident
    ///
    /// Returns false when the vehicle was already terminal.
    pub fn crash(&mut self, now: f32, stats: &mut StatsAggregator) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.speed = 0.0;
        self.state = VehicleState::Crashed;
        self.report_anger(now, stats);
        stats.report_accident(self.origin_lane);
        if self.entered_intersection {
            stats.report_exit_intersection(self.origin_lane);
        }
        true
    }

    /// Episode ended with this vehicle still in flight
    pub fn force_report(&self, now: f32, stats: &mut StatsAggregator) {
        if self.state.is_terminal() {
            return;
        }
        stats.report_completed(now - self.spawn_time, self.origin_lane, self.speed, now);
        self.report_anger(now, stats);
    }
}
