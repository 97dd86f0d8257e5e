//! Main simulation world that ties everything together
//!
//! One `SimWorld` is one intersection: its vehicles, lights, spawner, signal
//! controller and the single statistics aggregator they all report to.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;

use super::config::SimConfig;
use super::controller::{
    ControllerTick, EpisodeStatus, EpisodeSummary, SignalController, TerminationReason,
};
use super::layout::IntersectionLayout;
use super::policy::{Policy, QueuePressurePolicy};
use super::scene::SceneIndex;
use super::signal::ConfigurationTable;
use super::spawner::{SpawnContext, Spawner};
use super::stats::{AngerSummary, StatsAggregator};
use super::traffic_light::TrafficLights;
use super::types::{LaneId, Position, SimId, SimulationId, TurnDirection, VehicleId, LANE_COUNT};
use super::vehicle::{SimVehicle, VehicleEnvironment, VehicleState, VehicleUpdateResult};

/// Read-only metrics surface for dashboards and headless runs
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub simulation_id: SimulationId,
    pub time: f32,
    pub episode: u64,
    pub episode_time: f32,
    pub status: EpisodeStatus,
    pub traffic_period: String,
    pub vehicles: usize,
    pub total_spawned: usize,
    pub average_wait: f32,
    pub average_speed: f32,
    pub recent_wait: f32,
    pub recent_speed: f32,
    pub anger: AngerSummary,
    pub queue_lengths: [u32; LANE_COUNT],
    pub cars_in_intersection: u32,
    pub completions: usize,
    pub accidents: usize,
    pub configuration_index: usize,
    pub light_states: [bool; LANE_COUNT],
    pub cumulative_reward: f32,
    pub time_scale: f32,
}

/// The main simulation world
pub struct SimWorld {
    pub id: SimulationId,
    pub config: SimConfig,

    /// All vehicles, ordered by id so updates are deterministic
    pub vehicles: BTreeMap<VehicleId, SimVehicle>,

    /// Exited or crashed vehicles and the time they leave the scene
    pending_removals: BTreeMap<VehicleId, f32>,

    pub lights: TrafficLights,
    pub layout: IntersectionLayout,
    stats: StatsAggregator,
    spawner: Spawner,
    controller: SignalController,
    policy: Box<dyn Policy>,

    /// Next ID to assign
    next_id: usize,
    total_spawned: usize,

    /// Simulation time
    pub time: f32,

    seed: u64,
    rng: StdRng,
    last_summary: Option<EpisodeSummary>,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Result<Self> {
        Self::with_id(SimulationId(0), config)
    }

    /// Create a world for simulation `id`; the default policy is queue pressure
    pub fn with_id(id: SimulationId, config: SimConfig) -> Result<Self> {
        config.validate().context("Invalid simulation config")?;

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);
        let table = ConfigurationTable::with_extra(&config.controller.extra_configurations)
            .context("Failed to build signal configuration table")?;
        let layout = IntersectionLayout::new(&config.layout, config.vehicle.stop_distance_to_light);
        let spawner = Spawner::new(&config.spawner, &mut rng);
        let controller = SignalController::new(config.controller.clone(), table);

        debug!(
            "Simulation {} created with seed {}, {} signal configurations",
            id.0,
            seed,
            controller.table().len()
        );

        Ok(Self {
            id,
            vehicles: BTreeMap::new(),
            pending_removals: BTreeMap::new(),
            lights: TrafficLights::new(),
            layout,
            stats: StatsAggregator::new(id),
            spawner,
            controller,
            policy: Box::new(QueuePressurePolicy::default()),
            next_id: 0,
            total_spawned: 0,
            time: 0.0,
            seed,
            rng,
            last_summary: None,
            config,
        })
    }

    /// Create a world with a seeded RNG for reproducible runs
    pub fn new_with_seed(seed: u64) -> Result<Self> {
        Self::new(SimConfig::with_seed(seed))
    }

    pub fn with_policy(mut self, policy: Box<dyn Policy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_policy(&mut self, policy: Box<dyn Policy>) {
        self.policy = policy;
    }

    pub fn policy(&self) -> &dyn Policy {
        self.policy.as_ref()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn controller(&self) -> &SignalController {
        &self.controller
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    pub fn last_summary(&self) -> Option<&EpisodeSummary> {
        self.last_summary.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&SimVehicle> {
        self.vehicles.get(&id)
    }

    /// The world registers its own aggregator at construction and never
    /// replaces it; an offered aggregator is always discarded and this
    /// returns false
    pub fn attach_stats(&mut self, stats: StatsAggregator) -> bool {
        if stats.simulation_id() == self.id {
            warn!(
                "Duplicate stats aggregator for simulation {} discarded; keeping the first",
                self.id.0
            );
        } else {
            debug!(
                "Ignoring stats aggregator for simulation {} offered to simulation {}",
                stats.simulation_id().0,
                self.id.0
            );
        }
        false
    }

    fn next_vehicle_id(&mut self) -> VehicleId {
        let id = VehicleId(SimId(self.next_id));
        self.next_id += 1;
        id
    }

    /// Place a vehicle directly, bypassing the demand schedule
    pub fn spawn_vehicle_at(
        &mut self,
        lane: LaneId,
        position: Position,
        turn_plan: Option<TurnDirection>,
    ) -> VehicleId {
        let id = self.next_vehicle_id();
        let vehicle = SimVehicle::new(
            id,
            lane,
            position,
            turn_plan,
            self.time,
            &self.layout,
            &self.config.vehicle,
            &mut self.rng,
        );
        self.stats.report_spawn(lane);
        self.total_spawned += 1;
        self.vehicles.insert(id, vehicle);
        id
    }

    /// Force a configuration onto the lights, as a policy decision would
    pub fn set_configuration(&mut self, index: usize) -> usize {
        self.controller.apply_configuration(index, &mut self.lights)
    }

    // ---- episode lifecycle ----

    /// Remove every vehicle, reset stats and the spawner, then start the controller
    pub fn begin_episode(&mut self) {
        self.vehicles.clear();
        self.pending_removals.clear();
        self.stats.reset(self.time);
        self.spawner.reset(&mut self.rng);
        self.last_summary = None;
        self.controller.begin_episode(
            self.time,
            &mut self.lights,
            &self.stats,
            self.policy.as_mut(),
            &mut self.rng,
        );
    }

    /// End the running episode and force-report vehicles still in flight
    pub fn end_episode(&mut self, reason: TerminationReason) -> Option<EpisodeSummary> {
        let summary = self
            .controller
            .end_episode(reason, &self.stats, self.policy.as_mut())?;

        let now = self.time;
        let mut unfinished = 0;
        for vehicle in self.vehicles.values().filter(|v| v.is_active()) {
            vehicle.force_report(now, &mut self.stats);
            unfinished += 1;
        }
        if unfinished > 0 {
            debug!("Force-reported {} unfinished vehicles", unfinished);
        }

        self.last_summary = Some(summary.clone());
        Some(summary)
    }

    pub fn on_episode_begin(&mut self) {
        self.begin_episode();
    }

    pub fn on_episode_end(&mut self, early_stop: bool) -> Option<EpisodeSummary> {
        let reason = if early_stop {
            TerminationReason::Inactivity
        } else {
            TerminationReason::TimeLimit
        };
        self.end_episode(reason)
    }

    /// Begin an episode and tick it to completion
    pub fn run_episode(&mut self) -> Option<EpisodeSummary> {
        self.begin_episode();
        let delta = self.config.tick_delta;
        while self.is_running() {
            self.tick(delta);
        }
        self.last_summary.clone()
    }

    // ---- tick ----

    /// Advance one fixed step: vehicles, collisions, removals, spawner, controller
    pub fn tick(&mut self, delta_secs: f32) {
        if !self.controller.is_running() {
            return;
        }
        self.time += delta_secs;

        self.update_vehicles(delta_secs);
        self.resolve_collisions();
        self.process_removals();
        self.spawn_vehicles(delta_secs);

        let now = self.time;
        let outcome = self.controller.tick(
            delta_secs,
            now,
            &mut self.lights,
            &self.stats,
            self.policy.as_mut(),
        );
        if let ControllerTick::EpisodeEnded(reason) = outcome {
            self.end_episode(reason);
        }
    }

    fn update_vehicles(&mut self, delta_secs: f32) {
        let now = self.time;
        let scene = SceneIndex::from_vehicles(self.vehicles.values());
        let env = VehicleEnvironment {
            lights: &self.lights,
            layout: &self.layout,
            scene: &scene,
            config: &self.config.vehicle,
        };

        let mut exited = Vec::new();
        for vehicle in self.vehicles.values_mut() {
            if vehicle.update(delta_secs, now, &env, &mut self.stats) == VehicleUpdateResult::Exited {
                exited.push(vehicle.id);
            }
        }

        let remove_at = now + self.config.vehicle.removal_delay;
        for id in exited {
            self.pending_removals.insert(id, remove_at);
        }
    }

    /// Overlapping vehicles on different lanes both crash
    fn resolve_collisions(&mut self) {
        let now = self.time;
        let threshold = self.config.vehicle.collision_distance;
        let active: Vec<(VehicleId, Position, LaneId)> = self
            .vehicles
            .values()
            .filter(|v| v.is_active())
            .map(|v| (v.id, v.position, v.lane))
            .collect();

        let mut crashed = Vec::new();
        for (i, (id_a, pos_a, lane_a)) in active.iter().enumerate() {
            for (id_b, pos_b, lane_b) in &active[i + 1..] {
                if lane_a != lane_b && pos_a.distance(pos_b) < threshold {
                    crashed.push(*id_a);
                    crashed.push(*id_b);
                }
            }
        }

        let remove_at = now + self.config.vehicle.removal_delay;
        for id in crashed {
            if let Some(vehicle) = self.vehicles.get_mut(&id) {
                if vehicle.crash(now, &mut self.stats) {
                    self.pending_removals.insert(id, remove_at);
                }
            }
        }
    }

    fn process_removals(&mut self) {
        let now = self.time;
        let due: Vec<VehicleId> = self
            .pending_removals
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            self.pending_removals.remove(&id);
            self.vehicles.remove(&id);
        }
    }

    fn spawn_vehicles(&mut self, delta_secs: f32) {
        let now = self.time;
        let id = VehicleId(SimId(self.next_id));
        let scene = SceneIndex::from_vehicles(self.vehicles.values());
        let ctx = SpawnContext {
            layout: &self.layout,
            scene: &scene,
            vehicle_config: &self.config.vehicle,
        };

        if let Some(vehicle) =
            self.spawner
                .tick(delta_secs, now, id, &ctx, &mut self.stats, &mut self.rng)
        {
            self.next_id += 1;
            self.total_spawned += 1;
            self.vehicles.insert(vehicle.id, vehicle);
        }
    }

    // ---- reporting ----

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            simulation_id: self.id,
            time: self.time,
            episode: self.controller.episode(),
            episode_time: self.controller.episode_time(),
            status: self.controller.status(),
            traffic_period: self.spawner.period().to_string(),
            vehicles: self.vehicles.len(),
            total_spawned: self.total_spawned,
            average_wait: self.stats.average_wait(),
            average_speed: self.stats.average_speed(),
            recent_wait: self.stats.recent_wait(),
            recent_speed: self.stats.recent_speed(),
            anger: self.stats.overall_anger_stats(),
            queue_lengths: self.stats.queue_lengths(),
            cars_in_intersection: self.stats.cars_in_intersection(),
            completions: self.stats.completions(),
            accidents: self.stats.accidents(),
            configuration_index: self.controller.current_index(),
            light_states: self.lights.states(),
            cumulative_reward: self.controller.ledger().cumulative_reward,
            time_scale: self.config.time_scale,
        }
    }

    pub fn print_summary(&self) {
        let metrics = self.metrics();
        println!("=== Intersection Simulation Summary ===");
        println!(
            "Simulation {} | episode {} | time {:.2}s (episode {:.2}s) | {}",
            self.id.0, metrics.episode, metrics.time, metrics.episode_time, metrics.traffic_period
        );
        println!(
            "Vehicles: {} active, {} spawned, {} completed, {} accidents",
            metrics.vehicles, metrics.total_spawned, metrics.completions, metrics.accidents
        );
        println!(
            "Wait: avg {:.2}s, recent {:.2}s | Speed: avg {:.2}, recent {:.2}",
            metrics.average_wait, metrics.recent_wait, metrics.average_speed, metrics.recent_speed
        );
        println!(
            "Anger: avg {:.2}, peak {:.2}, recent {:.2} ({} reports)",
            metrics.anger.average,
            metrics.anger.peak,
            metrics.anger.recent_average,
            metrics.anger.reports
        );
        println!(
            "Configuration {} | in intersection: {} | reward {:.3}",
            metrics.configuration_index, metrics.cars_in_intersection, metrics.cumulative_reward
        );
        println!();

        println!("--- Lanes ---");
        for lane in LaneId::ALL {
            let stats = self.stats.lane(lane);
            println!(
                "  {:>5}: light={} queue={} completed={} accidents={} anger(avg={:.2}, peak={:.2})",
                lane.short_name(),
                if self.lights.is_green(lane) { "G" } else { "R" },
                stats.vehicle_count,
                stats.completions,
                stats.accidents,
                stats.average_anger(),
                stats.anger_peak
            );
        }

        if !self.vehicles.is_empty() {
            println!("--- Active Vehicles ---");
            for vehicle in self.vehicles.values() {
                println!(
                    "  Vehicle {:?}: lane={} state={} speed={:.1}, position=({:.1}, {:.1}), anger={:.2}",
                    vehicle.id.0 .0,
                    vehicle.lane,
                    vehicle.state.name(),
                    vehicle.speed,
                    vehicle.position.x,
                    vehicle.position.z,
                    vehicle.anger()
                );
            }
        }
    }

    /// Draw the intersection in the terminal
    pub fn draw_map(&self) {
        let extent = self.config.layout.stop_line_distance * 3.0;
        let scale = 0.5; // characters per world unit
        let size = (2.0 * extent * scale) as usize + 1;
        let mut grid = vec![vec![' '; size]; size];

        // World coords to grid coords; north is up
        let to_grid = |pos: &Position| -> Option<(usize, usize)> {
            let col = ((pos.x + extent) * scale).round();
            let row = ((extent - pos.z) * scale).round();
            if col < 0.0 || row < 0.0 || col >= size as f32 || row >= size as f32 {
                None
            } else {
                Some((row as usize, col as usize))
            }
        };

        // Draw lanes
        for lane in LaneId::ALL {
            let light = self.layout.light_position(lane);
            let forward = self.layout.forward(lane);
            let mut t = -extent;
            while t <= self.config.layout.stop_line_distance {
                if let Some((row, col)) = to_grid(&(light + forward * t)) {
                    grid[row][col] = '.';
                }
                t += 1.0;
            }
        }

        // Draw lights
        for light in self.lights.iter() {
            if let Some((row, col)) = to_grid(&self.layout.light_position(light.lane)) {
                grid[row][col] = if light.is_green { 'G' } else { 'R' };
            }
        }

        if let Some((row, col)) = to_grid(&self.layout.center) {
            grid[row][col] = '+';
        }

        // Draw vehicles
        for vehicle in self.vehicles.values() {
            if let Some((row, col)) = to_grid(&vehicle.position) {
                grid[row][col] = match vehicle.state {
                    VehicleState::Crashed => 'X',
                    VehicleState::Turning(_) => 'T',
                    VehicleState::HardStopped => 'S',
                    _ => 'C',
                };
            }
        }

        println!("\n=== Intersection Map ===");
        println!("Legend: G/R=Light, C=Car, S=Stopped, T=Turning, X=Crashed, .=Lane, +=Center");
        println!();
        for row in &grid {
            let line: String = row.iter().collect();
            println!("{}", line.trim_end());
        }
        println!();
    }
}

impl std::fmt::Debug for SimWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimWorld")
            .field("id", &self.id)
            .field("time", &self.time)
            .field("vehicles", &self.vehicles.len())
            .field("policy", &self.policy.name())
            .field("status", &self.controller.status())
            .finish()
    }
}

/// Log a one-line episode report
pub fn log_episode(summary: &EpisodeSummary) {
    info!(
        "Episode {}: {} after {:.1}s, reward {:.3}, {} completed, {} accidents",
        summary.episode,
        summary.reason,
        summary.duration,
        summary.cumulative_reward,
        summary.completions,
        summary.accidents
    );
}
