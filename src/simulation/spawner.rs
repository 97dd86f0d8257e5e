//! Time-of-day vehicle demand and queue-aware placement
//!
//! The spawner runs a demand clock over the episode. Rush periods shorten the
//! spawn interval and switch to wave spawning, with lane choice biased around
//! a residential approach.

use log::{debug, info, warn};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::fmt;

use super::config::{SpawnerConfig, VehicleConfig};
use super::layout::IntersectionLayout;
use super::scene::SceneQuery;
use super::stats::StatsAggregator;
use super::types::{LaneId, Position, TurnDirection, VehicleId, LANE_COUNT};
use super::vehicle::SimVehicle;

/// Coarse time of day driving spawn rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficPeriod {
    EarlyMorning,
    MorningRush,
    Midday,
    AfternoonRush,
    Evening,
}

impl TrafficPeriod {
    pub fn is_rush(self) -> bool {
        matches!(self, TrafficPeriod::MorningRush | TrafficPeriod::AfternoonRush)
    }
}

impl fmt::Display for TrafficPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrafficPeriod::EarlyMorning => "early morning",
            TrafficPeriod::MorningRush => "morning rush",
            TrafficPeriod::Midday => "midday",
            TrafficPeriod::AfternoonRush => "afternoon rush",
            TrafficPeriod::Evening => "evening",
        };
        f.write_str(name)
    }
}

/// Piecewise mapping from normalized episode time to demand
#[derive(Debug, Clone)]
pub struct DemandSchedule {
    morning_rush: (f32, f32),
    afternoon_rush: (f32, f32),
    base_interval: f32,
    min_interval: f32,
    max_interval: f32,
    rush_multiplier: f32,
    off_peak_multiplier: f32,
}

impl DemandSchedule {
    pub fn new(config: &SpawnerConfig) -> Self {
        Self {
            morning_rush: (config.morning_rush_start, config.morning_rush_end),
            afternoon_rush: (config.afternoon_rush_start, config.afternoon_rush_end),
            base_interval: config.base_spawn_interval,
            min_interval: config.min_spawn_interval,
            max_interval: config.max_spawn_interval,
            rush_multiplier: config.rush_hour_multiplier,
            off_peak_multiplier: config.off_peak_multiplier,
        }
    }

    /// Rush windows are inclusive at both ends
    pub fn period(&self, normalized_time: f32) -> TrafficPeriod {
        let t = normalized_time;
        if t >= self.morning_rush.0 && t <= self.morning_rush.1 {
            TrafficPeriod::MorningRush
        } else if t >= self.afternoon_rush.0 && t <= self.afternoon_rush.1 {
            TrafficPeriod::AfternoonRush
        } else if t < self.morning_rush.0 {
            TrafficPeriod::EarlyMorning
        } else if t < self.afternoon_rush.0 {
            TrafficPeriod::Midday
        } else {
            TrafficPeriod::Evening
        }
    }

    /// Seconds between spawns for a period, clamped to the configured band
    pub fn base_interval(&self, period: TrafficPeriod) -> f32 {
        let interval = match period {
            TrafficPeriod::MorningRush | TrafficPeriod::AfternoonRush => {
                self.base_interval / self.rush_multiplier
            }
            TrafficPeriod::EarlyMorning | TrafficPeriod::Evening => {
                self.base_interval * self.off_peak_multiplier
            }
            TrafficPeriod::Midday => self.base_interval,
        };
        interval.clamp(self.min_interval, self.max_interval)
    }
}

/// Read-only inputs for placing a new vehicle
pub struct SpawnContext<'a> {
    pub layout: &'a IntersectionLayout,
    pub scene: &'a dyn SceneQuery,
    pub vehicle_config: &'a VehicleConfig,
}

#[derive(Debug, Clone, Copy, Default)]
struct WaveState {
    in_wave: bool,
    lane: Option<LaneId>,
    spawned: u32,
    gap_timer: f32,
    car_timer: f32,
}

/// Creates vehicles according to the demand schedule
#[derive(Debug, Clone)]
pub struct Spawner {
    config: SpawnerConfig,
    schedule: DemandSchedule,
    residential_lane: LaneId,
    episode_time: f32,
    normalized_time: f32,
    period: TrafficPeriod,
    spawn_timer: f32,
    spawn_interval: f32,
    wave: WaveState,
}

impl Spawner {
    pub fn new<R: Rng>(config: &SpawnerConfig, rng: &mut R) -> Self {
        let residential_index = config
            .residential_lane
            .unwrap_or_else(|| rng.random_range(0..4));
        let residential_lane = LaneId::from_index(residential_index).unwrap_or(LaneId::North);
        let schedule = DemandSchedule::new(config);
        let period = schedule.period(0.0);
        let mut spawner = Self {
            config: config.clone(),
            spawn_interval: schedule.base_interval(period),
            schedule,
            residential_lane,
            episode_time: 0.0,
            normalized_time: 0.0,
            period,
            spawn_timer: 0.0,
            wave: WaveState::default(),
        };
        spawner.reset(rng);
        spawner
    }

    /// Restart the demand clock at the beginning of an episode
    pub fn reset<R: Rng>(&mut self, rng: &mut R) {
        self.episode_time = 0.0;
        self.normalized_time = 0.0;
        self.period = self.schedule.period(0.0);
        self.wave = WaveState::default();
        self.spawn_interval = self.schedule.base_interval(self.period);
        self.spawn_timer = rng.random_range(0.0..self.spawn_interval);
        debug!(
            "Spawner reset: starting in {} traffic, residential lane {}",
            self.period, self.residential_lane
        );
    }

    pub fn period(&self) -> TrafficPeriod {
        self.period
    }

    pub fn residential_lane(&self) -> LaneId {
        self.residential_lane
    }

    pub fn normalized_time(&self) -> f32 {
        self.normalized_time
    }

    pub fn spawn_interval(&self) -> f32 {
        self.spawn_interval
    }

    pub fn in_wave(&self) -> bool {
        self.wave.in_wave
    }

    fn waves_active(&self) -> bool {
        self.config.enable_wave_spawning && self.period.is_rush()
    }

    /// Advance the demand clock; returns at most one new vehicle
    ///
    /// `id` is used for the vehicle if one is created. The vehicle's spawn is
    /// already reported to `stats`.
    #[allow(clippy::too_many_arguments)]
    pub fn tick<R: Rng>(
        &mut self,
        delta_secs: f32,
        now: f32,
        id: VehicleId,
        ctx: &SpawnContext<'_>,
        stats: &mut StatsAggregator,
        rng: &mut R,
    ) -> Option<SimVehicle> {
        self.episode_time += delta_secs * self.config.time_multiplier;
        self.normalized_time = (self.episode_time / self.config.day_length).clamp(0.0, 1.0);
        self.update_period();

        if self.waves_active() {
            return self.tick_wave(delta_secs, now, id, ctx, stats, rng);
        }

        self.spawn_timer += delta_secs;
        if self.spawn_timer < self.spawn_interval {
            return None;
        }
        self.spawn_timer = 0.0;

        let lane = self.choose_lane(rng)?;
        self.spawn_at_lane(lane, now, id, ctx, stats, rng)
    }

    fn update_period(&mut self) {
        let period = self.schedule.period(self.normalized_time);
        if period != self.period {
            info!(
                "Traffic period changed to {} at {:.1}s ({:.0}%)",
                period,
                self.episode_time,
                self.normalized_time * 100.0
            );
            self.period = period;
            if !period.is_rush() && self.wave.in_wave {
                self.wave = WaveState::default();
            }
        }

        if !self.wave.in_wave {
            self.spawn_interval = self.schedule.base_interval(self.period);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn tick_wave<R: Rng>(
        &mut self,
        delta_secs: f32,
        now: f32,
        id: VehicleId,
        ctx: &SpawnContext<'_>,
        stats: &mut StatsAggregator,
        rng: &mut R,
    ) -> Option<SimVehicle> {
        if !self.wave.in_wave {
            self.wave.gap_timer += delta_secs;
            if self.wave.gap_timer >= self.config.wave_gap_duration {
                let lane = self.choose_wave_lane(rng);
                self.wave = WaveState {
                    in_wave: true,
                    lane: Some(lane),
                    ..WaveState::default()
                };
                info!(
                    "Traffic wave started from lane {} during {} - spawning {} cars",
                    lane, self.period, self.config.cars_per_wave
                );
            }
            return None;
        }

        let lane = self.wave.lane?;
        self.wave.car_timer += delta_secs;
        let mut spawned = None;
        if self.wave.car_timer >= self.config.car_spawn_delay
            && self.wave.spawned < self.config.cars_per_wave
        {
            // A blocked lane stalls the wave rather than skipping cars
            spawned = self.spawn_at_lane(lane, now, id, ctx, stats, rng);
            if spawned.is_some() {
                self.wave.spawned += 1;
                self.wave.car_timer = 0.0;
            }
        }

        if self.wave.spawned >= self.config.cars_per_wave {
            info!(
                "Traffic wave completed from lane {} - spawned {} cars",
                lane, self.wave.spawned
            );
            self.wave = WaveState::default();
        }
        spawned
    }

    /// Lane weights for steady spawning in the current period
    pub fn lane_weights(&self) -> [f32; LANE_COUNT] {
        let mut weights = [1.0; LANE_COUNT];
        let residential = self.residential_lane;
        let residential_left = residential.approach().left_lane();
        match self.period {
            TrafficPeriod::MorningRush => {
                let bias = self.config.morning_residential_bias;
                weights[residential.index()] *= bias;
                weights[residential_left.index()] *= bias * 0.5;
            }
            TrafficPeriod::AfternoonRush => {
                for lane in LaneId::ALL {
                    if lane != residential && lane != residential_left {
                        weights[lane.index()] *= self.config.afternoon_residential_bias;
                    }
                }
            }
            _ => {}
        }
        weights
    }

    fn choose_lane<R: Rng>(&self, rng: &mut R) -> Option<LaneId> {
        let weights = self.lane_weights();
        match LaneId::ALL.choose_weighted(rng, |lane| weights[lane.index()]) {
            Ok(lane) => Some(*lane),
            Err(err) => {
                warn!("Lane weighting failed ({err}); skipping spawn");
                None
            }
        }
    }

    fn choose_wave_lane<R: Rng>(&self, rng: &mut R) -> LaneId {
        let residential = self.residential_lane;
        let any_lane = |rng: &mut R| *LaneId::ALL.choose(rng).unwrap_or(&residential);
        match self.period {
            TrafficPeriod::MorningRush => {
                if rng.random_bool(self.config.wave_commute_chance) {
                    residential
                } else {
                    any_lane(rng)
                }
            }
            TrafficPeriod::AfternoonRush => {
                if rng.random_bool(self.config.wave_commute_chance) {
                    let others: Vec<LaneId> = LaneId::ALL
                        .into_iter()
                        .filter(|lane| *lane != residential)
                        .collect();
                    *others.choose(rng).unwrap_or(&residential)
                } else {
                    residential
                }
            }
            _ => any_lane(rng),
        }
    }

    /// Spawn point if clear, otherwise the first clear slot queued behind it
    pub fn find_spawn_position(
        &self,
        lane: LaneId,
        layout: &IntersectionLayout,
        scene: &dyn SceneQuery,
    ) -> Option<Position> {
        let spawn_point = layout.spawn_point(lane);
        let radius = self.config.spawn_clearance_radius;
        if scene.is_clear(&spawn_point, radius) {
            return Some(spawn_point);
        }

        let backward = layout.forward(lane) * -1.0;
        (1..=self.config.max_queue_length)
            .map(|slot| spawn_point + backward * (slot as f32 * self.config.queue_spacing))
            .find(|candidate| scene.is_clear(candidate, radius))
    }

    fn spawn_at_lane<R: Rng>(
        &self,
        lane: LaneId,
        now: f32,
        id: VehicleId,
        ctx: &SpawnContext<'_>,
        stats: &mut StatsAggregator,
        rng: &mut R,
    ) -> Option<SimVehicle> {
        if stats.current_vehicle_count() as usize >= self.config.max_vehicles {
            debug!("Vehicle cap reached; not spawning on lane {}", lane);
            return None;
        }

        let Some(position) = self.find_spawn_position(lane, ctx.layout, ctx.scene) else {
            debug!("No clear spawn position on lane {} - queue too long", lane);
            return None;
        };

        let turn_plan = if lane.is_left_turn() {
            Some(TurnDirection::Left)
        } else if rng.random_bool(ctx.vehicle_config.right_turn_chance) {
            Some(TurnDirection::Right)
        } else {
            None
        };

        let vehicle = SimVehicle::new(
            id,
            lane,
            position,
            turn_plan,
            now,
            ctx.layout,
            ctx.vehicle_config,
            rng,
        );
        stats.report_spawn(lane);

        let queued_by = position.distance(&ctx.layout.spawn_point(lane));
        if queued_by > 0.1 {
            debug!("Vehicle spawned {:.1} behind spawn point on lane {}", queued_by, lane);
        }
        Some(vehicle)
    }
}
