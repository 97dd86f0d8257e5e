//! Tunable parameters for every simulation component
//!
//! All structs default to the values the intersection was calibrated with and
//! can be partially overridden from a JSON file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::reward::RewardWeights;
use super::types::LANE_COUNT;

/// Per-vehicle kinematics, perception and frustration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub max_speed: f32,
    pub acceleration: f32,
    /// Deceleration as a multiple of `acceleration`
    pub deceleration: f32,
    /// Floor speed while braking, as a fraction of `max_speed`
    pub floor_speed_fraction: f32,
    pub deceleration_distance: f32,
    /// Hard-stop distance in front of a red light
    pub stop_distance_to_light: f32,
    /// Minimum following distance behind another vehicle
    pub stop_distance_to_car: f32,
    /// Heading alignment above which the light still lies ahead
    pub approach_alignment_threshold: f32,
    pub light_check_interval: f32,
    pub car_detection_interval: f32,
    pub anger_log_interval: f32,
    pub anger_growth_rate: f32,
    /// Seconds of waiting before anger starts to grow
    pub wait_time_threshold: f32,
    pub min_turn_rate_degrees: f32,
    pub max_turn_rate_degrees: f32,
    /// Probability that a through-lane vehicle turns right
    pub right_turn_chance: f64,
    /// Grace delay between exit/crash and removal from the scene
    pub removal_delay: f32,
    pub collision_distance: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            max_speed: 10.0,
            acceleration: 5.0,
            deceleration: 1.0,
            floor_speed_fraction: 0.1,
            deceleration_distance: 10.0,
            stop_distance_to_light: 5.0,
            stop_distance_to_car: 5.0,
            approach_alignment_threshold: 0.1,
            light_check_interval: 0.1,
            car_detection_interval: 0.05,
            anger_log_interval: 2.0,
            anger_growth_rate: 0.5,
            wait_time_threshold: 1.0,
            min_turn_rate_degrees: 20.0,
            max_turn_rate_degrees: 120.0,
            right_turn_chance: 0.3,
            removal_delay: 5.0,
            collision_distance: 2.5,
        }
    }
}

impl VehicleConfig {
    pub fn floor_speed(&self) -> f32 {
        self.max_speed * self.floor_speed_fraction
    }
}

/// Demand curve, wave bursts and queue-aware placement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    pub base_spawn_interval: f32,
    pub min_spawn_interval: f32,
    pub max_spawn_interval: f32,
    /// Simulated seconds that make up one full day of demand
    pub day_length: f32,
    /// How fast the demand clock runs relative to simulation time
    pub time_multiplier: f32,
    pub morning_rush_start: f32,
    pub morning_rush_end: f32,
    pub afternoon_rush_start: f32,
    pub afternoon_rush_end: f32,
    pub rush_hour_multiplier: f32,
    pub off_peak_multiplier: f32,
    pub enable_wave_spawning: bool,
    pub cars_per_wave: u32,
    pub car_spawn_delay: f32,
    pub wave_gap_duration: f32,
    /// Through lane (0..4) representing the residential area; random when unset
    pub residential_lane: Option<usize>,
    pub morning_residential_bias: f32,
    pub afternoon_residential_bias: f32,
    /// Chance that a rush-hour wave follows the commuting direction
    pub wave_commute_chance: f64,
    pub spawn_clearance_radius: f32,
    pub queue_spacing: f32,
    pub max_queue_length: u32,
    pub max_vehicles: usize,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            base_spawn_interval: 3.0,
            min_spawn_interval: 0.5,
            max_spawn_interval: 8.0,
            day_length: 120.0,
            time_multiplier: 1.0,
            morning_rush_start: 0.15,
            morning_rush_end: 0.35,
            afternoon_rush_start: 0.65,
            afternoon_rush_end: 0.85,
            rush_hour_multiplier: 3.0,
            off_peak_multiplier: 1.5,
            enable_wave_spawning: true,
            cars_per_wave: 8,
            car_spawn_delay: 0.3,
            wave_gap_duration: 5.0,
            residential_lane: None,
            morning_residential_bias: 3.0,
            afternoon_residential_bias: 2.5,
            wave_commute_chance: 0.7,
            spawn_clearance_radius: 3.5,
            queue_spacing: 6.0,
            max_queue_length: 8,
            max_vehicles: 100,
        }
    }
}

/// Decision cadence, episode limits and reward shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub decision_interval: f32,
    pub max_episode_time: f32,
    /// End the episode early when nothing completes for this long
    pub max_inactivity_time: f32,
    /// Start episodes on a random table configuration instead of all-red
    pub randomize_initial_lights: bool,
    /// Additional configurations appended to the standard table
    pub extra_configurations: Vec<[bool; LANE_COUNT]>,
    pub weights: RewardWeights,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            decision_interval: 5.0,
            max_episode_time: 120.0,
            max_inactivity_time: 30.0,
            randomize_initial_lights: true,
            extra_configurations: Vec::new(),
            weights: RewardWeights::default(),
        }
    }
}

/// Intersection geometry, measured from the intersection center
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub through_lane_offset: f32,
    pub left_lane_offset: f32,
    /// Distance of each light (stop line) from the center
    pub stop_line_distance: f32,
    pub spawn_distance: f32,
    pub exit_distance: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            through_lane_offset: 6.0,
            left_lane_offset: 2.0,
            stop_line_distance: 14.0,
            spawn_distance: 80.0,
            exit_distance: 70.0,
        }
    }
}

/// Top-level configuration for one simulation instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the shared RNG; drawn from entropy when unset
    pub seed: Option<u64>,
    pub tick_delta: f32,
    pub time_scale: f32,
    pub vehicle: VehicleConfig,
    pub spawner: SpawnerConfig,
    pub controller: ControllerConfig,
    pub layout: LayoutConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tick_delta: 0.05,
            time_scale: 1.0,
            vehicle: VehicleConfig::default(),
            spawner: SpawnerConfig::default(),
            controller: ControllerConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Load a JSON config, filling anything missing with defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: SimConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make the kinematics or schedule degenerate
    pub fn validate(&self) -> Result<()> {
        let v = &self.vehicle;
        if v.max_speed <= 0.0 || v.acceleration <= 0.0 || v.deceleration <= 0.0 {
            bail!("Vehicle speed and acceleration limits must be positive");
        }
        if !(0.0..1.0).contains(&v.floor_speed_fraction) {
            bail!("floor_speed_fraction must be in [0, 1)");
        }
        if v.deceleration_distance <= v.stop_distance_to_light
            || v.deceleration_distance <= v.stop_distance_to_car
        {
            bail!(
                "deceleration_distance ({}) must exceed both stop distances",
                v.deceleration_distance
            );
        }
        if v.light_check_interval <= 0.0
            || v.car_detection_interval <= 0.0
            || v.anger_log_interval <= 0.0
        {
            bail!("Vehicle check intervals must be positive");
        }
        if v.min_turn_rate_degrees <= 0.0 || v.min_turn_rate_degrees > v.max_turn_rate_degrees {
            bail!("Turn rate band must satisfy 0 < min <= max");
        }
        if !(0.0..=1.0).contains(&v.right_turn_chance) {
            bail!("right_turn_chance must be a probability");
        }

        let s = &self.spawner;
        if s.min_spawn_interval <= 0.0 || s.min_spawn_interval > s.max_spawn_interval {
            bail!("Spawn interval band must satisfy 0 < min <= max");
        }
        if s.day_length <= 0.0 || s.time_multiplier <= 0.0 {
            bail!("Demand clock must advance");
        }
        let windows = [
            s.morning_rush_start,
            s.morning_rush_end,
            s.afternoon_rush_start,
            s.afternoon_rush_end,
        ];
        if windows.iter().any(|w| !(0.0..=1.0).contains(w))
            || windows.windows(2).any(|pair| pair[0] > pair[1])
        {
            bail!("Rush hour windows must be ordered within [0, 1]");
        }
        if let Some(lane) = s.residential_lane {
            if lane >= 4 {
                bail!("residential_lane must name a through lane (0..4), got {lane}");
            }
        }
        if s.spawn_clearance_radius <= 0.0 || s.queue_spacing <= 0.0 {
            bail!("Spawn clearance and queue spacing must be positive");
        }

        let c = &self.controller;
        if c.decision_interval <= 0.0 || c.max_episode_time <= 0.0 {
            bail!("Controller intervals must be positive");
        }

        let l = &self.layout;
        if l.left_lane_offset <= 0.0 || l.through_lane_offset <= l.left_lane_offset {
            bail!("Through lane must sit outside the left-turn lane");
        }
        if l.spawn_distance <= l.stop_line_distance + v.deceleration_distance {
            bail!("Vehicles must spawn before the deceleration zone");
        }
        if self.tick_delta <= 0.0 || self.time_scale <= 0.0 {
            bail!("tick_delta and time_scale must be positive");
        }
        Ok(())
    }
}
