//! Reward shaping for the signal controller
//!
//! A decision's reward is a pure function of the observation before the
//! decision, the configuration applied, and the observation after it.

use serde::{Deserialize, Serialize};

use super::observation::Observation;
use super::signal::SignalConfiguration;
use super::types::LaneId;

/// Configurable weights and normalizers for reward computation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    pub speed_weight: f32,
    /// Recent speed at which the speed term saturates
    pub speed_normalizer: f32,
    pub wait_weight: f32,
    /// Recent wait at which the wait term saturates
    pub wait_normalizer: f32,
    pub congestion_weight: f32,
    /// Queue length above which a lane counts as congested
    pub congestion_threshold: u32,
    pub congestion_scale: f32,
    pub anger_weight: f32,
    pub anger_normalizer: f32,
    pub anger_reduction_weight: f32,
    /// Rolling lane anger above which a lane needs attention
    pub high_anger_threshold: f32,
    /// Penalty per high-anger lane left red
    pub peak_anger_weight: f32,
    /// Bonus per high-anger lane given green
    pub peak_anger_green_bonus: f32,
    pub stability_penalty: bool,
    pub stability_weight: f32,
    /// Light flips per decision tolerated before the stability penalty
    pub max_light_flips: usize,
    /// Flat penalty for holding all-red while vehicles are queued
    pub all_red_penalty: f32,
    pub car_passed_weight: f32,
    pub speed_bonus_normalizer: f32,
    pub accident_penalty: f32,
    /// Terminal bonus for reaching the episode time limit
    pub time_limit_bonus: f32,
    /// Terminal penalty for ending on inactivity
    pub inactivity_penalty: f32,
    /// Terminal bonus for an episode without accidents
    pub no_accident_bonus: f32,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            speed_weight: 1.0,
            speed_normalizer: 10.0,
            wait_weight: 0.5,
            wait_normalizer: 30.0,
            congestion_weight: 0.1,
            congestion_threshold: 5,
            congestion_scale: 0.3,
            anger_weight: 0.3,
            anger_normalizer: 10.0,
            anger_reduction_weight: 0.2,
            high_anger_threshold: 8.0,
            peak_anger_weight: 0.5,
            peak_anger_green_bonus: 0.25,
            stability_penalty: true,
            stability_weight: 0.1,
            max_light_flips: 2,
            all_red_penalty: 0.1,
            car_passed_weight: 0.5,
            speed_bonus_normalizer: 25.0,
            accident_penalty: 1.0,
            time_limit_bonus: 0.1,
            inactivity_penalty: 0.2,
            no_accident_bonus: 10.0,
        }
    }
}

fn normalized(value: f32, normalizer: f32) -> f32 {
    if normalizer > 0.0 {
        (value / normalizer).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Individual reward terms for one decision; penalties are stored negative
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RewardComponents {
    pub speed: f32,
    pub wait: f32,
    pub congestion: f32,
    pub anger: f32,
    pub anger_reduction: f32,
    pub peak_anger: f32,
    pub stability: f32,
    pub all_red: f32,
    /// Completions and accidents since the previous decision
    pub events: f32,
}

impl RewardComponents {
    pub fn compute(
        prev: &Observation,
        configuration: &SignalConfiguration,
        flips: usize,
        obs: &Observation,
        weights: &RewardWeights,
    ) -> Self {
        let speed = normalized(obs.recent_speed, weights.speed_normalizer) * weights.speed_weight;
        let wait = -normalized(obs.recent_wait, weights.wait_normalizer) * weights.wait_weight;

        let congestion = -obs
            .queue_lengths
            .iter()
            .filter(|count| **count > weights.congestion_threshold)
            .map(|count| {
                (count - weights.congestion_threshold) as f32
                    * weights.congestion_weight
                    * weights.congestion_scale
            })
            .sum::<f32>();

        let anger = -normalized(obs.recent_anger, weights.anger_normalizer) * weights.anger_weight;
        let anger_drop = prev.recent_anger - obs.recent_anger;
        let anger_reduction = if anger_drop > 0.0 {
            normalized(anger_drop, weights.anger_normalizer) * weights.anger_reduction_weight
        } else {
            0.0
        };

        let peak_anger = LaneId::ALL
            .into_iter()
            .filter(|lane| obs.lane_anger[lane.index()] > weights.high_anger_threshold)
            .map(|lane| {
                if configuration.is_green(lane) {
                    weights.peak_anger_green_bonus
                } else {
                    -weights.peak_anger_weight
                }
            })
            .sum::<f32>();

        let stability = if weights.stability_penalty && flips > weights.max_light_flips {
            -((flips - weights.max_light_flips) as f32) * weights.stability_weight
        } else {
            0.0
        };

        let all_red = if configuration.is_all_red() && obs.total_queued() > 0 {
            -weights.all_red_penalty
        } else {
            0.0
        };

        let completed = obs.completions.saturating_sub(prev.completions) as f32;
        let accidents = obs.accidents.saturating_sub(prev.accidents) as f32;
        let per_car = (normalized(obs.recent_speed, weights.speed_bonus_normalizer) + 1.0)
            * weights.car_passed_weight;
        let events = completed * per_car - accidents * weights.accident_penalty;

        Self {
            speed,
            wait,
            congestion,
            anger,
            anger_reduction,
            peak_anger,
            stability,
            all_red,
            events,
        }
    }

    pub fn total(&self) -> f32 {
        self.speed
            + self.wait
            + self.congestion
            + self.anger
            + self.anger_reduction
            + self.peak_anger
            + self.stability
            + self.all_red
            + self.events
    }
}
