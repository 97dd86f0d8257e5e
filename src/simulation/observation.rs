//! Snapshot of intersection state presented to the signal policy

use serde::Serialize;

use super::stats::StatsAggregator;
use super::traffic_light::TrafficLights;
use super::types::{LaneId, LANE_COUNT};

/// Length of [`Observation::to_vec`]
pub const OBSERVATION_SIZE: usize = 3 * LANE_COUNT + 10;

/// What the controller sees at a decision point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub queue_lengths: [u32; LANE_COUNT],
    /// Rolling anger per lane
    pub lane_anger: [f32; LANE_COUNT],
    pub cars_in_intersection: u32,
    pub accidents: usize,
    pub completions: usize,
    pub time_since_last_completion: f32,
    pub recent_wait: f32,
    pub recent_speed: f32,
    pub recent_anger: f32,
    pub peak_anger: f32,
    pub light_states: [bool; LANE_COUNT],
    pub configuration_index: usize,
    pub configuration_count: usize,
    /// Fraction of the decision interval elapsed
    pub decision_progress: f32,
    /// Fraction of the episode elapsed
    pub episode_progress: f32,
}

impl Default for Observation {
    fn default() -> Self {
        Self {
            queue_lengths: [0; LANE_COUNT],
            lane_anger: [0.0; LANE_COUNT],
            cars_in_intersection: 0,
            accidents: 0,
            completions: 0,
            time_since_last_completion: 0.0,
            recent_wait: 0.0,
            recent_speed: 0.0,
            recent_anger: 0.0,
            peak_anger: 0.0,
            light_states: [false; LANE_COUNT],
            configuration_index: 0,
            configuration_count: 1,
            decision_progress: 0.0,
            episode_progress: 0.0,
        }
    }
}

impl Observation {
    #[allow(clippy::too_many_arguments)]
    pub fn collect(
        stats: &StatsAggregator,
        lights: &TrafficLights,
        configuration_index: usize,
        configuration_count: usize,
        decision_progress: f32,
        episode_progress: f32,
        now: f32,
    ) -> Self {
        let anger = stats.overall_anger_stats();
        Self {
            queue_lengths: stats.queue_lengths(),
            lane_anger: LaneId::ALL.map(|lane| stats.lane_anger_stats(lane).recent_average),
            cars_in_intersection: stats.cars_in_intersection(),
            accidents: stats.accidents(),
            completions: stats.completions(),
            time_since_last_completion: stats.time_since_last_completion(now),
            recent_wait: stats.recent_wait(),
            recent_speed: stats.recent_speed(),
            recent_anger: anger.recent_average,
            peak_anger: anger.peak,
            light_states: lights.states(),
            configuration_index,
            configuration_count: configuration_count.max(1),
            decision_progress,
            episode_progress,
        }
    }

    pub fn total_queued(&self) -> u32 {
        self.queue_lengths.iter().sum()
    }

    /// Flat feature vector in a fixed order
    pub fn to_vec(&self) -> Vec<f32> {
        let mut features = Vec::with_capacity(OBSERVATION_SIZE);
        features.extend(self.queue_lengths.iter().map(|count| *count as f32));
        features.extend(self.lane_anger.iter().copied());
        features.push(self.cars_in_intersection as f32);
        features.push(self.accidents as f32);
        features.push(self.time_since_last_completion);
        features.push(self.recent_wait);
        features.push(self.recent_speed);
        features.push(self.recent_anger);
        features.push(self.peak_anger);
        features.extend(
            self.light_states
                .iter()
                .map(|green| if *green { 1.0 } else { 0.0 }),
        );
        features.push(self.configuration_index as f32 / self.configuration_count as f32);
        features.push(self.decision_progress);
        features.push(self.episode_progress);
        features
    }
}
