//! Signal policies: anything that maps an observation to a table index
//!
//! A learning agent plugs in through the same [`Policy`] trait as the
//! baselines here.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;

use super::controller::EpisodeSummary;
use super::observation::Observation;
use super::signal::ConfigurationTable;
use super::types::LANE_COUNT;

/// Running reward totals a policy keeps for itself
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RewardTally {
    pub cumulative: f32,
    pub last: f32,
    pub decisions: usize,
}

impl RewardTally {
    pub fn record(&mut self, reward: f32) {
        self.cumulative += reward;
        self.last = reward;
        self.decisions += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Interface for all signal policies
pub trait Policy {
    fn name(&self) -> &str;

    /// Pick a configuration index for the coming decision interval
    ///
    /// Out-of-range indices are tolerated; the controller falls back to
    /// all-red.
    fn choose(&mut self, obs: &Observation, table: &ConfigurationTable) -> usize;

    /// Index matching the current lights, used for manual control
    fn heuristic(&self, current_lights: &[bool; LANE_COUNT], table: &ConfigurationTable) -> usize {
        table
            .index_of(current_lights)
            .unwrap_or(ConfigurationTable::ALL_RED)
    }

    fn tally(&self) -> &RewardTally;

    fn tally_mut(&mut self) -> &mut RewardTally;

    /// Accumulate the reward earned by the last decision (or a terminal event)
    fn record_reward(&mut self, reward: f32) {
        self.tally_mut().record(reward);
    }

    fn cumulative_reward(&self) -> f32 {
        self.tally().cumulative
    }

    fn on_episode_end(&mut self, _summary: &EpisodeSummary) {}

    /// Called when a new episode begins
    fn reset_episode(&mut self) {
        self.tally_mut().reset();
    }
}

/// Round-robin over every configuration except all-red
#[derive(Debug, Clone, Default)]
pub struct FixedCyclePolicy {
    next: usize,
    tally: RewardTally,
}

impl FixedCyclePolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for FixedCyclePolicy {
    fn name(&self) -> &str {
        "cycle"
    }

    fn choose(&mut self, _obs: &Observation, table: &ConfigurationTable) -> usize {
        let phases = table.len().saturating_sub(1);
        if phases == 0 {
            return ConfigurationTable::ALL_RED;
        }
        let index = 1 + self.next % phases;
        self.next = (self.next + 1) % phases;
        index
    }

    fn tally(&self) -> &RewardTally {
        &self.tally
    }

    fn tally_mut(&mut self) -> &mut RewardTally {
        &mut self.tally
    }

    fn reset_episode(&mut self) {
        self.tally.reset();
        self.next = 0;
    }
}

/// Uniformly random configuration each decision
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: StdRng,
    tally: RewardTally,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            tally: RewardTally::default(),
        }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn choose(&mut self, _obs: &Observation, table: &ConfigurationTable) -> usize {
        if table.is_empty() {
            return ConfigurationTable::ALL_RED;
        }
        self.rng.random_range(0..table.len())
    }

    fn tally(&self) -> &RewardTally {
        &self.tally
    }

    fn tally_mut(&mut self) -> &mut RewardTally {
        &mut self.tally
    }
}

/// Greedy policy serving the configuration with the most queued pressure
///
/// Pressure of a configuration is the sum over its green lanes of queue
/// length plus weighted rolling anger. With nothing queued the current
/// configuration is held.
#[derive(Debug, Clone)]
pub struct QueuePressurePolicy {
    pub anger_weight: f32,
    tally: RewardTally,
}

impl Default for QueuePressurePolicy {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl QueuePressurePolicy {
    pub fn new(anger_weight: f32) -> Self {
        Self {
            anger_weight,
            tally: RewardTally::default(),
        }
    }

    fn pressure(&self, obs: &Observation, table: &ConfigurationTable, index: usize) -> f32 {
        table.get(index).map_or(0.0, |configuration| {
            configuration
                .green_lanes()
                .map(|lane| {
                    obs.queue_lengths[lane.index()] as f32
                        + self.anger_weight * obs.lane_anger[lane.index()]
                })
                .sum()
        })
    }
}

impl Policy for QueuePressurePolicy {
    fn name(&self) -> &str {
        "pressure"
    }

    fn choose(&mut self, obs: &Observation, table: &ConfigurationTable) -> usize {
        if obs.total_queued() == 0 {
            return obs.configuration_index;
        }
        // Highest pressure wins; ties go to the lower index
        (0..table.len())
            .map(|index| (index, self.pressure(obs, table, index)))
            .max_by_key(|(index, pressure)| (OrderedFloat(*pressure), Reverse(*index)))
            .map_or(ConfigurationTable::ALL_RED, |(index, _)| index)
    }

    fn tally(&self) -> &RewardTally {
        &self.tally
    }

    fn tally_mut(&mut self) -> &mut RewardTally {
        &mut self.tally
    }
}

/// Holds whatever the lights currently show
#[derive(Debug, Clone, Default)]
pub struct ManualPolicy {
    tally: RewardTally,
}

impl ManualPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for ManualPolicy {
    fn name(&self) -> &str {
        "manual"
    }

    fn choose(&mut self, obs: &Observation, table: &ConfigurationTable) -> usize {
        self.heuristic(&obs.light_states, table)
    }

    fn tally(&self) -> &RewardTally {
        &self.tally
    }

    fn tally_mut(&mut self) -> &mut RewardTally {
        &mut self.tally
    }
}
