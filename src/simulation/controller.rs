//! Signal controller: decision cadence, episode lifecycle and rewards
//!
//! Every decision interval the controller observes the intersection, asks
//! the policy for a configuration index, applies that configuration to all
//! lights and scores the transition. Episode termination is checked on
//! every tick.

use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use std::fmt;

use super::config::ControllerConfig;
use super::observation::Observation;
use super::policy::Policy;
use super::reward::{RewardComponents, RewardWeights};
use super::signal::ConfigurationTable;
use super::stats::StatsAggregator;
use super::traffic_light::TrafficLights;

/// Why an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    TimeLimit,
    /// No vehicle completed for longer than the inactivity limit
    Inactivity,
}

impl TerminationReason {
    pub fn is_early_stop(self) -> bool {
        matches!(self, TerminationReason::Inactivity)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::TimeLimit => f.write_str("time limit"),
            TerminationReason::Inactivity => f.write_str("inactivity"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EpisodeStatus {
    NotStarted,
    Running,
    Ended(TerminationReason),
}

/// What happened on one controller tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerTick {
    Idle,
    Decision { index: usize, reward: f32 },
    EpisodeEnded(TerminationReason),
}

/// Running totals for the current episode
#[derive(Debug, Clone, Default, Serialize)]
pub struct EpisodeLedger {
    pub cumulative_reward: f32,
    pub decisions: usize,
    pub terminal_reward: f32,
    pub inactivity_penalties: usize,
    pub last_components: RewardComponents,
}

/// Final account of a finished episode
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeSummary {
    pub episode: u64,
    pub reason: TerminationReason,
    pub duration: f32,
    pub decisions: usize,
    pub cumulative_reward: f32,
    pub terminal_reward: f32,
    pub completions: usize,
    pub accidents: usize,
    pub inactivity_penalties: usize,
    pub no_accident_bonus: bool,
}

/// Drives the lights from a policy
#[derive(Debug, Clone)]
pub struct SignalController {
    config: ControllerConfig,
    table: ConfigurationTable,
    decision_timer: f32,
    episode_timer: f32,
    current_index: usize,
    prev_observation: Observation,
    ledger: EpisodeLedger,
    status: EpisodeStatus,
    episode: u64,
}

impl SignalController {
    pub fn new(config: ControllerConfig, table: ConfigurationTable) -> Self {
        Self {
            config,
            table,
            decision_timer: 0.0,
            episode_timer: 0.0,
            current_index: ConfigurationTable::ALL_RED,
            prev_observation: Observation::default(),
            ledger: EpisodeLedger::default(),
            status: EpisodeStatus::NotStarted,
            episode: 0,
        }
    }

    pub fn table(&self) -> &ConfigurationTable {
        &self.table
    }

    pub fn weights(&self) -> &RewardWeights {
        &self.config.weights
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == EpisodeStatus::Running
    }

    pub fn ledger(&self) -> &EpisodeLedger {
        &self.ledger
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn episode_time(&self) -> f32 {
        self.episode_timer
    }

    /// Observation as the policy would see it now
    pub fn observe(&self, now: f32, lights: &TrafficLights, stats: &StatsAggregator) -> Observation {
        Observation::collect(
            stats,
            lights,
            self.current_index,
            self.table.len(),
            self.decision_timer / self.config.decision_interval,
            self.episode_timer / self.config.max_episode_time,
            now,
        )
    }

    /// Apply table entry `index` verbatim to every light
    ///
    /// An out-of-range index falls back to all-red. Returns how many lights
    /// flipped.
    pub fn apply_configuration(&mut self, index: usize, lights: &mut TrafficLights) -> usize {
        let index = if self.table.get(index).is_some() {
            index
        } else {
            warn!(
                "Invalid configuration index: {}. Using configuration {} (all red).",
                index,
                ConfigurationTable::ALL_RED
            );
            ConfigurationTable::ALL_RED
        };

        self.current_index = index;
        let configuration = self.table.get(index).unwrap_or_else(|| self.table.all_red());
        lights.apply(configuration)
    }

    /// Start a new episode; stats and vehicles must already be cleared
    pub fn begin_episode<R: Rng>(
        &mut self,
        now: f32,
        lights: &mut TrafficLights,
        stats: &StatsAggregator,
        policy: &mut dyn Policy,
        rng: &mut R,
    ) {
        self.episode += 1;
        self.decision_timer = 0.0;
        self.episode_timer = 0.0;
        self.ledger = EpisodeLedger::default();

        let initial = if self.config.randomize_initial_lights && !self.table.is_empty() {
            rng.random_range(0..self.table.len())
        } else {
            ConfigurationTable::ALL_RED
        };
        self.apply_configuration(initial, lights);
        self.prev_observation = self.observe(now, lights, stats);
        self.status = EpisodeStatus::Running;
        policy.reset_episode();

        info!(
            "Episode {} began with configuration {} ({})",
            self.episode,
            self.current_index,
            self.table
                .get(self.current_index)
                .map_or("all red", |c| c.label.as_str())
        );
    }

    /// Advance timers; decide on the interval and check termination
    pub fn tick(
        &mut self,
        delta_secs: f32,
        now: f32,
        lights: &mut TrafficLights,
        stats: &StatsAggregator,
        policy: &mut dyn Policy,
    ) -> ControllerTick {
        if !self.is_running() {
            return ControllerTick::Idle;
        }

        self.decision_timer += delta_secs;
        self.episode_timer += delta_secs;

        let mut outcome = ControllerTick::Idle;
        if self.decision_timer >= self.config.decision_interval {
            self.decision_timer = 0.0;
            let (index, reward) = self.decide(now, lights, stats, policy);
            outcome = ControllerTick::Decision { index, reward };
        }

        if self.episode_timer >= self.config.max_episode_time {
            return ControllerTick::EpisodeEnded(TerminationReason::TimeLimit);
        }
        if stats.time_since_last_completion(now) > self.config.max_inactivity_time {
            return ControllerTick::EpisodeEnded(TerminationReason::Inactivity);
        }
        outcome
    }

    fn decide(
        &mut self,
        now: f32,
        lights: &mut TrafficLights,
        stats: &StatsAggregator,
        policy: &mut dyn Policy,
    ) -> (usize, f32) {
        let observation = self.observe(now, lights, stats);
        let requested = policy.choose(&observation, &self.table);
        let flips = self.apply_configuration(requested, lights);
        let configuration = self
            .table
            .get(self.current_index)
            .unwrap_or_else(|| self.table.all_red());

        let components = RewardComponents::compute(
            &self.prev_observation,
            configuration,
            flips,
            &observation,
            &self.config.weights,
        );
        let reward = components.total();

        policy.record_reward(reward);
        self.ledger.cumulative_reward += reward;
        self.ledger.decisions += 1;
        self.ledger.last_components = components;
        self.prev_observation = observation;

        debug!(
            "Decision {}: configuration {} ({} flips), reward {:.3}, cumulative {:.3}",
            self.ledger.decisions, self.current_index, flips, reward, self.ledger.cumulative_reward
        );
        (self.current_index, reward)
    }

    /// Close the episode, applying terminal rewards exactly once
    ///
    /// Returns `None` if no episode is running.
    pub fn end_episode(
        &mut self,
        reason: TerminationReason,
        stats: &StatsAggregator,
        policy: &mut dyn Policy,
    ) -> Option<EpisodeSummary> {
        if !self.is_running() {
            return None;
        }

        let weights = &self.config.weights;
        let mut terminal = match reason {
            TerminationReason::TimeLimit => weights.time_limit_bonus,
            TerminationReason::Inactivity => {
                self.ledger.inactivity_penalties += 1;
                -weights.inactivity_penalty
            }
        };
        let no_accident_bonus = stats.accidents() == 0;
        if no_accident_bonus {
            terminal += weights.no_accident_bonus;
        }

        policy.record_reward(terminal);
        self.ledger.terminal_reward += terminal;
        self.ledger.cumulative_reward += terminal;
        self.status = EpisodeStatus::Ended(reason);

        let summary = EpisodeSummary {
            episode: self.episode,
            reason,
            duration: self.episode_timer,
            decisions: self.ledger.decisions,
            cumulative_reward: self.ledger.cumulative_reward,
            terminal_reward: self.ledger.terminal_reward,
            completions: stats.completions(),
            accidents: stats.accidents(),
            inactivity_penalties: self.ledger.inactivity_penalties,
            no_accident_bonus,
        };
        policy.on_episode_end(&summary);

        info!(
            "Episode {} ended ({}) after {:.1}s: {} decisions, reward {:.3}, {} completed, {} accidents",
            summary.episode,
            reason,
            summary.duration,
            summary.decisions,
            summary.cumulative_reward,
            summary.completions,
            summary.accidents
        );
        Some(summary)
    }
}
