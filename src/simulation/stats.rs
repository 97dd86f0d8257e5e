//! Per-simulation statistics ledger
//!
//! Vehicles report lifecycle events here; the signal controller and the
//! metrics surface read from it. Exactly one aggregator exists per simulation
//! and it is owned by that simulation's world.

use log::{debug, info};
use serde::Serialize;
use std::collections::VecDeque;

use super::types::{LaneId, SimulationId, LANE_COUNT};

/// Number of samples kept by every rolling average
pub const RECENT_WINDOW: usize = 5;

/// Fixed-capacity window of the most recent samples
#[derive(Debug, Clone, Serialize)]
pub struct RollingWindow {
    values: VecDeque<f32>,
    capacity: usize,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(RECENT_WINDOW)
    }
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Mean of the window, 0 when empty
    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f32>() / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Summary of anger reports, overall or for one lane
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AngerSummary {
    pub total: f32,
    pub average: f32,
    pub peak: f32,
    pub recent_average: f32,
    pub reports: usize,
}

/// Everything tracked for a single lane
#[derive(Debug, Clone, Default, Serialize)]
pub struct LaneStats {
    /// Vehicles currently alive that spawned on this lane
    pub vehicle_count: u32,
    pub total_wait: f32,
    pub recent_wait: RollingWindow,
    pub total_speed: f32,
    pub recent_speed: RollingWindow,
    pub anger_total: f32,
    pub anger_peak: f32,
    pub recent_anger: RollingWindow,
    pub anger_reports: usize,
    /// Longest cumulative wait any vehicle on this lane has reported
    pub peak_wait: f32,
    pub completions: usize,
    pub accidents: usize,
}

impl LaneStats {
    pub fn average_anger(&self) -> f32 {
        if self.anger_reports > 0 {
            self.anger_total / self.anger_reports as f32
        } else {
            0.0
        }
    }

    pub fn anger_summary(&self) -> AngerSummary {
        AngerSummary {
            total: self.anger_total,
            average: self.average_anger(),
            peak: self.anger_peak,
            recent_average: self.recent_anger.average(),
            reports: self.anger_reports,
        }
    }
}

/// The statistics ledger for one simulation instance
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    simulation_id: SimulationId,
    lanes: [LaneStats; LANE_COUNT],
    current_vehicle_count: u32,
    cars_in_intersection: u32,
    total_wait: f32,
    total_speed: f32,
    completions: usize,
    recent_wait: RollingWindow,
    recent_speed: RollingWindow,
    recent_anger: RollingWindow,
    total_anger: f32,
    peak_anger: f32,
    anger_reports: usize,
    accidents: usize,
    last_completion_time: f32,
}

impl StatsAggregator {
    pub fn new(simulation_id: SimulationId) -> Self {
        Self {
            simulation_id,
            lanes: Default::default(),
            current_vehicle_count: 0,
            cars_in_intersection: 0,
            total_wait: 0.0,
            total_speed: 0.0,
            completions: 0,
            recent_wait: RollingWindow::default(),
            recent_speed: RollingWindow::default(),
            recent_anger: RollingWindow::default(),
            total_anger: 0.0,
            peak_anger: 0.0,
            anger_reports: 0,
            accidents: 0,
            last_completion_time: 0.0,
        }
    }

    pub fn simulation_id(&self) -> SimulationId {
        self.simulation_id
    }

    fn lane_mut(&mut self, lane: LaneId) -> &mut LaneStats {
        &mut self.lanes[lane.index()]
    }

    // ---- reports ----

    pub fn report_spawn(&mut self, lane: LaneId) {
        self.lane_mut(lane).vehicle_count += 1;
        self.current_vehicle_count += 1;
    }

    /// Counts are floored at zero; an unmatched destroy is ignored
    pub fn report_destroy(&mut self, lane: LaneId) {
        let stats = self.lane_mut(lane);
        if stats.vehicle_count == 0 {
            debug!("Destroy reported for empty lane {}", lane);
        }
        stats.vehicle_count = stats.vehicle_count.saturating_sub(1);
        self.current_vehicle_count = self.current_vehicle_count.saturating_sub(1);
    }

    /// A vehicle finished (or was force-reported at episode end)
    pub fn report_completed(&mut self, wait: f32, lane: LaneId, speed: f32, now: f32) {
        let stats = self.lane_mut(lane);
        stats.total_wait += wait;
        stats.recent_wait.push(wait);
        stats.total_speed += speed;
        stats.recent_speed.push(speed);
        stats.completions += 1;

        self.total_wait += wait;
        self.total_speed += speed;
        self.recent_wait.push(wait);
        self.recent_speed.push(speed);
        self.completions += 1;
        self.last_completion_time = now;
    }

    pub fn report_anger(&mut self, lane: LaneId, score: f32, cumulative_wait: f32) {
        let stats = self.lane_mut(lane);
        stats.anger_total += score;
        stats.anger_reports += 1;
        stats.anger_peak = stats.anger_peak.max(score);
        stats.recent_anger.push(score);
        stats.peak_wait = stats.peak_wait.max(cumulative_wait);

        self.total_anger += score;
        self.anger_reports += 1;
        self.peak_anger = self.peak_anger.max(score);
        self.recent_anger.push(score);
    }

    pub fn report_enter_intersection(&mut self, _lane: LaneId) {
        self.cars_in_intersection += 1;
    }

    pub fn report_exit_intersection(&mut self, _lane: LaneId) {
        self.cars_in_intersection = self.cars_in_intersection.saturating_sub(1);
    }

    /// Records the accident and removes the vehicle from its lane count
    pub fn report_accident(&mut self, lane: LaneId) {
        self.accidents += 1;
        self.lane_mut(lane).accidents += 1;
        info!(
            "[ACCIDENT] Detected in lane {} (simulation {})",
            lane, self.simulation_id.0
        );
        self.report_destroy(lane);
    }

    // ---- queries ----

    pub fn cars_on_lane(&self, lane: LaneId) -> u32 {
        self.lanes[lane.index()].vehicle_count
    }

    pub fn queue_lengths(&self) -> [u32; LANE_COUNT] {
        LaneId::ALL.map(|lane| self.cars_on_lane(lane))
    }

    pub fn cars_in_intersection(&self) -> u32 {
        self.cars_in_intersection
    }

    pub fn current_vehicle_count(&self) -> u32 {
        self.current_vehicle_count
    }

    pub fn lane(&self, lane: LaneId) -> &LaneStats {
        &self.lanes[lane.index()]
    }

    pub fn lane_anger_stats(&self, lane: LaneId) -> AngerSummary {
        self.lane(lane).anger_summary()
    }

    pub fn overall_anger_stats(&self) -> AngerSummary {
        AngerSummary {
            total: self.total_anger,
            average: if self.anger_reports > 0 {
                self.total_anger / self.anger_reports as f32
            } else {
                0.0
            },
            peak: self.peak_anger,
            recent_average: self.recent_anger.average(),
            reports: self.anger_reports,
        }
    }

    pub fn time_since_last_completion(&self, now: f32) -> f32 {
        (now - self.last_completion_time).max(0.0)
    }

    pub fn completions(&self) -> usize {
        self.completions
    }

    pub fn accidents(&self) -> usize {
        self.accidents
    }

    pub fn average_wait(&self) -> f32 {
        if self.completions > 0 {
            self.total_wait / self.completions as f32
        } else {
            0.0
        }
    }

    pub fn average_speed(&self) -> f32 {
        if self.completions > 0 {
            self.total_speed / self.completions as f32
        } else {
            0.0
        }
    }

    pub fn recent_wait(&self) -> f32 {
        self.recent_wait.average()
    }

    pub fn recent_speed(&self) -> f32 {
        self.recent_speed.average()
    }

    pub fn recent_anger(&self) -> f32 {
        self.recent_anger.average()
    }

    /// Clear everything; the inactivity clock restarts at `now`
    pub fn reset(&mut self, now: f32) {
        let simulation_id = self.simulation_id;
        *self = Self::new(simulation_id);
        self.last_completion_time = now;
    }
}
