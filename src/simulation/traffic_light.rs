//! Traffic lights for the eight controlled lanes
//!
//! Lights are plain green/red booleans. Only the signal controller writes
//! them; vehicles and observers read.

use super::signal::SignalConfiguration;
use super::types::{LaneId, LANE_COUNT};

/// A single light guarding one lane-approach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficLight {
    pub lane: LaneId,
    pub is_green: bool,
}

impl TrafficLight {
    pub fn new(lane: LaneId) -> Self {
        Self {
            lane,
            is_green: false,
        }
    }

    pub fn set_green(&mut self, green: bool) {
        self.is_green = green;
    }
}

/// The full bank of lights at the intersection
#[derive(Debug, Clone)]
pub struct TrafficLights {
    lights: [TrafficLight; LANE_COUNT],
}

impl Default for TrafficLights {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficLights {
    /// All lights start red
    pub fn new() -> Self {
        Self {
            lights: LaneId::ALL.map(TrafficLight::new),
        }
    }

    pub fn get(&self, lane: LaneId) -> Option<&TrafficLight> {
        self.lights.get(lane.index())
    }

    pub fn is_green(&self, lane: LaneId) -> bool {
        self.get(lane).is_some_and(|light| light.is_green)
    }

    /// Apply a configuration verbatim to all lights
    ///
    /// Returns how many lights changed state.
    pub fn apply(&mut self, configuration: &SignalConfiguration) -> usize {
        let mut flips = 0;
        for (light, green) in self.lights.iter_mut().zip(configuration.states()) {
            if light.is_green != green {
                flips += 1;
            }
            light.set_green(green);
        }
        flips
    }

    /// Green/red snapshot in lane order
    pub fn states(&self) -> [bool; LANE_COUNT] {
        self.lights.map(|light| light.is_green)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrafficLight> {
        self.lights.iter()
    }
}
