//! Several independent intersections ticked together
//!
//! Each world keeps its own RNG, statistics and controller, so parallel
//! training environments never share state.

use log::{info, warn};
use std::collections::BTreeMap;

use super::controller::EpisodeSummary;
use super::types::SimulationId;
use super::world::SimWorld;

#[derive(Debug, Default)]
pub struct EnvironmentPool {
    worlds: BTreeMap<SimulationId, SimWorld>,
}

impl EnvironmentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a world; a second world with the same id is rejected
    pub fn add(&mut self, world: SimWorld) -> bool {
        if self.worlds.contains_key(&world.id) {
            warn!(
                "Simulation {} already registered; keeping the first instance",
                world.id.0
            );
            return false;
        }
        self.worlds.insert(world.id, world);
        true
    }

    pub fn get(&self, id: SimulationId) -> Option<&SimWorld> {
        self.worlds.get(&id)
    }

    pub fn get_mut(&mut self, id: SimulationId) -> Option<&mut SimWorld> {
        self.worlds.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    pub fn worlds(&self) -> impl Iterator<Item = &SimWorld> {
        self.worlds.values()
    }

    pub fn begin_all(&mut self) {
        for world in self.worlds.values_mut() {
            world.begin_episode();
        }
        info!("Began episodes for {} simulations", self.worlds.len());
    }

    pub fn tick_all(&mut self, delta_secs: f32) {
        for world in self.worlds.values_mut() {
            world.tick(delta_secs);
        }
    }

    pub fn any_running(&self) -> bool {
        self.worlds.values().any(SimWorld::is_running)
    }

    /// Tick every world until all of their episodes have ended
    pub fn run_until_done(&mut self, delta_secs: f32) -> Vec<(SimulationId, EpisodeSummary)> {
        while self.any_running() {
            self.tick_all(delta_secs);
        }
        self.worlds
            .iter()
            .filter_map(|(id, world)| world.last_summary().map(|summary| (*id, summary.clone())))
            .collect()
    }
}
