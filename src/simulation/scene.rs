//! Spatial queries against the vehicles present in the scene
//!
//! Vehicles and the spawner only see the scene through [`SceneQuery`], so the
//! obstacle and clearance checks can be backed by any spatial structure.

use ordered_float::OrderedFloat;

use super::types::{Position, VehicleId, LANE_HALF_WIDTH, SAME_DIRECTION_ALIGNMENT};
use super::vehicle::SimVehicle;

/// Queries a vehicle or the spawner may run against scene geometry
pub trait SceneQuery {
    /// Distance to the nearest same-direction vehicle ahead of `origin`
    /// along `yaw`, within `range`. `ignore` excludes the querying vehicle.
    fn forward_obstacle(
        &self,
        origin: &Position,
        yaw: f32,
        range: f32,
        ignore: Option<VehicleId>,
    ) -> Option<f32>;

    /// True when no vehicle lies within `radius` of `position`
    fn is_clear(&self, position: &Position, radius: f32) -> bool;
}

/// One vehicle as seen by spatial queries
#[derive(Debug, Clone, Copy)]
pub struct SceneEntry {
    pub id: VehicleId,
    pub position: Position,
    pub yaw: f32,
}

/// Flat snapshot of vehicle positions, rebuilt once per tick
#[derive(Debug, Clone, Default)]
pub struct SceneIndex {
    entries: Vec<SceneEntry>,
}

impl SceneIndex {
    pub fn new(entries: Vec<SceneEntry>) -> Self {
        Self { entries }
    }

    /// Snapshot every vehicle still in the scene, crashed or exited included
    pub fn from_vehicles<'a>(vehicles: impl IntoIterator<Item = &'a SimVehicle>) -> Self {
        Self::new(
            vehicles
                .into_iter()
                .map(|vehicle| SceneEntry {
                    id: vehicle.id,
                    position: vehicle.position,
                    yaw: vehicle.yaw,
                })
                .collect(),
        )
    }

    pub fn push(&mut self, entry: SceneEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SceneQuery for SceneIndex {
    fn forward_obstacle(
        &self,
        origin: &Position,
        yaw: f32,
        range: f32,
        ignore: Option<VehicleId>,
    ) -> Option<f32> {
        let direction = Position::from_yaw(yaw);
        self.entries
            .iter()
            .filter(|entry| Some(entry.id) != ignore)
            .filter(|entry| Position::from_yaw(entry.yaw).dot(&direction) >= SAME_DIRECTION_ALIGNMENT)
            .filter_map(|entry| {
                let relative = entry.position - *origin;
                let along = relative.dot(&direction);
                let lateral = relative.cross(&direction).abs();
                (along > 0.0 && along <= range && lateral <= LANE_HALF_WIDTH).then_some(along)
            })
            .min_by_key(|distance| OrderedFloat(*distance))
    }

    fn is_clear(&self, position: &Position, radius: f32) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.position.distance(position) >= radius)
    }
}
