//! Fixed geometry of the four-way intersection
//!
//! Every lane is described in a local frame built from its approach's travel
//! direction (`forward`) and right-hand side (`right`), centered on the
//! intersection.

use super::config::LayoutConfig;
use super::types::{LaneId, Position, TurnDirection};

/// Precomputed world-space anchors for one lane
#[derive(Debug, Clone, Copy)]
pub struct LaneGeometry {
    pub lane: LaneId,
    pub spawn_point: Position,
    pub light_position: Position,
    pub yaw: f32,
}

/// World geometry shared by the spawner and every vehicle
#[derive(Debug, Clone)]
pub struct IntersectionLayout {
    pub center: Position,
    lanes: [LaneGeometry; 8],
    /// Distance from the center at which vehicles begin turning
    pub turn_trigger_distance: f32,
    pub exit_distance: f32,
}

impl IntersectionLayout {
    /// Build the layout; `stop_distance_to_light` positions the turn pivots so
    /// arcs start where vehicles enter the intersection.
    pub fn new(config: &LayoutConfig, stop_distance_to_light: f32) -> Self {
        let center = Position::ORIGIN;
        let lanes = LaneId::ALL.map(|lane| {
            let approach = lane.approach();
            let forward = approach.forward();
            let right = approach.right();
            let offset = if lane.is_left_turn() {
                config.left_lane_offset
            } else {
                config.through_lane_offset
            };
            let lateral = right * offset;
            LaneGeometry {
                lane,
                spawn_point: center - forward * config.spawn_distance + lateral,
                light_position: center - forward * config.stop_line_distance + lateral,
                yaw: approach.travel_yaw(),
            }
        });

        Self {
            center,
            lanes,
            turn_trigger_distance: config.stop_line_distance + stop_distance_to_light,
            exit_distance: config.exit_distance,
        }
    }

    pub fn lane(&self, lane: LaneId) -> &LaneGeometry {
        &self.lanes[lane.index()]
    }

    pub fn spawn_point(&self, lane: LaneId) -> Position {
        self.lane(lane).spawn_point
    }

    pub fn light_position(&self, lane: LaneId) -> Position {
        self.lane(lane).light_position
    }

    /// Unit direction of travel on a lane
    pub fn forward(&self, lane: LaneId) -> Position {
        lane.approach().forward()
    }

    /// Fixed pivot a vehicle from `lane` rotates around when turning
    pub fn pivot(&self, lane: LaneId, direction: TurnDirection) -> Position {
        let approach = lane.approach();
        let t = self.turn_trigger_distance;
        let back = self.center - approach.forward() * t;
        match direction {
            TurnDirection::Right => back + approach.right() * t,
            TurnDirection::Left => back - approach.right() * t,
        }
    }

    /// Has a vehicle on `lane` at `position` crossed that lane's exit boundary?
    pub fn has_exited(&self, lane: LaneId, position: &Position) -> bool {
        let along = (*position - self.center).dot(&self.forward(lane));
        along >= self.exit_distance
    }
}

impl Default for IntersectionLayout {
    fn default() -> Self {
        Self::new(&LayoutConfig::default(), 5.0)
    }
}
