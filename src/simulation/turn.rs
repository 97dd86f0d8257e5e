//! Arc motion for turning vehicles and the lane reassignment table

use super::types::{normalize_yaw, Approach, LaneId, Position, TurnDirection};

/// Sweep tolerance in degrees for declaring a turn complete
pub const TURN_EPSILON_DEGREES: f32 = 1e-3;

/// Lane a vehicle belongs to after turning off `lane`
///
/// Left-turn lanes share their base lane's mapping: a vehicle leaving the
/// northbound approach to the left ends up travelling like west-approach
/// traffic whether it queued in `North` or `NorthLeft`.
pub fn outgoing_lane(lane: LaneId, direction: TurnDirection) -> LaneId {
    use TurnDirection::{Left, Right};
    match (lane.approach(), direction) {
        (Approach::North, Right) => LaneId::East,
        (Approach::North, Left) => LaneId::West,
        (Approach::South, Right) => LaneId::West,
        (Approach::South, Left) => LaneId::East,
        (Approach::East, Right) => LaneId::South,
        (Approach::East, Left) => LaneId::North,
        (Approach::West, Right) => LaneId::North,
        (Approach::West, Left) => LaneId::South,
    }
}

/// An in-progress turn around a fixed pivot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnManeuver {
    pub direction: TurnDirection,
    pub pivot: Position,
    pub radius: f32,
    pub start_yaw: f32,
    /// Signed degrees swept so far
    pub swept_degrees: f32,
    pub target_degrees: f32,
}

impl TurnManeuver {
    /// Start turning from `position`; the radius is fixed by the trigger point
    pub fn begin(direction: TurnDirection, pivot: Position, position: &Position, yaw: f32) -> Self {
        let radius = Position::planar(position.x - pivot.x, position.z - pivot.z).length();
        Self {
            direction,
            pivot,
            radius,
            start_yaw: yaw,
            swept_degrees: 0.0,
            target_degrees: direction.target_sweep_degrees(),
        }
    }

    pub fn remaining_degrees(&self) -> f32 {
        (self.target_degrees - self.swept_degrees).abs()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_degrees() <= TURN_EPSILON_DEGREES
    }

    /// Angular speed in degrees per second for a given linear speed
    pub fn angular_speed(&self, speed: f32, min_rate: f32, max_rate: f32) -> f32 {
        if self.radius <= f32::EPSILON {
            return max_rate;
        }
        (speed / self.radius).to_degrees().clamp(min_rate, max_rate)
    }

    /// Advance along the arc, moving `position` and `yaw` with it
    ///
    /// Returns true once the target sweep is reached; the heading is then
    /// snapped to exactly `start_yaw + target`.
    pub fn step(
        &mut self,
        position: &mut Position,
        yaw: &mut f32,
        speed: f32,
        delta_secs: f32,
        min_rate: f32,
        max_rate: f32,
    ) -> bool {
        if speed > 0.0 && !self.is_complete() {
            let rate = self.angular_speed(speed, min_rate, max_rate);
            let step = (rate * delta_secs).min(self.remaining_degrees());
            let signed = step * self.target_degrees.signum();
            *position = position.rotate_around(&self.pivot, signed.to_radians());
            self.swept_degrees += signed;
            *yaw = normalize_yaw(self.start_yaw + self.swept_degrees.to_radians());
        }

        if self.is_complete() {
            self.swept_degrees = self.target_degrees;
            *yaw = normalize_yaw(self.start_yaw + self.target_degrees.to_radians());
            true
        } else {
            false
        }
    }
}
