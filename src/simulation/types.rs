//! Core types for the intersection simulation
//!
//! Identifiers, lane/approach enums and the planar position math shared by
//! every component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimId(pub usize);

/// A wrapper type for vehicle IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub SimId);

/// Identifies one running simulation instance (one intersection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimulationId(pub u32);

/// Number of lane-approaches controlled by the signal
pub const LANE_COUNT: usize = 8;

/// The compass arm a vehicle enters the intersection from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Approach {
    North,
    South,
    East,
    West,
}

impl Approach {
    pub const ALL: [Approach; 4] = [
        Approach::North,
        Approach::South,
        Approach::East,
        Approach::West,
    ];

    /// Heading (yaw) of vehicles travelling in from this arm
    pub fn travel_yaw(self) -> f32 {
        use std::f32::consts::{FRAC_PI_2, PI};
        match self {
            Approach::North => PI,
            Approach::South => 0.0,
            Approach::East => -FRAC_PI_2,
            Approach::West => FRAC_PI_2,
        }
    }

    /// Unit vector of travel for vehicles entering from this arm
    pub fn forward(self) -> Position {
        Position::from_yaw(self.travel_yaw())
    }

    /// Unit vector pointing to the right-hand side of travel
    pub fn right(self) -> Position {
        self.forward().right_of()
    }

    pub fn opposite(self) -> Approach {
        match self {
            Approach::North => Approach::South,
            Approach::South => Approach::North,
            Approach::East => Approach::West,
            Approach::West => Approach::East,
        }
    }

    /// True for the north/south axis
    pub fn is_north_south(self) -> bool {
        matches!(self, Approach::North | Approach::South)
    }

    pub fn through_lane(self) -> LaneId {
        match self {
            Approach::North => LaneId::North,
            Approach::South => LaneId::South,
            Approach::East => LaneId::East,
            Approach::West => LaneId::West,
        }
    }

    pub fn left_lane(self) -> LaneId {
        match self {
            Approach::North => LaneId::NorthLeft,
            Approach::South => LaneId::SouthLeft,
            Approach::East => LaneId::EastLeft,
            Approach::West => LaneId::WestLeft,
        }
    }
}

/// One of the 8 signal-controlled lanes: four approaches × {through, left turn}
///
/// The discriminant order is the signal vector order used by configurations
/// and observations: `[N, S, E, W, NLeft, SLeft, ELeft, WLeft]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LaneId {
    North,
    South,
    East,
    West,
    NorthLeft,
    SouthLeft,
    EastLeft,
    WestLeft,
}

impl LaneId {
    pub const ALL: [LaneId; LANE_COUNT] = [
        LaneId::North,
        LaneId::South,
        LaneId::East,
        LaneId::West,
        LaneId::NorthLeft,
        LaneId::SouthLeft,
        LaneId::EastLeft,
        LaneId::WestLeft,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<LaneId> {
        Self::ALL.get(index).copied()
    }

    pub fn approach(self) -> Approach {
        match self {
            LaneId::North | LaneId::NorthLeft => Approach::North,
            LaneId::South | LaneId::SouthLeft => Approach::South,
            LaneId::East | LaneId::EastLeft => Approach::East,
            LaneId::West | LaneId::WestLeft => Approach::West,
        }
    }

    /// Dedicated left-turn lane?
    pub fn is_left_turn(self) -> bool {
        self.index() >= 4
    }

    pub fn short_name(self) -> &'static str {
        match self {
            LaneId::North => "N",
            LaneId::South => "S",
            LaneId::East => "E",
            LaneId::West => "W",
            LaneId::NorthLeft => "NLeft",
            LaneId::SouthLeft => "SLeft",
            LaneId::EastLeft => "ELeft",
            LaneId::WestLeft => "WLeft",
        }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Direction of a turning maneuver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnDirection {
    Right,
    Left,
}

impl TurnDirection {
    /// Signed target sweep in degrees (right turns increase yaw)
    pub fn target_sweep_degrees(self) -> f32 {
        match self {
            TurnDirection::Right => 90.0,
            TurnDirection::Left => -90.0,
        }
    }
}

/// A 3D position in the simulation
///
/// Motion happens in the x/z plane; `y` is kept for scene compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Planar point (y = 0)
    pub fn planar(x: f32, z: f32) -> Self {
        Self { x, y: 0.0, z }
    }

    /// Unit vector for a yaw measured clockwise from +z
    pub fn from_yaw(yaw: f32) -> Self {
        Self::planar(yaw.sin(), yaw.cos())
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn dot(&self, other: &Position) -> f32 {
        self.x * other.x + self.z * other.z
    }

    /// Planar cross product (z-up convention folded into the x/z plane)
    pub fn cross(&self, other: &Position) -> f32 {
        self.x * other.z - self.z * other.x
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn normalized(&self) -> Position {
        let len = self.length();
        if len > 0.0 {
            Position::planar(self.x / len, self.z / len)
        } else {
            Position::ORIGIN
        }
    }

    /// Perpendicular pointing to the right of this direction
    pub fn right_of(&self) -> Position {
        Position::planar(self.z, -self.x)
    }

    /// Rotate this point clockwise by `angle` radians around `pivot`
    pub fn rotate_around(&self, pivot: &Position, angle: f32) -> Position {
        let rel = *self - *pivot;
        let (sin, cos) = angle.sin_cos();
        Position::new(
            pivot.x + rel.x * cos + rel.z * sin,
            self.y,
            pivot.z - rel.x * sin + rel.z * cos,
        )
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Position {
    type Output = Position;

    fn mul(self, rhs: f32) -> Position {
        Position::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Wrap a yaw into (-PI, PI]
pub fn normalize_yaw(yaw: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut wrapped = yaw % TAU;
    if wrapped <= -PI {
        wrapped += TAU;
    } else if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

/// Half the width of a lane; obstacle queries ignore anything further to the side
pub const LANE_HALF_WIDTH: f32 = 1.5;

/// Minimum heading alignment for a vehicle ahead to count as "same direction"
pub const SAME_DIRECTION_ALIGNMENT: f32 = 0.5;
