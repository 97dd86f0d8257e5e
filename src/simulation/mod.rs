//! Signalized intersection simulation
//!
//! This module contains the vehicles, traffic lights, spawner and signal
//! controller of a single four-way intersection. It runs headless and can be
//! driven step by step from a training loop or from the console.

mod config;
mod controller;
mod layout;
mod observation;
mod policy;
mod pool;
mod reward;
mod scene;
mod signal;
mod spawner;
mod stats;
mod traffic_light;
mod turn;
mod types;
mod vehicle;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use config::{ControllerConfig, LayoutConfig, SimConfig, SpawnerConfig, VehicleConfig};
#[allow(unused_imports)]
pub use controller::{
    ControllerTick, EpisodeLedger, EpisodeStatus, EpisodeSummary, SignalController,
    TerminationReason,
};
#[allow(unused_imports)]
pub use layout::{IntersectionLayout, LaneGeometry};
#[allow(unused_imports)]
pub use observation::{Observation, OBSERVATION_SIZE};
#[allow(unused_imports)]
pub use policy::{
    FixedCyclePolicy, ManualPolicy, Policy, QueuePressurePolicy, RandomPolicy, RewardTally,
};
#[allow(unused_imports)]
pub use pool::EnvironmentPool;
#[allow(unused_imports)]
pub use reward::{RewardComponents, RewardWeights};
#[allow(unused_imports)]
pub use scene::{SceneEntry, SceneIndex, SceneQuery};
#[allow(unused_imports)]
pub use signal::{ConfigurationTable, ConflictKind, ConflictModel, SignalConfiguration};
#[allow(unused_imports)]
pub use spawner::{DemandSchedule, SpawnContext, Spawner, TrafficPeriod};
#[allow(unused_imports)]
pub use stats::{AngerSummary, LaneStats, RollingWindow, StatsAggregator, RECENT_WINDOW};
#[allow(unused_imports)]
pub use traffic_light::{TrafficLight, TrafficLights};
#[allow(unused_imports)]
pub use turn::{outgoing_lane, TurnManeuver, TURN_EPSILON_DEGREES};
#[allow(unused_imports)]
pub use types::{
    normalize_yaw, Approach, LaneId, Position, SimId, SimulationId, TurnDirection, VehicleId,
    LANE_COUNT, LANE_HALF_WIDTH, SAME_DIRECTION_ALIGNMENT,
};
#[allow(unused_imports)]
pub use vehicle::{
    BrakeDecision, SimVehicle, VehicleEnvironment, VehicleState, VehicleUpdateResult,
};
pub use world::{log_episode, MetricsSnapshot, SimWorld};
