//! Conflict model and the table of safe signal configurations
//!
//! The controller never assembles lights ad hoc: its action space is an index
//! into a table whose entries were checked against the conflict graph once,
//! at construction. An unsafe combination is therefore unreachable.

use anyhow::{bail, Result};
use log::debug;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use super::types::{Approach, LaneId, LANE_COUNT};

/// Why two lanes may not be green together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Through movements on perpendicular axes
    CrossingThrough,
    /// A left turn across the opposing through lane
    LeftAcrossOpposing,
    /// A left turn across the perpendicular through lane it sweeps over
    LeftAcrossCrossTraffic,
    /// Directly opposing left turns
    OpposingLefts,
    /// Left turns from adjacent arms, both sweeping the intersection core
    AdjacentLefts,
}

/// Undirected graph of lanes with an edge for every conflicting pair
#[derive(Debug, Clone)]
pub struct ConflictModel {
    graph: UnGraph<LaneId, ConflictKind>,
    nodes: [NodeIndex; LANE_COUNT],
}

/// Perpendicular through lane a left turn from `approach` cuts across
fn crossed_through(approach: Approach) -> LaneId {
    match approach {
        Approach::North => LaneId::East,
        Approach::South => LaneId::West,
        Approach::East => LaneId::South,
        Approach::West => LaneId::North,
    }
}

impl ConflictModel {
    /// Conflict rules of a standard four-arm intersection with protected lefts
    pub fn standard() -> Self {
        let mut graph = UnGraph::new_undirected();
        let nodes = LaneId::ALL.map(|lane| graph.add_node(lane));
        let mut model = Self { graph, nodes };

        for a in Approach::ALL {
            for b in Approach::ALL {
                if a.is_north_south() && !b.is_north_south() {
                    model.add(a.through_lane(), b.through_lane(), ConflictKind::CrossingThrough);
                }
            }
        }

        for approach in Approach::ALL {
            let left = approach.left_lane();
            model.add(
                left,
                approach.opposite().through_lane(),
                ConflictKind::LeftAcrossOpposing,
            );
            model.add(
                left,
                crossed_through(approach),
                ConflictKind::LeftAcrossCrossTraffic,
            );
            model.add(
                left,
                approach.opposite().left_lane(),
                ConflictKind::OpposingLefts,
            );
            for other in Approach::ALL {
                if other != approach && other != approach.opposite() {
                    model.add(left, other.left_lane(), ConflictKind::AdjacentLefts);
                }
            }
        }

        model
    }

    fn add(&mut self, a: LaneId, b: LaneId, kind: ConflictKind) {
        self.graph
            .update_edge(self.nodes[a.index()], self.nodes[b.index()], kind);
    }

    pub fn conflicts(&self, a: LaneId, b: LaneId) -> bool {
        self.graph
            .contains_edge(self.nodes[a.index()], self.nodes[b.index()])
    }

    pub fn conflict_kind(&self, a: LaneId, b: LaneId) -> Option<ConflictKind> {
        self.graph
            .find_edge(self.nodes[a.index()], self.nodes[b.index()])
            .and_then(|edge| self.graph.edge_weight(edge).copied())
    }

    /// Every conflicting pair that is simultaneously green in `states`
    pub fn violations(&self, states: &[bool; LANE_COUNT]) -> Vec<(LaneId, LaneId)> {
        self.graph
            .edge_references()
            .filter_map(|edge| {
                let a = self.graph[edge.source()];
                let b = self.graph[edge.target()];
                (states[a.index()] && states[b.index()]).then_some((a, b))
            })
            .collect()
    }

    pub fn is_safe(&self, states: &[bool; LANE_COUNT]) -> bool {
        self.violations(states).is_empty()
    }
}

/// A full green/red assignment for the eight lanes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalConfiguration {
    pub label: String,
    states: [bool; LANE_COUNT],
}

impl SignalConfiguration {
    pub fn new(label: impl Into<String>, states: [bool; LANE_COUNT]) -> Self {
        Self {
            label: label.into(),
            states,
        }
    }

    pub fn all_red() -> Self {
        Self::new("all red", [false; LANE_COUNT])
    }

    pub fn from_lanes(label: impl Into<String>, green: &[LaneId]) -> Self {
        let mut states = [false; LANE_COUNT];
        for lane in green {
            states[lane.index()] = true;
        }
        Self::new(label, states)
    }

    pub fn states(&self) -> [bool; LANE_COUNT] {
        self.states
    }

    pub fn is_green(&self, lane: LaneId) -> bool {
        self.states[lane.index()]
    }

    pub fn is_all_red(&self) -> bool {
        self.states.iter().all(|green| !green)
    }

    pub fn green_lanes(&self) -> impl Iterator<Item = LaneId> + '_ {
        LaneId::ALL
            .into_iter()
            .filter(move |lane| self.states[lane.index()])
    }
}

/// Precomputed, validated list of safe configurations
#[derive(Debug, Clone)]
pub struct ConfigurationTable {
    configurations: Vec<SignalConfiguration>,
    model: ConflictModel,
}

impl ConfigurationTable {
    /// Index of the all-red configuration, always present
    pub const ALL_RED: usize = 0;

    /// All red, same-axis through pairs, and each through lane with its own left
    pub fn standard_configurations() -> Vec<SignalConfiguration> {
        vec![
            SignalConfiguration::all_red(),
            SignalConfiguration::from_lanes("north-south through", &[LaneId::North, LaneId::South]),
            SignalConfiguration::from_lanes("east-west through", &[LaneId::East, LaneId::West]),
            SignalConfiguration::from_lanes("north + left", &[LaneId::North, LaneId::NorthLeft]),
            SignalConfiguration::from_lanes("south + left", &[LaneId::South, LaneId::SouthLeft]),
            SignalConfiguration::from_lanes("east + left", &[LaneId::East, LaneId::EastLeft]),
            SignalConfiguration::from_lanes("west + left", &[LaneId::West, LaneId::WestLeft]),
        ]
    }

    pub fn standard() -> Result<Self> {
        Self::validated(ConflictModel::standard(), Self::standard_configurations())
    }

    /// Standard table plus caller-supplied entries, all validated
    pub fn with_extra(extra: &[[bool; LANE_COUNT]]) -> Result<Self> {
        let mut configurations = Self::standard_configurations();
        for (i, states) in extra.iter().enumerate() {
            let candidate = SignalConfiguration::new(format!("custom {}", i + 1), *states);
            if configurations.iter().any(|c| c.states == candidate.states) {
                debug!("Skipping duplicate configuration {:?}", states);
                continue;
            }
            configurations.push(candidate);
        }
        Self::validated(ConflictModel::standard(), configurations)
    }

    /// Check every configuration against the conflict model
    pub fn validated(model: ConflictModel, configurations: Vec<SignalConfiguration>) -> Result<Self> {
        match configurations.first() {
            Some(first) if first.is_all_red() => {}
            _ => bail!("Configuration table must start with the all-red configuration"),
        }

        for configuration in &configurations {
            let violations = model.violations(&configuration.states);
            if let Some((a, b)) = violations.first() {
                bail!(
                    "Configuration '{}' greens conflicting lanes {} and {} ({} conflicts)",
                    configuration.label,
                    a,
                    b,
                    violations.len()
                );
            }
        }

        Ok(Self {
            configurations,
            model,
        })
    }

    pub fn get(&self, index: usize) -> Option<&SignalConfiguration> {
        self.configurations.get(index)
    }

    pub fn all_red(&self) -> &SignalConfiguration {
        &self.configurations[Self::ALL_RED]
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalConfiguration> {
        self.configurations.iter()
    }

    /// Find the table entry matching a raw light snapshot
    pub fn index_of(&self, states: &[bool; LANE_COUNT]) -> Option<usize> {
        self.configurations.iter().position(|c| &c.states == states)
    }

    pub fn model(&self) -> &ConflictModel {
        &self.model
    }
}
