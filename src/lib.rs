//! Intersection Simulation Library
//!
//! A signalized four-way intersection simulation exposed as a reinforcement
//! learning environment.

pub mod simulation;
