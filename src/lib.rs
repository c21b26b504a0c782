//! Survivors: a fixed-step agent simulation where a population forages for food,
//! flees a single rotating danger and endures a cycling climate until one is left.

pub mod climate;
pub mod config;
pub mod danger;
pub mod entity;
pub mod error;
pub mod food;
pub mod naming;
pub mod podium;
pub mod reporting;
pub mod simulation;
pub mod snapshot;
pub mod spatial_hash;
pub mod stats;
pub mod survivor;
pub mod world;

pub use config::SimConfig;
pub use error::{ConfigError, InvariantViolation, PlacementWarning};
pub use simulation::Simulation;
pub use snapshot::{SimEvent, TerminationReport, TickReport, WorldSnapshot};
