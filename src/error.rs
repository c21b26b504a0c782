use thiserror::Error;

use crate::entity::{FoodId, SurvivorId};

/// Rejected configuration. Only ever produced while building a simulation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field}: min {min} must not exceed max {max}")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfBounds {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("climate cycle must contain at least one climate")]
    EmptyClimateCycle,

    #[error("climate cycle references undefined climate `{0}`")]
    UnknownClimate(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A broken core invariant. Indicates a bug, never a gameplay outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("survivor {id:?} energy {energy} outside [0, {max}]")]
    SurvivorEnergy { id: SurvivorId, energy: f32, max: f32 },

    #[error("survivor {id:?} effective radius {effective} exceeds base radius {base}")]
    SensorialRadius {
        id: SurvivorId,
        effective: f32,
        base: f32,
    },

    #[error("food {id:?} quantity {quantity} is negative")]
    FoodQuantity { id: FoodId, quantity: f32 },

    #[error("food {id:?} has {eaters} eaters, capacity is {capacity}")]
    EaterOverflow {
        id: FoodId,
        eaters: u32,
        capacity: u32,
    },

    #[error("danger rage {rage} outside [0, {max}]")]
    Rage { rage: f32, max: f32 },
}

/// No acceptable spawn point was found; a fallback position was used instead.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no spawn point at least {min_distance} from ({avoid_x}, {avoid_y}) after {attempts} attempts, used fallback")]
pub struct PlacementWarning {
    pub attempts: u32,
    pub min_distance: f32,
    pub avoid_x: f32,
    pub avoid_y: f32,
}
