//! Read-only views of the simulation handed to renderers, loggers and the CLI.

use macroquad::math::{vec2, Vec2};
use serde::{Deserialize, Serialize};

use crate::climate::ClimateTransition;
use crate::danger::DangerPhase;
use crate::entity::{FoodId, SurvivorId};
use crate::podium::PodiumEntry;
use crate::reporting::MetricSummary;
use crate::stats::Census;
use crate::survivor::{DeathCause, StateTag};

/// Serializable stand-in for `Vec2`, which has no serde support.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl From<Vec2> for Point {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<Point> for Vec2 {
    fn from(p: Point) -> Self {
        vec2(p.x, p.y)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurvivorSnapshot {
    pub id: SurvivorId,
    pub name: String,
    pub position: Point,
    pub heading: Point,
    pub speed: f32,
    pub energy: f32,
    pub base_radius: f32,
    pub effective_radius: f32,
    pub audacity: f32,
    pub resilience: f32,
    pub state: StateTag,
    pub danger_memory: Option<Point>,
    pub deja_vu_timer: f32,
    pub eating_cooldown: f32,
    pub follow_target: Option<SurvivorId>,
    pub eating_slot: Option<FoodId>,
    pub age: f32,
    pub hits_taken: u32,
    pub foods_consumed: u32,
    pub energy_lost: f32,
    pub energy_recovered: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoodSnapshot {
    pub id: FoodId,
    pub position: Point,
    pub available: bool,
    pub quantity: f32,
    pub spawned_quantity: f32,
    pub olfactory_radius: f32,
    pub eaters: u32,
    pub capacity: u32,
    pub respawn_timer: Option<f32>,
    pub respawns: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DangerSnapshot {
    pub position: Point,
    pub home: Point,
    pub rage: f32,
    pub rage_max: f32,
    pub phase: DangerPhase,
    pub target: Option<SurvivorId>,
    pub time_since_last_attack: f32,
    /// Presentation only, degrees.
    pub rotation_angle: f32,
    pub rotation_speed: f32,
    pub hits_landed: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClimateSnapshot {
    pub kind: String,
    pub index: usize,
    pub temperature: f32,
    /// Temperature minus the universal reference.
    pub deviation: f32,
    pub time_in_kind: f32,
    pub remaining: f32,
    pub fade_progress: f32,
    pub cycles_completed: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub elapsed: f32,
    pub survivors: Vec<SurvivorSnapshot>,
    pub foods: Vec<FoodSnapshot>,
    pub danger: DangerSnapshot,
    pub climate: ClimateSnapshot,
    pub census: Census,
    pub podium: Vec<PodiumEntry>,
    pub terminated: bool,
}

/// Why a survivor stopped eating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MealEnd {
    Full,
    FoodDepleted,
    Interrupted,
}

/// Lifecycle events produced during one tick, in the order they happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    ClimateChanged(ClimateTransition),
    SurvivorAttacked {
        survivor: SurvivorId,
        damage: f32,
        energy_left: f32,
    },
    DangerMissed {
        target: SurvivorId,
    },
    StartedFleeing {
        survivor: SurvivorId,
    },
    StartedEating {
        survivor: SurvivorId,
        food: FoodId,
    },
    StoppedEating {
        survivor: SurvivorId,
        food: FoodId,
        reason: MealEnd,
    },
    /// A survivor reached a food whose slots were all taken.
    CapacityTurnedAway {
        survivor: SurvivorId,
        food: FoodId,
    },
    SurvivorStalled {
        survivor: SurvivorId,
    },
    SurvivorDied {
        survivor: SurvivorId,
        name: String,
        cause: DeathCause,
        age: f32,
    },
    FoodDepleted {
        food: FoodId,
    },
    FoodRespawned {
        food: FoodId,
        position: Point,
        quantity: f32,
    },
    PlacementFallback {
        attempts: u32,
        min_distance: f32,
    },
    /// A survivor broke an invariant and was removed.
    EntityIsolated {
        survivor: SurvivorId,
        reason: String,
    },
    /// Food or the danger broke an invariant; the run continues.
    InvariantBroken {
        reason: String,
    },
    PodiumUpdated {
        entries: Vec<PodiumEntry>,
    },
    Terminated(Box<TerminationReport>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub elapsed: f32,
    pub events: Vec<SimEvent>,
    pub snapshot: WorldSnapshot,
}

/// Final payload once a single survivor remains (or none do).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerminationReport {
    /// `None` when the last survivors died in the same tick.
    pub winner: Option<SurvivorSnapshot>,
    pub ticks: u64,
    pub seconds: f32,
    pub initial_population: usize,
    pub deaths_by_exhaustion: u32,
    pub deaths_by_attack: u32,
    pub deaths_while_eating: u32,
    pub survivors_hit: u32,
    pub total_hits: u32,
    pub food_respawns: u32,
    pub climate_cycles_completed: u64,
    pub lifespan: MetricSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_converts_both_ways() {
        let v = vec2(3.5, -1.0);
        let p: Point = v.into();
        assert_eq!(p, Point { x: 3.5, y: -1.0 });
        let back: Vec2 = p.into();
        assert_eq!(back, v);
    }

    #[test]
    fn events_serialize_with_variant_names() {
        let event = SimEvent::StartedEating {
            survivor: SurvivorId(4),
            food: FoodId(0),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StartedEating"));
        let back: SimEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
