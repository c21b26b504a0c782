//! Every tunable of the simulation in one place.
//!
//! `SimConfig::default()` is the stock tuning. Time is measured
//! in seconds, speeds in world units per second and rates per second.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::climate::PenaltyTable;
use crate::error::ConfigError;

// Simulation
pub const FIXED_DT: f32 = 1.0 / 30.0;
pub const DEFAULT_SEED: u64 = 42;
pub const INITIAL_POPULATION: usize = 200;

// World
pub const WORLD_WIDTH: f32 = 1280.0;
pub const WORLD_HEIGHT: f32 = 720.0;
pub const SPATIAL_CELL_SIZE: f32 = 64.0;

// Survivor energy
pub const SURVIVOR_ENERGY_MAX: f32 = 60.0;
pub const SURVIVOR_BODY_RADIUS: f32 = 3.0;

// Danger
pub const DANGER_EDGE: f32 = 20.0;
pub const DANGER_RAGE_MAX: f32 = 30.0;

// Traits
pub const TRAIT_MIN: f32 = 1.0;
pub const TRAIT_MAX: f32 = 10.0;

/// Inclusive `[min, max]` interval sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> f32 {
        if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Position of `value` inside the range, 0 at `min` and 1 at `max`.
    pub fn fraction(&self, value: f32) -> f32 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ConfigError::InvalidRange {
                field,
                min: self.min as f64,
                max: self.max as f64,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub population: usize,
    pub fixed_dt: f32,
    pub world: WorldConfig,
    pub survivor: SurvivorConfig,
    pub food: FoodConfig,
    pub danger: DangerConfig,
    pub climate: ClimateConfig,
    pub podium: PodiumConfig,
    pub history: HistoryConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            population: INITIAL_POPULATION,
            fixed_dt: FIXED_DT,
            world: WorldConfig::default(),
            survivor: SurvivorConfig::default(),
            food: FoodConfig::default(),
            danger: DangerConfig::default(),
            climate: ClimateConfig::default(),
            podium: PodiumConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f32,
    pub height: f32,
    /// Entities leaving one edge re-enter at the opposite one.
    pub toroidal: bool,
    pub cell_size: f32,
    /// Random draws per placement round before the clearance is relaxed.
    pub spawn_attempts: u32,
    /// Number of times the clearance is halved before falling back.
    pub spawn_relaxations: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: WORLD_WIDTH,
            height: WORLD_HEIGHT,
            toroidal: true,
            cell_size: SPATIAL_CELL_SIZE,
            spawn_attempts: 100,
            spawn_relaxations: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurvivorConfig {
    pub energy_initial: f32,
    pub energy_max: f32,
    /// At or below this energy a survivor looks for food.
    pub hunger_threshold: f32,
    /// At or below this energy speed drops and the senses narrow.
    pub critical_threshold: f32,
    pub body_radius: f32,
    pub sensorial_radius: f32,
    pub speed_seek: f32,
    pub speed_critical: f32,
    pub speed_food_rush: f32,
    pub speed_flee: f32,
    pub energy_loss_seek: f32,
    pub energy_loss_flee: f32,
    pub eat_rate: f32,
    pub eat_rate_critical: f32,
    pub eating_cooldown: f32,
    pub direction_change: ValueRange,
    /// Flee time for the most audacious (min) and the most timid (max) survivor.
    pub flee_duration: ValueRange,
    /// Seconds of danger memory per point of energy at contact time.
    pub memory_energy_ratio: f32,
    pub safety_distance_scale: f32,
    /// Safety distance floor, expressed in danger edges.
    pub safety_distance_edges: f32,
    pub turn_back_duration: f32,
    pub stall_duration: f32,
    pub audacity: ValueRange,
    pub resilience: ValueRange,
    pub name_suffixes: bool,
}

impl Default for SurvivorConfig {
    fn default() -> Self {
        Self {
            energy_initial: SURVIVOR_ENERGY_MAX,
            energy_max: SURVIVOR_ENERGY_MAX,
            hunger_threshold: SURVIVOR_ENERGY_MAX / 1.5,
            critical_threshold: SURVIVOR_ENERGY_MAX / 4.0,
            body_radius: SURVIVOR_BODY_RADIUS,
            sensorial_radius: SURVIVOR_BODY_RADIUS * 20.0,
            speed_seek: 120.0,
            speed_critical: 30.0,
            speed_food_rush: 150.0,
            speed_flee: 180.0,
            energy_loss_seek: 0.5,
            energy_loss_flee: 1.5,
            eat_rate: 2.0,
            eat_rate_critical: 4.0,
            eating_cooldown: 5.0,
            direction_change: ValueRange::new(2.0, 4.0),
            flee_duration: ValueRange::new(0.85, 4.0),
            memory_energy_ratio: 0.25,
            safety_distance_scale: 100.0,
            safety_distance_edges: 3.0,
            turn_back_duration: 3.0,
            stall_duration: 5.0,
            audacity: ValueRange::new(TRAIT_MIN, TRAIT_MAX),
            resilience: ValueRange::new(TRAIT_MIN, TRAIT_MAX),
            name_suffixes: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FoodConfig {
    pub count: usize,
    pub quantity: ValueRange,
    pub max_eaters: u32,
    pub olfactory_radius_max: f32,
    pub olfactory_radius_min: f32,
    /// Quantity lost per second to spoilage, before the climate multiplier.
    pub spoilage_rate: f32,
    pub respawn_delay: ValueRange,
    /// Minimum distance to the danger on (re)spawn, as a fraction of world width.
    pub danger_clearance_ratio: f32,
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            count: 1,
            quantity: ValueRange::new(100.0, 500.0),
            max_eaters: 10,
            olfactory_radius_max: 80.0,
            olfactory_radius_min: 40.0,
            spoilage_rate: 0.5,
            respawn_delay: ValueRange::new(3.0, 7.0),
            danger_clearance_ratio: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DangerConfig {
    pub edge: f32,
    pub rage_max: f32,
    pub attack_range: f32,
    pub strike_duration: f32,
    pub strike_speed: f32,
    pub return_duration: f32,
    pub return_speed: f32,
    /// Extra movement speed at full rage, as a fraction of the base speed.
    pub rage_speed_bonus: f32,
    pub cooldown: f32,
    /// Seconds without a landed hit before rage starts to decay.
    pub inactivity_threshold: f32,
    pub rage_gain: f32,
    pub rage_decay: f32,
    pub base_damage: f32,
    pub damage_per_rage: f32,
    pub rotation_speed_max: f32,
}

impl Default for DangerConfig {
    fn default() -> Self {
        Self {
            edge: DANGER_EDGE,
            rage_max: DANGER_RAGE_MAX,
            attack_range: 60.0,
            strike_duration: 0.2,
            strike_speed: 210.0,
            return_duration: 0.5,
            return_speed: 180.0,
            rage_speed_bonus: 1.0,
            cooldown: 2.0,
            inactivity_threshold: 2.0,
            rage_gain: 1.0,
            rage_decay: 0.5,
            base_damage: 2.0,
            damage_per_rage: 0.5,
            rotation_speed_max: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateKindConfig {
    pub name: String,
    pub mean: f32,
    pub stddev: f32,
    /// Seconds the climate persists once it becomes active.
    pub duration: f32,
    pub penalties: PenaltyTable,
}

impl Default for ClimateKindConfig {
    fn default() -> Self {
        Self {
            name: "Temperate".to_string(),
            mean: 15.0,
            stddev: 3.0,
            duration: 30.0,
            penalties: PenaltyTable::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub reference_temperature: f32,
    pub resample_interval: f32,
    /// Samples are clamped to `mean ± clamp_sigmas * stddev`.
    pub clamp_sigmas: f32,
    /// Share of a penalty removed by maximum resilience.
    pub resilience_dampening: f32,
    /// Presentation-only cross-fade length after a transition.
    pub fade_seconds: f32,
    pub kinds: Vec<ClimateKindConfig>,
    pub cycle: Vec<String>,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            reference_temperature: 15.0,
            resample_interval: 0.25,
            clamp_sigmas: 3.0,
            resilience_dampening: 0.8,
            fade_seconds: 5.0,
            kinds: vec![
                ClimateKindConfig::default(),
                ClimateKindConfig {
                    name: "Cold".to_string(),
                    mean: -20.0,
                    stddev: 5.0,
                    duration: 20.0,
                    penalties: PenaltyTable {
                        speed: 0.5,
                        energy_loss: 1.4,
                        food_decay: 0.1,
                        food_respawn_delay: 1.8,
                        food_quantity: 0.25,
                        danger_rage_decay: 1.0,
                    },
                },
                ClimateKindConfig {
                    name: "Hot".to_string(),
                    mean: 55.0,
                    stddev: 5.0,
                    duration: 15.0,
                    penalties: PenaltyTable {
                        speed: 0.7,
                        energy_loss: 1.6,
                        food_decay: 3.14,
                        food_respawn_delay: 2.2,
                        food_quantity: 0.25,
                        danger_rage_decay: 4.0,
                    },
                },
            ],
            cycle: ["Temperate", "Cold", "Temperate", "Hot"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PodiumConfig {
    /// The podium is shown once the population is at or below this size.
    pub threshold: usize,
    pub places: usize,
}

impl Default for PodiumConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            places: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub sample_interval: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            sample_interval: 30,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject anything the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("fixed_dt", self.fixed_dt)?;
        if self.population == 0 {
            return Err(ConfigError::NonPositive {
                field: "population",
                value: 0.0,
            });
        }

        let w = &self.world;
        positive("world.width", w.width)?;
        positive("world.height", w.height)?;
        positive("world.cell_size", w.cell_size)?;
        if w.spawn_attempts == 0 {
            return Err(ConfigError::NonPositive {
                field: "world.spawn_attempts",
                value: 0.0,
            });
        }

        let s = &self.survivor;
        positive("survivor.energy_max", s.energy_max)?;
        within("survivor.energy_initial", s.energy_initial, 0.0, s.energy_max)?;
        positive("survivor.hunger_threshold", s.hunger_threshold)?;
        within("survivor.hunger_threshold", s.hunger_threshold, 0.0, s.energy_max)?;
        positive("survivor.critical_threshold", s.critical_threshold)?;
        within(
            "survivor.critical_threshold",
            s.critical_threshold,
            0.0,
            s.hunger_threshold,
        )?;
        positive("survivor.body_radius", s.body_radius)?;
        positive("survivor.sensorial_radius", s.sensorial_radius)?;
        within(
            "survivor.body_radius",
            s.body_radius,
            0.0,
            s.sensorial_radius,
        )?;
        for (field, value) in [
            ("survivor.speed_seek", s.speed_seek),
            ("survivor.speed_critical", s.speed_critical),
            ("survivor.speed_food_rush", s.speed_food_rush),
            ("survivor.speed_flee", s.speed_flee),
            ("survivor.energy_loss_seek", s.energy_loss_seek),
            ("survivor.energy_loss_flee", s.energy_loss_flee),
            ("survivor.eat_rate", s.eat_rate),
            ("survivor.eat_rate_critical", s.eat_rate_critical),
            ("survivor.memory_energy_ratio", s.memory_energy_ratio),
            ("survivor.safety_distance_scale", s.safety_distance_scale),
            ("survivor.turn_back_duration", s.turn_back_duration),
            ("survivor.stall_duration", s.stall_duration),
        ] {
            positive(field, value)?;
        }
        non_negative("survivor.eating_cooldown", s.eating_cooldown)?;
        non_negative("survivor.safety_distance_edges", s.safety_distance_edges)?;
        s.direction_change.validate("survivor.direction_change")?;
        positive("survivor.direction_change.min", s.direction_change.min)?;
        s.flee_duration.validate("survivor.flee_duration")?;
        positive("survivor.flee_duration.min", s.flee_duration.min)?;
        trait_range("survivor.audacity", &s.audacity)?;
        trait_range("survivor.resilience", &s.resilience)?;

        let f = &self.food;
        f.quantity.validate("food.quantity")?;
        positive("food.quantity.min", f.quantity.min)?;
        if f.max_eaters == 0 {
            return Err(ConfigError::NonPositive {
                field: "food.max_eaters",
                value: 0.0,
            });
        }
        positive("food.olfactory_radius_max", f.olfactory_radius_max)?;
        within(
            "food.olfactory_radius_min",
            f.olfactory_radius_min,
            0.0,
            f.olfactory_radius_max,
        )?;
        non_negative("food.spoilage_rate", f.spoilage_rate)?;
        f.respawn_delay.validate("food.respawn_delay")?;
        non_negative("food.respawn_delay.min", f.respawn_delay.min)?;
        within("food.danger_clearance_ratio", f.danger_clearance_ratio, 0.0, 1.0)?;

        let d = &self.danger;
        for (field, value) in [
            ("danger.edge", d.edge),
            ("danger.rage_max", d.rage_max),
            ("danger.attack_range", d.attack_range),
            ("danger.strike_duration", d.strike_duration),
            ("danger.strike_speed", d.strike_speed),
            ("danger.return_duration", d.return_duration),
            ("danger.return_speed", d.return_speed),
            ("danger.rage_gain", d.rage_gain),
            ("danger.rage_decay", d.rage_decay),
        ] {
            positive(field, value)?;
        }
        for (field, value) in [
            ("danger.rage_speed_bonus", d.rage_speed_bonus),
            ("danger.cooldown", d.cooldown),
            ("danger.inactivity_threshold", d.inactivity_threshold),
            ("danger.base_damage", d.base_damage),
            ("danger.damage_per_rage", d.damage_per_rage),
            ("danger.rotation_speed_max", d.rotation_speed_max),
        ] {
            non_negative(field, value)?;
        }

        let c = &self.climate;
        positive("climate.resample_interval", c.resample_interval)?;
        positive("climate.clamp_sigmas", c.clamp_sigmas)?;
        within(
            "climate.resilience_dampening",
            c.resilience_dampening,
            0.0,
            1.0,
        )?;
        non_negative("climate.fade_seconds", c.fade_seconds)?;
        if c.cycle.is_empty() {
            return Err(ConfigError::EmptyClimateCycle);
        }
        for kind in &c.kinds {
            non_negative("climate.kinds.stddev", kind.stddev)?;
            positive("climate.kinds.duration", kind.duration)?;
            kind.penalties.validate()?;
        }
        for name in &c.cycle {
            if !c.kinds.iter().any(|k| &k.name == name) {
                return Err(ConfigError::UnknownClimate(name.clone()));
            }
        }

        if self.podium.threshold == 0 {
            return Err(ConfigError::NonPositive {
                field: "podium.threshold",
                value: 0.0,
            });
        }
        if self.podium.places == 0 {
            return Err(ConfigError::NonPositive {
                field: "podium.places",
                value: 0.0,
            });
        }
        if self.history.capacity == 0 || self.history.sample_interval == 0 {
            return Err(ConfigError::NonPositive {
                field: "history",
                value: 0.0,
            });
        }

        Ok(())
    }
}

pub(crate) fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive {
            field,
            value: value as f64,
        })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    within(field, value, 0.0, f32::MAX)
}

fn within(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfBounds {
            field,
            value: value as f64,
            min: min as f64,
            max: max as f64,
        })
    }
}

fn trait_range(field: &'static str, range: &ValueRange) -> Result<(), ConfigError> {
    range.validate(field)?;
    within(field, range.min, TRAIT_MIN, TRAIT_MAX)?;
    within(field, range.max, TRAIT_MIN, TRAIT_MAX)
}
