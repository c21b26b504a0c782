//! Climate cycle and the penalty multipliers it imposes on everything else.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ClimateConfig, ValueRange};
use crate::error::ConfigError;
use crate::snapshot::ClimateSnapshot;

/// Multipliers never drop below this, however extreme the temperature.
const MIN_MULTIPLIER: f32 = 0.05;

/// Dynamic parameter a climate can penalise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PenaltyKind {
    Speed,
    EnergyLoss,
    FoodDecay,
    FoodRespawnDelay,
    FoodQuantity,
    DangerRageDecay,
}

impl PenaltyKind {
    pub const ALL: [PenaltyKind; 6] = [
        PenaltyKind::Speed,
        PenaltyKind::EnergyLoss,
        PenaltyKind::FoodDecay,
        PenaltyKind::FoodRespawnDelay,
        PenaltyKind::FoodQuantity,
        PenaltyKind::DangerRageDecay,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PenaltyKind::Speed => "speed",
            PenaltyKind::EnergyLoss => "energy_loss",
            PenaltyKind::FoodDecay => "food_decay",
            PenaltyKind::FoodRespawnDelay => "food_respawn_delay",
            PenaltyKind::FoodQuantity => "food_quantity",
            PenaltyKind::DangerRageDecay => "danger_rage_decay",
        }
    }
}

/// Per-climate multipliers, 1.0 meaning no effect.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyTable {
    pub speed: f32,
    pub energy_loss: f32,
    pub food_decay: f32,
    pub food_respawn_delay: f32,
    pub food_quantity: f32,
    pub danger_rage_decay: f32,
}

impl PenaltyTable {
    pub const IDENTITY: Self = Self {
        speed: 1.0,
        energy_loss: 1.0,
        food_decay: 1.0,
        food_respawn_delay: 1.0,
        food_quantity: 1.0,
        danger_rage_decay: 1.0,
    };

    pub fn get(&self, kind: PenaltyKind) -> f32 {
        match kind {
            PenaltyKind::Speed => self.speed,
            PenaltyKind::EnergyLoss => self.energy_loss,
            PenaltyKind::FoodDecay => self.food_decay,
            PenaltyKind::FoodRespawnDelay => self.food_respawn_delay,
            PenaltyKind::FoodQuantity => self.food_quantity,
            PenaltyKind::DangerRageDecay => self.danger_rage_decay,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for kind in PenaltyKind::ALL {
            crate::config::positive("climate.kinds.penalties", self.get(kind))?;
        }
        Ok(())
    }
}

impl Default for PenaltyTable {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One configured climate kind.
#[derive(Clone, Debug)]
pub struct ClimateProfile {
    pub name: String,
    pub mean: f32,
    pub stddev: f32,
    pub duration: f32,
    pub penalties: PenaltyTable,
}

impl ClimateProfile {
    /// Inclusive bounds a sample of this kind is clamped to.
    pub fn regime(&self, clamp_sigmas: f32) -> (f32, f32) {
        let half = clamp_sigmas * self.stddev;
        (self.mean - half, self.mean + half)
    }
}

/// Emitted when the cycle moves to its next entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClimateTransition {
    pub from: String,
    pub to: String,
    pub index: usize,
}

pub struct ClimateController {
    profiles: Vec<ClimateProfile>,
    /// Cycle entries as indices into `profiles`.
    cycle: Vec<usize>,
    /// Profile indices sorted by mean temperature, for interpolation.
    anchors: Vec<usize>,
    index: usize,
    temperature: f32,
    time_in_kind: f32,
    resample_timer: f32,
    cycles_completed: u64,
    transitions: u64,
    reference_temperature: f32,
    resample_interval: f32,
    clamp_sigmas: f32,
    resilience_dampening: f32,
    fade_seconds: f32,
    resilience: ValueRange,
}

impl ClimateController {
    pub fn new(config: &ClimateConfig, resilience: ValueRange) -> Result<Self, ConfigError> {
        if config.cycle.is_empty() {
            return Err(ConfigError::EmptyClimateCycle);
        }
        let profiles: Vec<ClimateProfile> = config
            .kinds
            .iter()
            .map(|k| ClimateProfile {
                name: k.name.clone(),
                mean: k.mean,
                stddev: k.stddev,
                duration: k.duration,
                penalties: k.penalties,
            })
            .collect();

        let mut cycle = Vec::with_capacity(config.cycle.len());
        for name in &config.cycle {
            let idx = profiles
                .iter()
                .position(|p| &p.name == name)
                .ok_or_else(|| ConfigError::UnknownClimate(name.clone()))?;
            cycle.push(idx);
        }

        let mut anchors: Vec<usize> = (0..profiles.len()).collect();
        anchors.sort_by(|&a, &b| profiles[a].mean.total_cmp(&profiles[b].mean));

        let temperature = profiles[cycle[0]].mean;
        Ok(Self {
            profiles,
            cycle,
            anchors,
            index: 0,
            temperature,
            time_in_kind: 0.0,
            resample_timer: 0.0,
            cycles_completed: 0,
            transitions: 0,
            reference_temperature: config.reference_temperature,
            resample_interval: config.resample_interval,
            clamp_sigmas: config.clamp_sigmas,
            resilience_dampening: config.resilience_dampening,
            fade_seconds: config.fade_seconds,
            resilience,
        })
    }

    pub fn current(&self) -> &ClimateProfile {
        &self.profiles[self.cycle[self.index]]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cycle_len(&self) -> usize {
        self.cycle.len()
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Signed distance of the current temperature from the universal reference.
    pub fn deviation(&self) -> f32 {
        self.temperature - self.reference_temperature
    }

    /// Name of the climate at cycle position `index` (modulo the cycle length).
    pub fn kind_at(&self, index: usize) -> &str {
        &self.profiles[self.cycle[index % self.cycle.len()]].name
    }

    /// Advance the cycle and resample the temperature when due.
    pub fn advance(&mut self, dt: f32, rng: &mut impl Rng) -> Option<ClimateTransition> {
        self.time_in_kind += dt;
        let mut transition = None;

        if self.time_in_kind >= self.current().duration {
            let from = self.current().name.clone();
            self.time_in_kind = 0.0;
            self.index = (self.index + 1) % self.cycle.len();
            self.transitions += 1;
            if self.index == 0 {
                self.cycles_completed += 1;
            }
            self.resample_timer = 0.0;
            self.resample(rng);
            let to = self.current().name.clone();
            info!(
                from = %from,
                to = %to,
                temperature = self.temperature,
                "climate transition"
            );
            transition = Some(ClimateTransition {
                from,
                to,
                index: self.index,
            });
        } else {
            self.resample_timer += dt;
            if self.resample_timer >= self.resample_interval {
                self.resample_timer = 0.0;
                self.resample(rng);
            }
        }

        transition
    }

    fn resample(&mut self, rng: &mut impl Rng) {
        let profile = self.current();
        let z: f32 = rng.sample(StandardNormal);
        let (lo, hi) = profile.regime(self.clamp_sigmas);
        let temperature = (profile.mean + profile.stddev * z).clamp(lo, hi);
        debug!(climate = %profile.name, temperature, "temperature resampled");
        self.temperature = temperature;
    }

    /// Jump straight to cycle position `index`, temperature at that kind's mean.
    pub fn jump_to(&mut self, index: usize) {
        self.index = index % self.cycle.len();
        self.time_in_kind = 0.0;
        self.resample_timer = 0.0;
        self.temperature = self.current().mean;
    }

    /// Pin the temperature, clamped into the active kind's regime.
    pub fn override_temperature(&mut self, temperature: f32) {
        let (lo, hi) = self.current().regime(self.clamp_sigmas);
        self.temperature = temperature.clamp(lo, hi);
    }

    /// Un-weighted multiplier for `kind` at the current temperature.
    ///
    /// The active kind's own table, shifted by how far the temperature has drifted
    /// from that kind's mean along the curve through all configured kinds.
    pub fn raw_multiplier(&self, kind: PenaltyKind) -> f32 {
        let profile = self.current();
        let own = profile.penalties.get(kind);
        if self.temperature == profile.mean {
            return own.max(MIN_MULTIPLIER);
        }
        let drift = self.curve(kind, self.temperature) - self.curve(kind, profile.mean);
        (own + drift).max(MIN_MULTIPLIER)
    }

    /// Piecewise-linear penalty across the kinds ordered by mean temperature,
    /// extended past the coldest and hottest means.
    fn curve(&self, kind: PenaltyKind, t: f32) -> f32 {
        let value_of = |idx: usize| self.profiles[self.anchors[idx]].penalties.get(kind);
        let mean_of = |idx: usize| self.profiles[self.anchors[idx]].mean;

        if self.anchors.len() == 1 {
            return value_of(0);
        }

        let last = self.anchors.len() - 1;
        let segment = if t <= mean_of(0) {
            0
        } else if t >= mean_of(last) {
            last - 1
        } else {
            (0..last)
                .find(|&i| t >= mean_of(i) && t <= mean_of(i + 1))
                .unwrap_or(0)
        };

        let (m0, m1) = (mean_of(segment), mean_of(segment + 1));
        let (v0, v1) = (value_of(segment), value_of(segment + 1));
        let span = m1 - m0;
        if span.abs() <= f32::EPSILON || t == m0 {
            v0
        } else if t == m1 {
            v1
        } else {
            v0 + (v1 - v0) * (t - m0) / span
        }
    }

    /// Pull a multiplier toward neutral according to resilience.
    pub fn weighted(&self, raw: f32, resilience: f32) -> f32 {
        let t = self.resilience.fraction(resilience);
        let keep = 1.0 - self.resilience_dampening * t;
        (1.0 + (raw - 1.0) * keep).max(MIN_MULTIPLIER)
    }

    /// `base` scaled by the resilience-weighted climate multiplier.
    pub fn penalty_for(&self, base: f32, kind: PenaltyKind, resilience: f32) -> f32 {
        base * self.weighted(self.raw_multiplier(kind), resilience)
    }

    /// Multiplier for entities without resilience (food, the danger).
    pub fn environment_multiplier(&self, kind: PenaltyKind) -> f32 {
        self.raw_multiplier(kind)
    }

    /// Presentation-only cross-fade progress after the last transition.
    pub fn fade_progress(&self) -> f32 {
        if self.transitions == 0 || self.fade_seconds <= 0.0 {
            return 1.0;
        }
        (self.time_in_kind / self.fade_seconds).min(1.0)
    }

    pub fn snapshot(&self) -> ClimateSnapshot {
        let profile = self.current();
        ClimateSnapshot {
            kind: profile.name.clone(),
            index: self.index,
            temperature: self.temperature,
            deviation: self.deviation(),
            time_in_kind: self.time_in_kind,
            remaining: (profile.duration - self.time_in_kind).max(0.0),
            fade_progress: self.fade_progress(),
            cycles_completed: self.cycles_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClimateKindConfig, SimConfig};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn controller() -> ClimateController {
        let config = SimConfig::default();
        ClimateController::new(&config.climate, config.survivor.resilience).unwrap()
    }

    #[test]
    fn cycle_follows_configured_order_and_repeats() {
        let mut climate = controller();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut seen = vec![climate.current().name.clone()];
        for _ in 0..(200.0 / 0.1) as usize {
            if let Some(t) = climate.advance(0.1, &mut rng) {
                assert_eq!(t.from, seen[seen.len() - 1]);
                seen.push(t.to);
            }
        }
        let expected = ["Temperate", "Cold", "Temperate", "Hot"];
        assert!(seen.len() > 8);
        for (i, name) in seen.iter().enumerate() {
            assert_eq!(name, expected[i % 4]);
        }
        assert!(climate.cycles_completed() >= 2);
    }

    #[test]
    fn samples_stay_inside_the_active_regime() {
        let mut climate = controller();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..20_000 {
            climate.advance(0.05, &mut rng);
            let (lo, hi) = climate.current().regime(3.0);
            let t = climate.temperature();
            assert!(t >= lo && t <= hi, "{t} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn table_applies_exactly_at_each_mean() {
        let mut climate = controller();
        climate.jump_to(1);
        assert_eq!(climate.current().name, "Cold");
        assert!((climate.raw_multiplier(PenaltyKind::Speed) - 0.5).abs() < 1e-5);
        assert!((climate.raw_multiplier(PenaltyKind::EnergyLoss) - 1.4).abs() < 1e-5);

        climate.jump_to(3);
        assert!((climate.raw_multiplier(PenaltyKind::FoodDecay) - 3.14).abs() < 1e-4);

        climate.jump_to(0);
        for kind in PenaltyKind::ALL {
            assert!((climate.raw_multiplier(kind) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn temperate_deviation_introduces_a_small_penalty() {
        let mut climate = controller();
        climate.override_temperature(18.0);
        let speed = climate.raw_multiplier(PenaltyKind::Speed);
        assert!(speed < 1.0 && speed > 0.95);

        climate.override_temperature(12.0);
        let loss = climate.raw_multiplier(PenaltyKind::EnergyLoss);
        assert!(loss > 1.0 && loss < 1.05);
    }

    #[test]
    fn kinds_sharing_a_mean_keep_their_own_tables() {
        let mut config = SimConfig::default();
        config.climate.kinds.push(ClimateKindConfig {
            name: "Storm".to_string(),
            mean: 15.0,
            stddev: 0.0,
            duration: 10.0,
            penalties: PenaltyTable {
                speed: 0.5,
                ..PenaltyTable::IDENTITY
            },
        });
        config.climate.cycle = vec!["Storm".to_string(), "Temperate".to_string()];
        let mut climate =
            ClimateController::new(&config.climate, config.survivor.resilience).unwrap();

        assert_eq!(climate.current().name, "Storm");
        assert_eq!(climate.temperature(), 15.0);
        assert_eq!(climate.raw_multiplier(PenaltyKind::Speed), 0.5);
        assert_eq!(climate.raw_multiplier(PenaltyKind::EnergyLoss), 1.0);

        climate.jump_to(1);
        assert_eq!(climate.current().name, "Temperate");
        assert_eq!(climate.raw_multiplier(PenaltyKind::Speed), 1.0);
    }

    #[test]
    fn resilience_pulls_multiplier_toward_neutral() {
        let mut climate = controller();
        climate.jump_to(1);
        let fragile = climate.penalty_for(100.0, PenaltyKind::Speed, 1.0);
        let hardy = climate.penalty_for(100.0, PenaltyKind::Speed, 10.0);
        assert!((fragile - 50.0).abs() < 1e-3);
        assert!(hardy > fragile && hardy < 100.0);
        assert!((hardy - 90.0).abs() < 1e-3);

        let mut last = f32::MIN;
        for r in 1..=10 {
            let v = climate.penalty_for(100.0, PenaltyKind::Speed, r as f32);
            assert!(v > last);
            last = v;
        }
    }

    #[test]
    fn hot_climate_accelerates_rage_decay() {
        let mut climate = controller();
        climate.jump_to(3);
        assert!(climate.environment_multiplier(PenaltyKind::DangerRageDecay) > 1.0);
    }

    #[test]
    fn snapshot_reports_remaining_time() {
        let mut climate = controller();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        climate.advance(10.0, &mut rng);
        let snap = climate.snapshot();
        assert_eq!(snap.kind, "Temperate");
        assert!((snap.remaining - 20.0).abs() < 1e-4);
        assert_eq!(snap.fade_progress, 1.0);
    }
}
