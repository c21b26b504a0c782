use macroquad::math::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::climate::{ClimateController, PenaltyKind};
use crate::config::{DangerConfig, FIXED_DT};
use crate::entity::SurvivorId;
use crate::error::InvariantViolation;
use crate::snapshot::DangerSnapshot;
use crate::world::World;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackPhase {
    /// Lunge toward the target; the hit is resolved when it ends.
    Strike,
    /// Pull back to the home position.
    Return,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DangerState {
    Idle,
    Attacking {
        target: SurvivorId,
        phase: AttackPhase,
        timer: f32,
    },
    Cooldown {
        target: SurvivorId,
        timer: f32,
    },
}

/// Flattened state for snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DangerPhase {
    Idle,
    Strike,
    Return,
    Cooldown,
}

/// A survivor as the danger sees it at the start of the tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetView {
    pub id: SurvivorId,
    pub pos: Vec2,
    pub fleeing: bool,
    pub alive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DangerOutcome {
    Quiet,
    Engaged { target: SurvivorId },
    Hit { target: SurvivorId, damage: f32 },
    Missed { target: SurvivorId },
}

pub struct DangerAgent {
    pub pos: Vec2,
    pub home: Vec2,
    pub rage: f32,
    pub state: DangerState,
    pub time_since_last_attack: f32,
    pub rotation_angle: f32,
    pub hits_landed: u32,
    config: DangerConfig,
}

impl DangerAgent {
    pub fn new(config: DangerConfig, home: Vec2) -> Self {
        Self {
            pos: home,
            home,
            rage: 0.0,
            state: DangerState::Idle,
            time_since_last_attack: 0.0,
            rotation_angle: 0.0,
            hits_landed: 0,
            config,
        }
    }

    pub fn config(&self) -> &DangerConfig {
        &self.config
    }

    pub fn edge(&self) -> f32 {
        self.config.edge
    }

    pub fn attack_range(&self) -> f32 {
        self.config.attack_range
    }

    pub fn target(&self) -> Option<SurvivorId> {
        match self.state {
            DangerState::Idle => None,
            DangerState::Attacking { target, .. } | DangerState::Cooldown { target, .. } => {
                Some(target)
            }
        }
    }

    pub fn phase(&self) -> DangerPhase {
        match self.state {
            DangerState::Idle => DangerPhase::Idle,
            DangerState::Attacking {
                phase: AttackPhase::Strike,
                ..
            } => DangerPhase::Strike,
            DangerState::Attacking {
                phase: AttackPhase::Return,
                ..
            } => DangerPhase::Return,
            DangerState::Cooldown { .. } => DangerPhase::Cooldown,
        }
    }

    /// Movement speed multiplier, growing linearly with rage.
    pub fn speed_factor(&self) -> f32 {
        1.0 + self.config.rage_speed_bonus * self.rage / self.config.rage_max
    }

    /// Degrees per fixed step.
    pub fn rotation_speed(&self) -> f32 {
        self.config.rotation_speed_max * self.rage / self.config.rage_max
    }

    pub fn damage(&self) -> f32 {
        self.config.base_damage + self.config.damage_per_rage * self.rage
    }

    /// One step of the Idle / Attacking / Cooldown machine.
    pub fn update(
        &mut self,
        dt: f32,
        targets: &[TargetView],
        climate: &ClimateController,
        world: &World,
    ) -> DangerOutcome {
        self.time_since_last_attack += dt;
        self.rotation_angle = (self.rotation_angle + self.rotation_speed() * dt / FIXED_DT) % 360.0;

        match self.state {
            DangerState::Idle => {
                if self.time_since_last_attack >= self.config.inactivity_threshold {
                    let decay = self.config.rage_decay
                        * climate.environment_multiplier(PenaltyKind::DangerRageDecay);
                    self.rage = (self.rage - decay * dt).max(0.0);
                }
                self.step_toward(self.home, self.config.return_speed, dt, world);

                match self.select_target(targets, world) {
                    Some(target) => {
                        debug!(target = target.0, rage = self.rage, "danger engages");
                        self.begin_strike(target);
                        DangerOutcome::Engaged { target }
                    }
                    None => DangerOutcome::Quiet,
                }
            }

            DangerState::Attacking {
                target,
                phase: AttackPhase::Strike,
                timer,
            } => {
                let view = targets.iter().find(|t| t.id == target);
                if let Some(view) = view {
                    self.step_toward(view.pos, self.config.strike_speed, dt, world);
                }
                let timer = timer - dt;
                if timer > 0.0 {
                    self.state = DangerState::Attacking {
                        target,
                        phase: AttackPhase::Strike,
                        timer,
                    };
                    return DangerOutcome::Quiet;
                }

                self.state = DangerState::Attacking {
                    target,
                    phase: AttackPhase::Return,
                    timer: self.config.return_duration,
                };
                let in_reach = view.map_or(false, |v| {
                    v.alive && world.distance(self.pos, v.pos) <= self.config.attack_range
                });
                if in_reach {
                    let damage = self.damage();
                    self.rage = (self.rage + self.config.rage_gain).min(self.config.rage_max);
                    self.time_since_last_attack = 0.0;
                    self.hits_landed += 1;
                    debug!(target = target.0, damage, rage = self.rage, "danger hit");
                    DangerOutcome::Hit { target, damage }
                } else {
                    debug!(target = target.0, "danger missed");
                    DangerOutcome::Missed { target }
                }
            }

            DangerState::Attacking {
                target,
                phase: AttackPhase::Return,
                timer,
            } => {
                self.step_toward(self.home, self.config.return_speed, dt, world);
                let timer = timer - dt;
                if timer > 0.0 {
                    self.state = DangerState::Attacking {
                        target,
                        phase: AttackPhase::Return,
                        timer,
                    };
                } else {
                    self.pos = self.home;
                    self.state = DangerState::Cooldown {
                        target,
                        timer: self.config.cooldown,
                    };
                }
                DangerOutcome::Quiet
            }

            DangerState::Cooldown { target, timer } => {
                let timer = timer - dt;
                if timer > 0.0 {
                    self.state = DangerState::Cooldown { target, timer };
                    return DangerOutcome::Quiet;
                }
                let still_in_range = targets.iter().any(|t| {
                    t.id == target
                        && t.alive
                        && world.distance(self.pos, t.pos) <= self.config.attack_range
                });
                if still_in_range {
                    self.begin_strike(target);
                    DangerOutcome::Engaged { target }
                } else {
                    self.state = DangerState::Idle;
                    DangerOutcome::Quiet
                }
            }
        }
    }

    fn begin_strike(&mut self, target: SurvivorId) {
        self.state = DangerState::Attacking {
            target,
            phase: AttackPhase::Strike,
            timer: self.config.strike_duration,
        };
    }

    /// Nearest live survivor in range that is not already fleeing.
    fn select_target(&self, targets: &[TargetView], world: &World) -> Option<SurvivorId> {
        let range_sq = self.config.attack_range * self.config.attack_range;
        targets
            .iter()
            .filter(|t| t.alive && !t.fleeing)
            .map(|t| (t.id, world.distance_sq(self.pos, t.pos)))
            .filter(|(_, d)| *d <= range_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(id, _)| id)
    }

    fn step_toward(&mut self, goal: Vec2, base_speed: f32, dt: f32, world: &World) {
        let delta = world.delta(self.pos, goal);
        let dist = delta.length();
        let step = base_speed * self.speed_factor() * dt;
        if dist <= step || dist <= f32::EPSILON {
            self.pos = world.wrap(goal);
        } else {
            self.pos = world.wrap(self.pos + delta / dist * step);
        }
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.rage.is_nan() || self.rage < 0.0 || self.rage > self.config.rage_max {
            return Err(InvariantViolation::Rage {
                rage: self.rage,
                max: self.config.rage_max,
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> DangerSnapshot {
        DangerSnapshot {
            position: self.pos.into(),
            home: self.home.into(),
            rage: self.rage,
            rage_max: self.config.rage_max,
            phase: self.phase(),
            target: self.target(),
            time_since_last_attack: self.time_since_last_attack,
            rotation_angle: self.rotation_angle,
            rotation_speed: self.rotation_speed(),
            hits_landed: self.hits_landed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use macroquad::math::vec2;

    const DT: f32 = 1.0 / 30.0;

    fn setup(config: &SimConfig) -> (DangerAgent, ClimateController, World) {
        let world = World::new(1000.0, 1000.0, false);
        let climate =
            ClimateController::new(&config.climate, config.survivor.resilience).unwrap();
        let danger = DangerAgent::new(config.danger.clone(), vec2(500.0, 500.0));
        (danger, climate, world)
    }

    fn target(id: u32, pos: Vec2) -> TargetView {
        TargetView {
            id: SurvivorId(id),
            pos,
            fleeing: false,
            alive: true,
        }
    }

    fn run_until_hit(
        danger: &mut DangerAgent,
        targets: &[TargetView],
        climate: &ClimateController,
        world: &World,
    ) -> f32 {
        for _ in 0..1_000 {
            if let DangerOutcome::Hit { damage, .. } = danger.update(DT, targets, climate, world) {
                return damage;
            }
        }
        panic!("no hit landed");
    }

    #[test]
    fn idle_ignores_fleeing_and_out_of_range_survivors() {
        let config = SimConfig::default();
        let (mut danger, climate, world) = setup(&config);
        let mut fleeing = target(0, vec2(510.0, 500.0));
        fleeing.fleeing = true;
        let far = target(1, vec2(700.0, 500.0));
        let outcome = danger.update(DT, &[fleeing, far], &climate, &world);
        assert_eq!(outcome, DangerOutcome::Quiet);
        assert_eq!(danger.state, DangerState::Idle);
    }

    #[test]
    fn engages_nearest_eligible_survivor() {
        let config = SimConfig::default();
        let (mut danger, climate, world) = setup(&config);
        let targets = [target(3, vec2(540.0, 500.0)), target(7, vec2(520.0, 500.0))];
        let outcome = danger.update(DT, &targets, &climate, &world);
        assert_eq!(
            outcome,
            DangerOutcome::Engaged {
                target: SurvivorId(7)
            }
        );
        assert_eq!(danger.phase(), DangerPhase::Strike);
    }

    #[test]
    fn strike_return_cooldown_cycle() {
        let config = SimConfig::default();
        let (mut danger, climate, world) = setup(&config);
        let targets = [target(0, vec2(530.0, 500.0))];
        let damage = run_until_hit(&mut danger, &targets, &climate, &world);
        assert_eq!(damage, config.danger.base_damage);
        assert_eq!(danger.phase(), DangerPhase::Return);
        assert_eq!(danger.rage, 1.0);

        let mut reached_cooldown = false;
        for _ in 0..30 {
            danger.update(DT, &targets, &climate, &world);
            if danger.phase() == DangerPhase::Cooldown {
                reached_cooldown = true;
                break;
            }
        }
        assert!(reached_cooldown);
        assert_eq!(danger.pos, danger.home);

        // Target gone by the end of the cooldown: back to idle.
        for _ in 0..80 {
            danger.update(DT, &[], &climate, &world);
        }
        assert_eq!(danger.state, DangerState::Idle);
    }

    #[test]
    fn missed_strike_leaves_rage_untouched() {
        let config = SimConfig::default();
        let (mut danger, climate, world) = setup(&config);
        danger.update(DT, &[target(0, vec2(550.0, 500.0))], &climate, &world);
        let mut missed = false;
        for _ in 0..20 {
            let outcome = danger.update(DT, &[target(0, vec2(900.0, 900.0))], &climate, &world);
            if matches!(outcome, DangerOutcome::Missed { .. }) {
                missed = true;
                break;
            }
        }
        assert!(missed);
        assert_eq!(danger.rage, 0.0);
        assert_eq!(danger.hits_landed, 0);
    }

    #[test]
    fn rage_climbs_per_hit_then_plateaus_then_decays() {
        let mut config = SimConfig::default();
        config.danger.rage_max = 3.0;
        let (mut danger, climate, world) = setup(&config);
        let targets = [target(0, vec2(520.0, 500.0))];

        let mut rages = Vec::new();
        let mut damages = Vec::new();
        for _ in 0..5 {
            damages.push(run_until_hit(&mut danger, &targets, &climate, &world));
            rages.push(danger.rage);
        }
        assert_eq!(rages, vec![1.0, 2.0, 3.0, 3.0, 3.0]);
        assert!(damages[1] > damages[0] && damages[2] > damages[1]);
        assert_eq!(danger.speed_factor(), 2.0);

        // No targets: finish the attack, wait out the cooldown, then decay.
        let mut previous = danger.rage;
        let mut decaying = false;
        for _ in 0..3_000 {
            danger.update(DT, &[], &climate, &world);
            if danger.state == DangerState::Idle
                && danger.time_since_last_attack >= config.danger.inactivity_threshold
            {
                if danger.rage == 0.0 {
                    break;
                }
                if decaying {
                    assert!(danger.rage < previous, "rage must strictly fall");
                }
                decaying = true;
            }
            previous = danger.rage;
        }
        assert!(decaying);
        assert_eq!(danger.rage, 0.0);
        danger.check_invariants().unwrap();
    }

    #[test]
    fn rotation_speed_tracks_rage() {
        let config = SimConfig::default();
        let (mut danger, _, _) = setup(&config);
        assert_eq!(danger.rotation_speed(), 0.0);
        danger.rage = config.danger.rage_max / 2.0;
        assert!((danger.rotation_speed() - 15.0).abs() < 1e-5);
    }
}
