//! Survivor data and the per-tick behaviour cascade.
//!
//! Each tick a survivor runs through a fixed priority list and the first rule
//! that applies decides what it does:
//!
//! 1. out of energy: stall, then die;
//! 2. the danger is within its effective sensorial radius: flee;
//! 3. it remembers the danger and is inside the safety distance: turn back;
//! 4. a fleeing peer is visible and no danger is remembered: follow it;
//! 5. hungry, off cooldown and food in range: rush to it, then eat;
//! 6. otherwise wander.
//!
//! Sensing uses the start-of-tick positions carried by [`SenseContext`].

use macroquad::math::{vec2, Vec2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::climate::{ClimateController, PenaltyKind};
use crate::config::{SurvivorConfig, ValueRange};
use crate::entity::{FoodId, SurvivorId};
use crate::error::InvariantViolation;
use crate::food::{FoodLifecycle, FoodView};
use crate::snapshot::{MealEnd, SimEvent, SurvivorSnapshot};
use crate::world::World;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathCause {
    Exhaustion,
    DangerAttack,
    /// Struck down by the danger in the middle of a meal.
    WhileEating,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BehaviorState {
    Seeking,
    Fleeing { timer: f32 },
    /// Danger remembered. `turn_back > 0` while steering away from the memory point.
    DejaVu { turn_back: f32 },
    Following { target: SurvivorId },
    Eating { food: FoodId },
    Stalled { timer: f32, cause: DeathCause },
    Dead { cause: DeathCause },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateTag {
    Seeking,
    Fleeing,
    DejaVu,
    Following,
    Eating,
    Stalled,
    Dead,
}

impl BehaviorState {
    pub fn tag(&self) -> StateTag {
        match self {
            BehaviorState::Seeking => StateTag::Seeking,
            BehaviorState::Fleeing { .. } => StateTag::Fleeing,
            BehaviorState::DejaVu { .. } => StateTag::DejaVu,
            BehaviorState::Following { .. } => StateTag::Following,
            BehaviorState::Eating { .. } => StateTag::Eating,
            BehaviorState::Stalled { .. } => StateTag::Stalled,
            BehaviorState::Dead { .. } => StateTag::Dead,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurvivorStats {
    pub hits_taken: u32,
    pub foods_consumed: u32,
    pub energy_lost: f32,
    pub energy_recovered: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeerView {
    pub id: SurvivorId,
    pub pos: Vec2,
}

/// What a survivor perceives this tick, frozen at the start of the tick.
#[derive(Clone, Debug, Default)]
pub struct SenseContext {
    pub danger: Option<Vec2>,
    /// Nearby peers that were fleeing at the start of the tick.
    pub fleeing_peers: Vec<PeerView>,
    pub foods: Vec<FoodView>,
}

/// Shared read-only collaborators for a survivor update.
pub struct TickEnv<'a> {
    pub config: &'a SurvivorConfig,
    pub climate: &'a ClimateController,
    pub world: &'a World,
    pub danger_edge: f32,
}

/// Flee time, longest for the least audacious survivor.
pub fn flee_duration(audacity: f32, audacity_range: &ValueRange, flee: &ValueRange) -> f32 {
    let boldness = audacity_range.fraction(audacity);
    flee.min + (1.0 - boldness) * (flee.max - flee.min)
}

/// Radius around a remembered danger that triggers a turn back.
pub fn safety_distance(audacity: f32, config: &SurvivorConfig, danger_edge: f32) -> f32 {
    config.safety_distance_edges * danger_edge + config.safety_distance_scale / audacity.max(f32::EPSILON)
}

/// Memory window granted on entering Fleeing.
pub fn memory_duration(energy: f32, ratio: f32) -> f32 {
    ratio * energy.max(0.0)
}

#[derive(Clone, Debug)]
pub struct Survivor {
    pub id: SurvivorId,
    pub name: String,
    pub pos: Vec2,
    /// Unit vector.
    pub heading: Vec2,
    pub speed: f32,
    pub energy: f32,
    pub base_radius: f32,
    pub effective_radius: f32,
    audacity: f32,
    resilience: f32,
    pub state: BehaviorState,
    pub danger_memory: Option<Vec2>,
    pub deja_vu_timer: f32,
    pub eating_cooldown: f32,
    pub food_target: Option<FoodId>,
    pub direction_timer: f32,
    pub age: f32,
    pub stats: SurvivorStats,
    struck_this_tick: bool,
    struck_while_eating: bool,
}

impl Survivor {
    pub fn new(
        id: SurvivorId,
        name: String,
        pos: Vec2,
        heading: Vec2,
        audacity: f32,
        resilience: f32,
        config: &SurvivorConfig,
    ) -> Self {
        Self {
            id,
            name,
            pos,
            heading: heading.try_normalize().unwrap_or(vec2(1.0, 0.0)),
            speed: 0.0,
            energy: config.energy_initial,
            base_radius: config.sensorial_radius,
            effective_radius: config.sensorial_radius,
            audacity: config.audacity.clamp(audacity),
            resilience: config.resilience.clamp(resilience),
            state: BehaviorState::Seeking,
            danger_memory: None,
            deja_vu_timer: 0.0,
            eating_cooldown: 0.0,
            food_target: None,
            direction_timer: 0.0,
            age: 0.0,
            stats: SurvivorStats::default(),
            struck_this_tick: false,
            struck_while_eating: false,
        }
    }

    /// New survivor with traits and heading drawn from `rng`.
    pub fn spawn(
        id: SurvivorId,
        name: String,
        pos: Vec2,
        config: &SurvivorConfig,
        rng: &mut impl Rng,
    ) -> Self {
        let heading = random_heading(rng);
        let audacity = config.audacity.sample(rng);
        let resilience = config.resilience.sample(rng);
        let mut survivor = Self::new(id, name, pos, heading, audacity, resilience, config);
        survivor.direction_timer = config.direction_change.sample(rng);
        survivor
    }

    pub fn audacity(&self) -> f32 {
        self.audacity
    }

    pub fn resilience(&self) -> f32 {
        self.resilience
    }

    pub fn tag(&self) -> StateTag {
        self.state.tag()
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.state, BehaviorState::Dead { .. })
    }

    /// Still able to act or be targeted.
    pub fn is_alive(&self) -> bool {
        !matches!(
            self.state,
            BehaviorState::Dead { .. } | BehaviorState::Stalled { .. }
        )
    }

    pub fn is_fleeing(&self) -> bool {
        matches!(self.state, BehaviorState::Fleeing { .. })
    }

    pub fn eating_slot(&self) -> Option<FoodId> {
        match self.state {
            BehaviorState::Eating { food } => Some(food),
            _ => None,
        }
    }

    pub fn follow_target(&self) -> Option<SurvivorId> {
        match self.state {
            BehaviorState::Following { target } => Some(target),
            _ => None,
        }
    }

    pub fn death_cause(&self) -> Option<DeathCause> {
        match self.state {
            BehaviorState::Stalled { cause, .. } | BehaviorState::Dead { cause } => Some(cause),
            _ => None,
        }
    }

    pub fn memory_active(&self) -> bool {
        self.danger_memory.is_some() && self.deja_vu_timer > 0.0
    }

    pub fn is_critical(&self, config: &SurvivorConfig) -> bool {
        self.energy <= config.critical_threshold
    }

    pub fn is_hungry(&self, config: &SurvivorConfig) -> bool {
        self.energy <= config.hunger_threshold
    }

    /// Shrinks linearly below the critical threshold, never under the body radius.
    pub fn refresh_effective_radius(&mut self, config: &SurvivorConfig) {
        self.effective_radius = if self.is_critical(config) {
            let scaled = self.base_radius * self.energy / config.critical_threshold;
            scaled.max(config.body_radius).min(self.base_radius)
        } else {
            self.base_radius
        };
    }

    /// Advance this survivor by one tick. Events are appended to `events`.
    pub fn update(
        &mut self,
        ctx: &SenseContext,
        env: &TickEnv,
        food: &mut FoodLifecycle,
        dt: f32,
        rng: &mut impl Rng,
        events: &mut Vec<SimEvent>,
    ) {
        if !self.is_dead() {
            self.age += dt;
            self.step(ctx, env, food, dt, rng, events);
        }
        self.struck_this_tick = false;
        self.struck_while_eating = false;
    }

    fn step(
        &mut self,
        ctx: &SenseContext,
        env: &TickEnv,
        food: &mut FoodLifecycle,
        dt: f32,
        rng: &mut impl Rng,
        events: &mut Vec<SimEvent>,
    ) {
        let config = env.config;

        // 1. Stalled / dead
        if let BehaviorState::Stalled { timer, cause } = self.state {
            let timer = timer - dt;
            if timer <= 0.0 {
                self.state = BehaviorState::Dead { cause };
                info!(survivor = self.id.0, name = %self.name, ?cause, age = self.age, "survivor died");
                events.push(SimEvent::SurvivorDied {
                    survivor: self.id,
                    name: self.name.clone(),
                    cause,
                    age: self.age,
                });
            } else {
                self.state = BehaviorState::Stalled { timer, cause };
            }
            return;
        }
        if self.energy <= 0.0 {
            self.enter_stall(config, food, events);
            return;
        }

        self.refresh_effective_radius(config);
        self.eating_cooldown = (self.eating_cooldown - dt).max(0.0);
        self.direction_timer -= dt;
        if !self.is_fleeing() && self.deja_vu_timer > 0.0 {
            self.deja_vu_timer = (self.deja_vu_timer - dt).max(0.0);
            if self.deja_vu_timer <= 0.0 {
                self.danger_memory = None;
            }
        }

        // 2. Danger in sight
        if let Some(danger) = ctx.danger {
            if env.world.distance(self.pos, danger) <= self.effective_radius {
                self.enter_flee(danger, config, env.world, food, events);
                self.flee_step(env, dt);
                return;
            }
        }
        if let BehaviorState::Fleeing { timer } = self.state {
            let timer = timer - dt;
            if timer > 0.0 {
                self.state = BehaviorState::Fleeing { timer };
                self.flee_step(env, dt);
                return;
            }
            self.state = self.resting_state();
            debug!(survivor = self.id.0, state = ?self.state.tag(), "flee over");
        }

        // 3. Turn back from a remembered danger
        if self.memory_active() {
            if let Some(memory) = self.danger_memory {
                let safety = safety_distance(self.audacity, config, env.danger_edge);
                if env.world.distance(self.pos, memory) < safety {
                    if !matches!(self.state, BehaviorState::DejaVu { turn_back } if turn_back > 0.0) {
                        debug!(survivor = self.id.0, safety, "turning back");
                    }
                    self.leave_meal(food, MealEnd::Interrupted, config, events);
                    self.food_target = None;
                    if let Some(away) = env.world.direction(memory, self.pos) {
                        self.heading = away;
                    }
                    self.state = BehaviorState::DejaVu {
                        turn_back: config.turn_back_duration,
                    };
                    self.cruise(config.speed_seek, env, dt);
                    return;
                }
            }
            if let BehaviorState::DejaVu { turn_back } = self.state {
                if turn_back > 0.0 {
                    self.state = BehaviorState::DejaVu {
                        turn_back: (turn_back - dt).max(0.0),
                    };
                    self.cruise(config.speed_seek, env, dt);
                    return;
                }
            }
        }

        // 4. Follow a fleeing peer
        if !self.memory_active() {
            if let Some(peer) = self.nearest_fleeing_peer(ctx, env.world) {
                if self.follow_target() != Some(peer.id) {
                    debug!(survivor = self.id.0, peer = peer.id.0, "following");
                }
                self.leave_meal(food, MealEnd::Interrupted, config, events);
                self.food_target = None;
                if let Some(dir) = env.world.direction(self.pos, peer.pos) {
                    self.heading = dir;
                }
                self.state = BehaviorState::Following { target: peer.id };
                self.cruise(config.speed_seek, env, dt);
                return;
            }
        }
        if matches!(self.state, BehaviorState::Following { .. }) {
            self.state = self.resting_state();
        }

        // 5. Food
        if let BehaviorState::Eating { food: id } = self.state {
            self.eat(id, env, food, dt, events);
            return;
        }
        if self.is_hungry(config) && self.eating_cooldown <= 0.0 {
            if let Some(target) = self.nearest_food(ctx, env.world) {
                self.food_target = Some(target.id);
                let dist = env.world.distance(self.pos, target.pos);
                if dist <= target.olfactory_radius * 0.5 {
                    if !food.is_available(target.id) {
                        // Emptied earlier this tick.
                        self.food_target = None;
                    } else if food.try_claim_slot(target.id) {
                        self.state = BehaviorState::Eating { food: target.id };
                        self.speed = 0.0;
                        self.stats.foods_consumed += 1;
                        debug!(survivor = self.id.0, food = target.id.0, energy = self.energy, "eating");
                        events.push(SimEvent::StartedEating {
                            survivor: self.id,
                            food: target.id,
                        });
                        return;
                    } else {
                        warn!(survivor = self.id.0, food = target.id.0, "food at capacity, backing off");
                        self.eating_cooldown = config.eating_cooldown;
                        self.food_target = None;
                        events.push(SimEvent::CapacityTurnedAway {
                            survivor: self.id,
                            food: target.id,
                        });
                    }
                } else {
                    if let Some(dir) = env.world.direction(self.pos, target.pos) {
                        self.heading = dir;
                    }
                    self.state = self.resting_state();
                    self.cruise(config.speed_food_rush, env, dt);
                    return;
                }
            } else {
                self.food_target = None;
            }
        } else {
            self.food_target = None;
        }

        // 6. Wander
        if self.direction_timer <= 0.0 {
            self.heading = random_heading(rng);
            self.direction_timer = config.direction_change.sample(rng);
        }
        self.state = self.resting_state();
        self.cruise(config.speed_seek, env, dt);
    }

    /// Seeking, or DejaVu while a danger is remembered.
    fn resting_state(&self) -> BehaviorState {
        if self.memory_active() {
            BehaviorState::DejaVu { turn_back: 0.0 }
        } else {
            BehaviorState::Seeking
        }
    }

    /// Damage from the danger. Always forces Fleeing with a fresh memory point.
    pub fn apply_attack_damage(
        &mut self,
        damage: f32,
        danger_pos: Vec2,
        env: &TickEnv,
        food: &mut FoodLifecycle,
        events: &mut Vec<SimEvent>,
    ) {
        if !self.is_alive() {
            return;
        }
        let was_eating = self.eating_slot().is_some();
        let lost = damage.max(0.0).min(self.energy);
        self.energy -= lost;
        self.stats.energy_lost += lost;
        self.stats.hits_taken += 1;
        self.struck_this_tick = true;
        self.struck_while_eating = was_eating;
        events.push(SimEvent::SurvivorAttacked {
            survivor: self.id,
            damage,
            energy_left: self.energy,
        });
        self.enter_flee(danger_pos, env.config, env.world, food, events);
    }

    fn enter_flee(
        &mut self,
        danger: Vec2,
        config: &SurvivorConfig,
        world: &World,
        food: &mut FoodLifecycle,
        events: &mut Vec<SimEvent>,
    ) {
        if !self.is_fleeing() {
            self.deja_vu_timer = memory_duration(self.energy, config.memory_energy_ratio);
            debug!(
                survivor = self.id.0,
                energy = self.energy,
                memory = self.deja_vu_timer,
                "fleeing"
            );
            events.push(SimEvent::StartedFleeing { survivor: self.id });
        }
        self.leave_meal(food, MealEnd::Interrupted, config, events);
        self.food_target = None;
        self.danger_memory = Some(danger);
        if let Some(away) = world.direction(danger, self.pos) {
            self.heading = away;
        }
        self.state = BehaviorState::Fleeing {
            timer: flee_duration(self.audacity, &config.audacity, &config.flee_duration),
        };
    }

    fn flee_step(&mut self, env: &TickEnv, dt: f32) {
        if let Some(memory) = self.danger_memory {
            if let Some(away) = env.world.direction(memory, self.pos) {
                self.heading = away;
            }
        }
        let config = env.config;
        self.speed = env
            .climate
            .penalty_for(config.speed_flee, PenaltyKind::Speed, self.resilience);
        self.advance(env.world, dt);
        self.drain(config.energy_loss_flee, env.climate, dt);
    }

    /// Move along the heading at a non-flee speed and pay the seeking energy cost.
    fn cruise(&mut self, base_speed: f32, env: &TickEnv, dt: f32) {
        let config = env.config;
        let base = if self.is_critical(config) {
            config.speed_critical
        } else {
            base_speed
        };
        self.speed = env
            .climate
            .penalty_for(base, PenaltyKind::Speed, self.resilience);
        self.advance(env.world, dt);
        self.drain(config.energy_loss_seek, env.climate, dt);
    }

    fn advance(&mut self, world: &World, dt: f32) {
        self.pos = world.wrap(self.pos + self.heading * self.speed * dt);
    }

    fn drain(&mut self, base_loss: f32, climate: &ClimateController, dt: f32) {
        let loss = climate.penalty_for(base_loss, PenaltyKind::EnergyLoss, self.resilience) * dt;
        let lost = loss.max(0.0).min(self.energy);
        self.energy -= lost;
        self.stats.energy_lost += lost;
    }

    fn eat(
        &mut self,
        id: FoodId,
        env: &TickEnv,
        food: &mut FoodLifecycle,
        dt: f32,
        events: &mut Vec<SimEvent>,
    ) {
        let config = env.config;
        self.speed = 0.0;
        if !food.is_available(id) {
            self.leave_meal(food, MealEnd::FoodDepleted, config, events);
            return;
        }
        let rate = if self.is_critical(config) {
            config.eat_rate_critical
        } else {
            config.eat_rate
        };
        // Heat wastes food: each point of energy costs `wear` units of quantity.
        let wear = env
            .climate
            .environment_multiplier(PenaltyKind::FoodDecay)
            .max(f32::EPSILON);
        let wanted = (rate * dt).min(config.energy_max - self.energy);
        let drawn = food.consume(id, wanted * wear);
        let gained = (drawn / wear).min(wanted);
        self.energy = (self.energy + gained).min(config.energy_max);
        self.stats.energy_recovered += gained;

        if self.energy >= config.energy_max {
            self.leave_meal(food, MealEnd::Full, config, events);
        } else if !food.is_available(id) {
            self.leave_meal(food, MealEnd::FoodDepleted, config, events);
        }
    }

    /// Release the eating slot if one is held. Finished meals start the cooldown.
    fn leave_meal(
        &mut self,
        food: &mut FoodLifecycle,
        reason: MealEnd,
        config: &SurvivorConfig,
        events: &mut Vec<SimEvent>,
    ) {
        let Some(id) = self.eating_slot() else {
            return;
        };
        food.release_slot(id);
        self.food_target = None;
        if reason != MealEnd::Interrupted {
            self.eating_cooldown = config.eating_cooldown;
        }
        self.state = self.resting_state();
        debug!(survivor = self.id.0, food = id.0, ?reason, energy = self.energy, "meal over");
        events.push(SimEvent::StoppedEating {
            survivor: self.id,
            food: id,
            reason,
        });
    }

    fn enter_stall(
        &mut self,
        config: &SurvivorConfig,
        food: &mut FoodLifecycle,
        events: &mut Vec<SimEvent>,
    ) {
        let cause = if self.struck_while_eating || self.eating_slot().is_some() {
            DeathCause::WhileEating
        } else if self.struck_this_tick {
            DeathCause::DangerAttack
        } else {
            DeathCause::Exhaustion
        };
        self.leave_meal(food, MealEnd::Interrupted, config, events);
        self.energy = 0.0;
        self.speed = 0.0;
        self.food_target = None;
        self.state = BehaviorState::Stalled {
            timer: config.stall_duration,
            cause,
        };
        info!(survivor = self.id.0, name = %self.name, ?cause, "survivor stalled");
        events.push(SimEvent::SurvivorStalled { survivor: self.id });
    }

    fn nearest_fleeing_peer(&self, ctx: &SenseContext, world: &World) -> Option<PeerView> {
        ctx.fleeing_peers
            .iter()
            .filter(|p| p.id != self.id)
            .map(|p| (*p, world.distance(self.pos, p.pos)))
            .filter(|(_, d)| *d <= self.effective_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)))
            .map(|(p, _)| p)
    }

    /// Closest food whose scent field overlaps the survivor's senses.
    fn nearest_food(&self, ctx: &SenseContext, world: &World) -> Option<FoodView> {
        ctx.foods
            .iter()
            .filter(|f| f.has_free_slot)
            .map(|f| (*f, world.distance(self.pos, f.pos)))
            .filter(|(f, d)| *d < self.effective_radius + f.olfactory_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)))
            .map(|(f, _)| f)
    }

    pub fn check_invariants(&self, config: &SurvivorConfig) -> Result<(), InvariantViolation> {
        if self.energy.is_nan() || self.energy < 0.0 || self.energy > config.energy_max {
            return Err(InvariantViolation::SurvivorEnergy {
                id: self.id,
                energy: self.energy,
                max: config.energy_max,
            });
        }
        if self.effective_radius.is_nan() || self.effective_radius > self.base_radius + 1e-4 {
            return Err(InvariantViolation::SensorialRadius {
                id: self.id,
                effective: self.effective_radius,
                base: self.base_radius,
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SurvivorSnapshot {
        SurvivorSnapshot {
            id: self.id,
            name: self.name.clone(),
            position: self.pos.into(),
            heading: self.heading.into(),
            speed: self.speed,
            energy: self.energy,
            base_radius: self.base_radius,
            effective_radius: self.effective_radius,
            audacity: self.audacity,
            resilience: self.resilience,
            state: self.tag(),
            danger_memory: self.danger_memory.map(Into::into),
            deja_vu_timer: self.deja_vu_timer,
            eating_cooldown: self.eating_cooldown,
            follow_target: self.follow_target(),
            eating_slot: self.eating_slot(),
            age: self.age,
            hits_taken: self.stats.hits_taken,
            foods_consumed: self.stats.foods_consumed,
            energy_lost: self.stats.energy_lost,
            energy_recovered: self.stats.energy_recovered,
        }
    }
}

fn random_heading(rng: &mut impl Rng) -> Vec2 {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    vec2(angle.cos(), angle.sin())
}
