use macroquad::math::Vec2;
use rand::Rng;
use tracing::{debug, info};

use crate::climate::{ClimateController, PenaltyKind};
use crate::config::{FoodConfig, WorldConfig};
use crate::entity::FoodId;
use crate::error::{InvariantViolation, PlacementWarning};
use crate::snapshot::FoodSnapshot;
use crate::world::World;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FoodState {
    Available,
    Depleted { respawn_timer: f32 },
}

#[derive(Clone, Debug)]
pub struct Food {
    pub id: FoodId,
    pub pos: Vec2,
    pub quantity: f32,
    /// Quantity at the last (re)spawn; the olfactory radius is relative to it.
    pub spawned_quantity: f32,
    pub olfactory_radius: f32,
    pub eaters: u32,
    pub state: FoodState,
    pub respawns: u32,
}

impl Food {
    pub fn is_available(&self) -> bool {
        self.state == FoodState::Available && self.quantity > 0.0
    }

    pub fn respawn_timer(&self) -> Option<f32> {
        match self.state {
            FoodState::Depleted { respawn_timer } => Some(respawn_timer),
            FoodState::Available => None,
        }
    }

    pub fn check_invariants(&self, capacity: u32) -> Result<(), InvariantViolation> {
        if self.quantity.is_nan() || self.quantity < 0.0 {
            return Err(InvariantViolation::FoodQuantity {
                id: self.id,
                quantity: self.quantity,
            });
        }
        if self.eaters > capacity {
            return Err(InvariantViolation::EaterOverflow {
                id: self.id,
                eaters: self.eaters,
                capacity,
            });
        }
        Ok(())
    }
}

/// What a survivor can know about a food at the start of a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FoodView {
    pub id: FoodId,
    pub pos: Vec2,
    pub olfactory_radius: f32,
    pub has_free_slot: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FoodEvent {
    Depleted {
        food: FoodId,
    },
    Respawned {
        food: FoodId,
        position: Vec2,
        quantity: f32,
        warning: Option<PlacementWarning>,
    },
}

/// Owns every food source and is the only place their quantity or slots change.
pub struct FoodLifecycle {
    foods: Vec<Food>,
    config: FoodConfig,
    spawn_attempts: u32,
    spawn_relaxations: u32,
}

impl FoodLifecycle {
    pub fn new(config: FoodConfig, world: &WorldConfig) -> Self {
        Self {
            foods: Vec::with_capacity(config.count),
            config,
            spawn_attempts: world.spawn_attempts,
            spawn_relaxations: world.spawn_relaxations,
        }
    }

    /// Place `config.count` foods away from the danger.
    pub fn spawn_initial(
        &mut self,
        world: &World,
        danger_pos: Vec2,
        climate: &ClimateController,
        rng: &mut impl Rng,
    ) -> Vec<PlacementWarning> {
        let mut warnings = Vec::new();
        for _ in 0..self.config.count {
            let (pos, warning) = self.placement(world, danger_pos, rng);
            warnings.extend(warning);
            let quantity = self.sample_quantity(climate, rng);
            self.place(pos, quantity);
        }
        warnings
    }

    /// Add a food at a fixed position with the given quantity.
    pub fn place(&mut self, pos: Vec2, quantity: f32) -> FoodId {
        let id = FoodId(self.foods.len() as u32);
        self.foods.push(Food {
            id,
            pos,
            quantity,
            spawned_quantity: quantity,
            olfactory_radius: self.config.olfactory_radius_max,
            eaters: 0,
            state: FoodState::Available,
            respawns: 0,
        });
        id
    }

    pub fn capacity(&self) -> u32 {
        self.config.max_eaters
    }

    pub fn len(&self) -> usize {
        self.foods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Food> {
        self.foods.iter()
    }

    pub fn get(&self, id: FoodId) -> Option<&Food> {
        self.foods.get(id.0 as usize)
    }

    fn get_mut(&mut self, id: FoodId) -> Option<&mut Food> {
        self.foods.get_mut(id.0 as usize)
    }

    pub fn is_available(&self, id: FoodId) -> bool {
        self.get(id).map_or(false, Food::is_available)
    }

    /// Views of the foods survivors can currently smell.
    pub fn views(&self) -> Vec<FoodView> {
        self.foods
            .iter()
            .filter(|f| f.is_available())
            .map(|f| FoodView {
                id: f.id,
                pos: f.pos,
                olfactory_radius: f.olfactory_radius,
                has_free_slot: f.eaters < self.config.max_eaters,
            })
            .collect()
    }

    pub fn total_quantity(&self) -> f32 {
        self.foods.iter().map(|f| f.quantity).sum()
    }

    /// Take an eating slot if one is free.
    pub fn try_claim_slot(&mut self, id: FoodId) -> bool {
        let capacity = self.config.max_eaters;
        match self.get_mut(id) {
            Some(food) if food.is_available() && food.eaters < capacity => {
                food.eaters += 1;
                true
            }
            _ => false,
        }
    }

    pub fn release_slot(&mut self, id: FoodId) {
        if let Some(food) = self.get_mut(id) {
            food.eaters = food.eaters.saturating_sub(1);
        }
    }

    /// Remove up to `amount` and return what was actually taken.
    pub fn consume(&mut self, id: FoodId, amount: f32) -> f32 {
        let config = &self.config;
        let Some(food) = self.foods.get_mut(id.0 as usize) else {
            return 0.0;
        };
        if !food.is_available() || amount <= 0.0 {
            return 0.0;
        }
        let taken = amount.min(food.quantity);
        food.quantity -= taken;
        if food.quantity <= f32::EPSILON {
            food.quantity = 0.0;
        }
        food.olfactory_radius = olfactory_radius(config, food.quantity, food.spawned_quantity);
        taken
    }

    /// Spoilage, depletion and respawn.
    pub fn update(
        &mut self,
        dt: f32,
        climate: &ClimateController,
        danger_pos: Vec2,
        world: &World,
        rng: &mut impl Rng,
    ) -> Vec<FoodEvent> {
        let mut events = Vec::new();
        let decay = self.config.spoilage_rate * climate.environment_multiplier(PenaltyKind::FoodDecay);

        for i in 0..self.foods.len() {
            match self.foods[i].state {
                FoodState::Available => {
                    let spoiled = {
                        let config = &self.config;
                        let food = &mut self.foods[i];
                        food.quantity = (food.quantity - decay * dt).max(0.0);
                        food.olfactory_radius =
                            olfactory_radius(config, food.quantity, food.spawned_quantity);
                        food.quantity <= 0.0
                    };
                    if spoiled {
                        let delay = self.config.respawn_delay.sample(rng)
                            * climate.environment_multiplier(PenaltyKind::FoodRespawnDelay);
                        let food = &mut self.foods[i];
                        food.quantity = 0.0;
                        food.olfactory_radius = 0.0;
                        food.state = FoodState::Depleted {
                            respawn_timer: delay,
                        };
                        info!(food = food.id.0, respawn_in = delay, "food depleted");
                        events.push(FoodEvent::Depleted { food: food.id });
                    }
                }
                FoodState::Depleted { respawn_timer } => {
                    let remaining = respawn_timer - dt;
                    if remaining > 0.0 {
                        self.foods[i].state = FoodState::Depleted {
                            respawn_timer: remaining,
                        };
                        continue;
                    }
                    if self.foods[i].eaters > 0 {
                        debug!(
                            food = self.foods[i].id.0,
                            eaters = self.foods[i].eaters,
                            "respawn waiting for eaters to leave"
                        );
                        self.foods[i].state = FoodState::Depleted { respawn_timer: 0.0 };
                        continue;
                    }
                    let (pos, warning) = self.placement(world, danger_pos, rng);
                    let quantity = self.sample_quantity(climate, rng);
                    let radius = self.config.olfactory_radius_max;
                    let food = &mut self.foods[i];
                    food.pos = pos;
                    food.quantity = quantity;
                    food.spawned_quantity = quantity;
                    food.olfactory_radius = radius;
                    food.eaters = 0;
                    food.state = FoodState::Available;
                    food.respawns += 1;
                    info!(
                        food = food.id.0,
                        x = pos.x,
                        y = pos.y,
                        quantity,
                        "food respawned"
                    );
                    events.push(FoodEvent::Respawned {
                        food: food.id,
                        position: pos,
                        quantity,
                        warning,
                    });
                }
            }
        }

        events
    }

    /// Force a food into the depleted state with the given timer.
    pub fn deplete(&mut self, id: FoodId, respawn_timer: f32) {
        if let Some(food) = self.get_mut(id) {
            food.quantity = 0.0;
            food.olfactory_radius = 0.0;
            food.state = FoodState::Depleted { respawn_timer };
        }
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.foods
            .iter()
            .try_for_each(|f| f.check_invariants(self.config.max_eaters))
    }

    pub fn snapshots(&self) -> Vec<FoodSnapshot> {
        self.foods
            .iter()
            .map(|f| FoodSnapshot {
                id: f.id,
                position: f.pos.into(),
                available: f.is_available(),
                quantity: f.quantity,
                spawned_quantity: f.spawned_quantity,
                olfactory_radius: f.olfactory_radius,
                eaters: f.eaters,
                capacity: self.config.max_eaters,
                respawn_timer: f.respawn_timer(),
                respawns: f.respawns,
            })
            .collect()
    }

    fn sample_quantity(&self, climate: &ClimateController, rng: &mut impl Rng) -> f32 {
        let raw = self.config.quantity.sample(rng)
            * climate.environment_multiplier(PenaltyKind::FoodQuantity);
        self.config.quantity.clamp(raw)
    }

    fn placement(
        &self,
        world: &World,
        danger_pos: Vec2,
        rng: &mut impl Rng,
    ) -> (Vec2, Option<PlacementWarning>) {
        world.find_spawn_point(
            danger_pos,
            world.width * self.config.danger_clearance_ratio,
            self.config.olfactory_radius_max * 0.5,
            self.spawn_attempts,
            self.spawn_relaxations,
            rng,
        )
    }
}

/// Linear in the remaining share of the spawned quantity, zero once empty.
fn olfactory_radius(config: &FoodConfig, quantity: f32, spawned: f32) -> f32 {
    if quantity <= 0.0 || spawned <= 0.0 {
        return 0.0;
    }
    let share = (quantity / spawned).clamp(0.0, 1.0);
    config.olfactory_radius_min + (config.olfactory_radius_max - config.olfactory_radius_min) * share
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use macroquad::math::vec2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn setup(config: &SimConfig) -> (FoodLifecycle, ClimateController, World, ChaCha8Rng) {
        let world = World::from_config(&config.world);
        let climate =
            ClimateController::new(&config.climate, config.survivor.resilience).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut food = FoodLifecycle::new(config.food.clone(), &config.world);
        food.spawn_initial(&world, world.center(), &climate, &mut rng);
        (food, climate, world, rng)
    }

    #[test]
    fn spawned_food_is_within_bounds_and_away_from_danger() {
        let mut config = SimConfig::default();
        config.food.count = 5;
        let (food, _, world, _) = setup(&config);
        for f in food.iter() {
            assert!(config.food.quantity.contains(f.quantity));
            assert_eq!(f.olfactory_radius, config.food.olfactory_radius_max);
            assert!(world.distance(f.pos, world.center()) >= world.width * 0.25);
        }
    }

    #[test]
    fn slots_never_exceed_capacity() {
        let mut config = SimConfig::default();
        config.food.max_eaters = 2;
        let (mut food, _, _, _) = setup(&config);
        let id = FoodId(0);
        assert!(food.try_claim_slot(id));
        assert!(food.try_claim_slot(id));
        assert!(!food.try_claim_slot(id));
        assert_eq!(food.get(id).unwrap().eaters, 2);
        assert!(!food.views()[0].has_free_slot);

        food.release_slot(id);
        assert!(food.try_claim_slot(id));
        food.check_invariants().unwrap();
    }

    #[test]
    fn olfactory_radius_shrinks_with_quantity() {
        let config = SimConfig::default();
        let (mut food, _, _, _) = setup(&config);
        let id = FoodId(0);
        let mut last = food.get(id).unwrap().olfactory_radius;
        while food.is_available(id) {
            food.consume(id, 25.0);
            let r = food.get(id).unwrap().olfactory_radius;
            assert!(r <= last);
            last = r;
        }
        assert_eq!(food.get(id).unwrap().quantity, 0.0);
        assert_eq!(last, 0.0);
    }

    #[test]
    fn consume_never_takes_more_than_is_left() {
        let config = SimConfig::default();
        let (mut food, _, _, _) = setup(&config);
        let id = FoodId(0);
        let total = food.get(id).unwrap().quantity;
        let taken = food.consume(id, total + 50.0);
        assert_eq!(taken, total);
        assert_eq!(food.consume(id, 5.0), 0.0);
    }

    #[test]
    fn depleted_food_respawns_elsewhere_with_fresh_quantity() {
        let config = SimConfig::default();
        let (mut food, climate, world, mut rng) = setup(&config);
        let id = FoodId(0);
        let old_pos = food.get(id).unwrap().pos;
        food.consume(id, 10_000.0);

        let events = food.update(0.1, &climate, world.center(), &world, &mut rng);
        assert!(matches!(events[..], [FoodEvent::Depleted { .. }]));
        let timer = food.get(id).unwrap().respawn_timer().unwrap();
        assert!(timer >= 3.0 && timer <= 7.0, "timer {timer}");
        assert!(food.views().is_empty());

        let mut respawned = None;
        for _ in 0..200 {
            for event in food.update(0.05, &climate, world.center(), &world, &mut rng) {
                if let FoodEvent::Respawned { position, quantity, .. } = event {
                    respawned = Some((position, quantity));
                }
            }
        }
        let (pos, quantity) = respawned.expect("food should respawn");
        assert_ne!(pos, old_pos);
        assert!(config.food.quantity.contains(quantity));
        let f = food.get(id).unwrap();
        assert!(f.is_available());
        assert_eq!(f.olfactory_radius, config.food.olfactory_radius_max);
        assert_eq!(f.respawns, 1);
    }

    #[test]
    fn respawn_waits_for_held_slots() {
        let config = SimConfig::default();
        let (mut food, climate, world, mut rng) = setup(&config);
        let id = FoodId(0);
        assert!(food.try_claim_slot(id));
        food.deplete(id, 0.0);
        let events = food.update(0.1, &climate, vec2(0.0, 0.0), &world, &mut rng);
        assert!(events.is_empty());
        food.release_slot(id);
        let events = food.update(0.1, &climate, vec2(0.0, 0.0), &world, &mut rng);
        assert!(matches!(events[..], [FoodEvent::Respawned { .. }]));
    }

    #[test]
    fn spoilage_follows_climate() {
        let config = SimConfig::default();
        let (mut food, mut climate, world, mut rng) = setup(&config);
        let id = FoodId(0);
        let before = food.get(id).unwrap().quantity;
        food.update(1.0, &climate, world.center(), &world, &mut rng);
        let temperate_loss = before - food.get(id).unwrap().quantity;
        assert!((temperate_loss - 0.5).abs() < 1e-3);

        climate.jump_to(3);
        let before = food.get(id).unwrap().quantity;
        food.update(1.0, &climate, world.center(), &world, &mut rng);
        let hot_loss = before - food.get(id).unwrap().quantity;
        assert!(hot_loss > temperate_loss * 3.0);
    }
}
