//! Population census, rolling history and run-wide counters.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::SurvivorConfig;
use crate::survivor::{DeathCause, StateTag, Survivor};

/// Bounded time series; the oldest sample is dropped once full.
#[derive(Clone, Debug)]
pub struct Series {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl Series {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<f32> {
        self.samples.back().copied()
    }
}

/// Head count of the population at the end of a tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Census {
    pub living: usize,
    pub stalled: usize,
    pub dead_total: usize,
    pub mean_energy: f32,
    pub critical: usize,
    pub seeking: usize,
    pub fleeing: usize,
    pub deja_vu: usize,
    pub following: usize,
    pub eating: usize,
}

impl Census {
    /// Count `survivors`; `dead_total` carries over the running death tally.
    pub fn take<'a>(
        survivors: impl IntoIterator<Item = &'a Survivor>,
        config: &SurvivorConfig,
        dead_total: usize,
    ) -> Self {
        let mut census = Census {
            dead_total,
            ..Default::default()
        };
        let mut energy_sum = 0.0;
        for s in survivors {
            match s.tag() {
                StateTag::Dead => continue,
                StateTag::Stalled => {
                    census.stalled += 1;
                    continue;
                }
                StateTag::Seeking => census.seeking += 1,
                StateTag::Fleeing => census.fleeing += 1,
                StateTag::DejaVu => census.deja_vu += 1,
                StateTag::Following => census.following += 1,
                StateTag::Eating => census.eating += 1,
            }
            census.living += 1;
            energy_sum += s.energy;
            if s.is_critical(config) {
                census.critical += 1;
            }
        }
        if census.living > 0 {
            census.mean_energy = energy_sum / census.living as f32;
        }
        census
    }
}

/// Running totals over the whole run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    pub deaths_by_exhaustion: u32,
    pub deaths_by_attack: u32,
    pub deaths_while_eating: u32,
    pub survivors_hit: u32,
    pub total_hits: u32,
    pub food_respawns: u32,
    pub isolated: u32,
}

impl Counters {
    pub fn record_death(&mut self, cause: DeathCause) {
        match cause {
            DeathCause::Exhaustion => self.deaths_by_exhaustion += 1,
            DeathCause::DangerAttack => self.deaths_by_attack += 1,
            DeathCause::WhileEating => self.deaths_while_eating += 1,
        }
    }

    pub fn deaths(&self) -> u32 {
        self.deaths_by_exhaustion + self.deaths_by_attack + self.deaths_while_eating
    }
}

/// Rolling history, sampled every `sample_interval` ticks.
#[derive(Clone, Debug)]
pub struct SimStats {
    pub population: Series,
    pub mean_energy: Series,
    pub food_quantity: Series,
    pub danger_rage: Series,
    /// Deaths since the previous sample.
    pub deaths: Series,
    pending_deaths: u32,
    sample_interval: u32,
    ticks_until_sample: u32,
}

impl SimStats {
    pub fn new(capacity: usize, sample_interval: u32) -> Self {
        let sample_interval = sample_interval.max(1);
        Self {
            population: Series::new(capacity),
            mean_energy: Series::new(capacity),
            food_quantity: Series::new(capacity),
            danger_rage: Series::new(capacity),
            deaths: Series::new(capacity),
            pending_deaths: 0,
            sample_interval,
            ticks_until_sample: sample_interval,
        }
    }

    pub fn sample_interval(&self) -> u32 {
        self.sample_interval
    }

    /// Feed the end-of-tick census.
    pub fn record(&mut self, census: &Census, food_quantity: f32, rage: f32, deaths_this_tick: u32) {
        self.pending_deaths += deaths_this_tick;
        self.ticks_until_sample -= 1;
        if self.ticks_until_sample > 0 {
            return;
        }
        self.ticks_until_sample = self.sample_interval;

        self.population.push(census.living as f32);
        self.mean_energy.push(census.mean_energy);
        self.food_quantity.push(food_quantity);
        self.danger_rage.push(rage);
        self.deaths.push(std::mem::take(&mut self.pending_deaths) as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::SurvivorId;
    use crate::survivor::BehaviorState;
    use macroquad::math::vec2;

    #[test]
    fn series_drops_the_oldest_sample_when_full() {
        let mut buf = Series::new(3);
        buf.push(1.0);
        buf.push(2.0);
        buf.push(3.0);
        buf.push(4.0);

        let values: Vec<f32> = buf.iter().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(buf.last(), Some(4.0));
    }

    #[test]
    fn deaths_accumulate_between_samples() {
        let mut stats = SimStats::new(8, 2);
        let census = Census {
            living: 10,
            mean_energy: 30.0,
            ..Default::default()
        };

        stats.record(&census, 400.0, 0.0, 3);
        assert!(stats.deaths.is_empty());

        stats.record(&census, 390.0, 1.0, 2);
        let deaths: Vec<f32> = stats.deaths.iter().collect();
        assert_eq!(deaths, vec![5.0]);
        assert_eq!(stats.population.last(), Some(10.0));
        assert_eq!(stats.danger_rage.last(), Some(1.0));
        assert_eq!(stats.pending_deaths, 0);

        stats.record(&census, 380.0, 1.0, 0);
        stats.record(&census, 370.0, 1.0, 0);
        assert_eq!(stats.deaths.last(), Some(0.0));
        assert_eq!(stats.food_quantity.len(), 2);
    }

    #[test]
    fn census_counts_states_and_skips_the_dead() {
        let config = SurvivorConfig::default();
        let mk = |id: u32, energy: f32, state: BehaviorState| {
            let mut s = Survivor::new(
                SurvivorId(id),
                format!("S{id}"),
                vec2(0.0, 0.0),
                vec2(1.0, 0.0),
                5.0,
                5.0,
                &config,
            );
            s.energy = energy;
            s.state = state;
            s
        };
        let survivors = vec![
            mk(0, 50.0, BehaviorState::Seeking),
            mk(1, 10.0, BehaviorState::Fleeing { timer: 1.0 }),
            mk(2, 0.0, BehaviorState::Stalled {
                timer: 1.0,
                cause: DeathCause::Exhaustion,
            }),
            mk(3, 0.0, BehaviorState::Dead {
                cause: DeathCause::Exhaustion,
            }),
        ];
        let census = Census::take(&survivors, &config, 4);
        assert_eq!(census.living, 2);
        assert_eq!(census.stalled, 1);
        assert_eq!(census.fleeing, 1);
        assert_eq!(census.critical, 1);
        assert_eq!(census.dead_total, 4);
        assert!((census.mean_energy - 30.0).abs() < 1e-5);
    }

    #[test]
    fn counters_split_deaths_by_cause() {
        let mut counters = Counters::default();
        counters.record_death(DeathCause::Exhaustion);
        counters.record_death(DeathCause::WhileEating);
        counters.record_death(DeathCause::Exhaustion);
        assert_eq!(counters.deaths_by_exhaustion, 2);
        assert_eq!(counters.deaths(), 3);
    }
}
