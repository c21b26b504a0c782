use macroquad::math::{vec2, Vec2};
use rand::Rng;
use tracing::warn;

use crate::config::WorldConfig;
use crate::error::PlacementWarning;

pub struct World {
    pub width: f32,
    pub height: f32,
    pub toroidal: bool,
}

impl World {
    pub fn new(width: f32, height: f32, toroidal: bool) -> Self {
        Self {
            width,
            height,
            toroidal,
        }
    }

    pub fn from_config(config: &WorldConfig) -> Self {
        Self::new(config.width, config.height, config.toroidal)
    }

    pub fn center(&self) -> Vec2 {
        vec2(self.width * 0.5, self.height * 0.5)
    }

    /// Wrap position into world bounds (toroidal), or clamp when bounded.
    pub fn wrap(&self, mut pos: Vec2) -> Vec2 {
        if !self.toroidal {
            pos.x = pos.x.clamp(0.0, self.width);
            pos.y = pos.y.clamp(0.0, self.height);
            return pos;
        }
        pos.x = pos.x.rem_euclid(self.width);
        pos.y = pos.y.rem_euclid(self.height);
        pos
    }

    /// Shortest displacement vector from `from` to `to`, accounting for wrapping.
    pub fn delta(&self, from: Vec2, to: Vec2) -> Vec2 {
        let mut d = to - from;
        if self.toroidal {
            let hw = self.width * 0.5;
            let hh = self.height * 0.5;
            if d.x > hw {
                d.x -= self.width;
            } else if d.x < -hw {
                d.x += self.width;
            }
            if d.y > hh {
                d.y -= self.height;
            } else if d.y < -hh {
                d.y += self.height;
            }
        }
        d
    }

    /// Squared distance using shortest path.
    pub fn distance_sq(&self, a: Vec2, b: Vec2) -> f32 {
        self.delta(a, b).length_squared()
    }

    /// Distance using shortest path.
    pub fn distance(&self, a: Vec2, b: Vec2) -> f32 {
        self.delta(a, b).length()
    }

    /// Unit vector pointing from `from` to `to`, or `None` when they coincide.
    pub fn direction(&self, from: Vec2, to: Vec2) -> Option<Vec2> {
        let d = self.delta(from, to);
        if d.length_squared() > f32::EPSILON {
            Some(d.normalize())
        } else {
            None
        }
    }

    /// Uniform point keeping `margin` away from every edge.
    pub fn random_point(&self, margin: f32, rng: &mut impl Rng) -> Vec2 {
        let mx = margin.clamp(0.0, self.width * 0.5 - f32::EPSILON).max(0.0);
        let my = margin.clamp(0.0, self.height * 0.5 - f32::EPSILON).max(0.0);
        vec2(
            sample_axis(mx, self.width - mx, rng),
            sample_axis(my, self.height - my, rng),
        )
    }

    /// Find a spawn point at least `min_distance` from `avoid` and `margin` from the edges.
    ///
    /// Each round draws `attempts` candidates; when a round fails the clearance is
    /// halved, up to `relaxations` times. If every round fails the farthest candidate
    /// seen is returned together with a warning.
    pub fn find_spawn_point(
        &self,
        avoid: Vec2,
        min_distance: f32,
        margin: f32,
        attempts: u32,
        relaxations: u32,
        rng: &mut impl Rng,
    ) -> (Vec2, Option<PlacementWarning>) {
        let mut clearance = min_distance;
        let mut best = self.random_point(margin, rng);
        let mut best_dist_sq = self.distance_sq(best, avoid);

        for _round in 0..=relaxations {
            let clearance_sq = clearance * clearance;
            for _ in 0..attempts {
                let candidate = self.random_point(margin, rng);
                let dist_sq = self.distance_sq(candidate, avoid);
                if dist_sq >= clearance_sq {
                    return (candidate, None);
                }
                if dist_sq > best_dist_sq {
                    best = candidate;
                    best_dist_sq = dist_sq;
                }
            }
            clearance *= 0.5;
        }

        let warning = PlacementWarning {
            attempts: attempts * (relaxations + 1),
            min_distance,
            avoid_x: avoid.x,
            avoid_y: avoid.y,
        };
        warn!(%warning, x = best.x, y = best.y, "placement fallback");
        (best, Some(warning))
    }
}

fn sample_axis(lo: f32, hi: f32, rng: &mut impl Rng) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn wrap_brings_positions_back_inside() {
        let world = World::new(100.0, 50.0, true);
        let p = world.wrap(vec2(-5.0, 55.0));
        assert!((p.x - 95.0).abs() < 1e-4);
        assert!((p.y - 5.0).abs() < 1e-4);

        let bounded = World::new(100.0, 50.0, false);
        assert_eq!(bounded.wrap(vec2(-5.0, 55.0)), vec2(0.0, 50.0));
    }

    #[test]
    fn delta_takes_the_short_way_around() {
        let world = World::new(100.0, 100.0, true);
        let d = world.delta(vec2(95.0, 50.0), vec2(5.0, 50.0));
        assert!((d.x - 10.0).abs() < 1e-4);
        assert!((world.distance(vec2(95.0, 50.0), vec2(5.0, 50.0)) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn spawn_point_respects_clearance_when_possible() {
        let world = World::new(400.0, 400.0, false);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let avoid = vec2(200.0, 200.0);
        for _ in 0..20 {
            let (p, warning) = world.find_spawn_point(avoid, 100.0, 10.0, 50, 2, &mut rng);
            assert!(warning.is_none());
            assert!(world.distance(p, avoid) >= 100.0);
            assert!(p.x >= 10.0 && p.x <= 390.0);
        }
    }

    #[test]
    fn impossible_clearance_falls_back_with_warning() {
        let world = World::new(20.0, 20.0, false);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let (p, warning) = world.find_spawn_point(vec2(10.0, 10.0), 1_000.0, 0.0, 5, 2, &mut rng);
        let warning = warning.expect("clearance cannot be met");
        assert_eq!(warning.attempts, 15);
        assert!(p.x >= 0.0 && p.x <= 20.0 && p.y >= 0.0 && p.y <= 20.0);
    }
}
