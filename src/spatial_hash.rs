use std::collections::HashMap;

use macroquad::math::Vec2;

use crate::entity::{EntityHandle, KindFilter};
use crate::world::World;

/// Uniform grid over entity handles. Holds positions only, never entity data.
///
/// The simulation commits moved positions once per tick, after every agent has
/// sensed, so all queries within a tick see start-of-tick positions.
pub struct SpatialHash {
    inv_cell_size: f32,
    pub cols: usize,
    pub rows: usize,
    cells: Vec<Vec<EntityHandle>>,
    entries: HashMap<EntityHandle, (Vec2, usize)>,
}

impl SpatialHash {
    pub fn new(world_w: f32, world_h: f32, cell_size: f32) -> Self {
        let cols = ((world_w / cell_size).ceil() as usize).max(1);
        let rows = ((world_h / cell_size).ceil() as usize).max(1);
        let cells = (0..cols * rows).map(|_| Vec::with_capacity(8)).collect();
        Self {
            inv_cell_size: 1.0 / cell_size,
            cols,
            rows,
            cells,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn position(&self, handle: EntityHandle) -> Option<Vec2> {
        self.entries.get(&handle).map(|(pos, _)| *pos)
    }

    fn cell_of(&self, pos: Vec2) -> usize {
        let cx = ((pos.x * self.inv_cell_size).max(0.0) as usize).min(self.cols - 1);
        let cy = ((pos.y * self.inv_cell_size).max(0.0) as usize).min(self.rows - 1);
        cy * self.cols + cx
    }

    /// Insert a handle, or move it if it is already indexed.
    pub fn insert(&mut self, handle: EntityHandle, pos: Vec2) {
        if self.entries.contains_key(&handle) {
            self.update(handle, pos);
            return;
        }
        let cell = self.cell_of(pos);
        self.cells[cell].push(handle);
        self.entries.insert(handle, (pos, cell));
    }

    /// Record a new position. Unknown handles are inserted.
    pub fn update(&mut self, handle: EntityHandle, pos: Vec2) {
        let new_cell = self.cell_of(pos);
        match self.entries.get_mut(&handle) {
            Some((stored, cell)) => {
                *stored = pos;
                if *cell != new_cell {
                    let old_cell = *cell;
                    *cell = new_cell;
                    self.cells[old_cell].retain(|h| *h != handle);
                    self.cells[new_cell].push(handle);
                }
            }
            None => {
                self.cells[new_cell].push(handle);
                self.entries.insert(handle, (pos, new_cell));
            }
        }
    }

    pub fn remove(&mut self, handle: EntityHandle) -> bool {
        match self.entries.remove(&handle) {
            Some((_, cell)) => {
                self.cells[cell].retain(|h| *h != handle);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.entries.clear();
    }

    /// Grid columns (or rows) to visit, each at most once.
    fn axis_span(center: i32, reach: i32, len: usize, wrap: bool) -> Vec<usize> {
        let len_i = len as i32;
        if wrap && 2 * reach + 1 >= len_i {
            return (0..len).collect();
        }
        (center - reach..=center + reach)
            .filter_map(|g| {
                if wrap {
                    Some(g.rem_euclid(len_i) as usize)
                } else if g >= 0 && g < len_i {
                    Some(g as usize)
                } else {
                    None
                }
            })
            .collect()
    }

    /// All handles accepted by `filter` within `radius` of `pos`, sorted by handle.
    pub fn query(
        &self,
        pos: Vec2,
        radius: f32,
        filter: KindFilter,
        world: &World,
    ) -> Vec<EntityHandle> {
        let mut result = Vec::new();
        if radius < 0.0 {
            return result;
        }
        let radius_sq = radius * radius;
        let reach = (radius * self.inv_cell_size).ceil() as i32 + 1;
        let cx = (pos.x * self.inv_cell_size).floor() as i32;
        let cy = (pos.y * self.inv_cell_size).floor() as i32;

        let xs = Self::axis_span(cx, reach, self.cols, world.toroidal);
        let ys = Self::axis_span(cy, reach, self.rows, world.toroidal);

        for &gy in &ys {
            for &gx in &xs {
                for &handle in &self.cells[gy * self.cols + gx] {
                    if !filter.accepts(handle) {
                        continue;
                    }
                    if let Some((p, _)) = self.entries.get(&handle) {
                        if world.distance_sq(pos, *p) <= radius_sq {
                            result.push(handle);
                        }
                    }
                }
            }
        }

        result.sort();
        result
    }

    /// Like [`query`](Self::query) but skips `exclude`.
    pub fn query_excluding(
        &self,
        pos: Vec2,
        radius: f32,
        filter: KindFilter,
        exclude: EntityHandle,
        world: &World,
    ) -> Vec<EntityHandle> {
        let mut result = self.query(pos, radius, filter, world);
        result.retain(|h| *h != exclude);
        result
    }

    /// Closest accepted handle within `radius`; ties go to the smaller handle.
    pub fn nearest(
        &self,
        pos: Vec2,
        radius: f32,
        filter: KindFilter,
        world: &World,
    ) -> Option<EntityHandle> {
        let mut best: Option<(EntityHandle, f32)> = None;
        for handle in self.query(pos, radius, filter, world) {
            let Some(p) = self.position(handle) else {
                continue;
            };
            let dist_sq = world.distance_sq(pos, p);
            match best {
                Some((_, best_dist_sq)) if dist_sq >= best_dist_sq => {}
                _ => best = Some((handle, dist_sq)),
            }
        }
        best.map(|(handle, _)| handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FoodId, SurvivorId};
    use macroquad::math::vec2;

    fn survivor(id: u32) -> EntityHandle {
        EntityHandle::Survivor(SurvivorId(id))
    }

    #[test]
    fn query_returns_only_handles_inside_radius() {
        let world = World::new(200.0, 200.0, false);
        let mut index = SpatialHash::new(world.width, world.height, 32.0);
        index.insert(survivor(0), vec2(50.0, 50.0));
        index.insert(survivor(1), vec2(55.0, 50.0));
        index.insert(survivor(2), vec2(150.0, 150.0));
        index.insert(EntityHandle::Danger, vec2(52.0, 52.0));

        let found = index.query(vec2(50.0, 50.0), 20.0, KindFilter::SURVIVORS, &world);
        assert_eq!(found, vec![survivor(0), survivor(1)]);

        let all = index.query(vec2(50.0, 50.0), 20.0, KindFilter::ALL, &world);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn update_moves_handle_between_cells() {
        let world = World::new(200.0, 200.0, false);
        let mut index = SpatialHash::new(world.width, world.height, 32.0);
        index.insert(survivor(0), vec2(10.0, 10.0));
        index.update(survivor(0), vec2(180.0, 180.0));

        assert!(index
            .query(vec2(10.0, 10.0), 15.0, KindFilter::ALL, &world)
            .is_empty());
        assert_eq!(
            index.query(vec2(182.0, 182.0), 15.0, KindFilter::ALL, &world),
            vec![survivor(0)]
        );
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn removed_handles_are_not_returned() {
        let world = World::new(200.0, 200.0, false);
        let mut index = SpatialHash::new(world.width, world.height, 32.0);
        let food = EntityHandle::Food(FoodId(0));
        index.insert(food, vec2(100.0, 100.0));
        assert!(index.remove(food));
        assert!(!index.remove(food));
        assert!(index
            .query(vec2(100.0, 100.0), 50.0, KindFilter::FOOD, &world)
            .is_empty());
    }

    #[test]
    fn toroidal_queries_see_across_the_edge_once() {
        let world = World::new(128.0, 128.0, true);
        let mut index = SpatialHash::new(world.width, world.height, 32.0);
        index.insert(survivor(0), vec2(2.0, 64.0));
        index.insert(survivor(1), vec2(126.0, 64.0));

        let found = index.query(vec2(1.0, 64.0), 10.0, KindFilter::SURVIVORS, &world);
        assert_eq!(found, vec![survivor(0), survivor(1)]);

        // Radius wider than the world must not duplicate results.
        let wide = index.query(vec2(1.0, 64.0), 500.0, KindFilter::SURVIVORS, &world);
        assert_eq!(wide, vec![survivor(0), survivor(1)]);
    }

    #[test]
    fn nearest_picks_closest_not_first() {
        let world = World::new(300.0, 300.0, false);
        let mut index = SpatialHash::new(world.width, world.height, 64.0);
        index.insert(survivor(0), vec2(120.0, 100.0));
        index.insert(survivor(1), vec2(104.0, 100.0));
        assert_eq!(
            index.nearest(vec2(100.0, 100.0), 50.0, KindFilter::SURVIVORS, &world),
            Some(survivor(1))
        );
    }
}
