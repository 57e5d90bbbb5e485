//! Sparse hash grid for radius queries over agents
//!
//! Rebuilt from scratch every tick; it never carries state across ticks.

use ahash::AHashMap;
use crate::core::types::{AgentId, Vec2};

/// Snapshot of an agent as inserted into the grid
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedAgent {
    pub id: AgentId,
    pub position: Vec2,
}

/// Uniform grid bucketing agents by position
pub struct SpatialIndex {
    cell_size: f32,
    cells: AHashMap<(i32, i32), Vec<usize>>,
    entries: Vec<IndexedAgent>,
    by_id: AHashMap<AgentId, usize>,
}

impl SpatialIndex {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            cells: AHashMap::new(),
            entries: Vec::new(),
            by_id: AHashMap::new(),
        }
    }

    #[inline]
    fn cell_coord(&self, pos: Vec2) -> (i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
        self.by_id.clear();
    }

    /// Insert an agent; re-inserting an id moves it instead of duplicating it
    pub fn insert(&mut self, id: AgentId, pos: Vec2) {
        if let Some(&idx) = self.by_id.get(&id) {
            let old = self.cell_coord(self.entries[idx].position);
            if let Some(cell) = self.cells.get_mut(&old) {
                cell.retain(|&e| e != idx);
            }
            self.entries[idx].position = pos;
            let coord = self.cell_coord(pos);
            self.cells.entry(coord).or_default().push(idx);
            return;
        }

        let idx = self.entries.len();
        let coord = self.cell_coord(pos);
        self.cells.entry(coord).or_default().push(idx);
        self.by_id.insert(id.clone(), idx);
        self.entries.push(IndexedAgent { id, position: pos });
    }

    pub fn get(&self, id: &AgentId) -> Option<&IndexedAgent> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    /// Every inserted agent within `radius` (inclusive) of `center`
    pub fn query(&self, center: Vec2, radius: f32) -> Vec<&IndexedAgent> {
        let radius = radius.max(0.0);
        let radius_sq = radius * radius;

        let (min_x, min_y) = self.cell_coord(Vec2::new(center.x - radius, center.y - radius));
        let (max_x, max_y) = self.cell_coord(Vec2::new(center.x + radius, center.y + radius));
        let span = (max_x as i64 - min_x as i64 + 1) * (max_y as i64 - min_y as i64 + 1);

        // A query wider than the populated grid is cheaper as a linear scan
        if span > self.cells.len() as i64 {
            return self
                .entries
                .iter()
                .filter(|e| e.position.distance_squared(&center) <= radius_sq)
                .collect();
        }

        let mut found = Vec::new();
        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                if let Some(cell) = self.cells.get(&(cx, cy)) {
                    for &idx in cell {
                        let entry = &self.entries[idx];
                        if entry.position.distance_squared(&center) <= radius_sq {
                            found.push(entry);
                        }
                    }
                }
            }
        }
        found
    }

    /// Rebuild grid from positions
    pub fn rebuild(&mut self, agents: impl Iterator<Item = (AgentId, Vec2)>) {
        self.clear();
        for (id, pos) in agents {
            self.insert(id, pos);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(found: &[&IndexedAgent]) -> Vec<String> {
        let mut v: Vec<_> = found.iter().map(|e| e.id.0.clone()).collect();
        v.sort();
        v
    }

    #[test]
    fn test_query_filters_by_exact_distance() {
        let mut grid = SpatialIndex::new(200.0);
        grid.insert("a".into(), Vec2::new(0.0, 0.0));
        grid.insert("b".into(), Vec2::new(30.0, 40.0)); // distance 50
        grid.insert("c".into(), Vec2::new(36.0, 36.0)); // distance ~50.9

        let found = grid.query(Vec2::ZERO, 50.0);
        assert_eq!(ids(&found), vec!["a", "b"]);
    }

    #[test]
    fn test_query_spans_multiple_cells() {
        let mut grid = SpatialIndex::new(10.0);
        grid.insert("west".into(), Vec2::new(-25.0, 0.0));
        grid.insert("east".into(), Vec2::new(25.0, 0.0));
        grid.insert("far".into(), Vec2::new(80.0, 0.0));

        let found = grid.query(Vec2::ZERO, 30.0);
        assert_eq!(ids(&found), vec!["east", "west"]);
    }

    #[test]
    fn test_negative_coordinates_bucket_correctly() {
        let mut grid = SpatialIndex::new(100.0);
        grid.insert("neg".into(), Vec2::new(-1.0, -1.0));
        let found = grid.query(Vec2::new(1.0, 1.0), 3.0);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_reinsert_moves_without_duplicating() {
        let mut grid = SpatialIndex::new(50.0);
        grid.insert("a".into(), Vec2::new(0.0, 0.0));
        grid.insert("a".into(), Vec2::new(500.0, 500.0));

        assert_eq!(grid.len(), 1);
        assert!(grid.query(Vec2::ZERO, 10.0).is_empty());
        assert_eq!(grid.query(Vec2::new(500.0, 500.0), 1.0).len(), 1);
    }

    #[test]
    fn test_rebuild_clears_previous_contents() {
        let mut grid = SpatialIndex::new(50.0);
        grid.insert("old".into(), Vec2::ZERO);
        grid.rebuild(vec![(AgentId::from("new"), Vec2::new(5.0, 5.0))].into_iter());

        assert!(grid.get(&AgentId::from("old")).is_none());
        assert!(grid.get(&AgentId::from("new")).is_some());
        assert_eq!(grid.len(), 1);
    }
}
