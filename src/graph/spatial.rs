//! Spatial indexing used by the collision force.

use egui::{Pos2, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Point index answering "which bodies lie in this rectangle".
pub trait SpatialIndex {
    fn clear(&mut self);

    fn insert(&mut self, index: usize, pos: Pos2);

    /// Push the indices of all bodies inside `region` onto `out`.
    fn query_region(&self, region: Rect, out: &mut Vec<usize>);

    fn rebuild(&mut self, positions: &[Pos2]) {
        self.clear();
        for (index, &pos) in positions.iter().enumerate() {
            self.insert(index, pos);
        }
    }
}

/// Which index implementation the collision force uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialIndexKind {
    #[default]
    Quadtree,
    Grid,
}

/// Uniform hash grid. Cheap to rebuild every step when bodies are evenly sized.
pub struct GridIndex {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<(usize, Pos2)>>,
}

impl GridIndex {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: HashMap::new(),
        }
    }

    fn cell_of(&self, pos: Pos2) -> (i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }
}

impl SpatialIndex for GridIndex {
    fn clear(&mut self) {
        self.cells.clear();
    }

    fn insert(&mut self, index: usize, pos: Pos2) {
        if !pos.x.is_finite() || !pos.y.is_finite() {
            return;
        }
        let cell = self.cell_of(pos);
        self.cells.entry(cell).or_default().push((index, pos));
    }

    fn query_region(&self, region: Rect, out: &mut Vec<usize>) {
        if !region.is_finite() {
            return;
        }
        let (min_x, min_y) = self.cell_of(region.min);
        let (max_x, max_y) = self.cell_of(region.max);
        // Sparse scan when the region spans more cells than are occupied
        let span = (max_x - min_x + 1) as i64 * (max_y - min_y + 1) as i64;
        if span > self.cells.len() as i64 {
            for (&(cx, cy), bodies) in &self.cells {
                if cx < min_x || cx > max_x || cy < min_y || cy > max_y {
                    continue;
                }
                out.extend(bodies.iter().filter(|(_, p)| region.contains(*p)).map(|(i, _)| *i));
            }
            return;
        }
        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                if let Some(bodies) = self.cells.get(&(cx, cy)) {
                    out.extend(bodies.iter().filter(|(_, p)| region.contains(*p)).map(|(i, _)| *i));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::quadtree::Quadtree;

    fn sample() -> Vec<Pos2> {
        (0..50)
            .map(|i| Pos2::new((i * 37 % 400) as f32 - 200.0, (i * 91 % 300) as f32 - 150.0))
            .collect()
    }

    fn query(index: &dyn SpatialIndex, region: Rect) -> Vec<usize> {
        let mut out = Vec::new();
        index.query_region(region, &mut out);
        out.sort();
        out
    }

    #[test]
    fn grid_and_quadtree_agree() {
        let positions = sample();
        let mut grid = GridIndex::new(64.0);
        grid.rebuild(&positions);
        let mut tree = Quadtree::build(&[]);
        tree.rebuild(&positions);

        let region = Rect::from_min_max(Pos2::new(-50.0, -80.0), Pos2::new(120.0, 40.0));
        let expected: Vec<usize> = (0..positions.len())
            .filter(|&i| region.contains(positions[i]))
            .collect();

        assert!(!expected.is_empty());
        assert_eq!(query(&grid, region), expected);
        assert_eq!(query(&tree, region), expected);
    }

    #[test]
    fn huge_region_scans_sparse_cells() {
        let mut grid = GridIndex::new(10.0);
        grid.insert(7, Pos2::new(1.0, 1.0));
        grid.insert(8, Pos2::new(1e6, 1e6));
        let region = Rect::from_min_max(Pos2::new(-1e7, -1e7), Pos2::new(1e7, 1e7));
        assert_eq!(query(&grid, region), vec![7, 8]);
    }
}
