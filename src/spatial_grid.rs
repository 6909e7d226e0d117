// src/spatial_grid.rs

use crate::canvas::{Bounds, Point};

/// Upper bound on cells per axis.
const MAX_CELLS_PER_AXIS: usize = 512;

/// Uniform bucket grid over the canvas mapping positions to the oscillator
/// indices placed there.
///
/// Entries are not removed when an oscillator is released; a stale entry
/// is filtered at read time by checking the slot's state. An index lives
/// in at most one bucket: re-assigning moves it.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    origin: Point,
    cell_size: f32,
    columns: usize,
    rows: usize,
    cells: Vec<Vec<usize>>,
    cell_of: Vec<Option<usize>>,
}

impl SpatialGrid {
    pub fn new(bounds: Bounds, cell_size: f32, capacity: usize) -> Self {
        let mut grid = Self {
            origin: Point::new(bounds.left, bounds.bottom),
            cell_size: 1.0,
            columns: 1,
            rows: 1,
            cells: Vec::new(),
            cell_of: vec![None; capacity],
        };
        grid.initialize(bounds, cell_size);
        grid
    }

    /// Rebuild the grid for new canvas bounds, dropping all entries.
    pub fn initialize(&mut self, bounds: Bounds, cell_size: f32) {
        self.cell_size = if cell_size.is_finite() && cell_size > 0.0 { cell_size } else { 1.0 };
        self.origin = Point::new(bounds.left, bounds.bottom);
        self.columns = Self::cells_for(bounds.width(), self.cell_size);
        self.rows = Self::cells_for(bounds.height(), self.cell_size);

        self.cells.clear();
        self.cells.resize_with(self.columns * self.rows, Vec::new);
        self.cell_of.fill(None);
    }

    fn cells_for(span: f32, cell_size: f32) -> usize {
        let cells = (span / cell_size).ceil();
        if cells.is_finite() && cells >= 1.0 {
            (cells as usize).min(MAX_CELLS_PER_AXIS)
        } else {
            1
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    /// Column/row of a point, clamped onto the grid.
    #[inline]
    fn cell_coords(&self, point: Point) -> (usize, usize) {
        let to_cell = |offset: f32, limit: usize| {
            let cell = (offset / self.cell_size).floor();
            if cell.is_nan() || cell < 0.0 {
                0
            } else {
                (cell as usize).min(limit - 1)
            }
        };

        (
            to_cell(point.x - self.origin.x, self.columns),
            to_cell(point.y - self.origin.y, self.rows),
        )
    }

    #[inline]
    pub fn cell_index(&self, point: Point) -> usize {
        let (column, row) = self.cell_coords(point);
        row * self.columns + column
    }

    /// Place `oscillator` in the bucket at `point`, leaving any previous bucket.
    pub fn assign(&mut self, oscillator: usize, point: Point) {
        if oscillator >= self.cell_of.len() {
            self.cell_of.resize(oscillator + 1, None);
        }

        let cell = self.cell_index(point);
        if let Some(previous) = self.cell_of[oscillator] {
            if previous == cell {
                return;
            }
            let bucket = &mut self.cells[previous];
            if let Some(pos) = bucket.iter().position(|&i| i == oscillator) {
                bucket.swap_remove(pos);
            }
        }

        self.cells[cell].push(oscillator);
        self.cell_of[oscillator] = Some(cell);
    }

    /// Collect the indices in the bucket at `point` and its 8 neighbours.
    pub fn nearby_into(&self, point: Point, out: &mut Vec<usize>) {
        out.clear();
        let (column, row) = self.cell_coords(point);

        for r in row.saturating_sub(1)..=(row + 1).min(self.rows - 1) {
            for c in column.saturating_sub(1)..=(column + 1).min(self.columns - 1) {
                out.extend_from_slice(&self.cells[r * self.columns + c]);
            }
        }
    }

    pub fn bucket(&self, cell: usize) -> &[usize] {
        &self.cells[cell]
    }

    pub fn bucket_of(&self, oscillator: usize) -> Option<usize> {
        self.cell_of.get(oscillator).copied().flatten()
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.cells {
            bucket.clear();
        }
        self.cell_of.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGrid {
        SpatialGrid::new(Bounds::new(-100.0, -50.0, 100.0, 50.0), 10.0, 8)
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(grid().dimensions(), (20, 10));
    }

    #[test]
    fn test_out_of_bounds_points_clamp() {
        let grid = grid();
        assert_eq!(grid.cell_index(Point::new(-1_000.0, -1_000.0)), 0);
        assert_eq!(grid.cell_index(Point::new(1_000.0, 1_000.0)), 20 * 10 - 1);
        assert_eq!(grid.cell_index(Point::new(f32::NAN, 0.0)), 5 * 20);
    }

    #[test]
    fn test_nearby_covers_neighbours_only() {
        let mut grid = grid();
        grid.assign(0, Point::new(0.0, 0.0));
        grid.assign(1, Point::new(9.0, 9.0));
        grid.assign(2, Point::new(80.0, 40.0));

        let mut out = Vec::new();
        grid.nearby_into(Point::new(1.0, 1.0), &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn test_reassign_moves_between_buckets() {
        let mut grid = grid();
        grid.assign(3, Point::new(0.0, 0.0));
        let first = grid.bucket_of(3).unwrap();

        grid.assign(3, Point::new(-90.0, -40.0));
        let second = grid.bucket_of(3).unwrap();

        assert_ne!(first, second);
        assert!(grid.bucket(first).is_empty());
        assert_eq!(grid.bucket(second), &[3]);
    }

    #[test]
    fn test_initialize_drops_entries() {
        let mut grid = grid();
        grid.assign(0, Point::new(0.0, 0.0));
        grid.initialize(Bounds::new(0.0, 0.0, 40.0, 40.0), 20.0);

        assert_eq!(grid.dimensions(), (2, 2));
        assert_eq!(grid.bucket_of(0), None);
    }
}
