/// Pre-allocated uniform bucket grid for SPH neighbour search
/// Cells are 2H wide so every true neighbour lies in the surrounding 3x3 ring.
use glam::{Vec2, Vec3};

use crate::constants::kernel::CELL_SIZE_FACTOR;

/// Cell coordinate in the neighbour grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellCoord {
    pub col: u32,
    pub line: u32,
}

/// Bucket grid over the terrain domain, rebuilt every tick
#[derive(Debug, Clone)]
pub struct NeighborGrid {
    cell_size: f32,
    nb_cols: usize,
    nb_lines: usize,
    max_per_cell: usize,
    /// `nb_cols * nb_lines * max_per_cell` particle ids
    cells: Vec<u32>,
    /// Ids stored per cell
    counters: Vec<u32>,
    /// Inserts dropped because a bucket was full since the last reset
    overflow: usize,
}

impl NeighborGrid {
    /// Create a grid covering `[0, size.x) x [0, size.y)` for kernel radius `h`
    pub fn new(domain_size: Vec2, kernel_radius: f32, max_per_cell: usize) -> Self {
        let cell_size = kernel_radius * CELL_SIZE_FACTOR;
        let nb_cols = ((domain_size.x / cell_size).ceil() as usize).max(1);
        let nb_lines = ((domain_size.y / cell_size).ceil() as usize).max(1);
        let max_per_cell = max_per_cell.max(1);
        let cell_count = nb_cols * nb_lines;

        log::debug!(
            "Neighbour grid {}x{} cells of {:.2}, {} ids per cell",
            nb_cols,
            nb_lines,
            cell_size,
            max_per_cell
        );

        Self {
            cell_size,
            nb_cols,
            nb_lines,
            max_per_cell,
            cells: vec![0; cell_count * max_per_cell],
            counters: vec![0; cell_count],
            overflow: 0,
        }
    }

    /// Zero all per-cell counters
    pub fn reset(&mut self) {
        self.counters.fill(0);
        self.overflow = 0;
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.nb_lines, self.nb_cols)
    }

    pub fn cell_count(&self) -> usize {
        self.counters.len()
    }

    pub fn max_per_cell(&self) -> usize {
        self.max_per_cell
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow
    }

    /// Per-cell occupancy
    pub fn counts(&self) -> &[u32] {
        &self.counters
    }

    /// Convert a world position to its cell, `None` outside the grid
    pub fn cell_of(&self, position: Vec3) -> Option<CellCoord> {
        let col = (position.x / self.cell_size).floor();
        let line = (position.z / self.cell_size).floor();

        if col >= 0.0 && line >= 0.0 && (col as usize) < self.nb_cols && (line as usize) < self.nb_lines {
            Some(CellCoord {
                col: col as u32,
                line: line as u32,
            })
        } else {
            None
        }
    }

    /// Flat index of a cell
    pub fn cell_index(&self, cell: CellCoord) -> usize {
        cell.col as usize + cell.line as usize * self.nb_cols
    }

    /// Inverse of [`cell_index`](Self::cell_index)
    pub fn coord_of_index(&self, index: usize) -> CellCoord {
        CellCoord {
            col: (index % self.nb_cols) as u32,
            line: (index / self.nb_cols) as u32,
        }
    }

    /// Ids currently stored in one cell
    pub fn cell(&self, index: usize) -> &[u32] {
        let start = index * self.max_per_cell;
        &self.cells[start..start + self.counters[index] as usize]
    }

    /// Add a particle to the bucket containing `position`
    ///
    /// Returns the flat cell index, or `None` when the position is outside the
    /// grid. A full bucket silently drops the id but still reports the cell.
    pub fn insert(&mut self, id: u32, position: Vec3) -> Option<usize> {
        let index = self.cell_index(self.cell_of(position)?);
        let count = self.counters[index] as usize;

        if count < self.max_per_cell {
            self.cells[index * self.max_per_cell + count] = id;
            self.counters[index] += 1;
        } else {
            self.overflow += 1;
        }

        Some(index)
    }

    /// Remove an id from a cell, keeping the bucket contiguous
    pub fn remove(&mut self, id: u32, cell: usize) -> bool {
        if cell >= self.counters.len() {
            return false;
        }
        let start = cell * self.max_per_cell;
        let count = self.counters[cell] as usize;

        if let Some(pos) = self.cells[start..start + count].iter().position(|&e| e == id) {
            // Swap with last element for O(1) removal
            self.cells[start + pos] = self.cells[start + count - 1];
            self.counters[cell] -= 1;
            true
        } else {
            false
        }
    }

    /// Rename an id inside a cell after the particle store moved it
    pub fn relabel(&mut self, old_id: u32, new_id: u32, cell: usize) -> bool {
        if cell >= self.counters.len() {
            return false;
        }
        let start = cell * self.max_per_cell;
        let count = self.counters[cell] as usize;

        match self.cells[start..start + count].iter_mut().find(|e| **e == old_id) {
            Some(slot) => {
                *slot = new_id;
                true
            }
            None => false,
        }
    }

    /// Collect the ids of a cell and its 8 neighbours into `out`
    ///
    /// `out` is cleared first and never grows beyond `limit` ids.
    pub fn query_candidates(&self, cell: usize, out: &mut Vec<u32>, limit: usize) {
        out.clear();
        let center = self.coord_of_index(cell);
        let col_min = center.col.saturating_sub(1) as usize;
        let line_min = center.line.saturating_sub(1) as usize;
        let col_max = (center.col as usize + 1).min(self.nb_cols - 1);
        let line_max = (center.line as usize + 1).min(self.nb_lines - 1);

        for line in line_min..=line_max {
            for col in col_min..=col_max {
                let ids = self.cell(col + line * self.nb_cols);
                let room = limit.saturating_sub(out.len());
                if room == 0 {
                    return;
                }
                out.extend_from_slice(&ids[..ids.len().min(room)]);
            }
        }
    }

    /// Get statistics about the grid occupancy
    pub fn get_stats(&self) -> NeighborGridStats {
        let mut non_empty_cells = 0;
        let mut max_per_cell = 0;
        let mut total = 0;
        for &count in &self.counters {
            if count > 0 {
                non_empty_cells += 1;
                max_per_cell = max_per_cell.max(count as usize);
                total += count as usize;
            }
        }

        NeighborGridStats {
            total_cells: self.counters.len(),
            non_empty_cells,
            total_entries: total,
            max_entries_per_cell: max_per_cell,
            overflowed_inserts: self.overflow,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct NeighborGridStats {
    pub total_cells: usize,
    pub non_empty_cells: usize,
    pub total_entries: usize,
    pub max_entries_per_cell: usize,
    pub overflowed_inserts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn grid(max_per_cell: usize) -> NeighborGrid {
        NeighborGrid::new(Vec2::new(40.0, 40.0), 2.0, max_per_cell)
    }

    #[test]
    fn test_dimensions_cover_domain() {
        let g = NeighborGrid::new(Vec2::new(41.0, 10.0), 2.0, 8);
        assert_eq!(g.cell_size(), 4.0);
        assert_eq!(g.dimensions(), (3, 11));
        assert!(g.cell_of(Vec3::new(40.9, 0.0, 9.9)).is_some());
        assert!(g.cell_of(Vec3::new(-0.1, 0.0, 1.0)).is_none());
        assert!(g.cell_of(Vec3::new(44.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_insert_and_query_ring() {
        let mut g = grid(16);
        let a = g.insert(0, Vec3::new(5.0, 0.0, 5.0)).expect("inside");
        let b = g.insert(1, Vec3::new(8.5, 0.0, 5.0)).expect("inside");
        g.insert(2, Vec3::new(30.0, 0.0, 30.0)).expect("inside");
        assert_ne!(a, b);

        let mut out = Vec::new();
        g.query_candidates(a, &mut out, 64);
        assert!(out.contains(&0));
        assert!(out.contains(&1));
        assert!(!out.contains(&2));

        g.reset();
        g.query_candidates(a, &mut out, 64);
        assert!(out.is_empty());
    }

    #[test]
    fn test_corner_cells_clip_ring() {
        let mut g = grid(4);
        let corner = g.insert(7, Vec3::new(0.0, 0.0, 0.0)).expect("inside");
        let far = g.insert(8, Vec3::new(39.9, 0.0, 39.9)).expect("inside");
        let mut out = Vec::new();
        g.query_candidates(corner, &mut out, 16);
        assert_eq!(out, vec![7]);
        g.query_candidates(far, &mut out, 16);
        assert_eq!(out, vec![8]);
    }

    #[test]
    fn test_bucket_overflow_truncates() {
        let mut g = grid(3);
        for id in 0..5 {
            assert!(g.insert(id, Vec3::new(1.0, 0.0, 1.0)).is_some());
        }
        let index = g.cell_index(g.cell_of(Vec3::new(1.0, 0.0, 1.0)).unwrap());
        assert_eq!(g.cell(index), &[0, 1, 2]);
        assert_eq!(g.overflow_count(), 2);
        assert_eq!(g.get_stats().overflowed_inserts, 2);
    }

    #[test]
    fn test_query_respects_limit() {
        let mut g = grid(8);
        for id in 0..8 {
            g.insert(id, Vec3::new(10.0, 0.0, 10.0));
        }
        let cell = g.cell_index(g.cell_of(Vec3::new(10.0, 0.0, 10.0)).unwrap());
        let mut out = Vec::new();
        g.query_candidates(cell, &mut out, 5);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_remove_and_relabel() {
        let mut g = grid(8);
        let cell = g.insert(3, Vec3::new(2.0, 0.0, 2.0)).unwrap();
        g.insert(4, Vec3::new(2.5, 0.0, 2.0));
        g.insert(5, Vec3::new(3.0, 0.0, 2.0));

        assert!(g.remove(3, cell));
        assert!(!g.remove(3, cell));
        assert_eq!(g.cell(cell).len(), 2);

        assert!(g.relabel(5, 3, cell));
        let mut ids = g.cell(cell).to_vec();
        ids.sort_unstable();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_completeness_against_brute_force() {
        let h = 2.0;
        let mut g = NeighborGrid::new(Vec2::new(40.0, 40.0), h, 256);
        let mut rng = StdRng::seed_from_u64(7);
        let points: Vec<Vec3> = (0..300)
            .map(|_| Vec3::new(rng.gen_range(0.0..40.0), 0.0, rng.gen_range(0.0..40.0)))
            .collect();

        let cells: Vec<usize> = points
            .iter()
            .enumerate()
            .map(|(i, p)| g.insert(i as u32, *p).expect("inside"))
            .collect();
        assert_eq!(g.overflow_count(), 0);

        let mut out = Vec::new();
        for (i, p) in points.iter().enumerate() {
            g.query_candidates(cells[i], &mut out, usize::MAX);
            for (j, q) in points.iter().enumerate() {
                let d = Vec2::new(p.x - q.x, p.z - q.z).length();
                if i != j && d < h {
                    assert!(out.contains(&(j as u32)), "{} missing neighbour {}", i, j);
                }
            }
        }
    }
}
