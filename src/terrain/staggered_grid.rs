/// Staggered sampling of the base terrain
///
/// Nodes carry the terrain heights, cell centres carry the half heights and the
/// gradients, and the x/z faces between two nodes carry the face samples the
/// gradients are differenced from. Everything is computed once at init.
use glam::Vec2;

use super::height_field::{bilinear, TerrainHeightField};

#[derive(Debug, Clone)]
pub struct StaggeredGrid {
    lines: usize,
    cols: usize,
    dx: f32,
    dz: f32,
    heights: Vec<f32>,
    /// `(lines-1) x (cols-1)` cell-centre averages of the 4 corners
    half_heights: Vec<f32>,
    /// `lines x (cols-1)` samples on the faces between two columns
    half_heights_cols: Vec<f32>,
    /// `(lines-1) x cols` samples on the faces between two lines
    half_heights_lines: Vec<f32>,
    /// `(lines-1) x (cols-1)` cell-centre gradients
    gradients: Vec<Vec2>,
    /// `lines x cols` 5-point Laplacian, 0 on the border
    laplacians: Vec<f32>,
}

impl StaggeredGrid {
    pub fn new(terrain: &TerrainHeightField) -> Self {
        let (lines, cols) = terrain.dims();
        let d = terrain.deltas();
        let mut grid = Self {
            lines,
            cols,
            dx: d.x,
            dz: d.y,
            heights: terrain.heights().to_vec(),
            half_heights: vec![0.0; (lines - 1) * (cols - 1)],
            half_heights_cols: vec![0.0; lines * (cols - 1)],
            half_heights_lines: vec![0.0; (lines - 1) * cols],
            gradients: vec![Vec2::ZERO; (lines - 1) * (cols - 1)],
            laplacians: vec![0.0; lines * cols],
        };

        grid.init_half_heights();
        grid.init_gradients();
        grid.init_laplacians();

        log::debug!("Staggered grid initialised over {}x{} nodes", lines, cols);
        grid
    }

    #[inline]
    fn h(&self, line: usize, col: usize) -> f32 {
        self.heights[col + line * self.cols]
    }

    #[inline]
    fn centre(&self, line: usize, col: usize) -> f32 {
        self.half_heights[col + line * (self.cols - 1)]
    }

    fn init_half_heights(&mut self) {
        let (lines, cols) = (self.lines, self.cols);

        for j in 0..lines - 1 {
            for i in 0..cols - 1 {
                self.half_heights[i + j * (cols - 1)] =
                    (self.h(j, i) + self.h(j + 1, i) + self.h(j, i + 1) + self.h(j + 1, i + 1)) * 0.25;
            }
        }

        for j in 0..lines {
            for i in 0..cols - 1 {
                let left = self.h(j, i);
                let right = self.h(j, i + 1);
                // Border faces have a single adjoining cell; fall back to the node average
                self.half_heights_cols[i + j * (cols - 1)] = if j == 0 || j == lines - 1 {
                    (left + right) * 0.5
                } else {
                    (left + right + self.centre(j, i) + self.centre(j - 1, i)) * 0.25
                };
            }
        }

        for j in 0..lines - 1 {
            for i in 0..cols {
                let down = self.h(j, i);
                let up = self.h(j + 1, i);
                self.half_heights_lines[i + j * cols] = if i == 0 || i == cols - 1 {
                    (down + up) * 0.5
                } else {
                    (down + up + self.centre(j, i) + self.centre(j, i - 1)) * 0.25
                };
            }
        }
    }

    fn init_gradients(&mut self) {
        let cols = self.cols;
        for j in 0..self.lines - 1 {
            for i in 0..cols - 1 {
                let gx = (self.half_heights_lines[i + 1 + j * cols] - self.half_heights_lines[i + j * cols])
                    / self.dx;
                let gz = (self.half_heights_cols[i + (j + 1) * (cols - 1)]
                    - self.half_heights_cols[i + j * (cols - 1)])
                    / self.dz;
                self.gradients[i + j * (cols - 1)] = Vec2::new(gx, gz);
            }
        }
    }

    fn init_laplacians(&mut self) {
        let (dx2, dz2) = (self.dx * self.dx, self.dz * self.dz);
        for j in 1..self.lines.saturating_sub(1) {
            for i in 1..self.cols.saturating_sub(1) {
                let c = self.h(j, i);
                let lx = (self.h(j, i + 1) - 2.0 * c + self.h(j, i - 1)) / dx2;
                let lz = (self.h(j + 1, i) - 2.0 * c + self.h(j - 1, i)) / dz2;
                self.laplacians[i + j * self.cols] = lx + lz;
            }
        }
    }

    /// (lines, cols) of the node lattice
    pub fn dims(&self) -> (usize, usize) {
        (self.lines, self.cols)
    }

    pub fn half_heights(&self) -> &[f32] {
        &self.half_heights
    }

    pub fn half_heights_cols(&self) -> &[f32] {
        &self.half_heights_cols
    }

    pub fn half_heights_lines(&self) -> &[f32] {
        &self.half_heights_lines
    }

    pub fn gradients(&self) -> &[Vec2] {
        &self.gradients
    }

    pub fn laplacians(&self) -> &[f32] {
        &self.laplacians
    }

    /// Terrain gradient (d/dx, d/dz) interpolated from the cell centres
    pub fn gradient_at(&self, x: f32, z: f32) -> Vec2 {
        let g = bilinear(
            &self.gradients,
            self.lines - 1,
            self.cols - 1,
            x / self.dx - 0.5,
            z / self.dz - 0.5,
        );
        if g.is_finite() {
            g
        } else {
            Vec2::ZERO
        }
    }

    /// Terrain height interpolated from the nodes
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        bilinear(&self.heights, self.lines, self.cols, x / self.dx, z / self.dz)
    }

    /// Terrain Laplacian interpolated from the nodes
    pub fn laplacian_at(&self, x: f32, z: f32) -> f32 {
        bilinear(&self.laplacians, self.lines, self.cols, x / self.dx, z / self.dz)
    }
}
