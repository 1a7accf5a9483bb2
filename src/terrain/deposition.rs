//! Lava deposition onto the terrain
//!
//! Every tick the particles scatter their column height and temperature into
//! the terrain node they sit over. `finalize` turns the accumulated sums into
//! the rendered terrain: touched nodes rise by `spike * mean height`, untouched
//! nodes relax back toward the base terrain.

use glam::{Vec2, Vec3};

use super::height_field::TerrainHeightField;
use crate::config::Smoothing;
use crate::constants::terrain::GAUSSIAN_5X5;

const BOX_3X3: [[f32; 3]; 3] = [[1.0; 3]; 3];

#[derive(Debug, Clone)]
pub struct TerrainDeposition {
    lines: usize,
    cols: usize,
    dx: f32,
    dz: f32,
    size: Vec2,
    ambient_temperature: f32,

    counts: Vec<u32>,
    height_sums: Vec<f32>,
    temperature_sums: Vec<f32>,

    initial_heights: Vec<f32>,
    heights: Vec<f32>,
    temperatures: Vec<f32>,
    /// Deposit per node before it is added to the base terrain
    deposit: Vec<f32>,
}

impl TerrainDeposition {
    pub fn new(terrain: &TerrainHeightField, ambient_temperature: f32) -> Self {
        let (lines, cols) = terrain.dims();
        let d = terrain.deltas();
        let n = lines * cols;
        Self {
            lines,
            cols,
            dx: d.x,
            dz: d.y,
            size: terrain.size(),
            ambient_temperature,
            counts: vec![0; n],
            height_sums: vec![0.0; n],
            temperature_sums: vec![0.0; n],
            initial_heights: terrain.heights().to_vec(),
            heights: terrain.heights().to_vec(),
            temperatures: vec![ambient_temperature; n],
            deposit: vec![0.0; n],
        }
    }

    /// Zero the per-node accumulators
    pub fn reset(&mut self) {
        self.counts.fill(0);
        self.height_sums.fill(0.0);
        self.temperature_sums.fill(0.0);
    }

    /// Accumulate one particle into the node under `position`
    ///
    /// The far border belongs to the last node, so particles clamped onto it
    /// still deposit. Returns false when the position is outside the terrain or
    /// the values are not finite; nothing is recorded then.
    pub fn deposit(&mut self, position: Vec3, height: f32, temperature: f32) -> bool {
        if !(height.is_finite() && temperature.is_finite()) {
            return false;
        }
        if !(position.x >= 0.0 && position.z >= 0.0 && position.x <= self.size.x && position.z <= self.size.y) {
            return false;
        }

        let col = ((position.x / self.dx) as usize).min(self.cols - 1);
        let line = ((position.z / self.dz) as usize).min(self.lines - 1);
        let k = col + line * self.cols;
        self.counts[k] += 1;
        self.height_sums[k] += height;
        self.temperature_sums[k] += temperature;
        true
    }

    /// Sum of every height deposited since the last reset
    pub fn total_deposited_height(&self) -> f64 {
        self.height_sums.iter().map(|&h| h as f64).sum()
    }

    /// Nodes that received at least one particle since the last reset
    pub fn touched_count(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Convert the accumulated sums into rendered heights and temperatures
    pub fn finalize(&mut self, spike: f32, recovery: f32, smoothing: Smoothing) {
        for k in 0..self.deposit.len() {
            self.deposit[k] = match self.counts[k] {
                0 => 0.0,
                n => spike * self.height_sums[k] / n as f32,
            };
        }

        match smoothing {
            Smoothing::None => {}
            Smoothing::Box => self.deposit = blur(&self.deposit, self.lines, self.cols, &BOX_3X3),
            Smoothing::Gaussian => self.deposit = blur(&self.deposit, self.lines, self.cols, &GAUSSIAN_5X5),
        }

        let recovery = recovery.clamp(0.0, 1.0);
        for k in 0..self.heights.len() {
            let initial = self.initial_heights[k];
            self.heights[k] = if self.counts[k] > 0 {
                initial + self.deposit[k]
            } else {
                // Blur may spill deposit onto untouched nodes
                let relaxed = (self.heights[k] - initial) * recovery;
                initial + relaxed.max(self.deposit[k])
            };

            self.temperatures[k] = match self.counts[k] {
                0 => self.ambient_temperature,
                n => self.temperature_sums[k] / n as f32,
            };
        }
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn initial_heights(&self) -> &[f32] {
        &self.initial_heights
    }

    pub fn temperatures(&self) -> &[f32] {
        &self.temperatures
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

/// Single-pass convolution with weights renormalised where the kernel leaves the grid
pub fn blur<const N: usize>(values: &[f32], lines: usize, cols: usize, kernel: &[[f32; N]; N]) -> Vec<f32> {
    let half = (N / 2) as isize;
    let mut out = vec![0.0; values.len()];

    for j in 0..lines as isize {
        for i in 0..cols as isize {
            let mut sum = 0.0;
            let mut weight = 0.0;
            for (kj, row) in kernel.iter().enumerate() {
                let y = j + kj as isize - half;
                if y < 0 || y >= lines as isize {
                    continue;
                }
                for (ki, &w) in row.iter().enumerate() {
                    let x = i + ki as isize - half;
                    if x < 0 || x >= cols as isize {
                        continue;
                    }
                    sum += w * values[x as usize + y as usize * cols];
                    weight += w;
                }
            }
            out[i as usize + j as usize * cols] = if weight > 0.0 { sum / weight } else { 0.0 };
        }
    }

    out
}
