use std::ops::{Add, Mul};
use std::path::Path;

use glam::Vec2;
use image::{ImageBuffer, Luma};

use crate::error::{invalid_config, SimResult, SimulationError};

/// Immutable base terrain, `heights[j * cols + i]` at world `(i * dx, z = j * dz)`
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainHeightField {
    lines: usize,
    cols: usize,
    size: Vec2,
    dx: f32,
    dz: f32,
    heights: Vec<f32>,
}

impl TerrainHeightField {
    /// Build from row-major heights covering `[0, size.x) x [0, size.y)`
    pub fn from_heights(lines: usize, cols: usize, heights: Vec<f32>, size: Vec2) -> SimResult<Self> {
        if lines < 2 || cols < 2 {
            return Err(SimulationError::EmptyTerrain { lines, cols });
        }
        if heights.len() != lines * cols {
            return Err(SimulationError::DimensionMismatch {
                expected: lines * cols,
                actual: heights.len(),
            });
        }
        if !(size.x.is_finite() && size.y.is_finite() && size.x > 0.0 && size.y > 0.0) {
            return Err(invalid_config("domain_size", format!("must be positive, got {}", size)));
        }
        if let Some(bad) = heights.iter().position(|h| !h.is_finite()) {
            return Err(invalid_config("heights", format!("node {} is not finite", bad)));
        }

        Ok(Self {
            lines,
            cols,
            size,
            dx: size.x / cols as f32,
            dz: size.y / lines as f32,
            heights,
        })
    }

    /// Build from a closure evaluated at every node's world (x, z)
    pub fn from_fn(
        lines: usize,
        cols: usize,
        size: Vec2,
        f: impl Fn(f32, f32) -> f32,
    ) -> SimResult<Self> {
        if lines < 2 || cols < 2 {
            return Err(SimulationError::EmptyTerrain { lines, cols });
        }
        let dx = size.x / cols as f32;
        let dz = size.y / lines as f32;
        let heights = (0..lines)
            .flat_map(|j| (0..cols).map(move |i| (i, j)))
            .map(|(i, j)| f(i as f32 * dx, j as f32 * dz))
            .collect();
        Self::from_heights(lines, cols, heights, size)
    }

    pub fn flat(lines: usize, cols: usize, size: Vec2, height: f32) -> SimResult<Self> {
        Self::from_fn(lines, cols, size, |_, _| height)
    }

    /// Plane `base + slope.x * x + slope.y * z`
    pub fn slope(lines: usize, cols: usize, size: Vec2, base: f32, slope: Vec2) -> SimResult<Self> {
        Self::from_fn(lines, cols, size, |x, z| base + slope.x * x + slope.y * z)
    }

    /// Volcano cone centred in the domain, flat ground beyond `radius`
    pub fn cone(lines: usize, cols: usize, size: Vec2, peak: f32, radius: f32) -> SimResult<Self> {
        let center = size * 0.5;
        let radius = radius.max(f32::EPSILON);
        Self::from_fn(lines, cols, size, |x, z| {
            let d = Vec2::new(x, z).distance(center);
            peak * (1.0 - d / radius).max(0.0)
        })
    }

    /// Load a grayscale heightmap; luminance in [0, 1] is multiplied by `scale`
    ///
    /// Image rows map to terrain lines (z), image columns to terrain cols (x).
    pub fn from_image(path: impl AsRef<Path>, size: Vec2, scale: f32) -> SimResult<Self> {
        let path = path.as_ref();
        let luma = image::open(path)?.to_luma16();
        let (width, height) = luma.dimensions();

        log::info!(
            "Loaded heightmap {} ({}x{}, scale {})",
            path.display(),
            width,
            height,
            scale
        );

        let heights = luma
            .pixels()
            .map(|p| p.0[0] as f32 / u16::MAX as f32 * scale)
            .collect();
        Self::from_heights(height as usize, width as usize, heights, size)
    }

    /// Write heights as a 16-bit grayscale PNG, normalised to their own range
    pub fn write_png(path: impl AsRef<Path>, lines: usize, cols: usize, heights: &[f32]) -> SimResult<()> {
        if heights.len() != lines * cols {
            return Err(SimulationError::DimensionMismatch {
                expected: lines * cols,
                actual: heights.len(),
            });
        }

        let (min, max) = heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)));
        let range = (max - min).max(f32::EPSILON);

        let image: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(cols as u32, lines as u32, |x, y| {
                let h = heights[x as usize + y as usize * cols];
                Luma([(((h - min) / range).clamp(0.0, 1.0) * u16::MAX as f32).round() as u16])
            });
        image.save(path)?;
        Ok(())
    }

    #[inline]
    pub fn lines(&self) -> usize {
        self.lines
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// (lines, cols)
    pub fn dims(&self) -> (usize, usize) {
        (self.lines, self.cols)
    }

    /// Node spacing along x and z
    pub fn deltas(&self) -> Vec2 {
        Vec2::new(self.dx, self.dz)
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    #[inline]
    pub fn node(&self, line: usize, col: usize) -> f32 {
        self.heights[col + line * self.cols]
    }

    /// Whether (x, z) lies in `[0, size.x) x [0, size.y)`
    pub fn contains(&self, x: f32, z: f32) -> bool {
        x >= 0.0 && z >= 0.0 && x < self.size.x && z < self.size.y
    }

    /// Node (line, col) owning world (x, z), `None` outside the terrain
    pub fn node_of(&self, x: f32, z: f32) -> Option<(usize, usize)> {
        let col = (x / self.dx).floor();
        let line = (z / self.dz).floor();
        if col >= 0.0 && line >= 0.0 && (col as usize) < self.cols && (line as usize) < self.lines {
            Some((line as usize, col as usize))
        } else {
            None
        }
    }

    /// Bilinear height at world (x, z), clamped to the node range
    pub fn sample(&self, x: f32, z: f32) -> f32 {
        bilinear(&self.heights, self.lines, self.cols, x / self.dx, z / self.dz)
    }

    pub fn min_height(&self) -> f32 {
        self.heights.iter().copied().fold(f32::MAX, f32::min)
    }

    pub fn max_height(&self) -> f32 {
        self.heights.iter().copied().fold(f32::MIN, f32::max)
    }
}

/// Split a fractional index into the two bracketing indices and a weight
#[inline]
fn split(coord: f32, nodes: usize) -> (usize, usize, f32) {
    let last = nodes.saturating_sub(1);
    let c = if coord.is_finite() { coord.clamp(0.0, last as f32) } else { 0.0 };
    let lo = (c.floor() as usize).min(last);
    (lo, (lo + 1).min(last), c - lo as f32)
}

/// Bilinear interpolation of a row-major `lines x cols` array at fractional
/// indices `(u, v)` = (column, line), clamped to the array
pub(crate) fn bilinear<T>(values: &[T], lines: usize, cols: usize, u: f32, v: f32) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    let (i0, i1, tx) = split(u, cols);
    let (j0, j1, tz) = split(v, lines);

    let near = values[i0 + j0 * cols] * (1.0 - tx) + values[i1 + j0 * cols] * tx;
    let far = values[i0 + j1 * cols] * (1.0 - tx) + values[i1 + j1 * cols] * tx;
    near * (1.0 - tz) + far * tz
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size() -> Vec2 {
        Vec2::new(40.0, 20.0)
    }

    #[test]
    fn test_rejects_degenerate_dimensions() {
        assert!(matches!(
            TerrainHeightField::flat(1, 10, size(), 0.0),
            Err(SimulationError::EmptyTerrain { lines: 1, cols: 10 })
        ));
        assert!(matches!(
            TerrainHeightField::from_heights(2, 2, vec![0.0; 3], size()),
            Err(SimulationError::DimensionMismatch { expected: 4, actual: 3 })
        ));
        assert!(TerrainHeightField::from_heights(2, 2, vec![0.0, f32::NAN, 0.0, 0.0], size()).is_err());
    }

    #[test]
    fn test_sample_reproduces_nodes() {
        let terrain = TerrainHeightField::from_fn(5, 8, size(), |x, z| (x * 0.3).sin() + z * 0.1).unwrap();
        let d = terrain.deltas();
        assert_eq!(d, Vec2::new(5.0, 4.0));
        for j in 0..terrain.lines() {
            for i in 0..terrain.cols() {
                let h = terrain.sample(i as f32 * d.x, j as f32 * d.y);
                assert!((h - terrain.node(j, i)).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_sample_is_exact_on_plane() {
        let terrain = TerrainHeightField::slope(16, 16, size(), 3.0, Vec2::new(0.5, -0.25)).unwrap();
        for (x, z) in [(1.3, 2.7), (20.0, 9.9), (33.3, 0.1)] {
            let expected = 3.0 + 0.5 * x - 0.25 * z;
            assert!((terrain.sample(x, z) - expected).abs() < 1e-4);
        }
        // Clamped outside the domain
        assert!((terrain.sample(-10.0, 0.0) - 3.0).abs() < 1e-5);
        assert!(terrain.sample(f32::NAN, 0.0).is_finite());
    }

    #[test]
    fn test_node_of_and_contains() {
        let terrain = TerrainHeightField::flat(4, 8, size(), 1.0).unwrap();
        assert_eq!(terrain.node_of(0.0, 0.0), Some((0, 0)));
        assert_eq!(terrain.node_of(39.9, 19.9), Some((3, 7)));
        assert_eq!(terrain.node_of(40.0, 1.0), None);
        assert!(terrain.contains(0.0, 19.99));
        assert!(!terrain.contains(-0.01, 1.0));
    }

    #[test]
    fn test_cone_peaks_in_the_middle() {
        let terrain = TerrainHeightField::cone(21, 21, Vec2::new(21.0, 21.0), 10.0, 8.0).unwrap();
        assert!(terrain.max_height() <= 10.0);
        assert_eq!(terrain.min_height(), 0.0);
        assert!(terrain.sample(10.5, 10.5) > terrain.sample(15.0, 10.5));
    }

    #[test]
    fn test_png_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("terrain.png");
        let heights: Vec<f32> = (0..12).map(|v| v as f32).collect();
        TerrainHeightField::write_png(&path, 3, 4, &heights).expect("write png");

        let terrain = TerrainHeightField::from_image(&path, Vec2::new(4.0, 3.0), 11.0).expect("load png");
        assert_eq!(terrain.dims(), (3, 4));
        for (loaded, expected) in terrain.heights().iter().zip(&heights) {
            assert!((loaded - expected).abs() < 1e-3, "{} vs {}", loaded, expected);
        }
    }
}
