use glam::Vec3;

/// Cell index stored for particles outside the neighbour grid
pub const NO_CELL: i32 = -1;

/// Initial state of a spawned particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleInit {
    pub position: Vec3,
    pub mass: f32,
    pub density: f32,
    pub height: f32,
    pub temperature: f32,
}

/// Particle data stored in Structure of Arrays (SOA) layout
///
/// Every buffer is allocated at full capacity up front. The live particles are
/// the prefix `[0, count)`.
pub struct ParticleStore {
    /// Current number of live particles
    count: usize,

    /// Maximum number of particles
    capacity: usize,

    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,

    /// Lava column height above the terrain
    pub heights: Vec<f32>,
    pub height_gradients: Vec<Vec3>,

    pub densities: Vec<f32>,
    pub masses: Vec<f32>,
    pub volumes: Vec<f32>,
    pub temperatures: Vec<f32>,

    /// Last neighbour-grid bucket, `NO_CELL` when outside the grid
    pub cell_indices: Vec<i32>,

    /// Clamped at the domain border; skipped by neighbour search and the field passes
    pub frozen: Vec<bool>,
}

impl ParticleStore {
    /// Create a new particle store with pre-allocated capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            count: 0,
            capacity,
            positions: vec![Vec3::ZERO; capacity],
            velocities: vec![Vec3::ZERO; capacity],
            heights: vec![0.0; capacity],
            height_gradients: vec![Vec3::ZERO; capacity],
            densities: vec![0.0; capacity],
            masses: vec![0.0; capacity],
            volumes: vec![0.0; capacity],
            temperatures: vec![0.0; capacity],
            cell_indices: vec![NO_CELL; capacity],
            frozen: vec![false; capacity],
        }
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn can_spawn(&self) -> bool {
        self.count < self.capacity
    }

    /// Append a particle at `live_count`, `None` when the store is full
    pub fn spawn(&mut self, init: ParticleInit) -> Option<usize> {
        if !self.can_spawn() {
            return None;
        }

        let i = self.count;
        self.positions[i] = init.position;
        self.velocities[i] = Vec3::ZERO;
        self.heights[i] = init.height;
        self.height_gradients[i] = Vec3::ZERO;
        self.densities[i] = init.density;
        self.masses[i] = init.mass;
        self.volumes[i] = if init.density > 0.0 {
            init.mass / init.density
        } else {
            0.0
        };
        self.temperatures[i] = init.temperature;
        self.cell_indices[i] = NO_CELL;
        self.frozen[i] = false;
        self.count += 1;

        Some(i)
    }

    /// Remove particle at index by swapping with last
    ///
    /// Returns the old index of the particle that now occupies `index`, if any.
    pub fn remove_swap(&mut self, index: usize) -> Option<usize> {
        if index >= self.count {
            return None;
        }

        let last = self.count - 1;
        if index != last {
            self.positions.swap(index, last);
            self.velocities.swap(index, last);
            self.heights.swap(index, last);
            self.height_gradients.swap(index, last);
            self.densities.swap(index, last);
            self.masses.swap(index, last);
            self.volumes.swap(index, last);
            self.temperatures.swap(index, last);
            self.cell_indices.swap(index, last);
            self.frozen.swap(index, last);
        }
        self.cell_indices[last] = NO_CELL;
        self.count -= 1;

        (index != last).then_some(last)
    }

    /// Clear all particle data
    pub fn clear(&mut self) {
        self.count = 0;
        self.cell_indices.fill(NO_CELL);
        self.frozen.fill(false);
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions[..self.count]
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities[..self.count]
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights[..self.count]
    }

    pub fn temperatures(&self) -> &[f32] {
        &self.temperatures[..self.count]
    }

    /// Particles clamped at the border so far
    pub fn frozen_count(&self) -> usize {
        self.frozen[..self.count].iter().filter(|&&f| f).count()
    }

    /// Gather one particle into a record
    pub fn particle(&self, index: usize) -> Option<Particle> {
        if index >= self.count {
            return None;
        }
        Some(Particle {
            velocity: self.velocities[index],
            position: self.positions[index],
            height: self.heights[index],
            height_gradient: self.height_gradients[index],
            density: self.densities[index],
            mass: self.masses[index],
            volume: self.volumes[index],
            cell: self.cell_indices[index],
            id: index as i32,
            temperature: self.temperatures[index],
        })
    }

    /// Records for a compute-buffer upload, one per live particle
    pub fn as_gpu_records(&self) -> Vec<Particle> {
        (0..self.count).filter_map(|i| self.particle(i)).collect()
    }

    /// Sum of the live particles' heights
    pub fn total_height(&self) -> f64 {
        self.heights().iter().map(|&h| h as f64).sum()
    }
}

/// One particle as a POD record, laid out like the compute-side struct
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Particle {
    pub velocity: Vec3,
    pub position: Vec3,
    pub height: f32,
    pub height_gradient: Vec3,
    pub density: f32,
    pub mass: f32,
    pub volume: f32,
    pub cell: i32,
    pub id: i32,
    pub temperature: f32,
}

/// Render data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleRenderData {
    pub position: [f32; 3],
    pub height: f32,
    pub temperature: f32,
    pub _padding: [f32; 3],
}

/// Convert particle data to render format
pub fn prepare_render_data(particles: &ParticleStore, gpu_buffer: &mut Vec<ParticleRenderData>) {
    gpu_buffer.clear();
    gpu_buffer.reserve(particles.live_count());

    for i in 0..particles.live_count() {
        gpu_buffer.push(ParticleRenderData {
            position: particles.positions[i].to_array(),
            height: particles.heights[i],
            temperature: particles.temperatures[i],
            _padding: [0.0; 3],
        });
    }
}
