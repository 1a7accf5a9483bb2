// Lava solver integration tests
//
// Drive the public `Solver` API end to end: spawning, field passes, integration
// and deposition on procedural terrains.

use glam::{Vec2, Vec3};

use lava_sph::sph::SphKernel;
use lava_sph::{SimulationConfig, Smoothing, Solver, TerrainHeightField};

fn base_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.kernel_radius = 2.0;
    config.rest_density = 2500.0;
    config.max_particles = 256;
    config.worker_threads = 2;
    config
}

fn flat_terrain() -> TerrainHeightField {
    TerrainHeightField::flat(32, 32, Vec2::new(32.0, 32.0), 4.0).expect("flat terrain")
}

/// Every grid entry must point at a live particle that records that cell
fn assert_grid_consistent(solver: &Solver) {
    let context = solver.context();
    let grid = &context.grid;
    let particles = &context.particles;
    let live = particles.live_count();

    let mut entries = 0;
    for cell in 0..grid.cell_count() {
        for &id in grid.cell(cell) {
            let id = id as usize;
            assert!(id < live, "grid holds dead particle {} (live {})", id, live);
            assert_eq!(particles.cell_indices[id], cell as i32, "particle {} in wrong cell", id);
            entries += 1;
        }
    }
    let placed = particles.cell_indices[..live].iter().filter(|&&c| c >= 0).count();
    assert_eq!(entries, placed);
}

#[test]
fn test_lone_particle_rides_terrain_downhill() {
    let mut config = base_config();
    config.mu = 0.0;
    config.spawn_jitter = 0.0;
    let slope = Vec2::new(-0.5, -0.25);
    let terrain = TerrainHeightField::slope(64, 64, Vec2::new(64.0, 64.0), 40.0, slope).unwrap();
    let mut solver = Solver::initialize(terrain.clone(), config.clone()).unwrap();

    solver.tick(Some(Vec3::ZERO));
    let spawned = solver.particle(0).expect("spawned");
    assert_eq!((spawned.position.x, spawned.position.z), (0.0, 0.0));

    solver.tick(None);
    let p = solver.particle(0).unwrap();

    // No neighbours: only the particle's own base height
    let kernel = SphKernel::new(config.kernel_radius);
    let own_height = config.particle_mass * kernel.w_zero() / config.rest_density;
    assert!((p.height - own_height).abs() < 1e-5, "height {}", p.height);
    assert_eq!(p.height_gradient, Vec3::ZERO);

    let expected_velocity = -(config.gravity / config.stiffness) * Vec3::new(slope.x, 0.0, slope.y);
    assert!((p.velocity - expected_velocity).length() < 1e-4, "velocity {:?}", p.velocity);

    let expected = config.dt * expected_velocity;
    assert!((p.position.x - expected.x).abs() < 1e-5);
    assert!((p.position.z - expected.z).abs() < 1e-5);
    assert!((p.position.y - terrain.sample(p.position.x, p.position.z)).abs() < 1e-5);
    assert_eq!(solver.stats().max_neighbours, 0);
}

#[test]
fn test_particle_pair_interaction_range() {
    let mut config = base_config();
    config.spawn_jitter = 0.0;
    let h = config.kernel_radius;
    let a = Vec3::new(10.0, 0.0, 10.0);

    // Half a radius apart: mutual neighbours with opposite gradient contributions
    let mut solver = Solver::initialize(flat_terrain(), config.clone()).unwrap();
    solver.tick(Some(a));
    solver.tick(Some(a + Vec3::new(h / 2.0, 0.0, 0.0)));
    solver.tick(None);

    let context = solver.context();
    assert_eq!(context.neighbours.neighbours(0), &[1]);
    assert_eq!(context.neighbours.neighbours(1), &[0]);
    let (p0, p1) = (solver.particle(0).unwrap(), solver.particle(1).unwrap());
    let kernel = context.params.kernel;
    let contribution_01 = p1.volume * kernel.grad_w(p0.position, p1.position);
    let contribution_10 = p0.volume * kernel.grad_w(p1.position, p0.position);
    assert!(contribution_01.length() > 0.0);
    assert!((contribution_01 + contribution_10).length() < 1e-6);

    // Exactly one radius apart: no interaction at all
    let mut solver = Solver::initialize(flat_terrain(), config).unwrap();
    solver.tick(Some(a));
    solver.tick(Some(a + Vec3::new(h, 0.0, 0.0)));
    solver.tick(None);

    let context = solver.context();
    assert!(context.neighbours.neighbours(0).is_empty());
    assert!(context.neighbours.neighbours(1).is_empty());
    let (p0, p1) = (solver.particle(0).unwrap(), solver.particle(1).unwrap());
    assert_eq!(kernel.w(p0.position, p1.position), 0.0);
    assert_eq!(p0.density, p1.density);
}

#[test]
fn test_runs_are_deterministic_across_thread_counts() {
    let terrain = TerrainHeightField::cone(48, 48, Vec2::new(48.0, 48.0), 12.0, 20.0).unwrap();
    let generator = Vec3::new(22.0, 0.0, 25.0);

    let run = |threads: usize| {
        let mut config = base_config();
        config.worker_threads = threads;
        config.spawn_per_step = 2;
        config.smoothing = Smoothing::Gaussian;
        let mut solver = Solver::initialize(terrain.clone(), config).unwrap();
        for frame in 0..60 {
            solver.step(generator, 0.012 + 0.004 * (frame % 3) as f32);
        }
        (
            solver.positions().to_vec(),
            solver.temperatures().to_vec(),
            solver.terrain_heights().to_vec(),
        )
    };

    let single = run(1);
    let multi = run(4);
    assert!(!single.0.is_empty());
    assert_eq!(single, multi);
    assert_eq!(single, run(1));
}

#[test]
fn test_deposition_conserves_height() {
    let mut config = base_config();
    config.spawn_per_step = 3;
    config.spawn_jitter = 2.0;
    let mut solver = Solver::initialize(flat_terrain(), config).unwrap();

    for _ in 0..40 {
        solver.tick(Some(Vec3::new(16.0, 0.0, 16.0)));

        let context = solver.context();
        let particles = &context.particles;
        let expected: f64 = particles.heights().iter().map(|&h| h as f64).sum();
        let deposited = context.deposition.total_deposited_height();
        assert!(
            (deposited - expected).abs() <= 1e-4 * expected.max(1.0),
            "deposited {} vs particles {}",
            deposited,
            expected
        );
    }

    // Lava only ever raises the terrain
    let context = solver.context();
    for (h, initial) in solver.terrain_heights().iter().zip(context.deposition.initial_heights()) {
        assert!(h >= initial);
    }
    assert!(solver.terrain_heights().iter().all(|h| h.is_finite()));
}

#[test]
fn test_capacity_exhaustion_ignores_spawns() {
    let mut config = base_config();
    config.max_particles = 5;
    config.spawn_per_step = 2;
    let mut solver = Solver::initialize(flat_terrain(), config).unwrap();

    let mut previous = 0;
    let mut ignored = 0;
    for _ in 0..5 {
        let report = solver.tick(Some(Vec3::new(16.0, 0.0, 16.0)));
        ignored += report.spawns_ignored;
        assert!(solver.particle_count() >= previous);
        previous = solver.particle_count();
    }

    assert_eq!(solver.particle_count(), 5);
    assert_eq!(ignored, 5);
    assert_eq!(solver.stats().spawns_ignored, 5);
}

fn steep_terrain() -> TerrainHeightField {
    // Downhill toward -x, fast enough to leave the domain within a few ticks
    TerrainHeightField::slope(32, 32, Vec2::new(32.0, 32.0), 0.0, Vec2::new(20.0, 0.0)).unwrap()
}

#[test]
fn test_out_of_bounds_particles_freeze() {
    let mut config = base_config();
    config.mu = 0.0;
    let mut solver = Solver::initialize(steep_terrain(), config).unwrap();

    let mut frozen = 0;
    for _ in 0..20 {
        frozen += solver.tick(Some(Vec3::new(2.0, 0.0, 16.0))).frozen;
        assert_grid_consistent(&solver);
    }
    assert!(frozen > 0);
    assert_eq!(solver.particle_count(), 20);

    let context = solver.context();
    let particles = &context.particles;
    assert_eq!(particles.frozen_count(), frozen);
    for i in (0..particles.live_count()).filter(|&i| particles.frozen[i]) {
        assert_eq!(particles.cell_indices[i], -1);
        assert_eq!(particles.positions[i].x, 0.0);
        assert_eq!(particles.velocities[i], Vec3::ZERO);
    }
}

#[test]
fn test_frozen_particles_keep_depositing() {
    let mut config = base_config();
    config.mu = 0.0;
    config.spawn_jitter = 0.0;
    let mut solver = Solver::initialize(steep_terrain(), config).unwrap();

    solver.tick(Some(Vec3::new(2.0, 0.0, 16.0)));
    for _ in 0..6 {
        solver.tick(None);
    }

    let context = solver.context();
    let particles = &context.particles;
    assert!(particles.frozen[0]);
    assert_eq!(particles.positions[0].x, 0.0);

    let height = particles.heights[0] as f64;
    assert!(height > 0.0);
    assert!((context.deposition.total_deposited_height() - height).abs() < 1e-6);

    // The border node under the particle is raised
    let (_, cols) = solver.terrain_dims();
    let k = 16 * cols;
    assert!(solver.terrain_heights()[k] > context.deposition.initial_heights()[k]);
}

#[test]
fn test_temperature_holds_without_lava_constants() {
    let mut config = base_config();
    config.mu = 0.0;
    config.ke = 0.0;
    config.spawn_jitter = 0.0;
    let theta_e = config.theta_e;
    let mut solver = Solver::initialize(flat_terrain(), config.clone()).unwrap();

    solver.tick(Some(Vec3::new(16.0, 0.0, 16.0)));
    for _ in 0..100 {
        solver.tick(None);
    }
    assert_eq!(solver.temperatures()[0], theta_e);

    // With the default constants the same particle cools toward ambient
    let mut tunables = config.tunables();
    tunables.mu = SimulationConfig::default().mu;
    tunables.ke = SimulationConfig::default().ke;
    solver.apply_tunables(tunables).unwrap();
    for _ in 0..100 {
        solver.tick(None);
    }
    let t = solver.temperatures()[0];
    assert!(t < theta_e && t > config.theta_a);
}

#[test]
fn test_removal_keeps_grid_consistent() {
    let mut config = base_config();
    config.mu = 0.0;
    config.remove_out_of_bounds = true;
    config.spawn_per_step = 3;
    let mut solver = Solver::initialize(steep_terrain(), config).unwrap();

    let mut removed = 0;
    for _ in 0..30 {
        let report = solver.tick(Some(Vec3::new(2.0, 0.0, 16.0)));
        removed += report.removed;
        assert_eq!(report.removed, report.frozen);
        assert_grid_consistent(&solver);
        assert_eq!(solver.context().particles.frozen_count(), 0);
    }

    assert!(removed > 0);
    assert_eq!(solver.particle_count() + removed, 90);
    assert_eq!(solver.stats().particles_removed as usize, removed);
}

#[test]
fn test_config_file_drives_solver() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        kernel_radius = 3.0
        max_particles = 10
        spawn_per_step = 4
        smoothing = "box"
        worker_threads = 1
        "#
    )
    .unwrap();

    let config = SimulationConfig::load(file.path()).unwrap();
    let mut solver = Solver::initialize(flat_terrain(), config).unwrap();
    solver.tick(Some(Vec3::new(8.0, 0.0, 8.0)));
    solver.tick(Some(Vec3::new(8.0, 0.0, 8.0)));

    assert_eq!(solver.particle_count(), 8);
    assert_eq!(solver.context().grid.cell_size(), 6.0);
    assert_eq!(solver.terrain_dims(), (32, 32));
    assert_eq!(solver.terrain_temperatures().len(), 32 * 32);
    let stats = solver.shutdown();
    assert_eq!(stats.particles_spawned, 8);
}
