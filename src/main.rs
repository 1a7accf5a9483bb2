/// Headless lava flow runner
///
/// Loads a simulation config and a grayscale heightmap (or builds a procedural
/// terrain), drives the solver with a synthetic frame clock, then writes the
/// final terrain as a 16-bit grayscale PNG and a JSON run summary.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use glam::{Vec2, Vec3};
use serde::Serialize;

use lava_sph::{SimulationConfig, SimulationStats, Solver, StepReport, TerrainHeightField};

const USAGE: &str = "\
Usage: lava-sph [options]

  --config <file>        TOML simulation config (defaults otherwise)
  --heightmap <file>     grayscale heightmap image
  --terrain <kind>       procedural terrain when no heightmap: flat, slope, cone (default cone)
  --resolution <n>       procedural terrain nodes per side (default 128)
  --frames <n>           frames to simulate (default 600)
  --fps <f>              synthetic frame rate (default 60)
  --generator <x,z>      lava vent position (default: domain centre)
  --fixed                one fixed step per frame instead of the frame clock
  --output <dir>         output directory (default ./lava-output)";

#[derive(Debug, Clone, PartialEq)]
enum TerrainSource {
    Image(PathBuf),
    Flat,
    Slope,
    Cone,
}

#[derive(Debug)]
struct RunOptions {
    config: Option<PathBuf>,
    terrain: TerrainSource,
    resolution: usize,
    frames: usize,
    fps: f32,
    generator: Option<Vec2>,
    fixed: bool,
    output_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config: None,
            terrain: TerrainSource::Cone,
            resolution: 128,
            frames: 600,
            fps: 60.0,
            generator: None,
            fixed: false,
            output_dir: PathBuf::from("lava-output"),
        }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Option<RunOptions>> {
    let mut options = RunOptions::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{} expects a value", name));
        match arg.as_str() {
            "--config" => options.config = Some(PathBuf::from(value("--config")?)),
            "--heightmap" => options.terrain = TerrainSource::Image(PathBuf::from(value("--heightmap")?)),
            "--terrain" => {
                options.terrain = match value("--terrain")?.as_str() {
                    "flat" => TerrainSource::Flat,
                    "slope" => TerrainSource::Slope,
                    "cone" => TerrainSource::Cone,
                    other => bail!("unknown terrain kind '{}'", other),
                }
            }
            "--resolution" => options.resolution = value("--resolution")?.parse().context("--resolution")?,
            "--frames" => options.frames = value("--frames")?.parse().context("--frames")?,
            "--fps" => options.fps = value("--fps")?.parse().context("--fps")?,
            "--generator" => {
                let raw = value("--generator")?;
                let (x, z) = raw
                    .split_once(',')
                    .with_context(|| format!("--generator expects x,z, got '{}'", raw))?;
                options.generator = Some(Vec2::new(
                    x.trim().parse().context("--generator x")?,
                    z.trim().parse().context("--generator z")?,
                ));
            }
            "--fixed" => options.fixed = true,
            "--output" => options.output_dir = PathBuf::from(value("--output")?),
            "-h" | "--help" => return Ok(None),
            other => bail!("unknown argument '{}'\n\n{}", other, USAGE),
        }
    }

    if !(options.fps.is_finite() && options.fps > 0.0) {
        bail!("--fps must be positive, got {}", options.fps);
    }
    Ok(Some(options))
}

fn build_terrain(options: &RunOptions, config: &SimulationConfig) -> Result<TerrainHeightField> {
    let size = Vec2::from(config.domain_size);
    let n = options.resolution.max(2);
    let terrain = match &options.terrain {
        TerrainSource::Image(path) => TerrainHeightField::from_image(path, size, config.height_scale)
            .with_context(|| format!("loading heightmap {}", path.display()))?,
        TerrainSource::Flat => TerrainHeightField::flat(n, n, size, 0.0)?,
        TerrainSource::Slope => {
            let slope = Vec2::new(-config.height_scale / size.x, 0.0);
            TerrainHeightField::slope(n, n, size, config.height_scale, slope)?
        }
        TerrainSource::Cone => {
            TerrainHeightField::cone(n, n, size, config.height_scale, size.min_element() * 0.5)?
        }
    };
    Ok(terrain)
}

#[derive(Debug, Serialize)]
struct RunSummary {
    frames: usize,
    totals: StepReport,
    terrain_dims: [usize; 2],
    max_deposit: f32,
    stats: SimulationStats,
    config: SimulationConfig,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(options) = parse_args(std::env::args().skip(1))? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = match &options.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    let terrain = build_terrain(&options, &config)?;

    let size = terrain.size();
    let vent = options.generator.unwrap_or(size * 0.5);
    let generator = Vec3::new(vent.x, terrain.sample(vent.x, vent.y), vent.y);
    log::info!("Lava vent at ({:.1}, {:.1}, {:.1})", generator.x, generator.y, generator.z);

    let mut solver = Solver::initialize(terrain, config).context("initialising solver")?;

    let base_dt = 1.0 / options.fps;
    let mut totals = StepReport::default();
    let progress_every = (options.frames / 10).max(1);

    for frame in 0..options.frames {
        let report = if options.fixed {
            solver.tick(Some(generator))
        } else {
            // Jittered frame times exercise the fixed-step accumulator
            let frame_dt = base_dt * (1.0 + 0.25 * (frame as f32 * 0.7).sin());
            solver.step(generator, frame_dt)
        };
        totals.steps += report.steps;
        totals.spawned += report.spawned;
        totals.spawns_ignored += report.spawns_ignored;
        totals.frozen += report.frozen;
        totals.removed += report.removed;
        totals.live_particles = report.live_particles;

        if (frame + 1) % progress_every == 0 {
            let stats = solver.stats();
            log::info!(
                "Frame {}/{}: {} particles, {:.1} neighbours avg, {}us last tick",
                frame + 1,
                options.frames,
                stats.live_particles,
                stats.average_neighbours,
                stats.last_tick_us
            );
        }
    }

    std::fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("creating {}", options.output_dir.display()))?;

    let (lines, cols) = solver.terrain_dims();
    let max_deposit = solver
        .terrain_heights()
        .iter()
        .zip(solver.context().deposition.initial_heights())
        .map(|(h, initial)| h - initial)
        .fold(0.0_f32, f32::max);

    let png_path = options.output_dir.join("terrain.png");
    TerrainHeightField::write_png(&png_path, lines, cols, solver.terrain_heights())
        .with_context(|| format!("writing {}", png_path.display()))?;

    let config = solver.config().clone();
    let summary = RunSummary {
        frames: options.frames,
        totals,
        terrain_dims: [lines, cols],
        max_deposit,
        stats: solver.shutdown(),
        config,
    };
    let summary_path = options.output_dir.join("summary.json");
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    log::info!("Wrote {} and {}", png_path.display(), summary_path.display());
    Ok(())
}
