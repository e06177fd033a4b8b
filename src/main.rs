//! Wavefield - headless FFT ocean simulation driver
//!
//! Runs the wave pipeline for a fixed number of frames on the chosen
//! backend, optionally exporting height and normal maps as PNGs.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use wavefield::backend::{ComputeBackend, CpuBackend, GpuBackend};
use wavefield::capture::{field_stats, save_frame};
use wavefield::cli::{Args, BackendKind};
use wavefield::ocean::{FrameInput, OceanSystem};

/// Size reported for the (virtual) presentation surface
const SURFACE_SIZE: (u32, u32) = (1280, 720);

fn run(backend: &mut dyn ComputeBackend, args: &Args) -> Result<()> {
    let config = args.ocean_config();
    let tex_size = config.tex_size;
    let gui = args.gui_parameters();
    let capture = args.capture_config();
    if let Some(capture) = &capture {
        std::fs::create_dir_all(&capture.output_dir)
            .with_context(|| format!("creating {}", capture.output_dir.display()))?;
    }

    let mut ocean = OceanSystem::new(backend, config)?;
    let input = FrameInput {
        gui: &gui,
        dt: args.dt,
        surface_size: SURFACE_SIZE,
    };

    let start = Instant::now();
    let mut last_output = None;
    for frame in 0..args.frames {
        let output = ocean.frame(backend, &input)?;
        backend.submit()?;

        if let (Some(output), Some(capture)) = (&output, &capture) {
            if capture.should_capture(frame, args.frames) {
                save_frame(backend, output, tex_size, capture, frame)?;
            }
        }
        last_output = output.or(last_output);
    }
    let elapsed = start.elapsed();
    info!(
        "simulated {} frames ({:.2} s of ocean time) in {:.2?} ({:.2} ms/frame)",
        ocean.frame_count(),
        ocean.sim_time_s(),
        elapsed,
        elapsed.as_secs_f64() * 1000.0 / args.frames.max(1) as f64
    );

    if let Some(output) = last_output {
        let displacement = backend.read_texture(output.displacement)?;
        let normals = backend.read_texture(output.normal_map)?;
        let stats = field_stats(&displacement, &normals);
        info!(
            "height {:.3}..{:.3} m (rms {:.3}), max horizontal {:.3} m, max normal error {:.2e}",
            stats.min_height_m,
            stats.max_height_m,
            stats.rms_height_m,
            stats.max_horizontal_m,
            stats.max_normal_error
        );
        if stats.non_finite > 0 {
            warn!("{} texels contain NaN/Inf", stats.non_finite);
        }
    }

    ocean.destroy(backend);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Wavefield - FFT ocean simulation");
    match args.backend {
        BackendKind::Cpu => run(&mut CpuBackend::new(), &args),
        BackendKind::Gpu => match GpuBackend::new_blocking() {
            Ok(mut backend) => run(&mut backend, &args),
            Err(err) if err.is_unavailable() => {
                warn!("{}; falling back to the CPU backend", err);
                run(&mut CpuBackend::new(), &args)
            }
            Err(err) => Err(err).context("initialising GPU backend"),
        },
    }
}
