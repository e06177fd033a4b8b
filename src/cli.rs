//! Command-line argument parsing for the headless driver.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::params::{CaptureConfig, GuiParameters, OceanConfig};

/// Which compute backend executes the kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Host reference executor (rayon)
    Cpu,
    /// wgpu compute pipelines
    Gpu,
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "wavefield")]
#[command(about = "Headless FFT ocean wave simulation", long_about = None)]
pub struct Args {
    /// Compute backend
    #[arg(long, value_enum, default_value_t = BackendKind::Gpu)]
    pub backend: BackendKind,

    /// Number of frames to simulate
    #[arg(long, default_value_t = 60)]
    pub frames: usize,

    /// Seconds per simulated frame
    #[arg(long, value_name = "SECONDS", default_value_t = 1.0 / 60.0)]
    pub dt: f32,

    /// Side length of the ocean patch (meters)
    #[arg(long, value_name = "METERS", default_value_t = 1024)]
    pub grid_size: u32,

    /// Spectrum resolution (power of two)
    #[arg(long, default_value_t = 512)]
    pub tex_size: u32,

    /// Wind speed (m/s)
    #[arg(long, value_name = "M/S", default_value_t = 30.0)]
    pub wind: f32,

    /// Wind heading (radians, 0 = +X)
    #[arg(long, value_name = "RADIANS", default_value_t = 0.0)]
    pub wind_angle: f32,

    /// Horizontal displacement factor
    #[arg(long, default_value_t = 1.5)]
    pub choppiness: f32,

    /// Seed for the initial phases (random if omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write height/normal PNGs to this directory
    #[arg(long, value_name = "DIR")]
    pub capture: Option<PathBuf>,

    /// Capture every Nth frame (0 = last frame only)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub capture_every: usize,
}

impl Args {
    pub fn ocean_config(&self) -> OceanConfig {
        OceanConfig {
            grid_size: self.grid_size,
            tex_size: self.tex_size,
            seed: self.seed,
            ..Default::default()
        }
    }

    pub fn gui_parameters(&self) -> GuiParameters {
        GuiParameters {
            wind_magnitude_m_per_s: self.wind,
            wind_angle_rad: self.wind_angle,
            choppiness: self.choppiness,
            ..Default::default()
        }
    }

    /// Capture configuration if `--capture` was given
    pub fn capture_config(&self) -> Option<CaptureConfig> {
        self.capture.as_ref().map(|dir| CaptureConfig {
            every_n_frames: self.capture_every,
            ..CaptureConfig::new(dir.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_onto_params() {
        let args = Args::parse_from(["wavefield"]);
        assert_eq!(args.backend, BackendKind::Gpu);
        let config = args.ocean_config();
        assert_eq!(config.tex_size, 512);
        assert_eq!(config.grid_size, 1024);
        assert!(config.validate().is_ok());
        assert!(args.capture_config().is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "wavefield",
            "--backend",
            "cpu",
            "--tex-size",
            "64",
            "--choppiness",
            "0",
            "--seed",
            "9",
            "--capture",
            "out",
            "--capture-every",
            "10",
        ]);
        assert_eq!(args.backend, BackendKind::Cpu);
        assert_eq!(args.ocean_config().seed, Some(9));
        assert_eq!(args.gui_parameters().choppiness, 0.0);
        let capture = args.capture_config().unwrap();
        assert_eq!(capture.every_n_frames, 10);
        assert_eq!(capture.output_dir, PathBuf::from("out"));
    }
}
