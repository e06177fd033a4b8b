//! Wavefield - FFT ocean wave simulation on wgpu compute (with a CPU reference backend)

pub mod backend;
pub mod capture;
pub mod cli;
pub mod error;
pub mod kernels;
pub mod ocean;
pub mod params;
