//! Error types for the ocean simulation.

use thiserror::Error;

use crate::backend::{Kernel, TextureFormat, TextureHandle};

/// Startup configuration errors (programmer errors, fatal)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("texture size must be a power of two >= 2, got {0}")]
    TexSizeNotPowerOfTwo(u32),

    #[error("grid size must be positive, got {0}")]
    GridSizeNotPositive(u32),

    #[error("gravity must be positive and finite, got {0}")]
    InvalidGravity(f32),
}

/// Errors surfaced by a compute backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("adapter {adapter} cannot run the wave kernels: {reason}")]
    UnsupportedAdapter { adapter: String, reason: String },

    #[error("{format:?} textures do not support {missing:?} on this adapter")]
    UnsupportedFormat {
        format: TextureFormat,
        missing: wgpu::TextureUsages,
    },

    #[error("device rejected {label}: {message}")]
    Validation { label: String, message: String },

    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("buffer mapping was cancelled before completing")]
    MapCancelled,

    #[error("invalid resource description: {0}")]
    InvalidDescriptor(String),

    #[error("unknown texture handle {0:?}")]
    UnknownTexture(TextureHandle),

    #[error("upload size mismatch for {handle:?}: expected {expected} floats, got {actual}")]
    UploadSize {
        handle: TextureHandle,
        expected: usize,
        actual: usize,
    },

    #[error("{kernel:?}: bindings do not match kernel signature ({reason})")]
    SignatureMismatch { kernel: Kernel, reason: String },

    #[error("{kernel:?}: texture {handle:?} used without a matching state declaration")]
    UndeclaredAccess { kernel: Kernel, handle: TextureHandle },

    #[error("{kernel:?}: texture {handle:?} bound for both read and write")]
    Hazard { kernel: Kernel, handle: TextureHandle },

    #[error("recorded work must be submitted before readback")]
    PendingWork,
}

impl BackendError {
    /// The GPU cannot be used at all, as opposed to a failure while running on it
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::NoAdapter | Self::UnsupportedAdapter { .. } | Self::RequestDevice(_)
        )
    }
}

/// Umbrella error for the simulation core
#[derive(Debug, Error)]
pub enum OceanError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),
}

/// Errors while exporting fields to disk
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("readback failed: {0}")]
    Backend(#[from] BackendError),

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),

    #[error("field has {actual} floats, expected {expected}")]
    FieldSize { expected: usize, actual: usize },
}

pub type Result<T, E = OceanError> = std::result::Result<T, E>;
