//! Parameter definitions with physical units and documented semantics.
//!
//! All tunable numbers are collected here with:
//! - Physical units (meters, seconds, radians, etc.)
//! - Documented ranges and meanings
//! - Validation where a bad value would break the simulation

mod capture;
mod ocean;

// Re-export all types
pub use capture::CaptureConfig;
pub use ocean::{GuiParameters, OceanConfig, WindVector, EARTH_GRAVITY};
