//! Ocean simulation configuration and the per-frame parameter record.

use glam::{Vec2, Vec3};

use crate::error::ConfigError;

/// Standard gravity (m/s²)
pub const EARTH_GRAVITY: f32 = 9.81;

/// Startup configuration of the wave simulation
#[derive(Debug, Clone)]
pub struct OceanConfig {
    /// Side length of the simulated ocean patch (meters, also mesh cells per side)
    pub grid_size: u32,

    /// Frequency-domain resolution (texels per side, power of two)
    pub tex_size: u32,

    /// Gravitational acceleration used by the dispersion relation (m/s²)
    pub gravity_m_per_s2: f32,

    /// Phillips spectrum constant (dimensionless, scales wave energy)
    pub phillips_amplitude: f32,

    /// Seed for the initial random phase field (None = seeded from entropy)
    pub seed: Option<u64>,
}

impl Default for OceanConfig {
    fn default() -> Self {
        Self {
            grid_size: 1024,
            tex_size: 512,
            gravity_m_per_s2: EARTH_GRAVITY,
            phillips_amplitude: 0.0081,
            seed: None,
        }
    }
}

impl OceanConfig {
    /// Number of butterfly stages per transform direction
    pub fn fft_stage_count(&self) -> u32 {
        self.tex_size.trailing_zeros()
    }

    /// Ratio between texture-space displacement and mesh-space units
    pub fn displacement_scale(&self) -> f32 {
        self.tex_size as f32 / self.grid_size as f32
    }

    /// Validate configuration (texture size must be a power of two, etc.)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tex_size < 2 || !self.tex_size.is_power_of_two() {
            return Err(ConfigError::TexSizeNotPowerOfTwo(self.tex_size));
        }
        if self.grid_size == 0 {
            return Err(ConfigError::GridSizeNotPositive(self.grid_size));
        }
        if !(self.gravity_m_per_s2.is_finite() && self.gravity_m_per_s2 > 0.0) {
            return Err(ConfigError::InvalidGravity(self.gravity_m_per_s2));
        }
        Ok(())
    }
}

/// Wind as a 2D vector in the ocean plane (m/s)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindVector(pub Vec2);

impl WindVector {
    pub fn from_polar(magnitude_m_per_s: f32, angle_rad: f32) -> Self {
        Self(Vec2::from_angle(angle_rad) * magnitude_m_per_s)
    }

    pub fn speed(&self) -> f32 {
        self.0.length()
    }

    /// Unit wind direction, or zero for calm conditions
    pub fn direction(&self) -> Vec2 {
        self.0.normalize_or_zero()
    }
}

/// Per-frame record produced by the parameter-editing overlay
///
/// Immutable for the duration of a frame. `sun_direction` and `exposure`
/// only feed the shading constants handed to the renderer.
#[derive(Debug, Clone)]
pub struct GuiParameters {
    /// Wind speed (m/s)
    pub wind_magnitude_m_per_s: f32,

    /// Wind heading in the XZ plane (radians, 0 = +X)
    pub wind_angle_rad: f32,

    /// Horizontal displacement factor (0 = pure heightfield)
    pub choppiness: f32,

    /// Direction towards the sun (normalized by consumers)
    pub sun_direction: Vec3,

    /// Tonemapping exposure
    pub exposure: f32,
}

impl Default for GuiParameters {
    fn default() -> Self {
        Self {
            wind_magnitude_m_per_s: 30.0,
            wind_angle_rad: 0.0,
            choppiness: 1.5,
            sun_direction: Vec3::new(0.0, 0.3, -1.0),
            exposure: 0.35,
        }
    }
}

impl GuiParameters {
    pub fn wind(&self) -> WindVector {
        WindVector::from_polar(self.wind_magnitude_m_per_s, self.wind_angle_rad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OceanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fft_stage_count(), 9);
        assert_eq!(config.displacement_scale(), 0.5);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        let config = OceanConfig {
            tex_size: 300,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TexSizeNotPowerOfTwo(300))
        );

        let config = OceanConfig {
            tex_size: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OceanConfig {
            grid_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::GridSizeNotPositive(0)));
    }

    #[test]
    fn test_calm_wind_has_no_direction() {
        let wind = WindVector::from_polar(0.0, 1.0);
        assert_eq!(wind.direction(), Vec2::ZERO);

        let wind = WindVector::from_polar(10.0, std::f32::consts::FRAC_PI_2);
        assert!((wind.0 - Vec2::new(0.0, 10.0)).length() < 1e-5);
    }
}
