//! Static wind-driven amplitude field (initial spectrum).

use log::debug;

use crate::backend::{
    Binding, ComputeBackend, Dispatch, InitialSpectrumParams, Kernel, ParamBlock, ResourceState,
    TextureDesc, TextureFormat, TextureHandle,
};
use crate::error::BackendError;
use crate::params::{OceanConfig, WindVector};

/// Whether the spectrum must be rebuilt for `current` wind
///
/// `previous` is the wind the field was last generated with (`None` before
/// the first generation).
pub fn needs_regeneration(previous: Option<WindVector>, current: WindVector) -> bool {
    previous != Some(current)
}

/// Phillips amplitudes per wave-vector: r = A(k), g = A(-k), b = a = 0
pub struct SpectrumField {
    texture: TextureHandle,
    tex_size: u32,
    grid_size: u32,
    gravity: f32,
    amplitude: f32,
    wind: Option<WindVector>,
}

impl SpectrumField {
    pub fn new(backend: &mut dyn ComputeBackend, config: &OceanConfig) -> Result<Self, BackendError> {
        let texture = backend.create_texture(&TextureDesc {
            label: "Initial Spectrum",
            size: config.tex_size,
            format: TextureFormat::Rgba32Float,
            sampler: None,
        })?;
        Ok(Self {
            texture,
            tex_size: config.tex_size,
            grid_size: config.grid_size,
            gravity: config.gravity_m_per_s2,
            amplitude: config.phillips_amplitude,
            wind: None,
        })
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Wind used for the last generation
    pub fn wind(&self) -> Option<WindVector> {
        self.wind
    }

    /// Record an unconditional rebuild of the field for `wind`
    pub fn generate(&mut self, backend: &mut dyn ComputeBackend, wind: WindVector) -> Result<(), BackendError> {
        let params = InitialSpectrumParams {
            wind: wind.0.to_array(),
            tex_size: self.tex_size,
            grid_size: self.grid_size,
            gravity: self.gravity,
            amplitude: self.amplitude,
            _padding: [0.0; 2],
        };

        backend.set_resource_state(self.texture, ResourceState::ShaderWrite);
        backend.dispatch(&Dispatch {
            kernel: Kernel::InitialSpectrum,
            bindings: &[Binding::write(self.texture)],
            params: ParamBlock::InitialSpectrum(params),
        })?;
        backend.set_resource_state(self.texture, ResourceState::ShaderRead);

        let direction = wind.direction();
        debug!(
            "regenerating spectrum for wind {:.2} m/s towards ({:.3}, {:.3})",
            wind.speed(),
            direction.x,
            direction.y
        );
        self.wind = Some(wind);
        Ok(())
    }

    /// Rebuild only if the wind changed; returns whether work was recorded
    pub fn refresh(&mut self, backend: &mut dyn ComputeBackend, wind: WindVector) -> Result<bool, BackendError> {
        if !needs_regeneration(self.wind, wind) {
            return Ok(false);
        }
        self.generate(backend, wind)?;
        Ok(true)
    }

    pub fn destroy(self, backend: &mut dyn ComputeBackend) {
        backend.destroy_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use glam::Vec2;

    fn small_config() -> OceanConfig {
        OceanConfig {
            grid_size: 64,
            tex_size: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_regeneration_decision() {
        let wind = WindVector::from_polar(20.0, 0.5);
        assert!(needs_regeneration(None, wind));
        assert!(!needs_regeneration(Some(wind), wind));
        assert!(needs_regeneration(Some(wind), WindVector::from_polar(20.0, 0.6)));
        assert!(needs_regeneration(Some(wind), WindVector::from_polar(21.0, 0.5)));
    }

    #[test]
    fn test_refresh_only_records_on_change() {
        let mut backend = CpuBackend::new();
        let mut field = SpectrumField::new(&mut backend, &small_config()).unwrap();
        let wind = WindVector(Vec2::new(15.0, 5.0));

        assert!(field.refresh(&mut backend, wind).unwrap());
        assert!(!field.refresh(&mut backend, wind).unwrap());
        backend.submit().unwrap();
        assert_eq!(backend.journal().len(), 1);
        assert_eq!(field.wind(), Some(wind));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let mut backend = CpuBackend::new();
        let mut field = SpectrumField::new(&mut backend, &small_config()).unwrap();
        let wind = WindVector::from_polar(25.0, 1.0);

        field.generate(&mut backend, wind).unwrap();
        backend.submit().unwrap();
        let first = backend.read_texture(field.texture()).unwrap();

        field.generate(&mut backend, wind).unwrap();
        backend.submit().unwrap();
        let second = backend.read_texture(field.texture()).unwrap();

        assert_eq!(first, second);
        // DC term carries no energy
        assert_eq!(&first[..2], &[0.0, 0.0]);
        assert!(first.iter().all(|a| a.is_finite() && *a >= 0.0));
        assert!(first.iter().any(|a| *a > 0.0));
    }

    #[test]
    fn test_second_channel_mirrors_wave_vector() {
        let mut backend = CpuBackend::new();
        let config = small_config();
        let mut field = SpectrumField::new(&mut backend, &config).unwrap();
        field
            .generate(&mut backend, WindVector::from_polar(10.0, 0.3))
            .unwrap();
        backend.submit().unwrap();
        let data = backend.read_texture(field.texture()).unwrap();

        // A(-k) at (x, y) equals A(k) at the mirrored texel
        let n = config.tex_size as usize;
        let at = |x: usize, y: usize, c: usize| data[(y * n + x) * 4 + c];
        for (x, y) in [(1, 2), (5, 11), (3, 0)] {
            let (mx, my) = ((n - x) % n, (n - y) % n);
            assert_eq!(at(x, y, 1), at(mx, my, 0));
            assert_eq!(at(x, y, 2), 0.0);
            assert_eq!(at(x, y, 3), 0.0);
        }
    }
}
