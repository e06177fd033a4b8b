//! Combines amplitudes, phases and choppiness into the time-evolved spectrum.

use crate::backend::{
    Binding, ComputeBackend, Dispatch, Kernel, ParamBlock, ResourceState, SpectrumParams, TextureHandle,
};
use crate::error::BackendError;

/// Per-texel synthesis stage; holds no textures of its own
#[derive(Debug, Clone, Copy)]
pub struct SpectrumSynthesizer {
    tex_size: u32,
    grid_size: u32,
}

impl SpectrumSynthesizer {
    pub fn new(tex_size: u32, grid_size: u32) -> Self {
        Self { tex_size, grid_size }
    }

    /// Record synthesis of `output` from the initial spectrum and the
    /// freshly advanced phase buffer
    pub fn record(
        &self,
        backend: &mut dyn ComputeBackend,
        initial_spectrum: TextureHandle,
        phase: TextureHandle,
        output: TextureHandle,
        choppiness: f32,
    ) -> Result<(), BackendError> {
        backend.set_resource_state(initial_spectrum, ResourceState::ShaderRead);
        backend.set_resource_state(phase, ResourceState::ShaderRead);
        backend.set_resource_state(output, ResourceState::ShaderWrite);
        backend.dispatch(&Dispatch {
            kernel: Kernel::Spectrum,
            bindings: &[
                Binding::read(initial_spectrum),
                Binding::read(phase),
                Binding::write(output),
            ],
            params: ParamBlock::Spectrum(SpectrumParams {
                tex_size: self.tex_size,
                grid_size: self.grid_size,
                choppiness,
                _padding: 0.0,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CpuBackend, TextureDesc, TextureFormat};

    fn texture(backend: &mut CpuBackend, format: TextureFormat) -> TextureHandle {
        backend
            .create_texture(&TextureDesc {
                label: "test",
                size: 4,
                format,
                sampler: None,
            })
            .unwrap()
    }

    fn synthesize(choppiness: f32) -> Vec<f32> {
        let mut backend = CpuBackend::new();
        let initial = texture(&mut backend, TextureFormat::Rgba32Float);
        let phase = texture(&mut backend, TextureFormat::R32Float);
        let output = texture(&mut backend, TextureFormat::Rgba32Float);
        backend.write_texture(initial, &[0.25; 64]).unwrap();
        backend
            .write_texture(phase, &(0..16).map(|i| i as f32 * 0.4).collect::<Vec<_>>())
            .unwrap();

        SpectrumSynthesizer::new(4, 16)
            .record(&mut backend, initial, phase, output, choppiness)
            .unwrap();
        backend.submit().unwrap();
        backend.read_texture(output).unwrap()
    }

    #[test]
    fn test_zero_choppiness_leaves_horizontal_channels_empty() {
        let texels = synthesize(0.0);
        for texel in texels.chunks_exact(4) {
            assert_eq!(texel[2], 0.0);
            assert_eq!(texel[3], 0.0);
        }
        assert!(texels.chunks_exact(4).skip(1).any(|t| t[0] != 0.0));
    }

    #[test]
    fn test_choppiness_scales_horizontal_channels() {
        let one = synthesize(1.0);
        let two = synthesize(2.0);
        for (a, b) in one.chunks_exact(4).zip(two.chunks_exact(4)) {
            assert_eq!(a[..2], b[..2]);
            assert!((b[2] - 2.0 * a[2]).abs() < 1e-6);
            assert!((b[3] - 2.0 * a[3]).abs() < 1e-6);
        }
    }
}
