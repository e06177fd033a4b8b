//! Surface normals derived from the resolved displacement map.

use crate::backend::{
    Binding, ComputeBackend, Dispatch, Kernel, NormalMapParams, ParamBlock, ResourceState, SamplerDesc,
    TextureDesc, TextureFormat, TextureHandle,
};
use crate::error::BackendError;

pub struct NormalMapGenerator {
    texture: TextureHandle,
    tex_size: u32,
    grid_size: u32,
}

impl NormalMapGenerator {
    pub fn new(backend: &mut dyn ComputeBackend, tex_size: u32, grid_size: u32) -> Result<Self, BackendError> {
        let texture = backend.create_texture(&TextureDesc {
            label: "Normal Map",
            size: tex_size,
            format: TextureFormat::Rgba32Float,
            sampler: Some(SamplerDesc::TILING),
        })?;
        Ok(Self {
            texture,
            tex_size,
            grid_size,
        })
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Record normal generation from `displacement`; returns the normal map
    pub fn record(
        &self,
        backend: &mut dyn ComputeBackend,
        displacement: TextureHandle,
    ) -> Result<TextureHandle, BackendError> {
        backend.set_resource_state(displacement, ResourceState::ShaderRead);
        backend.set_resource_state(self.texture, ResourceState::ShaderWrite);
        backend.dispatch(&Dispatch {
            kernel: Kernel::NormalMap,
            bindings: &[Binding::read(displacement), Binding::write(self.texture)],
            params: ParamBlock::NormalMap(NormalMapParams {
                tex_size: self.tex_size,
                grid_size: self.grid_size,
                _padding: [0; 2],
            }),
        })?;
        backend.set_resource_state(self.texture, ResourceState::ShaderRead);
        Ok(self.texture)
    }

    pub fn destroy(self, backend: &mut dyn ComputeBackend) {
        backend.destroy_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;

    #[test]
    fn test_tilted_plane_normal() {
        let mut backend = CpuBackend::new();
        let size = 8;
        let displacement = backend
            .create_texture(&TextureDesc {
                label: "displacement",
                size,
                format: TextureFormat::Rgba32Float,
                sampler: None,
            })
            .unwrap();

        // Height rises 0.5 m per texel along y only (no wrap seam in the middle rows)
        let texels: Vec<f32> = (0..size * size)
            .flat_map(|i| [(i / size) as f32 * 0.5, 0.0, 0.0, 0.0])
            .collect();
        backend.write_texture(displacement, &texels).unwrap();

        let generator = NormalMapGenerator::new(&mut backend, size, 8).unwrap();
        let normals = generator.record(&mut backend, displacement).unwrap();
        backend.submit().unwrap();
        let data = backend.read_texture(normals).unwrap();

        // Texel (3, 3): slope 0.5 along z with 1 m texels
        let n = &data[(3 * size as usize + 3) * 4..][..4];
        let expected = glam::Vec3::new(0.0, 1.0, -0.5).normalize();
        assert!((n[0] - expected.x).abs() < 1e-5);
        assert!((n[1] - expected.y).abs() < 1e-5);
        assert!((n[2] - expected.z).abs() < 1e-5);
        assert_eq!(n[3], 1.0);
    }
}
