//! Double-buffered phase field advanced by the dispersion relation.

use std::f32::consts::TAU;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::pingpong::PingPong;
use crate::backend::{
    Binding, ComputeBackend, Dispatch, Kernel, ParamBlock, PhaseParams, ResourceState, TextureDesc,
    TextureFormat, TextureHandle,
};
use crate::error::BackendError;
use crate::params::OceanConfig;

/// Independent uniform phases in [0, 2π), one per texel
pub fn initial_phases(tex_size: u32, seed: Option<u64>) -> Vec<f32> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let count = tex_size as usize * tex_size as usize;
    (0..count).map(|_| rng.gen_range(0.0..TAU)).collect()
}

/// Phase per wave-vector, the only state that persists across frames
///
/// Step `s` reads slot `s % 2` and writes the other. Wind changes never
/// touch this field.
pub struct PhaseField {
    buffers: PingPong<TextureHandle>,
    steps: u64,
    tex_size: u32,
    grid_size: u32,
    gravity: f32,
}

impl PhaseField {
    pub fn new(backend: &mut dyn ComputeBackend, config: &OceanConfig) -> Result<Self, BackendError> {
        let desc = |label| TextureDesc {
            label,
            size: config.tex_size,
            format: TextureFormat::R32Float,
            sampler: None,
        };
        let ping = backend.create_texture(&desc("Phase A"))?;
        let pong = backend.create_texture(&desc("Phase B"))?;

        backend.write_texture(ping, &initial_phases(config.tex_size, config.seed))?;
        match config.seed {
            Some(seed) => info!("phase field seeded with {}", seed),
            None => info!("phase field seeded from entropy"),
        }

        Ok(Self {
            buffers: PingPong::new(ping, pong),
            steps: 0,
            tex_size: config.tex_size,
            grid_size: config.grid_size,
            gravity: config.gravity_m_per_s2,
        })
    }

    /// Buffer holding the latest phases
    pub fn current(&self) -> TextureHandle {
        self.buffers.source(self.steps)
    }

    /// Number of advances recorded so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn textures(&self) -> [TextureHandle; 2] {
        self.buffers.slots()
    }

    /// Record `next = current + ω(k)·dt`; returns the buffer written
    pub fn advance(&mut self, backend: &mut dyn ComputeBackend, dt: f32) -> Result<TextureHandle, BackendError> {
        let current = self.buffers.source(self.steps);
        let next = self.buffers.target(self.steps);

        backend.set_resource_state(current, ResourceState::ShaderRead);
        backend.set_resource_state(next, ResourceState::ShaderWrite);
        backend.dispatch(&Dispatch {
            kernel: Kernel::Phase,
            bindings: &[Binding::read(current), Binding::write(next)],
            params: ParamBlock::Phase(PhaseParams {
                dt,
                tex_size: self.tex_size,
                grid_size: self.grid_size,
                gravity: self.gravity,
            }),
        })?;
        backend.set_resource_state(next, ResourceState::ShaderRead);

        self.steps += 1;
        Ok(next)
    }

    pub fn destroy(self, backend: &mut dyn ComputeBackend) {
        for texture in self.buffers.slots() {
            backend.destroy_texture(texture);
        }
    }
}
