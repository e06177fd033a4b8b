//! Separable inverse 2D FFT as ping-ponged radix-2 butterfly stages.

use log::trace;

use super::pingpong::PingPong;
use crate::backend::{
    Binding, ComputeBackend, Dispatch, FftParams, Kernel, ParamBlock, ResourceState, SamplerDesc,
    TextureDesc, TextureFormat, TextureHandle,
};
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
}

impl Direction {
    fn kernel(self) -> Kernel {
        match self {
            Self::Horizontal => Kernel::FftHorizontal,
            Self::Vertical => Kernel::FftVertical,
        }
    }
}

/// One butterfly stage of the transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FftStage {
    pub direction: Direction,
    /// Subsequence length: 1, 2, 4, ... up to N/2
    pub subseq_count: u32,
}

/// Every stage in execution order: the full horizontal pass, then the
/// full vertical pass, subsequence length doubling within each
pub fn stage_plan(tex_size: u32) -> Vec<FftStage> {
    let per_direction = tex_size.trailing_zeros();
    [Direction::Horizontal, Direction::Vertical]
        .into_iter()
        .flat_map(|direction| {
            (0..per_direction).map(move |stage| FftStage {
                direction,
                subseq_count: 1 << stage,
            })
        })
        .collect()
}

/// Spectrum and scratch textures plus the stage schedule over them
///
/// Stage `s` reads slot `s % 2`; slot 0 is the synthesized spectrum, so the
/// result lands in slot `(2·log2 N) % 2`.
pub struct FftTransform {
    buffers: PingPong<TextureHandle>,
    tex_size: u32,
    plan: Vec<FftStage>,
}

impl FftTransform {
    pub fn new(backend: &mut dyn ComputeBackend, tex_size: u32) -> Result<Self, BackendError> {
        let desc = |label| TextureDesc {
            label,
            size: tex_size,
            format: TextureFormat::Rgba32Float,
            sampler: Some(SamplerDesc::TILING),
        };
        let spectrum = backend.create_texture(&desc("Spectrum"))?;
        let scratch = backend.create_texture(&desc("FFT Scratch"))?;

        Ok(Self {
            buffers: PingPong::new(spectrum, scratch),
            tex_size,
            plan: stage_plan(tex_size),
        })
    }

    /// Texture the synthesizer writes the frequency-domain spectrum into
    pub fn input(&self) -> TextureHandle {
        self.buffers.source(0)
    }

    pub fn stage_count(&self) -> usize {
        self.plan.len()
    }

    /// Texture holding the spatial-domain result once all stages ran
    pub fn resolved(&self) -> TextureHandle {
        self.buffers.resolved(self.plan.len() as u64)
    }

    pub fn textures(&self) -> [TextureHandle; 2] {
        self.buffers.slots()
    }

    /// Record every butterfly stage; returns the resolved displacement map
    pub fn record(&self, backend: &mut dyn ComputeBackend) -> Result<TextureHandle, BackendError> {
        for (step, stage) in self.plan.iter().enumerate() {
            let step = step as u64;
            let source = self.buffers.source(step);
            let target = self.buffers.target(step);

            backend.set_resource_state(source, ResourceState::ShaderRead);
            backend.set_resource_state(target, ResourceState::ShaderWrite);
            backend.dispatch(&Dispatch {
                kernel: stage.direction.kernel(),
                bindings: &[Binding::read(source), Binding::write(target)],
                params: ParamBlock::Fft(FftParams {
                    total_count: self.tex_size,
                    subseq_count: stage.subseq_count,
                    _padding: [0; 2],
                }),
            })?;
            trace!("fft {:?} stage s={}", stage.direction, stage.subseq_count);
        }

        let resolved = self.resolved();
        backend.set_resource_state(resolved, ResourceState::ShaderRead);
        Ok(resolved)
    }

    pub fn destroy(self, backend: &mut dyn ComputeBackend) {
        for texture in self.buffers.slots() {
            backend.destroy_texture(texture);
        }
    }
}
