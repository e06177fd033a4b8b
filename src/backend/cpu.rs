//! Host reference backend: executes kernels on the CPU with rayon.
//!
//! Used by the test-suite and by the driver when no usable GPU adapter exists.
//! Validation matches the GPU backend, so a pipeline that runs here
//! records the same declarations and bindings it would on the GPU.

use std::sync::Arc;

use log::{trace, warn};
use rayon::prelude::*;

use super::{
    check_signature, Binding, BufferDesc, BufferHandle, BufferUsage, ComputeBackend, Dispatch, Kernel,
    ParamBlock, ResourceState, SamplerCache, SamplerDesc, SamplerHandle, StateTracker, TextureDesc,
    TextureHandle,
};
use crate::error::BackendError;
use crate::kernels::{self, TexelView};

struct CpuTexture {
    desc: TextureDesc,
    data: Vec<f32>,
    sampler: Option<Arc<SamplerDesc>>,
}

struct CpuBuffer {
    usage: BufferUsage,
    bytes: Vec<u8>,
}

/// A dispatch as recorded (and later executed) by [`CpuBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub kernel: Kernel,
    pub bindings: Vec<Binding>,
    pub params: ParamBlock,
}

impl DispatchRecord {
    pub fn reads(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.bindings
            .iter()
            .filter(|b| b.access == super::Access::Read)
            .map(|b| b.texture)
    }

    pub fn writes(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.bindings
            .iter()
            .filter(|b| b.access == super::Access::Write)
            .map(|b| b.texture)
    }
}

/// CPU compute backend
#[derive(Default)]
pub struct CpuBackend {
    textures: Vec<Option<CpuTexture>>,
    buffers: Vec<Option<CpuBuffer>>,
    states: StateTracker,
    samplers: SamplerCache<SamplerDesc>,
    pending: Vec<DispatchRecord>,
    journal: Vec<DispatchRecord>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dispatch executed so far, in execution order
    pub fn journal(&self) -> &[DispatchRecord] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.iter().flatten().count()
    }

    pub fn buffer_contents(&self, handle: BufferHandle) -> Option<(BufferUsage, &[u8])> {
        self.buffers
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .map(|b| (b.usage, b.bytes.as_slice()))
    }

    pub fn sampler_cache(&self) -> &SamplerCache<SamplerDesc> {
        &self.samplers
    }

    pub fn resource_state(&self, handle: TextureHandle) -> ResourceState {
        self.states.state(handle)
    }

    fn texture(&self, handle: TextureHandle) -> Result<&CpuTexture, BackendError> {
        self.textures
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::UnknownTexture(handle))
    }

    fn texture_mut(&mut self, handle: TextureHandle) -> Result<&mut CpuTexture, BackendError> {
        self.textures
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(BackendError::UnknownTexture(handle))
    }

    fn view(&self, handle: TextureHandle) -> Result<TexelView<'_>, BackendError> {
        let texture = self.texture(handle)?;
        Ok(TexelView::new(
            &texture.data,
            texture.desc.size,
            texture.desc.format.channels(),
        ))
    }

    fn execute(&mut self, record: &DispatchRecord) -> Result<(), BackendError> {
        let (reads, _) = record.kernel.signature();
        let target = record.bindings[reads.len()].texture;

        // Every binding must still exist before the target's storage is detached
        for binding in &record.bindings {
            self.texture(binding.texture)?;
        }

        // Every kernel writes exactly one texture, never one it reads
        let (size, channels) = {
            let desc = &self.texture(target)?.desc;
            (desc.size, desc.format.channels())
        };
        let mut output = std::mem::take(&mut self.texture_mut(target)?.data);

        let inputs = record.bindings[..reads.len()]
            .iter()
            .map(|b| self.view(b.texture))
            .collect::<Result<Vec<_>, _>>()?;
        run_kernel(record, &inputs, &mut output, size, channels);

        self.texture_mut(target)?.data = output;
        Ok(())
    }
}

fn run_kernel(
    record: &DispatchRecord,
    inputs: &[TexelView<'_>],
    output: &mut [f32],
    size: u32,
    channels: usize,
) {
    let horizontal = record.kernel == Kernel::FftHorizontal;
    let params = &record.params;

    output
        .par_chunks_mut(channels)
        .enumerate()
        .for_each(|(i, texel)| {
            let x = (i % size as usize) as u32;
            let y = (i / size as usize) as u32;
            match params {
                ParamBlock::InitialSpectrum(p) => {
                    let [forward, mirrored] = kernels::initial_spectrum(x, y, p);
                    texel.copy_from_slice(&[forward, mirrored, 0.0, 0.0]);
                }
                ParamBlock::Phase(p) => {
                    texel[0] = kernels::advance_phase(x, y, inputs[0].get(x, y)[0], p);
                }
                ParamBlock::Spectrum(p) => {
                    let initial = inputs[0].get(x, y);
                    let phase = inputs[1].get(x, y)[0];
                    texel.copy_from_slice(&kernels::synthesize_spectrum(
                        x,
                        y,
                        [initial[0], initial[1]],
                        phase,
                        p,
                    ));
                }
                ParamBlock::Fft(p) => {
                    texel.copy_from_slice(&kernels::butterfly(inputs[0], x, y, horizontal, p));
                }
                ParamBlock::NormalMap(p) => {
                    texel.copy_from_slice(&kernels::surface_normal(inputs[0], x, y, p));
                }
            }
        });
}

impl ComputeBackend for CpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError> {
        if desc.size == 0 {
            return Err(BackendError::InvalidDescriptor(format!(
                "{}: zero-sized texture",
                desc.label
            )));
        }
        let sampler = desc
            .sampler
            .map(|sampler_desc| self.samplers.acquire(sampler_desc, |d| *d));

        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(CpuTexture {
            desc: desc.clone(),
            data: vec![0.0; desc.float_count()],
            sampler,
        }));
        trace!("created {} as {:?}", desc.label, handle);
        Ok(handle)
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferHandle, BackendError> {
        if desc.contents.is_empty() {
            return Err(BackendError::InvalidDescriptor(format!(
                "{}: empty buffer",
                desc.label
            )));
        }
        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(Some(CpuBuffer {
            usage: desc.usage,
            bytes: desc.contents.to_vec(),
        }));
        Ok(handle)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(slot) = self.textures.get_mut(handle.0 as usize) {
            *slot = None;
        }
        self.states.forget(handle);
        self.samplers.release_unused();
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        if let Some(slot) = self.buffers.get_mut(handle.0 as usize) {
            *slot = None;
        }
    }

    fn write_texture(&mut self, handle: TextureHandle, data: &[f32]) -> Result<(), BackendError> {
        let texture = self.texture_mut(handle)?;
        if texture.data.len() != data.len() {
            return Err(BackendError::UploadSize {
                handle,
                expected: texture.data.len(),
                actual: data.len(),
            });
        }
        texture.data.copy_from_slice(data);
        Ok(())
    }

    fn set_resource_state(&mut self, handle: TextureHandle, state: ResourceState) {
        self.states.declare(handle, state);
    }

    fn dispatch(&mut self, dispatch: &Dispatch<'_>) -> Result<(), BackendError> {
        check_signature(dispatch, |h| self.texture(h).ok().map(|t| t.desc.format))?;
        self.states.check(dispatch)?;

        let sizes = dispatch
            .bindings
            .iter()
            .map(|b| self.texture(b.texture).map(|t| t.desc.size))
            .collect::<Result<Vec<_>, _>>()?;
        if sizes.windows(2).any(|w| w[0] != w[1]) {
            return Err(BackendError::SignatureMismatch {
                kernel: dispatch.kernel,
                reason: format!("texture sizes differ: {:?}", sizes),
            });
        }

        trace!("record {:?} {:?}", dispatch.kernel, dispatch.bindings);
        self.pending.push(DispatchRecord {
            kernel: dispatch.kernel,
            bindings: dispatch.bindings.to_vec(),
            params: dispatch.params,
        });
        Ok(())
    }

    /// Execute pending work in order; on failure the rest of the batch is dropped
    fn submit(&mut self) -> Result<(), BackendError> {
        let pending = std::mem::take(&mut self.pending);
        let total = pending.len();
        for (i, record) in pending.into_iter().enumerate() {
            if let Err(err) = self.execute(&record) {
                warn!("{:?} failed, dropping {} queued dispatches: {}", record.kernel, total - i - 1, err);
                return Err(err);
            }
            self.journal.push(record);
        }
        trace!("submitted {} dispatches, {} state transitions so far", total, self.states.transition_count());
        Ok(())
    }

    fn read_texture(&mut self, handle: TextureHandle) -> Result<Vec<f32>, BackendError> {
        if !self.pending.is_empty() {
            return Err(BackendError::PendingWork);
        }
        Ok(self.texture(handle)?.data.clone())
    }

    fn sampler(&self, handle: TextureHandle) -> Option<SamplerHandle> {
        let texture = self.texture(handle).ok()?;
        texture.sampler.as_deref().map(|desc| SamplerHandle(*desc))
    }
}
