//! Compute backend contract consumed by the simulation core.
//!
//! The core never talks to a graphics API directly. It creates textures and
//! buffers, declares read/write intent, records kernel dispatches and asks
//! the backend to execute them. Two implementations ship with the crate:
//! [`CpuBackend`] (host reference executor) and [`GpuBackend`] (wgpu).

mod cache;
mod cpu;
mod gpu;
mod state;

use bytemuck::{Pod, Zeroable};

pub use cache::SamplerCache;
pub use cpu::{CpuBackend, DispatchRecord};
pub use gpu::{kernel_wgsl, GpuBackend};
pub use state::StateTracker;

use crate::error::BackendError;

/// Opaque texture identifier issued by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

/// Opaque buffer identifier issued by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u32);

/// Texel formats used by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R32Float,
    Rgba32Float,
}

impl TextureFormat {
    pub const ALL: [TextureFormat; 2] = [TextureFormat::R32Float, TextureFormat::Rgba32Float];

    pub fn channels(self) -> usize {
        match self {
            Self::R32Float => 1,
            Self::Rgba32Float => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
}

/// Sampler description; identical descriptions share one cached sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub wrap: WrapMode,
}

impl SamplerDesc {
    /// Tiling sampler used by the renderer for displacement and normal maps
    pub const TILING: Self = Self {
        filter: Filter::Linear,
        wrap: WrapMode::Repeat,
    };
}

/// Handle to a cached sampler, valid while any texture references it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerHandle(pub SamplerDesc);

#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub label: &'static str,
    pub size: u32,
    pub format: TextureFormat,
    pub sampler: Option<SamplerDesc>,
}

impl TextureDesc {
    /// Number of f32 values needed to fill the texture
    pub fn float_count(&self) -> usize {
        (self.size as usize) * (self.size as usize) * self.format.channels()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'static str,
    pub usage: BufferUsage,
    pub contents: &'a [u8],
}

/// Declared intent for a texture before the next dispatch touches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceState {
    #[default]
    Undefined,
    ShaderRead,
    ShaderWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub texture: TextureHandle,
    pub access: Access,
}

impl Binding {
    pub fn read(texture: TextureHandle) -> Self {
        Self {
            texture,
            access: Access::Read,
        }
    }

    pub fn write(texture: TextureHandle) -> Self {
        Self {
            texture,
            access: Access::Write,
        }
    }
}

/// The compute kernels of the wave pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    InitialSpectrum,
    Phase,
    Spectrum,
    FftHorizontal,
    FftVertical,
    NormalMap,
}

impl Kernel {
    pub const ALL: [Kernel; 6] = [
        Kernel::InitialSpectrum,
        Kernel::Phase,
        Kernel::Spectrum,
        Kernel::FftHorizontal,
        Kernel::FftVertical,
        Kernel::NormalMap,
    ];

    /// Formats of the read bindings followed by the write bindings
    pub fn signature(self) -> (&'static [TextureFormat], &'static [TextureFormat]) {
        use TextureFormat::*;
        match self {
            Self::InitialSpectrum => (&[], &[Rgba32Float]),
            Self::Phase => (&[R32Float], &[R32Float]),
            Self::Spectrum => (&[Rgba32Float, R32Float], &[Rgba32Float]),
            Self::FftHorizontal | Self::FftVertical => (&[Rgba32Float], &[Rgba32Float]),
            Self::NormalMap => (&[Rgba32Float], &[Rgba32Float]),
        }
    }
}

/// Parameters for the initial spectrum kernel
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InitialSpectrumParams {
    pub wind: [f32; 2],
    pub tex_size: u32,
    pub grid_size: u32,
    pub gravity: f32,
    pub amplitude: f32,
    pub _padding: [f32; 2],
}

/// Parameters for the phase advance kernel
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PhaseParams {
    pub dt: f32,
    pub tex_size: u32,
    pub grid_size: u32,
    pub gravity: f32,
}

/// Parameters for the spectrum synthesis kernel
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SpectrumParams {
    pub tex_size: u32,
    pub grid_size: u32,
    pub choppiness: f32,
    pub _padding: f32,
}

/// Parameters for one butterfly stage
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FftParams {
    pub total_count: u32,
    pub subseq_count: u32,
    pub _padding: [u32; 2],
}

/// Parameters for the normal map kernel
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct NormalMapParams {
    pub tex_size: u32,
    pub grid_size: u32,
    pub _padding: [u32; 2],
}

/// Small parameter block bound alongside a dispatch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamBlock {
    InitialSpectrum(InitialSpectrumParams),
    Phase(PhaseParams),
    Spectrum(SpectrumParams),
    Fft(FftParams),
    NormalMap(NormalMapParams),
}

impl ParamBlock {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::InitialSpectrum(p) => bytemuck::bytes_of(p),
            Self::Phase(p) => bytemuck::bytes_of(p),
            Self::Spectrum(p) => bytemuck::bytes_of(p),
            Self::Fft(p) => bytemuck::bytes_of(p),
            Self::NormalMap(p) => bytemuck::bytes_of(p),
        }
    }

    /// Whether this block is the one `kernel` expects
    pub fn matches(&self, kernel: Kernel) -> bool {
        matches!(
            (self, kernel),
            (Self::InitialSpectrum(_), Kernel::InitialSpectrum)
                | (Self::Phase(_), Kernel::Phase)
                | (Self::Spectrum(_), Kernel::Spectrum)
                | (Self::Fft(_), Kernel::FftHorizontal | Kernel::FftVertical)
                | (Self::NormalMap(_), Kernel::NormalMap)
        )
    }
}

/// One recorded kernel invocation over the full texture
#[derive(Debug, Clone)]
pub struct Dispatch<'a> {
    pub kernel: Kernel,
    pub bindings: &'a [Binding],
    pub params: ParamBlock,
}

/// Resource creation, dispatch recording and execution
///
/// Work recorded through [`dispatch`](Self::dispatch) runs in recording
/// order when [`submit`](Self::submit) is called.
pub trait ComputeBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError>;

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferHandle, BackendError>;

    fn destroy_texture(&mut self, handle: TextureHandle);

    fn destroy_buffer(&mut self, handle: BufferHandle);

    /// Upload host data covering the whole texture
    fn write_texture(&mut self, handle: TextureHandle, data: &[f32]) -> Result<(), BackendError>;

    /// Declare how the next dispatches will access `handle`
    fn set_resource_state(&mut self, handle: TextureHandle, state: ResourceState);

    fn dispatch(&mut self, dispatch: &Dispatch<'_>) -> Result<(), BackendError>;

    fn submit(&mut self) -> Result<(), BackendError>;

    /// Read back the whole texture as tightly packed f32 texels
    fn read_texture(&mut self, handle: TextureHandle) -> Result<Vec<f32>, BackendError>;

    /// Sampler the renderer should use with `handle`, if it has one
    fn sampler(&self, handle: TextureHandle) -> Option<SamplerHandle>;
}

/// Check binding count, order, access and formats against the kernel signature
pub(crate) fn check_signature(
    dispatch: &Dispatch<'_>,
    format_of: impl Fn(TextureHandle) -> Option<TextureFormat>,
) -> Result<(), BackendError> {
    let kernel = dispatch.kernel;
    let mismatch = |reason: String| BackendError::SignatureMismatch { kernel, reason };

    if !dispatch.params.matches(kernel) {
        return Err(mismatch("wrong parameter block".to_string()));
    }

    let (reads, writes) = kernel.signature();
    if dispatch.bindings.len() != reads.len() + writes.len() {
        return Err(mismatch(format!(
            "expected {} bindings, got {}",
            reads.len() + writes.len(),
            dispatch.bindings.len()
        )));
    }

    let expected = reads
        .iter()
        .map(|f| (Access::Read, *f))
        .chain(writes.iter().map(|f| (Access::Write, *f)));
    for (slot, (binding, (access, format))) in dispatch.bindings.iter().zip(expected).enumerate() {
        if binding.access != access {
            return Err(mismatch(format!("slot {} should be {:?}", slot, access)));
        }
        let actual = format_of(binding.texture).ok_or(BackendError::UnknownTexture(binding.texture))?;
        if actual != format {
            return Err(mismatch(format!(
                "slot {} expects {:?}, got {:?}",
                slot, format, actual
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_blocks_are_uniform_sized() {
        // Uniform buffers are bound in 16-byte multiples
        assert_eq!(std::mem::size_of::<InitialSpectrumParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<PhaseParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<SpectrumParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<FftParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<NormalMapParams>() % 16, 0);
    }

    #[test]
    fn test_param_block_kernel_pairing() {
        let fft = ParamBlock::Fft(FftParams::zeroed());
        assert!(fft.matches(Kernel::FftHorizontal));
        assert!(fft.matches(Kernel::FftVertical));
        assert!(!fft.matches(Kernel::NormalMap));
    }
}
