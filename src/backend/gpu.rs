//! wgpu compute backend.
//!
//! Each [`Kernel`] is compiled once into a compute pipeline whose bind group
//! lists the read textures, then the write storage textures, then a uniform
//! parameter block. Dispatches are recorded into one command encoder and
//! handed to the queue on [`submit`](ComputeBackend::submit).
//!
//! Adapters are checked up front: compute shaders and storage access for
//! every [`TextureFormat`] are required. Device validation errors raised while
//! creating resources or pipelines come back as [`BackendError::Validation`].

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use wgpu::util::DeviceExt;

use super::{
    check_signature, BufferDesc, BufferHandle, BufferUsage, ComputeBackend, Dispatch, Filter, Kernel,
    ResourceState, SamplerCache, SamplerDesc, SamplerHandle, StateTracker, TextureDesc, TextureFormat,
    TextureHandle, WrapMode,
};
use crate::error::BackendError;

const WORKGROUP_SIZE: u32 = 8;

const COMMON_WGSL: &str = include_str!("../shaders/common.wgsl");

/// Usages every simulation texture is created with
const TEXTURE_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::STORAGE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

struct KernelPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: Option<(SamplerDesc, Arc<wgpu::Sampler>)>,
}

/// GPU compute backend on wgpu
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: HashMap<Kernel, KernelPipeline>,
    textures: Vec<Option<GpuTexture>>,
    buffers: Vec<Option<wgpu::Buffer>>,
    states: StateTracker,
    samplers: SamplerCache<wgpu::Sampler>,
    encoder: Option<wgpu::CommandEncoder>,
    format_usages: HashMap<TextureFormat, wgpu::TextureUsages>,
    float32_filterable: bool,
}

impl GpuBackend {
    /// Create a headless device on the best available adapter
    pub async fn new() -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(BackendError::NoAdapter)?;
        let info = adapter.get_info();
        info!("GPU adapter: {} ({:?})", info.name, info.backend);
        check_adapter(&adapter)?;

        let required_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Ocean Compute Device"),
                    required_features,
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        Self::from_device(&adapter, device, queue)
    }

    /// Blocking variant of [`new`](Self::new)
    pub fn new_blocking() -> Result<Self, BackendError> {
        pollster::block_on(Self::new())
    }

    /// Build on a device the caller already owns (e.g. shared with a renderer)
    ///
    /// `adapter` must be the one `device` was requested from.
    pub fn from_device(
        adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Result<Self, BackendError> {
        let format_usages = check_adapter(adapter)?;
        let float32_filterable = device.features().contains(wgpu::Features::FLOAT32_FILTERABLE);
        if !float32_filterable {
            warn!("32-bit float filtering unavailable, output samplers use nearest filtering");
        }

        let pipelines = Kernel::ALL
            .iter()
            .map(|&kernel| Ok((kernel, build_pipeline(&device, kernel)?)))
            .collect::<Result<HashMap<_, _>, BackendError>>()?;

        Ok(Self {
            device,
            queue,
            pipelines,
            textures: Vec::new(),
            buffers: Vec::new(),
            states: StateTracker::new(),
            samplers: SamplerCache::new(),
            encoder: None,
            format_usages,
            float32_filterable,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// View for binding a simulation texture in a render pass
    pub fn texture_view(&self, handle: TextureHandle) -> Option<&wgpu::TextureView> {
        self.texture(handle).ok().map(|t| &t.view)
    }

    /// The wgpu sampler behind [`ComputeBackend::sampler`]
    pub fn wgpu_sampler(&self, handle: TextureHandle) -> Option<&wgpu::Sampler> {
        let texture = self.texture(handle).ok()?;
        texture.sampler.as_ref().map(|(_, sampler)| sampler.as_ref())
    }

    /// Layout types a render pipeline must declare to sample the output maps
    /// with their [`wgpu_sampler`](Self::wgpu_sampler)
    pub fn output_binding_types(&self) -> (wgpu::TextureSampleType, wgpu::SamplerBindingType) {
        if self.float32_filterable {
            (
                wgpu::TextureSampleType::Float { filterable: true },
                wgpu::SamplerBindingType::Filtering,
            )
        } else {
            (
                wgpu::TextureSampleType::Float { filterable: false },
                wgpu::SamplerBindingType::NonFiltering,
            )
        }
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(handle.0 as usize).and_then(Option::as_ref)
    }

    fn texture(&self, handle: TextureHandle) -> Result<&GpuTexture, BackendError> {
        self.textures
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(BackendError::UnknownTexture(handle))
    }

    fn create_sampler(device: &wgpu::Device, desc: &SamplerDesc) -> wgpu::Sampler {
        let address_mode = match desc.wrap {
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        };
        let filter = match desc.filter {
            Filter::Nearest => wgpu::FilterMode::Nearest,
            Filter::Linear => wgpu::FilterMode::Linear,
        };
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Ocean Sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

/// Fail with the usages `allowed` lacks for simulation textures of `format`
fn check_format(format: TextureFormat, allowed: wgpu::TextureUsages) -> Result<(), BackendError> {
    let missing = TEXTURE_USAGES.difference(allowed);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BackendError::UnsupportedFormat { format, missing })
    }
}

/// Refuse adapters that cannot run the kernel set; returns allowed usages per format
fn check_adapter(adapter: &wgpu::Adapter) -> Result<HashMap<TextureFormat, wgpu::TextureUsages>, BackendError> {
    let name = adapter.get_info().name;
    let unsupported = |reason: String| BackendError::UnsupportedAdapter {
        adapter: name.clone(),
        reason,
    };

    let flags = adapter.get_downlevel_capabilities().flags;
    if !flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
        return Err(unsupported("compute shaders unavailable".to_string()));
    }

    let mut usages = HashMap::new();
    for format in TextureFormat::ALL {
        let allowed = adapter
            .get_texture_format_features(wgpu_format(format))
            .allowed_usages;
        check_format(format, allowed).map_err(|err| unsupported(err.to_string()))?;
        usages.insert(format, allowed);
    }
    Ok(usages)
}

/// Sampler actually created when `requested` is asked for on a 32-bit float texture
fn resolve_sampler(requested: SamplerDesc, float32_filterable: bool) -> SamplerDesc {
    if requested.filter == Filter::Linear && !float32_filterable {
        SamplerDesc {
            filter: Filter::Nearest,
            ..requested
        }
    } else {
        requested
    }
}

/// Run `create` inside a validation error scope
fn validated<T>(device: &wgpu::Device, label: &str, create: impl FnOnce() -> T) -> Result<T, BackendError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(BackendError::Validation {
            label: label.to_string(),
            message: error.to_string(),
        }),
        None => Ok(value),
    }
}

/// Complete WGSL module (shared prelude plus kernel body) and entry point for `kernel`
pub fn kernel_wgsl(kernel: Kernel) -> (String, &'static str) {
    let (body, entry_point) = shader_source(kernel);
    (format!("{}\n{}", COMMON_WGSL, body), entry_point)
}

fn shader_source(kernel: Kernel) -> (&'static str, &'static str) {
    match kernel {
        Kernel::InitialSpectrum => (include_str!("../shaders/initial_spectrum.wgsl"), "main"),
        Kernel::Phase => (include_str!("../shaders/phase.wgsl"), "main"),
        Kernel::Spectrum => (include_str!("../shaders/spectrum.wgsl"), "main"),
        Kernel::FftHorizontal => (include_str!("../shaders/fft.wgsl"), "horizontal"),
        Kernel::FftVertical => (include_str!("../shaders/fft.wgsl"), "vertical"),
        Kernel::NormalMap => (include_str!("../shaders/normal_map.wgsl"), "main"),
    }
}

fn build_pipeline(device: &wgpu::Device, kernel: Kernel) -> Result<KernelPipeline, BackendError> {
    let label = format!("{:?}", kernel);
    let pipeline = validated(device, &label, || compile_pipeline(device, kernel, &label))?;
    debug!("compiled {:?} pipeline", kernel);
    Ok(pipeline)
}

fn compile_pipeline(device: &wgpu::Device, kernel: Kernel, label: &str) -> KernelPipeline {
    let (source, entry_point) = kernel_wgsl(kernel);
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let (reads, writes) = kernel.signature();
    let mut entries = Vec::with_capacity(reads.len() + writes.len() + 1);
    for _ in reads {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: entries.len() as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    for format in writes {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: entries.len() as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: wgpu_format(*format),
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        });
    }
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: entries.len() as u32,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    });

    KernelPipeline { pipeline, layout }
}

impl ComputeBackend for GpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.size == 0 || desc.size > max {
            return Err(BackendError::InvalidDescriptor(format!(
                "{}: size {} outside 1..={}",
                desc.label, desc.size, max
            )));
        }

        let allowed = self
            .format_usages
            .get(&desc.format)
            .copied()
            .unwrap_or(wgpu::TextureUsages::empty());
        check_format(desc.format, allowed)?;

        let device = &self.device;
        let texture = validated(device, desc.label, || {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: wgpu::Extent3d {
                    width: desc.size,
                    height: desc.size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu_format(desc.format),
                usage: TEXTURE_USAGES,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let float32_filterable = self.float32_filterable;
        let sampler = desc.sampler.map(|requested| {
            let sampler_desc = resolve_sampler(requested, float32_filterable);
            let sampler = self
                .samplers
                .acquire(sampler_desc, |d| Self::create_sampler(device, d));
            (sampler_desc, sampler)
        });

        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(GpuTexture {
            desc: desc.clone(),
            texture,
            view,
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
        let usage = match desc.usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: desc.contents,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            });

        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(Some(buffer));
        Ok(handle)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(texture) = self.textures.get_mut(handle.0 as usize).and_then(Option::take) {
            texture.texture.destroy();
        }
        self.states.forget(handle);
        self.samplers.release_unused();
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        if let Some(buffer) = self.buffers.get_mut(handle.0 as usize).and_then(Option::take) {
            buffer.destroy();
        }
    }

    fn write_texture(&mut self, handle: TextureHandle, data: &[f32]) -> Result<(), BackendError> {
        let texture = self.texture(handle)?;
        let expected = texture.desc.float_count();
        if data.len() != expected {
            return Err(BackendError::UploadSize {
                handle,
                expected,
                actual: data.len(),
            });
        }

        let size = texture.desc.size;
        let bytes_per_texel = (texture.desc.format.channels() * std::mem::size_of::<f32>()) as u32;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(data),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size * bytes_per_texel),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn set_resource_state(&mut self, handle: TextureHandle, state: ResourceState) {
        // wgpu inserts the matching barrier itself; the declaration is validated
        self.states.declare(handle, state);
    }

    fn dispatch(&mut self, dispatch: &Dispatch<'_>) -> Result<(), BackendError> {
        check_signature(dispatch, |h| self.texture(h).ok().map(|t| t.desc.format))?;
        self.states.check(dispatch)?;

        let kernel = dispatch.kernel;
        let pipeline = self
            .pipelines
            .get(&kernel)
            .ok_or_else(|| BackendError::SignatureMismatch {
                kernel,
                reason: "no pipeline compiled".to_string(),
            })?;

        // One uniform buffer per dispatch: queued stages each keep their own params
        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Kernel Params"),
                contents: dispatch.params.as_bytes(),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut size = 0;
        let mut entries = Vec::with_capacity(dispatch.bindings.len() + 1);
        for (slot, binding) in dispatch.bindings.iter().enumerate() {
            let texture = self.texture(binding.texture)?;
            size = texture.desc.size;
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: dispatch.bindings.len() as u32,
            resource: uniform.as_entire_binding(),
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Kernel Bindings"),
            layout: &pipeline.layout,
            entries: &entries,
        });

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Ocean Compute Encoder"),
            })
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&format!("{:?}", kernel)),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let groups = size.div_ceil(WORKGROUP_SIZE);
            pass.dispatch_workgroups(groups, groups, 1);
        }
        trace!("record {:?} {:?}", kernel, dispatch.bindings);
        Ok(())
    }

    fn submit(&mut self) -> Result<(), BackendError> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
            trace!("submitted, {} state transitions so far", self.states.transition_count());
        }
        Ok(())
    }

    fn read_texture(&mut self, handle: TextureHandle) -> Result<Vec<f32>, BackendError> {
        if self.encoder.is_some() {
            return Err(BackendError::PendingWork);
        }

        let texture = self.texture(handle)?;
        let size = texture.desc.size;
        let bytes_per_texel = (texture.desc.format.channels() * std::mem::size_of::<f32>()) as u32;
        let unpadded_bytes_per_row = size * bytes_per_texel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * size) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(size),
                },
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        pollster::block_on(receiver).map_err(|_| BackendError::MapCancelled)??;

        let data = slice.get_mapped_range();
        let mut texels = Vec::with_capacity(texture.desc.float_count());
        // Remove row padding
        for y in 0..size {
            let offset = (y * padded_bytes_per_row) as usize;
            let row = &data[offset..offset + unpadded_bytes_per_row as usize];
            texels.extend_from_slice(bytemuck::cast_slice::<u8, f32>(row));
        }
        drop(data);
        staging.unmap();

        Ok(texels)
    }

    fn sampler(&self, handle: TextureHandle) -> Option<SamplerHandle> {
        let texture = self.texture(handle).ok()?;
        texture.sampler.as_ref().map(|(desc, _)| SamplerHandle(*desc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_storage_usage_is_reported() {
        let allowed = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        match check_format(TextureFormat::Rgba32Float, allowed) {
            Err(BackendError::UnsupportedFormat { format, missing }) => {
                assert_eq!(format, TextureFormat::Rgba32Float);
                assert_eq!(missing, wgpu::TextureUsages::STORAGE_BINDING);
            }
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
        assert!(check_format(TextureFormat::R32Float, wgpu::TextureUsages::all()).is_ok());
    }

    #[test]
    fn test_sampler_downgrades_without_float_filtering() {
        let nearest = SamplerDesc {
            filter: Filter::Nearest,
            wrap: WrapMode::Repeat,
        };
        assert_eq!(resolve_sampler(SamplerDesc::TILING, true), SamplerDesc::TILING);
        assert_eq!(resolve_sampler(SamplerDesc::TILING, false), nearest);
        assert_eq!(resolve_sampler(nearest, false), nearest);
    }
}
