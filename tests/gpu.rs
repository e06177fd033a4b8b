//! GPU backend checks against the CPU reference.
//!
//! Each test returns early when the machine has no usable adapter.

use wavefield::backend::{
    ComputeBackend, CpuBackend, Filter, GpuBackend, SamplerHandle, TextureDesc, TextureFormat,
};
use wavefield::ocean::{FrameInput, FrameOutput, OceanSystem};
use wavefield::params::{GuiParameters, OceanConfig};

const FRAMES: usize = 3;

fn gpu_backend() -> Option<GpuBackend> {
    match GpuBackend::new_blocking() {
        Ok(backend) => Some(backend),
        Err(err) if err.is_unavailable() => {
            eprintln!("skipping GPU test: {}", err);
            None
        }
        Err(err) => panic!("usable adapter failed to initialise: {}", err),
    }
}

fn config() -> OceanConfig {
    OceanConfig {
        grid_size: 64,
        tex_size: 16,
        seed: Some(5),
        ..Default::default()
    }
}

/// Run a few frames and read back (displacement, normals)
fn simulate(backend: &mut dyn ComputeBackend) -> (FrameOutput, Vec<f32>, Vec<f32>) {
    let mut ocean = OceanSystem::new(backend, config()).unwrap();
    let gui = GuiParameters::default();
    let input = FrameInput {
        gui: &gui,
        dt: 1.0 / 60.0,
        surface_size: (640, 480),
    };

    let mut output = None;
    for _ in 0..FRAMES {
        output = ocean.frame(backend, &input).unwrap();
        backend.submit().unwrap();
    }
    let output = output.unwrap();
    let displacement = backend.read_texture(output.displacement).unwrap();
    let normals = backend.read_texture(output.normal_map).unwrap();
    (output, displacement, normals)
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

#[test]
fn test_gpu_frame_matches_cpu() {
    let Some(mut gpu) = gpu_backend() else {
        return;
    };
    let (_, cpu_displacement, cpu_normals) = simulate(&mut CpuBackend::new());
    let (_, gpu_displacement, gpu_normals) = simulate(&mut gpu);

    let scale = cpu_displacement.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    assert!(scale > 0.0);
    let displacement_error = max_abs_diff(&cpu_displacement, &gpu_displacement) / scale;
    assert!(displacement_error < 1e-3, "relative displacement error {}", displacement_error);

    let normal_error = max_abs_diff(&cpu_normals, &gpu_normals);
    assert!(normal_error < 1e-2, "normal error {}", normal_error);
}

#[test]
fn test_texture_round_trips_through_padded_readback() {
    let Some(mut gpu) = gpu_backend() else {
        return;
    };
    // 4 texels of 4 bytes per row, far below the copy row alignment
    let texture = gpu
        .create_texture(&TextureDesc {
            label: "Readback",
            size: 4,
            format: TextureFormat::R32Float,
            sampler: None,
        })
        .unwrap();
    let data: Vec<f32> = (0..16).map(|i| i as f32 * 0.5 - 3.0).collect();
    gpu.write_texture(texture, &data).unwrap();
    gpu.submit().unwrap();
    assert_eq!(gpu.read_texture(texture).unwrap(), data);
}

#[test]
fn test_output_sampler_binds_for_rendering() {
    let Some(mut gpu) = gpu_backend() else {
        return;
    };
    let (output, _, _) = simulate(&mut gpu);
    let (sample_type, sampler_type) = gpu.output_binding_types();

    // The reported sampler agrees with what the device can filter
    let SamplerHandle(desc) = output.sampler.unwrap();
    let filterable = matches!(sample_type, wgpu::TextureSampleType::Float { filterable: true });
    assert_eq!(desc.filter == Filter::Linear, filterable);

    let device = gpu.device();
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Ocean Surface"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            },
        ],
    });
    for texture in [output.displacement, output.normal_map] {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ocean Surface"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(gpu.texture_view(texture).unwrap()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(gpu.wgpu_sampler(texture).unwrap()),
                },
            ],
        });
    }
    let error = pollster::block_on(device.pop_error_scope());
    assert!(error.is_none(), "{:?}", error);
}
