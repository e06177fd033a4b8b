//! Per-frame orchestration of the wave simulation.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::{debug, info, warn};

use super::fft::FftTransform;
use super::mesh::{make_grid, GridMesh};
use super::normals::NormalMapGenerator;
use super::phase::PhaseField;
use super::spectrum::SpectrumField;
use super::synthesis::SpectrumSynthesizer;
use crate::backend::{ComputeBackend, SamplerHandle, TextureHandle};
use crate::error::Result;
use crate::params::{GuiParameters, OceanConfig};

/// Everything a frame consumes from its collaborators
#[derive(Debug, Clone)]
pub struct FrameInput<'a> {
    pub gui: &'a GuiParameters,
    /// Seconds since the previous frame
    pub dt: f32,
    /// Presentation surface size in pixels
    pub surface_size: (u32, u32),
}

/// Fields handed to the rendering stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutput {
    /// r = height, g = auxiliary, b = x displacement, a = z displacement
    pub displacement: TextureHandle,
    pub normal_map: TextureHandle,
    /// Texture-space displacement to mesh-space units (tex_size / grid_size)
    pub displacement_scale: f32,
    pub sampler: Option<SamplerHandle>,
}

/// Uniform block for the ocean surface shader
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct OceanShadingConstants {
    pub world_to_clip: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub displacement_scale: f32,
    pub sun_direction: [f32; 3],
    pub exposure: f32,
}

impl FrameOutput {
    pub fn shading_constants(
        &self,
        world_to_clip: Mat4,
        camera_position: Vec3,
        gui: &GuiParameters,
    ) -> OceanShadingConstants {
        OceanShadingConstants {
            world_to_clip: world_to_clip.to_cols_array_2d(),
            camera_position: camera_position.to_array(),
            displacement_scale: self.displacement_scale,
            sun_direction: gui.sun_direction.normalize_or_zero().to_array(),
            exposure: gui.exposure,
        }
    }
}

/// Clamp negative or non-finite frame times to zero
fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() && dt >= 0.0 {
        dt
    } else {
        warn!("invalid frame time {}, treating as 0", dt);
        0.0
    }
}

/// Owns every simulation resource and sequences the stages each frame
pub struct OceanSystem {
    config: OceanConfig,
    mesh: GridMesh,
    spectrum: SpectrumField,
    phase: PhaseField,
    synthesizer: SpectrumSynthesizer,
    fft: FftTransform,
    normals: NormalMapGenerator,
    sim_time_s: f64,
    frame_count: u64,
}

impl OceanSystem {
    /// Validate `config` and create all resources
    pub fn new(backend: &mut dyn ComputeBackend, config: OceanConfig) -> Result<Self> {
        config.validate()?;

        let grid = make_grid(config.grid_size)?;
        let mesh = GridMesh::upload(backend, &grid)?;
        let spectrum = SpectrumField::new(backend, &config)?;
        let phase = PhaseField::new(backend, &config)?;
        let synthesizer = SpectrumSynthesizer::new(config.tex_size, config.grid_size);
        let fft = FftTransform::new(backend, config.tex_size)?;
        let normals = NormalMapGenerator::new(backend, config.tex_size, config.grid_size)?;

        info!(
            "ocean ready: {} m patch, {}x{} spectrum, {} butterfly stages per axis ({} dispatches)",
            config.grid_size,
            config.tex_size,
            config.tex_size,
            config.fft_stage_count(),
            fft.stage_count()
        );

        Ok(Self {
            config,
            mesh,
            spectrum,
            phase,
            synthesizer,
            fft,
            normals,
            sim_time_s: 0.0,
            frame_count: 0,
        })
    }

    /// Record one frame of simulation work
    ///
    /// The simulation always advances. When the presentation surface has
    /// zero area the hand-off is skipped and `None` is returned. Recorded
    /// work runs on the caller's next [`ComputeBackend::submit`].
    pub fn frame(&mut self, backend: &mut dyn ComputeBackend, input: &FrameInput<'_>) -> Result<Option<FrameOutput>> {
        let dt = sanitize_dt(input.dt);

        self.spectrum.refresh(backend, input.gui.wind())?;
        let phase = self.phase.advance(backend, dt)?;
        self.synthesizer.record(
            backend,
            self.spectrum.texture(),
            phase,
            self.fft.input(),
            input.gui.choppiness,
        )?;
        let displacement = self.fft.record(backend)?;
        let normal_map = self.normals.record(backend, displacement)?;

        self.sim_time_s += f64::from(dt);
        self.frame_count += 1;

        let (width, height) = input.surface_size;
        if width == 0 || height == 0 {
            debug!("frame {}: zero-area surface, skipping hand-off", self.frame_count);
            return Ok(None);
        }

        Ok(Some(FrameOutput {
            displacement,
            normal_map,
            displacement_scale: self.config.displacement_scale(),
            sampler: backend.sampler(displacement),
        }))
    }

    pub fn config(&self) -> &OceanConfig {
        &self.config
    }

    pub fn mesh(&self) -> &GridMesh {
        &self.mesh
    }

    pub fn spectrum(&self) -> &SpectrumField {
        &self.spectrum
    }

    pub fn phase(&self) -> &PhaseField {
        &self.phase
    }

    pub fn fft(&self) -> &FftTransform {
        &self.fft
    }

    pub fn normal_map(&self) -> TextureHandle {
        self.normals.texture()
    }

    /// Total simulated time (seconds)
    pub fn sim_time_s(&self) -> f64 {
        self.sim_time_s
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Release every texture and buffer
    pub fn destroy(self, backend: &mut dyn ComputeBackend) {
        self.mesh.destroy(backend);
        self.spectrum.destroy(backend);
        self.phase.destroy(backend);
        self.fft.destroy(backend);
        self.normals.destroy(backend);
        info!("ocean destroyed after {} frames", self.frame_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CpuBackend, SamplerDesc};
    use crate::error::{ConfigError, OceanError};

    fn small_config() -> OceanConfig {
        OceanConfig {
            grid_size: 64,
            tex_size: 16,
            seed: Some(11),
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut backend = CpuBackend::new();
        let config = OceanConfig {
            tex_size: 12,
            ..small_config()
        };
        assert!(matches!(
            OceanSystem::new(&mut backend, config),
            Err(OceanError::Config(ConfigError::TexSizeNotPowerOfTwo(12)))
        ));
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    fn test_frame_reports_resolved_fields() {
        let mut backend = CpuBackend::new();
        let mut ocean = OceanSystem::new(&mut backend, small_config()).unwrap();
        let gui = GuiParameters::default();
        let input = FrameInput {
            gui: &gui,
            dt: 1.0 / 60.0,
            surface_size: (640, 480),
        };

        let output = ocean.frame(&mut backend, &input).unwrap().unwrap();
        assert_eq!(output.displacement, ocean.fft().resolved());
        assert_eq!(output.normal_map, ocean.normal_map());
        assert_eq!(output.displacement_scale, 0.25);
        assert_eq!(output.sampler, Some(SamplerHandle(SamplerDesc::TILING)));
        assert_eq!(ocean.frame_count(), 1);
        assert_eq!(ocean.fft().stage_count(), 2 * ocean.config().fft_stage_count() as usize);
    }

    #[test]
    fn test_invalid_dt_is_clamped() {
        assert_eq!(sanitize_dt(0.5), 0.5);
        assert_eq!(sanitize_dt(-1.0), 0.0);
        assert_eq!(sanitize_dt(f32::NAN), 0.0);
        assert_eq!(sanitize_dt(f32::INFINITY), 0.0);
    }

    #[test]
    fn test_shading_constants() {
        let output = FrameOutput {
            displacement: TextureHandle(0),
            normal_map: TextureHandle(1),
            displacement_scale: 0.5,
            sampler: None,
        };
        let gui = GuiParameters {
            sun_direction: Vec3::new(0.0, 2.0, 0.0),
            exposure: 0.7,
            ..Default::default()
        };
        let constants = output.shading_constants(Mat4::IDENTITY, Vec3::new(1.0, 2.0, 3.0), &gui);

        assert_eq!(constants.world_to_clip, Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(constants.camera_position, [1.0, 2.0, 3.0]);
        assert_eq!(constants.displacement_scale, 0.5);
        assert_eq!(constants.sun_direction, [0.0, 1.0, 0.0]);
        assert_eq!(constants.exposure, 0.7);
        assert_eq!(std::mem::size_of::<OceanShadingConstants>() % 16, 0);
    }
}
