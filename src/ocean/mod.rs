//! Ocean wave simulation: wind spectrum, phase evolution, inverse FFT and
//! normal map generation, sequenced per frame by [`OceanSystem`].

pub mod fft;
pub mod mesh;
pub mod normals;
pub mod phase;
pub mod pingpong;
pub mod spectrum;
pub mod synthesis;
pub mod system;
pub mod waves;

pub use fft::{stage_plan, Direction, FftStage, FftTransform};
pub use mesh::{make_grid, Grid, GridMesh, GridVertex, UV_SCALE};
pub use normals::NormalMapGenerator;
pub use phase::{initial_phases, PhaseField};
pub use pingpong::PingPong;
pub use spectrum::{needs_regeneration, SpectrumField};
pub use synthesis::SpectrumSynthesizer;
pub use system::{FrameInput, FrameOutput, OceanShadingConstants, OceanSystem};
