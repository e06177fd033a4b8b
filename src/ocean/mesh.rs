//! Flat tessellated grid the ocean surface is rendered on.

use bytemuck::{Pod, Zeroable};
use log::info;

use crate::backend::{BufferDesc, BufferHandle, BufferUsage, ComputeBackend};
use crate::error::{BackendError, ConfigError};

/// Displacement and normal maps repeat this many times across the grid
pub const UV_SCALE: f32 = 2.0;

/// Vertex data for the ocean mesh (position + UV coordinates)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GridVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Regular triangulated plane centered at the origin
#[derive(Debug, Clone)]
pub struct Grid {
    pub vertices: Vec<GridVertex>,
    pub indices: Vec<u32>,
}

/// Build a `grid_size` x `grid_size` quad grid spanning
/// `[-grid_size/2, grid_size/2]` on X and Z
pub fn make_grid(grid_size: u32) -> Result<Grid, ConfigError> {
    if grid_size == 0 {
        return Err(ConfigError::GridSizeNotPositive(grid_size));
    }

    let side = grid_size + 1;
    let half = grid_size as f32 / 2.0;
    let mut vertices = Vec::with_capacity((side * side) as usize);
    let mut indices = Vec::with_capacity((grid_size * grid_size * 6) as usize);

    // Flat XZ plane
    for z in 0..side {
        for x in 0..side {
            let x_pos = x as f32 - half;
            let z_pos = z as f32 - half;
            let u = x_pos / grid_size as f32 + 0.5;
            let v = z_pos / grid_size as f32 + 0.5;
            vertices.push(GridVertex {
                position: [x_pos, 0.0, z_pos],
                uv: [u * UV_SCALE, v * UV_SCALE],
            });
        }
    }

    // Fixed winding as emitted, starting from the bottom-left corner
    for z in 0..grid_size {
        for x in 0..grid_size {
            let bottom_left = z * side + x;
            let bottom_right = bottom_left + 1;
            let top_left = (z + 1) * side + x;
            let top_right = top_left + 1;

            indices.extend_from_slice(&[
                bottom_left,
                top_left,
                bottom_right,
                bottom_right,
                top_left,
                top_right,
            ]);
        }
    }

    Ok(Grid { vertices, indices })
}

/// Grid uploaded to backend vertex/index buffers
#[derive(Debug, Clone, Copy)]
pub struct GridMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

impl GridMesh {
    pub fn upload(backend: &mut dyn ComputeBackend, grid: &Grid) -> Result<Self, BackendError> {
        let vertex_buffer = backend.create_buffer(&BufferDesc {
            label: "Grid Vertices",
            usage: BufferUsage::Vertex,
            contents: bytemuck::cast_slice(&grid.vertices),
        })?;
        let index_buffer = backend.create_buffer(&BufferDesc {
            label: "Grid Indices",
            usage: BufferUsage::Index,
            contents: bytemuck::cast_slice(&grid.indices),
        })?;
        info!(
            "uploaded grid mesh: {} vertices, {} indices",
            grid.vertices.len(),
            grid.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: grid.indices.len() as u32,
        })
    }

    pub fn destroy(self, backend: &mut dyn ComputeBackend) {
        backend.destroy_buffer(self.vertex_buffer);
        backend.destroy_buffer(self.index_buffer);
    }
}
