//! Light volume geometry

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::backend::{
    BufferDescriptor, BufferHandle, BufferUsage, GraphicsDevice, IndexFormat,
};
use crate::error::RenderResult;

/// Position-only geometry used for light volumes and full-screen passes
#[derive(Debug, Clone)]
pub struct VolumeMesh {
    pub name: String,
    /// Tightly packed positions, 2 or 3 floats per vertex
    pub positions: Vec<f32>,
    pub components: usize,
    pub indices: Vec<u32>,
}

impl VolumeMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / self.components
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Create a UV sphere of radius 1 centered at the origin
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        let mut positions = Vec::with_capacity(((rings + 1) * (segments + 1) * 3) as usize);
        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let position = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                positions.extend_from_slice(&position.to_array());
            }
        }

        let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        Self {
            name: "sphere".to_string(),
            positions,
            components: 3,
            indices,
        }
    }

    /// Two triangles covering clip space
    pub fn fullscreen_quad() -> Self {
        let corners = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ];
        Self {
            name: "fullscreen quad".to_string(),
            positions: corners.iter().flat_map(|c| c.to_array()).collect(),
            components: 2,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }
}

/// Uploaded volume geometry. Releases its buffers on drop.
pub struct GpuMesh {
    device: Arc<dyn GraphicsDevice>,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: Arc<dyn GraphicsDevice>, mesh: &VolumeMesh) -> RenderResult<Self> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.positions);
        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);

        let vertex_buffer = device.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} vertices", mesh.name)),
                size: vertex_bytes.len() as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            },
            vertex_bytes,
        )?;
        let index_buffer = device.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} indices", mesh.name)),
                size: index_bytes.len() as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            },
            index_bytes,
        );
        let index_buffer = match index_buffer {
            Ok(buffer) => buffer,
            Err(err) => {
                device.destroy_buffer(vertex_buffer);
                return Err(err.into());
            }
        };

        Ok(Self {
            device,
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
        })
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Bind and draw with the current pipeline.
    pub fn draw(&self, device: &dyn GraphicsDevice) {
        device.set_vertex_buffer(0, self.vertex_buffer, 0);
        device.set_index_buffer(self.index_buffer, 0, IndexFormat::Uint32);
        device.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

impl Drop for GpuMesh {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.vertex_buffer);
        self.device.destroy_buffer(self.index_buffer);
    }
}
