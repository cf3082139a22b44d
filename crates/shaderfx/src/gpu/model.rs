//! The unit quad every filter is drawn on.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

const POSITIONS: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
];

const TEX_COORDS: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];

/// Strip order: top-left, bottom-left, top-right, bottom-right.
const INDICES: [u16; 4] = [0, 1, 3, 2];

/// Orthographic projection from the unit square onto clip space with the
/// origin at the top-left, column-major.
const PROJECTION: [[f32; 4]; 4] = [
    [2.0, 0.0, 0.0, 0.0],
    [0.0, -2.0, 0.0, 0.0],
    [0.0, 0.0, -0.5, 0.0],
    [-1.0, 1.0, 0.5, 1.0],
];

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Mirrors the `Transform` block in the vertex shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct TransformUniforms {
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl Default for TransformUniforms {
    fn default() -> Self {
        Self {
            model_view: IDENTITY,
            projection: PROJECTION,
        }
    }
}

pub(crate) struct QuadModel {
    pub positions: wgpu::Buffer,
    pub tex_coords: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub transform: wgpu::Buffer,
}

impl QuadModel {
    pub const INDEX_COUNT: u32 = INDICES.len() as u32;

    pub fn new(device: &wgpu::Device) -> Self {
        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad positions"),
            contents: bytemuck::cast_slice(&POSITIONS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let tex_coords = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad texture coordinates"),
            contents: bytemuck::cast_slice(&TEX_COORDS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad indices"),
            contents: bytemuck::cast_slice(&INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        let transform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad transform"),
            contents: bytemuck::bytes_of(&TransformUniforms::default()),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        Self {
            positions,
            tex_coords,
            indices,
            transform,
        }
    }

    pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
        const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
            wgpu::vertex_attr_array![0 => Float32x3];
        const TEX_COORD_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
            wgpu::vertex_attr_array![1 => Float32x2];
        [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &POSITION_ATTRIBUTES,
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &TEX_COORD_ATTRIBUTES,
            },
        ]
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.positions.slice(..));
        pass.set_vertex_buffer(1, self.tex_coords.slice(..));
        pass.set_index_buffer(self.indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..Self::INDEX_COUNT, 0, 0..1);
    }
}
