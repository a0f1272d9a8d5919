use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::gpu::{
    BufferUsage, ComponentType, GeometryBinding, GraphicsContext, IndexBuffer, ResourceAllocationError, VertexBuffer,
    VertexLayout,
};

/// Position in framebuffer pixels plus texture coordinate.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Counter-clockwise quad covering `0..width × 0..height`, sampling the whole texture.
pub fn quad_vertices(width: f32, height: f32) -> [QuadVertex; 4] {
    [
        QuadVertex {
            position: [0.0, 0.0],
            uv: [0.0, 0.0],
        },
        QuadVertex {
            position: [width, 0.0],
            uv: [1.0, 0.0],
        },
        QuadVertex {
            position: [width, height],
            uv: [1.0, 1.0],
        },
        QuadVertex {
            position: [0.0, height],
            uv: [0.0, 1.0],
        },
    ]
}

/// Quad of the largest rectangle with `aspect` (width / height) centered in
/// `width × height`. The leftover bars show the clear color.
pub fn fitted_quad_vertices(width: f32, height: f32, aspect: f32) -> [QuadVertex; 4] {
    let (w, h) = if aspect.is_nan() || aspect <= 0.0 || width <= 0.0 || height <= 0.0 {
        (width, height)
    } else if width > height * aspect {
        (height * aspect, height)
    } else {
        (width, width / aspect)
    };
    let offset = [(width - w) * 0.5, (height - h) * 0.5];
    quad_vertices(w, h).map(|mut v| {
        v.position[0] += offset[0];
        v.position[1] += offset[1];
        v
    })
}

pub fn quad_layout() -> VertexLayout {
    let mut layout = VertexLayout::new();
    layout.push(ComponentType::Float, 2);
    layout.push(ComponentType::Float, 2);
    layout
}

/// Pixel-space projection with the origin at the bottom left.
pub fn pixel_projection(width: f32, height: f32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width.max(1.0), 0.0, height.max(1.0), -1.0, 1.0)
}

pub fn build_quad(ctx: &GraphicsContext, vertices: &[QuadVertex; 4]) -> Result<GeometryBinding, ResourceAllocationError> {
    let vertices = VertexBuffer::with_data(ctx, BufferUsage::Dynamic, vertices)?;
    let indices = IndexBuffer::with_indices(ctx, BufferUsage::Static, &QUAD_INDICES)?;
    Ok(GeometryBinding::new(vertices, &quad_layout(), indices))
}
