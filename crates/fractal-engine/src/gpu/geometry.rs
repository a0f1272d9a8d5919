use bytemuck::Pod;

use super::buffer::{IndexBuffer, VertexBuffer};
use super::layout::{VertexAttribute, VertexLayout};

/// Resolves each layout element to an attribute slot at its byte offset.
///
/// Slots are assigned in element order starting at 0; offsets are the running
/// sum of the preceding element sizes.
pub fn attribute_pointers(layout: &VertexLayout) -> Vec<VertexAttribute> {
    let mut offset = 0;
    layout
        .elements()
        .iter()
        .enumerate()
        .map(|(slot, element)| {
            let attribute = VertexAttribute {
                slot: slot as u32,
                offset,
                element: *element,
            };
            offset += element.size();
            attribute
        })
        .collect()
}

/// Vertex buffer + layout + index buffer, bound as one unit.
///
/// Owns both buffers; dropping the binding releases them.
#[derive(Debug)]
pub struct GeometryBinding {
    vertices: VertexBuffer,
    indices: IndexBuffer,
    stride: u32,
    attributes: Vec<VertexAttribute>,
}

impl GeometryBinding {
    pub fn new(vertices: VertexBuffer, layout: &VertexLayout, indices: IndexBuffer) -> Self {
        if let Err(err) = layout.validate() {
            log::warn!("geometry bound with an incomplete layout: {err}");
        }
        Self {
            vertices,
            indices,
            stride: layout.stride(),
            attributes: attribute_pointers(layout),
        }
    }

    /// Selects the vertex buffer, enables every attribute slot, then selects
    /// the index buffer.
    pub fn bind(&self) {
        self.vertices.bind();
        self.vertices
            .context()
            .backend()
            .set_vertex_attributes(self.stride, &self.attributes);
        self.indices.bind();
    }

    pub fn unbind(&self) {
        self.indices.unbind();
        self.vertices.unbind();
    }

    /// Replaces the vertex data; the layout stays as declared.
    pub fn update_vertices<T: Pod>(&mut self, data: &[T]) {
        self.vertices.update(data);
    }

    pub fn update_indices(&mut self, indices: &[u32]) {
        self.indices.update(indices);
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.count()
    }

    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    #[inline]
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::layout::ComponentType;

    #[test]
    fn offsets_are_prefix_sums_of_element_sizes() {
        let mut layout = VertexLayout::new();
        layout
            .push(ComponentType::Float, 2)
            .push(ComponentType::UnsignedByte, 4)
            .push(ComponentType::UnsignedInt, 1)
            .push(ComponentType::Float, 3);

        let attributes = attribute_pointers(&layout);
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        let slots: Vec<u32> = attributes.iter().map(|a| a.slot).collect();

        assert_eq!(offsets, vec![0, 8, 12, 16]);
        assert_eq!(slots, vec![0, 1, 2, 3]);
        assert_eq!(layout.stride(), 28);
    }

    #[test]
    fn unknown_element_does_not_advance_offset() {
        let mut layout = VertexLayout::new();
        layout
            .push(ComponentType::Float, 2)
            .push(ComponentType::Unknown(7), 2)
            .push(ComponentType::Float, 2);

        let offsets: Vec<u32> = attribute_pointers(&layout).iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8, 8]);
    }
}
