use super::error::LayoutError;

/// Scalar component type of a vertex attribute.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ComponentType {
    Float,
    UnsignedInt,
    UnsignedByte,
    /// Backend type code without a known size.
    Unknown(u32),
}

impl ComponentType {
    /// Size in bytes of one component; zero for [`ComponentType::Unknown`].
    #[inline]
    pub const fn size_of(self) -> u32 {
        match self {
            ComponentType::Float | ComponentType::UnsignedInt => 4,
            ComponentType::UnsignedByte => 1,
            ComponentType::Unknown(_) => 0,
        }
    }
}

/// One attribute of an interleaved vertex.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexElement {
    pub component_type: ComponentType,
    pub count: u32,
    pub normalized: bool,
}

impl VertexElement {
    #[inline]
    pub const fn size(&self) -> u32 {
        self.count * self.component_type.size_of()
    }
}

/// Ordered description of an interleaved vertex.
///
/// `stride` is always the sum of every element's `count * size_of(type)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    elements: Vec<VertexElement>,
    stride: u32,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unnormalized element.
    pub fn push(&mut self, component_type: ComponentType, count: u32) -> &mut Self {
        self.push_element(VertexElement {
            component_type,
            count,
            normalized: false,
        })
    }

    /// Appends an element whose integer components are normalized to `[0, 1]`.
    pub fn push_normalized(&mut self, component_type: ComponentType, count: u32) -> &mut Self {
        self.push_element(VertexElement {
            component_type,
            count,
            normalized: true,
        })
    }

    fn push_element(&mut self, element: VertexElement) -> &mut Self {
        if let ComponentType::Unknown(code) = element.component_type {
            log::warn!(
                "vertex element {} has unrecognized component type {code:#x}; it occupies no bytes",
                self.elements.len()
            );
        }
        self.stride += element.size();
        self.elements.push(element);
        self
    }

    #[inline]
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Rejects layouts with elements of unknown size.
    pub fn validate(&self) -> Result<(), LayoutError> {
        for (slot, element) in self.elements.iter().enumerate() {
            if let ComponentType::Unknown(code) = element.component_type {
                return Err(LayoutError {
                    slot: slot as u32,
                    code,
                });
            }
        }
        Ok(())
    }
}

/// A layout element resolved to an attribute slot and byte offset.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexAttribute {
    pub slot: u32,
    pub offset: u32,
    pub element: VertexElement,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_accumulates_element_sizes() {
        let mut layout = VertexLayout::new();
        layout
            .push(ComponentType::Float, 2)
            .push(ComponentType::Float, 2)
            .push_normalized(ComponentType::UnsignedByte, 4);

        assert_eq!(layout.stride(), 8 + 8 + 4);
        assert_eq!(layout.elements().len(), 3);
        assert!(layout.elements()[2].normalized);
    }

    #[test]
    fn empty_layout_has_zero_stride() {
        let layout = VertexLayout::new();
        assert_eq!(layout.stride(), 0);
        assert!(layout.is_empty());
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn unknown_component_is_zero_sized_and_rejected_by_validate() {
        let mut layout = VertexLayout::new();
        layout.push(ComponentType::Float, 3).push(ComponentType::Unknown(0x140A), 2);

        assert_eq!(layout.stride(), 12);
        assert_eq!(
            layout.validate(),
            Err(LayoutError {
                slot: 1,
                code: 0x140A
            })
        );
    }
}
