use bytemuck::Pod;

use super::backend::{BindTarget, BufferRole, BufferUsage, RawHandle, ResourceKind};
use super::context::GraphicsContext;
use super::error::ResourceAllocationError;
use super::resource::GpuResource;

/// GPU buffer holding interleaved vertex data.
#[derive(Debug)]
pub struct VertexBuffer {
    resource: GpuResource,
    usage: BufferUsage,
    size: usize,
}

impl VertexBuffer {
    pub fn new(ctx: &GraphicsContext, usage: BufferUsage) -> Result<Self, ResourceAllocationError> {
        Ok(Self {
            resource: GpuResource::new(ctx, ResourceKind::Buffer)?,
            usage,
            size: 0,
        })
    }

    /// Allocates and fills a buffer in one step.
    pub fn with_data<T: Pod>(
        ctx: &GraphicsContext,
        usage: BufferUsage,
        data: &[T],
    ) -> Result<Self, ResourceAllocationError> {
        let mut buffer = Self::new(ctx, usage)?;
        buffer.update(data);
        Ok(buffer)
    }

    /// Replaces the buffer contents.
    pub fn update<T: Pod>(&mut self, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.resource.context().backend().upload_buffer(
            self.resource.handle(),
            BufferRole::Vertex,
            self.usage,
            bytes,
        );
        self.size = bytes.len();
    }

    pub fn bind(&self) {
        self.resource.bind(BindTarget::VertexBuffer);
    }

    pub fn unbind(&self) {
        self.resource.unbind(BindTarget::VertexBuffer);
    }

    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn handle(&self) -> RawHandle {
        self.resource.handle()
    }

    #[inline]
    pub fn context(&self) -> &GraphicsContext {
        self.resource.context()
    }
}

/// GPU buffer holding `u32` indices.
#[derive(Debug)]
pub struct IndexBuffer {
    resource: GpuResource,
    usage: BufferUsage,
    count: u32,
}

impl IndexBuffer {
    pub fn new(ctx: &GraphicsContext, usage: BufferUsage) -> Result<Self, ResourceAllocationError> {
        Ok(Self {
            resource: GpuResource::new(ctx, ResourceKind::Buffer)?,
            usage,
            count: 0,
        })
    }

    pub fn with_indices(
        ctx: &GraphicsContext,
        usage: BufferUsage,
        indices: &[u32],
    ) -> Result<Self, ResourceAllocationError> {
        let mut buffer = Self::new(ctx, usage)?;
        buffer.update(indices);
        Ok(buffer)
    }

    pub fn update(&mut self, indices: &[u32]) {
        self.resource.context().backend().upload_buffer(
            self.resource.handle(),
            BufferRole::Index,
            self.usage,
            bytemuck::cast_slice(indices),
        );
        self.count = indices.len() as u32;
    }

    pub fn bind(&self) {
        self.resource.bind(BindTarget::IndexBuffer);
    }

    pub fn unbind(&self) {
        self.resource.unbind(BindTarget::IndexBuffer);
    }

    /// Number of indices last uploaded.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn handle(&self) -> RawHandle {
        self.resource.handle()
    }
}
