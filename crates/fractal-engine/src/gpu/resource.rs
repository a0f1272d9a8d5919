use std::fmt;

use super::backend::{BindTarget, RawHandle, ResourceKind};
use super::context::GraphicsContext;
use super::error::ResourceAllocationError;

/// Exclusive owner of a single backend object.
///
/// The object is allocated in [`GpuResource::new`] and released exactly once
/// when the owner is dropped. The type is neither `Clone` nor `Copy`; sharing
/// a resource means sharing its owner.
pub struct GpuResource {
    ctx: GraphicsContext,
    handle: RawHandle,
    kind: ResourceKind,
}

impl GpuResource {
    pub fn new(ctx: &GraphicsContext, kind: ResourceKind) -> Result<Self, ResourceAllocationError> {
        let handle = ctx.backend().create(kind)?;
        log::trace!("allocated {kind} {handle}");
        Ok(Self {
            ctx: ctx.clone(),
            handle,
            kind,
        })
    }

    #[inline]
    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[inline]
    pub fn context(&self) -> &GraphicsContext {
        &self.ctx
    }

    /// Selects this object on `target`.
    pub fn bind(&self, target: BindTarget) {
        self.ctx.backend().bind(target, Some(self.handle));
    }

    /// Clears `target`. Other objects bound there are deselected as well.
    pub fn unbind(&self, target: BindTarget) {
        self.ctx.backend().bind(target, None);
    }
}

impl Drop for GpuResource {
    fn drop(&mut self) {
        log::trace!("releasing {} {}", self.kind, self.handle);
        self.ctx.backend().release(self.kind, self.handle);
    }
}

impl fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuResource")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish()
    }
}
