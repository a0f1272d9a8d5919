use std::fmt;
use std::rc::Rc;

use super::backend::{Backend, MemoryBarrier};

/// Handle to a graphics backend, passed explicitly to every constructor.
///
/// Cloning is cheap; each resource keeps a clone so that it can release its
/// backend object when dropped. The context is single-threaded (`Rc`).
#[derive(Clone)]
pub struct GraphicsContext {
    backend: Rc<dyn Backend>,
}

impl GraphicsContext {
    pub fn new(backend: Rc<dyn Backend>) -> Self {
        Self { backend }
    }

    #[inline]
    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    /// Clears the render target at the start of the next draw.
    pub fn clear(&self, color: [f32; 4]) {
        self.backend.clear(color);
    }

    pub fn memory_barrier(&self, barrier: MemoryBarrier) {
        self.backend.memory_barrier(barrier);
    }

    /// Submits the frame's recorded work and presents it.
    pub fn present(&self) {
        self.backend.present();
    }
}

impl fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("backend", &self.backend.name())
            .finish()
    }
}
