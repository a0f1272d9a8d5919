//! Fractal explorer engine.
//!
//! GPU resource ownership, viewport navigation and the compute-then-render
//! frame loop, plus the wgpu and winit collaborators that run them on a
//! real device.

pub mod device;
pub mod frame;
pub mod gpu;
pub mod input;
pub mod logging;
pub mod navigation;
pub mod time;
pub mod window;
