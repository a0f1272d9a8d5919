//! wgpu device, surface and the device-backed graphics backend.

mod backend;
mod gpu;
mod init;
mod surface;

pub use backend::WgpuBackend;
pub use gpu::{Gpu, GpuFrame};
pub use surface::SurfaceErrorAction;
pub use init::GpuInit;
