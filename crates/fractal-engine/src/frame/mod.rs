//! The compute-then-render frame and its collaborators.

mod config;
mod controller;
mod overlay;
mod quad;

pub use config::{DEFAULT_COLORMAP, FrameConfig, ShaderPaths};
pub use controller::{FrameController, FramePhase, FrameReport};
pub use overlay::{NoOverlay, Overlay, OverlaySnapshot};
pub use quad::{QUAD_INDICES, QuadVertex, build_quad, fitted_quad_vertices, pixel_projection, quad_layout, quad_vertices};
