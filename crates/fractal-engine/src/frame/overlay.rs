use glam::DVec2;

use crate::input::InputEvent;

/// Read-only view of one frame, handed to the overlay.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OverlaySnapshot {
    pub center: DVec2,
    pub half_range: f64,
    pub iteration_budget: u32,
    pub lazy_mode_enabled: bool,
    pub frame_delta_seconds: f64,
    pub frames_per_second: f64,
}

/// Diagnostic overlay drawn after the fractal each frame.
///
/// The overlay can flip lazy mode and nothing else.
pub trait Overlay {
    /// Sees every input event the frame drained, before navigation does.
    fn handle_input(&mut self, _event: &InputEvent) {}

    fn draw(&mut self, snapshot: &OverlaySnapshot, lazy_mode: &mut bool);
}

/// Overlay that shows nothing.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn draw(&mut self, _snapshot: &OverlaySnapshot, _lazy_mode: &mut bool) {}
}
