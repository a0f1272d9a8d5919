//! Window collaborators.
//!
//! The frame controller only sees [`WindowBackend`]: a classic poll loop
//! surface (poll, drain input, present, close). [`WinitWindow`] drives a real
//! window through winit's pump-events API; [`ScriptedWindow`] replays queued
//! input for tests and headless runs.

mod native;
mod scripted;

pub use native::{WindowConfig, WinitWindow};
pub use scripted::ScriptedWindow;

use crate::input::InputEvent;

/// Window and event-source seam of the frame loop.
pub trait WindowBackend {
    fn should_close(&self) -> bool;

    /// Processes pending platform events without blocking.
    fn poll_events(&mut self);

    /// Called right before the frame is handed to the compositor.
    fn present(&mut self);

    fn request_close(&mut self);

    /// Input events gathered since the last drain, in arrival order.
    fn drain_input(&mut self) -> Vec<InputEvent>;

    /// Latest framebuffer size change since the last call.
    fn take_resize(&mut self) -> Option<(u32, u32)>;

    /// Current framebuffer size in physical pixels.
    fn framebuffer_size(&self) -> (u32, u32);
}
