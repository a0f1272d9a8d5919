//! Input subsystem.
//!
//! Public API is platform-agnostic and does not expose winit types.
//! The window collaborator translates platform events into `InputEvent`s.

pub mod platform;
mod state;
mod types;

pub use state::{KeyMask, KeyTracker};
pub use types::{InputEvent, Key, KeyAction, Modifiers};
