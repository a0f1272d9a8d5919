//! Frame timing.
//!
//! One `FrameClock` per loop; `tick()` once per presented frame. `FrameStats`
//! keeps the rolling average shown by the overlay.

mod frame_clock;
mod stats;

pub use frame_clock::{FrameClock, FrameTime};
pub use stats::FrameStats;
