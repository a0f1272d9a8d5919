//! Viewport navigation: the explored region and how keys move it.

mod input;
mod state;

pub use input::{NavigationInput, NavigationUpdate};
pub use state::{NavigationLimits, NavigationState};
