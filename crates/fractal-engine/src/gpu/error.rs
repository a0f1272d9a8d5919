use std::path::PathBuf;

use super::backend::ResourceKind;

/// A backend refused to allocate an object.
///
/// Nothing can run on the GPU without its resources, so this is the one
/// error the resource layer propagates instead of logging.
#[derive(Debug, thiserror::Error)]
pub enum ResourceAllocationError {
    #[error("graphics device lost; cannot allocate {kind}")]
    DeviceLost { kind: ResourceKind },

    #[error("{kind} handle space exhausted")]
    Exhausted { kind: ResourceKind },

    #[error("backend refused {kind} allocation: {reason}")]
    Refused { kind: ResourceKind, reason: String },
}

impl ResourceAllocationError {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceAllocationError::DeviceLost { kind }
            | ResourceAllocationError::Exhausted { kind }
            | ResourceAllocationError::Refused { kind, .. } => *kind,
        }
    }
}

/// A shader source path could not be opened.
#[derive(Debug, thiserror::Error)]
#[error("shader source unavailable: {}", .path.display())]
pub struct SourceUnavailable {
    pub path: PathBuf,
    #[source]
    pub source: Option<std::io::Error>,
}

/// A vertex layout contains elements the backend cannot size.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("vertex element {slot} has unrecognized component type {code:#x}")]
pub struct LayoutError {
    pub slot: u32,
    pub code: u32,
}
