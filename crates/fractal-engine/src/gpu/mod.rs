//! GPU resource layer.
//!
//! Owning wrappers over backend objects (buffers, textures, programs) plus the
//! [`Backend`] seam they talk through. Each wrapper owns exactly one backend
//! object and releases it on drop.

pub mod backend;
pub mod buffer;
pub mod context;
pub mod error;
pub mod geometry;
pub mod headless;
pub mod layout;
pub mod reflect;
pub mod resource;
pub mod shader;
pub mod source;
pub mod texture;

pub use backend::{
    Backend, BindTarget, BufferRole, BufferUsage, MemoryBarrier, RawHandle, ResourceKind, ShaderStage,
    TextureExtent, UniformLocation, UniformValue, ValueType,
};
pub use buffer::{IndexBuffer, VertexBuffer};
pub use context::GraphicsContext;
pub use error::{LayoutError, ResourceAllocationError, SourceUnavailable};
pub use geometry::{GeometryBinding, attribute_pointers};
pub use headless::{Call, HeadlessBackend};
pub use layout::{ComponentType, VertexAttribute, VertexElement, VertexLayout};
pub use resource::GpuResource;
pub use shader::{ComputeProgram, GraphicsProgram, ProgramState};
pub use source::{EmbeddedShaderSource, FileShaderSource, ShaderSourceProvider};
pub use texture::{
    ExternalFormat, FormatTriple, InternalFormat, PixelFormat, PixelType, Texture, TextureDimension,
    TextureParams, WrapPolicy,
};
