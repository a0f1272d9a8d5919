use std::fmt;
use std::num::NonZeroU32;

use super::error::ResourceAllocationError;
use super::layout::VertexAttribute;
use super::texture::{InternalFormat, TextureParams};

/// Opaque identifier of a backend object.
///
/// Handles are issued by [`Backend::create`] and never reused while the object
/// is alive. Zero is never a valid handle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RawHandle(NonZeroU32);

impl RawHandle {
    #[inline]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of backend object owned by a [`GpuResource`](super::GpuResource).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Program,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Program => "program",
        })
    }
}

/// Binding point an object can be selected on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BindTarget {
    VertexBuffer,
    IndexBuffer,
    Program,
    /// Sampled texture slot (texture unit).
    TextureSlot(u32),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferRole {
    Vertex,
    Index,
}

/// Update-frequency hint for buffer uploads.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        })
    }
}

/// Location of a named program parameter.
///
/// Lookups that find nothing yield [`UniformLocation::NOT_FOUND`]; writes to it
/// are ignored by every backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformLocation(i32);

impl UniformLocation {
    pub const NOT_FOUND: UniformLocation = UniformLocation(-1);

    #[inline]
    pub const fn new(index: i32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }

    #[inline]
    pub fn is_found(self) -> bool {
        self.0 >= 0
    }
}

/// Shape of a value parameter as declared by the shader.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ValueType {
    Int,
    Int2,
    Uint,
    Float,
    Float2,
    Float4,
    Mat4,
    /// Declared in the shader but not writable through the typed setters.
    Unsupported,
}

/// Typed value written into a program parameter.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Int2([i32; 2]),
    Float(f32),
    Float2([f32; 2]),
    Float4([f32; 4]),
    /// Column-major 4x4 matrix.
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            UniformValue::Int(_) => ValueType::Int,
            UniformValue::Int2(_) => ValueType::Int2,
            UniformValue::Float(_) => ValueType::Float,
            UniformValue::Float2(_) => ValueType::Float2,
            UniformValue::Float4(_) => ValueType::Float4,
            UniformValue::Mat4(_) => ValueType::Mat4,
        }
    }

    /// Raw little-endian bytes as laid out in a uniform block.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Int(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Int2(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Float(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Float2(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Float4(v) => bytemuck::cast_slice(v).to_vec(),
            UniformValue::Mat4(m) => bytemuck::cast_slice(m).to_vec(),
        }
    }

    /// Integer payload, used when the parameter selects a slot or image unit.
    pub fn as_slot(&self) -> Option<u32> {
        match *self {
            UniformValue::Int(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }
}

/// Synchronization scopes for [`Backend::memory_barrier`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryBarrier {
    /// Image-unit writes become visible to later texture sampling.
    TextureFetch,
}

/// Dimensions passed with a texture upload. 1D uploads use `height == 1`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureExtent {
    pub width: u32,
    pub height: u32,
}

impl TextureExtent {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub const fn texels(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Graphics backend contract.
///
/// Every GPU-side object in the crate is created, configured and released
/// through this trait. Methods take `&self`; implementations keep their mutable
/// state behind interior mutability because the context is shared by every
/// resource it created.
///
/// Failure policy:
/// - `create` is the only fallible allocation primitive
/// - compile/link/validate return the backend's diagnostic log on failure
/// - everything else logs and degrades to a no-op
pub trait Backend {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    fn create(&self, kind: ResourceKind) -> Result<RawHandle, ResourceAllocationError>;
    fn release(&self, kind: ResourceKind, handle: RawHandle);

    /// Selects (`Some`) or deselects (`None`) an object on `target`.
    fn bind(&self, target: BindTarget, handle: Option<RawHandle>);

    fn upload_buffer(&self, handle: RawHandle, role: BufferRole, usage: BufferUsage, data: &[u8]);

    /// Declares how the bound vertex buffer is read by the next draw.
    fn set_vertex_attributes(&self, stride: u32, attributes: &[VertexAttribute]);

    fn configure_texture(&self, handle: RawHandle, params: &TextureParams);

    /// (Re)allocates texture storage; `data == None` allocates without upload.
    fn upload_texture(&self, handle: RawHandle, extent: TextureExtent, data: Option<&[u8]>);

    /// Exposes a texture as a writable compute target on image unit `unit`.
    fn bind_image_unit(&self, unit: u32, handle: RawHandle, format: InternalFormat);

    fn compile_stage(&self, program: RawHandle, stage: ShaderStage, source: &str) -> Result<(), String>;
    fn link_program(&self, program: RawHandle) -> Result<(), String>;
    fn validate_program(&self, program: RawHandle) -> Result<(), String>;

    /// Resolves a parameter name. Callers cache the result.
    fn uniform_location(&self, program: RawHandle, name: &str) -> UniformLocation;
    fn set_uniform(&self, program: RawHandle, location: UniformLocation, value: UniformValue);

    /// Reports the workgroup size a linked compute program declares.
    fn workgroup_size(&self, program: RawHandle) -> Option<[u32; 3]>;

    /// Dispatches the bound compute program. Returns whether work was issued.
    fn dispatch_compute(&self, groups: [u32; 3]) -> bool;
    fn memory_barrier(&self, barrier: MemoryBarrier);

    fn clear(&self, color: [f32; 4]);

    /// Draws `index_count` indices from the bound index buffer with the bound
    /// program. Returns whether a draw was recorded.
    fn draw_indexed(&self, index_count: u32) -> bool;

    fn present(&self);
}
