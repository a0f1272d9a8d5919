use std::collections::HashMap;

use glam::Mat4;

use super::backend::{BindTarget, RawHandle, ResourceKind, ShaderStage, UniformLocation, UniformValue};
use super::context::GraphicsContext;
use super::error::ResourceAllocationError;
use super::geometry::GeometryBinding;
use super::resource::GpuResource;
use super::source::{ShaderSourceProvider, load_or_empty};

/// Lifecycle of a program object.
///
/// `Uncompiled → Compiling → Linked → Validated`; a compile or link failure
/// moves to `Failed`. Validation failures are advisory and leave the state as is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProgramState {
    Uncompiled,
    Compiling,
    Linked,
    Validated,
    Failed,
}

/// Compile/link driver and uniform-location cache shared by both program kinds.
#[derive(Debug)]
struct ProgramCore {
    resource: GpuResource,
    label: String,
    state: ProgramState,
    locations: HashMap<String, UniformLocation>,
}

impl ProgramCore {
    fn build(
        ctx: &GraphicsContext,
        label: String,
        stages: &[(ShaderStage, &str)],
    ) -> Result<Self, ResourceAllocationError> {
        let resource = GpuResource::new(ctx, ResourceKind::Program)?;
        let mut core = Self {
            resource,
            label,
            state: ProgramState::Uncompiled,
            locations: HashMap::new(),
        };
        core.compile_and_link(stages);
        Ok(core)
    }

    fn compile_and_link(&mut self, stages: &[(ShaderStage, &str)]) {
        let backend = self.resource.context().backend();
        let handle = self.resource.handle();
        self.state = ProgramState::Compiling;

        for (stage, source) in stages {
            match backend.compile_stage(handle, *stage, source) {
                Ok(()) => log::debug!("{}: {stage} stage compiled", self.label),
                Err(info) => log::error!("{}: {stage} stage failed to compile:\n{info}", self.label),
            }
        }

        match backend.link_program(handle) {
            Ok(()) => {
                self.state = ProgramState::Linked;
                log::info!("{}: program linked", self.label);
            }
            Err(info) => {
                self.state = ProgramState::Failed;
                log::error!("{}: program failed to link:\n{info}", self.label);
            }
        }
    }

    fn validate(&mut self) {
        let backend = self.resource.context().backend();
        match backend.validate_program(self.resource.handle()) {
            Ok(()) => {
                if self.state == ProgramState::Linked {
                    self.state = ProgramState::Validated;
                }
            }
            Err(info) => log::warn!("{}: program validation: {info}", self.label),
        }
    }

    fn uniform_location(&mut self, name: &str) -> UniformLocation {
        if let Some(location) = self.locations.get(name) {
            return *location;
        }
        let location = self
            .resource
            .context()
            .backend()
            .uniform_location(self.resource.handle(), name);
        if !location.is_found() {
            log::warn!("{}: uniform `{name}` doesn't exist", self.label);
        }
        self.locations.insert(name.to_owned(), location);
        location
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        let location = self.uniform_location(name);
        if location.is_found() {
            self.resource
                .context()
                .backend()
                .set_uniform(self.resource.handle(), location, value);
        }
    }

    fn is_valid(&self) -> bool {
        matches!(self.state, ProgramState::Linked | ProgramState::Validated)
    }
}

macro_rules! program_common {
    ($ty:ty) => {
        impl $ty {
            pub fn bind(&self) {
                self.core.resource.bind(BindTarget::Program);
            }

            pub fn unbind(&self) {
                self.core.resource.unbind(BindTarget::Program);
            }

            /// Asks the backend whether the program can run with the current
            /// bindings. Failures are logged only.
            pub fn validate(&mut self) {
                self.core.validate();
            }

            #[inline]
            pub fn state(&self) -> ProgramState {
                self.core.state
            }

            /// Whether the program compiled and linked.
            #[inline]
            pub fn is_valid(&self) -> bool {
                self.core.is_valid()
            }

            #[inline]
            pub fn label(&self) -> &str {
                &self.core.label
            }

            #[inline]
            pub fn handle(&self) -> RawHandle {
                self.core.resource.handle()
            }

            /// Cached parameter lookup. A missing name warns on first lookup only.
            pub fn uniform_location(&mut self, name: &str) -> UniformLocation {
                self.core.uniform_location(name)
            }

            pub fn set_uniform_1i(&mut self, name: &str, value: i32) {
                self.core.set_uniform(name, UniformValue::Int(value));
            }

            pub fn set_uniform_2i(&mut self, name: &str, x: i32, y: i32) {
                self.core.set_uniform(name, UniformValue::Int2([x, y]));
            }

            pub fn set_uniform_1f(&mut self, name: &str, value: f32) {
                self.core.set_uniform(name, UniformValue::Float(value));
            }

            pub fn set_uniform_2f(&mut self, name: &str, x: f32, y: f32) {
                self.core.set_uniform(name, UniformValue::Float2([x, y]));
            }

            pub fn set_uniform_4f(&mut self, name: &str, x: f32, y: f32, z: f32, w: f32) {
                self.core.set_uniform(name, UniformValue::Float4([x, y, z, w]));
            }

            pub fn set_uniform_mat4(&mut self, name: &str, value: &Mat4) {
                self.core
                    .set_uniform(name, UniformValue::Mat4(value.to_cols_array_2d()));
            }
        }
    };
}

/// Vertex + fragment program.
#[derive(Debug)]
pub struct GraphicsProgram {
    core: ProgramCore,
}

impl GraphicsProgram {
    pub fn new(ctx: &GraphicsContext, vertex: &str, fragment: &str) -> Result<Self, ResourceAllocationError> {
        Self::labeled(ctx, "graphics program".to_owned(), vertex, fragment)
    }

    /// Loads both stages from `provider`. Unreadable sources compile as empty
    /// and leave the program in [`ProgramState::Failed`].
    pub fn load(
        ctx: &GraphicsContext,
        provider: &dyn ShaderSourceProvider,
        vertex_path: &str,
        fragment_path: &str,
    ) -> Result<Self, ResourceAllocationError> {
        let vertex = load_or_empty(provider, vertex_path);
        let fragment = load_or_empty(provider, fragment_path);
        Self::labeled(ctx, format!("{vertex_path}+{fragment_path}"), &vertex, &fragment)
    }

    fn labeled(
        ctx: &GraphicsContext,
        label: String,
        vertex: &str,
        fragment: &str,
    ) -> Result<Self, ResourceAllocationError> {
        let core = ProgramCore::build(
            ctx,
            label,
            &[(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)],
        )?;
        Ok(Self { core })
    }

    /// Binds the program and `geometry`, then draws every index.
    pub fn draw(&self, geometry: &GeometryBinding) -> bool {
        self.bind();
        geometry.bind();
        self.core
            .resource
            .context()
            .backend()
            .draw_indexed(geometry.index_count())
    }
}

program_common!(GraphicsProgram);

/// Single-stage compute program.
#[derive(Debug)]
pub struct ComputeProgram {
    core: ProgramCore,
    workgroup_size: Option<[u32; 3]>,
}

impl ComputeProgram {
    pub fn new(ctx: &GraphicsContext, source: &str) -> Result<Self, ResourceAllocationError> {
        Self::labeled(ctx, "compute program".to_owned(), source)
    }

    pub fn load(
        ctx: &GraphicsContext,
        provider: &dyn ShaderSourceProvider,
        path: &str,
    ) -> Result<Self, ResourceAllocationError> {
        let source = load_or_empty(provider, path);
        Self::labeled(ctx, path.to_owned(), &source)
    }

    fn labeled(ctx: &GraphicsContext, label: String, source: &str) -> Result<Self, ResourceAllocationError> {
        let core = ProgramCore::build(ctx, label, &[(ShaderStage::Compute, source)])?;
        let workgroup_size = if core.is_valid() {
            ctx.backend().workgroup_size(core.resource.handle())
        } else {
            None
        };
        Ok(Self { core, workgroup_size })
    }

    /// Declared local workgroup size, once linked.
    #[inline]
    pub fn workgroup_size(&self) -> Option<[u32; 3]> {
        self.workgroup_size
    }

    /// Binds the program and launches `groups` workgroups.
    pub fn dispatch(&self, groups: [u32; 3]) -> bool {
        self.bind();
        self.core.resource.context().backend().dispatch_compute(groups)
    }
}

program_common!(ComputeProgram);
