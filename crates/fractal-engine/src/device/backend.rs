//! wgpu implementation of the graphics backend.
//!
//! The engine drives a bind-then-call model: programs, buffers and textures
//! are selected on targets, then a dispatch or draw uses whatever is
//! selected. This backend resolves that state into bind groups and caches
//! one pipeline per program, rebuilt only when the resolved binding layout,
//! vertex layout or target format changes.
//!
//! Compute work is recorded into a pending encoder and submitted by the
//! memory barrier. Draws are recorded and replayed into the surface pass at
//! `present`, after the clear.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroU64;

use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::gpu::backend::{
    Backend, BindTarget, BufferRole, BufferUsage, MemoryBarrier, RawHandle, ResourceKind, ShaderStage,
    TextureExtent, UniformLocation, UniformValue,
};
use crate::gpu::layout::{ComponentType, VertexAttribute, VertexElement};
use crate::gpu::reflect::{
    self, ImageAccess, ParameterKind, ProgramInterface, SampleKind, StageMask, StageModule, TextureShape,
};
use crate::gpu::texture::{ExternalFormat, InternalFormat, TextureDimension, TextureParams, WrapPolicy};
use crate::gpu::ResourceAllocationError;

use super::{Gpu, SurfaceErrorAction};

struct BufferSlot {
    buffer: Option<wgpu::Buffer>,
    role: BufferRole,
}

struct TextureSlot {
    params: Option<TextureParams>,
    format: wgpu::TextureFormat,
    filterable: bool,
    storage: bool,
    extent: Option<TextureExtent>,
    texture: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
    sampler: Option<wgpu::Sampler>,
}

struct StageShader {
    stage: ShaderStage,
    entry_point: String,
    module: wgpu::ShaderModule,
}

#[derive(Debug, Clone, PartialEq)]
struct PipelineKey {
    entries: Vec<wgpu::BindGroupLayoutEntry>,
    vertex: Option<(u64, Vec<wgpu::VertexAttribute>)>,
    target: Option<wgpu::TextureFormat>,
}

enum PipelineKind {
    Render(wgpu::RenderPipeline),
    Compute(wgpu::ComputePipeline),
}

struct CachedPipeline {
    key: PipelineKey,
    bind_group_layout: wgpu::BindGroupLayout,
    kind: PipelineKind,
}

#[derive(Default)]
struct ProgramSlot {
    stages: Vec<StageModule>,
    compile_failed: bool,
    interface: Option<ProgramInterface>,
    shaders: Vec<StageShader>,
    values: HashMap<usize, UniformValue>,
    block: Vec<u8>,
    uniform_buffer: Option<wgpu::Buffer>,
    pipeline: Option<CachedPipeline>,
}

impl ProgramSlot {
    fn slot_of(&self, index: usize) -> u32 {
        self.values.get(&index).and_then(UniformValue::as_slot).unwrap_or(0)
    }

    fn shader(&self, stage: ShaderStage) -> Option<&StageShader> {
        self.shaders.iter().find(|s| s.stage == stage)
    }
}

enum BoundResource {
    Buffer(wgpu::Buffer),
    View(wgpu::TextureView),
    Sampler(wgpu::Sampler),
}

/// Bind group 0 of a program, resolved against the current bindings.
struct Resolved {
    entries: Vec<wgpu::BindGroupLayoutEntry>,
    resources: Vec<(u32, BoundResource)>,
}

struct PendingDraw {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    count: u32,
}

#[derive(Default)]
struct Bindings {
    vertex_buffer: Option<RawHandle>,
    index_buffer: Option<RawHandle>,
    program: Option<RawHandle>,
    texture_slots: HashMap<u32, RawHandle>,
    image_units: HashMap<u32, RawHandle>,
    vertex_layout: Option<(u32, Vec<VertexAttribute>)>,
}

#[derive(Default)]
struct DeviceState {
    next_handle: u32,
    buffers: HashMap<RawHandle, BufferSlot>,
    textures: HashMap<RawHandle, TextureSlot>,
    programs: HashMap<RawHandle, ProgramSlot>,
    bindings: Bindings,
    compute: Option<wgpu::CommandEncoder>,
    draws: Vec<PendingDraw>,
    clear: wgpu::Color,
}

/// [`Backend`] over a wgpu device and window surface.
pub struct WgpuBackend {
    gpu: RefCell<Gpu>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    state: RefCell<DeviceState>,
    surface_failed: Cell<bool>,
    border_warned: Cell<bool>,
}

impl WgpuBackend {
    pub fn new(gpu: Gpu) -> Self {
        let device = gpu.device().clone();
        let queue = gpu.queue().clone();
        Self {
            gpu: RefCell::new(gpu),
            device,
            queue,
            state: RefCell::default(),
            surface_failed: Cell::new(false),
            border_warned: Cell::new(false),
        }
    }

    pub fn resize(&self, size: PhysicalSize<u32>) {
        self.gpu.borrow_mut().resize(size);
    }

    pub fn surface_size(&self) -> PhysicalSize<u32> {
        self.gpu.borrow().size()
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.gpu.borrow().surface_format()
    }

    /// Set after a surface error that cannot be recovered from.
    pub fn surface_failed(&self) -> bool {
        self.surface_failed.get()
    }

    fn address_mode(&self, wrap: WrapPolicy) -> wgpu::AddressMode {
        match wrap {
            WrapPolicy::Repeat => wgpu::AddressMode::Repeat,
            WrapPolicy::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            WrapPolicy::ClampToBorder => {
                if self
                    .device
                    .features()
                    .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
                {
                    wgpu::AddressMode::ClampToBorder
                } else {
                    if !self.border_warned.replace(true) {
                        log::warn!("clamp-to-border unsupported by the adapter; using clamp-to-edge");
                    }
                    wgpu::AddressMode::ClampToEdge
                }
            }
        }
    }

    fn sample_type(&self, format: wgpu::TextureFormat) -> Option<wgpu::TextureSampleType> {
        format.sample_type(None, Some(self.device.features()))
    }

    fn resolve(
        &self,
        state: &DeviceState,
        program: &ProgramSlot,
        interface: &ProgramInterface,
    ) -> Result<Resolved, String> {
        let mut entries = Vec::new();
        let mut resources = Vec::new();

        if let Some(block) = interface.block {
            let buffer = program
                .uniform_buffer
                .clone()
                .ok_or("uniform buffer was not created")?;
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: visibility(block.stages),
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(u64::from(block.size)),
                },
                count: None,
            });
            resources.push((block.binding, BoundResource::Buffer(buffer)));
        }

        for (index, parameter) in interface.resources() {
            let slot = program.slot_of(index);
            let name = &parameter.name;
            let on_slot = || {
                state
                    .bindings
                    .texture_slots
                    .get(&slot)
                    .and_then(|h| state.textures.get(h))
                    .ok_or_else(|| format!("`{name}`: texture slot {slot} is empty"))
            };

            match parameter.kind {
                ParameterKind::SampledTexture {
                    binding,
                    shape,
                    sample,
                } => {
                    let texture = on_slot()?;
                    let view = texture
                        .view
                        .clone()
                        .ok_or_else(|| format!("`{name}`: texture on slot {slot} has no storage"))?;
                    let view_dimension = view_dimension(shape)
                        .filter(|d| *d == texture_view_dimension(texture))
                        .ok_or_else(|| format!("`{name}`: texture on slot {slot} has the wrong dimension"))?;
                    let sample_type = self
                        .sample_type(texture.format)
                        .filter(|t| sample_matches(*t, sample))
                        .ok_or_else(|| {
                            format!("`{name}`: {:?} cannot be sampled as {sample:?}", texture.format)
                        })?;
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding,
                        visibility: visibility(parameter.stages),
                        ty: wgpu::BindingType::Texture {
                            sample_type,
                            view_dimension,
                            multisampled: false,
                        },
                        count: None,
                    });
                    resources.push((binding, BoundResource::View(view)));
                }
                ParameterKind::Sampler { binding } => {
                    let texture = on_slot()?;
                    let sampler = texture
                        .sampler
                        .clone()
                        .ok_or_else(|| format!("`{name}`: texture on slot {slot} has no sampler"))?;
                    let ty = if texture.filterable {
                        wgpu::SamplerBindingType::Filtering
                    } else {
                        wgpu::SamplerBindingType::NonFiltering
                    };
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding,
                        visibility: visibility(parameter.stages),
                        ty: wgpu::BindingType::Sampler(ty),
                        count: None,
                    });
                    resources.push((binding, BoundResource::Sampler(sampler)));
                }
                ParameterKind::StorageTexture {
                    binding,
                    shape,
                    format,
                    access,
                } => {
                    let texture = state
                        .bindings
                        .image_units
                        .get(&slot)
                        .and_then(|h| state.textures.get(h))
                        .ok_or_else(|| format!("`{name}`: image unit {slot} is empty"))?;
                    let declared = format
                        .map(texture_format)
                        .ok_or_else(|| format!("`{name}`: unsupported storage format"))?;
                    if declared != texture.format {
                        return Err(format!(
                            "`{name}`: image unit {slot} holds {:?}, shader declares {declared:?}",
                            texture.format
                        ));
                    }
                    if !texture.storage {
                        return Err(format!("`{name}`: {declared:?} is not a storage format here"));
                    }
                    let view = texture
                        .view
                        .clone()
                        .ok_or_else(|| format!("`{name}`: texture on image unit {slot} has no storage"))?;
                    let view_dimension = view_dimension(shape)
                        .filter(|d| *d == texture_view_dimension(texture))
                        .ok_or_else(|| format!("`{name}`: image unit {slot} has the wrong dimension"))?;
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding,
                        visibility: visibility(parameter.stages),
                        ty: wgpu::BindingType::StorageTexture {
                            access: storage_access(access),
                            format: declared,
                            view_dimension,
                        },
                        count: None,
                    });
                    resources.push((binding, BoundResource::View(view)));
                }
                ParameterKind::Value { .. } => {}
            }
        }

        Ok(Resolved { entries, resources })
    }

    /// Returns the program's pipeline for `key`, building it on a miss.
    fn ensure_pipeline(&self, program: &mut ProgramSlot, key: PipelineKey) -> Option<(PipelineKind, wgpu::BindGroupLayout)> {
        let hit = program.pipeline.as_ref().is_some_and(|p| p.key == key);
        if !hit {
            let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("fractal program bind group layout"),
                entries: &key.entries,
            });
            let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("fractal program pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

            let kind = match (&key.vertex, key.target) {
                (Some((stride, attributes)), Some(format)) => {
                    let vs = program.shader(ShaderStage::Vertex)?;
                    let fs = program.shader(ShaderStage::Fragment)?;
                    let buffers = [wgpu::VertexBufferLayout {
                        array_stride: *stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes,
                    }];
                    PipelineKind::Render(self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some("fractal render pipeline"),
                        layout: Some(&pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: &vs.module,
                            entry_point: Some(vs.entry_point.as_str()),
                            compilation_options: Default::default(),
                            buffers: &buffers,
                        },
                        fragment: Some(wgpu::FragmentState {
                            module: &fs.module,
                            entry_point: Some(fs.entry_point.as_str()),
                            compilation_options: Default::default(),
                            targets: &[Some(wgpu::ColorTargetState {
                                format,
                                blend: None,
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                        }),
                        primitive: wgpu::PrimitiveState::default(),
                        depth_stencil: None,
                        multisample: wgpu::MultisampleState::default(),
                        multiview_mask: None,
                        cache: None,
                    }))
                }
                _ => {
                    let cs = program.shader(ShaderStage::Compute)?;
                    PipelineKind::Compute(self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some("fractal compute pipeline"),
                        layout: Some(&pipeline_layout),
                        module: &cs.module,
                        entry_point: Some(cs.entry_point.as_str()),
                        compilation_options: Default::default(),
                        cache: None,
                    }))
                }
            };
            log::debug!("pipeline built ({} bindings)", key.entries.len());
            program.pipeline = Some(CachedPipeline {
                key,
                bind_group_layout,
                kind,
            });
        }

        let cached = program.pipeline.as_ref()?;
        let kind = match &cached.kind {
            PipelineKind::Render(p) => PipelineKind::Render(p.clone()),
            PipelineKind::Compute(p) => PipelineKind::Compute(p.clone()),
        };
        Some((kind, cached.bind_group_layout.clone()))
    }

    fn bind_group(&self, layout: &wgpu::BindGroupLayout, resources: &[(u32, BoundResource)]) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    BoundResource::Buffer(b) => b.as_entire_binding(),
                    BoundResource::View(v) => wgpu::BindingResource::TextureView(v),
                    BoundResource::Sampler(s) => wgpu::BindingResource::Sampler(s),
                },
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractal program bind group"),
            layout,
            entries: &entries,
        })
    }

    fn flush_uniforms(&self, program: &ProgramSlot) {
        if let Some(buffer) = &program.uniform_buffer {
            self.queue.write_buffer(buffer, 0, &program.block);
        }
    }
}

impl Backend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create(&self, kind: ResourceKind) -> Result<RawHandle, ResourceAllocationError> {
        if self.gpu.borrow().is_lost() {
            return Err(ResourceAllocationError::DeviceLost { kind });
        }
        let mut state = self.state.borrow_mut();
        state.next_handle = state
            .next_handle
            .checked_add(1)
            .ok_or(ResourceAllocationError::Exhausted { kind })?;
        let handle = RawHandle::from_raw(state.next_handle).ok_or(ResourceAllocationError::Exhausted { kind })?;
        match kind {
            ResourceKind::Buffer => {
                state.buffers.insert(
                    handle,
                    BufferSlot {
                        buffer: None,
                        role: BufferRole::Vertex,
                    },
                );
            }
            ResourceKind::Texture => {
                state.textures.insert(
                    handle,
                    TextureSlot {
                        params: None,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        filterable: false,
                        storage: false,
                        extent: None,
                        texture: None,
                        view: None,
                        sampler: None,
                    },
                );
            }
            ResourceKind::Program => {
                state.programs.insert(handle, ProgramSlot::default());
            }
        }
        Ok(handle)
    }

    fn release(&self, kind: ResourceKind, handle: RawHandle) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let removed = match kind {
            ResourceKind::Buffer => state.buffers.remove(&handle).map(|b| {
                if let Some(buffer) = b.buffer {
                    buffer.destroy();
                }
            }),
            ResourceKind::Texture => state.textures.remove(&handle).map(|t| {
                if let Some(texture) = t.texture {
                    texture.destroy();
                }
            }),
            ResourceKind::Program => state.programs.remove(&handle).map(drop),
        };
        if removed.is_none() {
            log::error!("release of {kind} {handle} that is not alive");
            return;
        }
        let bindings = &mut state.bindings;
        bindings.texture_slots.retain(|_, h| *h != handle);
        bindings.image_units.retain(|_, h| *h != handle);
        for slot in [
            &mut bindings.vertex_buffer,
            &mut bindings.index_buffer,
            &mut bindings.program,
        ] {
            if *slot == Some(handle) {
                *slot = None;
            }
        }
    }

    fn bind(&self, target: BindTarget, handle: Option<RawHandle>) {
        let mut state = self.state.borrow_mut();
        let bindings = &mut state.bindings;
        match target {
            BindTarget::VertexBuffer => bindings.vertex_buffer = handle,
            BindTarget::IndexBuffer => bindings.index_buffer = handle,
            BindTarget::Program => bindings.program = handle,
            BindTarget::TextureSlot(slot) => match handle {
                Some(h) => {
                    bindings.texture_slots.insert(slot, h);
                }
                None => {
                    bindings.texture_slots.remove(&slot);
                }
            },
        }
    }

    fn upload_buffer(&self, handle: RawHandle, role: BufferRole, usage: BufferUsage, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let Some(slot) = state.buffers.get_mut(&handle) else {
            log::warn!("upload to unknown buffer {handle}");
            return;
        };

        // Copies must be a multiple of four bytes.
        let mut contents = data.to_vec();
        contents.resize(data.len().next_multiple_of(4).max(4), 0);

        let fits = slot.role == role
            && slot
                .buffer
                .as_ref()
                .is_some_and(|b| b.size() >= contents.len() as u64);
        match slot.buffer.as_ref().filter(|_| fits) {
            Some(buffer) => self.queue.write_buffer(buffer, 0, &contents),
            None => {
                let role_usage = match role {
                    BufferRole::Vertex => wgpu::BufferUsages::VERTEX,
                    BufferRole::Index => wgpu::BufferUsages::INDEX,
                };
                let label = match usage {
                    BufferUsage::Static => "fractal static buffer",
                    BufferUsage::Dynamic => "fractal dynamic buffer",
                };
                let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: &contents,
                    usage: role_usage | wgpu::BufferUsages::COPY_DST,
                });
                if let Some(old) = slot.buffer.replace(buffer) {
                    old.destroy();
                }
                slot.role = role;
            }
        }
    }

    fn set_vertex_attributes(&self, stride: u32, attributes: &[VertexAttribute]) {
        self.state.borrow_mut().bindings.vertex_layout = Some((stride, attributes.to_vec()));
    }

    fn configure_texture(&self, handle: RawHandle, params: &TextureParams) {
        let format = texture_format(params.format.internal);
        let features = format.guaranteed_format_features(self.device.features());
        let filterable = features
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE);
        let storage = features
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING);

        let filter = if filterable {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let address_u = self.address_mode(params.wrap_s);
        let address_v = params
            .wrap_t
            .map_or(wgpu::AddressMode::ClampToEdge, |w| self.address_mode(w));
        let border = (address_u == wgpu::AddressMode::ClampToBorder
            || address_v == wgpu::AddressMode::ClampToBorder)
            .then_some(wgpu::SamplerBorderColor::TransparentBlack);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fractal texture sampler"),
            address_mode_u: address_u,
            address_mode_v: address_v,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            border_color: border,
            ..Default::default()
        });

        let mut state = self.state.borrow_mut();
        if let Some(slot) = state.textures.get_mut(&handle) {
            slot.params = Some(*params);
            slot.format = format;
            slot.filterable = filterable;
            slot.storage = storage;
            slot.sampler = Some(sampler);
        }
    }

    fn upload_texture(&self, handle: RawHandle, extent: TextureExtent, data: Option<&[u8]>) {
        let mut state = self.state.borrow_mut();
        let Some(slot) = state.textures.get_mut(&handle) else {
            log::warn!("upload to unknown texture {handle}");
            return;
        };
        let Some(params) = slot.params else {
            log::warn!("upload to unconfigured texture {handle}");
            return;
        };

        let limits = self.device.limits();
        let (dimension, extent, max) = match params.dimension {
            TextureDimension::D1 => (
                wgpu::TextureDimension::D1,
                TextureExtent::new(extent.width, 1),
                limits.max_texture_dimension_1d,
            ),
            TextureDimension::D2 => (
                wgpu::TextureDimension::D2,
                extent,
                limits.max_texture_dimension_2d,
            ),
        };
        if extent.width == 0 || extent.height == 0 || extent.width > max || extent.height > max {
            log::error!(
                "texture {handle}: extent {}x{} outside 1..={max}",
                extent.width,
                extent.height
            );
            return;
        }

        let size = wgpu::Extent3d {
            width: extent.width,
            height: extent.height,
            depth_or_array_layers: 1,
        };
        if slot.extent != Some(extent) || slot.texture.is_none() {
            let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
            if slot.storage {
                usage |= wgpu::TextureUsages::STORAGE_BINDING;
            }
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("fractal texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension,
                format: slot.format,
                usage,
                view_formats: &[],
            });
            slot.view = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
            if let Some(old) = slot.texture.replace(texture) {
                old.destroy();
            }
            slot.extent = Some(extent);
        }

        let (Some(data), Some(texture)) = (data, slot.texture.as_ref()) else {
            return;
        };
        let texels = extent.texels() as usize;
        let bytes: Cow<[u8]> = if params.format.external == ExternalFormat::Rgb {
            Cow::Owned(expand_rgb(data, texels))
        } else {
            let needed = texels * params.format.bytes_per_pixel() as usize;
            Cow::Borrowed(&data[..needed.min(data.len())])
        };
        let bytes_per_pixel = wgpu_bytes_per_pixel(params.format.internal);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(extent.width * bytes_per_pixel),
                rows_per_image: Some(extent.height),
            },
            size,
        );
    }

    fn bind_image_unit(&self, unit: u32, handle: RawHandle, format: InternalFormat) {
        let mut state = self.state.borrow_mut();
        let matches = state
            .textures
            .get(&handle)
            .is_some_and(|t| t.format == texture_format(format));
        if !matches {
            log::warn!("image unit {unit}: texture {handle} is not {format:?}");
        }
        state.bindings.image_units.insert(unit, handle);
    }

    fn compile_stage(&self, program: RawHandle, stage: ShaderStage, source: &str) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let slot = state
            .programs
            .get_mut(&program)
            .ok_or_else(|| format!("unknown program {program}"))?;
        match StageModule::parse(stage, source) {
            Ok(module) => {
                slot.stages.push(module);
                Ok(())
            }
            Err(info) => {
                slot.compile_failed = true;
                Err(info)
            }
        }
    }

    fn link_program(&self, program: RawHandle) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let slot = state
            .programs
            .get_mut(&program)
            .ok_or_else(|| format!("unknown program {program}"))?;
        if slot.compile_failed {
            return Err("one or more stages failed to compile".to_owned());
        }
        let interface = reflect::link(&slot.stages)?;

        slot.shaders = slot
            .stages
            .iter()
            .map(|stage| StageShader {
                stage: stage.stage,
                entry_point: stage.entry_point.clone(),
                module: self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("fractal shader module"),
                    source: wgpu::ShaderSource::Wgsl(Cow::Owned(stage.source.clone())),
                }),
            })
            .collect();

        if let Some(block) = interface.block {
            let size = u64::from(block.size).next_multiple_of(16);
            slot.block = vec![0; size as usize];
            slot.uniform_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("fractal uniform block"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        slot.pipeline = None;
        slot.interface = Some(interface);
        Ok(())
    }

    fn validate_program(&self, program: RawHandle) -> Result<(), String> {
        let state = self.state.borrow();
        let slot = state
            .programs
            .get(&program)
            .ok_or_else(|| format!("unknown program {program}"))?;
        let interface = slot.interface.as_ref().ok_or("program is not linked")?;
        self.resolve(&state, slot, interface).map(drop)
    }

    fn uniform_location(&self, program: RawHandle, name: &str) -> UniformLocation {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.interface.as_ref())
            .map_or(UniformLocation::NOT_FOUND, |i| i.locate(name))
    }

    fn set_uniform(&self, program: RawHandle, location: UniformLocation, value: UniformValue) {
        let mut state = self.state.borrow_mut();
        let Some(slot) = state.programs.get_mut(&program) else {
            return;
        };
        let (Some(index), Some(parameter)) = (
            location.index(),
            slot.interface.as_ref().and_then(|i| i.parameter(location)),
        ) else {
            return;
        };

        match parameter.kind {
            ParameterKind::Value { offset, ty } if ty == value.value_type() => {
                let bytes = value.to_bytes();
                let start = offset as usize;
                match slot.block.get_mut(start..start + bytes.len()) {
                    Some(dst) => dst.copy_from_slice(&bytes),
                    None => {
                        log::warn!("uniform `{}` lies outside its block", parameter.name);
                        return;
                    }
                }
            }
            ParameterKind::Value { .. } => {
                log::warn!(
                    "uniform `{}` cannot take {:?}; ignored",
                    parameter.name,
                    value.value_type()
                );
                return;
            }
            _ if value.as_slot().is_none() => {
                log::warn!("resource `{}` takes a slot index; ignored", parameter.name);
                return;
            }
            _ => {}
        }
        slot.values.insert(index, value);
    }

    fn workgroup_size(&self, program: RawHandle) -> Option<[u32; 3]> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|p| p.interface.as_ref())
            .and_then(|i| i.workgroup_size)
    }

    fn dispatch_compute(&self, groups: [u32; 3]) -> bool {
        let max = self.device.limits().max_compute_workgroups_per_dimension;
        if groups.iter().any(|g| *g == 0 || *g > max) {
            log::warn!("dispatch of {groups:?} groups outside 1..={max}");
            return false;
        }

        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(handle) = state.bindings.program else {
            log::warn!("dispatch without a bound program");
            return false;
        };

        let resolved = {
            let Some(program) = state.programs.get(&handle) else {
                return false;
            };
            let Some(interface) = program.interface.as_ref().filter(|i| i.is_compute()) else {
                log::warn!("dispatch without a linked compute program");
                return false;
            };
            match self.resolve(state, program, interface) {
                Ok(resolved) => resolved,
                Err(problem) => {
                    log::warn!("dispatch skipped: {problem}");
                    return false;
                }
            }
        };

        let Some(program) = state.programs.get_mut(&handle) else {
            return false;
        };
        let key = PipelineKey {
            entries: resolved.entries.clone(),
            vertex: None,
            target: None,
        };
        let Some((PipelineKind::Compute(pipeline), layout)) = self.ensure_pipeline(program, key) else {
            return false;
        };
        self.flush_uniforms(program);
        let bind_group = self.bind_group(&layout, &resolved.resources);

        let encoder = state.compute.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fractal compute encoder"),
            })
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fractal compute pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        true
    }

    fn memory_barrier(&self, barrier: MemoryBarrier) {
        let pending = self.state.borrow_mut().compute.take();
        if let Some(encoder) = pending {
            log::trace!("{barrier:?} barrier: submitting compute work");
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn clear(&self, color: [f32; 4]) {
        self.state.borrow_mut().clear = wgpu::Color {
            r: f64::from(color[0]),
            g: f64::from(color[1]),
            b: f64::from(color[2]),
            a: f64::from(color[3]),
        };
    }

    fn draw_indexed(&self, index_count: u32) -> bool {
        let target = self.surface_format();
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let buffer = |handle: Option<RawHandle>| {
            handle
                .and_then(|h| state.buffers.get(&h))
                .and_then(|b| b.buffer.clone())
        };
        let (Some(vertex), Some(index)) = (
            buffer(state.bindings.vertex_buffer),
            buffer(state.bindings.index_buffer),
        ) else {
            log::warn!("draw skipped: vertex or index buffer missing");
            return false;
        };
        if u64::from(index_count) * 4 > index.size() {
            log::warn!("draw of {index_count} indices exceeds the index buffer");
            return false;
        }
        let Some((stride, attributes)) = state.bindings.vertex_layout.clone() else {
            log::warn!("draw skipped: no vertex layout");
            return false;
        };
        let Some(handle) = state.bindings.program else {
            log::warn!("draw without a bound program");
            return false;
        };

        let (resolved, vertex_key) = {
            let Some(program) = state.programs.get(&handle) else {
                return false;
            };
            let Some(interface) = program.interface.as_ref().filter(|i| !i.is_compute()) else {
                log::warn!("draw without a linked graphics program");
                return false;
            };
            let attributes: Vec<wgpu::VertexAttribute> = attributes
                .iter()
                .filter_map(|a| {
                    vertex_format(a.element).map(|format| wgpu::VertexAttribute {
                        format,
                        offset: u64::from(a.offset),
                        shader_location: a.slot,
                    })
                })
                .collect();
            let covered = program.stages.iter().filter(|s| s.stage == ShaderStage::Vertex).all(|vs| {
                vs.input_locations
                    .iter()
                    .all(|loc| attributes.iter().any(|a| a.shader_location == *loc))
            });
            if !covered {
                log::warn!("draw skipped: vertex layout does not feed every shader input");
                return false;
            }
            match self.resolve(state, program, interface) {
                Ok(resolved) => (resolved, (u64::from(stride), attributes)),
                Err(problem) => {
                    log::warn!("draw skipped: {problem}");
                    return false;
                }
            }
        };

        let Some(program) = state.programs.get_mut(&handle) else {
            return false;
        };
        let key = PipelineKey {
            entries: resolved.entries.clone(),
            vertex: Some(vertex_key),
            target: Some(target),
        };
        let Some((PipelineKind::Render(pipeline), layout)) = self.ensure_pipeline(program, key) else {
            return false;
        };
        self.flush_uniforms(program);
        let bind_group = self.bind_group(&layout, &resolved.resources);

        state.draws.push(PendingDraw {
            pipeline,
            bind_group,
            vertex,
            index,
            count: index_count,
        });
        true
    }

    fn present(&self) {
        let (compute, draws, clear) = {
            let mut state = self.state.borrow_mut();
            (
                state.compute.take(),
                std::mem::take(&mut state.draws),
                state.clear,
            )
        };
        if let Some(encoder) = compute {
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        let mut gpu = self.gpu.borrow_mut();
        let size = gpu.size();
        if size.width == 0 || size.height == 0 {
            return;
        }

        let mut frame = match gpu.begin_frame() {
            Ok(frame) => frame,
            Err(err) => {
                match gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => {
                        log::error!("surface error is fatal");
                        self.surface_failed.set(true);
                    }
                    action => log::debug!("surface error handled: {action:?}"),
                }
                return;
            }
        };

        {
            let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("fractal present pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            for draw in &draws {
                pass.set_pipeline(&draw.pipeline);
                pass.set_bind_group(0, &draw.bind_group, &[]);
                pass.set_vertex_buffer(0, draw.vertex.slice(..));
                pass.set_index_buffer(draw.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.count, 0, 0..1);
            }
        }

        gpu.submit(frame);
    }
}

fn texture_format(format: InternalFormat) -> wgpu::TextureFormat {
    match format {
        InternalFormat::R8 => wgpu::TextureFormat::R8Unorm,
        InternalFormat::R32F => wgpu::TextureFormat::R32Float,
        InternalFormat::R8Ui => wgpu::TextureFormat::R8Uint,
        InternalFormat::Rgb8 | InternalFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        InternalFormat::Rgba32F => wgpu::TextureFormat::Rgba32Float,
    }
}

/// Bytes per texel once on the device; RGB8 is stored as RGBA8.
fn wgpu_bytes_per_pixel(format: InternalFormat) -> u32 {
    match format {
        InternalFormat::R8 | InternalFormat::R8Ui => 1,
        InternalFormat::R32F | InternalFormat::Rgb8 | InternalFormat::Rgba8 => 4,
        InternalFormat::Rgba32F => 16,
    }
}

fn expand_rgb(data: &[u8], texels: usize) -> Vec<u8> {
    data.chunks_exact(3)
        .take(texels)
        .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
        .collect()
}

fn vertex_format(element: VertexElement) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    Some(match (element.component_type, element.count, element.normalized) {
        (ComponentType::Float, 1, _) => F::Float32,
        (ComponentType::Float, 2, _) => F::Float32x2,
        (ComponentType::Float, 3, _) => F::Float32x3,
        (ComponentType::Float, 4, _) => F::Float32x4,
        (ComponentType::UnsignedInt, 1, _) => F::Uint32,
        (ComponentType::UnsignedInt, 2, _) => F::Uint32x2,
        (ComponentType::UnsignedInt, 3, _) => F::Uint32x3,
        (ComponentType::UnsignedInt, 4, _) => F::Uint32x4,
        (ComponentType::UnsignedByte, 2, false) => F::Uint8x2,
        (ComponentType::UnsignedByte, 4, false) => F::Uint8x4,
        (ComponentType::UnsignedByte, 2, true) => F::Unorm8x2,
        (ComponentType::UnsignedByte, 4, true) => F::Unorm8x4,
        _ => return None,
    })
}

fn visibility(stages: StageMask) -> wgpu::ShaderStages {
    let mut out = wgpu::ShaderStages::NONE;
    if stages.vertex {
        out |= wgpu::ShaderStages::VERTEX;
    }
    if stages.fragment {
        out |= wgpu::ShaderStages::FRAGMENT;
    }
    if stages.compute {
        out |= wgpu::ShaderStages::COMPUTE;
    }
    out
}

fn view_dimension(shape: TextureShape) -> Option<wgpu::TextureViewDimension> {
    match shape {
        TextureShape::D1 => Some(wgpu::TextureViewDimension::D1),
        TextureShape::D2 => Some(wgpu::TextureViewDimension::D2),
        TextureShape::Unsupported => None,
    }
}

fn texture_view_dimension(texture: &TextureSlot) -> wgpu::TextureViewDimension {
    match texture.params.map(|p| p.dimension) {
        Some(TextureDimension::D1) => wgpu::TextureViewDimension::D1,
        _ => wgpu::TextureViewDimension::D2,
    }
}

fn sample_matches(ty: wgpu::TextureSampleType, kind: SampleKind) -> bool {
    matches!(
        (ty, kind),
        (wgpu::TextureSampleType::Float { .. }, SampleKind::Float)
            | (wgpu::TextureSampleType::Sint, SampleKind::Sint)
            | (wgpu::TextureSampleType::Uint, SampleKind::Uint)
    )
}

fn storage_access(access: ImageAccess) -> wgpu::StorageTextureAccess {
    match access {
        ImageAccess::Read => wgpu::StorageTextureAccess::ReadOnly,
        ImageAccess::Write => wgpu::StorageTextureAccess::WriteOnly,
        ImageAccess::ReadWrite => wgpu::StorageTextureAccess::ReadWrite,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_rows_gain_opaque_alpha() {
        let expanded = expand_rgb(&[1, 2, 3, 4, 5, 6], 2);
        assert_eq!(expanded, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn device_formats_cover_every_internal_format() {
        assert_eq!(texture_format(InternalFormat::R32F), wgpu::TextureFormat::R32Float);
        assert_eq!(texture_format(InternalFormat::Rgb8), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(wgpu_bytes_per_pixel(InternalFormat::Rgb8), 4);
        assert_eq!(wgpu_bytes_per_pixel(InternalFormat::Rgba32F), 16);
    }

    #[test]
    fn vertex_formats_follow_layout_elements() {
        let uv = VertexElement {
            component_type: ComponentType::Float,
            count: 2,
            normalized: false,
        };
        assert_eq!(vertex_format(uv), Some(wgpu::VertexFormat::Float32x2));

        let color = VertexElement {
            component_type: ComponentType::UnsignedByte,
            count: 4,
            normalized: true,
        };
        assert_eq!(vertex_format(color), Some(wgpu::VertexFormat::Unorm8x4));

        let odd = VertexElement {
            component_type: ComponentType::Unknown(7),
            count: 1,
            normalized: false,
        };
        assert_eq!(vertex_format(odd), None);
    }
}
