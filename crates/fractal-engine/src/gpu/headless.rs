//! In-memory backend.
//!
//! Keeps every object in handle tables, compiles and reflects WGSL with naga
//! exactly like the device backend, and records the frame-level calls it
//! receives. Used by tests and by the viewer's `--headless-frames` mode.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use super::backend::{
    Backend, BindTarget, BufferRole, BufferUsage, MemoryBarrier, RawHandle, ResourceKind, ShaderStage,
    TextureExtent, UniformLocation, UniformValue,
};
use super::error::ResourceAllocationError;
use super::layout::VertexAttribute;
use super::reflect::{self, ParameterKind, ProgramInterface, StageModule};
use super::texture::{InternalFormat, TextureParams};

/// Most recent calls kept by the log; older ones are dropped.
pub const CALL_LOG_LIMIT: usize = 4096;

/// Frame-level operation observed by the headless backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Dispatch([u32; 3]),
    Barrier(MemoryBarrier),
    Clear([f32; 4]),
    Draw { index_count: u32 },
    Present,
}

#[derive(Debug, Clone)]
struct BufferRecord {
    role: BufferRole,
    usage: BufferUsage,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct TextureRecord {
    params: Option<TextureParams>,
    extent: Option<TextureExtent>,
    data: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    stages: Vec<StageModule>,
    compile_failed: bool,
    interface: Option<ProgramInterface>,
    values: HashMap<usize, UniformValue>,
}

impl ProgramRecord {
    fn slot_of(&self, index: usize) -> u32 {
        self.values.get(&index).and_then(UniformValue::as_slot).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct State {
    next_handle: u32,
    live: HashMap<RawHandle, ResourceKind>,
    released: usize,
    invalid_releases: usize,

    buffers: HashMap<RawHandle, BufferRecord>,
    textures: HashMap<RawHandle, TextureRecord>,
    programs: HashMap<RawHandle, ProgramRecord>,
    lookups: HashMap<(RawHandle, String), usize>,

    vertex_buffer: Option<RawHandle>,
    index_buffer: Option<RawHandle>,
    program: Option<RawHandle>,
    texture_slots: HashMap<u32, RawHandle>,
    image_units: HashMap<u32, (RawHandle, InternalFormat)>,
    vertex_layout: Option<(u32, Vec<VertexAttribute>)>,

    calls: VecDeque<Call>,
    dispatches: usize,
}

impl State {
    fn record(&mut self, call: Call) {
        if matches!(call, Call::Dispatch(_)) {
            self.dispatches += 1;
        }
        if self.calls.len() == CALL_LOG_LIMIT {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }
}

/// Backend with no device behind it.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: RefCell<State>,
    allocation_limit: Option<usize>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses allocations once `limit` objects are alive.
    pub fn with_allocation_limit(limit: usize) -> Self {
        Self {
            state: RefCell::default(),
            allocation_limit: Some(limit),
        }
    }

    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn live_count_of(&self, kind: ResourceKind) -> usize {
        self.state.borrow().live.values().filter(|k| **k == kind).count()
    }

    pub fn released_count(&self) -> usize {
        self.state.borrow().released
    }

    /// Releases of handles that were not alive (double release or foreign).
    pub fn invalid_release_count(&self) -> usize {
        self.state.borrow().invalid_releases
    }

    /// The last [`CALL_LOG_LIMIT`] calls, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.iter().cloned().collect()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        self.state.borrow_mut().calls.drain(..).collect()
    }

    /// Dispatches issued since creation, including ones no longer in the log.
    pub fn dispatch_count(&self) -> usize {
        self.state.borrow().dispatches
    }

    /// Number of backend lookups issued for `name` on `program`.
    pub fn uniform_lookups(&self, program: RawHandle, name: &str) -> usize {
        self.state
            .borrow()
            .lookups
            .get(&(program, name.to_owned()))
            .copied()
            .unwrap_or(0)
    }

    /// Last value written to `name`, without counting as a lookup.
    pub fn uniform_value(&self, program: RawHandle, name: &str) -> Option<UniformValue> {
        let state = self.state.borrow();
        let record = state.programs.get(&program)?;
        let index = record.interface.as_ref()?.locate(name).index()?;
        record.values.get(&index).copied()
    }

    pub fn image_unit(&self, unit: u32) -> Option<(RawHandle, InternalFormat)> {
        self.state.borrow().image_units.get(&unit).copied()
    }

    pub fn texture_slot(&self, slot: u32) -> Option<RawHandle> {
        self.state.borrow().texture_slots.get(&slot).copied()
    }

    pub fn texture_extent(&self, handle: RawHandle) -> Option<TextureExtent> {
        self.state.borrow().textures.get(&handle).and_then(|t| t.extent)
    }

    pub fn texture_data(&self, handle: RawHandle) -> Option<Vec<u8>> {
        self.state.borrow().textures.get(&handle).and_then(|t| t.data.clone())
    }

    pub fn texture_params(&self, handle: RawHandle) -> Option<TextureParams> {
        self.state.borrow().textures.get(&handle).and_then(|t| t.params)
    }

    pub fn buffer_bytes(&self, handle: RawHandle) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&handle).map(|b| b.bytes.clone())
    }

    pub fn buffer_role(&self, handle: RawHandle) -> Option<BufferRole> {
        self.state.borrow().buffers.get(&handle).map(|b| b.role)
    }

    pub fn buffer_usage(&self, handle: RawHandle) -> Option<BufferUsage> {
        self.state.borrow().buffers.get(&handle).map(|b| b.usage)
    }

    pub fn bound_program(&self) -> Option<RawHandle> {
        self.state.borrow().program
    }

    pub fn vertex_layout(&self) -> Option<(u32, Vec<VertexAttribute>)> {
        self.state.borrow().vertex_layout.clone()
    }

    /// Binding problems of the bound program, joined; `None` when it can run.
    fn bound_problems(state: &State) -> Option<String> {
        let record = state.program.and_then(|p| state.programs.get(&p))?;
        let interface = record.interface.as_ref()?;
        let problems = Self::binding_problems(state, record, interface);
        (!problems.is_empty()).then(|| problems.join("; "))
    }

    fn binding_problems(state: &State, record: &ProgramRecord, interface: &ProgramInterface) -> Vec<String> {
        let mut problems = Vec::new();
        for (index, parameter) in interface.resources() {
            let slot = record.slot_of(index);
            let problem = match parameter.kind {
                ParameterKind::SampledTexture { .. } | ParameterKind::Sampler { .. } => {
                    (!state.texture_slots.contains_key(&slot)).then(|| format!("texture slot {slot} is empty"))
                }
                ParameterKind::StorageTexture { format, .. } => match state.image_units.get(&slot) {
                    None => Some(format!("image unit {slot} is empty")),
                    Some((_, bound)) if format.is_some_and(|declared| declared != *bound) => {
                        Some(format!("image unit {slot} holds {bound:?}, shader declares {format:?}"))
                    }
                    Some(_) => None,
                },
                ParameterKind::Value { .. } => None,
            };
            if let Some(problem) = problem {
                problems.push(format!("`{}`: {problem}", parameter.name));
            }
        }
        problems
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create(&self, kind: ResourceKind) -> Result<RawHandle, ResourceAllocationError> {
        let mut state = self.state.borrow_mut();
        if let Some(limit) = self.allocation_limit.filter(|limit| state.live.len() >= *limit) {
            return Err(ResourceAllocationError::Refused {
                kind,
                reason: format!("allocation limit of {limit} reached"),
            });
        }
        state.next_handle += 1;
        let handle =
            RawHandle::from_raw(state.next_handle).ok_or(ResourceAllocationError::Exhausted { kind })?;
        state.live.insert(handle, kind);
        match kind {
            ResourceKind::Buffer => {
                state.buffers.insert(
                    handle,
                    BufferRecord {
                        role: BufferRole::Vertex,
                        usage: BufferUsage::Static,
                        bytes: Vec::new(),
                    },
                );
            }
            ResourceKind::Texture => {
                state.textures.insert(
                    handle,
                    TextureRecord {
                        params: None,
                        extent: None,
                        data: None,
                    },
                );
            }
            ResourceKind::Program => {
                state.programs.insert(handle, ProgramRecord::default());
            }
        }
        Ok(handle)
    }

    fn release(&self, kind: ResourceKind, handle: RawHandle) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.live.remove(&handle) != Some(kind) {
            log::error!("release of {kind} {handle} that is not alive");
            state.invalid_releases += 1;
            return;
        }
        state.released += 1;
        state.buffers.remove(&handle);
        state.textures.remove(&handle);
        state.programs.remove(&handle);
        state.texture_slots.retain(|_, h| *h != handle);
        state.image_units.retain(|_, (h, _)| *h != handle);
        for slot in [&mut state.vertex_buffer, &mut state.index_buffer, &mut state.program] {
            if *slot == Some(handle) {
                *slot = None;
            }
        }
    }

    fn bind(&self, target: BindTarget, handle: Option<RawHandle>) {
        let mut state = self.state.borrow_mut();
        match target {
            BindTarget::VertexBuffer => state.vertex_buffer = handle,
            BindTarget::IndexBuffer => state.index_buffer = handle,
            BindTarget::Program => state.program = handle,
            BindTarget::TextureSlot(slot) => match handle {
                Some(h) => {
                    state.texture_slots.insert(slot, h);
                }
                None => {
                    state.texture_slots.remove(&slot);
                }
            },
        }
    }

    fn upload_buffer(&self, handle: RawHandle, role: BufferRole, usage: BufferUsage, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        match state.buffers.get_mut(&handle) {
            Some(record) => {
                record.role = role;
                record.usage = usage;
                record.bytes = data.to_vec();
            }
            None => log::warn!("upload to unknown buffer {handle}"),
        }
    }

    fn set_vertex_attributes(&self, stride: u32, attributes: &[VertexAttribute]) {
        self.state.borrow_mut().vertex_layout = Some((stride, attributes.to_vec()));
    }

    fn configure_texture(&self, handle: RawHandle, params: &TextureParams) {
        if let Some(record) = self.state.borrow_mut().textures.get_mut(&handle) {
            record.params = Some(*params);
        }
    }

    fn upload_texture(&self, handle: RawHandle, extent: TextureExtent, data: Option<&[u8]>) {
        if let Some(record) = self.state.borrow_mut().textures.get_mut(&handle) {
            record.extent = Some(extent);
            record.data = data.map(<[u8]>::to_vec);
        }
    }

    fn bind_image_unit(&self, unit: u32, handle: RawHandle, format: InternalFormat) {
        self.state.borrow_mut().image_units.insert(unit, (handle, format));
    }

    fn compile_stage(&self, program: RawHandle, stage: ShaderStage, source: &str) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let record = state
            .programs
            .get_mut(&program)
            .ok_or_else(|| format!("unknown program {program}"))?;
        match StageModule::parse(stage, source) {
            Ok(module) => {
                record.stages.push(module);
                Ok(())
            }
            Err(info) => {
                record.compile_failed = true;
                Err(info)
            }
        }
    }

    fn link_program(&self, program: RawHandle) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let record = state
            .programs
            .get_mut(&program)
            .ok_or_else(|| format!("unknown program {program}"))?;
        if record.compile_failed {
            return Err("one or more stages failed to compile".to_owned());
        }
        record.interface = Some(reflect::link(&record.stages)?);
        Ok(())
    }

    fn validate_program(&self, program: RawHandle) -> Result<(), String> {
        let state = self.state.borrow();
        let record = state
            .programs
            .get(&program)
            .ok_or_else(|| format!("unknown program {program}"))?;
        let interface = record.interface.as_ref().ok_or("program is not linked")?;
        let problems = Self::binding_problems(&state, record, interface);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    fn uniform_location(&self, program: RawHandle, name: &str) -> UniformLocation {
        let mut state = self.state.borrow_mut();
        *state.lookups.entry((program, name.to_owned())).or_default() += 1;
        state
            .programs
            .get(&program)
            .and_then(|r| r.interface.as_ref())
            .map_or(UniformLocation::NOT_FOUND, |i| i.locate(name))
    }

    fn set_uniform(&self, program: RawHandle, location: UniformLocation, value: UniformValue) {
        let mut state = self.state.borrow_mut();
        let Some(record) = state.programs.get_mut(&program) else {
            return;
        };
        let Some(index) = location.index() else {
            return;
        };
        let Some(parameter) = record.interface.as_ref().and_then(|i| i.parameter(location)) else {
            return;
        };
        let accepted = match parameter.kind {
            ParameterKind::Value { ty, .. } => ty == value.value_type(),
            _ => value.as_slot().is_some(),
        };
        if !accepted {
            log::warn!(
                "uniform `{}` cannot take {:?}; ignored",
                parameter.name,
                value.value_type()
            );
            return;
        }
        record.values.insert(index, value);
    }

    fn workgroup_size(&self, program: RawHandle) -> Option<[u32; 3]> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .and_then(|r| r.interface.as_ref())
            .and_then(|i| i.workgroup_size)
    }

    fn dispatch_compute(&self, groups: [u32; 3]) -> bool {
        let mut state = self.state.borrow_mut();
        let linked = state
            .program
            .and_then(|p| state.programs.get(&p))
            .and_then(|r| r.interface.as_ref())
            .is_some_and(ProgramInterface::is_compute);
        if !linked {
            log::warn!("dispatch without a linked compute program");
            return false;
        }
        if let Some(problems) = Self::bound_problems(&state) {
            log::warn!("dispatch skipped: {problems}");
            return false;
        }
        state.record(Call::Dispatch(groups));
        true
    }

    fn memory_barrier(&self, barrier: MemoryBarrier) {
        self.state.borrow_mut().record(Call::Barrier(barrier));
    }

    fn clear(&self, color: [f32; 4]) {
        self.state.borrow_mut().record(Call::Clear(color));
    }

    fn draw_indexed(&self, index_count: u32) -> bool {
        let mut state = self.state.borrow_mut();
        let linked = state
            .program
            .and_then(|p| state.programs.get(&p))
            .and_then(|r| r.interface.as_ref())
            .is_some_and(|i| !i.is_compute());
        let available = state
            .index_buffer
            .and_then(|h| state.buffers.get(&h))
            .map_or(0, |b| b.bytes.len() / 4) as u32;
        let inputs_covered = state
            .program
            .and_then(|p| state.programs.get(&p))
            .and_then(|r| r.stages.iter().find(|s| s.stage == ShaderStage::Vertex))
            .is_some_and(|vs| {
                let provided = state.vertex_layout.as_ref().map_or(&[][..], |(_, a)| a.as_slice());
                vs.input_locations
                    .iter()
                    .all(|loc| provided.iter().any(|a| a.slot == *loc))
            });
        if !linked || !inputs_covered || state.vertex_buffer.is_none() || index_count > available {
            log::warn!("draw of {index_count} indices skipped: incomplete pipeline state");
            return false;
        }
        if let Some(problems) = Self::bound_problems(&state) {
            log::warn!("draw skipped: {problems}");
            return false;
        }
        state.record(Call::Draw { index_count });
        true
    }

    fn present(&self) {
        self.state.borrow_mut().record(Call::Present);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::gpu::{GpuResource, GraphicsContext};

    #[test]
    fn drop_releases_exactly_once() {
        let backend = Rc::new(HeadlessBackend::new());
        let ctx = GraphicsContext::new(backend.clone());

        {
            let _a = GpuResource::new(&ctx, ResourceKind::Buffer).unwrap();
            let _b = GpuResource::new(&ctx, ResourceKind::Texture).unwrap();
            assert_eq!(backend.live_count(), 2);
        }

        assert_eq!(backend.live_count(), 0);
        assert_eq!(backend.released_count(), 2);
        assert_eq!(backend.invalid_release_count(), 0);
    }

    #[test]
    fn moved_resource_releases_once() {
        let backend = Rc::new(HeadlessBackend::new());
        let ctx = GraphicsContext::new(backend.clone());

        let original = GpuResource::new(&ctx, ResourceKind::Program).unwrap();
        let handle = original.handle();
        let moved = original;
        assert_eq!(moved.handle(), handle);
        drop(moved);

        assert_eq!(backend.released_count(), 1);
        assert_eq!(backend.invalid_release_count(), 0);
    }

    #[test]
    fn allocation_limit_is_fatal_error() {
        let backend = Rc::new(HeadlessBackend::with_allocation_limit(1));
        let ctx = GraphicsContext::new(backend.clone());

        let _held = GpuResource::new(&ctx, ResourceKind::Buffer).unwrap();
        let err = GpuResource::new(&ctx, ResourceKind::Texture).unwrap_err();
        assert_eq!(err.kind(), ResourceKind::Texture);
    }

    #[test]
    fn call_log_keeps_only_the_latest_calls() {
        let backend = Rc::new(HeadlessBackend::new());
        let ctx = GraphicsContext::new(backend.clone());

        for _ in 0..CALL_LOG_LIMIT {
            ctx.clear([0.0; 4]);
        }
        ctx.present();

        let calls = backend.calls();
        assert_eq!(calls.len(), CALL_LOG_LIMIT);
        assert_eq!(calls.last(), Some(&Call::Present));
        assert_eq!(backend.take_calls().len(), CALL_LOG_LIMIT);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn release_clears_bindings() {
        let backend = Rc::new(HeadlessBackend::new());
        let ctx = GraphicsContext::new(backend.clone());

        let texture = GpuResource::new(&ctx, ResourceKind::Texture).unwrap();
        texture.bind(BindTarget::TextureSlot(3));
        assert_eq!(backend.texture_slot(3), Some(texture.handle()));
        drop(texture);
        assert_eq!(backend.texture_slot(3), None);
    }
}
