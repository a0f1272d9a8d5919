//! WGSL reflection shared by the backends.
//!
//! A program's parameters are discovered from its stage modules:
//! - members of the single `var<uniform>` struct become value parameters,
//!   addressed by byte offset into the program's uniform block
//! - texture, storage-texture and sampler globals become resource parameters;
//!   writing an integer to one selects the texture slot or image unit it reads
//!
//! Only bind group 0 is used.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{
    AddressSpace, ImageClass, ImageDimension, ScalarKind, StorageAccess, StorageFormat, TypeInner, VectorSize,
};

use super::backend::{ShaderStage, UniformLocation, ValueType};
use super::texture::InternalFormat;

/// A parsed and validated single-stage WGSL module.
#[derive(Debug, Clone)]
pub struct StageModule {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub workgroup_size: [u32; 3],
    /// `@location` indices the entry point reads as stage inputs.
    pub input_locations: Vec<u32>,
    pub source: String,
    module: naga::Module,
}

impl StageModule {
    /// Parses `source`, validates it and locates its unique entry point for `stage`.
    ///
    /// The error string is the diagnostic to surface as the compile log.
    pub fn parse(stage: ShaderStage, source: &str) -> Result<Self, String> {
        if source.trim().is_empty() {
            return Err(format!("empty {stage} shader source"));
        }

        let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
        Validator::new(ValidationFlags::all(), Capabilities::empty())
            .validate(&module)
            .map_err(|e| e.emit_to_string(source))?;

        let mut entries = module
            .entry_points
            .iter()
            .filter(|ep| stage_matches(stage, ep.stage));
        let entry = entries
            .next()
            .ok_or_else(|| format!("no {stage} entry point"))?;
        if entries.next().is_some() {
            return Err(format!("more than one {stage} entry point"));
        }
        let entry_point = entry.name.clone();
        let workgroup_size = entry.workgroup_size;
        let input_locations = input_locations(&module, entry);

        Ok(Self {
            stage,
            entry_point,
            workgroup_size,
            input_locations,
            source: source.to_owned(),
            module,
        })
    }
}

fn input_locations(module: &naga::Module, entry: &naga::EntryPoint) -> Vec<u32> {
    let mut locations = Vec::new();
    for argument in &entry.function.arguments {
        match &argument.binding {
            Some(naga::Binding::Location { location, .. }) => locations.push(*location),
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                if let TypeInner::Struct { members, .. } = &module.types[argument.ty].inner {
                    locations.extend(members.iter().filter_map(|m| match &m.binding {
                        Some(naga::Binding::Location { location, .. }) => Some(*location),
                        _ => None,
                    }));
                }
            }
        }
    }
    locations.sort_unstable();
    locations
}

fn stage_matches(stage: ShaderStage, naga_stage: naga::ShaderStage) -> bool {
    matches!(
        (stage, naga_stage),
        (ShaderStage::Vertex, naga::ShaderStage::Vertex)
            | (ShaderStage::Fragment, naga::ShaderStage::Fragment)
            | (ShaderStage::Compute, naga::ShaderStage::Compute)
    )
}

/// Set of stages a parameter is visible to.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct StageMask {
    pub vertex: bool,
    pub fragment: bool,
    pub compute: bool,
}

impl StageMask {
    pub fn of(stage: ShaderStage) -> Self {
        let mut mask = Self::default();
        mask.insert(stage);
        mask
    }

    pub fn insert(&mut self, stage: ShaderStage) {
        match stage {
            ShaderStage::Vertex => self.vertex = true,
            ShaderStage::Fragment => self.fragment = true,
            ShaderStage::Compute => self.compute = true,
        }
    }

    fn union(self, other: Self) -> Self {
        Self {
            vertex: self.vertex || other.vertex,
            fragment: self.fragment || other.fragment,
            compute: self.compute || other.compute,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureShape {
    D1,
    D2,
    Unsupported,
}

/// Scalar type a sampled texture returns.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SampleKind {
    Float,
    Sint,
    Uint,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ImageAccess {
    Read,
    Write,
    ReadWrite,
}

/// What a named parameter addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ParameterKind {
    /// Member of the uniform block at `offset` bytes.
    Value { offset: u32, ty: ValueType },
    /// `texture_1d`/`texture_2d`; reads the texture bound on the selected slot.
    SampledTexture {
        binding: u32,
        shape: TextureShape,
        sample: SampleKind,
    },
    /// `texture_storage_*`; writes the texture bound on the selected image unit.
    ///
    /// `format` is `None` when the declared texel format has no [`InternalFormat`].
    StorageTexture {
        binding: u32,
        shape: TextureShape,
        format: Option<InternalFormat>,
        access: ImageAccess,
    },
    /// Uses the sampler of the texture bound on the selected slot.
    Sampler { binding: u32 },
}

impl ParameterKind {
    pub fn binding(&self) -> Option<u32> {
        match *self {
            ParameterKind::Value { .. } => None,
            ParameterKind::SampledTexture { binding, .. }
            | ParameterKind::StorageTexture { binding, .. }
            | ParameterKind::Sampler { binding } => Some(binding),
        }
    }

    #[inline]
    pub fn is_resource(&self) -> bool {
        self.binding().is_some()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub stages: StageMask,
}

/// The program's `var<uniform>` struct.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniformBlock {
    pub binding: u32,
    pub size: u32,
    pub stages: StageMask,
}

/// Linked view of every stage's parameters.
#[derive(Debug, Clone, Default)]
pub struct ProgramInterface {
    pub parameters: Vec<Parameter>,
    pub block: Option<UniformBlock>,
    pub workgroup_size: Option<[u32; 3]>,
}

impl ProgramInterface {
    /// Location of `name`, or [`UniformLocation::NOT_FOUND`].
    pub fn locate(&self, name: &str) -> UniformLocation {
        self.parameters
            .iter()
            .position(|p| p.name == name)
            .map_or(UniformLocation::NOT_FOUND, |i| UniformLocation::new(i as i32))
    }

    pub fn parameter(&self, location: UniformLocation) -> Option<&Parameter> {
        location.index().and_then(|i| self.parameters.get(i))
    }

    pub fn is_compute(&self) -> bool {
        self.workgroup_size.is_some()
    }

    pub fn resources(&self) -> impl Iterator<Item = (usize, &Parameter)> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind.is_resource())
    }
}

/// Merges the stage modules of one program.
///
/// Accepts exactly one compute stage, or one vertex plus one fragment stage.
/// Names shared between stages must describe the same parameter.
pub fn link(stages: &[StageModule]) -> Result<ProgramInterface, String> {
    let has = |s: ShaderStage| stages.iter().filter(|m| m.stage == s).count();
    let (vertex, fragment, compute) = (
        has(ShaderStage::Vertex),
        has(ShaderStage::Fragment),
        has(ShaderStage::Compute),
    );
    let workgroup_size = match (vertex, fragment, compute) {
        (0, 0, 1) => stages
            .iter()
            .find(|m| m.stage == ShaderStage::Compute)
            .map(|m| m.workgroup_size),
        (1, 1, 0) => None,
        _ => {
            return Err(format!(
                "unsupported stage combination: {vertex} vertex, {fragment} fragment, {compute} compute"
            ));
        }
    };

    let mut interface = ProgramInterface {
        workgroup_size,
        ..ProgramInterface::default()
    };
    for stage in stages {
        collect_stage(stage, &mut interface)?;
    }

    let mut bindings: Vec<(u32, &str)> = interface
        .parameters
        .iter()
        .filter_map(|p| p.kind.binding().map(|b| (b, p.name.as_str())))
        .collect();
    if let Some(block) = interface.block {
        bindings.push((block.binding, "uniform block"));
    }
    bindings.sort_unstable();
    for pair in bindings.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(format!(
                "`{}` and `{}` share binding {}",
                pair[0].1, pair[1].1, pair[0].0
            ));
        }
    }

    Ok(interface)
}

fn collect_stage(stage: &StageModule, interface: &mut ProgramInterface) -> Result<(), String> {
    let module = &stage.module;
    let mask = StageMask::of(stage.stage);

    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        let name = var.name.clone().unwrap_or_default();
        if binding.group != 0 {
            return Err(format!("`{name}` uses bind group {}; only group 0 is supported", binding.group));
        }

        let inner = &module.types[var.ty].inner;
        match var.space {
            AddressSpace::Uniform => {
                let TypeInner::Struct { members, span } = inner else {
                    return Err(format!("uniform `{name}` must be a struct"));
                };
                merge_block(
                    interface,
                    UniformBlock {
                        binding: binding.binding,
                        size: *span,
                        stages: mask,
                    },
                )?;
                for member in members {
                    let Some(member_name) = &member.name else {
                        continue;
                    };
                    let ty = value_type(&module.types[member.ty].inner);
                    merge_parameter(
                        interface,
                        Parameter {
                            name: member_name.clone(),
                            kind: ParameterKind::Value {
                                offset: member.offset,
                                ty,
                            },
                            stages: mask,
                        },
                    )?;
                }
            }
            AddressSpace::Handle => {
                let kind = match inner {
                    TypeInner::Image { dim, arrayed, class } => {
                        let shape = if *arrayed { TextureShape::Unsupported } else { texture_shape(*dim) };
                        match *class {
                            ImageClass::Sampled { kind, multi: false } => ParameterKind::SampledTexture {
                                binding: binding.binding,
                                shape,
                                sample: match kind {
                                    ScalarKind::Sint => SampleKind::Sint,
                                    ScalarKind::Uint => SampleKind::Uint,
                                    _ => SampleKind::Float,
                                },
                            },
                            ImageClass::Storage { format, access } => ParameterKind::StorageTexture {
                                binding: binding.binding,
                                shape,
                                format: storage_format(format),
                                access: match (
                                    access.contains(StorageAccess::LOAD),
                                    access.contains(StorageAccess::STORE),
                                ) {
                                    (true, true) => ImageAccess::ReadWrite,
                                    (true, false) => ImageAccess::Read,
                                    _ => ImageAccess::Write,
                                },
                            },
                            _ => return Err(format!("texture `{name}` has an unsupported class")),
                        }
                    }
                    TypeInner::Sampler { comparison: false } => ParameterKind::Sampler {
                        binding: binding.binding,
                    },
                    _ => return Err(format!("resource `{name}` has an unsupported type")),
                };
                merge_parameter(
                    interface,
                    Parameter {
                        name,
                        kind,
                        stages: mask,
                    },
                )?;
            }
            _ => return Err(format!("`{name}` uses an unsupported address space")),
        }
    }
    Ok(())
}

fn merge_block(interface: &mut ProgramInterface, block: UniformBlock) -> Result<(), String> {
    match &mut interface.block {
        Some(existing) if existing.binding == block.binding && existing.size == block.size => {
            existing.stages = existing.stages.union(block.stages);
            Ok(())
        }
        Some(existing) => Err(format!(
            "conflicting uniform blocks at bindings {} and {}",
            existing.binding, block.binding
        )),
        None => {
            interface.block = Some(block);
            Ok(())
        }
    }
}

fn merge_parameter(interface: &mut ProgramInterface, parameter: Parameter) -> Result<(), String> {
    match interface.parameters.iter_mut().find(|p| p.name == parameter.name) {
        Some(existing) if existing.kind == parameter.kind => {
            existing.stages = existing.stages.union(parameter.stages);
            Ok(())
        }
        Some(_) => Err(format!("`{}` is declared differently across stages", parameter.name)),
        None => {
            interface.parameters.push(parameter);
            Ok(())
        }
    }
}

fn storage_format(format: StorageFormat) -> Option<InternalFormat> {
    match format {
        StorageFormat::R8Unorm => Some(InternalFormat::R8),
        StorageFormat::R8Uint => Some(InternalFormat::R8Ui),
        StorageFormat::R32Float => Some(InternalFormat::R32F),
        StorageFormat::Rgba8Unorm => Some(InternalFormat::Rgba8),
        StorageFormat::Rgba32Float => Some(InternalFormat::Rgba32F),
        _ => None,
    }
}

fn texture_shape(dim: ImageDimension) -> TextureShape {
    match dim {
        ImageDimension::D1 => TextureShape::D1,
        ImageDimension::D2 => TextureShape::D2,
        _ => TextureShape::Unsupported,
    }
}

fn value_type(inner: &TypeInner) -> ValueType {
    match *inner {
        TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
            ScalarKind::Sint => ValueType::Int,
            ScalarKind::Uint => ValueType::Uint,
            ScalarKind::Float => ValueType::Float,
            _ => ValueType::Unsupported,
        },
        TypeInner::Vector { size, scalar } if scalar.width == 4 => match (size, scalar.kind) {
            (VectorSize::Bi, ScalarKind::Sint) => ValueType::Int2,
            (VectorSize::Bi, ScalarKind::Float) => ValueType::Float2,
            (VectorSize::Quad, ScalarKind::Float) => ValueType::Float4,
            _ => ValueType::Unsupported,
        },
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar.kind == ScalarKind::Float && scalar.width == 4 => ValueType::Mat4,
        _ => ValueType::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPUTE: &str = r#"
struct Params {
    u_range_rect: vec4<f32>,
    u_iteration: i32,
};
@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var u_image: texture_storage_2d<r32float, write>;

@compute @workgroup_size(8, 4, 1)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    textureStore(u_image, vec2<i32>(id.xy), vec4<f32>(params.u_range_rect.x, 0.0, 0.0, 1.0));
}
"#;

    #[test]
    fn compute_interface_lists_members_and_image() {
        let stage = StageModule::parse(ShaderStage::Compute, COMPUTE).expect("valid module");
        let interface = link(&[stage]).expect("links");

        assert_eq!(interface.workgroup_size, Some([8, 4, 1]));
        assert_eq!(interface.block.map(|b| b.binding), Some(0));

        let rect = interface.parameter(interface.locate("u_range_rect")).expect("rect");
        assert_eq!(
            rect.kind,
            ParameterKind::Value {
                offset: 0,
                ty: ValueType::Float4
            }
        );
        let iteration = interface.parameter(interface.locate("u_iteration")).expect("iteration");
        assert_eq!(
            iteration.kind,
            ParameterKind::Value {
                offset: 16,
                ty: ValueType::Int
            }
        );
        let image = interface.parameter(interface.locate("u_image")).expect("image");
        assert_eq!(
            image.kind,
            ParameterKind::StorageTexture {
                binding: 1,
                shape: TextureShape::D2,
                format: Some(InternalFormat::R32F),
                access: ImageAccess::Write,
            }
        );
        assert_eq!(interface.locate("missing"), UniformLocation::NOT_FOUND);
    }

    #[test]
    fn syntax_error_reports_diagnostic() {
        let err = StageModule::parse(ShaderStage::Compute, "fn broken( {").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn empty_source_is_rejected() {
        let err = StageModule::parse(ShaderStage::Vertex, "  \n").unwrap_err();
        assert!(err.contains("empty"));
    }

    #[test]
    fn wrong_stage_has_no_entry_point() {
        let err = StageModule::parse(ShaderStage::Vertex, COMPUTE).unwrap_err();
        assert!(err.contains("no vertex entry point"));
    }

    #[test]
    fn two_compute_stages_do_not_link() {
        let compute = StageModule::parse(ShaderStage::Compute, COMPUTE).expect("valid module");
        let err = link(&[compute.clone(), compute]).unwrap_err();
        assert!(err.contains("unsupported stage combination"));
    }
}
