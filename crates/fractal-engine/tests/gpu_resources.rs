use std::rc::Rc;

use fractal_engine::gpu::{
    BufferUsage, ComponentType, ComputeProgram, GeometryBinding, GraphicsContext, GraphicsProgram, HeadlessBackend,
    IndexBuffer, InternalFormat, PixelFormat, ProgramState, ResourceKind, Texture, TextureDimension, UniformLocation,
    UniformValue, VertexBuffer, VertexLayout, WrapPolicy,
};

const KERNEL: &str = "
struct Params {
    u_range_rect: vec4<f32>,
    u_iteration: i32,
};
@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var u_image: texture_storage_2d<r32float, write>;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let v = f32(params.u_iteration) * params.u_range_rect.x;
    textureStore(u_image, vec2<i32>(id.xy), vec4<f32>(v, 0.0, 0.0, 1.0));
}
";

const FLAT_VS: &str = "
struct Xform { u_mvp: mat4x4<f32> };
@group(0) @binding(0) var<uniform> xform: Xform;
@vertex
fn vs(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return xform.u_mvp * vec4<f32>(position, 0.0, 1.0);
}
";

const FLAT_FS: &str = "
@fragment
fn fs() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}
";

fn headless() -> (Rc<HeadlessBackend>, GraphicsContext) {
    let backend = Rc::new(HeadlessBackend::new());
    let ctx = GraphicsContext::new(backend.clone());
    (backend, ctx)
}

// ── programs ─────────────────────────────────────────────────────────────────

#[test]
fn uniform_location_is_resolved_once() {
    let (backend, ctx) = headless();
    let mut program = ComputeProgram::new(&ctx, KERNEL).unwrap();
    assert_eq!(program.state(), ProgramState::Linked);

    let first = program.uniform_location("u_iteration");
    let second = program.uniform_location("u_iteration");
    assert!(first.is_found());
    assert_eq!(first, second);

    program.set_uniform_1i("u_iteration", 64);
    program.set_uniform_1i("u_iteration", 65);
    assert_eq!(backend.uniform_lookups(program.handle(), "u_iteration"), 1);
    assert_eq!(
        backend.uniform_value(program.handle(), "u_iteration"),
        Some(UniformValue::Int(65))
    );
}

#[test]
fn missing_uniform_yields_sentinel_and_one_lookup() {
    let (backend, ctx) = headless();
    let mut program = ComputeProgram::new(&ctx, KERNEL).unwrap();

    assert_eq!(program.uniform_location("u_zoom"), UniformLocation::NOT_FOUND);
    program.set_uniform_1f("u_zoom", 2.0);
    program.set_uniform_1f("u_zoom", 3.0);
    assert_eq!(backend.uniform_lookups(program.handle(), "u_zoom"), 1);
}

#[test]
fn mismatched_value_type_is_ignored() {
    let (backend, ctx) = headless();
    let mut program = ComputeProgram::new(&ctx, KERNEL).unwrap();
    program.set_uniform_1f("u_iteration", 1.5);
    assert_eq!(backend.uniform_value(program.handle(), "u_iteration"), None);
}

#[test]
fn compile_failure_leaves_a_failed_program() {
    let (backend, ctx) = headless();
    let program = GraphicsProgram::new(&ctx, "fn broken(", FLAT_FS).unwrap();
    assert_eq!(program.state(), ProgramState::Failed);
    assert!(!program.is_valid());
    assert_eq!(backend.live_count_of(ResourceKind::Program), 1);
}

#[test]
fn workgroup_size_comes_from_the_kernel() {
    let (_backend, ctx) = headless();
    let program = ComputeProgram::new(&ctx, KERNEL).unwrap();
    assert_eq!(program.workgroup_size(), Some([8, 8, 1]));
}

#[test]
fn dispatch_needs_the_image_unit_bound() {
    let (backend, ctx) = headless();
    let mut program = ComputeProgram::new(&ctx, KERNEL).unwrap();
    program.set_uniform_1i("u_image", 0);
    assert!(!program.dispatch([1, 1, 1]));

    let mut target = Texture::new(&ctx, TextureDimension::D2, PixelFormat::R32F, WrapPolicy::Repeat).unwrap();
    target.update_pixel_data_2d(8, 8, None);
    assert!(target.bind_to_image_unit(0));
    program.validate();
    assert_eq!(program.state(), ProgramState::Validated);
    assert!(program.dispatch([1, 1, 1]));
    assert_eq!(backend.dispatch_count(), 1);
}

// ── textures ─────────────────────────────────────────────────────────────────

#[test]
fn byte_formats_never_reach_an_image_unit() {
    let (backend, ctx) = headless();
    for format in [PixelFormat::Rgb8, PixelFormat::Rgba8] {
        let mut texture = Texture::new(&ctx, TextureDimension::D2, format, WrapPolicy::ClampToBorder).unwrap();
        texture.update_pixel_data_2d(4, 4, None);
        assert!(!texture.bind_to_image_unit(3));
        assert_eq!(backend.image_unit(3), None);
    }

    let mut field = Texture::new(&ctx, TextureDimension::D2, PixelFormat::R32F, WrapPolicy::Repeat).unwrap();
    field.update_pixel_data_2d(4, 4, None);
    assert!(field.bind_to_image_unit(3));
    assert_eq!(backend.image_unit(3), Some((field.handle(), InternalFormat::R32F)));
}

#[test]
fn short_upload_is_dropped() {
    let (backend, ctx) = headless();
    let mut colormap =
        Texture::new(&ctx, TextureDimension::D1, PixelFormat::Rgb8, WrapPolicy::ClampToBorder).unwrap();
    colormap.update_pixel_data_1d(4, Some(&[0u8; 6]));
    assert!(!colormap.is_valid());
    assert_eq!(backend.texture_extent(colormap.handle()), None);

    colormap.update_pixel_data_1d(2, Some(&[1, 2, 3, 4, 5, 6]));
    assert!(colormap.is_valid());
    assert_eq!(backend.texture_data(colormap.handle()), Some(vec![1, 2, 3, 4, 5, 6]));
}

#[test]
fn texture_params_follow_the_pixel_format() {
    let (backend, ctx) = headless();
    let texture = Texture::new(&ctx, TextureDimension::D1, PixelFormat::Rgb8, WrapPolicy::ClampToBorder).unwrap();
    let params = backend.texture_params(texture.handle()).unwrap();
    assert_eq!(params.format, PixelFormat::Rgb8.derive());
    assert_eq!(params.wrap_s, WrapPolicy::ClampToBorder);
    assert_eq!(params.wrap_t, None);
}

// ── geometry ─────────────────────────────────────────────────────────────────

#[test]
fn geometry_draws_and_releases_both_buffers() {
    let (backend, ctx) = headless();
    let mut layout = VertexLayout::new();
    layout.push(ComponentType::Float, 2);

    let positions: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    {
        let vertices = VertexBuffer::with_data(&ctx, BufferUsage::Static, &positions).unwrap();
        let indices = IndexBuffer::with_indices(&ctx, BufferUsage::Static, &[0, 1, 2]).unwrap();
        let geometry = GeometryBinding::new(vertices, &layout, indices);
        assert_eq!(geometry.stride(), 8);

        let program = GraphicsProgram::new(&ctx, FLAT_VS, FLAT_FS).unwrap();
        assert!(program.is_valid());
        assert!(program.draw(&geometry));
        assert_eq!(backend.live_count_of(ResourceKind::Buffer), 2);
    }
    assert_eq!(backend.live_count(), 0);
    assert_eq!(backend.invalid_release_count(), 0);
}

#[test]
fn draw_without_position_attribute_is_skipped() {
    let (backend, ctx) = headless();
    let vertices = VertexBuffer::with_data(&ctx, BufferUsage::Static, &[0.0f32; 6]).unwrap();
    let indices = IndexBuffer::with_indices(&ctx, BufferUsage::Static, &[0, 1, 2]).unwrap();
    let geometry = GeometryBinding::new(vertices, &VertexLayout::new(), indices);

    let program = GraphicsProgram::new(&ctx, FLAT_VS, FLAT_FS).unwrap();
    assert!(!program.draw(&geometry));
    assert!(backend.calls().is_empty());
}
