use std::rc::Rc;

use fractal_engine::frame::{
    FrameConfig, FrameController, NoOverlay, Overlay, OverlaySnapshot, QUAD_INDICES, QuadVertex,
};
use fractal_engine::gpu::{
    Call, EmbeddedShaderSource, GraphicsContext, HeadlessBackend, MemoryBarrier, ShaderSourceProvider, UniformValue,
};
use fractal_engine::input::{InputEvent, Key, KeyAction};
use fractal_engine::time::FrameTime;
use fractal_engine::window::{ScriptedWindow, WindowBackend};

const KERNEL: &str = include_str!("../../fractal-viewer/shaders/mandelbrot.wgsl");
const QUAD_VS: &str = include_str!("../../fractal-viewer/shaders/quad_vs.wgsl");
const QUAD_FS: &str = include_str!("../../fractal-viewer/shaders/quad_fs.wgsl");

const DT: f64 = 0.5;

fn shaders() -> EmbeddedShaderSource {
    EmbeddedShaderSource::new()
        .with("mandelbrot.wgsl", KERNEL)
        .with("quad_vs.wgsl", QUAD_VS)
        .with("quad_fs.wgsl", QUAD_FS)
}

fn small_config() -> FrameConfig {
    FrameConfig {
        texture_width: 64,
        ..FrameConfig::default()
    }
}

struct Rig {
    backend: Rc<HeadlessBackend>,
    _ctx: GraphicsContext,
    window: ScriptedWindow,
    controller: FrameController,
    frames: u64,
}

impl Rig {
    fn with(config: FrameConfig, provider: &dyn ShaderSourceProvider) -> Self {
        let backend = Rc::new(HeadlessBackend::new());
        let ctx = GraphicsContext::new(backend.clone());
        let window = ScriptedWindow::new(64, 32);
        let controller = FrameController::new(&ctx, provider, config, window.framebuffer_size()).unwrap();
        Self {
            backend,
            _ctx: ctx,
            window,
            controller,
            frames: 0,
        }
    }

    fn new() -> Self {
        Self::with(small_config(), &shaders())
    }

    fn frame(&mut self) {
        self.frame_with(&mut NoOverlay);
    }

    fn frame_with(&mut self, overlay: &mut dyn Overlay) {
        self.controller
            .frame(&mut self.window, overlay, FrameTime::fixed(DT, self.frames));
        self.frames += 1;
    }
}

// ── setup ────────────────────────────────────────────────────────────────────

#[test]
fn shipped_shaders_build_and_validate() {
    let rig = Rig::new();
    assert!(rig.controller.compute_program().is_valid());
    assert!(rig.controller.graphics_program().is_valid());
    assert_eq!(rig.controller.compute_program().workgroup_size(), Some([16, 16, 1]));
    assert_eq!(rig.controller.groups(), [4, 2, 1]);
}

#[test]
fn setup_failure_releases_everything_already_allocated() {
    let full = Rig::new();
    let needed = full.backend.live_count();
    assert!(needed > 0);

    for limit in 0..needed {
        let backend = Rc::new(HeadlessBackend::with_allocation_limit(limit));
        let ctx = GraphicsContext::new(backend.clone());
        let result = FrameController::new(&ctx, &shaders(), small_config(), (64, 32));
        assert!(result.is_err(), "limit {limit} should not be enough");
        assert_eq!(backend.live_count(), 0, "leak with limit {limit}");
        assert_eq!(backend.invalid_release_count(), 0);
    }
}

#[test]
fn dropping_the_controller_releases_each_object_once() {
    let mut rig = Rig::new();
    rig.frame();
    let created = rig.backend.live_count();

    let Rig { backend, controller, .. } = rig;
    drop(controller);

    assert_eq!(backend.live_count(), 0);
    assert_eq!(backend.released_count(), created);
    assert_eq!(backend.invalid_release_count(), 0);
}

// ── lazy recompute ───────────────────────────────────────────────────────────

#[test]
fn lazy_mode_computes_once_without_input() {
    let mut rig = Rig::new();
    for _ in 0..4 {
        rig.frame();
    }
    assert_eq!(rig.backend.dispatch_count(), 1);
    assert_eq!(rig.controller.dispatch_count(), 1);
    assert!(!rig.controller.needs_recompute());
    assert_eq!(rig.window.present_count(), 4);
}

#[test]
fn eager_mode_computes_every_frame() {
    let config = FrameConfig {
        lazy_mode: false,
        ..small_config()
    };
    let mut rig = Rig::with(config, &shaders());
    for _ in 0..3 {
        rig.frame();
    }
    assert_eq!(rig.backend.dispatch_count(), 3);
}

#[test]
fn first_frame_orders_dispatch_barrier_then_draw() {
    let mut rig = Rig::new();
    rig.frame();

    let groups = rig.controller.groups();
    assert_eq!(
        rig.backend.take_calls(),
        vec![
            Call::Dispatch(groups),
            Call::Barrier(MemoryBarrier::TextureFetch),
            Call::Clear([0.0, 0.0, 0.0, 1.0]),
            Call::Draw {
                index_count: QUAD_INDICES.len() as u32
            },
            Call::Present,
        ]
    );

    rig.frame();
    assert_eq!(
        rig.backend.take_calls(),
        vec![
            Call::Clear([0.0, 0.0, 0.0, 1.0]),
            Call::Draw {
                index_count: QUAD_INDICES.len() as u32
            },
            Call::Present,
        ]
    );
}

#[test]
fn pan_recomputes_with_the_new_range() {
    let mut rig = Rig::new();
    rig.window
        .push_batch([InputEvent::key(Key::ArrowRight, KeyAction::Press)]);
    rig.window
        .push_batch([InputEvent::key(Key::ArrowRight, KeyAction::Release)]);

    // Frame 0 computes the initial view; its poll sees the press.
    rig.frame();
    assert!(rig.controller.needs_recompute());
    assert_eq!(rig.controller.navigation().center().x, 0.75);

    // Frame 1 recomputes; its poll sees the release, which asks for one more.
    rig.frame();
    assert_eq!(rig.backend.dispatch_count(), 2);
    assert!(rig.controller.needs_recompute());

    rig.frame();
    rig.frame();
    assert_eq!(rig.backend.dispatch_count(), 3);
    assert!(!rig.controller.needs_recompute());

    let compute = rig.controller.compute_program().handle();
    assert_eq!(
        rig.backend.uniform_value(compute, "u_range_rect"),
        Some(UniformValue::Float4([-1.25, -1.0, 4.0, 2.0]))
    );
    assert_eq!(
        rig.backend.uniform_value(compute, "u_iteration"),
        Some(UniformValue::Int(256))
    );
}

#[test]
fn every_key_transition_requests_a_recompute() {
    let mut rig = Rig::new();
    rig.window
        .push_batch([InputEvent::key(Key::Shift, KeyAction::Press)]);
    rig.window
        .push_batch([InputEvent::key(Key::Shift, KeyAction::Release)]);
    rig.window
        .push_batch([InputEvent::key(Key::ArrowRight, KeyAction::Release)]);

    for _ in 0..5 {
        rig.frame();
    }
    assert_eq!(rig.controller.navigation().center().x, -0.25);
    assert_eq!(rig.backend.dispatch_count(), 4);
    assert!(!rig.controller.needs_recompute());
}

#[test]
fn key_repeat_does_not_request_a_recompute() {
    let mut rig = Rig::new();
    rig.window
        .push_batch([InputEvent::key(Key::Shift, KeyAction::Repeat)]);
    for _ in 0..3 {
        rig.frame();
    }
    assert_eq!(rig.backend.dispatch_count(), 1);
}

#[test]
fn uniform_locations_are_looked_up_once() {
    let config = FrameConfig {
        lazy_mode: false,
        ..small_config()
    };
    let mut rig = Rig::with(config, &shaders());
    for _ in 0..5 {
        rig.frame();
    }
    let compute = rig.controller.compute_program().handle();
    assert_eq!(rig.backend.uniform_lookups(compute, "u_range_rect"), 1);
    assert_eq!(rig.backend.uniform_lookups(compute, "u_iteration"), 1);
}

// ── failure paths ────────────────────────────────────────────────────────────

#[test]
fn broken_kernel_never_dispatches_but_still_draws() {
    let provider = shaders().with("mandelbrot.wgsl", "@compute fn main( {");
    let mut rig = Rig::with(small_config(), &provider);
    assert!(!rig.controller.compute_program().is_valid());

    rig.frame();
    rig.frame();

    assert_eq!(rig.backend.dispatch_count(), 0);
    assert!(rig.controller.needs_recompute());
    let calls = rig.backend.calls();
    assert!(!calls.iter().any(|c| matches!(c, Call::Barrier(_))));
    assert_eq!(calls.iter().filter(|c| matches!(c, Call::Draw { .. })).count(), 2);
}

#[test]
fn missing_shader_file_leaves_program_failed() {
    let provider = EmbeddedShaderSource::new().with("mandelbrot.wgsl", KERNEL);
    let mut rig = Rig::with(small_config(), &provider);
    assert!(!rig.controller.graphics_program().is_valid());
    assert!(rig.controller.compute_program().is_valid());

    rig.frame();
    let calls = rig.backend.calls();
    assert!(calls.contains(&Call::Dispatch(rig.controller.groups())));
    assert!(!calls.iter().any(|c| matches!(c, Call::Draw { .. })));
    assert!(calls.contains(&Call::Present));
}

// ── window interaction ───────────────────────────────────────────────────────

#[test]
fn escape_asks_the_window_to_close() {
    let mut rig = Rig::new();
    rig.window
        .push_batch([InputEvent::key(Key::Escape, KeyAction::Press)]);
    rig.frame();
    assert!(rig.window.close_requested());
    assert!(rig.window.should_close());
}

#[test]
fn resize_refits_the_quad_without_recompute() {
    let mut rig = Rig::new();
    rig.window.push_resize(128, 96);
    rig.frame();
    rig.frame();

    assert_eq!(rig.controller.framebuffer(), (128, 96));
    assert_eq!(rig.backend.dispatch_count(), 1);
    let extent = rig.controller.field_texture().extent().unwrap();
    assert_eq!((extent.width, extent.height), (64, 32));
}

fn quad_positions(rig: &Rig) -> Vec<[f32; 2]> {
    let handle = rig.controller.quad().vertex_buffer().handle();
    let bytes = rig.backend.buffer_bytes(handle).unwrap();
    bytes
        .chunks_exact(size_of::<QuadVertex>())
        .map(|chunk| bytemuck::pod_read_unaligned::<QuadVertex>(chunk).position)
        .collect()
}

#[test]
fn resize_keeps_the_field_aspect() {
    let mut rig = Rig::new();
    assert_eq!(
        quad_positions(&rig),
        vec![[0.0, 0.0], [64.0, 0.0], [64.0, 32.0], [0.0, 32.0]]
    );

    // Field is 2:1, so a 128×96 window gets bars above and below.
    rig.window.push_resize(128, 96);
    rig.frame();
    assert_eq!(
        quad_positions(&rig),
        vec![[0.0, 16.0], [128.0, 16.0], [128.0, 80.0], [0.0, 80.0]]
    );

    // A 128×32 window gets bars on the sides.
    rig.window.push_resize(128, 32);
    rig.frame();
    rig.frame();
    assert_eq!(
        quad_positions(&rig),
        vec![[32.0, 0.0], [96.0, 0.0], [96.0, 32.0], [32.0, 32.0]]
    );
    assert_eq!(rig.backend.dispatch_count(), 1);
}

struct TurnLazyOff;

impl Overlay for TurnLazyOff {
    fn draw(&mut self, snapshot: &OverlaySnapshot, lazy_mode: &mut bool) {
        assert_eq!(snapshot.lazy_mode_enabled, *lazy_mode);
        *lazy_mode = false;
    }
}

#[test]
fn overlay_can_switch_lazy_mode_off() {
    let mut rig = Rig::new();
    let mut overlay = TurnLazyOff;
    rig.frame_with(&mut overlay);
    assert!(!rig.controller.lazy_mode());

    rig.frame_with(&mut overlay);
    rig.frame_with(&mut overlay);
    assert_eq!(rig.backend.dispatch_count(), 3);
}
