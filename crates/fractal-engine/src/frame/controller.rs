use crate::gpu::{
    ComputeProgram, GeometryBinding, GraphicsContext, GraphicsProgram, MemoryBarrier, PixelFormat,
    ResourceAllocationError, ShaderSourceProvider, Texture, TextureDimension, WrapPolicy,
};
use crate::navigation::{NavigationInput, NavigationState};
use crate::time::{FrameClock, FrameStats, FrameTime};
use crate::window::WindowBackend;

use super::config::FrameConfig;
use super::overlay::{Overlay, OverlaySnapshot};
use super::quad::{build_quad, fitted_quad_vertices, pixel_projection};

/// Step of the per-frame sequence the controller is in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FramePhase {
    Idle,
    MaybeCompute,
    Present,
    PollInput,
}

/// What one call to [`FrameController::frame`] did.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameReport {
    pub dispatched: bool,
    pub navigation_changed: bool,
    pub close_requested: bool,
}

/// Drives the compute-then-render frame.
///
/// Each frame optionally recomputes the field texture (only when navigation
/// changed, unless lazy mode is off), draws it through the colormap onto a
/// full-framebuffer quad, lets the overlay run, presents, and finally polls
/// input for the next frame.
pub struct FrameController {
    ctx: GraphicsContext,
    config: FrameConfig,

    field: Texture,
    colormap: Texture,
    compute: ComputeProgram,
    graphics: GraphicsProgram,
    quad: GeometryBinding,

    navigation: NavigationInput,
    needs_recompute: bool,
    lazy_mode: bool,
    phase: FramePhase,

    groups: [u32; 3],
    field_aspect: f64,
    framebuffer: (u32, u32),
    stats: FrameStats,
    dispatches: u64,
    reported_invalid_compute: bool,
}

impl FrameController {
    /// Allocates every GPU object of the frame and wires programs to them.
    ///
    /// Only allocation failures are errors. Shader problems leave the
    /// programs in a failed state; the frame then draws or computes nothing.
    pub fn new(
        ctx: &GraphicsContext,
        provider: &dyn ShaderSourceProvider,
        config: FrameConfig,
        framebuffer: (u32, u32),
    ) -> Result<Self, ResourceAllocationError> {
        let (fb_w, fb_h) = framebuffer;
        let (tex_w, tex_h) = config.texture_extent(fb_w, fb_h);
        let field_aspect = f64::from(tex_w) / f64::from(tex_h);
        let quad = build_quad(ctx, &fitted_quad_vertices(fb_w as f32, fb_h as f32, field_aspect as f32))?;

        let mut field = Texture::new(ctx, TextureDimension::D2, PixelFormat::R32F, WrapPolicy::Repeat)?;
        field.bind(config.field_slot);
        field.update_pixel_data_2d(tex_w, tex_h, None);
        field.bind_to_image_unit(config.field_image_unit);

        let mut colormap = Texture::new(ctx, TextureDimension::D1, PixelFormat::Rgb8, WrapPolicy::ClampToBorder)?;
        colormap.bind(config.colormap_slot);
        let colors: Vec<u8> = config.colormap.iter().flatten().copied().collect();
        colormap.update_pixel_data_1d(config.colormap.len() as u32, Some(&colors));

        let shaders = &config.shaders;
        let mut graphics = GraphicsProgram::load(ctx, provider, &shaders.vertex, &shaders.fragment)?;
        graphics.bind();
        graphics.set_uniform_1i("u_field", config.field_slot as i32);
        graphics.set_uniform_1i("u_field_sampler", config.field_slot as i32);
        graphics.set_uniform_1i("u_colormap", config.colormap_slot as i32);
        graphics.set_uniform_1i("u_colormap_sampler", config.colormap_slot as i32);
        graphics.set_uniform_mat4("u_mvp", &pixel_projection(fb_w as f32, fb_h as f32));

        let mut compute = ComputeProgram::load(ctx, provider, &shaders.compute)?;
        compute.bind();
        compute.set_uniform_1i("u_image", config.field_image_unit as i32);

        let local = config.local_size.max(1);
        if let Some(declared) = compute.workgroup_size() {
            if declared != [local, local, 1] {
                log::warn!("kernel declares workgroup size {declared:?}, dispatching for {local}x{local}");
            }
        }
        let groups = [tex_w.div_ceil(local), tex_h.div_ceil(local), 1];

        compute.validate();
        graphics.validate();

        log::info!(
            "frame ready: field {tex_w}x{tex_h}, {} colormap entries, {groups:?} groups",
            config.colormap.len()
        );

        let navigation = NavigationInput::new(config.initial_state(), config.limits);
        let lazy_mode = config.lazy_mode;

        Ok(Self {
            ctx: ctx.clone(),
            config,
            field,
            colormap,
            compute,
            graphics,
            quad,
            navigation,
            needs_recompute: true,
            lazy_mode,
            phase: FramePhase::Idle,
            groups,
            field_aspect,
            framebuffer,
            stats: FrameStats::new(),
            dispatches: 0,
            reported_invalid_compute: false,
        })
    }

    /// Runs frames until the window asks to close; returns how many ran.
    pub fn run(&mut self, window: &mut dyn WindowBackend, overlay: &mut dyn Overlay, clock: &mut FrameClock) -> u64 {
        let mut frames = 0;
        while !window.should_close() {
            self.frame(window, overlay, clock.tick());
            frames += 1;
        }
        frames
    }

    /// One pass of MaybeCompute → Present → PollInput.
    pub fn frame(&mut self, window: &mut dyn WindowBackend, overlay: &mut dyn Overlay, time: FrameTime) -> FrameReport {
        self.stats.record(time.dt);

        self.phase = FramePhase::MaybeCompute;
        let dispatched = self.maybe_compute();

        self.phase = FramePhase::Present;
        self.present(window, overlay, time.dt);

        self.phase = FramePhase::PollInput;
        let (navigation_changed, close_requested) = self.poll_input(window, overlay, time.dt);

        self.phase = FramePhase::Idle;
        FrameReport {
            dispatched,
            navigation_changed,
            close_requested,
        }
    }

    fn maybe_compute(&mut self) -> bool {
        if !self.needs_recompute && self.lazy_mode {
            return false;
        }
        if !self.compute.is_valid() {
            if !self.reported_invalid_compute {
                log::error!("{}: compute program is not usable; field not updated", self.compute.label());
                self.reported_invalid_compute = true;
            }
            return false;
        }

        let state = *self.navigation.state();
        let [x, y, w, h] = state.range_rect(self.field_aspect);
        self.compute.bind();
        self.compute.set_uniform_4f("u_range_rect", x, y, w, h);
        self.compute
            .set_uniform_1i("u_iteration", i32::try_from(state.iteration_budget()).unwrap_or(i32::MAX));

        if !self.compute.dispatch(self.groups) {
            return false;
        }
        self.needs_recompute = false;
        self.dispatches += 1;
        self.ctx.memory_barrier(MemoryBarrier::TextureFetch);
        true
    }

    fn present(&mut self, window: &mut dyn WindowBackend, overlay: &mut dyn Overlay, dt: f64) {
        self.ctx.clear(self.config.clear_color);
        self.graphics.draw(&self.quad);

        let snapshot = self.snapshot(dt);
        let mut lazy_mode = self.lazy_mode;
        overlay.draw(&snapshot, &mut lazy_mode);
        self.set_lazy_mode(lazy_mode);

        window.present();
        self.ctx.present();
    }

    fn poll_input(&mut self, window: &mut dyn WindowBackend, overlay: &mut dyn Overlay, dt: f64) -> (bool, bool) {
        window.poll_events();
        let events = window.drain_input();
        for event in &events {
            overlay.handle_input(event);
        }

        let update = self.navigation.process(&events, dt);
        if update.needs_recompute() {
            self.needs_recompute = true;
        }

        if let Some((width, height)) = window.take_resize() {
            self.resize(width, height);
        }

        if update.close_requested {
            log::info!("close requested from keyboard");
            window.request_close();
        }
        (update.changed, update.close_requested)
    }

    /// Refits the quad and projection to a new framebuffer size.
    ///
    /// The field texture keeps its size and aspect, so this never forces a
    /// recompute. The quad is letterboxed to that aspect instead of stretched.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.framebuffer {
            return;
        }
        self.quad.update_vertices(&fitted_quad_vertices(
            width as f32,
            height as f32,
            self.field_aspect as f32,
        ));
        self.graphics.bind();
        self.graphics
            .set_uniform_mat4("u_mvp", &pixel_projection(width as f32, height as f32));
        self.framebuffer = (width, height);
        log::debug!("framebuffer resized to {width}x{height}");
    }

    pub fn snapshot(&self, frame_delta_seconds: f64) -> OverlaySnapshot {
        let state = self.navigation.state();
        OverlaySnapshot {
            center: state.center(),
            half_range: state.half_range(),
            iteration_budget: state.iteration_budget(),
            lazy_mode_enabled: self.lazy_mode,
            frame_delta_seconds,
            frames_per_second: self.stats.frames_per_second(),
        }
    }

    pub fn set_lazy_mode(&mut self, enabled: bool) {
        if enabled != self.lazy_mode {
            log::info!("lazy mode {}", if enabled { "on" } else { "off" });
            self.lazy_mode = enabled;
        }
    }

    #[inline]
    pub fn lazy_mode(&self) -> bool {
        self.lazy_mode
    }

    #[inline]
    pub fn needs_recompute(&self) -> bool {
        self.needs_recompute
    }

    #[inline]
    pub fn navigation(&self) -> &NavigationState {
        self.navigation.state()
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Successful compute dispatches so far.
    #[inline]
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    #[inline]
    pub fn groups(&self) -> [u32; 3] {
        self.groups
    }

    #[inline]
    pub fn framebuffer(&self) -> (u32, u32) {
        self.framebuffer
    }

    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[inline]
    pub fn quad(&self) -> &GeometryBinding {
        &self.quad
    }

    #[inline]
    pub fn field_texture(&self) -> &Texture {
        &self.field
    }

    #[inline]
    pub fn colormap_texture(&self) -> &Texture {
        &self.colormap
    }

    #[inline]
    pub fn compute_program(&self) -> &ComputeProgram {
        &self.compute
    }

    #[inline]
    pub fn graphics_program(&self) -> &GraphicsProgram {
        &self.graphics
    }
}
