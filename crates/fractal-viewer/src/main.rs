mod cli;
mod overlay;
mod shaders;

use std::rc::Rc;

use anyhow::{Context, Result};
use fractal_engine::device::GpuInit;
use fractal_engine::frame::{FrameConfig, FrameController};
use fractal_engine::gpu::{FileShaderSource, GraphicsContext, HeadlessBackend, ShaderSourceProvider};
use fractal_engine::input::{InputEvent, Key, KeyAction};
use fractal_engine::logging::{LoggingConfig, init_logging};
use fractal_engine::time::{FrameClock, FrameTime};
use fractal_engine::window::{ScriptedWindow, WindowBackend, WindowConfig, WinitWindow};
use winit::dpi::LogicalSize;

use crate::cli::Cli;
use crate::overlay::TitleOverlay;

fn main() -> Result<()> {
    let cli = cli::parse();
    init_logging(LoggingConfig {
        env_filter: cli.log.clone(),
        ..LoggingConfig::default()
    });

    let provider: Box<dyn ShaderSourceProvider> = match &cli.shader_dir {
        Some(dir) => {
            log::info!("loading shaders from {}", dir.display());
            Box::new(FileShaderSource::new(dir))
        }
        None => Box::new(shaders::embedded()),
    };

    let config = cli.frame_config();
    match cli.headless_frames {
        Some(frames) => run_headless(&cli, config, provider.as_ref(), frames),
        None => run_windowed(&cli, config, provider.as_ref()),
    }
}

fn run_windowed(cli: &Cli, config: FrameConfig, provider: &dyn ShaderSourceProvider) -> Result<()> {
    let (width, height) = cli.size;
    let mut window = WinitWindow::new(WindowConfig {
        initial_size: LogicalSize::new(f64::from(width), f64::from(height)),
        ..WindowConfig::default()
    })?;
    let backend = window.create_backend(GpuInit::default())?;
    let ctx = GraphicsContext::new(backend);

    let mut controller = FrameController::new(&ctx, provider, config, window.framebuffer_size())
        .context("failed to allocate frame resources")?;
    let mut overlay = TitleOverlay::new(window.window());
    let mut clock = FrameClock::new();

    let frames = controller.run(&mut window, &mut overlay, &mut clock);
    log::info!(
        "exiting after {frames} frames ({} field recomputes)",
        controller.dispatch_count()
    );
    Ok(())
}

/// Drives the frame against the recording backend with a short scripted pan,
/// then reports what happened. Fails when a shader did not build.
fn run_headless(cli: &Cli, config: FrameConfig, provider: &dyn ShaderSourceProvider, frames: u64) -> Result<()> {
    let backend = Rc::new(HeadlessBackend::new());
    let ctx = GraphicsContext::new(backend.clone());

    let (width, height) = cli.size;
    let mut window = ScriptedWindow::new(width, height);
    window.push_batch([InputEvent::key(Key::ArrowRight, KeyAction::Press)]);
    window.push_batch([InputEvent::key(Key::ArrowRight, KeyAction::Release)]);

    let mut controller = FrameController::new(&ctx, provider, config, window.framebuffer_size())
        .context("failed to allocate frame resources")?;
    let mut overlay = TitleOverlay::new(None);

    let dt = 1.0 / 60.0;
    let mut ran = 0;
    while ran < frames && !window.should_close() {
        controller.frame(&mut window, &mut overlay, FrameTime::fixed(dt, ran));
        ran += 1;
    }

    let view = controller.navigation();
    log::info!(
        "headless: {ran} frames, {} dispatches, {} presents, center ({:.5}, {:.5})",
        backend.dispatch_count(),
        window.present_count(),
        view.center().x,
        view.center().y
    );
    if !overlay.last_line().is_empty() {
        log::info!("{}", overlay.last_line());
    }

    anyhow::ensure!(
        controller.compute_program().is_valid(),
        "compute program failed to build"
    );
    anyhow::ensure!(
        controller.graphics_program().is_valid(),
        "graphics program failed to build"
    );
    Ok(())
}
