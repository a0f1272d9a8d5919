use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::device::{Gpu, GpuInit, WgpuBackend};
use crate::input::platform::winit::{map_modifiers, translate_window_event};
use crate::input::{InputEvent, Modifiers};

use super::WindowBackend;

/// Polls allowed for the platform to deliver `resumed` and create the window.
const STARTUP_PUMPS: usize = 100;

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "fractal explorer".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            resizable: true,
        }
    }
}

struct Handler {
    config: WindowConfig,
    window: Option<Arc<Window>>,
    backend: Option<Rc<WgpuBackend>>,
    modifiers: Modifiers,
    events: Vec<InputEvent>,
    resize: Option<PhysicalSize<u32>>,
    close_requested: bool,
    exited: bool,
    error: Option<anyhow::Error>,
}

impl Handler {
    fn resized(&mut self, size: PhysicalSize<u32>) {
        if let Some(backend) = &self.backend {
            backend.resize(size);
        }
        self.resize = Some(size);
    }
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size)
            .with_resizable(self.config.resizable);

        match event_loop.create_window(attrs) {
            Ok(window) => {
                event_loop.set_control_flow(ControlFlow::Poll);
                log::info!("window created: {:?}", window.inner_size());
                self.window = Some(Arc::new(window));
            }
            Err(err) => {
                self.error = Some(anyhow::Error::new(err).context("failed to create window"));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match &event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
                return;
            }
            WindowEvent::Resized(size) => {
                self.resized(*size);
                return;
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.window.as_ref().map(|w| w.inner_size()) {
                    self.resized(size);
                }
                return;
            }
            WindowEvent::ModifiersChanged(m) => self.modifiers = map_modifiers(m.state()),
            _ => {}
        }

        if let Some(input) = translate_window_event(self.modifiers, &event) {
            self.events.push(input);
        }
    }
}

/// A winit window driven by `pump_app_events`, so the caller owns the loop.
pub struct WinitWindow {
    event_loop: EventLoop<()>,
    handler: Handler,
}

impl WinitWindow {
    /// Creates the event loop and pumps it until the window exists.
    pub fn new(config: WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut this = Self {
            event_loop,
            handler: Handler {
                config,
                window: None,
                backend: None,
                modifiers: Modifiers::default(),
                events: Vec::new(),
                resize: None,
                close_requested: false,
                exited: false,
                error: None,
            },
        };

        for _ in 0..STARTUP_PUMPS {
            this.pump(Some(Duration::from_millis(10)));
            if this.handler.window.is_some() || this.handler.exited {
                break;
            }
        }
        if let Some(err) = this.handler.error.take() {
            return Err(err);
        }
        anyhow::ensure!(this.handler.window.is_some(), "window was not created");
        Ok(this)
    }

    pub fn window(&self) -> Option<Arc<Window>> {
        self.handler.window.clone()
    }

    /// Brings up wgpu on this window. Resizes are forwarded to the backend's
    /// surface, and a fatal surface error makes the window ask to close.
    pub fn create_backend(&mut self, init: GpuInit) -> Result<Rc<WgpuBackend>> {
        let window = self.window().context("window was not created")?;
        let gpu = pollster::block_on(Gpu::new(window, init)).context("GPU initialization failed")?;
        let backend = Rc::new(WgpuBackend::new(gpu));
        self.handler.backend = Some(Rc::clone(&backend));
        Ok(backend)
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.handler) {
            log::info!("event loop exited with code {code}");
            self.handler.exited = true;
        }
    }
}

impl WindowBackend for WinitWindow {
    fn should_close(&self) -> bool {
        let h = &self.handler;
        h.close_requested || h.exited || h.backend.as_ref().is_some_and(|b| b.surface_failed())
    }

    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn present(&mut self) {
        if let Some(window) = &self.handler.window {
            window.pre_present_notify();
        }
    }

    fn request_close(&mut self) {
        self.handler.close_requested = true;
    }

    fn drain_input(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.handler.events)
    }

    fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.handler.resize.take().map(|s| (s.width, s.height))
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.handler
            .window
            .as_ref()
            .map_or((0, 0), |w| {
                let size = w.inner_size();
                (size.width, size.height)
            })
    }
}
