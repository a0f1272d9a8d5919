use std::sync::Arc;

use fractal_engine::frame::{Overlay, OverlaySnapshot};
use fractal_engine::input::{InputEvent, Key, KeyAction};
use winit::window::Window;

/// Seconds between title refreshes.
const REFRESH_INTERVAL: f64 = 0.25;

/// Shows the viewport, iteration budget and frame timing in the window
/// title, and toggles lazy mode on `L`.
///
/// Without a window the line goes to the debug log instead.
pub struct TitleOverlay {
    window: Option<Arc<Window>>,
    since_refresh: f64,
    toggle_lazy: bool,
    last_line: String,
}

impl TitleOverlay {
    pub fn new(window: Option<Arc<Window>>) -> Self {
        Self {
            window,
            since_refresh: REFRESH_INTERVAL,
            toggle_lazy: false,
            last_line: String::new(),
        }
    }

    pub fn last_line(&self) -> &str {
        &self.last_line
    }
}

pub fn status_line(s: &OverlaySnapshot) -> String {
    format!(
        "x = {:.5}  y = {:.5}  range = {:.5}  iteration = {}  {:.1} FPS ({:.2} ms){}",
        s.center.x,
        s.center.y,
        2.0 * s.half_range,
        s.iteration_budget,
        s.frames_per_second,
        s.frame_delta_seconds * 1000.0,
        if s.lazy_mode_enabled { "  [lazy]" } else { "" }
    )
}

impl Overlay for TitleOverlay {
    fn handle_input(&mut self, event: &InputEvent) {
        if let InputEvent::Key {
            key: Key::L,
            action: KeyAction::Press,
            ..
        } = event
        {
            self.toggle_lazy = !self.toggle_lazy;
        }
    }

    fn draw(&mut self, snapshot: &OverlaySnapshot, lazy_mode: &mut bool) {
        let mut forced = false;
        if std::mem::take(&mut self.toggle_lazy) {
            *lazy_mode = !*lazy_mode;
            forced = true;
        }

        self.since_refresh += snapshot.frame_delta_seconds;
        if self.since_refresh < REFRESH_INTERVAL && !forced {
            return;
        }
        self.since_refresh = 0.0;

        let shown = OverlaySnapshot {
            lazy_mode_enabled: *lazy_mode,
            ..*snapshot
        };
        self.last_line = status_line(&shown);
        match &self.window {
            Some(window) => window.set_title(&format!("fractal explorer  {}", self.last_line)),
            None => log::debug!("{}", self.last_line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn snapshot() -> OverlaySnapshot {
        OverlaySnapshot {
            center: DVec2::new(-0.25, 0.0),
            half_range: 2.0,
            iteration_budget: 256,
            lazy_mode_enabled: true,
            frame_delta_seconds: 0.016,
            frames_per_second: 60.0,
        }
    }

    #[test]
    fn l_press_toggles_lazy_mode_once() {
        let mut overlay = TitleOverlay::new(None);
        let mut lazy = true;
        overlay.handle_input(&InputEvent::key(Key::L, KeyAction::Press));
        overlay.handle_input(&InputEvent::key(Key::L, KeyAction::Release));
        overlay.draw(&snapshot(), &mut lazy);
        assert!(!lazy);
        overlay.draw(&snapshot(), &mut lazy);
        assert!(!lazy);
    }

    #[test]
    fn status_line_shows_full_range() {
        let line = status_line(&snapshot());
        assert!(line.starts_with("x = -0.25000  y = 0.00000  range = 4.00000"));
        assert!(line.contains("iteration = 256"));
        assert!(line.ends_with("[lazy]"));
    }
}
