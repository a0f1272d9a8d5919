use glam::DVec2;

use crate::input::{InputEvent, Key, KeyTracker};

use super::state::{NavigationLimits, NavigationState};

/// Outcome of one input poll.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct NavigationUpdate {
    /// The navigation state differs from before the poll.
    pub changed: bool,
    /// Some key was pressed or released during the poll.
    pub key_transition: bool,
    pub close_requested: bool,
}

impl NavigationUpdate {
    /// Whether the cached field has to be recomputed.
    pub fn needs_recompute(&self) -> bool {
        self.changed || self.key_transition
    }
}

/// Maps the raw key stream onto `NavigationState`.
///
/// With Shift held, up/down zoom (up zooms out) and left/right step the
/// iteration budget once per key press. Without Shift the arrows pan. All
/// continuous motion is scaled by the elapsed time of the frame. `R`
/// restores the initial view and Escape asks to close.
#[derive(Debug, Clone)]
pub struct NavigationInput {
    state: NavigationState,
    home: NavigationState,
    limits: NavigationLimits,
    keys: KeyTracker,
}

impl NavigationInput {
    pub fn new(initial: NavigationState, limits: NavigationLimits) -> Self {
        Self {
            state: initial,
            home: initial,
            limits,
            keys: KeyTracker::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    #[inline]
    pub fn limits(&self) -> &NavigationLimits {
        &self.limits
    }

    #[inline]
    pub fn keys(&self) -> &KeyTracker {
        &self.keys
    }

    /// Starts a poll: forgets the previous poll's rising edges.
    pub fn begin_poll(&mut self) {
        self.keys.begin_poll();
    }

    pub fn handle_event(&mut self, event: &InputEvent) {
        self.keys.apply(event);
    }

    /// Applies held keys and this poll's edges for `dt` seconds.
    pub fn advance(&mut self, dt: f64) -> NavigationUpdate {
        let before = self.state;
        let dt = dt.max(0.0);
        let keys = &self.keys;

        if keys.pressed(Key::R) {
            self.state = self.home;
        }

        if keys.shift() {
            let rate = self.limits.zoom_rate_per_second * dt;
            if keys.held(Key::ArrowUp) {
                self.state.scale_range(1.0 + rate, &self.limits);
            }
            if keys.held(Key::ArrowDown) {
                self.state.scale_range(1.0 - rate, &self.limits);
            }

            let mut steps = 0;
            if keys.pressed(Key::ArrowLeft) {
                steps -= 1;
            }
            if keys.pressed(Key::ArrowRight) {
                steps += 1;
            }
            if steps != 0 {
                self.state.step_iterations(steps, &self.limits);
            }
        } else {
            let step = self.state.half_range() * dt * self.limits.pan_rate_per_second;
            let mut delta = DVec2::ZERO;
            if keys.held(Key::ArrowUp) {
                delta.y += step;
            }
            if keys.held(Key::ArrowDown) {
                delta.y -= step;
            }
            if keys.held(Key::ArrowLeft) {
                delta.x -= step;
            }
            if keys.held(Key::ArrowRight) {
                delta.x += step;
            }
            if delta != DVec2::ZERO {
                self.state.pan(delta);
            }
        }

        let update = NavigationUpdate {
            changed: self.state != before,
            key_transition: false,
            close_requested: keys.held(Key::Escape) || keys.pressed(Key::Escape),
        };
        if update.changed {
            log::trace!(
                "navigation: center=({}, {}) half_range={} iterations={}",
                self.state.center().x,
                self.state.center().y,
                self.state.half_range(),
                self.state.iteration_budget()
            );
        }
        update
    }

    /// One complete poll: edges reset, `events` applied, state advanced.
    pub fn process(&mut self, events: &[InputEvent], dt: f64) -> NavigationUpdate {
        self.begin_poll();
        for event in events {
            self.handle_event(event);
        }
        NavigationUpdate {
            key_transition: events.iter().any(InputEvent::is_key_transition),
            ..self.advance(dt)
        }
    }
}

impl Default for NavigationInput {
    fn default() -> Self {
        let limits = NavigationLimits::default();
        Self::new(NavigationState::with_limits(&limits), limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyAction, Modifiers};

    fn press(key: Key) -> InputEvent {
        InputEvent::key(key, KeyAction::Press)
    }

    fn release(key: Key) -> InputEvent {
        InputEvent::key(key, KeyAction::Release)
    }

    fn shifted(key: Key) -> InputEvent {
        InputEvent::Key {
            key,
            action: KeyAction::Press,
            modifiers: Modifiers {
                shift: true,
                ..Modifiers::default()
            },
        }
    }

    // ── zoom ──────────────────────────────────────────────────────────────

    #[test]
    fn zoom_in_clamps_at_min_range() {
        let mut nav = NavigationInput::default();
        nav.process(&[press(Key::Shift), press(Key::ArrowDown)], 0.0);
        for _ in 0..10_000 {
            nav.process(&[], 1.0);
        }
        assert_eq!(nav.state().half_range(), nav.limits().min_range);
    }

    #[test]
    fn zoom_out_clamps_at_max_range() {
        let mut nav = NavigationInput::default();
        let update = nav.process(&[press(Key::Shift), press(Key::ArrowUp)], 0.5);
        assert_eq!(nav.state().half_range(), nav.limits().max_range);
        assert!(!update.changed);
    }

    #[test]
    fn zoom_scales_by_elapsed_time() {
        let mut nav = NavigationInput::default();
        nav.process(&[shifted(Key::ArrowDown)], 0.5);
        let expected = 2.0 * (1.0 - 0.9 * 0.5);
        assert!((nav.state().half_range() - expected).abs() < 1e-12);
        assert_eq!(nav.state().center(), NavigationState::DEFAULT_CENTER);
    }

    // ── iterations ────────────────────────────────────────────────────────

    #[test]
    fn held_decrease_steps_once() {
        let limits = NavigationLimits::default();
        let start = NavigationState::new(NavigationState::DEFAULT_CENTER, 1.0, 1024, &limits);
        let mut nav = NavigationInput::new(start, limits);
        nav.process(&[press(Key::Shift), press(Key::ArrowLeft)], 0.016);
        for _ in 0..4 {
            nav.process(&[InputEvent::key(Key::ArrowLeft, KeyAction::Repeat)], 0.016);
        }
        assert_eq!(nav.state().iteration_budget(), 1024 - 128);
    }

    #[test]
    fn each_press_is_one_step() {
        let mut nav = NavigationInput::default();
        nav.process(&[press(Key::Shift)], 0.016);
        for _ in 0..3 {
            nav.process(&[press(Key::ArrowRight), release(Key::ArrowRight)], 0.016);
        }
        assert_eq!(nav.state().iteration_budget(), 256 + 3 * 128);
    }

    // ── pan ───────────────────────────────────────────────────────────────

    #[test]
    fn pan_right_for_one_second() {
        let mut nav = NavigationInput::default();
        let update = nav.process(&[press(Key::ArrowRight)], 1.0);
        assert!(update.changed);
        assert_eq!(nav.state().center(), DVec2::new(-0.25 + 2.0, 0.0));
    }

    #[test]
    fn pan_does_not_touch_range_or_budget() {
        let mut nav = NavigationInput::default();
        nav.process(&[press(Key::ArrowUp), press(Key::ArrowLeft)], 0.25);
        assert_eq!(nav.state().center(), DVec2::new(-0.75, 0.5));
        assert_eq!(nav.state().half_range(), 2.0);
        assert_eq!(nav.state().iteration_budget(), 256);
    }

    #[test]
    fn modifier_press_requests_recompute_without_change() {
        let mut nav = NavigationInput::default();
        let update = nav.process(&[press(Key::Shift)], 0.016);
        assert!(!update.changed);
        assert!(update.key_transition);
        assert!(update.needs_recompute());

        let update = nav.process(&[InputEvent::key(Key::Shift, KeyAction::Repeat)], 0.016);
        assert!(!update.needs_recompute());
    }

    #[test]
    fn idle_poll_reports_no_change() {
        let mut nav = NavigationInput::default();
        assert_eq!(nav.process(&[], 0.5), NavigationUpdate::default());
    }

    // ── commands ──────────────────────────────────────────────────────────

    #[test]
    fn reset_restores_initial_view() {
        let mut nav = NavigationInput::default();
        nav.process(&[press(Key::ArrowRight)], 0.25);
        nav.process(&[release(Key::ArrowRight)], 0.25);
        let update = nav.process(&[press(Key::R)], 0.25);
        assert!(update.changed);
        assert_eq!(*nav.state(), NavigationState::default());
    }

    #[test]
    fn escape_requests_close() {
        let mut nav = NavigationInput::default();
        assert!(nav.process(&[press(Key::Escape)], 0.016).close_requested);
    }
}
