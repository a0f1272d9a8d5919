use super::types::{InputEvent, Key, KeyAction, Modifiers};

/// Bit set over the keys the explorer tracks.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct KeyMask(u32);

impl KeyMask {
    pub const EMPTY: KeyMask = KeyMask(0);

    /// Bit index of a tracked key; untracked keys have none.
    const fn bit(key: Key) -> Option<u32> {
        match key {
            Key::ArrowUp => Some(0),
            Key::ArrowDown => Some(1),
            Key::ArrowLeft => Some(2),
            Key::ArrowRight => Some(3),
            Key::Shift => Some(4),
            Key::Escape => Some(5),
            Key::L => Some(6),
            Key::R => Some(7),
            Key::Enter | Key::Space | Key::Control | Key::Alt | Key::Unknown(_) => None,
        }
    }

    #[inline]
    pub fn contains(self, key: Key) -> bool {
        Self::bit(key).is_some_and(|b| self.0 & (1 << b) != 0)
    }

    /// Sets `key`; returns whether it was newly set.
    pub fn insert(&mut self, key: Key) -> bool {
        match Self::bit(key) {
            Some(b) => {
                let was = self.0 & (1 << b) != 0;
                self.0 |= 1 << b;
                !was
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: Key) {
        if let Some(b) = Self::bit(key) {
            self.0 &= !(1 << b);
        }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Held-key state for one window plus the rising edges of the current poll.
///
/// A press followed by a release inside one poll still leaves its edge in
/// `pressed`. Repeats never produce edges. Losing focus clears held keys so
/// nothing stays stuck down.
#[derive(Debug, Default, Clone)]
pub struct KeyTracker {
    held: KeyMask,
    pressed: KeyMask,
    modifiers: Modifiers,
    focused: bool,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self {
            focused: true,
            ..Self::default()
        }
    }

    /// Clears per-poll edges. Call once before applying a poll's events.
    pub fn begin_poll(&mut self) {
        self.pressed.clear();
    }

    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::Key {
                key,
                action,
                modifiers,
            } => {
                self.modifiers = modifiers;
                match action {
                    KeyAction::Press => {
                        if self.held.insert(key) {
                            self.pressed.insert(key);
                        }
                    }
                    KeyAction::Repeat => {
                        self.held.insert(key);
                    }
                    KeyAction::Release => self.held.remove(key),
                }
            }
            InputEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers;
                if !modifiers.shift {
                    self.held.remove(Key::Shift);
                }
            }
            InputEvent::Focused(focused) => {
                self.focused = focused;
                if !focused {
                    self.held.clear();
                    self.modifiers = Modifiers::default();
                }
            }
        }
    }

    #[inline]
    pub fn held(&self, key: Key) -> bool {
        self.held.contains(key)
    }

    /// Rising edge during the current poll.
    #[inline]
    pub fn pressed(&self, key: Key) -> bool {
        self.pressed.contains(key)
    }

    #[inline]
    pub fn shift(&self) -> bool {
        self.held(Key::Shift) || self.modifiers.shift
    }

    #[inline]
    pub fn focused(&self) -> bool {
        self.focused
    }

    #[inline]
    pub fn held_mask(&self) -> KeyMask {
        self.held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(key: Key) -> InputEvent {
        InputEvent::key(key, KeyAction::Press)
    }

    fn release(key: Key) -> InputEvent {
        InputEvent::key(key, KeyAction::Release)
    }

    // ── edges ─────────────────────────────────────────────────────────────

    #[test]
    fn press_sets_held_and_edge() {
        let mut t = KeyTracker::new();
        t.begin_poll();
        t.apply(&press(Key::ArrowLeft));
        assert!(t.held(Key::ArrowLeft));
        assert!(t.pressed(Key::ArrowLeft));

        t.begin_poll();
        assert!(t.held(Key::ArrowLeft));
        assert!(!t.pressed(Key::ArrowLeft));
    }

    #[test]
    fn repeat_is_not_an_edge() {
        let mut t = KeyTracker::new();
        t.apply(&press(Key::ArrowRight));
        t.begin_poll();
        t.apply(&InputEvent::key(Key::ArrowRight, KeyAction::Repeat));
        assert!(!t.pressed(Key::ArrowRight));
        assert!(t.held(Key::ArrowRight));
    }

    #[test]
    fn tap_within_one_poll_keeps_edge() {
        let mut t = KeyTracker::new();
        t.begin_poll();
        t.apply(&press(Key::ArrowRight));
        t.apply(&release(Key::ArrowRight));
        assert!(t.pressed(Key::ArrowRight));
        assert!(!t.held(Key::ArrowRight));
    }

    // ── focus ─────────────────────────────────────────────────────────────

    #[test]
    fn focus_loss_clears_held_keys() {
        let mut t = KeyTracker::new();
        t.apply(&press(Key::Shift));
        t.apply(&press(Key::ArrowUp));
        t.apply(&InputEvent::Focused(false));
        assert!(t.held_mask().is_empty());
        assert!(!t.shift());
        assert!(!t.focused());
    }

    #[test]
    fn untracked_keys_are_ignored() {
        let mut mask = KeyMask::EMPTY;
        assert!(!mask.insert(Key::Unknown(42)));
        assert!(mask.is_empty());
    }
}
