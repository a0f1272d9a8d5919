use std::fmt;

/// Keyboard key identifier.
///
/// Only the keys the explorer reacts to are named. Everything else maps to
/// `Key::Unknown(code)` with a stable platform code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Escape,
    Enter,
    Space,

    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,

    Shift,
    Control,
    Alt,

    /// Lazy-mode toggle.
    L,
    /// Reset view.
    R,

    /// Platform-dependent key not represented here.
    Unknown(u32),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Raw key transition as reported by the platform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum KeyAction {
    Press,
    Release,
    /// Auto-repeat while held; never a rising edge.
    Repeat,
}

/// Modifier keys state.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt
    }
}

/// Platform-agnostic input events emitted by the window collaborator.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InputEvent {
    Key {
        key: Key,
        action: KeyAction,
        modifiers: Modifiers,
    },

    ModifiersChanged(Modifiers),

    /// Window focus change.
    Focused(bool),
}

impl InputEvent {
    /// Shorthand for a key event without modifiers.
    pub fn key(key: Key, action: KeyAction) -> Self {
        InputEvent::Key {
            key,
            action,
            modifiers: Modifiers::default(),
        }
    }

    /// A key going down or up. Auto-repeat is not a transition.
    pub fn is_key_transition(&self) -> bool {
        matches!(
            self,
            InputEvent::Key {
                action: KeyAction::Press | KeyAction::Release,
                ..
            }
        )
    }
}
