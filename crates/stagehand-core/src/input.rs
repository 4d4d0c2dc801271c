//! Identifiers for pressable inputs and scroll directions.

use serde::{Deserialize, Serialize};

/// A mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Primary,
    Secondary,
    Middle,
}

/// A keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    /// A key producing this character.
    Char(char),
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Shift,
    Control,
    Alt,
    /// Command on macOS, the Windows key elsewhere.
    Meta,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    /// Function key `F1`..`F24`.
    F(u8),
}

impl Key {
    /// Whether this key is a modifier.
    pub fn is_modifier(self) -> bool {
        matches!(self, Self::Shift | Self::Control | Self::Alt | Self::Meta)
    }

    /// The platform's shortcut modifier (Meta on macOS, Control elsewhere).
    pub fn shortcut() -> Self {
        if cfg!(target_os = "macos") {
            Self::Meta
        } else {
            Self::Control
        }
    }
}

/// Anything that can be held down: a mouse button or a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "device", content = "id", rename_all = "snake_case")]
pub enum InputId {
    Mouse(MouseButton),
    Key(Key),
}

impl From<MouseButton> for InputId {
    fn from(button: MouseButton) -> Self {
        Self::Mouse(button)
    }
}

impl From<Key> for InputId {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl std::fmt::Display for InputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mouse(button) => write!(f, "mouse {:?}", button),
            Self::Key(Key::Char(c)) => write!(f, "key '{}'", c),
            Self::Key(key) => write!(f, "key {:?}", key),
        }
    }
}

/// Wheel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

/// Direction of a scroll gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// The axis and the signed single-notch amount for this direction.
    ///
    /// Positive amounts scroll down or right.
    pub fn notch(self) -> (ScrollAxis, i32) {
        match self {
            Self::Up => (ScrollAxis::Vertical, -1),
            Self::Down => (ScrollAxis::Vertical, 1),
            Self::Left => (ScrollAxis::Horizontal, -1),
            Self::Right => (ScrollAxis::Horizontal, 1),
        }
    }
}
