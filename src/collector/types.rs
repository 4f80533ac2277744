//! Input event types delivered by the OS hook backends.
//!
//! Every event is timestamped inside the hook callback, so the time a
//! click is reported to the measurement loop never depends on how long
//! it waited in a queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mouse button identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

/// Press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Down,
    Up,
}

/// Global pointer position in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A mouse button transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Timestamp when the hook observed the event
    pub timestamp: DateTime<Utc>,
    pub button: MouseButton,
    pub transition: Transition,
    /// Pointer position, when the backend reports one
    pub position: Option<Point>,
}

impl ClickEvent {
    /// Create a click event stamped with the current time.
    pub fn new(button: MouseButton, transition: Transition, position: Option<Point>) -> Self {
        Self {
            timestamp: Utc::now(),
            button,
            transition,
            position,
        }
    }

    /// Left button pressed: the only transition that starts a measurement.
    pub fn is_left_down(&self) -> bool {
        self.button == MouseButton::Left && self.transition == Transition::Down
    }

    /// Left button released.
    pub fn is_left_up(&self) -> bool {
        self.button == MouseButton::Left && self.transition == Transition::Up
    }
}

/// Keys the tool cares about. Anything else keeps its raw platform code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Escape,
    Enter,
    Space,
    Other(u32),
}

impl Key {
    /// Map a macOS virtual keycode.
    pub fn from_mac_keycode(code: u32) -> Self {
        match code {
            53 => Key::Escape,
            36 | 76 => Key::Enter,
            49 => Key::Space,
            other => Key::Other(other),
        }
    }

    /// Map a Windows virtual-key code.
    pub fn from_windows_vk(code: u32) -> Self {
        match code {
            0x1B => Key::Escape,
            0x0D => Key::Enter,
            0x20 => Key::Space,
            other => Key::Other(other),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Escape => write!(f, "Esc"),
            Key::Enter => write!(f, "Enter"),
            Key::Space => write!(f, "Space"),
            Key::Other(code) => write!(f, "key #{code}"),
        }
    }
}

/// A keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub timestamp: DateTime<Utc>,
    pub key: Key,
    /// Whether this is a key press (true) or release (false)
    pub is_key_down: bool,
}

impl KeyEvent {
    pub fn new(key: Key, is_key_down: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            key,
            is_key_down,
        }
    }
}

/// Unified event type for the collector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Click(ClickEvent),
    Key(KeyEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_left_down_detection() {
        let down = ClickEvent::new(MouseButton::Left, Transition::Down, None);
        assert!(down.is_left_down());
        assert!(!down.is_left_up());

        let right = ClickEvent::new(MouseButton::Right, Transition::Down, None);
        assert!(!right.is_left_down());

        let up = ClickEvent::new(MouseButton::Left, Transition::Up, Some(Point::new(1.0, 2.0)));
        assert!(up.is_left_up());
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Key::from_mac_keycode(53), Key::Escape);
        assert_eq!(Key::from_windows_vk(0x1B), Key::Escape);
        assert_eq!(Key::from_windows_vk(0x41), Key::Other(0x41));
        assert_eq!(Key::from_mac_keycode(49), Key::Space);
    }

    #[test]
    fn test_key_serde_names() {
        let json = serde_json::to_string(&Key::Escape).unwrap();
        assert_eq!(json, "\"escape\"");
        let key: Key = serde_json::from_str("\"enter\"").unwrap();
        assert_eq!(key, Key::Enter);
    }
}
