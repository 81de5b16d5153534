//! Frontend-agnostic input events for the preview.
//!
//! The terminal frontend translates crossterm events into this enum, and
//! `KeyAction::from_key` maps the keyboard fallback onto engine operations.

use crate::core::input_router::Direction;
use crossterm::event::{KeyCode, KeyModifiers};

#[derive(Debug, Clone, PartialEq)]
pub enum FrontendEvent {
    /// Keyboard input
    Key {
        code: KeyCode,
        modifiers: KeyModifiers,
    },
    /// Terminal resize
    Resize { width: u16, height: u16 },
    /// Application quit signal
    Quit,
}

impl FrontendEvent {
    pub fn key(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self::Key { code, modifiers }
    }

    pub fn resize(width: u16, height: u16) -> Self {
        Self::Resize { width, height }
    }
}

/// What a key press asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Navigate(Direction),
    Confirm,
    Cancel,
    ToggleTokenMode,
    ToggleNavigation,
    RequestFurigana,
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode, modifiers: KeyModifiers) -> Option<Self> {
        if modifiers.contains(KeyModifiers::CONTROL) {
            return match code {
                KeyCode::Char('c') => Some(KeyAction::Quit),
                _ => None,
            };
        }
        match code {
            KeyCode::Up => Some(KeyAction::Navigate(Direction::Up)),
            KeyCode::Down => Some(KeyAction::Navigate(Direction::Down)),
            KeyCode::Left => Some(KeyAction::Navigate(Direction::Left)),
            KeyCode::Right => Some(KeyAction::Navigate(Direction::Right)),
            KeyCode::Enter => Some(KeyAction::Confirm),
            KeyCode::Esc => Some(KeyAction::Cancel),
            KeyCode::Char('t') => Some(KeyAction::ToggleTokenMode),
            KeyCode::Char(' ') => Some(KeyAction::ToggleNavigation),
            KeyCode::Char('f') => Some(KeyAction::RequestFurigana),
            KeyCode::Char('q') => Some(KeyAction::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let key_event = FrontendEvent::key(KeyCode::Char('a'), KeyModifiers::NONE);
        assert!(matches!(key_event, FrontendEvent::Key { .. }));

        let resize_event = FrontendEvent::resize(120, 40);
        assert!(matches!(
            resize_event,
            FrontendEvent::Resize {
                width: 120,
                height: 40
            }
        ));
    }

    #[test]
    fn test_keyboard_fallback() {
        let none = KeyModifiers::NONE;
        assert_eq!(
            KeyAction::from_key(KeyCode::Left, none),
            Some(KeyAction::Navigate(Direction::Left))
        );
        assert_eq!(KeyAction::from_key(KeyCode::Enter, none), Some(KeyAction::Confirm));
        assert_eq!(KeyAction::from_key(KeyCode::Esc, none), Some(KeyAction::Cancel));
        assert_eq!(KeyAction::from_key(KeyCode::Char('t'), none), Some(KeyAction::ToggleTokenMode));
        assert_eq!(KeyAction::from_key(KeyCode::Char(' '), none), Some(KeyAction::ToggleNavigation));
        assert_eq!(KeyAction::from_key(KeyCode::Char('f'), none), Some(KeyAction::RequestFurigana));
        assert_eq!(KeyAction::from_key(KeyCode::Char('x'), none), None);
        assert_eq!(
            KeyAction::from_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(KeyAction::Quit)
        );
    }
}
