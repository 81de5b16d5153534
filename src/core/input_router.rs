//! Input routing for gamepad buttons
//!
//! Routes raw button presses/releases to a `PadAction` based on:
//! - The button mapping from config
//! - The activation mode (modifier hold vs toggle)
//! - Whether navigation is currently active / sticky

use crate::config::{ActivationMode, ButtonConfig};

/// D-pad direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

/// What a button event asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadAction {
    ToggleNavigation,
    Confirm,
    Cancel,
    ToggleGranularity,
    /// Move the cursor; `activate` when navigation must be switched on first
    Navigate { direction: Direction, activate: bool },
    /// A held direction was released
    StopRepeat(Direction),
    Deactivate,
    None,
}

/// Navigation state the router needs to know about
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteContext {
    pub active: bool,
    /// Navigation was switched on by a toggle (survives modifier release)
    pub sticky: bool,
    /// Modifier currently held on the device that sent the event
    pub modifier_held: bool,
}

/// Map a d-pad button index to a direction
pub fn dpad_direction(button: u32, buttons: &ButtonConfig) -> Option<Direction> {
    if button == buttons.dpad_up {
        Some(Direction::Up)
    } else if button == buttons.dpad_down {
        Some(Direction::Down)
    } else if button == buttons.dpad_left {
        Some(Direction::Left)
    } else if button == buttons.dpad_right {
        Some(Direction::Right)
    } else {
        None
    }
}

/// Route a button press
pub fn route_press(button: u32, buttons: &ButtonConfig, ctx: RouteContext) -> PadAction {
    if !buttons.controller_enabled {
        return PadAction::None;
    }

    // The toggle button is always a sticky on/off switch
    if button == buttons.toggle {
        return PadAction::ToggleNavigation;
    }

    if buttons.activation_mode == ActivationMode::Toggle && button == buttons.modifier {
        return PadAction::ToggleNavigation;
    }

    if ctx.active {
        if button == buttons.confirm {
            return PadAction::Confirm;
        }
        if button == buttons.cancel {
            return PadAction::Cancel;
        }
        if button == buttons.token_toggle {
            return PadAction::ToggleGranularity;
        }
    }

    if let Some(direction) = dpad_direction(button, buttons) {
        if ctx.sticky {
            return PadAction::Navigate {
                direction,
                activate: !ctx.active,
            };
        }
        if buttons.activation_mode == ActivationMode::Modifier && ctx.modifier_held {
            return PadAction::Navigate {
                direction,
                activate: !ctx.active,
            };
        }
    }

    PadAction::None
}

/// Route a button release
pub fn route_release(button: u32, buttons: &ButtonConfig, ctx: RouteContext) -> PadAction {
    if let Some(direction) = dpad_direction(button, buttons) {
        return PadAction::StopRepeat(direction);
    }

    if buttons.activation_mode == ActivationMode::Modifier
        && button == buttons.modifier
        && ctx.active
        && !ctx.sticky
    {
        return PadAction::Deactivate;
    }

    PadAction::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held() -> RouteContext {
        RouteContext {
            active: false,
            sticky: false,
            modifier_held: true,
        }
    }

    #[test]
    fn test_dpad_requires_modifier_in_modifier_mode() {
        let buttons = ButtonConfig::default();
        assert_eq!(
            route_press(12, &buttons, RouteContext::default()),
            PadAction::None
        );
        assert_eq!(
            route_press(12, &buttons, held()),
            PadAction::Navigate {
                direction: Direction::Up,
                activate: true
            }
        );
    }

    #[test]
    fn test_toggle_button_and_modifier_in_toggle_mode() {
        let mut buttons = ButtonConfig::default();
        assert_eq!(
            route_press(8, &buttons, RouteContext::default()),
            PadAction::ToggleNavigation
        );
        // In modifier mode the modifier itself does not toggle
        assert_eq!(
            route_press(4, &buttons, RouteContext::default()),
            PadAction::None
        );
        buttons.activation_mode = ActivationMode::Toggle;
        assert_eq!(
            route_press(4, &buttons, RouteContext::default()),
            PadAction::ToggleNavigation
        );
    }

    #[test]
    fn test_face_buttons_only_while_active() {
        let buttons = ButtonConfig::default();
        let active = RouteContext {
            active: true,
            sticky: true,
            modifier_held: false,
        };
        assert_eq!(route_press(0, &buttons, active), PadAction::Confirm);
        assert_eq!(route_press(1, &buttons, active), PadAction::Cancel);
        assert_eq!(route_press(3, &buttons, active), PadAction::ToggleGranularity);
        assert_eq!(
            route_press(0, &buttons, RouteContext::default()),
            PadAction::None
        );
    }

    #[test]
    fn test_release_routing() {
        let buttons = ButtonConfig::default();
        let momentary = RouteContext {
            active: true,
            sticky: false,
            modifier_held: false,
        };
        assert_eq!(route_release(4, &buttons, momentary), PadAction::Deactivate);
        assert_eq!(
            route_release(
                4,
                &buttons,
                RouteContext {
                    sticky: true,
                    ..momentary
                }
            ),
            PadAction::None
        );
        assert_eq!(
            route_release(15, &buttons, momentary),
            PadAction::StopRepeat(Direction::Right)
        );
    }

    #[test]
    fn test_disabled_controller_ignores_everything() {
        let mut buttons = ButtonConfig::default();
        buttons.controller_enabled = false;
        assert_eq!(route_press(8, &buttons, held()), PadAction::None);
    }
}
