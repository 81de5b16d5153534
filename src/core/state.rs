//! Gamepad state management
//!
//! Tracks what the Input Server has told us about each device: connection,
//! button levels and axis positions. Key repeat and modifier checks read it.

use crate::core::protocol::{ButtonValue, DeviceState};
use std::collections::HashMap;

/// Last known state of one device
#[derive(Clone, Debug, Default)]
pub struct GamepadState {
    /// Device name as reported by the server
    pub name: String,

    /// Button index -> pressed
    pub buttons: HashMap<u32, bool>,

    /// Axis name -> value in [-1, 1]
    pub axes: HashMap<String, f64>,
}

impl GamepadState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn apply_snapshot(&mut self, buttons: &HashMap<String, ButtonValue>, axes: &HashMap<String, f64>) {
        self.buttons = buttons
            .iter()
            .filter_map(|(k, v)| k.parse::<u32>().ok().map(|idx| (idx, v.is_pressed())))
            .collect();
        self.axes = axes.clone();
    }
}

/// All devices plus server connectivity
#[derive(Clone, Debug, Default)]
pub struct GamepadRegistry {
    /// Connection status to the Input Server
    pub connected: bool,

    devices: HashMap<String, GamepadState>,
}

impl GamepadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(&mut self, device: &str, state: Option<&DeviceState>) {
        let entry = self
            .devices
            .entry(device.to_string())
            .or_insert_with(|| GamepadState::new(device));
        if let Some(state) = state {
            entry.apply_snapshot(&state.buttons, &state.axes);
        }
    }

    pub fn on_disconnected(&mut self, device: &str) {
        self.devices.remove(device);
    }

    pub fn on_state(
        &mut self,
        device: &str,
        buttons: &HashMap<String, ButtonValue>,
        axes: &HashMap<String, f64>,
    ) {
        self.devices
            .entry(device.to_string())
            .or_insert_with(|| GamepadState::new(device))
            .apply_snapshot(buttons, axes);
    }

    pub fn on_button(&mut self, device: &str, button: u32, pressed: bool) {
        self.devices
            .entry(device.to_string())
            .or_insert_with(|| GamepadState::new(device))
            .buttons
            .insert(button, pressed);
    }

    pub fn on_axis(&mut self, device: &str, axis: &str, value: f64) {
        self.devices
            .entry(device.to_string())
            .or_insert_with(|| GamepadState::new(device))
            .axes
            .insert(axis.to_string(), value);
    }

    pub fn is_pressed(&self, device: &str, button: u32) -> bool {
        self.devices
            .get(device)
            .and_then(|d| d.buttons.get(&button))
            .copied()
            .unwrap_or(false)
    }

    pub fn axis(&self, device: &str, axis: &str) -> f64 {
        self.devices
            .get(device)
            .and_then(|d| d.axes.get(axis))
            .copied()
            .unwrap_or(0.0)
    }

    /// Connection lost: every device is gone as far as we know
    pub fn clear(&mut self) {
        self.devices.clear();
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn devices(&self) -> impl Iterator<Item = &GamepadState> {
        self.devices.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_and_axis_tracking() {
        let mut reg = GamepadRegistry::new();
        reg.on_button("pad0", 4, true);
        reg.on_axis("pad0", "left_x", 0.5);
        assert!(reg.is_pressed("pad0", 4));
        assert!(!reg.is_pressed("pad0", 5));
        assert!(!reg.is_pressed("pad1", 4));
        assert_eq!(reg.axis("pad0", "left_x"), 0.5);
        assert_eq!(reg.device_count(), 1);

        reg.on_disconnected("pad0");
        assert!(!reg.is_pressed("pad0", 4));
        assert_eq!(reg.device_count(), 0);
    }

    #[test]
    fn test_snapshot_replaces_state() {
        let mut reg = GamepadRegistry::new();
        reg.on_button("pad0", 1, true);
        let mut buttons = HashMap::new();
        buttons.insert("4".to_string(), ButtonValue::Pressed(true));
        buttons.insert("bogus".to_string(), ButtonValue::Pressed(true));
        reg.on_state("pad0", &buttons, &HashMap::new());
        assert!(reg.is_pressed("pad0", 4));
        assert!(!reg.is_pressed("pad0", 1));
    }
}
