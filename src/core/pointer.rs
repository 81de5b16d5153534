//! Virtual pointer and stick handling
//!
//! The left stick drives a virtual pointer in surface coordinates. The
//! right stick scrolls the popup (vertical) and cycles popup actions
//! (horizontal). Analog inputs arrive at whatever rate the server sends
//! them, so each step integrates over the elapsed time since the previous
//! sample, clamped to the configured window.

use crate::config::PointerConfig;
use crate::data::{Point, Rect};
use std::time::{Duration, Instant};

/// Radial deadzone, rescaled so output runs from 0 at the edge to 1 at full deflection
pub fn apply_deadzone(x: f64, y: f64, deadzone: f64) -> (f64, f64) {
    let magnitude = x.hypot(y);
    if magnitude <= deadzone || magnitude == 0.0 {
        return (0.0, 0.0);
    }
    let scaled = ((magnitude - deadzone) / (1.0 - deadzone)).min(1.0);
    (x / magnitude * scaled, y / magnitude * scaled)
}

/// Elapsed time between analog samples
#[derive(Debug, Clone, Default)]
pub struct SampleClock {
    last: Option<Instant>,
}

impl SampleClock {
    /// Seconds since the previous sample, clamped; None for the first sample.
    /// A reversed window is taken in order.
    pub fn elapsed(&mut self, now: Instant, min_ms: u64, max_ms: u64) -> Option<f64> {
        let previous = self.last.replace(now)?;
        let elapsed = now.saturating_duration_since(previous);
        let (lo, hi) = (min_ms.min(max_ms), min_ms.max(max_ms));
        let clamped = elapsed.clamp(Duration::from_millis(lo), Duration::from_millis(hi));
        Some(clamped.as_secs_f64())
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Clone)]
pub struct PointerEmulator {
    config: PointerConfig,
    position: Option<Point>,
    clock: SampleClock,
    last_analog_move: Option<Instant>,
    axes: (f64, f64),
}

impl PointerEmulator {
    pub fn new(config: &PointerConfig) -> Self {
        Self {
            config: config.clone(),
            position: None,
            clock: SampleClock::default(),
            last_analog_move: None,
            axes: (0.0, 0.0),
        }
    }

    pub fn position(&self) -> Option<Point> {
        self.position
    }

    /// Place the pointer at a unit's anchor
    pub fn snap_to(&mut self, point: Point) {
        self.position = Some(point);
    }

    pub fn set_axis_x(&mut self, value: f64) {
        self.axes.0 = value;
    }

    pub fn set_axis_y(&mut self, value: f64) {
        self.axes.1 = value;
    }

    /// Integrate the current stick deflection; returns the new position if it moved
    pub fn step(&mut self, now: Instant, viewport: Rect) -> Option<Point> {
        let (dx, dy) = apply_deadzone(self.axes.0, self.axes.1, self.config.deadzone);
        if dx == 0.0 && dy == 0.0 {
            self.clock.reset();
            return None;
        }
        let dt = self
            .clock
            .elapsed(now, self.config.min_sample_ms, self.config.max_sample_ms)?;

        let start = self.position.unwrap_or_else(|| viewport.center());
        let speed = self.config.speed_px_per_sec;
        let moved = viewport.clamp_point(Point::new(start.x + dx * speed * dt, start.y + dy * speed * dt));
        self.position = Some(moved);
        self.last_analog_move = Some(now);
        Some(moved)
    }

    /// Whether confirm should target the pointer instead of the cursor unit
    pub fn recently_moved(&self, now: Instant) -> bool {
        self.last_analog_move.is_some_and(|t| {
            now.saturating_duration_since(t) <= Duration::from_millis(self.config.recent_window_ms)
        })
    }

    /// Forget analog state; the last position is kept for the next snap
    pub fn clear(&mut self) {
        self.clock.reset();
        self.last_analog_move = None;
        self.axes = (0.0, 0.0);
    }
}

/// Right stick: popup scroll and action cycling
#[derive(Debug, Clone)]
pub struct PopupStick {
    config: PointerConfig,
    clock: SampleClock,
    /// Direction of the last action crossing that has not returned to rest
    latched: i32,
    scroll_axis: f64,
}

impl PopupStick {
    pub fn new(config: &PointerConfig) -> Self {
        Self {
            config: config.clone(),
            clock: SampleClock::default(),
            latched: 0,
            scroll_axis: 0.0,
        }
    }

    pub fn set_scroll_axis(&mut self, value: f64) {
        self.scroll_axis = value;
    }

    /// Scroll delta in pixels for the current vertical deflection
    pub fn scroll_step(&mut self, now: Instant) -> Option<f64> {
        let (_, dy) = apply_deadzone(0.0, self.scroll_axis, self.config.deadzone);
        if dy == 0.0 {
            self.clock.reset();
            return None;
        }
        let dt = self
            .clock
            .elapsed(now, self.config.min_sample_ms, self.config.max_sample_ms)?;
        Some(dy * self.config.scroll_speed * dt)
    }

    /// Edge-triggered action direction for a horizontal value
    pub fn action_edge(&mut self, x: f64) -> Option<i32> {
        if x.abs() < self.config.action_threshold {
            self.latched = 0;
            return None;
        }
        let direction = if x > 0.0 { 1 } else { -1 };
        if direction == self.latched {
            return None;
        }
        self.latched = direction;
        Some(direction)
    }

    pub fn clear(&mut self) {
        self.clock.reset();
        self.latched = 0;
        self.scroll_axis = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Rect {
        Rect::new(0.0, 0.0, 1920.0, 1080.0)
    }

    #[test]
    fn test_deadzone_is_continuous() {
        assert_eq!(apply_deadzone(0.2, 0.0, 0.2), (0.0, 0.0));
        let (x, _) = apply_deadzone(0.2001, 0.0, 0.2);
        assert!(x > 0.0 && x < 0.001);
        let (x, _) = apply_deadzone(0.9, 0.0, 0.2);
        assert!((x - 0.875).abs() < 1e-9);
        let (x, y) = apply_deadzone(1.0, 1.0, 0.2);
        assert!(((x * x + y * y).sqrt() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_hundred_ms_at_point_nine() {
        let mut pointer = PointerEmulator::new(&PointerConfig::default());
        pointer.snap_to(Point::new(100.0, 100.0));
        pointer.set_axis_x(0.9);
        let start = Instant::now();
        // First sample only records the time
        assert_eq!(pointer.step(start, viewport()), None);
        for i in 1..=10 {
            pointer.step(start + Duration::from_millis(10 * i), viewport());
        }
        let pos = pointer.position().unwrap();
        assert!((pos.x - 100.0 - 78.75).abs() < 1e-6, "moved {}", pos.x - 100.0);
        assert_eq!(pos.y, 100.0);
    }

    #[test]
    fn test_elapsed_time_is_clamped() {
        let mut clock = SampleClock::default();
        let t = Instant::now();
        assert_eq!(clock.elapsed(t, 8, 40), None);
        assert_eq!(clock.elapsed(t + Duration::from_millis(2), 8, 40), Some(0.008));
        assert_eq!(clock.elapsed(t + Duration::from_millis(500), 8, 40), Some(0.04));
    }

    #[test]
    fn test_reversed_sample_window_is_reordered() {
        let mut clock = SampleClock::default();
        let t = Instant::now();
        clock.elapsed(t, 50, 40);
        assert_eq!(clock.elapsed(t + Duration::from_millis(10), 50, 40), Some(0.04));
        assert_eq!(clock.elapsed(t + Duration::from_millis(500), 50, 40), Some(0.05));

        let config = PointerConfig {
            min_sample_ms: 50,
            max_sample_ms: 40,
            ..PointerConfig::default()
        };
        let mut pointer = PointerEmulator::new(&config);
        pointer.snap_to(Point::new(100.0, 100.0));
        pointer.set_axis_x(1.0);
        pointer.step(t, viewport());
        let pos = pointer.step(t + Duration::from_millis(45), viewport()).unwrap();
        assert!(pos.x > 100.0);

        let mut stick = PopupStick::new(&config);
        stick.set_scroll_axis(1.0);
        stick.scroll_step(t);
        assert!(stick.scroll_step(t + Duration::from_millis(45)).is_some());
    }

    #[test]
    fn test_pointer_clamped_and_recently_moved() {
        let mut pointer = PointerEmulator::new(&PointerConfig::default());
        pointer.snap_to(Point::new(1910.0, 10.0));
        pointer.set_axis_x(1.0);
        let t = Instant::now();
        pointer.step(t, viewport());
        let pos = pointer.step(t + Duration::from_millis(40), viewport()).unwrap();
        assert_eq!(pos.x, 1920.0);
        assert!(pointer.recently_moved(t + Duration::from_millis(2000)));
        assert!(!pointer.recently_moved(t + Duration::from_millis(3000)));

        pointer.clear();
        assert!(!pointer.recently_moved(t + Duration::from_millis(41)));
    }

    #[test]
    fn test_action_edge_triggers_once_per_crossing() {
        let mut stick = PopupStick::new(&PointerConfig::default());
        assert_eq!(stick.action_edge(0.7), Some(1));
        assert_eq!(stick.action_edge(0.9), None);
        assert_eq!(stick.action_edge(0.1), None);
        assert_eq!(stick.action_edge(0.8), Some(1));
        assert_eq!(stick.action_edge(-0.8), Some(-1));
    }

    #[test]
    fn test_scroll_step() {
        let mut stick = PopupStick::new(&PointerConfig::default());
        stick.set_scroll_axis(-1.0);
        let t = Instant::now();
        assert_eq!(stick.scroll_step(t), None);
        let delta = stick.scroll_step(t + Duration::from_millis(20)).unwrap();
        assert!((delta + 24.0).abs() < 1e-9);
    }
}
