//! Deadline-based timers
//!
//! Nothing here sleeps. Deadlines are stored and the engine loop asks for
//! the earliest one, then calls back in with the current time.

use crate::core::input_router::Direction;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Key repeat for held d-pad directions
#[derive(Debug, Clone)]
pub struct RepeatScheduler {
    delay: Duration,
    rate: Duration,
    /// (device, direction) -> next fire time
    held: HashMap<(String, Direction), Instant>,
}

impl RepeatScheduler {
    pub fn new(delay_ms: u64, rate_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            rate: Duration::from_millis(rate_ms.max(1)),
            held: HashMap::new(),
        }
    }

    pub fn start(&mut self, device: &str, direction: Direction, now: Instant) {
        self.held
            .insert((device.to_string(), direction), now + self.delay);
    }

    pub fn stop(&mut self, device: &str, direction: Direction) {
        self.held.remove(&(device.to_string(), direction));
    }

    pub fn stop_device(&mut self, device: &str) {
        self.held.retain(|(d, _), _| d != device);
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Repeats due at `now`, at most one per held direction
    pub fn due(&mut self, now: Instant) -> Vec<(String, Direction)> {
        let mut fired = Vec::new();
        for ((device, direction), next) in self.held.iter_mut() {
            if *next <= now {
                fired.push((device.clone(), *direction));
                *next += self.rate;
                if *next <= now {
                    *next = now + self.rate;
                }
            }
        }
        fired.sort_by(|a, b| a.0.cmp(&b.0));
        fired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.held.values().min().copied()
    }
}

/// Leading-edge debounce for dismiss clicks
#[derive(Debug, Clone)]
pub struct DismissDebouncer {
    window: Duration,
    last: Option<Instant>,
}

impl DismissDebouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window: Duration::from_millis(window_ms),
            last: None,
        }
    }

    /// Whether a dismiss at `now` should actually be dispatched
    pub fn should_dispatch(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_repeat_delay_then_rate() {
        let mut repeat = RepeatScheduler::new(400, 150);
        let t = Instant::now();
        repeat.start("pad0", Direction::Down, t);
        assert!(repeat.due(t + ms(399)).is_empty());
        assert_eq!(repeat.due(t + ms(400)).len(), 1);
        assert!(repeat.due(t + ms(549)).is_empty());
        assert_eq!(repeat.due(t + ms(550)).len(), 1);
        assert_eq!(repeat.next_deadline(), Some(t + ms(700)));
    }

    #[test]
    fn test_release_stops_repeat() {
        let mut repeat = RepeatScheduler::new(400, 150);
        let t = Instant::now();
        repeat.start("pad0", Direction::Left, t);
        repeat.start("pad1", Direction::Left, t);
        repeat.stop("pad0", Direction::Left);
        assert_eq!(repeat.due(t + ms(400)), vec![("pad1".to_string(), Direction::Left)]);
        repeat.stop_device("pad1");
        assert!(repeat.is_empty());
        assert_eq!(repeat.next_deadline(), None);
    }

    #[test]
    fn test_late_tick_does_not_burst() {
        let mut repeat = RepeatScheduler::new(400, 150);
        let t = Instant::now();
        repeat.start("pad0", Direction::Up, t);
        assert_eq!(repeat.due(t + ms(2000)).len(), 1);
        assert_eq!(repeat.next_deadline(), Some(t + ms(2150)));
    }

    #[test]
    fn test_dismiss_debounce() {
        let mut debounce = DismissDebouncer::new(90);
        let t = Instant::now();
        assert!(debounce.should_dispatch(t));
        assert!(!debounce.should_dispatch(t + ms(50)));
        assert!(!debounce.should_dispatch(t + ms(89)));
        assert!(debounce.should_dispatch(t + ms(90)));
        debounce.reset();
        assert!(debounce.should_dispatch(t + ms(91)));
    }
}
