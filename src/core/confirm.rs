//! Confirm/mine gate and popup visibility
//!
//! A first confirm on a target dispatches a lookup and arms a mine
//! candidate. A second confirm on the same target while the popup is still
//! visible mines instead. Anything that moves the target clears the candidate.

use crate::data::{BlockId, Point, PopupId, UnitKind};
use std::collections::HashSet;
use tracing::debug;

/// Identity of "what confirm is pointing at"
pub fn anchor_key(kind: UnitKind, block: BlockId, char_index: usize) -> String {
    let mode = match kind {
        UnitKind::Character => "char",
        UnitKind::Token => "token",
    };
    format!("{}:{}:{}", mode, block, char_index)
}

/// Anchor key for a pointer-targeted confirm
pub fn pointer_key(block: BlockId, char_index: Option<usize>, at: Point) -> String {
    match char_index {
        Some(c) => format!("pointer:{}:{}", block, c),
        None => format!("pointer:{}:{:.0}:{:.0}", block, at.x, at.y),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMineCandidate {
    pub anchor_key: String,
    pub block: usize,
    pub unit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    Lookup,
    Mine,
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmGate {
    candidate: Option<PendingMineCandidate>,
}

impl ConfirmGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mine when `target` matches the armed candidate and the popup is up,
    /// otherwise arm `target` for a lookup
    pub fn confirm(&mut self, target: PendingMineCandidate, popup_visible: bool) -> ConfirmDecision {
        // Key, block index and unit must all agree
        let matches = self.candidate.as_ref() == Some(&target);
        if matches && popup_visible {
            self.candidate = None;
            debug!("Mining {}", target.anchor_key);
            return ConfirmDecision::Mine;
        }
        self.candidate = Some(target);
        ConfirmDecision::Lookup
    }

    pub fn clear(&mut self) {
        self.candidate = None;
    }

    pub fn candidate(&self) -> Option<&PendingMineCandidate> {
        self.candidate.as_ref()
    }
}

/// Reference-counted popup visibility
#[derive(Debug, Clone, Default)]
pub struct PopupTracker {
    identities: HashSet<PopupId>,
    anonymous: usize,
}

impl PopupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_shown(&mut self, id: Option<PopupId>) {
        match id {
            Some(id) => {
                self.identities.insert(id);
            }
            None => self.anonymous += 1,
        }
    }

    /// Returns true when this made the last popup disappear
    pub fn on_hidden(&mut self, id: Option<&PopupId>) -> bool {
        let was_visible = self.is_visible();
        match id {
            Some(id) => {
                self.identities.remove(id);
            }
            None if self.anonymous > 0 => self.anonymous -= 1,
            None => self.identities.clear(),
        }
        was_visible && !self.is_visible()
    }

    pub fn count(&self) -> usize {
        self.identities.len() + self.anonymous
    }

    pub fn is_visible(&self) -> bool {
        self.count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(key: &str) -> PendingMineCandidate {
        PendingMineCandidate {
            anchor_key: key.to_string(),
            block: 0,
            unit: 0,
        }
    }

    #[test]
    fn test_second_confirm_mines_once() {
        let mut gate = ConfirmGate::new();
        assert_eq!(gate.confirm(target("char:b1:0"), true), ConfirmDecision::Lookup);
        assert_eq!(gate.confirm(target("char:b1:0"), true), ConfirmDecision::Mine);
        assert!(gate.candidate().is_none());
        // Third press starts over
        assert_eq!(gate.confirm(target("char:b1:0"), true), ConfirmDecision::Lookup);
    }

    #[test]
    fn test_mine_needs_visible_popup_and_same_target() {
        let mut gate = ConfirmGate::new();
        gate.confirm(target("char:b1:0"), false);
        assert_eq!(gate.confirm(target("char:b1:0"), false), ConfirmDecision::Lookup);
        assert_eq!(gate.confirm(target("char:b1:1"), true), ConfirmDecision::Lookup);
        gate.clear();
        assert_eq!(gate.confirm(target("char:b1:1"), true), ConfirmDecision::Lookup);
    }

    #[test]
    fn test_same_key_at_new_position_looks_up_again() {
        let mut gate = ConfirmGate::new();
        gate.confirm(target("char:b2:0"), true);
        let renumbered = PendingMineCandidate {
            block: 2,
            ..target("char:b2:0")
        };
        assert_eq!(gate.confirm(renumbered.clone(), true), ConfirmDecision::Lookup);
        assert_eq!(gate.candidate(), Some(&renumbered));
        assert_eq!(gate.confirm(renumbered, true), ConfirmDecision::Mine);
    }

    #[test]
    fn test_popup_reference_counting() {
        let mut popups = PopupTracker::new();
        let a = PopupId("a".to_string());
        let b = PopupId("b".to_string());
        popups.on_shown(Some(a.clone()));
        popups.on_shown(Some(a.clone()));
        popups.on_shown(Some(b.clone()));
        assert_eq!(popups.count(), 2);
        assert!(!popups.on_hidden(Some(&a)));
        assert!(popups.on_hidden(Some(&b)));
        assert!(!popups.is_visible());
        assert!(!popups.on_hidden(Some(&b)));
    }

    #[test]
    fn test_anonymous_popups() {
        let mut popups = PopupTracker::new();
        popups.on_shown(None);
        popups.on_shown(Some(PopupId("x".to_string())));
        assert!(!popups.on_hidden(None));
        assert!(popups.on_hidden(None));
    }

    #[test]
    fn test_anchor_keys() {
        assert_eq!(anchor_key(UnitKind::Token, BlockId(4), 2), "token:b4:2");
        assert_eq!(pointer_key(BlockId(1), None, Point::new(10.4, 20.6)), "pointer:b1:10:21");
    }
}
