//! Stand-in for the dictionary popup.
//!
//! A lookup click that hits text "shows" the popup; a dismiss click hides it.
//! The lifecycle goes back to the engine as `PopupEvent`s on a channel, the
//! same way a real host reports it.

use crate::data::{CharTarget, ControlMessage, PopupEvent, PopupId, SyntheticEvent};
use crate::lookup::LookupTool;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;

const ACTIVITY_LINES: usize = 8;
const POPUP_ID: &str = "preview";

pub struct SimulatedPopupLookup {
    popup_tx: mpsc::UnboundedSender<PopupEvent>,
    visible: bool,
    activity: VecDeque<String>,
    mined: usize,
}

impl SimulatedPopupLookup {
    pub fn new(popup_tx: mpsc::UnboundedSender<PopupEvent>) -> Self {
        Self {
            popup_tx,
            visible: false,
            activity: VecDeque::with_capacity(ACTIVITY_LINES),
            mined: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn mined(&self) -> usize {
        self.mined
    }

    /// Most recent first
    pub fn activity(&self) -> Vec<String> {
        self.activity.iter().rev().cloned().collect()
    }

    fn log(&mut self, line: String) {
        debug!("Preview popup: {}", line);
        if self.activity.len() == ACTIVITY_LINES {
            self.activity.pop_front();
        }
        self.activity.push_back(line);
    }

    fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        let id = Some(PopupId(POPUP_ID.to_string()));
        let event = if visible {
            PopupEvent::Shown { id }
        } else {
            PopupEvent::Hidden { id }
        };
        let _ = self.popup_tx.send(event);
    }
}

fn describe(target: &CharTarget) -> String {
    match target.char_index {
        Some(c) => format!("{}:{}", target.block, c),
        None => target.block.to_string(),
    }
}

impl LookupTool for SimulatedPopupLookup {
    fn dispatch(&mut self, event: SyntheticEvent) {
        match event {
            SyntheticEvent::PointerMove { .. } => {}
            SyntheticEvent::PointerLeave => self.log("pointer leave".to_string()),
            SyntheticEvent::Click {
                at,
                target: Some(target),
            } => {
                self.log(format!("lookup {} at ({:.0}, {:.0})", describe(&target), at.x, at.y));
                self.set_visible(true);
            }
            SyntheticEvent::Click { target: None, .. } => {
                if self.visible {
                    self.log("dismiss".to_string());
                }
                self.set_visible(false);
            }
            SyntheticEvent::Control(control) => {
                if !self.visible {
                    return;
                }
                let line = match control {
                    ControlMessage::Mine { card_format_index } => {
                        self.mined += 1;
                        format!("mined (card format {})", card_format_index)
                    }
                    ControlMessage::Scroll { delta } => format!("scroll {:+.1}", delta),
                    ControlMessage::SelectAction { direction } => format!("select action {:+}", direction),
                    ControlMessage::ConfirmAction => "confirm action".to_string(),
                    ControlMessage::ResetActionSelection => "reset action selection".to_string(),
                    ControlMessage::ClearActionSelection => "clear action selection".to_string(),
                };
                self.log(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BlockId, Point};

    fn lookup_click() -> SyntheticEvent {
        SyntheticEvent::Click {
            at: Point::new(5.0, 10.0),
            target: Some(CharTarget {
                block: BlockId(1),
                char_index: Some(2),
            }),
        }
    }

    fn dismiss_click() -> SyntheticEvent {
        SyntheticEvent::Click {
            at: Point::new(0.0, 0.0),
            target: None,
        }
    }

    #[test]
    fn test_lookup_shows_and_dismiss_hides() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut popup = SimulatedPopupLookup::new(tx);

        popup.dispatch(dismiss_click());
        assert!(rx.try_recv().is_err());

        popup.dispatch(lookup_click());
        popup.dispatch(lookup_click());
        assert!(popup.is_visible());
        assert!(matches!(rx.try_recv(), Ok(PopupEvent::Shown { .. })));
        assert!(rx.try_recv().is_err());

        popup.dispatch(dismiss_click());
        assert!(!popup.is_visible());
        assert!(matches!(rx.try_recv(), Ok(PopupEvent::Hidden { .. })));
        assert_eq!(popup.activity()[0], "dismiss");
        assert_eq!(popup.activity()[1], "lookup b1:2 at (5, 10)");
    }

    #[test]
    fn test_mine_counted_only_while_visible() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut popup = SimulatedPopupLookup::new(tx);
        let mine = SyntheticEvent::Control(ControlMessage::Mine { card_format_index: 0 });

        popup.dispatch(mine.clone());
        assert_eq!(popup.mined(), 0);

        popup.dispatch(lookup_click());
        popup.dispatch(mine);
        assert_eq!(popup.mined(), 1);
    }

    #[test]
    fn test_activity_is_bounded() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut popup = SimulatedPopupLookup::new(tx);
        for _ in 0..20 {
            popup.dispatch(SyntheticEvent::PointerLeave);
        }
        assert_eq!(popup.activity().len(), ACTIVITY_LINES);
    }
}
