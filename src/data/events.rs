//! Events exchanged with the text surface and the lookup tool.

use super::geometry::Point;
use super::text::BlockId;
use serde::{Deserialize, Serialize};

/// Which character a synthetic pointer event is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharTarget {
    pub block: BlockId,
    /// Position in `TextSurface::characters_of(block)`, None for a whole-block unit
    pub char_index: Option<usize>,
}

/// Synthetic input dispatched at the surface / lookup tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyntheticEvent {
    /// Pointer move followed by an enter on the target
    PointerMove {
        at: Point,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<CharTarget>,
    },
    /// Clear any scan started by earlier pointer moves
    PointerLeave,
    /// Lookup click (with a target) or dismiss click (without)
    Click {
        at: Point,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<CharTarget>,
    },
    /// Control message broadcast to the lookup tool's frames
    Control(ControlMessage),
}

/// Control vocabulary understood by the lookup tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    Scroll { delta: f64 },
    SelectAction { direction: i32 },
    ConfirmAction,
    ResetActionSelection,
    ClearActionSelection,
    Mine {
        #[serde(rename = "cardFormatIndex")]
        card_format_index: u32,
    },
}

/// Identity of one popup reported by the lookup tool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopupId(pub String);

/// Popup lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "popup", rename_all = "lowercase")]
pub enum PopupEvent {
    Shown {
        #[serde(default)]
        id: Option<PopupId>,
    },
    Hidden {
        #[serde(default)]
        id: Option<PopupId>,
    },
}

/// Notification from the text surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Mutated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popup_event_json() {
        let shown: PopupEvent = serde_json::from_str(r#"{"popup":"shown","id":"a"}"#).unwrap();
        assert_eq!(
            shown,
            PopupEvent::Shown {
                id: Some(PopupId("a".to_string()))
            }
        );
        let hidden: PopupEvent = serde_json::from_str(r#"{"popup":"hidden"}"#).unwrap();
        assert_eq!(hidden, PopupEvent::Hidden { id: None });
    }

    #[test]
    fn test_control_message_json() {
        let json = serde_json::to_string(&SyntheticEvent::Control(ControlMessage::Mine {
            card_format_index: 0,
        }))
        .unwrap();
        assert_eq!(json, r#"{"event":"control","type":"mine","cardFormatIndex":0}"#);

        let json = serde_json::to_string(&SyntheticEvent::Click {
            at: Point::new(1.0, 2.0),
            target: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"click","at":{"x":1.0,"y":2.0}}"#);
    }
}
