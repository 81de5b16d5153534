//! Input Server wire protocol
//!
//! One JSON object per line in each direction. Inbound objects are decoded
//! into a closed set of message types; anything else is logged and dropped
//! at this boundary so the engine only ever sees valid messages.

use crate::data::Token;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Button value in a state snapshot (servers send either form)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ButtonValue {
    Pressed(bool),
    Level(f64),
}

impl ButtonValue {
    pub fn is_pressed(&self) -> bool {
        match *self {
            ButtonValue::Pressed(p) => p,
            ButtonValue::Level(v) => v > 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct DeviceState {
    #[serde(default)]
    pub buttons: HashMap<String, ButtonValue>,
    #[serde(default)]
    pub axes: HashMap<String, f64>,
}

/// Reading segment from a furigana response
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FuriganaSegment {
    pub text: String,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
    #[serde(default, rename = "hasReading")]
    pub has_reading: bool,
    #[serde(default)]
    pub reading: Option<String>,
}

/// Messages from the Input Server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    GamepadConnected {
        device: String,
        #[serde(default)]
        state: Option<DeviceState>,
    },
    GamepadDisconnected {
        device: String,
    },
    GamepadState {
        device: String,
        #[serde(default)]
        buttons: HashMap<String, ButtonValue>,
        #[serde(default)]
        axes: HashMap<String, f64>,
    },
    Button {
        device: String,
        button: u32,
        #[serde(default)]
        name: Option<String>,
        pressed: bool,
    },
    Axis {
        device: String,
        axis: String,
        value: f64,
    },
    Tokens {
        #[serde(rename = "blockIndex")]
        block_index: usize,
        #[serde(default)]
        tokens: Vec<Token>,
        #[serde(default)]
        text: String,
        #[serde(default, rename = "mecabAvailable")]
        mecab_available: bool,
        #[serde(default, rename = "tokenSource")]
        token_source: Option<String>,
    },
    Furigana {
        #[serde(default, rename = "lineIndex")]
        line_index: usize,
        #[serde(default)]
        segments: Vec<FuriganaSegment>,
        #[serde(default)]
        text: String,
        #[serde(default, rename = "requestId")]
        request_id: Option<u64>,
        #[serde(default, rename = "mecabAvailable")]
        mecab_available: bool,
    },
    Pong,
}

const INBOUND_TYPES: &[&str] = &[
    "gamepad_connected",
    "gamepad_disconnected",
    "gamepad_state",
    "button",
    "axis",
    "tokens",
    "furigana",
    "pong",
];

/// Messages to the Input Server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    GetState,
    Ping,
    Tokenize {
        #[serde(rename = "blockIndex")]
        block_index: usize,
        text: String,
    },
    GetFurigana {
        text: String,
        #[serde(rename = "lineIndex")]
        line_index: usize,
        #[serde(rename = "requestId")]
        request_id: u64,
    },
}

impl OutboundMessage {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Decode one inbound line; unknown or malformed messages are logged and dropped
pub fn decode_inbound(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!("Dropping malformed server message: {}", e);
            return None;
        }
    };

    let Some(kind) = value.get("type").and_then(|t| t.as_str()) else {
        warn!("Dropping server message without a type tag");
        return None;
    };
    if !INBOUND_TYPES.contains(&kind) {
        debug!("Ignoring unknown server message type: {}", kind);
        return None;
    }

    match serde_json::from_value(value.clone()) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Dropping invalid '{}' message: {}", kind, e);
            None
        }
    }
}
