//! Lookup tool collaborator
//!
//! The engine only emits `SyntheticEvent`s; the host decides how they reach
//! the dictionary popup. Popup lifecycle comes back as `PopupEvent`s.

use crate::data::SyntheticEvent;
use std::io::Write;

pub trait LookupTool {
    fn dispatch(&mut self, event: SyntheticEvent);
}

/// Writes each event as one JSON line (stdout sink of the CLI host)
pub struct JsonLinesLookup<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesLookup<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> LookupTool for JsonLinesLookup<W> {
    fn dispatch(&mut self, event: SyntheticEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to serialize synthetic event: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            tracing::warn!("Failed to write synthetic event: {}", e);
        }
    }
}

/// Keeps every dispatched event in memory
#[derive(Debug, Default)]
pub struct RecordingLookup {
    pub events: Vec<SyntheticEvent>,
}

impl RecordingLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<SyntheticEvent> {
        std::mem::take(&mut self.events)
    }
}

impl LookupTool for RecordingLookup {
    fn dispatch(&mut self, event: SyntheticEvent) {
        self.events.push(event);
    }
}
