//! Furigana requests
//!
//! Each request gets a fresh id and a one-shot channel. The matching
//! `furigana` response resolves it; otherwise `tick` expires it once its
//! deadline passes.

use crate::core::protocol::{FuriganaSegment, OutboundMessage};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FuriganaError {
    #[error("not connected to the input server")]
    NotConnected,
    #[error("furigana request timed out")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuriganaResult {
    pub line_index: usize,
    pub text: String,
    pub segments: Vec<FuriganaSegment>,
}

impl FuriganaResult {
    /// Text with readings in brackets after the segments that have one
    pub fn annotated(&self) -> String {
        if self.segments.is_empty() {
            return self.text.clone();
        }
        self.segments
            .iter()
            .map(|seg| match &seg.reading {
                Some(reading) if seg.has_reading && !reading.is_empty() => {
                    format!("{}[{}]", seg.text, reading)
                }
                _ => seg.text.clone(),
            })
            .collect()
    }
}

pub type FuriganaReceiver = oneshot::Receiver<Result<FuriganaResult, FuriganaError>>;

struct PendingFurigana {
    line_index: usize,
    text: String,
    deadline: Instant,
    sender: oneshot::Sender<Result<FuriganaResult, FuriganaError>>,
}

pub struct FuriganaRequests {
    next_id: u64,
    timeout: Duration,
    pending: HashMap<u64, PendingFurigana>,
}

impl FuriganaRequests {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            next_id: 1,
            timeout: Duration::from_millis(timeout_ms),
            pending: HashMap::new(),
        }
    }

    pub fn request(
        &mut self,
        text: &str,
        line_index: usize,
        outbound: Option<&mpsc::UnboundedSender<OutboundMessage>>,
        connected: bool,
        now: Instant,
    ) -> FuriganaReceiver {
        let (tx, rx) = oneshot::channel();

        if text.is_empty() {
            let _ = tx.send(Ok(FuriganaResult {
                line_index,
                text: String::new(),
                segments: Vec::new(),
            }));
            return rx;
        }

        let Some(outbound) = outbound.filter(|_| connected) else {
            let _ = tx.send(Err(FuriganaError::NotConnected));
            return rx;
        };

        let request_id = self.next_id;
        self.next_id += 1;

        let msg = OutboundMessage::GetFurigana {
            text: text.to_string(),
            line_index,
            request_id,
        };
        if outbound.send(msg).is_err() {
            let _ = tx.send(Err(FuriganaError::NotConnected));
            return rx;
        }

        self.pending.insert(
            request_id,
            PendingFurigana {
                line_index,
                text: text.to_string(),
                deadline: now + self.timeout,
                sender: tx,
            },
        );
        rx
    }

    /// Resolve the request a response belongs to. Responses without an id
    /// are matched by line and text.
    pub fn on_response(
        &mut self,
        request_id: Option<u64>,
        line_index: usize,
        text: &str,
        segments: Vec<FuriganaSegment>,
    ) {
        let id = request_id.or_else(|| {
            self.pending
                .iter()
                .filter(|(_, p)| p.line_index == line_index && p.text == text)
                .map(|(id, _)| *id)
                .min()
        });
        let Some(pending) = id.and_then(|id| self.pending.remove(&id)) else {
            debug!("Furigana response without a pending request");
            return;
        };
        let _ = pending.sender.send(Ok(FuriganaResult {
            line_index,
            text: text.to_string(),
            segments,
        }));
    }

    pub fn tick(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(p) = self.pending.remove(&id) {
                debug!("Furigana request {} timed out", id);
                let _ = p.sender.send(Err(FuriganaError::Timeout));
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Fail everything in flight (connection lost)
    pub fn fail_all(&mut self) {
        for (_, p) in self.pending.drain() {
            let _ = p.sender.send(Err(FuriganaError::NotConnected));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotated_text() {
        let seg = |text: &str, reading: Option<&str>| FuriganaSegment {
            text: text.to_string(),
            start: 0,
            end: 0,
            has_reading: reading.is_some(),
            reading: reading.map(str::to_string),
        };
        let result = FuriganaResult {
            line_index: 0,
            text: "食べる".to_string(),
            segments: vec![seg("食", Some("た")), seg("べる", None)],
        };
        assert_eq!(result.annotated(), "食[た]べる");

        let bare = FuriganaResult {
            segments: Vec::new(),
            ..result
        };
        assert_eq!(bare.annotated(), "食べる");
    }

    #[test]
    fn test_response_resolves_matching_request() {
        let mut reqs = FuriganaRequests::new(5000);
        let (tx, mut out) = mpsc::unbounded_channel();
        let now = Instant::now();
        let mut rx = reqs.request("猫", 2, Some(&tx), true, now);
        let Ok(OutboundMessage::GetFurigana { request_id, .. }) = out.try_recv() else {
            panic!("expected get_furigana");
        };

        reqs.on_response(Some(request_id), 2, "猫", Vec::new());
        let result = rx.try_recv().unwrap().unwrap();
        assert_eq!(result.line_index, 2);
        assert_eq!(reqs.pending_count(), 0);
    }

    #[test]
    fn test_ids_increase_and_timeout_expires() {
        let mut reqs = FuriganaRequests::new(5000);
        let (tx, mut out) = mpsc::unbounded_channel();
        let now = Instant::now();
        let _first = reqs.request("a", 0, Some(&tx), true, now);
        let mut second = reqs.request("b", 1, Some(&tx), true, now);
        let ids: Vec<u64> = std::iter::from_fn(|| out.try_recv().ok())
            .filter_map(|m| match m {
                OutboundMessage::GetFurigana { request_id, .. } => Some(request_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(reqs.next_deadline(), Some(now + Duration::from_millis(5000)));

        reqs.tick(now + Duration::from_millis(4999));
        assert_eq!(reqs.pending_count(), 2);
        reqs.tick(now + Duration::from_millis(5000));
        assert_eq!(reqs.pending_count(), 0);
        assert_eq!(second.try_recv().unwrap(), Err(FuriganaError::Timeout));
    }

    #[test]
    fn test_empty_text_and_disconnected_resolve_immediately() {
        let mut reqs = FuriganaRequests::new(5000);
        let now = Instant::now();
        let mut empty = reqs.request("", 0, None, false, now);
        assert!(empty.try_recv().unwrap().unwrap().segments.is_empty());

        let (tx, _out) = mpsc::unbounded_channel();
        let mut offline = reqs.request("猫", 0, Some(&tx), false, now);
        assert_eq!(offline.try_recv().unwrap(), Err(FuriganaError::NotConnected));
        assert_eq!(reqs.pending_count(), 0);
    }
}
