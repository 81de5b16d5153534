//! Tokenization gateway
//!
//! Requests token segmentation for blocks from either the remote tokenizer
//! (through the Input Server connection) or the local dictionary engine.
//! Results are correlated by block index plus the exact text they were
//! computed for; a response for text the block no longer has is re-requested
//! instead of applied.

use crate::config::{TokenizerBackend, TokenizerConfig};
use crate::core::local_engine::{LocalEngine, LocalEngineError};
use crate::core::protocol::OutboundMessage;
use crate::data::Token;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
struct CacheEntry {
    text: String,
    tokens: Vec<Token>,
}

/// Tokens per block index, valid only for the text they were computed on
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    entries: HashMap<usize, CacheEntry>,
}

impl TokenCache {
    /// Cached tokens for `block`, if they were computed for exactly `text`
    pub fn tokens_for(&self, block: usize, text: &str) -> Option<&[Token]> {
        self.entries
            .get(&block)
            .filter(|e| e.text == text)
            .map(|e| e.tokens.as_slice())
    }

    pub fn insert(&mut self, block: usize, text: String, tokens: Vec<Token>) {
        self.entries.insert(block, CacheEntry { text, tokens });
    }

    /// Drop entries for blocks that no longer exist
    pub fn prune(&mut self, block_count: usize) {
        self.entries.retain(|&block, _| block < block_count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a local engine request, delivered back to the engine loop
#[derive(Debug)]
pub struct TokenizeReply {
    pub block: usize,
    pub text: String,
    pub result: Result<Vec<Token>, LocalEngineError>,
}

/// What happened to a tokenization response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Tokens cached for the block's current text
    Applied { block: usize },
    /// Text changed since the request; a fresh request was issued
    Reissued { block: usize },
    /// Segmentation failed; the block stays at character granularity
    Failed { block: usize },
    /// Block no longer exists
    Dropped,
}

/// Drop out-of-range, empty and overlapping tokens; sort by start
pub fn sanitize_tokens(mut tokens: Vec<Token>, char_count: usize) -> Vec<Token> {
    tokens.retain(|t| !t.is_empty() && t.end <= char_count);
    tokens.sort_by_key(|t| (t.start, t.end));

    let mut clean: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if clean.last().is_some_and(|prev| token.start < prev.end) {
            continue;
        }
        clean.push(token);
    }
    clean
}

pub struct TokenizerGateway {
    backend: TokenizerBackend,
    cache: TokenCache,
    /// Block index -> text of the request in flight
    pending: HashMap<usize, String>,
    outbound: Option<mpsc::UnboundedSender<OutboundMessage>>,
    replies: Option<mpsc::UnboundedSender<TokenizeReply>>,
    local: LocalEngine,
    engine_available: bool,
}

impl TokenizerGateway {
    pub fn new(config: &TokenizerConfig) -> Self {
        Self {
            backend: config.backend,
            cache: TokenCache::default(),
            pending: HashMap::new(),
            outbound: None,
            replies: None,
            local: LocalEngine::new(
                &config.base_url,
                config.scan_length,
                config.clamped_timeout_ms(),
            ),
            engine_available: false,
        }
    }

    /// Channel used for remote `tokenize` requests
    pub fn set_outbound(&mut self, outbound: mpsc::UnboundedSender<OutboundMessage>) {
        self.outbound = Some(outbound);
    }

    /// Channel local engine replies are delivered on
    pub fn set_replies(&mut self, replies: mpsc::UnboundedSender<TokenizeReply>) {
        self.replies = Some(replies);
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TokenCache {
        &mut self.cache
    }

    pub fn engine_available(&self) -> bool {
        self.engine_available
    }

    pub fn is_pending(&self, block: usize, text: &str) -> bool {
        self.pending.get(&block).is_some_and(|t| t == text)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Ask for tokens of `block`. No-op when cached, already pending for the
    /// same text, or (remote backend) while disconnected.
    pub fn request(&mut self, block: usize, text: &str, connected: bool) {
        if text.trim().is_empty()
            || self.cache.tokens_for(block, text).is_some()
            || self.is_pending(block, text)
        {
            return;
        }

        match self.backend {
            TokenizerBackend::Remote => {
                if !connected {
                    debug!("Not connected; tokenization of block {} deferred", block);
                    return;
                }
                let Some(outbound) = &self.outbound else {
                    return;
                };
                let msg = OutboundMessage::Tokenize {
                    block_index: block,
                    text: text.to_string(),
                };
                if outbound.send(msg).is_err() {
                    warn!("Transport channel closed; tokenization of block {} dropped", block);
                    return;
                }
            }
            TokenizerBackend::Local => {
                let Some(replies) = self.replies.clone() else {
                    return;
                };
                let engine = self.local.clone();
                let owned = text.to_string();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            let result = engine.tokenize(&owned).await;
                            let _ = replies.send(TokenizeReply {
                                block,
                                text: owned,
                                result,
                            });
                        });
                    }
                    Err(_) => {
                        let _ = replies.send(TokenizeReply {
                            block,
                            text: owned,
                            result: Err(LocalEngineError::NoRuntime),
                        });
                    }
                }
            }
        }

        debug!("Requested tokens for block {} ({} chars)", block, text.chars().count());
        self.pending.insert(block, text.to_string());
    }

    /// Handle tokens computed for (`block`, `text`).
    ///
    /// `current_text` is the block's text now, None if it vanished.
    pub fn on_response(
        &mut self,
        block: usize,
        text: &str,
        tokens: Result<Vec<Token>, String>,
        current_text: Option<&str>,
        connected: bool,
    ) -> ResponseOutcome {
        if self.is_pending(block, text) {
            self.pending.remove(&block);
        }

        let Some(current) = current_text else {
            debug!("Tokens for vanished block {} dropped", block);
            return ResponseOutcome::Dropped;
        };

        if current != text {
            debug!("Stale tokens for block {}; requesting current text", block);
            self.request(block, current, connected);
            return ResponseOutcome::Reissued { block };
        }

        let tokens = match tokens {
            Ok(tokens) => sanitize_tokens(tokens, current.chars().count()),
            Err(e) => {
                debug!("Tokenization of block {} failed: {}", block, e);
                Vec::new()
            }
        };
        if tokens.is_empty() {
            return ResponseOutcome::Failed { block };
        }

        self.cache.insert(block, text.to_string(), tokens);
        ResponseOutcome::Applied { block }
    }

    /// Remote handler for an engine availability report
    pub fn set_engine_available(&mut self, available: bool) {
        if available != self.engine_available {
            info!("Tokenizer engine available: {}", available);
        }
        self.engine_available = available;
    }

    /// Remote requests in flight are lost with the connection
    pub fn on_disconnected(&mut self) {
        if self.backend == TokenizerBackend::Remote {
            self.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> (TokenizerGateway, mpsc::UnboundedReceiver<OutboundMessage>) {
        let mut gw = TokenizerGateway::new(&TokenizerConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        gw.set_outbound(tx);
        (gw, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_duplicate_pending_request_sends_once() {
        let (mut gw, mut rx) = gateway();
        gw.request(0, "猫が好き", true);
        gw.request(0, "猫が好き", true);
        assert_eq!(drain(&mut rx).len(), 1);

        // Different text for the same block is a new request
        gw.request(0, "犬が好き", true);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_disconnected_records_nothing() {
        let (mut gw, mut rx) = gateway();
        gw.request(0, "猫", false);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(gw.pending_count(), 0);
        gw.request(0, "猫", true);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_matching_response_is_cached() {
        let (mut gw, mut rx) = gateway();
        gw.request(1, "食べる", true);
        drain(&mut rx);
        let outcome = gw.on_response(
            1,
            "食べる",
            Ok(vec![Token::new("食べる", 0, 3)]),
            Some("食べる"),
            true,
        );
        assert_eq!(outcome, ResponseOutcome::Applied { block: 1 });
        assert_eq!(gw.cache().tokens_for(1, "食べる").map(|t| t.len()), Some(1));
        assert!(gw.cache().tokens_for(1, "食べた").is_none());

        // Cached: no new request
        gw.request(1, "食べる", true);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_stale_response_reissues_with_current_text() {
        let (mut gw, mut rx) = gateway();
        gw.request(0, "old", true);
        drain(&mut rx);
        let outcome = gw.on_response(0, "old", Ok(vec![Token::new("old", 0, 3)]), Some("new text"), true);
        assert_eq!(outcome, ResponseOutcome::Reissued { block: 0 });
        assert_eq!(
            drain(&mut rx),
            vec![OutboundMessage::Tokenize {
                block_index: 0,
                text: "new text".to_string()
            }]
        );
        assert!(gw.cache().is_empty());
    }

    #[test]
    fn test_empty_or_failed_response_falls_back() {
        let (mut gw, _rx) = gateway();
        assert_eq!(
            gw.on_response(0, "abc", Ok(Vec::new()), Some("abc"), true),
            ResponseOutcome::Failed { block: 0 }
        );
        assert_eq!(
            gw.on_response(0, "abc", Err("timeout".to_string()), Some("abc"), true),
            ResponseOutcome::Failed { block: 0 }
        );
        assert_eq!(
            gw.on_response(5, "abc", Ok(Vec::new()), None, true),
            ResponseOutcome::Dropped
        );
    }

    #[test]
    fn test_sanitize_tokens() {
        let tokens = vec![
            Token::new("c", 2, 3),
            Token::new("ab", 0, 2),
            Token::new("bc", 1, 3),
            Token::new("", 3, 3),
            Token::new("far", 3, 9),
        ];
        let clean = sanitize_tokens(tokens, 4);
        let ranges: Vec<(usize, usize)> = clean.iter().map(|t| (t.start, t.end)).collect();
        assert_eq!(ranges, vec![(0, 2), (2, 3)]);
    }

    #[test]
    fn test_cache_prune() {
        let mut cache = TokenCache::default();
        cache.insert(0, "a".to_string(), vec![Token::new("a", 0, 1)]);
        cache.insert(3, "b".to_string(), vec![Token::new("b", 0, 1)]);
        cache.prune(2);
        assert_eq!(cache.len(), 1);
        assert!(cache.tokens_for(0, "a").is_some());
    }

    #[tokio::test]
    async fn test_local_backend_failure_is_delivered_as_reply() {
        let mut config = TokenizerConfig::default();
        config.backend = TokenizerBackend::Local;
        config.base_url = "http://127.0.0.1:9".to_string();
        config.timeout_ms = 200;
        let mut gw = TokenizerGateway::new(&config);
        let (tx, mut rx) = mpsc::unbounded_channel();
        gw.set_replies(tx);

        gw.request(0, "猫", false);
        assert!(gw.is_pending(0, "猫"));
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.block, 0);
        assert!(reply.result.is_err());
    }
}
