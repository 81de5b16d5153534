//! Local dictionary engine client
//!
//! `POST {base_url}/tokenize` with `{text, scanLength}`. The response is a
//! list of parse results; each result's `content` is a list of groups and
//! each group a list of segments. Groups are converted into `Token`s by
//! locating their concatenated text in the source.

use crate::data::Token;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LocalEngineError {
    #[error("request to local engine failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("local engine returned status {0}")]
    Status(u16),

    #[error("local engine returned no usable parse")]
    EmptyParse,

    #[error("no async runtime available")]
    NoRuntime,
}

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    text: &'a str,
    #[serde(rename = "scanLength")]
    scan_length: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseResult {
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub content: Vec<Vec<Segment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reading: String,
    #[serde(default)]
    pub headwords: Vec<Vec<Headword>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Headword {
    #[serde(default)]
    pub term: String,
}

/// HTTP client for the engine's tokenize endpoint
#[derive(Debug, Clone)]
pub struct LocalEngine {
    client: reqwest::Client,
    base_url: String,
    scan_length: u32,
    timeout: Duration,
}

impl LocalEngine {
    pub fn new(base_url: &str, scan_length: u32, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            scan_length,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub async fn tokenize(&self, text: &str) -> Result<Vec<Token>, LocalEngineError> {
        let url = format!("{}/tokenize", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&TokenizeRequest {
                text,
                scan_length: self.scan_length,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LocalEngineError::Status(response.status().as_u16()));
        }

        let results: Vec<ParseResult> = response.json().await?;
        let groups = best_parse(&results).ok_or(LocalEngineError::EmptyParse)?;
        let tokens = groups_to_tokens(text, groups);
        if tokens.is_empty() {
            return Err(LocalEngineError::EmptyParse);
        }
        debug!("Local engine produced {} tokens", tokens.len());
        Ok(tokens)
    }
}

/// The `index == 0` result with the most groups
pub fn best_parse(results: &[ParseResult]) -> Option<&[Vec<Segment>]> {
    results
        .iter()
        .filter(|r| r.index == 0 && !r.content.is_empty())
        .max_by_key(|r| r.content.len())
        .map(|r| r.content.as_slice())
}

/// Convert parse groups into tokens over `text`.
///
/// Each group is searched for from the end of the previous one. When any
/// group cannot be found the whole text falls back to one token per character.
pub fn groups_to_tokens(text: &str, groups: &[Vec<Segment>]) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::with_capacity(groups.len());
    let mut offset = 0;

    for group in groups {
        let word: String = group.iter().map(|s| s.text.as_str()).collect();
        if word.is_empty() {
            continue;
        }
        let word_chars: Vec<char> = word.chars().collect();

        let Some(start) = find_chars(&chars, &word_chars, offset) else {
            debug!("Parse group {:?} not found after offset {}", word, offset);
            return per_char_tokens(&chars);
        };
        let end = start + word_chars.len();
        offset = end;

        // Whitespace advances the offset but is not a navigable token
        if word.trim().is_empty() {
            continue;
        }

        let reading: String = group
            .iter()
            .map(|s| if s.reading.is_empty() { s.text.as_str() } else { s.reading.as_str() })
            .collect();
        let headword = group
            .first()
            .and_then(|s| s.headwords.first())
            .and_then(|h| h.first())
            .map(|h| h.term.clone())
            .filter(|t| !t.is_empty());

        tokens.push(Token {
            word,
            start,
            end,
            reading: (!reading.is_empty()).then_some(reading),
            headword,
        });
    }

    tokens
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() || needle.len() > haystack.len() - from {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn per_char_tokens(chars: &[char]) -> Vec<Token> {
    chars
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace())
        .map(|(i, c)| Token::new(&c.to_string(), i, i + 1))
        .collect()
}
