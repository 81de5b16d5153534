//! Text records: what the surface reports and what the index derives from it.

use super::geometry::Rect;
use serde::{Deserialize, Serialize};

/// Opaque handle into the text surface for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A block as reported by `TextSurface::list_blocks`
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    pub id: BlockId,
    pub rect: Rect,
    pub visible: bool,
    /// Full text of the block, used when it has no character decomposition
    pub text: String,
}

/// A character as reported by `TextSurface::characters_of`
#[derive(Debug, Clone, PartialEq)]
pub struct CharInfo {
    pub text: String,
    pub rect: Rect,
    pub visible: bool,
    pub selectable: bool,
    /// Explicit line tag supplied by the surface, if any
    pub line_tag: Option<i64>,
}

/// One visible block in the current index snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Ordinal position in the snapshot (invalidated by the next rebuild)
    pub index: usize,
    pub id: BlockId,
    pub rect: Rect,
    pub visible: bool,
    pub selectable_count: usize,
}

impl TextBlock {
    pub fn is_selectable(&self) -> bool {
        self.visible && self.selectable_count > 0
    }
}

/// Selectable character of the active block
#[derive(Debug, Clone, PartialEq)]
pub struct CharBox {
    /// Position within the block's filtered characters
    pub index: usize,
    /// Index into `TextSurface::characters_of` (None when the block is a single unit)
    pub surface_index: Option<usize>,
    pub text: String,
    pub rect: Rect,
    pub line_tag: Option<i64>,
}

/// Characters believed to share one visual row
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Character indices, ascending
    pub indices: Vec<usize>,
    /// Representative vertical center
    pub y: f64,
}

/// Linguistic token over block characters, half-open `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub word: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headword: Option<String>,
}

impl Token {
    pub fn new(word: &str, start: usize, end: usize) -> Self {
        Self {
            word: word.to_string(),
            start,
            end,
            reading: None,
            headword: None,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, char_index: usize) -> bool {
        self.start <= char_index && char_index < self.end
    }
}

/// Navigation granularity requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Character,
    Token,
}

impl Granularity {
    pub fn toggled(self) -> Self {
        match self {
            Granularity::Character => Granularity::Token,
            Granularity::Token => Granularity::Character,
        }
    }
}

/// What `NavigationCursor::unit` currently counts
///
/// Token granularity falls back to characters for a block without tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Character,
    Token,
}

/// Cursor position: block, unit within block, line of the unit's anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationCursor {
    /// None is the "no selection" state
    pub block: Option<usize>,
    pub unit: usize,
    pub line: usize,
}

impl NavigationCursor {
    pub fn at(block: usize, unit: usize) -> Self {
        Self {
            block: Some(block),
            unit,
            line: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_range() {
        let t = Token::new("食べる", 0, 3);
        assert_eq!(t.len(), 3);
        assert!(t.contains(0));
        assert!(t.contains(2));
        assert!(!t.contains(3));
    }

    #[test]
    fn test_token_json_shape() {
        let t: Token =
            serde_json::from_str(r#"{"word":"の","start":3,"end":4,"reading":"ノ"}"#).unwrap();
        assert_eq!(t.reading.as_deref(), Some("ノ"));
        assert_eq!(t.headword, None);
    }

    #[test]
    fn test_granularity_toggle() {
        assert_eq!(Granularity::Character.toggled(), Granularity::Token);
        assert_eq!(Granularity::Token.toggled(), Granularity::Character);
    }
}
