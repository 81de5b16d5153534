//! Text index: the engine's snapshot of the text surface
//!
//! Holds the visible blocks in ordinal order, the selectable characters of
//! the active block, their line grouping, and the token segmentation of the
//! active block when the cached tokens still match its text.
//!
//! Everything here is rebuilt from the surface on refresh; nothing keeps a
//! live reference into the surface between rebuilds.

use crate::core::tokenizer::TokenCache;
use crate::data::{
    BlockId, CharBox, CharInfo, Granularity, Line, Rect, TextBlock, Token, UnitKind,
};
use crate::surface::TextSurface;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TextIndex {
    blocks: Vec<TextBlock>,
    /// Concatenated selectable text per block (same order as `blocks`)
    block_texts: Vec<String>,
    active: Option<usize>,
    characters: Vec<CharBox>,
    /// Character index -> line index
    char_lines: Vec<usize>,
    lines: Vec<Line>,
    tokens: Vec<Token>,
    line_tolerance: f64,
}

/// Whether a surface character takes part in navigation
fn is_selectable_char(c: &CharInfo) -> bool {
    c.visible && c.selectable && !c.text.is_empty() && c.text != "\n"
}

impl TextIndex {
    pub fn new(line_tolerance: f64) -> Self {
        Self {
            blocks: Vec::new(),
            block_texts: Vec::new(),
            active: None,
            characters: Vec::new(),
            char_lines: Vec::new(),
            lines: Vec::new(),
            tokens: Vec::new(),
            line_tolerance,
        }
    }

    /// Re-read the block list. The active block is left unloaded.
    pub fn rebuild_blocks(&mut self, surface: &dyn TextSurface) {
        self.blocks.clear();
        self.block_texts.clear();
        self.active = None;
        self.characters.clear();
        self.char_lines.clear();
        self.lines.clear();
        self.tokens.clear();

        for info in surface.list_blocks().into_iter().filter(|b| b.visible) {
            let chars = surface.characters_of(info.id);
            let (count, text) = if chars.is_empty() {
                // No decomposition: the whole block is one unit
                if info.text.trim().is_empty() {
                    (0, String::new())
                } else {
                    (1, info.text.clone())
                }
            } else {
                let selectable: Vec<&CharInfo> =
                    chars.iter().filter(|c| is_selectable_char(c)).collect();
                let text = selectable.iter().map(|c| c.text.as_str()).collect();
                (selectable.len(), text)
            };

            self.blocks.push(TextBlock {
                index: self.blocks.len(),
                id: info.id,
                rect: info.rect,
                visible: info.visible,
                selectable_count: count,
            });
            self.block_texts.push(text);
        }

        debug!("Text index found {} visible blocks", self.blocks.len());
    }

    /// Load characters, lines and matching cached tokens for one block
    pub fn load_active(
        &mut self,
        surface: &dyn TextSurface,
        block: Option<usize>,
        cache: &TokenCache,
    ) {
        self.active = block.filter(|&b| b < self.blocks.len());
        self.characters.clear();
        self.tokens.clear();

        if let Some(b) = self.active {
            let info = &self.blocks[b];
            let chars = surface.characters_of(info.id);
            if chars.is_empty() {
                if info.selectable_count > 0 {
                    self.characters.push(CharBox {
                        index: 0,
                        surface_index: None,
                        text: self.block_texts[b].clone(),
                        rect: info.rect,
                        line_tag: None,
                    });
                }
            } else {
                self.characters = chars
                    .into_iter()
                    .enumerate()
                    .filter(|(_, c)| is_selectable_char(c))
                    .enumerate()
                    .map(|(index, (surface_index, c))| CharBox {
                        index,
                        surface_index: Some(surface_index),
                        text: c.text,
                        rect: c.rect,
                        line_tag: c.line_tag,
                    })
                    .collect();
            }

            if let Some(tokens) = cache.tokens_for(b, &self.block_texts[b]) {
                self.tokens = tokens.to_vec();
            }
        }

        self.build_lines();
        debug!(
            "Block {:?}: {} characters, {} lines, {} tokens",
            self.active,
            self.characters.len(),
            self.lines.len(),
            self.tokens.len()
        );
    }

    /// Group characters into lines: explicit tags when present, otherwise geometry
    fn build_lines(&mut self) {
        self.lines.clear();
        self.char_lines = vec![0; self.characters.len()];
        if self.characters.is_empty() {
            return;
        }

        if self.characters.iter().any(|c| c.line_tag.is_some()) {
            // Untagged characters ride along with the last tagged one before them
            let first_tag = self
                .characters
                .iter()
                .find_map(|c| c.line_tag)
                .unwrap_or_default();
            let mut current = first_tag;
            let mut tags: Vec<i64> = Vec::with_capacity(self.characters.len());
            for c in &self.characters {
                if let Some(tag) = c.line_tag {
                    current = tag;
                }
                tags.push(current);
            }
            let mut ids: Vec<i64> = tags.clone();
            ids.sort_unstable();
            ids.dedup();
            for id in ids {
                let indices: Vec<usize> = tags
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| **t == id)
                    .map(|(i, _)| i)
                    .collect();
                let y = indices
                    .iter()
                    .map(|&i| self.characters[i].rect.center_y())
                    .sum::<f64>()
                    / indices.len() as f64;
                self.lines.push(Line { indices, y });
            }
        } else {
            let mut positioned: Vec<(usize, f64, f64)> = self
                .characters
                .iter()
                .map(|c| (c.index, c.rect.center_y(), c.rect.center_x()))
                .collect();
            positioned.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.2.total_cmp(&b.2)));

            let mut current: Option<Line> = None;
            for (idx, cy, _) in positioned {
                match current.as_mut() {
                    Some(line) if (cy - line.y).abs() <= self.line_tolerance => {
                        line.indices.push(idx);
                        line.y = (line.y + cy) / 2.0;
                    }
                    _ => {
                        if let Some(done) = current.take() {
                            self.lines.push(done);
                        }
                        current = Some(Line {
                            indices: vec![idx],
                            y: cy,
                        });
                    }
                }
            }
            if let Some(done) = current {
                self.lines.push(done);
            }
            for line in &mut self.lines {
                line.indices.sort_unstable();
            }
        }

        for (line_idx, line) in self.lines.iter().enumerate() {
            for &i in &line.indices {
                self.char_lines[i] = line_idx;
            }
        }
    }

    /// Replace the active block's tokens (caller checked the text matches)
    pub fn apply_tokens(&mut self, tokens: Vec<Token>) {
        self.tokens = tokens;
    }

    // ---- blocks ----

    pub fn blocks(&self) -> &[TextBlock] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> Option<&TextBlock> {
        self.blocks.get(index)
    }

    pub fn block_text(&self, index: usize) -> Option<&str> {
        self.block_texts.get(index).map(|s| s.as_str())
    }

    pub fn block_index_of(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    pub fn first_selectable_block(&self) -> Option<usize> {
        self.blocks.iter().position(|b| b.is_selectable())
    }

    pub fn is_selectable(&self, index: usize) -> bool {
        self.blocks.get(index).is_some_and(|b| b.is_selectable())
    }

    /// Block index `step` positions away, wrapping around the list
    pub fn wrapped_block(&self, from: usize, step: isize) -> Option<usize> {
        let count = self.blocks.len() as isize;
        if count == 0 {
            return None;
        }
        Some((from as isize + step).rem_euclid(count) as usize)
    }

    // ---- active block ----

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn active_block(&self) -> Option<&TextBlock> {
        self.active.and_then(|b| self.blocks.get(b))
    }

    /// Whether the surface still holds the active block
    pub fn is_attached(&self, surface: &dyn TextSurface) -> bool {
        self.active_block()
            .is_some_and(|b| surface.is_attached(b.id))
    }

    pub fn characters(&self) -> &[CharBox] {
        &self.characters
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn line_of_char(&self, char_index: usize) -> usize {
        self.char_lines.get(char_index).copied().unwrap_or(0)
    }

    // ---- units ----

    /// What units mean right now: tokens only when the block has them
    pub fn unit_kind(&self, granularity: Granularity) -> UnitKind {
        if granularity == Granularity::Token && !self.tokens.is_empty() {
            UnitKind::Token
        } else {
            UnitKind::Character
        }
    }

    pub fn unit_count(&self, kind: UnitKind) -> usize {
        match kind {
            UnitKind::Character => self.characters.len(),
            UnitKind::Token => self.tokens.len(),
        }
    }

    /// Character the unit is anchored at (first character of a token)
    pub fn anchor_char(&self, kind: UnitKind, unit: usize) -> Option<usize> {
        if self.characters.is_empty() {
            return None;
        }
        match kind {
            UnitKind::Character => (unit < self.characters.len()).then_some(unit),
            UnitKind::Token => self
                .tokens
                .get(unit)
                .map(|t| t.start.min(self.characters.len() - 1)),
        }
    }

    pub fn anchor_rect(&self, kind: UnitKind, unit: usize) -> Option<Rect> {
        self.anchor_char(kind, unit)
            .map(|c| self.characters[c].rect)
    }

    /// Rectangle covering the whole unit
    pub fn unit_rect(&self, kind: UnitKind, unit: usize) -> Option<Rect> {
        match kind {
            UnitKind::Character => self.characters.get(unit).map(|c| c.rect),
            UnitKind::Token => {
                let token = self.tokens.get(unit)?;
                let end = token.end.min(self.characters.len());
                let start = token.start.min(end);
                Rect::union_all(self.characters[start..end].iter().map(|c| &c.rect))
                    .or_else(|| self.anchor_rect(kind, unit))
            }
        }
    }

    /// Line of the unit's anchor character
    pub fn unit_line(&self, kind: UnitKind, unit: usize) -> usize {
        self.anchor_char(kind, unit)
            .map(|c| self.line_of_char(c))
            .unwrap_or(0)
    }

    /// Units whose anchor lies on `line`, in unit order
    pub fn units_on_line(&self, kind: UnitKind, line: usize) -> Vec<usize> {
        (0..self.unit_count(kind))
            .filter(|&u| {
                self.anchor_char(kind, u)
                    .is_some_and(|c| self.line_of_char(c) == line)
            })
            .collect()
    }

    /// Unit on `line` whose anchor center is closest to `x` (first unit when x is None)
    pub fn nearest_on_line(&self, kind: UnitKind, line: usize, x: Option<f64>) -> Option<usize> {
        let units = self.units_on_line(kind, line);
        let Some(x) = x else {
            return units.first().copied();
        };
        units.into_iter().min_by(|&a, &b| {
            let da = self.anchor_rect(kind, a).map_or(f64::MAX, |r| (r.center_x() - x).abs());
            let db = self.anchor_rect(kind, b).map_or(f64::MAX, |r| (r.center_x() - x).abs());
            da.total_cmp(&db)
        })
    }

    /// Unit that contains a character
    pub fn unit_of_char(&self, kind: UnitKind, char_index: usize) -> usize {
        match kind {
            UnitKind::Character => char_index.min(self.characters.len().saturating_sub(1)),
            UnitKind::Token => self.char_index_to_token_index(char_index),
        }
    }

    /// Token containing the character, or the nearest token when none does
    pub fn char_index_to_token_index(&self, char_index: usize) -> usize {
        char_index_to_token_index(&self.tokens, char_index)
    }
}

/// Token containing `char_index`, else the nearest one (earlier wins ties).
/// Tokens must be sorted and non-overlapping; returns 0 for an empty list.
pub fn char_index_to_token_index(tokens: &[Token], char_index: usize) -> usize {
    let mut best = 0;
    let mut best_distance = usize::MAX;
    for (i, token) in tokens.iter().enumerate() {
        if token.contains(char_index) {
            return i;
        }
        let distance = if char_index < token.start {
            token.start - char_index
        } else {
            char_index + 1 - token.end.max(token.start + 1)
        };
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Point;
    use crate::surface::{SnapshotBlock, SnapshotChar, SnapshotSurface};

    fn surface(blocks: Vec<SnapshotBlock>) -> SnapshotSurface {
        SnapshotSurface::from_blocks(blocks)
    }

    fn indexed(surface: &SnapshotSurface, block: usize) -> TextIndex {
        let mut index = TextIndex::new(12.0);
        index.rebuild_blocks(surface);
        index.load_active(surface, Some(block), &TokenCache::default());
        index
    }

    #[test]
    fn test_blocks_filter_hidden_and_unselectable() {
        let mut hidden = SnapshotBlock::laid_out(2, &["hidden"], Point::new(0.0, 100.0), 10.0, 20.0);
        hidden.visible = false;
        let mut empty = SnapshotBlock::laid_out(3, &["\n"], Point::new(0.0, 200.0), 10.0, 20.0);
        empty.chars[0].selectable = false;
        let s = surface(vec![
            SnapshotBlock::laid_out(1, &["abc"], Point::default(), 10.0, 20.0),
            hidden,
            empty,
        ]);
        let mut index = TextIndex::new(12.0);
        index.rebuild_blocks(&s);
        assert_eq!(index.block_count(), 2);
        assert_eq!(index.block(1).unwrap().id, BlockId(3));
        assert!(!index.is_selectable(1));
        assert_eq!(index.first_selectable_block(), Some(0));
        assert_eq!(index.block_text(0), Some("abc"));
    }

    #[test]
    fn test_whole_block_fallback_unit() {
        let block = SnapshotBlock {
            id: 9,
            rect: Some(Rect::new(0.0, 0.0, 100.0, 20.0)),
            visible: true,
            text: Some("whole".to_string()),
            chars: Vec::new(),
        };
        let s = surface(vec![block]);
        let index = indexed(&s, 0);
        assert_eq!(index.characters().len(), 1);
        assert_eq!(index.characters()[0].surface_index, None);
        assert_eq!(index.lines().len(), 1);
    }

    #[test]
    fn test_geometric_lines() {
        let s = surface(vec![SnapshotBlock::laid_out(
            1,
            &["abcd", "ef", "ghi"],
            Point::default(),
            10.0,
            24.0,
        )]);
        let index = indexed(&s, 0);
        assert_eq!(index.lines().len(), 3);
        assert_eq!(index.lines()[1].indices, vec![4, 5]);
        assert_eq!(index.line_of_char(7), 2);
    }

    #[test]
    fn test_small_jitter_stays_on_one_line() {
        let mut block = SnapshotBlock::laid_out(1, &["abc"], Point::default(), 10.0, 20.0);
        block.chars[1].rect.top += 5.0;
        let s = surface(vec![block]);
        let index = indexed(&s, 0);
        assert_eq!(index.lines().len(), 1);
    }

    #[test]
    fn test_explicit_line_tags_win_over_geometry() {
        // Every character on the same row, but tagged as two lines
        let mut block = SnapshotBlock::laid_out(1, &["abcd"], Point::default(), 10.0, 20.0);
        block.chars[0].line = Some(5);
        block.chars[2].line = Some(6);
        let s = surface(vec![block]);
        let index = indexed(&s, 0);
        assert_eq!(index.lines().len(), 2);
        assert_eq!(index.lines()[0].indices, vec![0, 1]);
        assert_eq!(index.lines()[1].indices, vec![2, 3]);
    }

    #[test]
    fn test_filtered_characters_are_renumbered() {
        let mut block = SnapshotBlock::laid_out(1, &["a b"], Point::default(), 10.0, 20.0);
        block.chars.insert(
            1,
            SnapshotChar {
                text: "\n".to_string(),
                rect: Rect::new(10.0, 0.0, 0.0, 20.0),
                visible: true,
                selectable: true,
                line: None,
            },
        );
        let s = surface(vec![block]);
        let index = indexed(&s, 0);
        assert_eq!(index.characters().len(), 3);
        assert_eq!(index.characters()[1].text, " ");
        assert_eq!(index.characters()[1].surface_index, Some(2));
    }

    #[test]
    fn test_char_to_token_mapping_is_total_and_monotonic() {
        let tokens = vec![
            Token::new("日本", 0, 2),
            Token::new("語", 2, 3),
            Token::new("を", 5, 6),
        ];
        let mapped: Vec<usize> = (0..9).map(|c| char_index_to_token_index(&tokens, c)).collect();
        assert_eq!(mapped, vec![0, 0, 1, 1, 2, 2, 2, 2, 2]);
        for pair in mapped.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for (c, &t) in mapped.iter().enumerate() {
            if tokens.iter().any(|tok| tok.contains(c)) {
                assert!(tokens[t].contains(c));
            }
        }
        assert_eq!(char_index_to_token_index(&[], 4), 0);
    }

    #[test]
    fn test_token_units_and_rects() {
        let s = surface(vec![SnapshotBlock::laid_out(
            1,
            &["食べる"],
            Point::default(),
            20.0,
            20.0,
        )]);
        let mut index = indexed(&s, 0);
        assert_eq!(index.unit_kind(Granularity::Token), UnitKind::Character);
        index.apply_tokens(vec![Token::new("食べる", 0, 3)]);
        assert_eq!(index.unit_kind(Granularity::Token), UnitKind::Token);
        assert_eq!(index.unit_count(UnitKind::Token), 1);
        assert_eq!(
            index.unit_rect(UnitKind::Token, 0),
            Some(Rect::new(0.0, 0.0, 60.0, 20.0))
        );
        assert_eq!(index.anchor_char(UnitKind::Token, 0), Some(0));
        assert_eq!(index.unit_of_char(UnitKind::Token, 2), 0);
    }

    #[test]
    fn test_nearest_on_line() {
        let s = surface(vec![SnapshotBlock::laid_out(
            1,
            &["abcde", "fgh"],
            Point::default(),
            10.0,
            24.0,
        )]);
        let index = indexed(&s, 0);
        assert_eq!(
            index.nearest_on_line(UnitKind::Character, 1, Some(24.0)),
            Some(7)
        );
        assert_eq!(index.nearest_on_line(UnitKind::Character, 1, None), Some(5));
        assert_eq!(
            index.nearest_on_line(UnitKind::Character, 0, Some(1000.0)),
            Some(4)
        );
    }

    #[test]
    fn test_wrapped_block() {
        let s = surface(vec![
            SnapshotBlock::laid_out(1, &["a"], Point::default(), 10.0, 20.0),
            SnapshotBlock::laid_out(2, &["b"], Point::new(0.0, 50.0), 10.0, 20.0),
            SnapshotBlock::laid_out(3, &["c"], Point::new(0.0, 100.0), 10.0, 20.0),
        ]);
        let mut index = TextIndex::new(12.0);
        index.rebuild_blocks(&s);
        assert_eq!(index.wrapped_block(0, -1), Some(2));
        assert_eq!(index.wrapped_block(2, 1), Some(0));
        assert_eq!(index.wrapped_block(1, 1), Some(2));
    }
}
