//! Text surface collaborator
//!
//! The engine never talks to a renderer directly. Whatever draws the text
//! (a browser overlay, a game hook, the preview snapshot) implements
//! `TextSurface`, and reports mutations through the sender it receives in
//! `on_mutate`.
//!
//! `SnapshotSurface` is the in-memory implementation used by the CLI host
//! (loaded from a JSON file) and by the tests.

use crate::data::{BlockId, BlockInfo, CharInfo, Point, Rect, SurfaceEvent};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::mpsc;

pub trait TextSurface {
    /// All blocks in ordinal order (visible or not)
    fn list_blocks(&self) -> Vec<BlockInfo>;

    /// Characters of one block, empty when the block has no decomposition
    fn characters_of(&self, block: BlockId) -> Vec<CharInfo>;

    /// Live rectangle of a block (`char_index == None`) or one of its characters.
    /// None when the reference no longer exists.
    fn bounding_rect(&self, block: BlockId, char_index: Option<usize>) -> Option<Rect>;

    fn is_visible(&self, block: BlockId, char_index: Option<usize>) -> bool;

    /// Whether the block still exists on the surface
    fn is_attached(&self, block: BlockId) -> bool;

    /// Area the virtual pointer may move in
    fn viewport(&self) -> Rect;

    /// Register for mutation notifications
    fn on_mutate(&mut self, sender: mpsc::UnboundedSender<SurfaceEvent>);
}

/// Character record in a snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotChar {
    pub text: String,
    pub rect: Rect,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub selectable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

/// Block record in a snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBlock {
    pub id: u64,
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub chars: Vec<SnapshotChar>,
}

impl SnapshotBlock {
    /// Lay out rows of text on a fixed grid, one `SnapshotChar` per `char`.
    ///
    /// Row `n` starts at `origin.y + n * line_height`; characters are
    /// `char_width` wide. Line tags are left empty so lines come from geometry.
    pub fn laid_out(
        id: u64,
        rows: &[&str],
        origin: Point,
        char_width: f64,
        line_height: f64,
    ) -> Self {
        let mut chars = Vec::new();
        for (row, text) in rows.iter().enumerate() {
            for (col, c) in text.chars().enumerate() {
                chars.push(SnapshotChar {
                    text: c.to_string(),
                    rect: Rect::new(
                        origin.x + col as f64 * char_width,
                        origin.y + row as f64 * line_height,
                        char_width,
                        line_height,
                    ),
                    visible: true,
                    selectable: true,
                    line: None,
                });
            }
        }
        Self {
            id,
            rect: None,
            visible: true,
            text: None,
            chars,
        }
    }

    fn block_rect(&self) -> Rect {
        self.rect
            .or_else(|| Rect::union_all(self.chars.iter().map(|c| &c.rect)))
            .unwrap_or_default()
    }

    fn block_text(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => self.chars.iter().map(|c| c.text.as_str()).collect(),
        }
    }
}

/// Whole snapshot document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub viewport: Option<Rect>,
    #[serde(default)]
    pub blocks: Vec<SnapshotBlock>,
}

fn default_true() -> bool {
    true
}

/// In-memory text surface
#[derive(Debug, Default)]
pub struct SnapshotSurface {
    document: SnapshotDocument,
    listeners: Vec<mpsc::UnboundedSender<SurfaceEvent>>,
}

impl SnapshotSurface {
    pub fn new(document: SnapshotDocument) -> Self {
        Self {
            document,
            listeners: Vec::new(),
        }
    }

    pub fn from_blocks(blocks: Vec<SnapshotBlock>) -> Self {
        Self::new(SnapshotDocument {
            viewport: None,
            blocks,
        })
    }

    /// Load a snapshot document from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(Self::read_document(path)?))
    }

    pub fn read_document(path: &Path) -> Result<SnapshotDocument> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read surface file: {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse surface file: {:?}", path))
    }

    pub fn document(&self) -> &SnapshotDocument {
        &self.document
    }

    /// Swap in new content and notify listeners
    pub fn replace(&mut self, document: SnapshotDocument) {
        self.document = document;
        self.notify();
    }

    /// Edit content in place and notify listeners
    pub fn mutate<F: FnOnce(&mut SnapshotDocument)>(&mut self, f: F) {
        f(&mut self.document);
        self.notify();
    }

    fn notify(&mut self) {
        self.listeners
            .retain(|tx| tx.send(SurfaceEvent::Mutated).is_ok());
    }

    fn block(&self, id: BlockId) -> Option<&SnapshotBlock> {
        self.document.blocks.iter().find(|b| b.id == id.0)
    }
}

impl TextSurface for SnapshotSurface {
    fn list_blocks(&self) -> Vec<BlockInfo> {
        self.document
            .blocks
            .iter()
            .map(|b| BlockInfo {
                id: BlockId(b.id),
                rect: b.block_rect(),
                visible: b.visible,
                text: b.block_text(),
            })
            .collect()
    }

    fn characters_of(&self, block: BlockId) -> Vec<CharInfo> {
        let Some(b) = self.block(block) else {
            return Vec::new();
        };
        b.chars
            .iter()
            .map(|c| CharInfo {
                text: c.text.clone(),
                rect: c.rect,
                visible: c.visible,
                selectable: c.selectable,
                line_tag: c.line,
            })
            .collect()
    }

    fn bounding_rect(&self, block: BlockId, char_index: Option<usize>) -> Option<Rect> {
        let b = self.block(block)?;
        match char_index {
            None => Some(b.block_rect()),
            Some(idx) => b.chars.get(idx).map(|c| c.rect),
        }
    }

    fn is_visible(&self, block: BlockId, char_index: Option<usize>) -> bool {
        let Some(b) = self.block(block) else {
            return false;
        };
        match char_index {
            None => b.visible,
            Some(idx) => b.visible && b.chars.get(idx).is_some_and(|c| c.visible),
        }
    }

    fn is_attached(&self, block: BlockId) -> bool {
        self.block(block).is_some()
    }

    fn viewport(&self) -> Rect {
        self.document.viewport.unwrap_or_else(|| {
            // Fall back to the union of everything plus a margin
            Rect::union_all(
                self.document
                    .blocks
                    .iter()
                    .map(|b| b.block_rect())
                    .collect::<Vec<_>>()
                    .iter(),
            )
            .map(|r| Rect::new(0.0, 0.0, r.right() + 200.0, r.bottom() + 200.0))
            .unwrap_or_else(|| Rect::new(0.0, 0.0, 1920.0, 1080.0))
        })
    }

    fn on_mutate(&mut self, sender: mpsc::UnboundedSender<SurfaceEvent>) {
        self.listeners.push(sender);
    }
}

/// Notices when a snapshot file is rewritten
///
/// Polled by the host loop; a changed modification time means the file is
/// read again and swapped in as a surface mutation.
#[derive(Debug)]
pub struct SurfaceFileWatcher {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl SurfaceFileWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            modified: Self::modified_time(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// New contents when the file changed since the last call
    pub fn poll(&mut self) -> Result<Option<SnapshotDocument>> {
        let modified = Self::modified_time(&self.path);
        if modified.is_none() || modified == self.modified {
            return Ok(None);
        }
        self.modified = modified;
        SnapshotSurface::read_document(&self.path).map(Some)
    }

    fn modified_time(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_laid_out_block() {
        let block = SnapshotBlock::laid_out(7, &["ab", "c"], Point::new(10.0, 20.0), 10.0, 20.0);
        assert_eq!(block.chars.len(), 3);
        assert_eq!(block.chars[2].rect, Rect::new(10.0, 40.0, 10.0, 20.0));
        assert_eq!(block.block_text(), "abc");
        assert_eq!(block.block_rect(), Rect::new(10.0, 20.0, 20.0, 40.0));
    }

    #[test]
    fn test_mutation_notifies_listener() {
        let mut surface = SnapshotSurface::from_blocks(vec![SnapshotBlock::laid_out(
            1,
            &["x"],
            Point::default(),
            10.0,
            10.0,
        )]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        surface.on_mutate(tx);
        surface.mutate(|doc| doc.blocks.clear());
        assert_eq!(rx.try_recv().ok(), Some(SurfaceEvent::Mutated));
        assert!(!surface.is_attached(BlockId(1)));
    }

    #[test]
    fn test_document_from_json() {
        let json = r#"{
            "blocks": [
                {"id": 3, "chars": [
                    {"text": "猫", "rect": {"left": 0, "top": 0, "width": 20, "height": 20}, "line": 0},
                    {"text": "\n", "rect": {"left": 20, "top": 0, "width": 0, "height": 20}, "selectable": false}
                ]}
            ]
        }"#;
        let doc: SnapshotDocument = serde_json::from_str(json).unwrap();
        let surface = SnapshotSurface::new(doc);
        let chars = surface.characters_of(BlockId(3));
        assert_eq!(chars.len(), 2);
        assert_eq!(chars[0].line_tag, Some(0));
        assert!(!chars[1].selectable);
        assert!(surface.is_visible(BlockId(3), Some(0)));
    }

    #[test]
    fn test_file_watcher_reloads_on_change() {
        let path = std::env::temp_dir().join(format!("padscan-watch-{}.json", std::process::id()));
        fs::write(&path, r#"{"blocks": []}"#).unwrap();

        let mut watcher = SurfaceFileWatcher::new(&path);
        assert!(watcher.poll().unwrap().is_none());

        fs::write(&path, r#"{"blocks": [{"id": 1, "text": "abc"}]}"#).unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();
        let doc = watcher.poll().unwrap().unwrap();
        assert_eq!(doc.blocks.len(), 1);
        assert!(watcher.poll().unwrap().is_none());

        fs::remove_file(&path).unwrap();
        assert!(watcher.poll().unwrap().is_none());
    }
}
