//! Visual feedback
//!
//! The engine describes what should be highlighted; whatever draws it
//! (the terminal preview, a host overlay) reads `Overlay` when it renders.

use crate::config::FeedbackConfig;
use crate::data::{BlockId, Point, Rect};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub visible: bool,
    pub block: Option<BlockId>,
    /// Whole active block
    pub block_rect: Option<Rect>,
    /// Active unit (character or token)
    pub unit_rect: Option<Rect>,
    pub pointer: Option<Point>,
    /// Short mode text for the indicator, e.g. "token"
    pub mode_label: String,
    pub highlight_color: String,
    pub cursor_color: String,
}

#[derive(Debug, Clone)]
pub struct FeedbackRenderer {
    config: FeedbackConfig,
    overlay: Overlay,
}

impl FeedbackRenderer {
    pub fn new(config: &FeedbackConfig) -> Self {
        Self {
            config: config.clone(),
            overlay: Overlay::default(),
        }
    }

    pub fn show(&mut self, block: BlockId, block_rect: Option<Rect>, unit_rect: Option<Rect>, mode_label: &str) {
        self.overlay = Overlay {
            visible: self.config.show_indicator,
            block: Some(block),
            block_rect,
            unit_rect,
            pointer: self.overlay.pointer,
            mode_label: mode_label.to_string(),
            highlight_color: self.config.highlight_color.clone(),
            cursor_color: self.config.cursor_color.clone(),
        };
    }

    pub fn set_pointer(&mut self, pointer: Option<Point>) {
        self.overlay.pointer = pointer;
    }

    pub fn hide(&mut self) {
        self.overlay = Overlay::default();
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_and_hide() {
        let mut feedback = FeedbackRenderer::new(&FeedbackConfig::default());
        feedback.set_pointer(Some(Point::new(1.0, 1.0)));
        feedback.show(BlockId(1), None, Some(Rect::new(0.0, 0.0, 10.0, 10.0)), "char");
        assert!(feedback.overlay().visible);
        assert_eq!(feedback.overlay().pointer, Some(Point::new(1.0, 1.0)));
        feedback.hide();
        assert_eq!(feedback.overlay(), &Overlay::default());
    }

    #[test]
    fn test_indicator_disabled() {
        let mut config = FeedbackConfig::default();
        config.show_indicator = false;
        let mut feedback = FeedbackRenderer::new(&config);
        feedback.show(BlockId(1), None, None, "char");
        assert!(!feedback.overlay().visible);
    }
}
