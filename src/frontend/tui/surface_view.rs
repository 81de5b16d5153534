//! What one preview frame shows, captured from the engine.
//!
//! Capturing is separate from drawing so frames can be checked without a
//! terminal. Highlights come from the engine's overlay rectangles, not from
//! the cursor, so the preview shows exactly what a host overlay would.

use crate::config::TokenizerBackend;
use crate::core::Engine;
use crate::data::{BlockId, CharInfo, Point, Rect as SurfaceRect};
use crate::lookup::LookupTool;
use crate::surface::TextSurface;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

#[derive(Debug, Clone, PartialEq)]
pub struct CellView {
    pub text: String,
    /// Inside the active unit
    pub highlighted: bool,
    /// Under the virtual pointer
    pub pointer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockView {
    pub id: BlockId,
    pub active: bool,
    pub visible: bool,
    pub rows: Vec<Vec<CellView>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusView {
    /// "off", "held" or "sticky"
    pub navigation: &'static str,
    pub mode_label: String,
    pub connected: bool,
    /// Only reported for the local engine backend
    pub engine_available: Option<bool>,
    pub popups: usize,
    pub pending_mine: Option<String>,
    pub pointer: Option<Point>,
    pub gamepads: usize,
}

#[derive(Debug, Clone)]
pub struct PreviewView {
    pub blocks: Vec<BlockView>,
    pub status: StatusView,
    pub activity: Vec<String>,
    pub highlight_color: Color,
    pub cursor_color: Color,
}

impl PreviewView {
    pub fn capture<S: TextSurface, L: LookupTool>(engine: &Engine<S, L>, activity: Vec<String>) -> Self {
        let surface = engine.surface();
        let overlay = engine.overlay();

        let blocks = surface
            .list_blocks()
            .into_iter()
            .map(|info| {
                let unit_rect = if overlay.block == Some(info.id) {
                    overlay.unit_rect
                } else {
                    None
                };
                let chars = surface.characters_of(info.id);
                let rows = if chars.is_empty() {
                    vec![vec![CellView {
                        text: info.text.clone(),
                        highlighted: unit_rect.is_some(),
                        pointer: overlay.pointer.is_some_and(|p| info.rect.contains(p)),
                    }]]
                } else {
                    group_rows(&chars)
                        .into_iter()
                        .map(|row| {
                            row.into_iter()
                                .map(|i| cell(&chars[i], unit_rect, overlay.pointer))
                                .collect::<Vec<_>>()
                        })
                        .collect()
                };
                BlockView {
                    id: info.id,
                    active: overlay.block == Some(info.id),
                    visible: info.visible,
                    rows,
                }
            })
            .collect();

        let navigation = match (engine.is_active(), engine.is_sticky()) {
            (false, _) => "off",
            (true, false) => "held",
            (true, true) => "sticky",
        };
        let engine_available = match engine.config().tokenizer.backend {
            TokenizerBackend::Local => Some(engine.engine_available()),
            TokenizerBackend::Remote => None,
        };
        let feedback = &engine.config().feedback;

        Self {
            blocks,
            status: StatusView {
                navigation,
                mode_label: overlay.mode_label.clone(),
                connected: engine.is_connected(),
                engine_available,
                popups: engine.popup_count(),
                pending_mine: engine.pending_candidate().map(|c| c.anchor_key.clone()),
                pointer: engine.pointer_position(),
                gamepads: engine.gamepads().device_count(),
            },
            activity,
            highlight_color: parse_color(&feedback.highlight_color).unwrap_or(Color::Green),
            cursor_color: parse_color(&feedback.cursor_color).unwrap_or(Color::Yellow),
        }
    }

    fn status_line(&self) -> Line<'_> {
        let s = &self.status;
        let sep = || Span::styled(" | ", Style::default().fg(Color::DarkGray));
        let mut spans = vec![
            Span::raw(format!("nav: {}", s.navigation)),
            sep(),
            Span::raw(if s.mode_label.is_empty() { "-".to_string() } else { s.mode_label.clone() }),
            sep(),
            if s.connected {
                Span::styled("connected", Style::default().fg(Color::Green))
            } else {
                Span::styled("offline", Style::default().fg(Color::Red))
            },
        ];
        if let Some(available) = s.engine_available {
            spans.push(sep());
            spans.push(Span::raw(format!("engine: {}", if available { "up" } else { "down" })));
        }
        spans.push(sep());
        spans.push(Span::raw(format!("popups: {}", s.popups)));
        if let Some(key) = &s.pending_mine {
            spans.push(sep());
            spans.push(Span::styled(format!("mine: {}", key), Style::default().fg(self.cursor_color)));
        }
        if let Some(p) = s.pointer {
            spans.push(sep());
            spans.push(Span::raw(format!("pointer ({:.0}, {:.0})", p.x, p.y)));
        }
        spans.push(sep());
        spans.push(Span::raw(format!("pads: {}", s.gamepads)));
        Line::from(spans)
    }

    fn text_lines(&self) -> Vec<Line<'_>> {
        let mut lines = Vec::new();
        for block in &self.blocks {
            let header_style = if block.active {
                Style::default().fg(self.highlight_color).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let hidden = if block.visible { "" } else { " (hidden)" };
            lines.push(Line::from(Span::styled(format!("-- {}{}", block.id, hidden), header_style)));

            for row in &block.rows {
                let spans: Vec<Span> = row
                    .iter()
                    .map(|cell| Span::styled(cell.text.as_str(), self.cell_style(block, cell)))
                    .collect();
                lines.push(Line::from(spans));
            }
        }
        lines
    }

    fn cell_style(&self, block: &BlockView, cell: &CellView) -> Style {
        let mut style = Style::default();
        if !block.visible {
            style = style.fg(Color::DarkGray);
        }
        if cell.highlighted {
            style = style.bg(self.highlight_color).fg(Color::Black);
            if cell.pointer {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
        } else if cell.pointer {
            style = style.bg(self.cursor_color).fg(Color::Black);
        }
        style
    }
}

impl Widget for &PreviewView {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let activity_height = if self.activity.is_empty() {
            0
        } else {
            self.activity.len() as u16 + 2
        };
        let [text_area, activity_area, status_area] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(activity_height),
            Constraint::Length(1),
        ])
        .areas(area);

        Paragraph::new(self.text_lines())
            .wrap(Wrap { trim: false })
            .render(text_area, buf);

        if activity_height > 0 {
            let lines: Vec<Line> = self.activity.iter().map(|a| Line::raw(a.as_str())).collect();
            Paragraph::new(lines)
                .block(Block::default().borders(Borders::TOP).title("popup"))
                .render(activity_area, buf);
        }

        Paragraph::new(self.status_line()).render(status_area, buf);
    }
}

/// Split characters into visual rows, by line tag when both sides have one
fn group_rows(chars: &[CharInfo]) -> Vec<Vec<usize>> {
    let mut rows: Vec<Vec<usize>> = Vec::new();
    let mut last: Option<&CharInfo> = None;
    for (i, c) in chars.iter().enumerate() {
        let new_row = match last {
            None => true,
            Some(prev) => match (prev.line_tag, c.line_tag) {
                (Some(a), Some(b)) => a != b,
                _ => (c.rect.center_y() - prev.rect.center_y()).abs() > prev.rect.height.max(1.0) / 2.0,
            },
        };
        if new_row {
            rows.push(Vec::new());
        }
        if let Some(row) = rows.last_mut() {
            row.push(i);
        }
        last = Some(c);
    }
    rows
}

fn cell(c: &CharInfo, unit_rect: Option<SurfaceRect>, pointer: Option<Point>) -> CellView {
    let center = c.rect.center();
    CellView {
        text: c.text.clone(),
        highlighted: unit_rect.is_some_and(|r| r.contains(center)),
        pointer: pointer.is_some_and(|p| c.rect.contains(p)),
    }
}

fn parse_color(hex: &str) -> Option<Color> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lookup::RecordingLookup;
    use crate::surface::{SnapshotBlock, SnapshotSurface};
    use std::time::Instant;

    fn engine() -> Engine<SnapshotSurface, RecordingLookup> {
        let blocks = vec![
            SnapshotBlock::laid_out(1, &["abc", "de"], Point::new(0.0, 0.0), 10.0, 20.0),
            SnapshotBlock::laid_out(2, &["xyz"], Point::new(0.0, 60.0), 10.0, 20.0),
        ];
        Engine::new(Config::default(), SnapshotSurface::from_blocks(blocks), RecordingLookup::new())
    }

    fn highlighted(view: &PreviewView) -> Vec<(BlockId, String)> {
        view.blocks
            .iter()
            .flat_map(|b| {
                b.rows
                    .iter()
                    .flatten()
                    .filter(|c| c.highlighted)
                    .map(move |c| (b.id, c.text.clone()))
            })
            .collect()
    }

    #[test]
    fn test_rows_follow_geometry() {
        let view = PreviewView::capture(&engine(), Vec::new());
        assert_eq!(view.blocks.len(), 2);
        assert_eq!(view.blocks[0].rows.len(), 2);
        assert_eq!(view.blocks[0].rows[1].len(), 2);
        assert!(highlighted(&view).is_empty());
        assert_eq!(view.status.navigation, "off");
    }

    #[test]
    fn test_active_unit_is_highlighted() {
        let mut engine = engine();
        let now = Instant::now();
        engine.manual_activate(now);
        engine.manual_right(now);

        let view = PreviewView::capture(&engine, Vec::new());
        assert_eq!(highlighted(&view), vec![(BlockId(1), "b".to_string())]);
        assert!(view.blocks[0].active);
        assert!(!view.blocks[1].active);
        assert_eq!(view.status.navigation, "sticky");
        assert_eq!(view.status.mode_label, "char");
        assert_eq!(view.status.engine_available, None);
    }

    #[test]
    fn test_render_draws_text_and_status() {
        let mut engine = engine();
        engine.manual_activate(Instant::now());
        let view = PreviewView::capture(&engine, vec!["lookup b1:0 at (5, 10)".to_string()]);

        let area = Rect::new(0, 0, 80, 16);
        let mut buf = Buffer::empty(area);
        (&view).render(area, &mut buf);

        let text: String = buf.content.iter().map(|c| c.symbol()).collect();
        assert!(text.contains("-- b1"));
        assert!(text.contains("abc"));
        assert!(text.contains("lookup b1:0"));
        assert!(text.contains("nav: sticky"));
        assert!(text.contains("offline"));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#00ff88"), Some(Color::Rgb(0, 255, 136)));
        assert_eq!(parse_color("green"), None);
    }
}
