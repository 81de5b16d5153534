//! Directional resolution
//!
//! Given the index and the cursor, decide where a d-pad press goes. This is
//! pure geometry over `TextIndex`; the engine applies the result.

use crate::config::NavigationConfig;
use crate::core::input_router::Direction;
use crate::core::text_index::TextIndex;
use crate::data::{NavigationCursor, UnitKind};

/// Heuristic thresholds for the nearest-unit fallback
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub min_vertical_px: f64,
    pub vertical_height_ratio: f64,
    pub horizontal_band_px: f64,
    pub horizontal_band_ratio: f64,
    pub row_tolerance_px: f64,
}

impl From<&NavigationConfig> for Thresholds {
    fn from(config: &NavigationConfig) -> Self {
        Self {
            min_vertical_px: config.min_vertical_px,
            vertical_height_ratio: config.vertical_height_ratio,
            horizontal_band_px: config.horizontal_band_px,
            horizontal_band_ratio: config.horizontal_band_ratio,
            row_tolerance_px: config.line_tolerance_px,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&NavigationConfig::default())
    }
}

/// Where to land inside a block being entered
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryPoint {
    FirstUnit,
    LastUnit,
    /// Topmost line, unit nearest `x`
    TopLine(Option<f64>),
    /// Bottom line, unit nearest `x`
    BottomLine(Option<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Move within the active block
    Within(usize),
    /// Enter another block (may be the active block itself after a wrap)
    Block { block: usize, entry: EntryPoint },
    /// Nowhere to go
    Stay,
}

pub fn resolve(
    index: &TextIndex,
    kind: UnitKind,
    cursor: &NavigationCursor,
    direction: Direction,
    thresholds: &Thresholds,
) -> Resolution {
    let Some(block) = cursor.block else {
        return match index.first_selectable_block() {
            Some(block) => Resolution::Block {
                block,
                entry: EntryPoint::FirstUnit,
            },
            None => Resolution::Stay,
        };
    };

    let count = index.unit_count(kind);
    if count == 0 {
        return adjacent_block(index, block, direction, None);
    }
    let unit = cursor.unit.min(count - 1);

    match direction {
        Direction::Right if unit + 1 < count => Resolution::Within(unit + 1),
        Direction::Left if unit > 0 => Resolution::Within(unit - 1),
        Direction::Left | Direction::Right => adjacent_block(index, block, direction, None),
        Direction::Up | Direction::Down => resolve_vertical(index, kind, block, unit, direction, thresholds),
    }
}

fn resolve_vertical(
    index: &TextIndex,
    kind: UnitKind,
    block: usize,
    unit: usize,
    direction: Direction,
    thresholds: &Thresholds,
) -> Resolution {
    let anchor_x = index.anchor_rect(kind, unit).map(|r| r.center_x());

    if let Some(target) = adjacent_line_unit(index, kind, unit, direction, anchor_x) {
        return Resolution::Within(target);
    }

    if let Some(target) = nearest_vertical_unit(index, kind, unit, direction, thresholds) {
        return Resolution::Within(target);
    }

    if index.block_count() == 1 {
        let line = match direction {
            Direction::Down => first_line_with_units(index, kind),
            _ => last_line_with_units(index, kind),
        };
        return line
            .and_then(|l| index.nearest_on_line(kind, l, anchor_x))
            .map(Resolution::Within)
            .unwrap_or(Resolution::Stay);
    }

    adjacent_block(index, block, direction, anchor_x)
}

/// Nearest-column unit on the next line in `direction` that carries unit anchors
fn adjacent_line_unit(
    index: &TextIndex,
    kind: UnitKind,
    unit: usize,
    direction: Direction,
    anchor_x: Option<f64>,
) -> Option<usize> {
    let line_count = index.lines().len();
    let mut line = index.unit_line(kind, unit);
    loop {
        line = match direction {
            Direction::Down if line + 1 < line_count => line + 1,
            Direction::Up if line > 0 => line - 1,
            _ => return None,
        };
        if let Some(target) = index
            .nearest_on_line(kind, line, anchor_x)
            .filter(|&t| t != unit)
        {
            return Some(target);
        }
    }
}

/// Geometric fallback when line structure gives no answer
fn nearest_vertical_unit(
    index: &TextIndex,
    kind: UnitKind,
    unit: usize,
    direction: Direction,
    thresholds: &Thresholds,
) -> Option<usize> {
    let anchor = index.anchor_rect(kind, unit)?;
    let min_dy = thresholds
        .min_vertical_px
        .max(thresholds.vertical_height_ratio * anchor.height);
    let band = thresholds
        .horizontal_band_px
        .max(thresholds.horizontal_band_ratio * anchor.width);

    let candidates: Vec<(usize, f64, f64)> = (0..index.unit_count(kind))
        .filter(|&u| u != unit)
        .filter_map(|u| {
            let r = index.anchor_rect(kind, u)?;
            let dy = r.center_y() - anchor.center_y();
            let dy = if direction == Direction::Down { dy } else { -dy };
            (dy > min_dy).then(|| (u, dy, (r.center_x() - anchor.center_x()).abs()))
        })
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let in_band: Vec<(usize, f64, f64)> = candidates.iter().copied().filter(|c| c.2 <= band).collect();
    let pool = if in_band.is_empty() { candidates } else { in_band };

    let closest_dy = pool.iter().map(|c| c.1).fold(f64::MAX, f64::min);
    pool.into_iter()
        .filter(|c| c.1 - closest_dy <= thresholds.row_tolerance_px)
        .min_by(|a, b| a.2.total_cmp(&b.2))
        .map(|c| c.0)
}

fn first_line_with_units(index: &TextIndex, kind: UnitKind) -> Option<usize> {
    (0..index.lines().len()).find(|&l| !index.units_on_line(kind, l).is_empty())
}

fn last_line_with_units(index: &TextIndex, kind: UnitKind) -> Option<usize> {
    (0..index.lines().len())
        .rev()
        .find(|&l| !index.units_on_line(kind, l).is_empty())
}

/// Next selectable block in `direction`, wrapping; may be `block` itself
fn adjacent_block(
    index: &TextIndex,
    block: usize,
    direction: Direction,
    anchor_x: Option<f64>,
) -> Resolution {
    let step: isize = match direction {
        Direction::Right | Direction::Down => 1,
        Direction::Left | Direction::Up => -1,
    };
    let entry = match direction {
        Direction::Right => EntryPoint::FirstUnit,
        Direction::Left => EntryPoint::LastUnit,
        Direction::Down => EntryPoint::TopLine(anchor_x),
        Direction::Up => EntryPoint::BottomLine(anchor_x),
    };

    for distance in 1..=index.block_count() as isize {
        let Some(candidate) = index.wrapped_block(block, step * distance) else {
            break;
        };
        if index.is_selectable(candidate) {
            return Resolution::Block {
                block: candidate,
                entry,
            };
        }
    }
    Resolution::Stay
}

/// Unit to land on in the (already loaded) active block
pub fn entry_unit(index: &TextIndex, kind: UnitKind, entry: EntryPoint) -> usize {
    let count = index.unit_count(kind);
    if count == 0 {
        return 0;
    }
    match entry {
        EntryPoint::FirstUnit => 0,
        EntryPoint::LastUnit => count - 1,
        EntryPoint::TopLine(x) => first_line_with_units(index, kind)
            .and_then(|l| index.nearest_on_line(kind, l, x))
            .unwrap_or(0),
        EntryPoint::BottomLine(x) => last_line_with_units(index, kind)
            .and_then(|l| index.nearest_on_line(kind, l, x))
            .unwrap_or(count - 1),
    }
}
