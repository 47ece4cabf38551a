use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::edges::EDGE;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridConfig {
    /// Fraction of a row (column) that must be edge pixels to count as a grid line
    pub line_fraction: f64,
    /// Flagged rows (columns) closer than this merge into one grid line
    pub merge_distance: u32,
    /// Cells needed before the pattern counts as a grid
    pub min_cells: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            line_fraction: 0.5,
            merge_distance: 3,
            min_cells: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSummary {
    pub horizontal_lines: usize,
    pub vertical_lines: usize,
}

impl GridSummary {
    /// Enclosed cells between adjacent grid lines
    pub fn cells(&self) -> usize {
        self.horizontal_lines.saturating_sub(1) * self.vertical_lines.saturating_sub(1)
    }
}

/// Count clusters of flagged indices, treating anything within `merge` as one line
fn count_lines(profile: &[u32], min_count: u32, merge: u32) -> usize {
    let mut lines = 0;
    let mut last: Option<usize> = None;
    for (i, &count) in profile.iter().enumerate() {
        if count < min_count {
            continue;
        }
        if last.map_or(true, |l| i - l > merge as usize) {
            lines += 1;
        }
        last = Some(i);
    }
    lines
}

/// Look for a lattice of long horizontal and vertical lines in an edge map.
///
/// Returns the line counts when they enclose at least `min_cells` cells.
pub fn detect_grid(edges: &GrayImage, config: &GridConfig) -> Option<GridSummary> {
    let (width, height) = edges.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let mut rows = vec![0u32; height as usize];
    let mut cols = vec![0u32; width as usize];
    for (x, y, p) in edges.enumerate_pixels() {
        if p.0[0] == EDGE {
            rows[y as usize] += 1;
            cols[x as usize] += 1;
        }
    }

    let row_min = ((width as f64 * config.line_fraction).ceil() as u32).max(1);
    let col_min = ((height as f64 * config.line_fraction).ceil() as u32).max(1);
    let summary = GridSummary {
        horizontal_lines: count_lines(&rows, row_min, config.merge_distance),
        vertical_lines: count_lines(&cols, col_min, config.merge_distance),
    };

    (summary.cells() >= config.min_cells).then_some(summary)
}
