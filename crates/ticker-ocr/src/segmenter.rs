use analysis_core::{AnalysisError, Rect};
use image::{DynamicImage, GrayImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::matcher::{CharacterMatcher, GlyphMatch};
use crate::preprocess::{clear_zones, crop, ink_mask, INK};

pub const MIN_TICKER_LEN: usize = 3;
pub const MAX_TICKER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SegmenterConfig {
    pub min_char_width: u32,
    pub max_char_width: u32,
    pub min_char_height: u32,
    pub max_char_height: u32,
    /// Largest gap between neighbours, as a fraction of glyph height, that still joins a run
    pub max_gap_ratio: f64,
    /// Smallest height ratio between neighbours that still joins a run
    pub min_height_ratio: f64,
    /// Vertical overlap (fraction of the shorter box) needed to share a text line
    pub line_overlap_ratio: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_char_width: 2,
            max_char_width: 60,
            min_char_height: 10,
            max_char_height: 80,
            max_gap_ratio: 0.6,
            min_height_ratio: 0.75,
            line_overlap_ratio: 0.5,
        }
    }
}

/// One glyph-sized region cut from the capture's ink mask
#[derive(Debug, Clone)]
pub struct CandidateRegion {
    pub bounds: Rect,
    pub bitmap: GrayImage,
}

/// Left-to-right run of regions on one text line, 3-5 long
#[derive(Debug, Clone)]
pub struct CandidateRun {
    pub regions: Vec<CandidateRegion>,
    pub bounds: Rect,
}

/// A fully classified ticker symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerString {
    pub symbol: String,
    pub confidences: Vec<f64>,
    pub bounds: Rect,
}

impl TickerString {
    /// Build from per-character matches; all-or-nothing.
    ///
    /// Rejects lengths outside 3-5, any match below `threshold`, characters
    /// outside A-Z/0-9, and runs without a single letter.
    pub fn from_matches(matches: &[GlyphMatch], bounds: Rect, threshold: f64) -> Result<Self, AnalysisError> {
        if !(MIN_TICKER_LEN..=MAX_TICKER_LEN).contains(&matches.len()) {
            return Err(AnalysisError::InvalidTickerLength(matches.len()));
        }
        if matches.iter().any(|m| m.confidence < threshold) {
            return Err(AnalysisError::NoGlyphMatch);
        }
        if matches
            .iter()
            .any(|m| !(m.character.is_ascii_uppercase() || m.character.is_ascii_digit()))
        {
            return Err(AnalysisError::InvalidData("Ticker contains characters outside A-Z/0-9".to_string()));
        }
        if !matches.iter().any(|m| m.character.is_ascii_uppercase()) {
            return Err(AnalysisError::InvalidData("Digit-only run is not a ticker".to_string()));
        }

        Ok(Self {
            symbol: matches.iter().map(|m| m.character).collect(),
            confidences: matches.iter().map(|m| m.confidence).collect(),
            bounds,
        })
    }

    pub fn min_confidence(&self) -> f64 {
        self.confidences.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

/// 8-connected ink components as bounding boxes, in raster order of discovery
fn connected_components(mask: &GrayImage) -> Vec<Rect> {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    let raw = mask.as_raw();
    let mut visited = vec![false; w * h];
    let mut stack: Vec<usize> = Vec::new();
    let mut boxes = Vec::new();

    for start in 0..w * h {
        if visited[start] || raw[start] != INK {
            continue;
        }
        visited[start] = true;
        stack.push(start);

        let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
        let (mut max_x, mut max_y) = (0usize, 0usize);

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = ny * w + nx;
                    if !visited[n] && raw[n] == INK {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        boxes.push(Rect::from_corners(min_x as u32, min_y as u32, max_x as u32, max_y as u32));
    }

    boxes
}

/// Finds ticker-shaped runs of glyphs in a capture and reads them.
#[derive(Debug, Clone, Default)]
pub struct TickerSegmenter {
    config: SegmenterConfig,
}

impl TickerSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    fn is_char_sized(&self, r: &Rect) -> bool {
        let c = &self.config;
        (c.min_char_width..=c.max_char_width).contains(&r.width)
            && (c.min_char_height..=c.max_char_height).contains(&r.height)
    }

    /// Group boxes into text lines, top to bottom, each sorted left to right
    fn group_lines(&self, mut boxes: Vec<Rect>) -> Vec<Vec<Rect>> {
        boxes.sort_by_key(|r| (r.y, r.x));

        let mut lines: Vec<(Rect, Vec<Rect>)> = Vec::new();
        for b in boxes {
            let slot = lines.iter().position(|(extent, _)| {
                let needed = self.config.line_overlap_ratio * b.height.min(extent.height) as f64;
                extent.vertical_overlap(&b) as f64 >= needed.max(1.0)
            });
            match slot {
                Some(i) => {
                    lines[i].0 = lines[i].0.union(&b);
                    lines[i].1.push(b);
                }
                None => lines.push((b, vec![b])),
            }
        }

        lines.sort_by_key(|(extent, _)| (extent.y, extent.x));
        lines
            .into_iter()
            .map(|(_, mut members)| {
                members.sort_by_key(|r| (r.x, r.y));
                // Fold horizontally overlapping parts (broken strokes) into one glyph
                let mut merged: Vec<Rect> = Vec::with_capacity(members.len());
                for r in members {
                    match merged.last_mut() {
                        Some(last) if r.x < last.right() => *last = last.union(&r),
                        _ => merged.push(r),
                    }
                }
                merged
            })
            .collect()
    }

    /// Split a line into runs of evenly spaced, similarly sized glyph boxes
    fn split_runs(&self, line: &[Rect]) -> Vec<Vec<Rect>> {
        let mut runs: Vec<Vec<Rect>> = Vec::new();
        let mut current: Vec<Rect> = Vec::new();

        for r in line.iter().filter(|r| self.is_char_sized(r)) {
            if let Some(prev) = current.last() {
                let tallest = prev.height.max(r.height) as f64;
                let shortest = prev.height.min(r.height) as f64;
                let gap = r.x.saturating_sub(prev.right()) as f64;
                if gap > self.config.max_gap_ratio * tallest
                    || shortest / tallest < self.config.min_height_ratio
                {
                    runs.push(std::mem::take(&mut current));
                }
            }
            current.push(*r);
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }

    /// Locate 3-5 glyph runs, ignoring anything inside `exclusions`
    pub fn find_runs(&self, image: &DynamicImage, exclusions: &[Rect]) -> Vec<CandidateRun> {
        let mut mask = ink_mask(image);
        clear_zones(&mut mask, exclusions);

        let c = &self.config;
        let boxes: Vec<Rect> = connected_components(&mask)
            .into_iter()
            .filter(|r| r.width <= c.max_char_width && r.height <= c.max_char_height)
            .collect();

        let mut runs = Vec::new();
        let mut rejected = 0usize;
        for line in self.group_lines(boxes) {
            for run in self.split_runs(&line) {
                if !(MIN_TICKER_LEN..=MAX_TICKER_LEN).contains(&run.len()) {
                    rejected += 1;
                    continue;
                }
                let bounds = run.iter().fold(run[0], |acc, r| acc.union(r));
                let regions = run
                    .iter()
                    .map(|r| CandidateRegion {
                        bounds: *r,
                        bitmap: crop(&mask, r),
                    })
                    .collect();
                runs.push(CandidateRun { regions, bounds });
            }
        }

        tracing::debug!(
            "Segmentation found {} candidate runs ({} rejected by length)",
            runs.len(),
            rejected
        );
        runs
    }

    /// Classify every region of a run; the run fails as a whole on any weak glyph
    pub fn read_run(&self, run: &CandidateRun, matcher: &CharacterMatcher) -> Result<TickerString, AnalysisError> {
        let mut matches = Vec::with_capacity(run.regions.len());
        for region in &run.regions {
            matches.push(matcher.classify(&region.bitmap)?);
        }
        TickerString::from_matches(&matches, run.bounds, matcher.config().match_threshold)
    }

    /// Full pass: find runs then read them, keeping only valid tickers
    pub fn read_tickers(
        &self,
        image: &DynamicImage,
        matcher: &CharacterMatcher,
        exclusions: &[Rect],
    ) -> Vec<TickerString> {
        let runs = self.find_runs(image, exclusions);
        self.read_runs(&runs, matcher)
    }

    /// Classify runs in parallel; output keeps the input order
    pub fn read_runs(&self, runs: &[CandidateRun], matcher: &CharacterMatcher) -> Vec<TickerString> {
        let results: Vec<Result<TickerString, AnalysisError>> =
            runs.par_iter().map(|run| self.read_run(run, matcher)).collect();

        results
            .into_iter()
            .filter_map(|r| match r {
                Ok(ticker) => Some(ticker),
                Err(e) => {
                    tracing::debug!("Run rejected: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn m(character: char, confidence: f64) -> GlyphMatch {
        GlyphMatch { character, confidence }
    }

    #[test]
    fn test_ticker_length_window() {
        let bounds = Rect::new(0, 0, 10, 10);
        let two = [m('A', 0.9), m('B', 0.9)];
        let six = [m('A', 0.9); 6];
        assert_eq!(
            TickerString::from_matches(&two, bounds, 0.7),
            Err(AnalysisError::InvalidTickerLength(2))
        );
        assert_eq!(
            TickerString::from_matches(&six, bounds, 0.7),
            Err(AnalysisError::InvalidTickerLength(6))
        );
        let ok = TickerString::from_matches(&[m('I', 0.9), m('B', 0.8), m('M', 0.95)], bounds, 0.7).unwrap();
        assert_eq!(ok.symbol, "IBM");
        assert_eq!(ok.min_confidence(), 0.8);
    }

    #[test]
    fn test_one_weak_glyph_rejects_run() {
        let run = [m('A', 0.95), m('A', 0.95), m('P', 0.5), m('L', 0.95)];
        assert_eq!(
            TickerString::from_matches(&run, Rect::new(0, 0, 1, 1), 0.7),
            Err(AnalysisError::NoGlyphMatch)
        );
    }

    #[test]
    fn test_digit_only_run_rejected() {
        let run = [m('1', 0.95), m('0', 0.95), m('0', 0.95)];
        assert!(TickerString::from_matches(&run, Rect::new(0, 0, 1, 1), 0.7).is_err());
    }

    #[test]
    fn test_connected_components_eight_way() {
        let mut mask = GrayImage::new(10, 10);
        // Diagonal pair joins, isolated pixel stays apart
        mask.put_pixel(1, 1, Luma([INK]));
        mask.put_pixel(2, 2, Luma([INK]));
        mask.put_pixel(7, 7, Luma([INK]));
        let boxes = connected_components(&mask);
        assert_eq!(boxes, vec![Rect::new(1, 1, 2, 2), Rect::new(7, 7, 1, 1)]);
    }

    #[test]
    fn test_split_runs_on_wide_gap() {
        let seg = TickerSegmenter::default();
        let line: Vec<Rect> = [0, 36, 72, 200, 236, 272]
            .iter()
            .map(|&x| Rect::new(x, 0, 30, 42))
            .collect();
        let runs = seg.split_runs(&line);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 3);
        assert_eq!(runs[1][0].x, 200);
    }

    #[test]
    fn test_group_lines_merges_overlapping_parts() {
        let seg = TickerSegmenter::default();
        let boxes = vec![
            Rect::new(100, 0, 20, 40),
            Rect::new(0, 2, 20, 40),
            Rect::new(5, 10, 10, 5), // inside first glyph's column span
            Rect::new(0, 100, 20, 40),
        ];
        let lines = seg.group_lines(boxes);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], vec![Rect::new(0, 2, 20, 40), Rect::new(100, 0, 20, 40)]);
        assert_eq!(lines[1], vec![Rect::new(0, 100, 20, 40)]);
    }
}
