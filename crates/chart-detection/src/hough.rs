use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::edges::EDGE;

/// Probabilistic-Hough style parameters (1 px rho, 1 degree theta)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HoughConfig {
    pub vote_threshold: u32,
    pub min_line_length: f64,
    pub max_line_gap: u32,
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            vote_threshold: 100,
            min_line_length: 100.0,
            max_line_gap: 10,
        }
    }
}

/// Line segment with endpoints ordered left to right (top to bottom when vertical)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        if (x2, y2) < (x1, y1) {
            Self { x1: x2, y1: y2, x2: x1, y2: y1 }
        } else {
            Self { x1, y1, x2, y2 }
        }
    }

    pub fn length(&self) -> f64 {
        let dx = (self.x2 - self.x1) as f64;
        let dy = (self.y2 - self.y1) as f64;
        dx.hypot(dy)
    }

    /// Angle against the x axis in degrees, within [-90, 90]
    pub fn angle_degrees(&self) -> f64 {
        let dy = (self.y2 - self.y1) as f64;
        let dx = (self.x2 - self.x1) as f64;
        dy.atan2(dx).to_degrees()
    }
}

const THETA_STEPS: usize = 180;

struct Accumulator {
    votes: Vec<u32>,
    rho_bins: usize,
    rho_offset: i32,
}

impl Accumulator {
    fn get(&self, theta: usize, rho: usize) -> u32 {
        self.votes[theta * self.rho_bins + rho]
    }
}

fn trig_table() -> Vec<(f64, f64)> {
    (0..THETA_STEPS)
        .map(|t| {
            let theta = (t as f64).to_radians();
            (theta.cos(), theta.sin())
        })
        .collect()
}

fn rho_of(x: i32, y: i32, cos: f64, sin: f64) -> f64 {
    x as f64 * cos + y as f64 * sin
}

fn vote(points: &[(i32, i32)], trig: &[(f64, f64)], diag: i32) -> Accumulator {
    let rho_bins = (2 * diag + 1) as usize;
    let votes: Vec<u32> = trig
        .par_iter()
        .flat_map_iter(|&(cos, sin)| {
            let mut row = vec![0u32; rho_bins];
            for &(x, y) in points {
                let r = rho_of(x, y, cos, sin).round() as i32 + diag;
                row[r as usize] += 1;
            }
            row
        })
        .collect();

    Accumulator {
        votes,
        rho_bins,
        rho_offset: diag,
    }
}

/// Local maxima above threshold, strongest first. Plateaus resolve to
/// their first cell in (theta, rho) order.
fn peaks(acc: &Accumulator, threshold: u32) -> Vec<(usize, usize, u32)> {
    let mut found = Vec::new();
    for t in 0..THETA_STEPS {
        for r in 0..acc.rho_bins {
            let v = acc.get(t, r);
            if v < threshold || v == 0 {
                continue;
            }
            let mut is_peak = true;
            'scan: for nt in t.saturating_sub(1)..=(t + 1).min(THETA_STEPS - 1) {
                for nr in r.saturating_sub(1)..=(r + 1).min(acc.rho_bins - 1) {
                    if (nt, nr) == (t, r) {
                        continue;
                    }
                    let n = acc.get(nt, nr);
                    let earlier = (nt, nr) < (t, r);
                    if n > v || (earlier && n == v) {
                        is_peak = false;
                        break 'scan;
                    }
                }
            }
            if is_peak {
                found.push((t, r, v));
            }
        }
    }
    found.sort_by(|a, b| b.2.cmp(&a.2).then((a.0, a.1).cmp(&(b.0, b.1))));
    found
}

/// Extract line segments from an edge map.
///
/// Votes every edge pixel into a (theta, rho) accumulator, then walks each
/// peak line through the image, joining edge hits separated by at most
/// `max_line_gap` pixels. Pixels claimed by an accepted segment are not
/// reused. Output order is deterministic.
pub fn find_segments(edges: &GrayImage, config: &HoughConfig) -> Vec<LineSegment> {
    let (width, height) = edges.dimensions();
    let points: Vec<(i32, i32)> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] == EDGE)
        .map(|(x, y, _)| (x as i32, y as i32))
        .collect();
    if points.is_empty() {
        return Vec::new();
    }

    let diag = ((width as f64).hypot(height as f64)).ceil() as i32;
    let trig = trig_table();
    let acc = vote(&points, &trig, diag);

    let (w, h) = (width as i32, height as i32);
    let mut used = vec![false; (width * height) as usize];
    let is_free = |used: &[bool], x: i32, y: i32| {
        x >= 0 && y >= 0 && x < w && y < h && {
            let i = (y * w + x) as usize;
            !used[i] && edges.as_raw()[i] == EDGE
        }
    };

    let mut segments = Vec::new();
    for (t, r, _) in peaks(&acc, config.vote_threshold) {
        let (cos, sin) = trig[t];
        let rho = r as i32 - acc.rho_offset;
        let (x0, y0) = (rho as f64 * cos, rho as f64 * sin);
        let (dx, dy) = (-sin, cos);
        let (nx, ny) = (cos.round() as i32, sin.round() as i32);

        // Pixel on the line at step `s`, allowing one pixel of perpendicular slack
        let hit_at = |used: &[bool], s: i32| -> Option<(i32, i32)> {
            let px = (x0 + s as f64 * dx).round() as i32;
            let py = (y0 + s as f64 * dy).round() as i32;
            [(px, py), (px + nx, py + ny), (px - nx, py - ny)]
                .into_iter()
                .find(|&(x, y)| is_free(used, x, y))
        };

        let mut runs: Vec<(i32, i32, (i32, i32), (i32, i32))> = Vec::new();
        let mut current: Option<(i32, i32, (i32, i32), (i32, i32))> = None;
        for s in -diag..=diag {
            let Some(p) = hit_at(&used, s) else {
                continue;
            };
            current = match current {
                Some((start, last, first, _)) if s - last <= config.max_line_gap as i32 + 1 => {
                    Some((start, s, first, p))
                }
                Some(done) => {
                    runs.push(done);
                    Some((s, s, p, p))
                }
                None => Some((s, s, p, p)),
            };
        }
        runs.extend(current);

        for (start, end, first, last) in runs {
            let segment = LineSegment::new(first.0, first.1, last.0, last.1);
            if segment.length() < config.min_line_length {
                continue;
            }
            for s in start..=end {
                let px = (x0 + s as f64 * dx).round() as i32;
                let py = (y0 + s as f64 * dy).round() as i32;
                for (x, y) in [(px, py), (px + nx, py + ny), (px - nx, py - ny)] {
                    if x >= 0 && y >= 0 && x < w && y < h {
                        used[(y * w + x) as usize] = true;
                    }
                }
            }
            segments.push(segment);
        }
    }

    tracing::debug!("Hough transform found {} segments from {} edge pixels", segments.len(), points.len());
    segments
}
