use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};

pub const EDGE: u8 = 255;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CannyConfig {
    pub blur_sigma: f32,
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl Default for CannyConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            low_threshold: 50.0,
            high_threshold: 150.0,
        }
    }
}

/// Gradient direction bucket used for non-maximum suppression
#[derive(Debug, Clone, Copy, PartialEq)]
enum Sector {
    Horizontal,
    Diagonal,
    Vertical,
    AntiDiagonal,
}

fn sector(gx: f32, gy: f32) -> Sector {
    let mut angle = gy.atan2(gx).to_degrees();
    if angle < 0.0 {
        angle += 180.0;
    }
    if !(22.5..157.5).contains(&angle) {
        Sector::Horizontal
    } else if angle < 67.5 {
        Sector::Diagonal
    } else if angle < 112.5 {
        Sector::Vertical
    } else {
        Sector::AntiDiagonal
    }
}

/// Canny edge map (255 = edge): Gaussian blur, 3x3 Sobel with L1 magnitude,
/// non-maximum suppression, then hysteresis between the two thresholds.
pub fn canny(gray: &GrayImage, config: &CannyConfig) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut edges = GrayImage::new(width, height);
    if width < 3 || height < 3 {
        return edges;
    }

    let blurred = if config.blur_sigma > 0.0 {
        imageops::blur(gray, config.blur_sigma)
    } else {
        gray.clone()
    };

    let (w, h) = (width as usize, height as usize);
    let src = blurred.as_raw();
    let p = |x: usize, y: usize| src[y * w + x] as f32;

    let mut magnitude = vec![0f32; w * h];
    let mut sectors = vec![Sector::Horizontal; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (p(x + 1, y - 1) + 2.0 * p(x + 1, y) + p(x + 1, y + 1))
                - (p(x - 1, y - 1) + 2.0 * p(x - 1, y) + p(x - 1, y + 1));
            let gy = (p(x - 1, y + 1) + 2.0 * p(x, y + 1) + p(x + 1, y + 1))
                - (p(x - 1, y - 1) + 2.0 * p(x, y - 1) + p(x + 1, y - 1));
            magnitude[y * w + x] = gx.abs() + gy.abs();
            sectors[y * w + x] = sector(gx, gy);
        }
    }

    // Thin ridges: keep a pixel only if it peaks across the gradient
    let mut thin = vec![0f32; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let m = magnitude[i];
            if m < config.low_threshold {
                continue;
            }
            let (before, after) = match sectors[i] {
                Sector::Horizontal => (i - 1, i + 1),
                Sector::Diagonal => (i - w - 1, i + w + 1),
                Sector::Vertical => (i - w, i + w),
                Sector::AntiDiagonal => (i - w + 1, i + w - 1),
            };
            if m > magnitude[before] && m >= magnitude[after] {
                thin[i] = m;
            }
        }
    }

    // Hysteresis from strong seeds through 8-connected weak pixels
    let mut stack: Vec<usize> = (0..w * h)
        .filter(|&i| thin[i] >= config.high_threshold)
        .collect();
    let mut marked = vec![false; w * h];
    for &i in &stack {
        marked[i] = true;
    }
    while let Some(i) = stack.pop() {
        let (x, y) = (i % w, i / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if !marked[n] && thin[n] >= config.low_threshold {
                    marked[n] = true;
                    stack.push(n);
                }
            }
        }
    }

    for (i, _) in marked.iter().enumerate().filter(|(_, &m)| m) {
        edges.put_pixel((i % w) as u32, (i / w) as u32, Luma([EDGE]));
    }
    edges
}
