use analysis_core::{AnalysisError, Rect};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::edges::{canny, CannyConfig};
use crate::grid::{detect_grid, GridConfig};
use crate::hough::{find_segments, HoughConfig, LineSegment};

/// Segment statistics a chart must fall inside
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChartEnvelope {
    pub min_segments: usize,
    /// Segments within this many degrees of horizontal count as horizontal
    pub horizontal_max_angle: f64,
    /// Segments at least this many degrees off horizontal count as vertical
    pub vertical_min_angle: f64,
    pub min_horizontal_ratio: f64,
    pub max_vertical_ratio: f64,
    pub grid_bonus: f64,
    pub min_confidence: f64,
}

impl Default for ChartEnvelope {
    fn default() -> Self {
        Self {
            min_segments: 5,
            horizontal_max_angle: 30.0,
            vertical_min_angle: 60.0,
            min_horizontal_ratio: 0.6,
            max_vertical_ratio: 0.3,
            grid_bonus: 0.2,
            min_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChartDetectorConfig {
    pub canny: CannyConfig,
    pub hough: HoughConfig,
    pub grid: GridConfig,
    pub envelope: ChartEnvelope,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartMetrics {
    pub segment_count: usize,
    pub horizontal_ratio: f64,
    pub vertical_ratio: f64,
    /// Population variance of segment angles, in squared degrees
    pub slope_variance: f64,
    /// Segments per megapixel
    pub segment_density: f64,
    pub has_grid: bool,
    /// Confidence from line distribution alone, before the grid bonus
    pub line_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSignal {
    pub is_chart: bool,
    pub confidence: f64, // 0.0 to 1.0
    pub segments: Vec<LineSegment>,
    pub region: Option<Rect>,
    pub metrics: ChartMetrics,
}

impl ChartSignal {
    pub fn not_a_chart() -> Self {
        Self {
            is_chart: false,
            confidence: 0.0,
            segments: Vec::new(),
            region: None,
            metrics: ChartMetrics::default(),
        }
    }
}

/// Bounding box of the given segments, clipped to the image
fn segment_bounds<'a>(segments: impl Iterator<Item = &'a LineSegment>, width: u32, height: u32) -> Option<Rect> {
    let mut bounds: Option<Rect> = None;
    for s in segments {
        let clamp_x = |v: i32| v.clamp(0, width as i32 - 1) as u32;
        let clamp_y = |v: i32| v.clamp(0, height as i32 - 1) as u32;
        let r = Rect::from_corners(
            clamp_x(s.x1.min(s.x2)),
            clamp_y(s.y1.min(s.y2)),
            clamp_x(s.x1.max(s.x2)),
            clamp_y(s.y1.max(s.y2)),
        );
        bounds = Some(bounds.map_or(r, |b| b.union(&r)));
    }
    bounds
}

/// Rule-based chart detector. Stateless; identical pixels give identical signals.
#[derive(Debug, Clone, Default)]
pub struct ChartDetector {
    config: ChartDetectorConfig,
}

impl ChartDetector {
    pub fn new(config: ChartDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChartDetectorConfig {
        &self.config
    }

    /// Classify a capture. Degenerate images come back as "not a chart".
    pub fn detect(&self, image: &DynamicImage) -> ChartSignal {
        match self.try_detect(image) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::debug!("Chart detection skipped: {}", e);
                ChartSignal::not_a_chart()
            }
        }
    }

    /// Same as [`detect`](Self::detect) but reports why an image could not be analysed
    pub fn try_detect(&self, image: &DynamicImage) -> Result<ChartSignal, AnalysisError> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return Err(AnalysisError::ChartDetectionInconclusive(format!(
                "Image too small: {}x{}",
                width, height
            )));
        }

        let edges = canny(&gray, &self.config.canny);
        let segments = find_segments(&edges, &self.config.hough);
        let has_grid = detect_grid(&edges, &self.config.grid).is_some();

        let env = &self.config.envelope;
        let mut metrics = ChartMetrics {
            segment_count: segments.len(),
            has_grid,
            segment_density: segments.len() as f64 / (width as f64 * height as f64 / 1_000_000.0),
            ..ChartMetrics::default()
        };

        let angles: Vec<f64> = segments.iter().map(|s| s.angle_degrees()).collect();
        let is_horizontal = |a: f64| a.abs() <= env.horizontal_max_angle;
        if !angles.is_empty() {
            let n = angles.len() as f64;
            let horizontal = angles.iter().filter(|a| is_horizontal(**a)).count();
            let vertical = angles.iter().filter(|a| a.abs() >= env.vertical_min_angle).count();
            let mean = angles.iter().sum::<f64>() / n;

            metrics.horizontal_ratio = horizontal as f64 / n;
            metrics.vertical_ratio = vertical as f64 / n;
            metrics.slope_variance = angles.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
        }

        let in_envelope = segments.len() >= env.min_segments
            && metrics.horizontal_ratio > env.min_horizontal_ratio
            && metrics.vertical_ratio < env.max_vertical_ratio;
        if in_envelope {
            metrics.line_confidence = metrics.horizontal_ratio;
        }

        let mut confidence = metrics.line_confidence;
        if has_grid {
            confidence = (confidence + env.grid_bonus).min(1.0);
        }
        let is_chart = in_envelope && confidence >= env.min_confidence;

        let region = if is_chart {
            segment_bounds(
                segments.iter().filter(|s| is_horizontal(s.angle_degrees())),
                width,
                height,
            )
        } else {
            None
        };

        if is_chart {
            tracing::info!("Chart detected with {:.0}% confidence", confidence * 100.0);
        } else {
            tracing::debug!(
                "No chart pattern ({} segments, horizontal ratio {:.2}, grid {})",
                metrics.segment_count,
                metrics.horizontal_ratio,
                has_grid
            );
        }

        Ok(ChartSignal {
            is_chart,
            confidence,
            segments,
            region,
            metrics,
        })
    }
}
