use std::sync::Arc;

use analysis_core::AnalysisError;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::preprocess::normalize_glyph;
use crate::templates::TemplateStore;

/// Minimum correlation for a classification to count (cv2 TM_CCOEFF_NORMED scale)
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub match_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Best template for a region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlyphMatch {
    pub character: char,
    pub confidence: f64, // 0.0 to 1.0
}

/// Mean-centered pixel values and their sum of squares
pub(crate) fn zero_mean(bitmap: &GrayImage) -> (Vec<f64>, f64) {
    let n = (bitmap.width() * bitmap.height()) as usize;
    if n == 0 {
        return (Vec::new(), 0.0);
    }
    let mean = bitmap.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n as f64;
    let centered: Vec<f64> = bitmap.pixels().map(|p| p.0[0] as f64 - mean).collect();
    let energy = centered.iter().map(|c| c * c).sum();
    (centered, energy)
}

/// Zero-mean normalized cross-correlation of two equally sized, pre-centered signals.
/// Undefined (uniform) inputs score 0.
fn ncc(a: &[f64], a_energy: f64, b: &[f64], b_energy: f64) -> f64 {
    if a.len() != b.len() || a_energy <= 0.0 || b_energy <= 0.0 {
        return 0.0;
    }
    let cross: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    cross / (a_energy * b_energy).sqrt()
}

/// Classifies glyph regions against an immutable template store.
///
/// Regions are ink masks (255 = ink). A region already at template size is
/// compared as-is; anything else is normalized first. Ties go to the template
/// registered first.
#[derive(Clone)]
pub struct CharacterMatcher {
    store: Arc<TemplateStore>,
    config: MatcherConfig,
}

impl CharacterMatcher {
    pub fn new(store: Arc<TemplateStore>, config: MatcherConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn prepare(&self, region: &GrayImage) -> Option<GrayImage> {
        let (w, h) = self.store.dimensions();
        if region.dimensions() == (w, h) {
            Some(region.clone())
        } else {
            normalize_glyph(region, w, h)
        }
    }

    /// Correlation against every template, in registration order
    pub fn scores(&self, region: &GrayImage) -> Vec<(char, f64)> {
        let Some(prepared) = self.prepare(region) else {
            return Vec::new();
        };
        let (centered, energy) = zero_mean(&prepared);

        self.store
            .iter()
            .map(|t| {
                let score = ncc(&centered, energy, t.centered(), t.energy());
                (t.character(), score.clamp(0.0, 1.0))
            })
            .collect()
    }

    /// Highest scoring template regardless of threshold.
    ///
    /// Fails with `NoGlyphMatch` when the region cannot be normalized or
    /// nothing correlates positively.
    pub fn best_match(&self, region: &GrayImage) -> Result<GlyphMatch, AnalysisError> {
        let mut best: Option<GlyphMatch> = None;
        for (character, confidence) in self.scores(region) {
            // Strict '>' keeps the earliest template on ties
            if best.map_or(true, |b| confidence > b.confidence) {
                best = Some(GlyphMatch { character, confidence });
            }
        }

        match best {
            Some(m) if m.confidence > 0.0 => Ok(m),
            _ => Err(AnalysisError::NoGlyphMatch),
        }
    }

    /// Best match that also clears the configured threshold
    pub fn classify(&self, region: &GrayImage) -> Result<GlyphMatch, AnalysisError> {
        let m = self.best_match(region)?;
        if m.confidence >= self.config.match_threshold {
            Ok(m)
        } else {
            tracing::debug!(
                "Best match '{}' at {:.3} below threshold {:.2}",
                m.character,
                m.confidence,
                self.config.match_threshold
            );
            Err(AnalysisError::NoGlyphMatch)
        }
    }
}
