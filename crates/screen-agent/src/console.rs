use std::path::PathBuf;

use analysis_core::{AnalysisError, Recommendation};
use analysis_orchestrator::{RecommendationDisplay, ScreenCapture};
use async_trait::async_trait;
use image::DynamicImage;

/// Reads the "screen" from an image file that another tool keeps refreshed
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScreenCapture for FileCapture {
    async fn capture(&self) -> Result<DynamicImage, AnalysisError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            image::open(&path).map_err(|e| AnalysisError::Capture(format!("{}: {}", path.display(), e)))
        })
        .await
        .map_err(|e| AnalysisError::Capture(format!("capture worker failed: {}", e)))?
    }
}

/// Prints status lines and the final recommendation to stdout
#[derive(Default)]
pub struct ConsoleDisplay;

impl RecommendationDisplay for ConsoleDisplay {
    fn show_status(&self, status: &str) {
        tracing::debug!("status: {}", status);
        println!("[status] {}", status);
    }

    fn show_ticker(&self, ticker: &str) {
        println!("[ticker] {}", ticker);
    }

    fn show_recommendation(&self, recommendation: &Recommendation) {
        tracing::info!("Recommendation: {} - {}", recommendation.headline(), recommendation.rationale);
        match serde_json::to_string_pretty(recommendation) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::warn!("Failed to serialize recommendation: {}", e),
        }
    }
}
