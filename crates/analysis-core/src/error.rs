use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("No glyph template matched the region")]
    NoGlyphMatch,

    #[error("Invalid ticker length: {0} (expected 3-5 characters)")]
    InvalidTickerLength(usize),

    #[error("Chart detection inconclusive: {0}")]
    ChartDetectionInconclusive(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl AnalysisError {
    /// Whether a retry could plausibly succeed (remote, time-dependent failures).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalysisError::MarketDataUnavailable(_)
                | AnalysisError::RateLimited(_)
                | AnalysisError::ApiError(_)
        )
    }
}
