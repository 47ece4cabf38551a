use async_trait::async_trait;
use crate::{AnalysisError, Headline, PriceSnapshot};

/// Source of price/volume snapshots for a symbol
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<PriceSnapshot, AnalysisError>;
}

/// Source of recent news headlines for a symbol
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn headlines(&self, symbol: &str, limit: u32) -> Result<Vec<Headline>, AnalysisError>;
}

/// Scores a single headline's polarity in [-1.0, 1.0]
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn polarity(&self, headline: &Headline) -> Result<f64, AnalysisError>;
}
