use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Marker placed at the start of a rationale when the market data fetch failed
pub const DATA_UNAVAILABLE_MARKER: &str = "data unavailable";

/// Number of trailing daily bars used for the price snapshot
pub const SNAPSHOT_WINDOW: usize = 5;

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Price and volume summary over the last few trading days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub price: f64,
    pub previous_close: f64,
    /// Day-over-day change in percent
    pub price_change_pct: f64,
    /// Change across the snapshot window in percent
    pub trend_pct: f64,
    pub volume: f64,
    /// Latest volume relative to the window average, in percent
    pub volume_trend_pct: f64,
}

impl PriceSnapshot {
    /// Summarise the trailing `SNAPSHOT_WINDOW` bars (oldest first).
    pub fn from_bars(symbol: &str, bars: &[Bar]) -> Result<Self, AnalysisError> {
        if bars.is_empty() {
            return Err(AnalysisError::MarketDataUnavailable(format!(
                "No data found for ticker {}",
                symbol
            )));
        }

        let window = &bars[bars.len().saturating_sub(SNAPSHOT_WINDOW)..];
        let first = &window[0];
        let last = &window[window.len() - 1];
        let previous_close = if window.len() > 1 {
            window[window.len() - 2].close
        } else {
            last.close
        };

        if first.close <= 0.0 || previous_close <= 0.0 {
            return Err(AnalysisError::InvalidData(format!(
                "Non-positive close price for {}",
                symbol
            )));
        }

        let avg_volume = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
        let volume_trend_pct = if avg_volume > 0.0 {
            (last.volume - avg_volume) / avg_volume * 100.0
        } else {
            0.0
        };

        Ok(Self {
            symbol: symbol.to_string(),
            price: last.close,
            previous_close,
            price_change_pct: (last.close - previous_close) / previous_close * 100.0,
            trend_pct: (last.close - first.close) / first.close * 100.0,
            volume: last.volume,
            volume_trend_pct,
        })
    }
}

/// News headline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub description: Option<String>,
    pub published_utc: Option<DateTime<Utc>>,
}

impl Headline {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            published_utc: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > 20.0 {
            SentimentLabel::Positive
        } else if score < -20.0 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// Aggregated news sentiment for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    /// -100 (all negative) to 100 (all positive)
    pub score: f64,
    pub label: SentimentLabel,
    pub headline_count: usize,
}

impl SentimentSummary {
    pub fn neutral() -> Self {
        Self {
            score: 0.0,
            label: SentimentLabel::Neutral,
            headline_count: 0,
        }
    }
}

/// Recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn to_label(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }
}

/// Recommendation record handed to the display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub action: Action,
    pub confidence: f64, // 0.0 to 1.0
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sentiment: Option<SentimentSummary>,
    #[serde(default)]
    pub chart_detected: bool,
}

impl Recommendation {
    /// Neutral fallback used when market data could not be obtained
    pub fn data_unavailable(symbol: &str, reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: Action::Hold,
            confidence: 0.5,
            rationale: format!("{}: {}", DATA_UNAVAILABLE_MARKER, reason),
            timestamp: Utc::now(),
            price: None,
            sentiment: None,
            chart_detected: false,
        }
    }

    /// One-line form for status displays, e.g. `AAPL BUY (75% confidence)`
    pub fn headline(&self) -> String {
        format!(
            "{} {} ({:.0}% confidence)",
            self.symbol,
            self.action.to_label(),
            self.confidence * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| Bar {
                timestamp: Utc::now() - chrono::Duration::days((closes.len() - i) as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect()
    }

    #[test]
    fn test_snapshot_uses_trailing_window() {
        let data = bars(
            &[50.0, 100.0, 101.0, 102.0, 103.0, 110.0],
            &[9.0, 100.0, 100.0, 100.0, 100.0, 200.0],
        );
        let snap = PriceSnapshot::from_bars("AAPL", &data).unwrap();

        assert_eq!(snap.price, 110.0);
        assert_eq!(snap.previous_close, 103.0);
        assert!((snap.trend_pct - 10.0).abs() < 1e-9);
        // avg volume 120, latest 200
        assert!((snap.volume_trend_pct - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_snapshot_single_bar() {
        let snap = PriceSnapshot::from_bars("MSFT", &bars(&[42.0], &[10.0])).unwrap();
        assert_eq!(snap.price_change_pct, 0.0);
        assert_eq!(snap.trend_pct, 0.0);
        assert_eq!(snap.volume_trend_pct, 0.0);
    }

    #[test]
    fn test_snapshot_empty_is_unavailable() {
        let err = PriceSnapshot::from_bars("ZZZZ", &[]).unwrap_err();
        assert!(matches!(err, AnalysisError::MarketDataUnavailable(_)));
    }

    #[test]
    fn test_data_unavailable_recommendation() {
        let rec = Recommendation::data_unavailable("AAPL", "timed out");
        assert_eq!(rec.action, Action::Hold);
        assert!(rec.rationale.contains(DATA_UNAVAILABLE_MARKER));
        assert_eq!(rec.headline(), "AAPL HOLD (50% confidence)");
    }

    #[test]
    fn test_action_serializes_lowercase() {
        let json = serde_json::to_string(&Action::Buy).unwrap();
        assert_eq!(json, "\"buy\"");
    }

    #[test]
    fn test_sentiment_label_thresholds() {
        assert_eq!(SentimentLabel::from_score(25.0), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(20.0), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-20.5), SentimentLabel::Negative);
    }
}
