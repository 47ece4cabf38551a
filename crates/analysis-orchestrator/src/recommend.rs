use analysis_core::{Action, PriceSnapshot, Recommendation, SentimentSummary, SNAPSHOT_WINDOW};
use chart_detection::ChartSignal;
use chrono::Utc;

const BASE_CONFIDENCE: u32 = 50;
const TREND_THRESHOLD_PCT: f64 = 2.0;
const VOLUME_SURGE_PCT: f64 = 20.0;
const SENTIMENT_THRESHOLD: f64 = 20.0;

const TREND_WEIGHT: u32 = 10;
const VOLUME_WEIGHT: u32 = 10;
const SENTIMENT_WEIGHT: u32 = 15;
const AGREEMENT_BONUS: u32 = 15;
const HOLD_PENALTY: u32 = 10;

/// Direction suggested by a single input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

impl Signal {
    fn label(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Neutral => "NEUTRAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleOutcome {
    pub action: Action,
    /// 0 to 100
    pub confidence_pct: u32,
    pub trend_signal: Signal,
    pub sentiment_signal: Signal,
}

/// Combine price trend, volume and news sentiment into an action.
///
/// Starts from 50; a trend beyond +/-2% adds 10, volume 20% over average adds
/// 10, sentiment beyond +/-20 adds 15. Agreement adds another 15 (capped at
/// 100); a trend the sentiment does not contradict decides alone; anything
/// else holds at the score minus 10, never below 50.
pub fn apply_rules(trend_pct: f64, volume_trend_pct: f64, sentiment_score: f64) -> RuleOutcome {
    let mut confidence = BASE_CONFIDENCE;

    let trend_signal = if trend_pct > TREND_THRESHOLD_PCT {
        confidence += TREND_WEIGHT;
        Signal::Buy
    } else if trend_pct < -TREND_THRESHOLD_PCT {
        confidence += TREND_WEIGHT;
        Signal::Sell
    } else {
        Signal::Neutral
    };

    if volume_trend_pct > VOLUME_SURGE_PCT {
        confidence += VOLUME_WEIGHT;
    }

    let sentiment_signal = if sentiment_score > SENTIMENT_THRESHOLD {
        confidence += SENTIMENT_WEIGHT;
        Signal::Buy
    } else if sentiment_score < -SENTIMENT_THRESHOLD {
        confidence += SENTIMENT_WEIGHT;
        Signal::Sell
    } else {
        Signal::Neutral
    };

    let (action, confidence_pct) = match (trend_signal, sentiment_signal) {
        (Signal::Buy, Signal::Buy) => (Action::Buy, (confidence + AGREEMENT_BONUS).min(100)),
        (Signal::Sell, Signal::Sell) => (Action::Sell, (confidence + AGREEMENT_BONUS).min(100)),
        (Signal::Buy, s) if s != Signal::Sell => (Action::Buy, confidence),
        (Signal::Sell, s) if s != Signal::Buy => (Action::Sell, confidence),
        _ => (Action::Hold, confidence.saturating_sub(HOLD_PENALTY).max(BASE_CONFIDENCE)),
    };

    RuleOutcome {
        action,
        confidence_pct,
        trend_signal,
        sentiment_signal,
    }
}

/// Build the displayed record for a symbol with market data in hand
pub fn recommend(
    snapshot: &PriceSnapshot,
    sentiment: &SentimentSummary,
    chart: Option<&ChartSignal>,
) -> Recommendation {
    let outcome = apply_rules(snapshot.trend_pct, snapshot.volume_trend_pct, sentiment.score);

    let mut rationale = format!(
        "{}-day trend {:+.1}% ({}), volume {:+.0}% vs average, news sentiment {:.0} {:?} from {} headlines ({})",
        SNAPSHOT_WINDOW,
        snapshot.trend_pct,
        outcome.trend_signal.label(),
        snapshot.volume_trend_pct,
        sentiment.score,
        sentiment.label,
        sentiment.headline_count,
        outcome.sentiment_signal.label(),
    );
    let chart_detected = chart.is_some_and(|c| c.is_chart);
    if let Some(c) = chart.filter(|c| c.is_chart) {
        rationale.push_str(&format!("; chart pattern on screen ({:.0}% confidence)", c.confidence * 100.0));
    }

    Recommendation {
        symbol: snapshot.symbol.clone(),
        action: outcome.action,
        confidence: outcome.confidence_pct as f64 / 100.0,
        rationale,
        timestamp: Utc::now(),
        price: Some(snapshot.price),
        sentiment: Some(sentiment.clone()),
        chart_detected,
    }
}
