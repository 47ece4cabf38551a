use std::sync::Arc;
use std::time::Duration;

use analysis_core::{
    AnalysisError, Headline, MarketDataProvider, NewsProvider, PriceSnapshot, Recommendation, Rect,
    SentimentScorer, SentimentSummary,
};
use async_trait::async_trait;
use chart_detection::{ChartDetector, ChartDetectorConfig, ChartSignal};
use image::DynamicImage;
use ticker_ocr::{
    CandidateRun, CharacterMatcher, MatcherConfig, SegmenterConfig, TemplateStore, TickerSegmenter,
    TickerString,
};
use tokio::time::Instant;

pub mod cache;
pub mod recommend;
pub mod retry;
pub mod state;

pub use cache::{TtlCache, CACHE_TTL_SECS};
pub use recommend::{apply_rules, recommend, RuleOutcome, Signal};
pub use retry::RetryPolicy;
pub use state::{Cooldown, PipelineState, TriggerDecision};

/// Produces the image to analyse when a trigger fires
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self) -> Result<DynamicImage, AnalysisError>;
}

/// Receives progress and results; rendering is up to the implementation
pub trait RecommendationDisplay: Send + Sync {
    fn show_status(&self, status: &str);
    fn show_ticker(&self, ticker: &str);
    fn show_recommendation(&self, recommendation: &Recommendation);
}

/// External services the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn ScreenCapture>,
    pub display: Arc<dyn RecommendationDisplay>,
    pub market_data: Arc<dyn MarketDataProvider>,
    pub news: Arc<dyn NewsProvider>,
    pub sentiment: Arc<dyn SentimentScorer>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cooldown: Duration,
    pub news_limit: u32,
    pub retry: RetryPolicy,
    pub cache_ttl_secs: i64,
    pub matcher: MatcherConfig,
    pub segmenter: SegmenterConfig,
    pub chart: ChartDetectorConfig,
    /// Screen areas never read as ticker text, such as the overlay showing results
    pub exclusion_zones: Vec<Rect>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(1),
            news_limit: 10,
            retry: RetryPolicy::default(),
            cache_ttl_secs: CACHE_TTL_SECS,
            matcher: MatcherConfig::default(),
            segmenter: SegmenterConfig::default(),
            chart: ChartDetectorConfig::default(),
            exclusion_zones: Vec::new(),
        }
    }
}

/// Result of one trigger
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// Trigger dropped (cooldown or busy); nothing ran
    Ignored(TriggerDecision),
    CaptureFailed(AnalysisError),
    NoTicker { chart: ChartSignal },
    Recommended {
        ticker: TickerString,
        chart: ChartSignal,
        recommendation: Recommendation,
    },
}

/// Recommendation for one symbol together with the collaborator failures behind it
#[derive(Debug, Clone)]
pub struct SymbolAnalysis {
    pub recommendation: Recommendation,
    /// Set when the snapshot could not be fetched; the recommendation is then a hold
    pub market_error: Option<AnalysisError>,
    /// Set when headlines could not be fetched; sentiment was scored on no news
    pub news_error: Option<AnalysisError>,
}

impl SymbolAnalysis {
    /// Final status line for the display
    pub fn status(&self) -> String {
        match (&self.market_error, &self.news_error) {
            (Some(e @ AnalysisError::RateLimited(_)), _) => format!("{}; try again shortly", e),
            (Some(AnalysisError::MarketDataUnavailable(reason)), _) => {
                format!("Market data unavailable: {}", reason)
            }
            (Some(e), _) => format!("Market data unavailable: {}", e),
            (None, Some(AnalysisError::RateLimited(_))) => {
                "Analysis complete (news rate limited, sentiment neutral)".to_string()
            }
            (None, Some(_)) => "Analysis complete (news unavailable, sentiment neutral)".to_string(),
            (None, None) => "Analysis complete".to_string(),
        }
    }
}

/// Drives one capture through OCR, chart detection and market analysis.
///
/// States run Idle -> Capturing -> Segmenting -> Matching -> ChartChecking ->
/// AwaitingMarketData -> Displaying -> Idle. Triggers arriving during the
/// cooldown after a display are dropped.
pub struct Orchestrator {
    collaborators: Collaborators,
    matcher: CharacterMatcher,
    segmenter: TickerSegmenter,
    chart_detector: ChartDetector,
    config: OrchestratorConfig,
    state: PipelineState,
    cooldown: Cooldown,
    snapshot_cache: TtlCache<PriceSnapshot>,
    news_cache: TtlCache<Vec<Headline>>,
}

/// Run CPU-heavy image work off the async workers
async fn blocking<T, F>(stage: &str, f: F) -> Result<T, AnalysisError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AnalysisError::InvalidData(format!("{} worker failed: {}", stage, e)))
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, templates: Arc<TemplateStore>, config: OrchestratorConfig) -> Self {
        tracing::info!(
            "Orchestrator ready with {} glyph templates (cooldown {}ms)",
            templates.len(),
            config.cooldown.as_millis()
        );
        Self {
            collaborators,
            matcher: CharacterMatcher::new(templates, config.matcher),
            segmenter: TickerSegmenter::new(config.segmenter),
            chart_detector: ChartDetector::new(config.chart),
            cooldown: Cooldown::new(config.cooldown),
            snapshot_cache: TtlCache::new(config.cache_ttl_secs),
            news_cache: TtlCache::new(config.cache_ttl_secs),
            state: PipelineState::Idle,
            config,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    fn enter(&mut self, next: PipelineState) {
        tracing::debug!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Whether a trigger at `now` would start an analysis
    pub fn check_trigger(&self, now: Instant) -> TriggerDecision {
        if !self.state.is_idle() {
            return TriggerDecision::Busy;
        }
        self.cooldown.check(now)
    }

    /// Handle an "analyze" trigger received at `now`
    pub async fn handle_trigger(&mut self, now: Instant) -> AnalysisOutcome {
        let decision = self.check_trigger(now);
        if decision != TriggerDecision::Accepted {
            tracing::debug!("Trigger ignored: {:?}", decision);
            return AnalysisOutcome::Ignored(decision);
        }

        let started = Instant::now();
        let outcome = self.run_pipeline(now, started).await;
        self.enter(PipelineState::Idle);
        outcome
    }

    async fn run_pipeline(&mut self, now: Instant, started: Instant) -> AnalysisOutcome {
        let display = self.collaborators.display.clone();

        self.enter(PipelineState::Capturing);
        display.show_status("Capturing screen...");
        let image = match self.collaborators.capture.capture().await {
            Ok(image) => Arc::new(image),
            Err(e) => {
                tracing::warn!("Screen capture failed: {}", e);
                display.show_status("Screen capture failed");
                return AnalysisOutcome::CaptureFailed(e);
            }
        };

        self.enter(PipelineState::Segmenting);
        display.show_status("Running OCR...");
        let runs = {
            let segmenter = self.segmenter.clone();
            let image = image.clone();
            let zones = self.config.exclusion_zones.clone();
            blocking("segmentation", move || segmenter.find_runs(&image, &zones)).await
        };

        self.enter(PipelineState::Matching);
        let tickers = match runs {
            Ok(runs) => self.match_runs(runs).await,
            Err(e) => {
                tracing::warn!("{}", e);
                Vec::new()
            }
        };

        self.enter(PipelineState::ChartChecking);
        display.show_status("Detecting charts...");
        let chart = {
            let detector = self.chart_detector.clone();
            let image = image.clone();
            blocking("chart detection", move || detector.detect(&image))
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    ChartSignal::not_a_chart()
                })
        };
        let tickers = reconcile_with_chart(tickers, &chart);

        let Some(ticker) = tickers.into_iter().next() else {
            display.show_status("No ticker found");
            tracing::info!("OCR completed - no ticker found");
            return AnalysisOutcome::NoTicker { chart };
        };

        self.enter(PipelineState::AwaitingMarketData);
        tracing::info!(
            "Detected ticker: {} (min confidence {:.2})",
            ticker.symbol,
            ticker.min_confidence()
        );
        display.show_ticker(&ticker.symbol);
        display.show_status(&format!("Analyzing {}...", ticker.symbol));
        let analysis = self.analyze_symbol(&ticker.symbol, Some(&chart)).await;
        let status = analysis.status();
        let recommendation = analysis.recommendation;

        self.enter(PipelineState::Displaying);
        if let Some(price) = recommendation.price {
            display.show_ticker(&format!("{} - ${:.2}", ticker.symbol, price));
        }
        display.show_recommendation(&recommendation);
        display.show_status(&status);
        self.cooldown.mark_displayed(now + started.elapsed());
        tracing::info!("{} for {}", status, recommendation.headline());

        AnalysisOutcome::Recommended {
            ticker,
            chart,
            recommendation,
        }
    }

    async fn match_runs(&self, runs: Vec<CandidateRun>) -> Vec<TickerString> {
        if runs.is_empty() {
            return Vec::new();
        }
        let segmenter = self.segmenter.clone();
        let matcher = self.matcher.clone();
        blocking("matching", move || segmenter.read_runs(&runs, &matcher))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Vec::new()
            })
    }

    /// Market data, news and sentiment for one symbol, folded into a recommendation.
    ///
    /// Market data failures after retries give a hold with a "data
    /// unavailable" rationale; news failures count as no news. Both are
    /// reported back so the caller can tell the user.
    pub async fn analyze_symbol(&self, symbol: &str, chart: Option<&ChartSignal>) -> SymbolAnalysis {
        let (snapshot, headlines) = tokio::join!(self.fetch_snapshot(symbol), self.fetch_headlines(symbol));

        let (headlines, news_error) = match headlines {
            Ok(headlines) => (headlines, None),
            Err(e) => {
                tracing::warn!("News unavailable for {}: {}", symbol, e);
                (Vec::new(), Some(e))
            }
        };
        let sentiment: SentimentSummary =
            sentiment_analysis::summarize(self.collaborators.sentiment.as_ref(), &headlines).await;

        let (recommendation, market_error) = match snapshot {
            Ok(snapshot) => (recommend(&snapshot, &sentiment, chart), None),
            Err(e) => {
                tracing::warn!("Market data unavailable for {}: {}", symbol, e);
                let hold = Recommendation {
                    sentiment: Some(sentiment),
                    chart_detected: chart.is_some_and(|c| c.is_chart),
                    ..Recommendation::data_unavailable(symbol, &e.to_string())
                };
                (hold, Some(e))
            }
        };

        SymbolAnalysis {
            recommendation,
            market_error,
            news_error,
        }
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<PriceSnapshot, AnalysisError> {
        let cache_key = symbol.to_uppercase();
        if let Some(snapshot) = self.snapshot_cache.get(&cache_key) {
            return Ok(snapshot);
        }

        let market = &self.collaborators.market_data;
        let snapshot = self
            .config
            .retry
            .run("market data", move || market.snapshot(symbol))
            .await?;

        self.snapshot_cache.insert(cache_key, snapshot.clone());
        Ok(snapshot)
    }

    async fn fetch_headlines(&self, symbol: &str) -> Result<Vec<Headline>, AnalysisError> {
        let limit = self.config.news_limit;
        let cache_key = format!("news:{}:{}", symbol.to_uppercase(), limit);
        if let Some(headlines) = self.news_cache.get(&cache_key) {
            return Ok(headlines);
        }

        let news = &self.collaborators.news;
        let headlines = self
            .config
            .retry
            .run("news", move || news.headlines(symbol, limit))
            .await?;

        self.news_cache.insert(cache_key, headlines.clone());
        Ok(headlines)
    }
}

/// Drop tickers read from inside a confident chart region
fn reconcile_with_chart(tickers: Vec<TickerString>, chart: &ChartSignal) -> Vec<TickerString> {
    let Some(region) = chart.region.filter(|_| chart.is_chart) else {
        return tickers;
    };
    tickers
        .into_iter()
        .filter(|t| {
            let inside = t.bounds.intersects(&region);
            if inside {
                tracing::debug!("Ignoring {} inside chart region {:?}", t.symbol, region);
            }
            !inside
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, bounds: Rect) -> TickerString {
        TickerString {
            symbol: symbol.to_string(),
            confidences: vec![0.9; symbol.len()],
            bounds,
        }
    }

    #[test]
    fn test_reconcile_drops_tickers_inside_chart() {
        let chart = ChartSignal {
            is_chart: true,
            confidence: 0.9,
            region: Some(Rect::new(100, 100, 400, 300)),
            ..ChartSignal::not_a_chart()
        };
        let tickers = vec![
            ticker("AAPL", Rect::new(10, 10, 80, 40)),
            ticker("MSFT", Rect::new(150, 200, 80, 40)),
        ];
        let kept = reconcile_with_chart(tickers, &chart);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].symbol, "AAPL");
    }

    #[test]
    fn test_reconcile_keeps_all_without_chart() {
        let chart = ChartSignal {
            region: Some(Rect::new(0, 0, 1000, 1000)),
            ..ChartSignal::not_a_chart()
        };
        let tickers = vec![ticker("AAPL", Rect::new(10, 10, 80, 40))];
        assert_eq!(reconcile_with_chart(tickers, &chart).len(), 1);
    }

    fn analysis(market_error: Option<AnalysisError>, news_error: Option<AnalysisError>) -> SymbolAnalysis {
        SymbolAnalysis {
            recommendation: Recommendation::data_unavailable("AAPL", "test"),
            market_error,
            news_error,
        }
    }

    #[test]
    fn test_status_reports_collaborator_failures() {
        assert_eq!(analysis(None, None).status(), "Analysis complete");
        assert_eq!(
            analysis(Some(AnalysisError::MarketDataUnavailable("market data timed out after 5000ms".into())), None)
                .status(),
            "Market data unavailable: market data timed out after 5000ms"
        );
        assert_eq!(
            analysis(Some(AnalysisError::RateLimited("retry in 42s".into())), None).status(),
            "Rate limited: retry in 42s; try again shortly"
        );
        assert!(analysis(None, Some(AnalysisError::RateLimited("retry in 9s".into())))
            .status()
            .contains("news rate limited"));
        assert!(analysis(None, Some(AnalysisError::ApiError("HTTP 503".into())))
            .status()
            .contains("news unavailable"));
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.cooldown, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.matcher.match_threshold, 0.7);
        assert!(config.exclusion_zones.is_empty());
    }
}
