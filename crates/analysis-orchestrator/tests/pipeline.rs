use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_core::{
    Action, AnalysisError, Headline, MarketDataProvider, NewsProvider, PriceSnapshot, Recommendation, Rect,
};
use analysis_orchestrator::{
    AnalysisOutcome, Collaborators, Orchestrator, OrchestratorConfig, PipelineState, RecommendationDisplay,
    RetryPolicy, ScreenCapture, TriggerDecision,
};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};
use sentiment_analysis::KeywordSentimentScorer;
use ticker_ocr::font::draw_text;
use ticker_ocr::TemplateStore;
use tokio::time::Instant;

const PAPER: u8 = 245;
const INK: u8 = 20;

struct StaticCapture(DynamicImage);

#[async_trait]
impl ScreenCapture for StaticCapture {
    async fn capture(&self) -> Result<DynamicImage, AnalysisError> {
        Ok(self.0.clone())
    }
}

struct BrokenCapture;

#[async_trait]
impl ScreenCapture for BrokenCapture {
    async fn capture(&self) -> Result<DynamicImage, AnalysisError> {
        Err(AnalysisError::Capture("display not available".to_string()))
    }
}

#[derive(Default)]
struct RecordingDisplay {
    events: Mutex<Vec<String>>,
}

impl RecordingDisplay {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl RecommendationDisplay for RecordingDisplay {
    fn show_status(&self, status: &str) {
        self.events.lock().unwrap().push(format!("status:{}", status));
    }

    fn show_ticker(&self, ticker: &str) {
        self.events.lock().unwrap().push(format!("ticker:{}", ticker));
    }

    fn show_recommendation(&self, recommendation: &Recommendation) {
        self.events.lock().unwrap().push(format!("rec:{}", recommendation.headline()));
    }
}

struct FixedMarket {
    trend_pct: f64,
    calls: AtomicU32,
}

impl FixedMarket {
    fn new(trend_pct: f64) -> Self {
        Self {
            trend_pct,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MarketDataProvider for FixedMarket {
    async fn snapshot(&self, symbol: &str) -> Result<PriceSnapshot, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PriceSnapshot {
            symbol: symbol.to_string(),
            price: 190.0,
            previous_close: 188.0,
            price_change_pct: 1.06,
            trend_pct: self.trend_pct,
            volume: 1_000_000.0,
            volume_trend_pct: 5.0,
        })
    }
}

struct HangingMarket;

#[async_trait]
impl MarketDataProvider for HangingMarket {
    async fn snapshot(&self, _symbol: &str) -> Result<PriceSnapshot, AnalysisError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(AnalysisError::MarketDataUnavailable("unreachable".to_string()))
    }
}

struct ThrottledMarket {
    calls: AtomicU32,
}

#[async_trait]
impl MarketDataProvider for ThrottledMarket {
    async fn snapshot(&self, _symbol: &str) -> Result<PriceSnapshot, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AnalysisError::RateLimited("Polygon request budget exhausted, retry in 41s".to_string()))
    }
}

struct StaticNews(Vec<&'static str>);

#[async_trait]
impl NewsProvider for StaticNews {
    async fn headlines(&self, _symbol: &str, limit: u32) -> Result<Vec<Headline>, AnalysisError> {
        Ok(self.0.iter().take(limit as usize).map(|t| Headline::new(*t)).collect())
    }
}

struct DownNews;

#[async_trait]
impl NewsProvider for DownNews {
    async fn headlines(&self, _symbol: &str, _limit: u32) -> Result<Vec<Headline>, AnalysisError> {
        Err(AnalysisError::ApiError("HTTP 503".to_string()))
    }
}

fn canvas() -> GrayImage {
    GrayImage::from_pixel(800, 600, Luma([PAPER]))
}

fn ticker_capture(text: &str) -> DynamicImage {
    let mut img = canvas();
    draw_text(&mut img, 60, 80, text, 6, INK);
    DynamicImage::ImageLuma8(img)
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(50),
        },
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(
    capture: Arc<dyn ScreenCapture>,
    market: Arc<dyn MarketDataProvider>,
    news: Arc<dyn NewsProvider>,
) -> (Orchestrator, Arc<RecordingDisplay>) {
    let display = Arc::new(RecordingDisplay::default());
    let collaborators = Collaborators {
        capture,
        display: display.clone(),
        market_data: market,
        news,
        sentiment: Arc::new(KeywordSentimentScorer::new()),
    };
    let orchestrator = Orchestrator::new(collaborators, Arc::new(TemplateStore::builtin().unwrap()), fast_config());
    (orchestrator, display)
}

fn bullish_news() -> Arc<StaticNews> {
    Arc::new(StaticNews(vec![
        "Apple beats estimates as iPhone sales surge",
        "Analysts upgrade Apple on strong services growth",
    ]))
}

#[tokio::test]
async fn test_full_pipeline_recommends_buy() {
    let market = Arc::new(FixedMarket::new(4.0));
    let (mut orch, display) = orchestrator(
        Arc::new(StaticCapture(ticker_capture("AAPL"))),
        market.clone(),
        bullish_news(),
    );

    let outcome = orch.handle_trigger(Instant::now()).await;
    let AnalysisOutcome::Recommended { ticker, chart, recommendation } = outcome else {
        panic!("expected a recommendation, got {:?}", outcome);
    };

    assert_eq!(ticker.symbol, "AAPL");
    assert!(ticker.confidences.iter().all(|c| *c >= 0.7));
    assert!(!chart.is_chart);
    assert_eq!(recommendation.symbol, "AAPL");
    assert_eq!(recommendation.action, Action::Buy);
    assert!(recommendation.confidence > 0.5 && recommendation.confidence <= 1.0);
    assert_eq!(recommendation.price, Some(190.0));
    assert_eq!(orch.state(), PipelineState::Idle);
    assert!(orch.cooldown().last_displayed().is_some());

    assert_eq!(
        display.events(),
        vec![
            "status:Capturing screen...".to_string(),
            "status:Running OCR...".to_string(),
            "status:Detecting charts...".to_string(),
            "ticker:AAPL".to_string(),
            "status:Analyzing AAPL...".to_string(),
            "ticker:AAPL - $190.00".to_string(),
            format!("rec:{}", recommendation.headline()),
            "status:Analysis complete".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_market_data_timeout_yields_hold() {
    let (mut orch, display) = orchestrator(
        Arc::new(StaticCapture(ticker_capture("TSLA"))),
        Arc::new(HangingMarket),
        bullish_news(),
    );

    let outcome = orch.handle_trigger(Instant::now()).await;
    let AnalysisOutcome::Recommended { recommendation, .. } = outcome else {
        panic!("expected a recommendation, got {:?}", outcome);
    };

    assert_eq!(recommendation.symbol, "TSLA");
    assert_eq!(recommendation.action, Action::Hold);
    assert_eq!(recommendation.confidence, 0.5);
    assert!(recommendation.rationale.contains("data unavailable"));
    assert!(recommendation.price.is_none());

    let events = display.events();
    let last = events.last().cloned().unwrap_or_default();
    assert!(last.starts_with("status:Market data unavailable:"), "last event {:?}", last);
    assert!(last.contains("timed out"));
    assert!(!events.contains(&"status:Analysis complete".to_string()));
    assert_eq!(orch.state(), PipelineState::Idle);
}

#[tokio::test]
async fn test_rate_limited_market_data_is_reported() {
    let market = Arc::new(ThrottledMarket {
        calls: AtomicU32::new(0),
    });
    let (mut orch, display) = orchestrator(
        Arc::new(StaticCapture(ticker_capture("AAPL"))),
        market.clone(),
        bullish_news(),
    );

    let started = std::time::Instant::now();
    let outcome = orch.handle_trigger(Instant::now()).await;
    let AnalysisOutcome::Recommended { recommendation, .. } = outcome else {
        panic!("expected a recommendation, got {:?}", outcome);
    };

    assert_eq!(recommendation.action, Action::Hold);
    assert!(recommendation.rationale.contains("data unavailable"));
    assert_eq!(market.calls.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() < Duration::from_secs(2));

    let last = display.events().last().cloned().unwrap_or_default();
    assert!(last.starts_with("status:Rate limited:"), "last event {:?}", last);
    assert!(last.contains("retry in 41s"));
}

#[tokio::test]
async fn test_cooldown_drops_early_triggers_and_cache_serves_repeats() {
    let market = Arc::new(FixedMarket::new(-3.0));
    let (mut orch, _display) = orchestrator(
        Arc::new(StaticCapture(ticker_capture("INTC"))),
        market.clone(),
        Arc::new(StaticNews(vec![])),
    );

    let t0 = Instant::now();
    assert!(matches!(orch.handle_trigger(t0).await, AnalysisOutcome::Recommended { .. }));

    let early = orch.handle_trigger(t0 + Duration::from_millis(300)).await;
    assert!(matches!(
        early,
        AnalysisOutcome::Ignored(TriggerDecision::CoolingDown { .. })
    ));

    let later = orch.handle_trigger(t0 + Duration::from_secs(3)).await;
    let AnalysisOutcome::Recommended { recommendation, .. } = later else {
        panic!("expected a recommendation, got {:?}", later);
    };
    assert_eq!(recommendation.action, Action::Sell);
    assert_eq!(market.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blank_screen_reports_no_ticker() {
    let blank = DynamicImage::ImageLuma8(canvas());
    let (mut orch, display) = orchestrator(
        Arc::new(StaticCapture(blank)),
        Arc::new(FixedMarket::new(0.0)),
        bullish_news(),
    );

    let outcome = orch.handle_trigger(Instant::now()).await;
    assert!(matches!(outcome, AnalysisOutcome::NoTicker { .. }));
    assert_eq!(display.events().last().map(String::as_str), Some("status:No ticker found"));
    assert!(orch.cooldown().last_displayed().is_none());
    assert_eq!(orch.state(), PipelineState::Idle);
}

#[tokio::test]
async fn test_capture_failure_returns_to_idle() {
    let (mut orch, display) = orchestrator(
        Arc::new(BrokenCapture),
        Arc::new(FixedMarket::new(0.0)),
        bullish_news(),
    );

    let outcome = orch.handle_trigger(Instant::now()).await;
    assert!(matches!(outcome, AnalysisOutcome::CaptureFailed(AnalysisError::Capture(_))));
    assert!(display.events().contains(&"status:Screen capture failed".to_string()));
    assert_eq!(orch.state(), PipelineState::Idle);
}

#[tokio::test]
async fn test_news_outage_counts_as_no_news() {
    let (mut orch, display) = orchestrator(
        Arc::new(StaticCapture(ticker_capture("AMZN"))),
        Arc::new(FixedMarket::new(5.0)),
        Arc::new(DownNews),
    );

    let outcome = orch.handle_trigger(Instant::now()).await;
    let AnalysisOutcome::Recommended { recommendation, .. } = outcome else {
        panic!("expected a recommendation, got {:?}", outcome);
    };
    let sentiment = recommendation.sentiment.unwrap();
    assert_eq!(sentiment.headline_count, 0);
    assert_eq!(
        display.events().last().map(String::as_str),
        Some("status:Analysis complete (news unavailable, sentiment neutral)")
    );
    assert_eq!(recommendation.action, Action::Buy);
    assert!((recommendation.confidence - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_text_inside_chart_is_not_a_ticker() {
    let mut img = canvas();
    for y in [100, 170, 240, 310, 380, 450] {
        for yy in y..y + 3 {
            for x in 200..600 {
                img.put_pixel(x, yy, Luma([INK]));
            }
        }
    }
    // Axis label between two price levels, and a ticker below the chart
    draw_text(&mut img, 300, 190, "NVDA", 6, INK);
    draw_text(&mut img, 20, 520, "AMD", 5, INK);

    let (mut orch, _display) = orchestrator(
        Arc::new(StaticCapture(DynamicImage::ImageLuma8(img))),
        Arc::new(FixedMarket::new(0.0)),
        Arc::new(StaticNews(vec![])),
    );

    let outcome = orch.handle_trigger(Instant::now()).await;
    let AnalysisOutcome::Recommended { ticker, chart, recommendation } = outcome else {
        panic!("expected a recommendation, got {:?}", outcome);
    };
    assert!(chart.is_chart);
    assert_eq!(ticker.symbol, "AMD");
    assert!(recommendation.chart_detected);
    assert!(recommendation.rationale.contains("chart pattern"));
}

#[tokio::test]
async fn test_exclusion_zone_hides_overlay_text() {
    let mut img = canvas();
    // Overlay still showing the previous result, above a fresh ticker
    draw_text(&mut img, 60, 40, "AAPL", 6, INK);
    draw_text(&mut img, 60, 300, "MSFT", 6, INK);

    let display = Arc::new(RecordingDisplay::default());
    let collaborators = Collaborators {
        capture: Arc::new(StaticCapture(DynamicImage::ImageLuma8(img))),
        display: display.clone(),
        market_data: Arc::new(FixedMarket::new(0.0)),
        news: Arc::new(StaticNews(vec![])),
        sentiment: Arc::new(KeywordSentimentScorer::new()),
    };
    let config = OrchestratorConfig {
        exclusion_zones: vec![Rect::new(0, 0, 400, 120)],
        ..fast_config()
    };
    let mut orch = Orchestrator::new(collaborators, Arc::new(TemplateStore::builtin().unwrap()), config);

    let outcome = orch.handle_trigger(Instant::now()).await;
    let AnalysisOutcome::Recommended { ticker, .. } = outcome else {
        panic!("expected a recommendation, got {:?}", outcome);
    };
    assert_eq!(ticker.symbol, "MSFT");
    assert!(display.events().contains(&"ticker:MSFT".to_string()));
}
