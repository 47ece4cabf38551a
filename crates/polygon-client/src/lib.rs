use analysis_core::{AnalysisError, Bar, Headline, MarketDataProvider, NewsProvider, PriceSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Calendar days requested so that at least five trading days come back
const SNAPSHOT_LOOKBACK_DAYS: i64 = 10;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Claim a slot in the current window, or fail at once with the wait
    /// until the oldest request leaves it. Callers own any retry.
    async fn try_acquire(&self) -> Result<(), AnalysisError> {
        let mut ts = self.timestamps.lock().await;
        let now = Instant::now();

        while let Some(&front) = ts.front() {
            if now.duration_since(front) >= self.window {
                ts.pop_front();
            } else {
                break;
            }
        }

        if ts.len() < self.max_requests {
            ts.push_back(now);
            return Ok(());
        }

        let retry_after = ts
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
            .unwrap_or(self.window);
        tracing::debug!(
            "Rate limiter: {} requests in window, next slot in {:.1}s",
            ts.len(),
            retry_after.as_secs_f64()
        );
        Err(AnalysisError::RateLimited(format!(
            "Polygon request budget exhausted, retry in {:.0}s",
            retry_after.as_secs_f64().ceil()
        )))
    }
}

/// Polygon.io REST client for daily bars and ticker news.
///
/// Makes one attempt per call; retry policy belongs to the caller.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Free tier allows 5 requests per minute; paid plans should raise POLYGON_RATE_LIMIT
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    /// Point the client at another host (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.rate_limiter = RateLimiter::new(max_requests, window);
        self
    }

    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, AnalysisError> {
        self.rate_limiter.try_acquire().await?;
        let response = builder
            .send()
            .await
            .map_err(|e| AnalysisError::MarketDataUnavailable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!("Polygon 429 rate limited");
                Err(AnalysisError::RateLimited("Rate limited by Polygon".to_string()))
            }
            status => Err(AnalysisError::ApiError(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }

    /// Get aggregates (bars) for a symbol, oldest first
    pub async fn get_aggregates(
        &self,
        symbol: &str,
        multiplier: u32,
        timespan: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            symbol,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
            ]))
            .await?;

        let agg_response: AggregateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        Ok(agg_response.into_bars())
    }

    /// Get news headlines for a ticker, newest first
    pub async fn get_news(&self, symbol: &str, limit: u32) -> Result<Vec<Headline>, AnalysisError> {
        let url = format!("{}/v2/reference/news", self.base_url);

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.clone()),
                ("ticker", symbol.to_string()),
                ("limit", limit.to_string()),
                ("order", "desc".to_string()),
            ]))
            .await?;

        let news_response: NewsResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        Ok(news_response.into_headlines())
    }
}

#[async_trait]
impl MarketDataProvider for PolygonClient {
    async fn snapshot(&self, symbol: &str) -> Result<PriceSnapshot, AnalysisError> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(SNAPSHOT_LOOKBACK_DAYS);
        let bars = self.get_aggregates(symbol, 1, "day", from, to).await?;
        tracing::debug!("Fetched {} daily bars for {}", bars.len(), symbol);
        PriceSnapshot::from_bars(symbol, &bars)
    }
}

#[async_trait]
impl NewsProvider for PolygonClient {
    async fn headlines(&self, symbol: &str, limit: u32) -> Result<Vec<Headline>, AnalysisError> {
        self.get_news(symbol, limit).await
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
}

impl AggregateResponse {
    fn into_bars(self) -> Vec<Bar> {
        let mut bars: Vec<Bar> = self
            .results
            .into_iter()
            .filter_map(|r| {
                Some(Bar {
                    timestamp: DateTime::from_timestamp_millis(r.t)?,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect();
        bars.sort_by_key(|b| b.timestamp);
        bars
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    title: String,
    description: Option<String>,
    published_utc: Option<String>,
}

impl NewsResponse {
    fn into_headlines(self) -> Vec<Headline> {
        self.results
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .map(|r| Headline {
                title: r.title,
                description: r.description,
                published_utc: r
                    .published_utc
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            })
            .collect()
    }
}
