use std::env;
use std::path::PathBuf;
use std::time::Duration;

use analysis_core::Rect;
use analysis_orchestrator::{OrchestratorConfig, RetryPolicy};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use ticker_ocr::MatcherConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Capture
    pub capture_path: PathBuf,         // image re-read on every trigger
    pub template_dir: Option<PathBuf>, // <CHAR>.png glyphs, built-in font when unset
    pub exclude_regions: Vec<Rect>,    // "x,y,w,h;x,y,w,h", e.g. the overlay window

    // Pipeline
    pub cooldown_ms: u64,     // 1000
    pub match_threshold: f64, // 0.7
    pub news_limit: u32,      // 10
    pub cache_ttl_secs: i64,  // 300

    // Market data retries
    pub retry_attempts: u32,      // 3
    pub retry_base_delay_ms: u64, // 250
    pub request_timeout_ms: u64,  // 5000

    // External APIs
    pub polygon_api_key: String,
    pub polygon_base_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            capture_path: PathBuf::from(var("CAPTURE_PATH", "screen.png")),
            template_dir: lookup("TEMPLATE_DIR").filter(|s| !s.is_empty()).map(PathBuf::from),
            exclude_regions: parse_regions(&var("EXCLUDE_REGIONS", ""))
                .context("EXCLUDE_REGIONS must be x,y,w,h rectangles separated by ';'")?,

            cooldown_ms: var("COOLDOWN_MS", "1000")
                .parse()
                .context("COOLDOWN_MS must be a whole number of milliseconds")?,
            match_threshold: var("MATCH_THRESHOLD", "0.7")
                .parse()
                .context("MATCH_THRESHOLD must be a number")?,
            news_limit: var("NEWS_LIMIT", "10").parse().context("NEWS_LIMIT must be an integer")?,
            cache_ttl_secs: var("CACHE_TTL_SECS", "300")
                .parse()
                .context("CACHE_TTL_SECS must be an integer")?,

            retry_attempts: var("RETRY_ATTEMPTS", "3")
                .parse()
                .context("RETRY_ATTEMPTS must be an integer")?,
            retry_base_delay_ms: var("RETRY_BASE_DELAY_MS", "250")
                .parse()
                .context("RETRY_BASE_DELAY_MS must be an integer")?,
            request_timeout_ms: var("REQUEST_TIMEOUT_MS", "5000")
                .parse()
                .context("REQUEST_TIMEOUT_MS must be an integer")?,

            polygon_api_key: lookup("POLYGON_API_KEY").context("POLYGON_API_KEY not set")?,
            polygon_base_url: lookup("POLYGON_BASE_URL").filter(|s| !s.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polygon_api_key.trim().is_empty() {
            bail!("POLYGON_API_KEY is empty");
        }
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            bail!("MATCH_THRESHOLD must be in (0, 1], got {}", self.match_threshold);
        }
        if self.news_limit == 0 || self.news_limit > 1000 {
            bail!("NEWS_LIMIT must be between 1 and 1000, got {}", self.news_limit);
        }
        if self.retry_attempts == 0 {
            bail!("RETRY_ATTEMPTS must be at least 1");
        }
        if self.request_timeout_ms == 0 {
            bail!("REQUEST_TIMEOUT_MS must be positive");
        }
        if self.cache_ttl_secs < 0 {
            bail!("CACHE_TTL_SECS cannot be negative");
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            cooldown: Duration::from_millis(self.cooldown_ms),
            news_limit: self.news_limit,
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                attempt_timeout: Duration::from_millis(self.request_timeout_ms),
            },
            cache_ttl_secs: self.cache_ttl_secs,
            matcher: MatcherConfig {
                match_threshold: self.match_threshold,
            },
            exclusion_zones: self.exclude_regions.clone(),
            ..OrchestratorConfig::default()
        }
    }
}

fn parse_regions(raw: &str) -> Result<Vec<Rect>> {
    raw.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let values = part
                .split(',')
                .map(|v| v.trim().parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("invalid region {:?}", part))?;
            match values.as_slice() {
                [x, y, w, h] if *w > 0 && *h > 0 => Ok(Rect::new(*x, *y, *w, *h)),
                _ => bail!("region {:?} needs four values with non-zero size", part),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("POLYGON_API_KEY", "test-key")]).unwrap();
        assert_eq!(config.capture_path, PathBuf::from("screen.png"));
        assert!(config.template_dir.is_none());
        assert_eq!(config.cooldown_ms, 1000);
        assert_eq!(config.match_threshold, 0.7);
        assert_eq!(config.news_limit, 10);
        assert_eq!(config.retry_attempts, 3);
        assert!(config.exclude_regions.is_empty());

        let orch = config.orchestrator_config();
        assert_eq!(orch.cooldown, Duration::from_secs(1));
        assert_eq!(orch.retry.attempt_timeout, Duration::from_secs(5));
        assert_eq!(orch.retry.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_api_key() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("POLYGON_API_KEY"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("POLYGON_API_KEY", "k"),
            ("CAPTURE_PATH", "/tmp/cap.png"),
            ("TEMPLATE_DIR", "/opt/glyphs"),
            ("COOLDOWN_MS", "2500"),
            ("MATCH_THRESHOLD", "0.8"),
            ("RETRY_ATTEMPTS", "5"),
            ("EXCLUDE_REGIONS", "1200,0,400,120; 0,900,300,60"),
        ])
        .unwrap();
        assert_eq!(config.template_dir, Some(PathBuf::from("/opt/glyphs")));
        let orch = config.orchestrator_config();
        assert_eq!(orch.cooldown, Duration::from_millis(2500));
        assert_eq!(orch.matcher.match_threshold, 0.8);
        assert_eq!(orch.retry.max_attempts, 5);
        assert_eq!(
            orch.exclusion_zones,
            vec![Rect::new(1200, 0, 400, 120), Rect::new(0, 900, 300, 60)]
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[("POLYGON_API_KEY", "k"), ("COOLDOWN_MS", "soon")]).is_err());
        assert!(load(&[("POLYGON_API_KEY", "k"), ("MATCH_THRESHOLD", "1.5")]).is_err());
        assert!(load(&[("POLYGON_API_KEY", "k"), ("RETRY_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("POLYGON_API_KEY", "  ")]).is_err());
        assert!(load(&[("POLYGON_API_KEY", "k"), ("EXCLUDE_REGIONS", "1,2,3")]).is_err());
        assert!(load(&[("POLYGON_API_KEY", "k"), ("EXCLUDE_REGIONS", "0,0,0,10")]).is_err());
    }
}
