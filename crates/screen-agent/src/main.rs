use std::sync::Arc;

use analysis_orchestrator::{AnalysisOutcome, Collaborators, Orchestrator, TriggerDecision};
use anyhow::{Context, Result};
use polygon_client::PolygonClient;
use sentiment_analysis::KeywordSentimentScorer;
use ticker_ocr::{TemplateStore, DEFAULT_TEMPLATE_HEIGHT, DEFAULT_TEMPLATE_WIDTH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::SignalKind;
use tokio::sync::mpsc;
use tokio::time::Instant;

mod config;
mod console;

use config::AppConfig;
use console::{ConsoleDisplay, FileCapture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Analyze,
    Quit,
}

/// Empty line or "analyze" triggers a run; "quit", "exit" or "esc" stops
fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "a" | "analyze" => Some(Command::Analyze),
        "q" | "quit" | "exit" | "esc" => Some(Command::Quit),
        _ => None,
    }
}

fn load_templates(config: &AppConfig) -> Result<TemplateStore> {
    match &config.template_dir {
        Some(dir) => TemplateStore::from_dir(dir, DEFAULT_TEMPLATE_WIDTH, DEFAULT_TEMPLATE_HEIGHT)
            .with_context(|| format!("Failed to load glyph templates from {}", dir.display())),
        None => TemplateStore::builtin().context("Failed to build built-in glyph templates"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    tracing::info!("Starting screen ticker agent");

    // 2. Configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Capture file: {}", config.capture_path.display());
    tracing::info!("  Cooldown: {}ms", config.cooldown_ms);
    tracing::info!("  Match threshold: {:.2}", config.match_threshold);
    tracing::info!("  Excluded regions: {}", config.exclude_regions.len());
    tracing::info!(
        "  Market data: {} attempts, {}ms timeout each",
        config.retry_attempts,
        config.request_timeout_ms
    );

    // 3. Glyph templates
    let templates = Arc::new(load_templates(&config)?);
    tracing::info!("Loaded {} glyph templates", templates.len());

    // 4. Collaborators
    let mut polygon = PolygonClient::new(config.polygon_api_key.clone());
    if let Some(base_url) = &config.polygon_base_url {
        polygon = polygon.with_base_url(base_url.clone());
    }
    let polygon = Arc::new(polygon);

    let collaborators = Collaborators {
        capture: Arc::new(FileCapture::new(config.capture_path.clone())),
        display: Arc::new(ConsoleDisplay),
        market_data: polygon.clone(),
        news: polygon,
        sentiment: Arc::new(KeywordSentimentScorer::new()),
    };
    let mut orchestrator = Orchestrator::new(collaborators, templates, config.orchestrator_config());

    // 5. Trigger source: one line on stdin per "analyze" press
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<Command>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(command) => {
                        if trigger_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    None => tracing::warn!("Unknown command: {:?} (Enter to analyze, 'quit' to exit)", line),
                },
                Ok(None) => {
                    trigger_tx.send(Command::Quit).await.ok();
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    trigger_tx.send(Command::Quit).await.ok();
                    break;
                }
            }
        }
    });

    println!("Press Enter to analyze the current screen, type 'quit' to exit.");

    // 6. Main loop with graceful shutdown (SIGINT + SIGTERM)
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            command = trigger_rx.recv() => {
                match command {
                    Some(Command::Analyze) => {
                        run_trigger(&mut orchestrator).await;

                        // Presses made while the analysis ran are dropped, not queued
                        let mut dropped = 0;
                        while let Ok(command) = trigger_rx.try_recv() {
                            if command == Command::Quit {
                                tracing::info!("Quit requested");
                                return Ok(());
                            }
                            dropped += 1;
                        }
                        if dropped > 0 {
                            tracing::debug!("Dropped {} triggers received while busy", dropped);
                        }
                    }
                    Some(Command::Quit) | None => {
                        tracing::info!("Quit requested");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                break;
            }
        }
    }

    tracing::info!("Screen agent shut down.");
    Ok(())
}

async fn run_trigger(orchestrator: &mut Orchestrator) {
    match orchestrator.handle_trigger(Instant::now()).await {
        AnalysisOutcome::Ignored(TriggerDecision::CoolingDown { remaining }) => {
            tracing::info!("Cooling down, trigger ignored ({}ms left)", remaining.as_millis());
        }
        AnalysisOutcome::Ignored(decision) => {
            tracing::debug!("Trigger ignored: {:?}", decision);
        }
        AnalysisOutcome::CaptureFailed(e) => {
            tracing::error!("Capture failed: {}", e);
        }
        AnalysisOutcome::NoTicker { chart } => {
            if chart.is_chart {
                tracing::info!(
                    "Chart on screen ({:.0}% confidence) but no ticker",
                    chart.confidence * 100.0
                );
            }
        }
        AnalysisOutcome::Recommended { recommendation, .. } => {
            tracing::debug!("Displayed {}", recommendation.headline());
        }
    }
}
