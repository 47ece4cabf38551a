use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Where the pipeline is within one trigger's run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Capturing,
    Segmenting,
    Matching,
    ChartChecking,
    AwaitingMarketData,
    Displaying,
}

impl PipelineState {
    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }
}

/// Verdict on an incoming "analyze" trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    Accepted,
    /// Inside the cooldown window; dropped, not queued
    CoolingDown { remaining: Duration },
    /// An analysis is already in progress
    Busy,
}

/// Minimum spacing between the last display and the next capture.
///
/// The caller supplies the clock so the window is testable without sleeping.
#[derive(Debug, Clone)]
pub struct Cooldown {
    window: Duration,
    last_displayed: Option<Instant>,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_displayed: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_displayed(&self) -> Option<Instant> {
        self.last_displayed
    }

    pub fn check(&self, now: Instant) -> TriggerDecision {
        match self.last_displayed {
            Some(shown) => {
                let elapsed = now.saturating_duration_since(shown);
                if elapsed < self.window {
                    TriggerDecision::CoolingDown {
                        remaining: self.window - elapsed,
                    }
                } else {
                    TriggerDecision::Accepted
                }
            }
            None => TriggerDecision::Accepted,
        }
    }

    pub fn mark_displayed(&mut self, at: Instant) {
        self.last_displayed = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_trigger_accepted() {
        let cooldown = Cooldown::new(Duration::from_secs(1));
        assert_eq!(cooldown.check(Instant::now()), TriggerDecision::Accepted);
    }

    #[test]
    fn test_trigger_inside_window_ignored() {
        let mut cooldown = Cooldown::new(Duration::from_secs(1));
        let t0 = Instant::now();
        cooldown.mark_displayed(t0);

        assert_eq!(
            cooldown.check(t0 + Duration::from_millis(400)),
            TriggerDecision::CoolingDown {
                remaining: Duration::from_millis(600)
            }
        );
        assert_eq!(cooldown.check(t0 + Duration::from_secs(1)), TriggerDecision::Accepted);
        assert_eq!(cooldown.check(t0 + Duration::from_millis(2500)), TriggerDecision::Accepted);
    }

    #[test]
    fn test_clock_behind_last_display_is_still_cooling() {
        let mut cooldown = Cooldown::new(Duration::from_secs(1));
        let t0 = Instant::now() + Duration::from_secs(5);
        cooldown.mark_displayed(t0);
        let earlier = t0 - Duration::from_secs(2);
        assert!(matches!(cooldown.check(earlier), TriggerDecision::CoolingDown { .. }));
    }

    #[test]
    fn test_zero_window_never_blocks() {
        let mut cooldown = Cooldown::new(Duration::ZERO);
        let t0 = Instant::now();
        cooldown.mark_displayed(t0);
        assert_eq!(cooldown.check(t0), TriggerDecision::Accepted);
    }
}
