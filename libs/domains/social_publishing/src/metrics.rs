//! Publishing metrics.
//!
//! Recorded through the `metrics` facade; the host process decides where they
//! go (the publisher app installs a Prometheus recorder).

use metrics::{counter, histogram};
use std::time::Duration;

/// Result of one provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    /// Provider not configured or nothing to publish
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        }
    }
}

/// Record a finished provider attempt
pub fn record_attempt(provider: &'static str, outcome: Outcome, duration: Duration) {
    counter!(
        "social_publish_attempts_total",
        "provider" => provider,
        "outcome" => outcome.as_str()
    )
    .increment(1);

    histogram!(
        "social_publish_duration_seconds",
        "provider" => provider
    )
    .record(duration.as_secs_f64());
}

/// Record an event dropped by the dedup lock
pub fn record_dedup_skip() {
    counter!("social_publish_dedup_skipped_total").increment(1);
}
