//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized `srcent_` naming.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Srcent metrics
pub const METRICS_PREFIX: &str = "srcent";

/// Buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for language model latency (much slower)
pub const LLM_BUCKETS: &[f64] = &[
    0.5,
    1.0,
    2.5,
    5.0,
    10.0,
    20.0,
    40.0,
    60.0,
    120.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Digest metrics
    describe_counter!(
        format!("{}_digest_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Daily digest runs by outcome"
    );

    describe_counter!(
        format!("{}_digest_emails_total", METRICS_PREFIX),
        Unit::Count,
        "Digest emails by kind and delivery status"
    );

    // Subscription metrics
    describe_counter!(
        format!("{}_subscription_actions_total", METRICS_PREFIX),
        Unit::Count,
        "Subscribe and unsubscribe actions by outcome"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_ingestion_tasks_total", METRICS_PREFIX),
        Unit::Count,
        "Ingestion tasks by kind and outcome"
    );

    // Language model metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model completion latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record the outcome of one digest run (`sent`, `skipped`, `error`)
pub fn record_digest_run(outcome: &str) {
    counter!(
        format!("{}_digest_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record delivered and failed emails of one kind (`daily`, `welcome`)
pub fn record_digest_emails(kind: &str, sent: usize, failed: usize) {
    counter!(
        format!("{}_digest_emails_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "status" => "sent"
    )
    .increment(sent as u64);

    counter!(
        format!("{}_digest_emails_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "status" => "failed"
    )
    .increment(failed as u64);
}

/// Record a subscription action (`subscribe`, `resubscribe`, `unsubscribe`)
pub fn record_subscription(action: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_subscription_actions_total", METRICS_PREFIX),
        "action" => action.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record one ingestion task (`product`, `deep_dive`, `category`)
pub fn record_ingestion_task(kind: &str, outcome: &str) {
    counter!(
        format!("{}_ingestion_tasks_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Helper to record language model metrics
pub fn record_llm(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, LLM_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recording_without_recorder() {
        let metrics = RequestMetrics::start("POST", "/api/subscribe");
        metrics.finish(200);
        record_digest_emails("daily", 3, 1);
        record_llm(1.2, "qwen-max", true);
    }
}
