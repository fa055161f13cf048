//! Prometheus metrics for the relay client.
//!
//! Metrics are recorded through the `metrics` facade. Without an installed
//! recorder every call is a no-op, which is what tests rely on.
//!
//! # Example
//!
//! ```rust,no_run
//! use ticket_relay_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // Serve this from GET /metrics
//! let body = recorder.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the Prometheus recorder and renders its output.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that is not yet installed.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all relay metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the histogram buckets are rejected and
    /// [`MetricsError::Install`] if a different recorder is already installed.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = builder
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        self.handle = Some(handle);
        tracing::info!("Prometheus metrics recorder installed");
        Ok(())
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if the recorder hasn't been installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "relay_publish_attempts_total",
        "Total number of send attempts made on a live channel"
    );
    describe_counter!(
        "relay_messages_published_total",
        "Total number of messages accepted by the broker"
    );
    describe_counter!(
        "relay_publish_failures_total",
        "Total number of publish calls that failed, by reason"
    );
    describe_histogram!(
        "relay_publish_duration_seconds",
        "Time from publish call to broker acceptance, including retries"
    );
    describe_counter!(
        "relay_reconnect_attempts_total",
        "Total number of reconnect attempts made by the supervisor"
    );
    describe_counter!(
        "relay_connection_drops_total",
        "Total number of out-of-band connection closures"
    );
    describe_gauge!(
        "relay_connected",
        "Whether the client holds a live broker connection (0 or 1)"
    );
}

/// Relay client metrics recorder.
pub struct RelayMetrics;

impl RelayMetrics {
    /// Record a send attempt on a live channel.
    pub fn record_publish_attempt() {
        counter!("relay_publish_attempts_total").increment(1);
    }

    /// Record a successful publish.
    pub fn record_published(duration: Duration) {
        counter!("relay_messages_published_total").increment(1);
        histogram!("relay_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed publish call.
    pub fn record_publish_failure(reason: &'static str) {
        counter!("relay_publish_failures_total", "reason" => reason).increment(1);
    }

    /// Record a supervisor reconnect attempt.
    pub fn record_reconnect_attempt() {
        counter!("relay_reconnect_attempts_total").increment(1);
    }

    /// Record an out-of-band connection closure.
    pub fn record_drop() {
        counter!("relay_connection_drops_total").increment(1);
    }

    /// Update the connection gauge.
    pub fn set_connected(connected: bool) {
        gauge!("relay_connected").set(if connected { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_before_install_is_none() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.render().is_none());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        RelayMetrics::record_publish_attempt();
        RelayMetrics::record_published(Duration::from_millis(5));
        RelayMetrics::record_publish_failure("exhausted");
        RelayMetrics::set_connected(true);
    }
}
