//! Application state for Axum handlers.

use std::sync::Arc;
use ticket_relay_runtime::RelayClient;
use ticket_relay_runtime::metrics::MetricsRecorder;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Publishing client shared by every request
    pub client: Arc<RelayClient>,
    /// Queue that receives submitted tickets
    pub queue_name: Arc<str>,
    /// Installed Prometheus recorder, if metrics are enabled
    pub metrics: Option<Arc<MetricsRecorder>>,
}

impl AppState {
    /// Create state for `client`, publishing to `queue_name`.
    #[must_use]
    pub fn new(client: Arc<RelayClient>, queue_name: impl Into<Arc<str>>) -> Self {
        Self {
            client,
            queue_name: queue_name.into(),
            metrics: None,
        }
    }

    /// Attach an installed metrics recorder.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires Clone state
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
