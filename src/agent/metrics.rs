//! Request metrics for model adapters
//!
//! Every completion request is tracked by a [`RequestMetrics`] guard,
//! labelled by backend name.
//!
//! # Metrics
//!
//! - `chatllm_requests_total`: Counter of completion requests
//! - `chatllm_request_duration_seconds`: Histogram of request duration by status
//! - `chatllm_history_turns`: Histogram of turns sent after truncation
//! - `chatllm_prompt_tokens`: Histogram of backend-reported prompt tokens
//! - `chatllm_errors_total`: Counter of failed requests by error type
//! - `chatllm_active_requests`: Gauge of in-flight requests
//!
//! # Examples
//!
//! ```
//! use chatllm::agent::metrics::RequestMetrics;
//!
//! let metrics = RequestMetrics::new("chatgpt");
//! metrics.record_completion(4, Some(120));
//! ```

use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metrics guard for a single completion request
///
/// Records exactly once: the first of `record_completion` or
/// `record_error` wins. Dropping an unrecorded guard (a cancelled request)
/// still releases the active gauge.
#[derive(Debug)]
pub struct RequestMetrics {
    model: String,
    start: Instant,
    recorded: AtomicBool,
}

impl RequestMetrics {
    /// Starts tracking a request to `model`
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::agent::metrics::RequestMetrics;
    ///
    /// let metrics = RequestMetrics::new("kimi");
    /// assert_eq!(metrics.model(), "kimi");
    /// ```
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        increment_counter!("chatllm_requests_total", "model" => model.clone());
        increment_gauge!("chatllm_active_requests", 1.0, "model" => model.clone());

        Self {
            model,
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    /// Records a successful completion
    ///
    /// # Arguments
    ///
    /// * `turns_sent` - Turns in the truncated request
    /// * `prompt_tokens` - Prompt tokens reported by the backend, if any
    pub fn record_completion(&self, turns_sent: usize, prompt_tokens: Option<usize>) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "chatllm_request_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "model" => self.model.clone(),
            "status" => "success"
        );

        histogram!(
            "chatllm_history_turns",
            turns_sent as f64,
            "model" => self.model.clone()
        );

        if let Some(tokens) = prompt_tokens {
            histogram!(
                "chatllm_prompt_tokens",
                tokens as f64,
                "model" => self.model.clone()
            );
        }

        decrement_gauge!("chatllm_active_requests", 1.0, "model" => self.model.clone());
    }

    /// Records a failed request
    ///
    /// # Arguments
    ///
    /// * `error_type` - Short error label, e.g. "backend_unavailable"
    pub fn record_error(&self, error_type: &str) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "chatllm_request_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "model" => self.model.clone(),
            "status" => "error"
        );

        increment_counter!(
            "chatllm_errors_total",
            "model" => self.model.clone(),
            "error_type" => error_type.to_string()
        );

        decrement_gauge!("chatllm_active_requests", 1.0, "model" => self.model.clone());
    }

    /// Backend name the request was sent to
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Time since the request started
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Whether an outcome has been recorded
    pub fn is_recorded(&self) -> bool {
        self.recorded.load(Ordering::SeqCst)
    }
}

impl Drop for RequestMetrics {
    fn drop(&mut self) {
        if !self.recorded.load(Ordering::SeqCst) {
            decrement_gauge!("chatllm_active_requests", 1.0, "model" => self.model.clone());
        }
    }
}

/// Initializes the metrics exporter for Prometheus
///
/// Only has an effect when compiled with the `prometheus` feature; it is
/// safe to call either way.
///
/// # Examples
///
/// ```
/// use chatllm::agent::metrics::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
