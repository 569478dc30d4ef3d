//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub transfers_built: IntCounter,
    pub transfers_failed: IntCounterVec,
    pub signer_outcomes: IntCounterVec,
    pub broadcasts: IntCounterVec,
    pub balance_degraded: IntCounter,
    pub classified_outcomes: IntCounterVec,
    pub http_requests: IntCounterVec,

    // Gauges
    pub sends_in_flight: IntGauge,

    // Histograms
    pub build_latency: Histogram,
    pub signing_latency: Histogram,
    pub confirm_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let transfers_built = IntCounter::with_opts(Opts::new(
            "transfers_built_total",
            "Unsigned transfer transactions built",
        ))?;

        let transfers_failed = IntCounterVec::new(
            Opts::new("transfers_failed_total", "Send attempts that ended in an error"),
            &["category"],
        )?;

        let signer_outcomes = IntCounterVec::new(
            Opts::new("signer_outcomes_total", "Custodial signer responses by status"),
            &["status"],
        )?;

        let broadcasts = IntCounterVec::new(
            Opts::new("broadcasts_total", "Broadcast attempts by result"),
            &["result"],
        )?;

        let balance_degraded = IntCounter::with_opts(Opts::new(
            "balance_refresh_degraded_total",
            "Balance refreshes that fell back to zero",
        ))?;

        let classified_outcomes = IntCounterVec::new(
            Opts::new("classified_outcomes_total", "Failures by classified outcome"),
            &["kind"],
        )?;

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )?;

        let sends_in_flight = IntGauge::with_opts(Opts::new(
            "sends_in_flight",
            "Send flows currently between resolve and receipt",
        ))?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Transfer build latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        )?;

        let signing_latency = Histogram::with_opts(
            HistogramOpts::new(
                "signing_latency_seconds",
                "Time from signer request to user decision",
            )
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;

        let confirm_latency = Histogram::with_opts(
            HistogramOpts::new("confirm_latency_seconds", "Time from submit to confirmed")
                .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(transfers_built.clone()))?;
        registry.register(Box::new(transfers_failed.clone()))?;
        registry.register(Box::new(signer_outcomes.clone()))?;
        registry.register(Box::new(broadcasts.clone()))?;
        registry.register(Box::new(balance_degraded.clone()))?;
        registry.register(Box::new(classified_outcomes.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(sends_in_flight.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(signing_latency.clone()))?;
        registry.register(Box::new(confirm_latency.clone()))?;

        Ok(Self {
            registry,
            transfers_built,
            transfers_failed,
            signer_outcomes,
            broadcasts,
            balance_degraded,
            classified_outcomes,
            http_requests,
            sends_in_flight,
            build_latency,
            signing_latency,
            confirm_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_signer_outcome(&self, status: &str) {
        self.signer_outcomes.with_label_values(&[status]).inc();
    }

    /// `result` is one of confirmed, rejected, timeout, resubmit_skipped
    pub fn record_broadcast(&self, result: &str) {
        self.broadcasts.with_label_values(&[result]).inc();
    }

    pub fn record_failure(&self, category: &str) {
        self.transfers_failed.with_label_values(&[category]).inc();
    }

    pub fn record_outcome(&self, kind: &str) {
        self.classified_outcomes.with_label_values(&[kind]).inc();
    }

    pub fn record_http(&self, route: &str, status: u16) {
        self.http_requests
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_families() {
        let metrics = Metrics::new().unwrap();
        metrics.transfers_built.inc();
        metrics.record_broadcast("confirmed");
        metrics.record_outcome("INSUFFICIENT_GAS");

        let text = metrics.render().unwrap();
        assert!(text.contains("transfers_built_total 1"));
        assert!(text.contains("broadcasts_total{result=\"confirmed\"} 1"));
        assert!(text.contains("classified_outcomes_total{kind=\"INSUFFICIENT_GAS\"} 1"));
    }

    #[test]
    fn test_timer_observes() {
        let metrics = Metrics::new().unwrap();
        let timer = Timer::start();
        timer.observe_duration(&metrics.build_latency);
        assert_eq!(metrics.build_latency.get_sample_count(), 1);
    }
}
