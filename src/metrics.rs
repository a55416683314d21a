//! Metrics collection and export

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Per-source cache counters handed to a telemetry cache
#[derive(Clone)]
pub struct CacheCounters {
    pub hits: IntCounter,
    pub misses: IntCounter,
    pub errors: IntCounter,
    pub singleflight_joins: IntCounter,
}

/// Service metrics registry
///
/// Constructed once in `main` and passed by `Arc` into the components
/// that record into it; counters are atomic and safe under concurrent
/// increment.
pub struct Metrics {
    registry: Registry,

    // Counters
    pub builds_total: IntCounter,
    pub builds_success: IntCounter,
    pub builds_failed: IntCounterVec,
    pub fallback_attempts: IntCounter,
    pub fallback_success: IntCounter,
    pub selection_mode: IntCounterVec,
    pub fee_mode: IntCounterVec,
    pub inputs_selected_total: IntCounter,
    pub selection_truncated: IntCounter,

    // Telemetry cache counters, labeled by source
    telemetry_cache_hits: IntCounterVec,
    telemetry_cache_misses: IntCounterVec,
    telemetry_fetch_errors: IntCounterVec,
    telemetry_singleflight_joins: IntCounterVec,

    // Histograms
    pub build_latency: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let builds_total =
            IntCounter::with_opts(Opts::new("builds_total", "Total build requests received"))?;

        let builds_success =
            IntCounter::with_opts(Opts::new("builds_success", "Builds completed successfully"))?;

        let builds_failed = IntCounterVec::new(
            Opts::new("builds_failed", "Builds failed, by error category"),
            &["category"],
        )?;

        let fallback_attempts = IntCounter::with_opts(Opts::new(
            "fallback_attempts_total",
            "All-inputs fallback construction attempts",
        ))?;

        let fallback_success = IntCounter::with_opts(Opts::new(
            "fallback_success_total",
            "Builds rescued by the all-inputs fallback",
        ))?;

        let selection_mode = IntCounterVec::new(
            Opts::new("selection_mode_total", "Selections performed, by mode"),
            &["mode"],
        )?;

        let fee_mode =
            IntCounterVec::new(Opts::new("fee_mode_total", "Fees computed, by mode"), &["mode"])?;

        let inputs_selected_total = IntCounter::with_opts(Opts::new(
            "inputs_selected_total",
            "Inputs consumed across all successful builds",
        ))?;

        let selection_truncated = IntCounter::with_opts(Opts::new(
            "selection_truncated_total",
            "Selections truncated by the input cap",
        ))?;

        let telemetry_cache_hits = IntCounterVec::new(
            Opts::new("telemetry_cache_hits", "Telemetry cache hits, by source"),
            &["source"],
        )?;

        let telemetry_cache_misses = IntCounterVec::new(
            Opts::new("telemetry_cache_misses", "Telemetry cache misses, by source"),
            &["source"],
        )?;

        let telemetry_fetch_errors = IntCounterVec::new(
            Opts::new("telemetry_fetch_errors", "Telemetry fetch failures, by source"),
            &["source"],
        )?;

        let telemetry_singleflight_joins = IntCounterVec::new(
            Opts::new(
                "telemetry_singleflight_joins",
                "Callers that joined an in-flight telemetry fetch, by source",
            ),
            &["source"],
        )?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Transaction build latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        registry.register(Box::new(builds_total.clone()))?;
        registry.register(Box::new(builds_success.clone()))?;
        registry.register(Box::new(builds_failed.clone()))?;
        registry.register(Box::new(fallback_attempts.clone()))?;
        registry.register(Box::new(fallback_success.clone()))?;
        registry.register(Box::new(selection_mode.clone()))?;
        registry.register(Box::new(fee_mode.clone()))?;
        registry.register(Box::new(inputs_selected_total.clone()))?;
        registry.register(Box::new(selection_truncated.clone()))?;
        registry.register(Box::new(telemetry_cache_hits.clone()))?;
        registry.register(Box::new(telemetry_cache_misses.clone()))?;
        registry.register(Box::new(telemetry_fetch_errors.clone()))?;
        registry.register(Box::new(telemetry_singleflight_joins.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;

        Ok(Self {
            registry,
            builds_total,
            builds_success,
            builds_failed,
            fallback_attempts,
            fallback_success,
            selection_mode,
            fee_mode,
            inputs_selected_total,
            selection_truncated,
            telemetry_cache_hits,
            telemetry_cache_misses,
            telemetry_fetch_errors,
            telemetry_singleflight_joins,
            build_latency,
        })
    }

    /// Counter bundle for one telemetry source
    pub fn cache_counters(&self, source: &str) -> CacheCounters {
        CacheCounters {
            hits: self.telemetry_cache_hits.with_label_values(&[source]),
            misses: self.telemetry_cache_misses.with_label_values(&[source]),
            errors: self.telemetry_fetch_errors.with_label_values(&[source]),
            singleflight_joins: self.telemetry_singleflight_joins.with_label_values(&[source]),
        }
    }

    /// Render the pull-based text exposition format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_render() {
        let metrics = Metrics::new().unwrap();
        metrics.builds_total.inc();
        metrics.builds_failed.with_label_values(&["invalid_request"]).inc();
        metrics.selection_mode.with_label_values(&["auto"]).inc();

        let exposition = metrics.render();
        assert!(exposition.contains("builds_total 1"));
        assert!(exposition.contains("category=\"invalid_request\""));
    }

    #[test]
    fn test_cache_counters_are_labeled_per_source() {
        let metrics = Metrics::new().unwrap();
        let receipts = metrics.cache_counters("receipts");
        let scheduler = metrics.cache_counters("scheduler");
        receipts.hits.inc();
        receipts.hits.inc();
        scheduler.hits.inc();

        assert_eq!(receipts.hits.get(), 2);
        assert_eq!(scheduler.hits.get(), 1);
    }
}
