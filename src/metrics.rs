//! Prometheus metrics for the enrich processors.

use lazy_static::lazy_static;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

/// Container for all enrichment metrics
pub struct EnrichMetrics {
    /// Enrich attempts by mode (enrich, poll_enrich) and outcome
    /// (aggregated, no_data, failed, skipped)
    pub enrich_total: CounterVec,

    /// Duration of a complete enrich step
    pub enrich_duration: HistogramVec,

    /// Producer/consumer cache lookups by kind and result (hit, miss)
    pub endpoint_cache_total: CounterVec,
}

impl EnrichMetrics {
    fn new() -> Self {
        Self {
            enrich_total: CounterVec::new(
                Opts::new("enrich_total", "Total number of enrich attempts")
                    .namespace("content_enricher"),
                &["mode", "outcome"],
            )
            .expect("Failed to create enrich_total metric"),

            enrich_duration: HistogramVec::new(
                HistogramOpts::new(
                    "enrich_duration_seconds",
                    "Duration of enrich steps including the secondary call and merge",
                )
                .namespace("content_enricher")
                .buckets(vec![
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                    30.0,
                ]),
                &["mode"],
            )
            .expect("Failed to create enrich_duration_seconds metric"),

            endpoint_cache_total: CounterVec::new(
                Opts::new(
                    "endpoint_cache_total",
                    "Total number of producer/consumer cache lookups",
                )
                .namespace("content_enricher"),
                &["kind", "result"],
            )
            .expect("Failed to create endpoint_cache_total metric"),
        }
    }
}

lazy_static! {
    /// Global enrichment metrics instance
    pub static ref ENRICH_METRICS: EnrichMetrics = EnrichMetrics::new();
}

/// Register the enrichment metrics with a Prometheus registry
pub fn init_enrich_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(ENRICH_METRICS.enrich_total.clone()))?;
    registry.register(Box::new(ENRICH_METRICS.enrich_duration.clone()))?;
    registry.register(Box::new(ENRICH_METRICS.endpoint_cache_total.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_gather() {
        let registry = Registry::new();
        init_enrich_metrics(&registry).unwrap();

        ENRICH_METRICS
            .enrich_total
            .with_label_values(&["enrich", "aggregated"])
            .inc();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"content_enricher_enrich_total".to_string()));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        init_enrich_metrics(&registry).unwrap();
        assert!(init_enrich_metrics(&registry).is_err());
    }
}
