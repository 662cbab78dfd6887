//! Tracing subscriber setup.

use crate::config::ObservabilityConfig;
use crate::metrics::init_enrich_metrics;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns `false` when a
/// subscriber was already installed, which leaves the existing one in place.
pub fn init_tracing(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("content_enricher={}", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(
            service = %config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized"
        );
    }
    installed
}

/// Register the enrich metrics with `registry` when enabled in `config`
pub fn init_metrics(config: &ObservabilityConfig, registry: &prometheus::Registry) -> bool {
    if !config.prometheus_enabled {
        tracing::info!("Prometheus metrics disabled in configuration");
        return false;
    }
    match init_enrich_metrics(registry) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register enrich metrics");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = ObservabilityConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }

    #[test]
    fn test_init_metrics_respects_flag() {
        let registry = prometheus::Registry::new();
        let disabled = ObservabilityConfig {
            prometheus_enabled: false,
            ..Default::default()
        };
        assert!(!init_metrics(&disabled, &registry));
        assert!(init_metrics(&ObservabilityConfig::default(), &registry));
        assert!(!init_metrics(&ObservabilityConfig::default(), &registry));
    }
}
