use crate::aggregation::{merge, AggregationStrategy, CopyAggregationStrategy};
use crate::endpoint::{CacheMode, CacheStats, EndpointResolver, HandleCache, Producer};
use crate::enrichment::models::{EnrichConfig, EnrichOutcome, EnrichStats, EnrichStatsSnapshot};
use crate::enrichment::resolver::{EndpointSelector, ResolvedEndpoint};
use crate::error::Result;
use crate::events::{EventNotifier, ExchangeEvent, LoggingEventNotifier};
use crate::exchange::{properties, Exchange};
use crate::expression::{ConstantExpression, Expression};
use crate::metrics::ENRICH_METRICS;
use crate::processor::Processor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Enriches an exchange by sending a copy of it to another endpoint and
/// merging the reply back with an [`AggregationStrategy`].
///
/// The send is awaited, so a slow secondary endpoint suspends only the
/// task processing this exchange.
pub struct Enricher {
    selector: EndpointSelector,
    strategy: Arc<dyn AggregationStrategy>,
    request_expression: Option<Arc<dyn Expression>>,
    config: EnrichConfig,
    producers: HandleCache<dyn Producer>,
    notifier: Arc<dyn EventNotifier>,
    stats: EnrichStats,
}

impl Enricher {
    /// Enricher sending to the endpoint computed by `expression`
    pub fn new(expression: Arc<dyn Expression>, resolver: Arc<dyn EndpointResolver>) -> Self {
        let config = EnrichConfig::default();
        Self {
            selector: EndpointSelector::new(expression, resolver),
            strategy: Arc::new(CopyAggregationStrategy),
            request_expression: None,
            producers: HandleCache::new("producer", config.cache_mode()),
            config,
            notifier: Arc::new(LoggingEventNotifier),
            stats: EnrichStats::new(),
        }
    }

    /// Enricher sending to a fixed URI
    pub fn to_uri(uri: impl Into<String>, resolver: Arc<dyn EndpointResolver>) -> Self {
        Self::new(Arc::new(ConstantExpression::new(uri.into())), resolver)
    }

    /// Apply a configuration; the producer cache is rebuilt for its cache size
    pub fn with_config(mut self, config: EnrichConfig) -> Result<Self> {
        config.validate()?;
        self.selector
            .set_ignore_invalid_endpoint(config.ignore_invalid_endpoint);
        self.selector
            .set_memoize(config.cache_mode() != CacheMode::Disabled);
        self.producers = HandleCache::new("producer", config.cache_mode());
        self.config = config;
        Ok(self)
    }

    pub fn with_aggregation_strategy(mut self, strategy: Arc<dyn AggregationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Send the value of `expression` as the request body instead of the original body
    pub fn with_request_expression(mut self, expression: Arc<dyn Expression>) -> Self {
        self.request_expression = Some(expression);
        self
    }

    pub fn with_event_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    pub fn stats(&self) -> EnrichStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn producer_cache_stats(&self) -> CacheStats {
        self.producers.stats()
    }

    /// Stop and drop every cached producer
    pub async fn stop(&self) {
        self.producers.clear().await;
    }

    async fn enrich(&self, exchange: &mut Exchange) -> EnrichOutcome {
        let resolved = match self.selector.select(exchange) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return EnrichOutcome::Skipped,
            Err(e) => {
                exchange.set_exception(e);
                return EnrichOutcome::Failed;
            }
        };

        let mut resource = match self.call(exchange, &resolved).await {
            Ok(resource) => resource,
            Err(e) => {
                warn!(uri = %resolved.uri, error = %e, "Could not send to enrich endpoint");
                exchange.set_exception(e);
                exchange.set_property(properties::TO_ENDPOINT, resolved.uri.clone());
                exchange.set_property(properties::FAILURE_ENDPOINT, resolved.uri);
                return EnrichOutcome::Failed;
            }
        };

        if resource.is_failed() && !self.config.aggregate_on_exception {
            if let Some(e) = resource.take_exception() {
                debug!(
                    exchange_id = %exchange.id(),
                    uri = %resolved.uri,
                    error = %e,
                    "Secondary exchange failed, not aggregating"
                );
                exchange.set_exception(e.clone());
                resource.set_exception(e);
            }
            exchange.set_property(properties::TO_ENDPOINT, resolved.uri.clone());
            exchange.set_property(properties::FAILURE_ENDPOINT, resolved.uri);
            self.finish(exchange, resource);
            return EnrichOutcome::Failed;
        }

        let merged = merge(exchange, Some(&resource), self.strategy.as_ref());
        self.finish(exchange, resource);
        if merged.is_err() {
            return EnrichOutcome::Failed;
        }

        exchange.set_property(properties::TO_ENDPOINT, resolved.uri);
        if exchange.is_failed() {
            EnrichOutcome::Failed
        } else {
            EnrichOutcome::Aggregated
        }
    }

    /// Build the secondary exchange and send it.
    ///
    /// `Err` means nothing was sent. A failure of the send itself ends up on
    /// the returned exchange.
    async fn call(&self, exchange: &Exchange, resolved: &ResolvedEndpoint) -> Result<Exchange> {
        let lease = self
            .producers
            .acquire(&resolved.uri, || resolved.endpoint.create_producer())
            .await?;

        let mut resource = exchange.correlated_copy();
        if let Some(expression) = &self.request_expression {
            resource.set_body(expression.evaluate(exchange)?);
        }
        resource.set_property(properties::TO_ENDPOINT, resolved.uri.clone());

        self.notifier.notify(&ExchangeEvent::Sending {
            exchange_id: resource.id(),
            endpoint_uri: resolved.uri.clone(),
        });
        let started = Instant::now();

        if let Err(e) = lease.handle().process(&mut resource).await {
            resource.set_exception(e);
        }

        self.notifier.notify(&ExchangeEvent::Sent {
            exchange_id: resource.id(),
            endpoint_uri: resolved.uri.clone(),
            elapsed: started.elapsed(),
            failed: resource.is_failed(),
        });
        drop(lease);

        Ok(resource)
    }

    fn finish(&self, original: &mut Exchange, mut resource: Exchange) {
        if self.config.share_unit_of_work {
            resource.handover_completions(original);
        } else {
            resource.done();
        }
    }

    fn record(&self, outcome: EnrichOutcome, elapsed: Duration) {
        self.stats.record(outcome, elapsed);
        ENRICH_METRICS
            .enrich_total
            .with_label_values(&["enrich", outcome.as_ref()])
            .inc();
        ENRICH_METRICS
            .enrich_duration
            .with_label_values(&["enrich"])
            .observe(elapsed.as_secs_f64());
    }
}

#[async_trait]
impl Processor for Enricher {
    async fn process(&self, exchange: &mut Exchange) {
        let started = Instant::now();
        let outcome = self.enrich(exchange).await;
        debug!(exchange_id = %exchange.id(), outcome = %outcome, "Enrich finished");
        self.record(outcome, started.elapsed());
    }
}
