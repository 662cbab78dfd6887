use crate::aggregation::{merge, AggregationStrategy, CopyAggregationStrategy};
use crate::endpoint::{CacheMode, CacheStats, EndpointResolver, HandleCache, PollingConsumer};
use crate::enrichment::models::{
    EnrichOutcome, EnrichStats, EnrichStatsSnapshot, PollEnrichConfig, PollTimeout,
};
use crate::enrichment::resolver::{EndpointSelector, ResolvedEndpoint};
use crate::error::{EnrichError, Result};
use crate::events::{EventNotifier, ExchangeEvent, LoggingEventNotifier};
use crate::exchange::{properties, Exchange};
use crate::expression::{ConstantExpression, Expression};
use crate::metrics::ENRICH_METRICS;
use crate::processor::Processor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Enriches an exchange with the next exchange available on another
/// endpoint, merged with an [`AggregationStrategy`].
///
/// Receiving blocks, so every poll runs on tokio's blocking pool and a slow
/// source never stalls the async workers.
pub struct PollEnricher {
    selector: EndpointSelector,
    strategy: Arc<dyn AggregationStrategy>,
    config: PollEnrichConfig,
    consumers: HandleCache<dyn PollingConsumer>,
    notifier: Arc<dyn EventNotifier>,
    stats: EnrichStats,
}

impl PollEnricher {
    /// Poll enricher reading from the endpoint computed by `expression`
    pub fn new(expression: Arc<dyn Expression>, resolver: Arc<dyn EndpointResolver>) -> Self {
        let config = PollEnrichConfig::default();
        Self {
            selector: EndpointSelector::new(expression, resolver),
            strategy: Arc::new(CopyAggregationStrategy),
            consumers: HandleCache::new("consumer", config.cache_mode()),
            config,
            notifier: Arc::new(LoggingEventNotifier),
            stats: EnrichStats::new(),
        }
    }

    /// Poll enricher reading from a fixed URI
    pub fn from_uri(uri: impl Into<String>, resolver: Arc<dyn EndpointResolver>) -> Self {
        Self::new(Arc::new(ConstantExpression::new(uri.into())), resolver)
    }

    /// Apply a configuration; the consumer cache is rebuilt for its cache size
    pub fn with_config(mut self, config: PollEnrichConfig) -> Result<Self> {
        config.validate()?;
        self.selector
            .set_ignore_invalid_endpoint(config.ignore_invalid_endpoint);
        self.selector
            .set_memoize(config.cache_mode() != CacheMode::Disabled);
        self.consumers = HandleCache::new("consumer", config.cache_mode());
        self.config = config;
        Ok(self)
    }

    /// Shorthand for changing only the receive timeout
    pub fn with_timeout(mut self, timeout_ms: i64) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    pub fn with_aggregation_strategy(mut self, strategy: Arc<dyn AggregationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_event_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &PollEnrichConfig {
        &self.config
    }

    pub fn stats(&self) -> EnrichStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn consumer_cache_stats(&self) -> CacheStats {
        self.consumers.stats()
    }

    /// Stop and drop every cached consumer
    pub async fn stop(&self) {
        self.consumers.clear().await;
    }

    async fn enrich(&self, exchange: &mut Exchange) -> EnrichOutcome {
        let resolved = match self.selector.select(exchange) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return self.without_data(exchange, EnrichOutcome::Skipped),
            Err(e) => {
                exchange.set_exception(e);
                return EnrichOutcome::Failed;
            }
        };

        let polled = match self.poll(&resolved).await {
            Ok(polled) => polled,
            Err(e) if self.config.ignore_invalid_endpoint && e.is_invalid_endpoint() => {
                warn!(uri = %resolved.uri, error = %e, "Ignoring invalid endpoint");
                return self.without_data(exchange, EnrichOutcome::Skipped);
            }
            Err(e) => {
                warn!(uri = %resolved.uri, error = %e, "Poll failed");
                exchange.set_exception(e);
                exchange.set_property(properties::TO_ENDPOINT, resolved.uri.clone());
                exchange.set_property(properties::FAILURE_ENDPOINT, resolved.uri);
                return EnrichOutcome::Failed;
            }
        };

        self.notifier.notify(&ExchangeEvent::Polled {
            exchange_id: exchange.id(),
            endpoint_uri: resolved.uri.clone(),
            received: polled.is_some(),
        });

        let Some(mut resource) = polled else {
            debug!(exchange_id = %exchange.id(), uri = %resolved.uri, "No data polled");
            return self.without_data(exchange, EnrichOutcome::NoData);
        };
        resource.set_property(properties::TO_ENDPOINT, resolved.uri.clone());

        if resource.is_failed() && !self.config.aggregate_on_exception {
            if let Some(e) = resource.exception().cloned() {
                exchange.set_exception(e);
            }
            exchange.set_property(properties::TO_ENDPOINT, resolved.uri.clone());
            exchange.set_property(properties::FAILURE_ENDPOINT, resolved.uri);
            resource.handover_completions(exchange);
            return EnrichOutcome::Failed;
        }

        let merged = merge(exchange, Some(&resource), self.strategy.as_ref());
        resource.handover_completions(exchange);
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

    /// Receive at most one exchange according to the configured timeout.
    ///
    /// The blocking wait is sliced so that it ends soon after this future is
    /// dropped. An exchange received after that point is handed back to the
    /// consumer instead of being lost.
    async fn poll(&self, resolved: &ResolvedEndpoint) -> Result<Option<Exchange>> {
        let lease = self
            .consumers
            .acquire(&resolved.uri, || resolved.endpoint.create_polling_consumer())
            .await?;

        let timeout = self.config.poll_timeout();
        let uri = resolved.uri.clone();
        debug!(uri = %uri, timeout = ?timeout, "Polling");

        let (reply, received) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let consumer = Arc::clone(lease.handle());
            let polled = receive_while_awaited(consumer.as_ref(), timeout, &reply);
            if let Err(Ok(Some(orphan))) = reply.send(polled) {
                return_orphan(consumer.as_ref(), &uri, orphan);
            }
            drop(lease);
        });

        match received.await {
            Ok(Ok(polled)) => Ok(polled),
            Ok(Err(e @ EnrichError::Poll { .. })) => Err(e),
            Ok(Err(e)) => Err(EnrichError::Poll {
                endpoint: resolved.uri.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(EnrichError::Internal(
                "poll task ended without a result".to_string(),
            )),
        }
    }

    /// Let the strategy decide what "nothing received" means
    fn without_data(&self, exchange: &mut Exchange, outcome: EnrichOutcome) -> EnrichOutcome {
        match merge(exchange, None, self.strategy.as_ref()) {
            Ok(()) if !exchange.is_failed() => outcome,
            _ => EnrichOutcome::Failed,
        }
    }

    fn record(&self, outcome: EnrichOutcome, elapsed: Duration) {
        self.stats.record(outcome, elapsed);
        ENRICH_METRICS
            .enrich_total
            .with_label_values(&["poll_enrich", outcome.as_ref()])
            .inc();
        ENRICH_METRICS
            .enrich_duration
            .with_label_values(&["poll_enrich"])
            .observe(elapsed.as_secs_f64());
    }
}

#[async_trait]
impl Processor for PollEnricher {
    async fn process(&self, exchange: &mut Exchange) {
        let started = Instant::now();
        let outcome = self.enrich(exchange).await;
        debug!(exchange_id = %exchange.id(), outcome = %outcome, "Poll enrich finished");
        self.record(outcome, started.elapsed());
    }
}

/// Longest single blocking wait between checks for an abandoned poll
const RECEIVE_SLICE: Duration = Duration::from_millis(50);

fn receive_while_awaited(
    consumer: &dyn PollingConsumer,
    timeout: PollTimeout,
    reply: &oneshot::Sender<Result<Option<Exchange>>>,
) -> Result<Option<Exchange>> {
    let deadline = match timeout {
        PollTimeout::NoWait => return consumer.receive_no_wait(),
        PollTimeout::Forever => None,
        PollTimeout::Within(duration) => Some(Instant::now() + duration),
    };

    loop {
        if reply.is_closed() {
            debug!(uri = %consumer.endpoint_uri(), "Poll abandoned, stopping receive");
            return Ok(None);
        }
        let slice = match deadline {
            None => RECEIVE_SLICE,
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Ok(None);
                }
                left.min(RECEIVE_SLICE)
            }
        };
        if let Some(exchange) = consumer.receive_timeout(slice)? {
            return Ok(Some(exchange));
        }
    }
}

/// Give an exchange nobody is waiting for back to its source, or fail it
fn return_orphan(consumer: &dyn PollingConsumer, uri: &str, exchange: Exchange) {
    let exchange_id = exchange.id();
    match consumer.redeliver(exchange) {
        Ok(()) => {
            debug!(uri = %uri, exchange_id = %exchange_id, "Returned exchange of abandoned poll");
        }
        Err(mut exchange) => {
            warn!(
                uri = %uri,
                exchange_id = %exchange_id,
                "Could not return exchange of abandoned poll"
            );
            exchange.set_exception(EnrichError::Poll {
                endpoint: uri.to_string(),
                message: "poll abandoned before the exchange was delivered".to_string(),
            });
            exchange.done();
        }
    }
}
