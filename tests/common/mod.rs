//! Common test utilities
//!
//! Counting mock endpoints, a spy aggregation strategy and helpers for
//! reading Prometheus exposition output.

#![allow(dead_code)]

use async_trait::async_trait;
use content_enricher::aggregation::AggregationStrategy;
use content_enricher::components::{DirectComponent, QueueComponent};
use content_enricher::endpoint::{
    Component, Endpoint, EndpointRegistry, EndpointResolver, PollingConsumer, Producer, Service,
};
use content_enricher::error::{EnrichError, Result};
use content_enricher::exchange::Exchange;
use content_enricher::processor::processor_fn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts how many producers and consumers were created and stopped
#[derive(Default)]
pub struct Counters {
    pub producers_created: AtomicUsize,
    pub consumers_created: AtomicUsize,
    pub stopped: AtomicUsize,
}

impl Counters {
    pub fn producers(&self) -> usize {
        self.producers_created.load(Ordering::SeqCst)
    }

    pub fn consumers(&self) -> usize {
        self.consumers_created.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// `mock:NAME` component: producers reply `"<NAME>:<body>"`, consumers
/// always have one exchange ready with body `"polled from <NAME>"`
#[derive(Default)]
pub struct MockComponent {
    pub counters: Arc<Counters>,
}

impl Component for MockComponent {
    fn create_endpoint(&self, uri: &str, remaining: &str) -> Result<Arc<dyn Endpoint>> {
        Ok(Arc::new(MockEndpoint {
            uri: uri.to_string(),
            name: remaining.to_string(),
            counters: self.counters.clone(),
        }))
    }
}

struct MockEndpoint {
    uri: String,
    name: String,
    counters: Arc<Counters>,
}

impl Endpoint for MockEndpoint {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn create_producer(&self) -> Result<Arc<dyn Producer>> {
        self.counters.producers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockHandle {
            uri: self.uri.clone(),
            name: self.name.clone(),
            counters: self.counters.clone(),
        }))
    }

    fn create_polling_consumer(&self) -> Result<Arc<dyn PollingConsumer>> {
        self.counters.consumers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockHandle {
            uri: self.uri.clone(),
            name: self.name.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct MockHandle {
    uri: String,
    name: String,
    counters: Arc<Counters>,
}

impl Service for MockHandle {
    fn stop(&self) {
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Producer for MockHandle {
    fn endpoint_uri(&self) -> &str {
        &self.uri
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        let body = format!("{}:{}", self.name, exchange.message().body_as_string());
        exchange.set_body(body);
        Ok(())
    }
}

impl PollingConsumer for MockHandle {
    fn endpoint_uri(&self) -> &str {
        &self.uri
    }

    fn receive(&self) -> Result<Option<Exchange>> {
        self.receive_no_wait()
    }

    fn receive_no_wait(&self) -> Result<Option<Exchange>> {
        Ok(Some(Exchange::with_body(format!("polled from {}", self.name))))
    }

    fn receive_timeout(&self, _timeout: Duration) -> Result<Option<Exchange>> {
        self.receive_no_wait()
    }
}

/// Everything an enrich test needs: a resolver with `direct:`, `queue:` and `mock:`
pub struct TestContext {
    pub direct: Arc<DirectComponent>,
    pub queues: Arc<QueueComponent>,
    pub mock: Arc<MockComponent>,
    pub registry: Arc<EndpointRegistry>,
    pub resolver: Arc<dyn EndpointResolver>,
}

impl TestContext {
    pub fn new() -> Self {
        let direct = Arc::new(DirectComponent::new());
        let queues = Arc::new(QueueComponent::new());
        let mock = Arc::new(MockComponent::default());
        let registry = Arc::new(
            EndpointRegistry::new()
                .with_component("direct", direct.clone())
                .with_component("queue", queues.clone())
                .with_component("mock", mock.clone()),
        );

        // Resource route: greets the body, refuses "Kaboom"
        direct.register(
            "resource",
            processor_fn(|exchange| {
                let body = exchange.message().body_as_string();
                if body == "Kaboom" {
                    return Err(EnrichError::processing("I cannot do this"));
                }
                exchange.set_body(format!("Hello {}", body));
                Ok(())
            }),
        );

        Self {
            direct,
            queues,
            mock,
            resolver: registry.clone(),
            registry,
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.mock.counters
    }
}

/// What a [`SpyStrategy`] saw on one call
#[derive(Debug, Clone)]
pub struct SpyCall {
    pub original_body: serde_json::Value,
    pub resource_body: Option<serde_json::Value>,
    pub resource_exception: Option<EnrichError>,
}

/// Strategy recording its calls.
///
/// Sets the original's body to the resource body, or to the resource's
/// exception message when it failed.
#[derive(Default)]
pub struct SpyStrategy {
    calls: Mutex<Vec<SpyCall>>,
}

impl SpyStrategy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<SpyCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl AggregationStrategy for SpyStrategy {
    fn aggregate(&self, original: &Exchange, resource: Option<&Exchange>) -> Result<Exchange> {
        self.calls.lock().push(SpyCall {
            original_body: original.body().clone(),
            resource_body: resource.map(|r| r.result_message().body.clone()),
            resource_exception: resource.and_then(|r| r.exception().cloned()),
        });

        let mut result = original.copy();
        result.clear_exception();
        if let Some(resource) = resource {
            match resource.exception() {
                Some(e) => result.set_body(e.to_string()),
                None => result.set_body(resource.result_message().body.clone()),
            }
        }
        Ok(result)
    }
}

/// Parse Prometheus exposition format into metric name -> lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}

/// Extract metric value from a Prometheus output line
/// Example: `metric_name{label1="value1"} 42.5` -> Some(42.5)
pub fn extract_metric_value(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse::<f64>().ok()
}

/// Extract labels from a Prometheus metric line
/// Example: `metric{a="1",b="2"}` -> {"a": "1", "b": "2"}
pub fn extract_labels(line: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();

    if let (Some(start), Some(end)) = (line.find('{'), line.find('}')) {
        for pair in line[start + 1..end].split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                labels.insert(
                    key.trim().to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }
    }

    labels
}

/// Value of the sample of `metric` whose labels include all of `labels`
pub fn sample_value(output: &str, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
    output
        .lines()
        .filter(|line| line.starts_with(&format!("{}{{", metric)))
        .find(|line| {
            let found = extract_labels(line);
            labels
                .iter()
                .all(|(k, v)| found.get(*k).map(String::as_str) == Some(*v))
        })
        .and_then(extract_metric_value)
}
