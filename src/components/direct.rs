//! `direct:NAME` - synchronous in-process call into a registered processor.

use crate::endpoint::{Component, Endpoint, PollingConsumer, Producer, Service};
use crate::error::{EnrichError, Result};
use crate::exchange::Exchange;
use crate::processor::Processor;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Component dispatching `direct:` endpoints to processors registered by name
#[derive(Default)]
pub struct DirectComponent {
    consumers: Arc<DashMap<String, Arc<dyn Processor>>>,
}

impl DirectComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a processor to `direct:<name>`, replacing any previous one
    pub fn register(&self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        let name = name.into();
        info!(name = %name, "Registered direct consumer");
        self.consumers.insert(name, processor);
    }

    /// Detach the processor from `direct:<name>`
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.consumers.remove(name).map(|(_, processor)| processor)
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}

impl Component for DirectComponent {
    fn create_endpoint(&self, uri: &str, remaining: &str) -> Result<Arc<dyn Endpoint>> {
        let name = remaining.split('?').next().unwrap_or_default();
        if name.is_empty() {
            return Err(EnrichError::resolution(uri, "direct endpoint needs a name"));
        }

        Ok(Arc::new(DirectEndpoint {
            uri: uri.to_string(),
            name: name.to_string(),
            consumers: Arc::clone(&self.consumers),
        }))
    }
}

struct DirectEndpoint {
    uri: String,
    name: String,
    consumers: Arc<DashMap<String, Arc<dyn Processor>>>,
}

impl Endpoint for DirectEndpoint {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn create_producer(&self) -> Result<Arc<dyn Producer>> {
        Ok(Arc::new(DirectProducer {
            uri: self.uri.clone(),
            name: self.name.clone(),
            consumers: Arc::clone(&self.consumers),
        }))
    }

    fn create_polling_consumer(&self) -> Result<Arc<dyn PollingConsumer>> {
        Err(EnrichError::Lifecycle(format!(
            "endpoint '{}' does not support polling",
            self.uri
        )))
    }
}

struct DirectProducer {
    uri: String,
    name: String,
    consumers: Arc<DashMap<String, Arc<dyn Processor>>>,
}

impl Service for DirectProducer {}

#[async_trait]
impl Producer for DirectProducer {
    fn endpoint_uri(&self) -> &str {
        &self.uri
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        // Looked up per call so consumers can be (re)registered at runtime
        let processor = self
            .consumers
            .get(&self.name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EnrichError::Transport {
                endpoint: self.uri.clone(),
                message: "no consumers available on endpoint".to_string(),
            })?;

        debug!(uri = %self.uri, exchange_id = %exchange.id(), "Dispatching to direct consumer");
        processor.process(exchange).await;
        Ok(())
    }
}
