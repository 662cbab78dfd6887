//! `queue:NAME[?size=N]` - in-memory FIFO that can be sent to and polled.

use crate::endpoint::{Component, Endpoint, PollingConsumer, Producer, Service};
use crate::error::{EnrichError, Result};
use crate::exchange::Exchange;
use async_trait::async_trait;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A named FIFO of exchanges
pub struct MessageQueue {
    name: String,
    sender: Sender<Exchange>,
    receiver: Receiver<Exchange>,
}

impl MessageQueue {
    fn new(name: &str, capacity: Option<usize>) -> Self {
        let (sender, receiver) = match capacity {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        Self {
            name: name.to_string(),
            sender,
            receiver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue an exchange, failing when a bounded queue is full
    pub fn offer(&self, exchange: Exchange) -> Result<()> {
        self.sender.try_send(exchange).map_err(|e| match e {
            TrySendError::Full(_) => EnrichError::Transport {
                endpoint: format!("queue:{}", self.name),
                message: "queue is full".to_string(),
            },
            TrySendError::Disconnected(_) => EnrichError::Internal(format!(
                "queue '{}' is disconnected",
                self.name
            )),
        })
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Component owning the named queues behind `queue:` endpoints
#[derive(Default)]
pub struct QueueComponent {
    queues: DashMap<String, Arc<MessageQueue>>,
}

impl QueueComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the queue called `name`; `capacity` only applies on creation
    pub fn queue(&self, name: &str, capacity: Option<usize>) -> Arc<MessageQueue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(name = %name, capacity = ?capacity, "Creating queue");
                Arc::new(MessageQueue::new(name, capacity))
            })
            .clone()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    fn parse_capacity(uri: &str, query: &str) -> Result<Option<usize>> {
        let mut capacity = None;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("size", value)) => {
                    let size = value.parse::<usize>().map_err(|_| {
                        EnrichError::resolution(uri, format!("invalid queue size '{}'", value))
                    })?;
                    if size == 0 {
                        return Err(EnrichError::resolution(uri, "queue size must be positive"));
                    }
                    capacity = Some(size);
                }
                _ => {
                    return Err(EnrichError::resolution(
                        uri,
                        format!("unknown queue option '{}'", pair),
                    ))
                }
            }
        }
        Ok(capacity)
    }
}

impl Component for QueueComponent {
    fn create_endpoint(&self, uri: &str, remaining: &str) -> Result<Arc<dyn Endpoint>> {
        let (name, query) = remaining.split_once('?').unwrap_or((remaining, ""));
        if name.is_empty() {
            return Err(EnrichError::resolution(uri, "queue endpoint needs a name"));
        }
        let capacity = Self::parse_capacity(uri, query)?;

        Ok(Arc::new(QueueEndpoint {
            uri: uri.to_string(),
            queue: self.queue(name, capacity),
        }))
    }
}

struct QueueEndpoint {
    uri: String,
    queue: Arc<MessageQueue>,
}

impl Endpoint for QueueEndpoint {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn create_producer(&self) -> Result<Arc<dyn Producer>> {
        Ok(Arc::new(QueueProducer {
            uri: self.uri.clone(),
            queue: Arc::clone(&self.queue),
        }))
    }

    fn create_polling_consumer(&self) -> Result<Arc<dyn PollingConsumer>> {
        Ok(Arc::new(QueueConsumer {
            uri: self.uri.clone(),
            queue: Arc::clone(&self.queue),
        }))
    }
}

struct QueueProducer {
    uri: String,
    queue: Arc<MessageQueue>,
}

impl Service for QueueProducer {}

#[async_trait]
impl Producer for QueueProducer {
    fn endpoint_uri(&self) -> &str {
        &self.uri
    }

    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        debug!(uri = %self.uri, exchange_id = %exchange.id(), "Enqueuing exchange");
        self.queue.offer(exchange.correlated_copy())
    }
}

struct QueueConsumer {
    uri: String,
    queue: Arc<MessageQueue>,
}

impl QueueConsumer {
    fn disconnected(&self) -> EnrichError {
        EnrichError::Poll {
            endpoint: self.uri.clone(),
            message: "queue is disconnected".to_string(),
        }
    }
}

impl Service for QueueConsumer {}

impl PollingConsumer for QueueConsumer {
    fn endpoint_uri(&self) -> &str {
        &self.uri
    }

    fn receive(&self) -> Result<Option<Exchange>> {
        self.queue
            .receiver
            .recv()
            .map(Some)
            .map_err(|_| self.disconnected())
    }

    fn receive_no_wait(&self) -> Result<Option<Exchange>> {
        match self.queue.receiver.try_recv() {
            Ok(exchange) => Ok(Some(exchange)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.disconnected()),
        }
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Exchange>> {
        match self.queue.receiver.recv_timeout(timeout) {
            Ok(exchange) => Ok(Some(exchange)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(self.disconnected()),
        }
    }

    /// Re-enqueued at the tail; a full bounded queue refuses it
    fn redeliver(&self, exchange: Exchange) -> std::result::Result<(), Exchange> {
        debug!(uri = %self.uri, exchange_id = %exchange.id(), "Re-enqueuing exchange");
        self.queue.sender.try_send(exchange).map_err(|e| e.into_inner())
    }
}
