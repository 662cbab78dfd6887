//! Exchange events emitted around enrichment calls.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tracing::{debug, warn};
use uuid::Uuid;

/// Something that happened to an exchange during an enrich step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Display)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangeEvent {
    /// About to send a secondary exchange
    Sending {
        exchange_id: Uuid,
        endpoint_uri: String,
    },
    /// A secondary exchange finished sending
    Sent {
        exchange_id: Uuid,
        endpoint_uri: String,
        elapsed: Duration,
        failed: bool,
    },
    /// A poll attempt finished
    Polled {
        exchange_id: Uuid,
        endpoint_uri: String,
        received: bool,
    },
}

impl ExchangeEvent {
    pub fn exchange_id(&self) -> Uuid {
        match self {
            ExchangeEvent::Sending { exchange_id, .. }
            | ExchangeEvent::Sent { exchange_id, .. }
            | ExchangeEvent::Polled { exchange_id, .. } => *exchange_id,
        }
    }

    pub fn endpoint_uri(&self) -> &str {
        match self {
            ExchangeEvent::Sending { endpoint_uri, .. }
            | ExchangeEvent::Sent { endpoint_uri, .. }
            | ExchangeEvent::Polled { endpoint_uri, .. } => endpoint_uri,
        }
    }
}

/// Receiver of exchange events; must not block
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: &ExchangeEvent);
}

/// Writes every event to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventNotifier;

impl EventNotifier for LoggingEventNotifier {
    fn notify(&self, event: &ExchangeEvent) {
        match event {
            ExchangeEvent::Sent {
                exchange_id,
                endpoint_uri,
                elapsed,
                failed: true,
            } => warn!(
                exchange_id = %exchange_id,
                endpoint = %endpoint_uri,
                elapsed_ms = elapsed.as_millis() as u64,
                "Secondary exchange failed"
            ),
            other => debug!(
                event = %other,
                exchange_id = %other.exchange_id(),
                endpoint = %other.endpoint_uri(),
                "Exchange event"
            ),
        }
    }
}

/// Fans events out to several notifiers
#[derive(Default, Clone)]
pub struct CompositeNotifier {
    notifiers: Vec<Arc<dyn EventNotifier>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl EventNotifier for CompositeNotifier {
    fn notify(&self, event: &ExchangeEvent) {
        for notifier in &self.notifiers {
            notifier.notify(event);
        }
    }
}

/// Keeps every event in memory, for inspection
#[derive(Default)]
pub struct RecordingNotifier {
    events: RwLock<Vec<ExchangeEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, oldest first
    pub fn events(&self) -> Vec<ExchangeEvent> {
        self.events.read().clone()
    }

    pub fn count(&self) -> usize {
        self.events.read().len()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventNotifier for RecordingNotifier {
    fn notify(&self, event: &ExchangeEvent) {
        self.events.write().push(event.clone());
    }
}
