//! Endpoint trait abstractions

use crate::error::Result;
use crate::exchange::Exchange;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle shared by producers and consumers
pub trait Service: Send + Sync {
    /// Release resources held by the handle. Called once, after the handle
    /// left its cache and its last lease was released, or right after use
    /// when it was never cached.
    fn stop(&self) {}
}

/// Push-based handle for sending an exchange to an endpoint
#[async_trait]
pub trait Producer: Service {
    /// URI of the endpoint this producer sends to
    fn endpoint_uri(&self) -> &str;

    /// Send the exchange and wait for completion.
    ///
    /// Transports that complete synchronously return without suspending;
    /// asynchronous transports suspend the calling task, never the thread.
    /// A failure may be returned as `Err` or set on the exchange itself.
    async fn process(&self, exchange: &mut Exchange) -> Result<()>;
}

/// Pull-based handle for retrieving one exchange from an endpoint.
///
/// All receive methods may block the calling thread; callers run them on a
/// blocking worker.
pub trait PollingConsumer: Service {
    /// URI of the endpoint this consumer polls
    fn endpoint_uri(&self) -> &str;

    /// Block until an exchange is available
    fn receive(&self) -> Result<Option<Exchange>>;

    /// Return immediately with an exchange if one is available
    fn receive_no_wait(&self) -> Result<Option<Exchange>>;

    /// Block up to `timeout` waiting for an exchange
    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Exchange>>;

    /// Put back an exchange that was received but never delivered to the
    /// caller. Consumers that cannot take it back hand it back as `Err`.
    fn redeliver(&self, exchange: Exchange) -> std::result::Result<(), Exchange> {
        Err(exchange)
    }
}

/// A resolved endpoint, able to create producers and polling consumers
pub trait Endpoint: Send + Sync {
    /// Normalized endpoint URI
    fn uri(&self) -> &str;

    /// Create a producer sending to this endpoint
    fn create_producer(&self) -> Result<Arc<dyn Producer>>;

    /// Create a polling consumer for this endpoint
    fn create_polling_consumer(&self) -> Result<Arc<dyn PollingConsumer>>;
}

/// Factory for endpoints of one URI scheme
pub trait Component: Send + Sync {
    /// Create the endpoint for `uri`; `remaining` is the part after `scheme:`
    fn create_endpoint(&self, uri: &str, remaining: &str) -> Result<Arc<dyn Endpoint>>;
}

/// Turns an endpoint URI into an endpoint.
///
/// Injected into the enrichers so they never depend on a process-wide registry.
pub trait EndpointResolver: Send + Sync {
    /// Resolve `uri`, failing with `EnrichError::Resolution` when it is
    /// malformed or unknown
    fn resolve(&self, uri: &str) -> Result<Arc<dyn Endpoint>>;

    /// Resolve `uri` without reading or filling any memoization
    fn resolve_uncached(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        self.resolve(uri)
    }
}
