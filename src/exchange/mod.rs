/// Exchange data model
///
/// This module provides the unit of work that flows through a pipeline:
/// - Messages with body, headers and a fault flag
/// - Exchanges with an exception slot and a property bag
/// - Unit-of-work completion callbacks

mod completion;
mod core;
mod message;

pub use self::core::{Exchange, ExchangePattern};
pub use completion::{FnSynchronization, Synchronization};
pub use message::{value_to_string, Message};

/// Well-known exchange property keys
pub mod properties {
    /// URI of the endpoint the exchange was last enriched from
    pub const TO_ENDPOINT: &str = "EnrichToEndpoint";

    /// URI of the endpoint whose call failed
    pub const FAILURE_ENDPOINT: &str = "EnrichFailureEndpoint";

    /// Id of the exchange a secondary exchange was derived from
    pub const CORRELATION_ID: &str = "EnrichCorrelationId";
}
