/// Endpoint abstractions consumed by the enrichers
///
/// This module provides:
/// - Producer / polling consumer capabilities of an endpoint
/// - Component-based endpoint resolution with a memoizing registry
/// - A bounded, race-safe cache of producer and consumer handles

mod cache;
mod registry;
mod traits;

pub use cache::{CacheMode, CacheStats, HandleCache, Lease};
pub use registry::EndpointRegistry;
pub use traits::{Component, Endpoint, EndpointResolver, PollingConsumer, Producer, Service};
