//! Content enrichment processors.
//!
//! An [`Enricher`] sends a copy of an exchange to a secondary endpoint and
//! merges the reply back; a [`PollEnricher`] pulls one exchange from a
//! secondary endpoint within a timeout and merges that. The merge is done by a
//! pluggable [`AggregationStrategy`]. Endpoints are looked up through an
//! injected [`EndpointResolver`], and their producers and polling consumers
//! are cached per URI.

pub mod aggregation;
pub mod components;
pub mod config;
pub mod endpoint;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod exchange;
pub mod expression;
pub mod metrics;
pub mod observability;
pub mod processor;

pub use aggregation::{AggregationStrategy, CopyAggregationStrategy};
pub use config::Config;
pub use endpoint::{EndpointRegistry, EndpointResolver};
pub use enrichment::{EnrichConfig, Enricher, PollEnrichConfig, PollEnricher};
pub use error::{EnrichError, Result};
pub use exchange::{Exchange, ExchangePattern, Message};
pub use processor::{Pipeline, Processor};
