/// Content enrichment processors
///
/// This module provides the two enrich steps:
/// - `Enricher` sends a copy of the exchange to an endpoint and merges the reply
/// - `PollEnricher` polls an endpoint for one exchange and merges it
/// - Dynamic endpoint selection with an "ignore invalid endpoint" policy
/// - Producer/consumer caching, statistics and exchange events

pub mod enricher;
pub mod models;
pub mod poll;
pub mod resolver;

pub use enricher::Enricher;
pub use models::{
    EnrichConfig, EnrichOutcome, EnrichStats, EnrichStatsSnapshot, PollEnrichConfig, PollTimeout,
};
pub use poll::PollEnricher;
pub use resolver::{EndpointSelector, ResolvedEndpoint};
