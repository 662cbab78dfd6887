/// Aggregation of enrichment results
///
/// - `AggregationStrategy` trait, with closure support
/// - Copy (default), body-only and append strategies
/// - The merge step writing a strategy's outcome back into the original exchange

mod merging;
mod strategy;

pub use merging::{copy_results, merge};
pub use strategy::{
    strategy_fn, AggregationStrategy, AppendAggregationStrategy, BodyAggregationStrategy,
    CopyAggregationStrategy,
};
