//! Processors and the sequential pipeline hosting them.

use crate::error::{EnrichError, Result};
use crate::exchange::{Exchange, ExchangePattern, Message};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A step in a pipeline.
///
/// Failures are reported by setting the exchange's exception, never by
/// panicking; the pipeline stops routing a failed exchange.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Process the exchange in place
    async fn process(&self, exchange: &mut Exchange);
}

/// Processor built from a synchronous closure; an `Err` becomes the exchange's exception
pub struct FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<()> + Send + Sync,
{
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<()> + Send + Sync,
{
    async fn process(&self, exchange: &mut Exchange) {
        if let Err(e) = (self.f)(exchange) {
            exchange.set_exception(e);
        }
    }
}

/// Convenience constructor for an `Arc<dyn Processor>` from a closure
pub fn processor_fn<F>(f: F) -> Arc<dyn Processor>
where
    F: Fn(&mut Exchange) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(FnProcessor::new(f))
}

/// Runs processors in order, stopping at the first one that fails the exchange
#[derive(Clone, Default)]
pub struct Pipeline {
    processors: Vec<Arc<dyn Processor>>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a processor
    pub fn then(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Append a processor after construction
    pub fn add_processor(&mut self, processor: Arc<dyn Processor>) {
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Route a body through the pipeline as a request/reply call.
    ///
    /// Returns the outcome body, or the exception the exchange ended with.
    pub async fn request_body(&self, body: impl Into<Value>) -> Result<Value> {
        let exchange = Exchange::with_body(body).with_pattern(ExchangePattern::InOut);
        let exchange = self.request(exchange).await;
        outcome(exchange)
    }

    /// Route an exchange through the pipeline and mark it done
    pub async fn request(&self, mut exchange: Exchange) -> Exchange {
        self.process(&mut exchange).await;
        exchange.done();
        exchange
    }

    /// Route independent exchanges concurrently, at most `max_concurrent` at a time.
    ///
    /// Results come back in input order.
    pub async fn process_batch(
        &self,
        exchanges: Vec<Exchange>,
        max_concurrent: usize,
    ) -> Vec<Exchange> {
        let mut results: Vec<(usize, Exchange)> = stream::iter(exchanges.into_iter().enumerate())
            .map(|(index, exchange)| async move { (index, self.request(exchange).await) })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, exchange)| exchange).collect()
    }
}

#[async_trait]
impl Processor for Pipeline {
    async fn process(&self, exchange: &mut Exchange) {
        for (step, processor) in self.processors.iter().enumerate() {
            if exchange.is_failed() {
                debug!(
                    exchange_id = %exchange.id(),
                    step,
                    "Stopping pipeline, exchange failed"
                );
                break;
            }

            // The output of one step is the input of the next
            if let Some(out) = exchange.out().cloned() {
                exchange.set_message(out);
                exchange.set_out(None);
            }

            processor.process(exchange).await;
        }
    }
}

/// The outcome of a finished exchange as a `Result`
pub fn outcome(mut exchange: Exchange) -> Result<Value> {
    if let Some(e) = exchange.take_exception() {
        warn!(exchange_id = %exchange.id(), error = %e, "Exchange completed with an exception");
        return Err(e);
    }
    let Message { body, .. } = exchange.result_message().clone();
    Ok(body)
}

/// Processor that always fails with the given error; handy for failure routes
pub fn fail_with(error: EnrichError) -> Arc<dyn Processor> {
    processor_fn(move |_| Err(error.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn append(suffix: &'static str) -> Arc<dyn Processor> {
        processor_fn(move |exchange| {
            let body = format!("{}{}", exchange.message().body_as_string(), suffix);
            exchange.set_body(body);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_pipeline_runs_in_order() {
        let pipeline = Pipeline::new().then(append("a")).then(append("b"));
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.request_body("x").await.unwrap(), json!("xab"));
    }

    #[tokio::test]
    async fn test_pipeline_stops_on_failure() {
        let pipeline = Pipeline::new()
            .then(append("a"))
            .then(fail_with(EnrichError::processing("stop here")))
            .then(append("never"));

        let exchange = pipeline.request(Exchange::with_body("x")).await;
        assert_eq!(exchange.body(), &json!("xa"));
        assert_eq!(
            exchange.exception(),
            Some(&EnrichError::processing("stop here"))
        );

        let err = pipeline.request_body("x").await.unwrap_err();
        assert_eq!(err.to_string(), "stop here");
    }

    #[tokio::test]
    async fn test_out_message_feeds_next_step() {
        let reply = processor_fn(|exchange| {
            exchange.set_out(Some(Message::new("reply")));
            Ok(())
        });
        let pipeline = Pipeline::new().then(reply).then(append("!"));

        assert_eq!(pipeline.request_body("request").await.unwrap(), json!("reply!"));
    }

    #[tokio::test]
    async fn test_process_batch_preserves_order() {
        let pipeline = Pipeline::new().then(append("-done"));
        let exchanges = (0..10).map(|i| Exchange::with_body(i.to_string())).collect();

        let results = pipeline.process_batch(exchanges, 3).await;

        assert_eq!(results.len(), 10);
        for (i, exchange) in results.iter().enumerate() {
            assert_eq!(exchange.body(), &json!(format!("{}-done", i)));
        }
    }

    #[test]
    fn test_request_body_from_sync_code() {
        let pipeline = Pipeline::new().then(append("?"));
        let reply = tokio_test::block_on(pipeline.request_body("sync"));
        assert_eq!(reply.unwrap(), json!("sync?"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_echoes() {
        let pipeline = Pipeline::new();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.request_body("same").await.unwrap(), json!("same"));
    }
}
