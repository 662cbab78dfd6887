use crate::error::Result;
use crate::exchange::{value_to_string, Exchange};
use std::sync::Arc;

/// Combines the original exchange with the result of an enrichment call.
///
/// `resource` is `None` when nothing was obtained (a poll that timed out or
/// found no data). It may carry an exception or a fault instead of a normal
/// reply; the strategy decides how to represent that. The returned exchange
/// is what the original continues routing with.
pub trait AggregationStrategy: Send + Sync {
    fn aggregate(&self, original: &Exchange, resource: Option<&Exchange>) -> Result<Exchange>;
}

impl<F> AggregationStrategy for F
where
    F: Fn(&Exchange, Option<&Exchange>) -> Result<Exchange> + Send + Sync,
{
    fn aggregate(&self, original: &Exchange, resource: Option<&Exchange>) -> Result<Exchange> {
        self(original, resource)
    }
}

/// Wrap a closure as a shareable strategy
pub fn strategy_fn<F>(f: F) -> Arc<dyn AggregationStrategy>
where
    F: Fn(&Exchange, Option<&Exchange>) -> Result<Exchange> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Default strategy: replace the original's message (body and headers) with
/// the resource's outcome message.
///
/// Without a resource the original is returned unchanged. The resource's
/// exception is not carried over.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyAggregationStrategy;

impl AggregationStrategy for CopyAggregationStrategy {
    fn aggregate(&self, original: &Exchange, resource: Option<&Exchange>) -> Result<Exchange> {
        let mut result = original.copy();
        if let Some(resource) = resource {
            result.set_message(resource.result_message().clone());
            result.set_out(None);
            result.clear_exception();
        }
        Ok(result)
    }
}

/// Replace only the original's body.
///
/// Takes the resource's outcome body, or the text of its exception when the
/// resource failed. Headers of the original are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyAggregationStrategy;

impl AggregationStrategy for BodyAggregationStrategy {
    fn aggregate(&self, original: &Exchange, resource: Option<&Exchange>) -> Result<Exchange> {
        let mut result = original.copy();
        result.clear_exception();
        match resource {
            None => {}
            Some(resource) => match resource.exception() {
                Some(exception) => result.set_body(exception.to_string()),
                None => result.set_body(resource.result_message().body.clone()),
            },
        }
        Ok(result)
    }
}

/// Concatenate the original body and the resource body as text, joined by `separator`
#[derive(Debug, Clone)]
pub struct AppendAggregationStrategy {
    separator: String,
}

impl AppendAggregationStrategy {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl AggregationStrategy for AppendAggregationStrategy {
    fn aggregate(&self, original: &Exchange, resource: Option<&Exchange>) -> Result<Exchange> {
        let mut result = original.copy();
        if let Some(resource) = resource {
            let joined = format!(
                "{}{}{}",
                original.message().body_as_string(),
                self.separator,
                value_to_string(&resource.result_message().body)
            );
            result.set_body(joined);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnrichError;
    use crate::exchange::Message;
    use serde_json::json;

    fn original() -> Exchange {
        let mut exchange = Exchange::new(Message::new("original").with_header("keep", "me"));
        exchange.set_property("trace", "t-1");
        exchange
    }

    #[test]
    fn test_copy_replaces_body_and_headers() {
        let original = original();
        let resource = Exchange::new(Message::new("reply").with_header("source", "db"));

        let result = CopyAggregationStrategy
            .aggregate(&original, Some(&resource))
            .unwrap();

        assert_eq!(result.id(), original.id());
        assert_eq!(result.body(), &json!("reply"));
        assert_eq!(result.header("source"), Some(&json!("db")));
        assert_eq!(result.header("keep"), None);
        assert_eq!(result.property("trace"), Some(&json!("t-1")));
    }

    #[test]
    fn test_copy_prefers_out_message() {
        let mut resource = Exchange::with_body("request");
        resource.set_out(Some(Message::new("response")));

        let result = CopyAggregationStrategy
            .aggregate(&original(), Some(&resource))
            .unwrap();
        assert_eq!(result.body(), &json!("response"));
        assert!(!result.has_out());
    }

    #[test]
    fn test_no_resource_keeps_original() {
        let original = original();
        for strategy in [
            &CopyAggregationStrategy as &dyn AggregationStrategy,
            &BodyAggregationStrategy,
            &AppendAggregationStrategy::new(","),
        ] {
            let result = strategy.aggregate(&original, None).unwrap();
            assert_eq!(result.message(), original.message());
        }
    }

    #[test]
    fn test_body_strategy_uses_exception_text() {
        let mut resource = Exchange::with_body("Kaboom");
        resource.set_exception(EnrichError::processing("I cannot do this"));

        let result = BodyAggregationStrategy
            .aggregate(&original(), Some(&resource))
            .unwrap();
        assert_eq!(result.body(), &json!("I cannot do this"));
        assert_eq!(result.header("keep"), Some(&json!("me")));
        assert!(!result.is_failed());
    }

    #[test]
    fn test_append_strategy() {
        let resource = Exchange::with_body(42);
        let result = AppendAggregationStrategy::new("+")
            .aggregate(&original(), Some(&resource))
            .unwrap();
        assert_eq!(result.body(), &json!("original+42"));
    }

    #[test]
    fn test_closure_strategy() {
        let strategy = strategy_fn(|original, resource| {
            let mut result = original.copy();
            result.set_header("enriched", resource.is_some());
            Ok(result)
        });

        let result = strategy.aggregate(&original(), None).unwrap();
        assert_eq!(result.header("enriched"), Some(&json!(false)));
    }
}
