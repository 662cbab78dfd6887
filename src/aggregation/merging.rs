use crate::aggregation::AggregationStrategy;
use crate::error::{EnrichError, Result};
use crate::exchange::Exchange;
use tracing::{debug, error};

/// Combine `original` with `resource` through `strategy` and write the
/// outcome back into `original`.
///
/// This is the only place the original exchange is mutated by an enrich step.
/// The strategy runs exactly once. When it fails, the original's message is
/// left as it was and the failure replaces any exception it carried.
pub fn merge(
    original: &mut Exchange,
    resource: Option<&Exchange>,
    strategy: &dyn AggregationStrategy,
) -> Result<()> {
    match strategy.aggregate(original, resource) {
        Ok(aggregated) => {
            debug!(
                exchange_id = %original.id(),
                with_resource = resource.is_some(),
                "Aggregated enrichment result"
            );
            copy_results(original, aggregated);
            Ok(())
        }
        Err(e) => {
            let err = match e {
                EnrichError::Aggregation(_) => e,
                other => EnrichError::Aggregation(other.to_string()),
            };
            error!(exchange_id = %original.id(), error = %err, "Aggregation strategy failed");
            original.set_exception(err.clone());
            Err(err)
        }
    }
}

/// Move the outcome of `source` into `target`, keeping `target`'s identity
/// and pattern.
///
/// Messages and the exception are replaced; properties are merged with
/// `source` winning. Completion callbacks are left alone.
pub fn copy_results(target: &mut Exchange, mut source: Exchange) {
    target.set_message(source.message().clone());
    target.set_out(source.out().cloned());
    match source.take_exception() {
        Some(exception) => target.set_exception(exception),
        None => target.clear_exception(),
    }
    for (name, value) in source.properties() {
        target.set_property(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{strategy_fn, CopyAggregationStrategy};
    use crate::exchange::{ExchangePattern, Message};
    use serde_json::json;

    #[test]
    fn test_merge_applies_strategy_result() {
        let mut original = Exchange::with_body("old").with_pattern(ExchangePattern::InOut);
        let id = original.id();
        let resource = Exchange::new(Message::new("new").with_header("h", 1));

        merge(&mut original, Some(&resource), &CopyAggregationStrategy).unwrap();

        assert_eq!(original.id(), id);
        assert_eq!(original.pattern(), ExchangePattern::InOut);
        assert_eq!(original.body(), &json!("new"));
        assert_eq!(original.header("h"), Some(&json!(1)));
    }

    #[test]
    fn test_merge_without_resource_is_noop() {
        let mut original = Exchange::new(Message::new("same").with_header("h", "v"));
        let before = original.message().clone();

        merge(&mut original, None, &CopyAggregationStrategy).unwrap();

        assert_eq!(original.message(), &before);
        assert!(!original.is_failed());
    }

    #[test]
    fn test_strategy_failure_overrides_exception() {
        let mut original = Exchange::with_body("untouched");
        original.set_exception(EnrichError::processing("earlier"));
        let resource = Exchange::with_body("ignored");

        let failing = strategy_fn(|_, _| Err(EnrichError::processing("bad merge")));
        let err = merge(&mut original, Some(&resource), failing.as_ref()).unwrap_err();

        assert_eq!(err, EnrichError::Aggregation("bad merge".to_string()));
        assert_eq!(original.exception(), Some(&err));
        assert_eq!(original.body(), &json!("untouched"));
    }

    #[test]
    fn test_strategy_can_keep_exception() {
        let mut original = Exchange::with_body("x");
        let mut resource = Exchange::with_body("y");
        resource.set_exception(EnrichError::processing("remote"));

        let keep = strategy_fn(|original, resource| {
            let mut result = original.copy();
            if let Some(e) = resource.and_then(|r| r.exception()) {
                result.set_exception(e.clone());
            }
            Ok(result)
        });
        merge(&mut original, Some(&resource), keep.as_ref()).unwrap();

        assert_eq!(original.exception(), Some(&EnrichError::processing("remote")));
    }

    #[test]
    fn test_copy_results_merges_properties() {
        let mut target = Exchange::with_body("t");
        target.set_property("a", 1);
        target.set_property("b", 1);

        let mut source = Exchange::with_body("s");
        source.set_property("b", 2);
        source.set_out(Some(Message::new("out")));

        copy_results(&mut target, source);

        assert_eq!(target.property("a"), Some(&json!(1)));
        assert_eq!(target.property("b"), Some(&json!(2)));
        assert_eq!(target.out().map(|m| m.body.clone()), Some(json!("out")));
    }
}
