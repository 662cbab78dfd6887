use crate::endpoint::{Endpoint, EndpointResolver};
use crate::error::{EnrichError, Result};
use crate::exchange::Exchange;
use crate::expression::Expression;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// The endpoint an enrich step will talk to
#[derive(Clone)]
pub struct ResolvedEndpoint {
    pub uri: String,
    pub endpoint: Arc<dyn Endpoint>,
}

impl fmt::Debug for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEndpoint")
            .field("uri", &self.uri)
            .finish()
    }
}

/// Picks the endpoint for each exchange from an expression and a resolver
#[derive(Clone)]
pub struct EndpointSelector {
    expression: Arc<dyn Expression>,
    resolver: Arc<dyn EndpointResolver>,
    ignore_invalid_endpoint: bool,
    memoize: bool,
}

impl EndpointSelector {
    pub fn new(expression: Arc<dyn Expression>, resolver: Arc<dyn EndpointResolver>) -> Self {
        Self {
            expression,
            resolver,
            ignore_invalid_endpoint: false,
            memoize: true,
        }
    }

    /// With memoization off every selection resolves the URI afresh
    pub fn set_memoize(&mut self, memoize: bool) {
        self.memoize = memoize;
    }

    pub fn set_ignore_invalid_endpoint(&mut self, ignore: bool) {
        self.ignore_invalid_endpoint = ignore;
    }

    pub fn ignore_invalid_endpoint(&self) -> bool {
        self.ignore_invalid_endpoint
    }

    /// Evaluate the expression against `exchange` and resolve the URI.
    ///
    /// Returns `Ok(None)` when resolution failed and invalid endpoints are
    /// ignored.
    pub fn select(&self, exchange: &Exchange) -> Result<Option<ResolvedEndpoint>> {
        match self.try_select(exchange) {
            Ok(resolved) => {
                debug!(
                    exchange_id = %exchange.id(),
                    uri = %resolved.uri,
                    "Resolved enrich endpoint"
                );
                Ok(Some(resolved))
            }
            Err(e) if self.ignore_invalid_endpoint => {
                warn!(
                    exchange_id = %exchange.id(),
                    error = %e,
                    "Ignoring invalid endpoint"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn try_select(&self, exchange: &Exchange) -> Result<ResolvedEndpoint> {
        let uri = self
            .expression
            .evaluate_string(exchange)
            .map_err(|e| match e {
                EnrichError::Expression(_) | EnrichError::Resolution { .. } => e,
                other => EnrichError::Expression(other.to_string()),
            })?;

        let uri = uri.trim();
        if uri.is_empty() {
            return Err(EnrichError::Expression(
                "endpoint expression evaluated to an empty value".to_string(),
            ));
        }

        let endpoint = if self.memoize {
            self.resolver.resolve(uri)?
        } else {
            self.resolver.resolve_uncached(uri)?
        };
        Ok(ResolvedEndpoint {
            uri: endpoint.uri().to_string(),
            endpoint,
        })
    }
}
