//! Registry of components and the endpoints they created.

use crate::endpoint::{CacheMode, Component, Endpoint, EndpointResolver};
use crate::error::{EnrichError, Result};
use dashmap::DashMap;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolved endpoints kept by [`EndpointRegistry::new`]
pub const DEFAULT_ENDPOINT_CACHE_SIZE: i64 = 1000;

/// Resolves endpoint URIs through registered components.
///
/// Endpoints are memoized by URI in an LRU cache sized like the handle
/// caches (see [`CacheMode::from_size`]). Concurrent first resolutions of a
/// URI share a single call to the component.
pub struct EndpointRegistry {
    /// Map of URI scheme to component
    components: DashMap<String, Arc<dyn Component>>,

    /// Endpoint URI to endpoint instance, absent when memoization is disabled
    endpoints: Option<Cache<String, Arc<dyn Endpoint>>>,
}

impl EndpointRegistry {
    /// Create an empty registry memoizing up to [`DEFAULT_ENDPOINT_CACHE_SIZE`] endpoints
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_ENDPOINT_CACHE_SIZE)
    }

    /// Create an empty registry with its own endpoint cache size
    pub fn with_cache_size(size: i64) -> Self {
        let endpoints = match CacheMode::from_size(size) {
            CacheMode::Disabled => None,
            CacheMode::Unbounded => Some(Cache::builder().build()),
            CacheMode::Bounded(capacity) => Some(
                Cache::builder()
                    .max_capacity(capacity)
                    .eviction_policy(EvictionPolicy::lru())
                    .build(),
            ),
        };

        Self {
            components: DashMap::new(),
            endpoints,
        }
    }

    /// Register a component under a URI scheme, replacing any previous one
    pub fn add_component(&self, scheme: impl Into<String>, component: Arc<dyn Component>) {
        let scheme = scheme.into();
        info!(scheme = %scheme, "Registered component");
        self.components.insert(scheme, component);
    }

    /// Builder-style variant of [`add_component`](Self::add_component)
    pub fn with_component(self, scheme: impl Into<String>, component: Arc<dyn Component>) -> Self {
        self.add_component(scheme, component);
        self
    }

    /// Remove a component. Endpoints it already created stay memoized.
    pub fn remove_component(&self, scheme: &str) -> Option<Arc<dyn Component>> {
        debug!(scheme = %scheme, "Removing component from registry");
        self.components.remove(scheme).map(|(_, component)| component)
    }

    pub fn has_component(&self, scheme: &str) -> bool {
        self.components.contains_key(scheme)
    }

    /// Get an already resolved endpoint
    pub fn endpoint(&self, uri: &str) -> Option<Arc<dyn Endpoint>> {
        self.endpoints.as_ref()?.get(uri.trim())
    }

    /// Forget a resolved endpoint
    pub fn remove_endpoint(&self, uri: &str) -> Option<Arc<dyn Endpoint>> {
        self.endpoints.as_ref()?.remove(uri.trim())
    }

    /// URIs of all resolved endpoints
    pub fn list_uris(&self) -> Vec<String> {
        self.endpoints.as_ref().map_or_else(Vec::new, |cache| {
            cache.iter().map(|(uri, _)| uri.as_ref().clone()).collect()
        })
    }

    /// Number of resolved endpoints, after pending evictions
    pub fn endpoint_count(&self) -> u64 {
        self.endpoints.as_ref().map_or(0, |cache| {
            cache.run_pending_tasks();
            cache.entry_count()
        })
    }

    /// Forget all resolved endpoints
    pub fn clear(&self) {
        info!("Clearing all endpoints from registry");
        if let Some(cache) = &self.endpoints {
            cache.invalidate_all();
            cache.run_pending_tasks();
        }
    }

    fn split_uri(uri: &str) -> Result<(&str, &str)> {
        let (scheme, remaining) = uri
            .split_once(':')
            .ok_or_else(|| EnrichError::resolution(uri, "missing scheme"))?;
        let remaining = remaining.trim_start_matches("//");

        if scheme.is_empty() {
            return Err(EnrichError::resolution(uri, "empty scheme"));
        }
        if remaining.is_empty() {
            return Err(EnrichError::resolution(uri, "empty endpoint path"));
        }

        Ok((scheme, remaining))
    }

    fn create_endpoint(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        let (scheme, remaining) = Self::split_uri(uri)?;
        let component = self
            .components
            .get(scheme)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                EnrichError::resolution(uri, format!("no component found for scheme '{}'", scheme))
            })?;

        let endpoint = component.create_endpoint(uri, remaining)?;
        debug!(uri = %uri, "Resolved new endpoint");
        Ok(endpoint)
    }

    fn checked_uri(uri: &str) -> Result<&str> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(EnrichError::resolution(uri, "empty endpoint uri"));
        }
        Ok(uri)
    }
}

impl EndpointResolver for EndpointRegistry {
    fn resolve(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        let uri = Self::checked_uri(uri)?;
        let Some(cache) = &self.endpoints else {
            return self.create_endpoint(uri);
        };

        cache
            .entry_by_ref(uri)
            .or_try_insert_with(|| self.create_endpoint(uri))
            .map(|entry| entry.into_value())
            .map_err(|e: Arc<EnrichError>| (*e).clone())
    }

    fn resolve_uncached(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        let uri = Self::checked_uri(uri)?;
        self.create_endpoint(uri)
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}
