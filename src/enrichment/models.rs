use crate::endpoint::CacheMode;
use crate::error::{EnrichError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Configuration for the active (send based) enricher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Producer cache size: negative is unbounded, 0 disables caching
    #[serde(default = "default_cache_size")]
    pub cache_size: i64,

    /// Pass the exchange through unchanged when the endpoint cannot be resolved
    #[serde(default)]
    pub ignore_invalid_endpoint: bool,

    /// Hand a failed secondary exchange to the strategy instead of failing
    #[serde(default)]
    pub aggregate_on_exception: bool,

    /// Run the secondary exchange's completions when the original completes
    #[serde(default)]
    pub share_unit_of_work: bool,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
            ignore_invalid_endpoint: false,
            aggregate_on_exception: false,
            share_unit_of_work: false,
        }
    }
}

impl EnrichConfig {
    pub fn validate(&self) -> Result<()> {
        validate_cache_size(self.cache_size)
    }

    pub fn cache_mode(&self) -> CacheMode {
        CacheMode::from_size(self.cache_size)
    }
}

/// Configuration for the passive (poll based) enricher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollEnrichConfig {
    /// Consumer cache size: negative is unbounded, 0 disables caching
    #[serde(default = "default_cache_size")]
    pub cache_size: i64,

    /// Receive timeout in milliseconds: negative waits forever, 0 does not wait
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,

    /// Treat an unresolvable endpoint as "no data" instead of failing
    #[serde(default)]
    pub ignore_invalid_endpoint: bool,

    /// Hand a failed polled exchange to the strategy instead of failing
    #[serde(default)]
    pub aggregate_on_exception: bool,
}

impl Default for PollEnrichConfig {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
            timeout_ms: default_timeout_ms(),
            ignore_invalid_endpoint: false,
            aggregate_on_exception: false,
        }
    }
}

impl PollEnrichConfig {
    pub fn validate(&self) -> Result<()> {
        validate_cache_size(self.cache_size)
    }

    pub fn cache_mode(&self) -> CacheMode {
        CacheMode::from_size(self.cache_size)
    }

    /// How long a poll may wait
    pub fn poll_timeout(&self) -> PollTimeout {
        PollTimeout::from_millis(self.timeout_ms)
    }
}

/// Receive policy derived from the configured timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTimeout {
    /// Block until an exchange arrives
    Forever,
    /// Take what is there right now
    NoWait,
    /// Block at most this long
    Within(Duration),
}

impl PollTimeout {
    pub fn from_millis(timeout_ms: i64) -> Self {
        match timeout_ms {
            t if t < 0 => PollTimeout::Forever,
            0 => PollTimeout::NoWait,
            t => PollTimeout::Within(Duration::from_millis(t as u64)),
        }
    }
}

fn default_cache_size() -> i64 {
    1000
}

fn default_timeout_ms() -> i64 {
    -1
}

fn validate_cache_size(cache_size: i64) -> Result<()> {
    if cache_size > u32::MAX as i64 {
        return Err(EnrichError::Configuration(format!(
            "cache_size must not exceed {}, got {}",
            u32::MAX,
            cache_size
        )));
    }
    Ok(())
}

/// Running counters of one enricher
#[derive(Debug, Default)]
pub struct EnrichStats {
    total: AtomicU64,
    aggregated: AtomicU64,
    no_data: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
    total_duration_us: AtomicU64,
    last_enriched_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
}

/// How an enrich attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EnrichOutcome {
    /// The strategy merged a resource into the original
    Aggregated,
    /// The strategy ran without a resource
    NoData,
    /// The original ended with an exception
    Failed,
    /// Invalid endpoint ignored, exchange passed through
    Skipped,
}

impl EnrichStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: EnrichOutcome, elapsed: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            EnrichOutcome::Aggregated => &self.aggregated,
            EnrichOutcome::NoData => &self.no_data,
            EnrichOutcome::Failed => &self.failures,
            EnrichOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_duration_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        *self.last_enriched_at.write() = Some(Utc::now());
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> EnrichStatsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let total_duration_us = self.total_duration_us.load(Ordering::Relaxed);

        EnrichStatsSnapshot {
            total,
            aggregated: self.aggregated.load(Ordering::Relaxed),
            no_data: self.no_data.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            average_duration_us: if total > 0 {
                total_duration_us / total
            } else {
                0
            },
            last_enriched_at: *self.last_enriched_at.read(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total,
            &self.aggregated,
            &self.no_data,
            &self.failures,
            &self.skipped,
            &self.total_duration_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.last_enriched_at.write() = None;
    }
}

/// Serializable snapshot of [`EnrichStats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichStatsSnapshot {
    pub total: u64,
    pub aggregated: u64,
    pub no_data: u64,
    pub failures: u64,
    pub skipped: u64,
    pub average_duration_us: u64,
    pub last_enriched_at: Option<DateTime<Utc>>,
}
