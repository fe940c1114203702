//! Resolver metrics for observability and operational monitoring.
//!
//! [`ResolverMetrics`] is a pluggable trait with no-op defaults. Two
//! implementations are included:
//!
//! - [`NoopResolverMetrics`]: the default, discards everything.
//! - [`MetricsResolverMetrics`]: forwards to the [`metrics`](https://docs.rs/metrics) crate facade
//!   and whatever recorder the embedding application installed.
//!
//! # Metric Names
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `vdr_resolver_resolutions_total` | Counter | `outcome` | DID resolutions by outcome |
//! | `vdr_resolver_resolution_duration_seconds` | Histogram | `outcome` | Resolution latency |
//! | `vdr_resolver_cache_lookups_total` | Counter | `result` | DID cache hits and misses |
//! | `vdr_resolver_connections_total` | Counter | `pool`, `event` | Pool connection lifecycle events |
//! | `vdr_resolver_pool_requests_total` | Counter | `pool`, `operation`, `status` | Requests submitted to pools |

use std::{fmt, sync::Arc, time::Duration};

use crate::client::RequestKind;

/// Pool connection lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection was established.
    Connected,
    /// A connection was closed.
    Disconnected,
    /// A connection attempt failed.
    Failed,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a resolution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Answered from the DID cache without network traffic.
    CacheHit,
    /// Answered by querying the pools.
    Resolved,
    /// The DID is on none of the pools.
    NotFound,
    /// Resolution failed.
    Failed,
}

impl fmt::Display for ResolutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheHit => write!(f, "cache_hit"),
            Self::Resolved => write!(f, "resolved"),
            Self::NotFound => write!(f, "not_found"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Trait for resolver metrics collection.
///
/// All methods default to no-ops; override the ones you need. Implementations
/// are shared across pools and concurrent resolutions, hence `Send + Sync`.
pub trait ResolverMetrics: Send + Sync + fmt::Debug {
    /// Records a finished top-level resolution.
    fn record_resolution(&self, outcome: ResolutionOutcome, duration: Duration) {
        let _ = (outcome, duration);
    }

    /// Records a DID cache lookup.
    fn record_cache_lookup(&self, hit: bool) {
        let _ = hit;
    }

    /// Records a pool connection lifecycle event.
    fn record_connection(&self, pool_id: &str, event: ConnectionEvent) {
        let _ = (pool_id, event);
    }

    /// Records a request submitted to a pool. `success` is false for client
    /// failures, rejections and negative acknowledgements.
    fn record_pool_request(&self, pool_id: &str, operation: RequestKind, success: bool) {
        let _ = (pool_id, operation, success);
    }
}

/// No-op metrics implementation.
#[derive(Debug, Clone, Copy)]
pub struct NoopResolverMetrics;

impl ResolverMetrics for NoopResolverMetrics {}

/// Metrics implementation using the [`metrics`](https://docs.rs/metrics) crate facade.
///
/// All metric names use the `vdr_resolver_` prefix.
#[derive(Debug, Clone, Copy)]
pub struct MetricsResolverMetrics;

mod metric_names {
    pub const RESOLUTIONS_TOTAL: &str = "vdr_resolver_resolutions_total";
    pub const RESOLUTION_DURATION: &str = "vdr_resolver_resolution_duration_seconds";
    pub const CACHE_LOOKUPS_TOTAL: &str = "vdr_resolver_cache_lookups_total";
    pub const CONNECTIONS_TOTAL: &str = "vdr_resolver_connections_total";
    pub const POOL_REQUESTS_TOTAL: &str = "vdr_resolver_pool_requests_total";
}

impl ResolverMetrics for MetricsResolverMetrics {
    fn record_resolution(&self, outcome: ResolutionOutcome, duration: Duration) {
        metrics::counter!(metric_names::RESOLUTIONS_TOTAL, "outcome" => outcome.to_string())
            .increment(1);
        metrics::histogram!(metric_names::RESOLUTION_DURATION, "outcome" => outcome.to_string())
            .record(duration.as_secs_f64());
    }

    fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        metrics::counter!(metric_names::CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
    }

    fn record_connection(&self, pool_id: &str, event: ConnectionEvent) {
        metrics::counter!(
            metric_names::CONNECTIONS_TOTAL,
            "pool" => pool_id.to_owned(),
            "event" => event.to_string(),
        )
        .increment(1);
    }

    fn record_pool_request(&self, pool_id: &str, operation: RequestKind, success: bool) {
        let status = if success { "success" } else { "error" };
        metrics::counter!(
            metric_names::POOL_REQUESTS_TOTAL,
            "pool" => pool_id.to_owned(),
            "operation" => operation.to_string(),
            "status" => status,
        )
        .increment(1);
    }
}

/// Creates the default metrics instance (no-op).
pub(crate) fn default_metrics() -> Arc<dyn ResolverMetrics> {
    Arc::new(NoopResolverMetrics)
}
