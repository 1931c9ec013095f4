//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Hosts install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `strategy`: routing strategy: "network_first", "cache_first", "pass_through"
//! - `source`: where a served response came from: "network", "cache", "offline_fallback"
//! - `status`: outcome: "ok" or "error"

/// Total requests answered by the gateway.
///
/// Labels: `strategy`, `source`.
pub const REQUESTS_TOTAL: &str = "muninn_requests_total";

/// Total requests that produced no response at all.
///
/// Labels: `strategy`.
pub const REQUEST_FAILURES_TOTAL: &str = "muninn_request_failures_total";

/// Total lookups answered by the current generation.
///
/// Labels: `strategy`.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total lookups the current generation could not answer.
///
/// Labels: `strategy`.
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total network fetches that failed at the transport level.
///
/// Labels: `strategy`.
pub const NETWORK_FAILURES_TOTAL: &str = "muninn_network_failures_total";

/// Total synthetic offline documents served.
pub const OFFLINE_FALLBACKS_TOTAL: &str = "muninn_offline_fallbacks_total";

/// Total background cache writes that failed.
pub const WRITE_BACK_FAILURES_TOTAL: &str = "muninn_write_back_failures_total";

/// Total install attempts.
///
/// Labels: `status` ("ok" | "error").
pub const PRECACHE_TOTAL: &str = "muninn_precache_total";

/// Total stale generations removed during activation.
pub const GENERATIONS_DELETED_TOTAL: &str = "muninn_generations_deleted_total";
