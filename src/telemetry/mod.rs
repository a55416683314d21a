//! Telemetry summary caching and merging
//!
//! Congestion and latency signals arrive from two remote summary
//! endpoints, each fronted by a TTL-bounded single-flight cache. The
//! build pipeline consumes one merged [`TelemetrySnapshot`] per request;
//! source failures degrade freshness instead of failing the build.
//!
//! [`TelemetrySnapshot`]: crate::types::TelemetrySnapshot

pub mod cache;
pub mod sources;

pub use cache::{CachedSummary, Clock, FetchError, ManualClock, MonotonicClock, SummaryCache, SummaryFetch};
pub use sources::{
    merge_snapshot, ReceiptsSummary, ReceiptsSummaryFetcher, SchedulerSummary,
    SchedulerSummaryFetcher, SourceReading,
};
