//! Telemetry summary sources and snapshot merging
//!
//! Two independently configured endpoints supply congestion and latency
//! summaries: the callback-consumer receipts summary and the scheduler
//! summary. Each is optional; a disabled source simply leaves its fields
//! unset. Fetches are bounded by a per-call timeout and go through the
//! single-flight cache, never directly from request handling.

use crate::telemetry::cache::{CachedSummary, FetchError, SummaryFetch};
use crate::types::{Freshness, TelemetrySnapshot};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Receipts/confirmation summary, as served by the callback consumer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptsSummary {
    pub confirm_latency_p95_ms: Option<u64>,
    pub receipt_lag_p95_ms: Option<u64>,
}

/// Scheduler saturation and callback latency summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub saturation_pct: Option<u8>,
    pub callback_latency_p95_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct P95Bucket {
    p95: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptsWire {
    confirmation_latency_ms: Option<P95Bucket>,
    receipt_lag_ms: Option<P95Bucket>,
}

#[derive(Debug, Deserialize)]
struct ReceiptsEnvelope {
    receipts: Option<ReceiptsWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchedulerWire {
    saturation_proxy_pct: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbacksWire {
    latency_p95_bucket_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SchedulerEnvelope {
    scheduler: Option<SchedulerWire>,
    callbacks: Option<CallbacksWire>,
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<T, FetchError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Unavailable(e.to_string())
            }
        })?
        .error_for_status()
        .map_err(|e| FetchError::Unavailable(e.to_string()))?;
    response.json::<T>().await.map_err(|e| FetchError::Decode(e.to_string()))
}

/// Fetcher for the receipts summary endpoint
pub struct ReceiptsSummaryFetcher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ReceiptsSummaryFetcher {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self { client, url, timeout }
    }
}

#[async_trait]
impl SummaryFetch<ReceiptsSummary> for ReceiptsSummaryFetcher {
    async fn fetch(&self) -> Result<ReceiptsSummary, FetchError> {
        let envelope: ReceiptsEnvelope = fetch_json(&self.client, &self.url, self.timeout).await?;
        let receipts = envelope.receipts.unwrap_or(ReceiptsWire {
            confirmation_latency_ms: None,
            receipt_lag_ms: None,
        });
        Ok(ReceiptsSummary {
            confirm_latency_p95_ms: receipts.confirmation_latency_ms.and_then(|b| b.p95),
            receipt_lag_p95_ms: receipts.receipt_lag_ms.and_then(|b| b.p95),
        })
    }
}

/// Fetcher for the scheduler summary endpoint
pub struct SchedulerSummaryFetcher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl SchedulerSummaryFetcher {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self { client, url, timeout }
    }
}

#[async_trait]
impl SummaryFetch<SchedulerSummary> for SchedulerSummaryFetcher {
    async fn fetch(&self) -> Result<SchedulerSummary, FetchError> {
        let envelope: SchedulerEnvelope = fetch_json(&self.client, &self.url, self.timeout).await?;
        Ok(SchedulerSummary {
            saturation_pct: envelope.scheduler.and_then(|s| s.saturation_proxy_pct),
            callback_latency_p95_ms: envelope.callbacks.and_then(|c| c.latency_p95_bucket_ms),
        })
    }
}

/// One source's contribution to a request snapshot
#[derive(Debug, Clone)]
pub enum SourceReading<T> {
    /// Source not configured; contributes nothing
    Disabled,
    /// Source configured but nothing has ever been fetched
    Unavailable,
    /// Cached value with its freshness classification
    Available(CachedSummary<T>),
}

/// Merge a caller-supplied partial snapshot with the cached summaries
///
/// Caller-supplied fields win and count as fresh. A cache-derived field
/// degrades the overall freshness to its source's classification; a
/// configured-but-never-fetched source degrades to hard-stale, but only
/// when the caller left one of its fields unset.
pub fn merge_snapshot(
    caller: &TelemetrySnapshot,
    receipts: SourceReading<ReceiptsSummary>,
    scheduler: SourceReading<SchedulerSummary>,
) -> TelemetrySnapshot {
    let mut merged = caller.clone();
    let mut freshness = Freshness::Fresh;

    let receipts_needed =
        merged.observed_confirm_latency_p95_ms.is_none() || merged.receipt_lag_p95_ms.is_none();
    if receipts_needed {
        match receipts {
            SourceReading::Disabled => {}
            SourceReading::Unavailable => freshness = freshness.worst(Freshness::StaleHard),
            SourceReading::Available(summary) => {
                if merged.observed_confirm_latency_p95_ms.is_none() {
                    merged.observed_confirm_latency_p95_ms = summary.value.confirm_latency_p95_ms;
                }
                if merged.receipt_lag_p95_ms.is_none() {
                    merged.receipt_lag_p95_ms = summary.value.receipt_lag_p95_ms;
                }
                freshness = freshness.worst(summary.freshness);
            }
        }
    }

    let scheduler_needed =
        merged.daa_congestion_pct.is_none() || merged.scheduler_callback_latency_p95_ms.is_none();
    if scheduler_needed {
        match scheduler {
            SourceReading::Disabled => {}
            SourceReading::Unavailable => freshness = freshness.worst(Freshness::StaleHard),
            SourceReading::Available(summary) => {
                if merged.daa_congestion_pct.is_none() {
                    merged.daa_congestion_pct = summary.value.saturation_pct;
                }
                if merged.scheduler_callback_latency_p95_ms.is_none() {
                    merged.scheduler_callback_latency_p95_ms = summary.value.callback_latency_p95_ms;
                }
                freshness = freshness.worst(summary.freshness);
            }
        }
    }

    merged.freshness = Some(freshness);
    merged
}
