//! Priority fee policy
//!
//! Computes the fee in sompi from the selection shape, the caller's
//! requested-fee hint, and the telemetry snapshot. Pure integer
//! arithmetic: amounts are u64 with u128 intermediates, staleness
//! discounts are basis points. No I/O happens here; every intermediate
//! component is reported in the breakdown so decisions stay auditable.

use crate::config::{FeeConfig, LagTierConfig};
use crate::types::{Freshness, TelemetrySnapshot};
use serde::{Deserialize, Serialize};

/// Fee computation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeMode {
    /// Configured constant, ignoring selection and telemetry
    Fixed,
    /// Proportional to the outputs total, rounded up
    OutputBps,
    /// Sum of structural and telemetry-derived components
    Adaptive,
}

impl FeeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeMode::Fixed => "fixed",
            FeeMode::OutputBps => "output_bps",
            FeeMode::Adaptive => "adaptive",
        }
    }
}

/// Inputs to one fee computation
#[derive(Debug, Clone)]
pub struct FeeInput<'a> {
    /// Caller-supplied floor for the adaptive fee
    pub requested_fee: Option<u64>,

    /// Sum of payment amounts in sompi
    pub outputs_total: u64,

    /// Number of payment outputs
    pub output_count: usize,

    /// Inputs chosen by the selection pass
    pub selected_input_count: usize,

    /// Whether selection stopped short of its target
    pub truncated_by_cap: bool,

    pub telemetry: &'a TelemetrySnapshot,
}

/// Every intermediate component of one fee decision
///
/// Telemetry-derived bonuses are reported post-discount; the factor that
/// was applied is carried alongside so the raw values can be recovered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub mode: String,
    pub base_fee: u64,
    pub per_input_cost: u64,
    pub fragmentation_bonus: u64,
    pub truncation_bonus: u64,
    pub congestion_bonus: u64,
    pub receipt_lag_bonus: u64,
    pub scheduler_lag_bonus: u64,
    pub freshness: Option<Freshness>,
    pub freshness_factor_bps: u64,
    pub computed_fee: u64,
    pub requested_fee: Option<u64>,
    pub final_fee: u64,
}

/// Ceiling division of `total * bps / 10_000` without overflow
fn bps_of(total: u64, bps: u64) -> u64 {
    let scaled = total as u128 * bps as u128;
    ((scaled + 9_999) / 10_000) as u64
}

/// Scale a component by a basis-point factor, rounding down
fn discount(value: u64, factor_bps: u64) -> u64 {
    ((value as u128 * factor_bps as u128) / 10_000) as u64
}

/// Three-tier lag bonus: zero below high, half between high and critical,
/// full at or above critical
fn lag_bonus(tier: &LagTierConfig, observed_ms: Option<u64>) -> u64 {
    match observed_ms {
        None => 0,
        Some(ms) if ms < tier.high_ms => 0,
        Some(ms) if ms < tier.critical_ms => tier.bonus / 2,
        Some(_) => tier.bonus,
    }
}

/// Compute the fee for one build request
pub fn compute_fee(input: &FeeInput<'_>, config: &FeeConfig) -> (u64, FeeBreakdown) {
    match config.mode {
        FeeMode::Fixed => {
            let fee = config.fixed_fee;
            let breakdown = FeeBreakdown {
                mode: config.mode.as_str().to_string(),
                computed_fee: fee,
                requested_fee: input.requested_fee,
                final_fee: fee,
                ..FeeBreakdown::default()
            };
            (fee, breakdown)
        }
        FeeMode::OutputBps => {
            let fee = bps_of(input.outputs_total, config.output_bps);
            let breakdown = FeeBreakdown {
                mode: config.mode.as_str().to_string(),
                computed_fee: fee,
                requested_fee: input.requested_fee,
                final_fee: fee,
                ..FeeBreakdown::default()
            };
            (fee, breakdown)
        }
        FeeMode::Adaptive => compute_adaptive(input, config),
    }
}

fn compute_adaptive(input: &FeeInput<'_>, config: &FeeConfig) -> (u64, FeeBreakdown) {
    let tuning = &config.adaptive;
    let telemetry = input.telemetry;

    // Structural components depend only on the selection itself and are
    // never discounted by freshness
    let per_input_cost =
        (tuning.per_input_fee as u128 * input.selected_input_count as u128).min(u64::MAX as u128) as u64;
    let fragmentation_bonus = if input.selected_input_count > tuning.fragmentation_threshold_inputs {
        tuning.fragmentation_bonus
    } else {
        0
    };
    let truncation_bonus = if input.truncated_by_cap { tuning.truncation_bonus } else { 0 };

    let freshness = telemetry.freshness();
    let factor_bps = match freshness {
        Freshness::Fresh => 10_000,
        Freshness::StaleSoft => tuning.stale_soft_factor_bps,
        Freshness::StaleHard => tuning.stale_hard_factor_bps,
    };

    let congestion_raw = match telemetry.daa_congestion_pct {
        Some(pct) => (tuning.congestion_bonus_max as u128 * pct.min(100) as u128 / 100) as u64,
        None => 0,
    };
    let receipt_raw = lag_bonus(&tuning.receipt_lag, telemetry.receipt_lag_p95_ms);
    let scheduler_raw =
        lag_bonus(&tuning.scheduler_lag, telemetry.scheduler_callback_latency_p95_ms);

    let congestion_bonus = discount(congestion_raw, factor_bps);
    let receipt_lag_bonus = discount(receipt_raw, factor_bps);
    let scheduler_lag_bonus = discount(scheduler_raw, factor_bps);

    let computed_fee = tuning
        .base_fee
        .saturating_add(per_input_cost)
        .saturating_add(fragmentation_bonus)
        .saturating_add(truncation_bonus)
        .saturating_add(congestion_bonus)
        .saturating_add(receipt_lag_bonus)
        .saturating_add(scheduler_lag_bonus);

    // The caller's hint is a floor, never a discount
    let final_fee = match input.requested_fee {
        Some(hint) => computed_fee.max(hint),
        None => computed_fee,
    };

    let breakdown = FeeBreakdown {
        mode: config.mode.as_str().to_string(),
        base_fee: tuning.base_fee,
        per_input_cost,
        fragmentation_bonus,
        truncation_bonus,
        congestion_bonus,
        receipt_lag_bonus,
        scheduler_lag_bonus,
        freshness: Some(freshness),
        freshness_factor_bps: factor_bps,
        computed_fee,
        requested_fee: input.requested_fee,
        final_fee,
    };
    (final_fee, breakdown)
}
