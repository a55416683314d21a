//! Build orchestration
//!
//! Drives one build request through validation, telemetry resolution,
//! UTXO fetch, the selection/fee fixed point (bounded at one
//! re-selection), assembly, and the two-attempt fallback state machine.
//! Collaborators are constructor-injected so the whole pipeline runs
//! against in-memory fakes in tests.

use crate::builder::assemble::{AssembleRequest, AssembledTransaction, TransactionAssembler};
use crate::builder::errors::BuildError;
use crate::builder::fee::{compute_fee, FeeBreakdown, FeeInput};
use crate::builder::selection::{SelectionPlan, Selector};
use crate::config::PolicyConfig;
use crate::indexer::UtxoProvider;
use crate::metrics::Metrics;
use crate::telemetry::{
    merge_snapshot, ReceiptsSummary, SchedulerSummary, SourceReading, SummaryCache,
};
use crate::types::{Address, Freshness, NetworkId, PaymentOutput, TelemetrySnapshot};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Inbound build request, validated in step 1
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub from_address: String,
    pub network_id: String,
    pub outputs: Vec<RequestedOutput>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub requested_fee_in_base_unit: Option<u64>,
    #[serde(default)]
    pub telemetry: Option<TelemetrySnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedOutput {
    pub address: String,
    pub amount_in_base_unit: u64,
}

/// Record of a fallback attempt, kept for diagnosis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackTrace {
    /// Why the policy-optimal attempt failed
    pub primary_error: String,
    /// Inputs used by the fallback attempt
    pub inputs_used: usize,
}

/// Structured explanation of every decision made for one build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTrace {
    pub selection_mode: String,
    /// 1 when the first pass covered the fee, 2 when a re-selection ran
    pub selection_passes: u8,
    pub coinbase_inputs: usize,
    pub truncated_by_cap: bool,
    pub fee: FeeBreakdown,
    pub freshness: Freshness,
    /// Sub-dust change folded into the fee by the assembler
    pub change_folded: u64,
    pub fallback: Option<FallbackTrace>,
}

/// Outcome of a successful build
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Base64 wire payload for the external signer
    pub serialized_transaction: String,
    pub fee_paid: u64,
    pub inputs_used: usize,
    pub total_inputs_available: usize,
    pub truncated_by_cap: bool,
    pub fallback_used: bool,
    pub trace: PolicyTrace,
}

/// The two construction attempts, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Optimal,
    AllInputs,
}

impl Attempt {
    fn as_str(&self) -> &'static str {
        match self {
            Attempt::Optimal => "optimal",
            Attempt::AllInputs => "all_inputs",
        }
    }
}

/// Composes selection, fee, telemetry, and assembly into one build flow
pub struct BuildOrchestrator {
    policy: ArcSwap<PolicyConfig>,
    provider: Arc<dyn UtxoProvider>,
    assembler: Arc<dyn TransactionAssembler>,
    receipts: Option<SummaryCache<ReceiptsSummary>>,
    scheduler: Option<SummaryCache<SchedulerSummary>>,
    metrics: Arc<Metrics>,
}

impl BuildOrchestrator {
    pub fn new(
        policy: PolicyConfig,
        provider: Arc<dyn UtxoProvider>,
        assembler: Arc<dyn TransactionAssembler>,
        receipts: Option<SummaryCache<ReceiptsSummary>>,
        scheduler: Option<SummaryCache<SchedulerSummary>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            policy: ArcSwap::from_pointee(policy),
            provider,
            assembler,
            receipts,
            scheduler,
            metrics,
        }
    }

    /// Replace the policy between requests; in-flight builds keep the
    /// policy they loaded
    pub fn swap_policy(&self, policy: PolicyConfig) {
        self.policy.store(Arc::new(policy));
    }

    /// Build one transaction, recording metrics for either outcome
    pub async fn build(&self, request: BuildRequest) -> Result<BuildResult, BuildError> {
        self.metrics.builds_total.inc();
        let started = Instant::now();
        let result = self.build_inner(request).await;
        self.metrics.build_latency.observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(built) => {
                self.metrics.builds_success.inc();
                self.metrics.inputs_selected_total.inc_by(built.inputs_used as u64);
                if built.fallback_used {
                    self.metrics.fallback_success.inc();
                }
            }
            Err(err) => {
                self.metrics.builds_failed.with_label_values(&[err.category()]).inc();
            }
        }
        result
    }

    async fn build_inner(&self, request: BuildRequest) -> Result<BuildResult, BuildError> {
        let policy = self.policy.load_full();

        // Step 1: validate and normalize all caller input
        let network: NetworkId = request
            .network_id
            .parse()
            .map_err(|e: crate::types::ParseError| BuildError::InvalidRequest(e.to_string()))?;
        let from_address = Address::parse(&request.from_address, network)
            .map_err(|e| BuildError::InvalidRequest(format!("fromAddress: {e}")))?;
        let payments = validate_outputs(&request.outputs, network)?;
        let outputs_total = payments.iter().try_fold(0u64, |acc, p| acc.checked_add(p.amount))
            .ok_or_else(|| BuildError::InvalidRequest("outputs total overflows".to_string()))?;

        debug!(
            address = %from_address,
            outputs = payments.len(),
            total = outputs_total,
            purpose = request.purpose.as_deref().unwrap_or("-"),
            "build request accepted"
        );

        // Step 2: resolve the effective telemetry snapshot
        let caller_snapshot = request.telemetry.clone().unwrap_or_default();
        let telemetry = merge_snapshot(
            &caller_snapshot,
            read_source(&self.receipts).await,
            read_source(&self.scheduler).await,
        );

        // Step 3: fetch spendable outputs; an unreachable indexer is
        // fatal for the request, an empty answer means an unfunded address
        let candidates = self
            .provider
            .utxos_for_address(&from_address)
            .await
            .map_err(|e| BuildError::IndexerUnavailable(e.to_string()))?;
        let total_inputs_available = candidates.len();
        if candidates.is_empty() {
            return Err(BuildError::NoSpendableOutputs { address: from_address.to_string() });
        }

        self.metrics
            .selection_mode
            .with_label_values(&[policy.selection.mode.as_str()])
            .inc();
        self.metrics.fee_mode.with_label_values(&[policy.fee.mode.as_str()]).inc();

        // Step 4: selection and fee, a fixed point bounded at one
        // re-selection pass
        let mut selector =
            Selector::new(policy.selection.mode, candidates, policy.selection.max_inputs);
        selector.extend_to(outputs_total);
        let first_pass_count = selector.selected_count();

        let fee_input = FeeInput {
            requested_fee: request.requested_fee_in_base_unit,
            outputs_total,
            output_count: payments.len(),
            selected_input_count: first_pass_count,
            truncated_by_cap: selector.selected_amount() < outputs_total,
            telemetry: &telemetry,
        };
        let (mut fee, mut breakdown) = compute_fee(&fee_input, &policy.fee);

        let mut selection_passes = 1u8;
        let required_target = outputs_total.saturating_add(fee);
        if selector.selected_amount() < required_target {
            selector.extend_to(required_target);
            selection_passes = 2;
            if selector.selected_count() != first_pass_count {
                // The appended inputs change the selection shape; price
                // the final shape, but never select a third time
                let fee_input = FeeInput {
                    selected_input_count: selector.selected_count(),
                    truncated_by_cap: selector.selected_amount() < required_target,
                    ..fee_input
                };
                (fee, breakdown) = compute_fee(&fee_input, &policy.fee);
            }
        }
        let required_target = outputs_total.saturating_add(fee);
        let plan = selector.plan(required_target);
        if plan.truncated_by_cap {
            self.metrics.selection_truncated.inc();
            warn!(
                selected = plan.selected_amount,
                required = required_target,
                inputs = plan.inputs.len(),
                "selection fell short of target, relying on fallback"
            );
        }

        // Steps 5-7: two-attempt construction state machine
        let (assembled, fallback_trace, attempt) = self.construct(
            &plan,
            &mut selector,
            &payments,
            &from_address,
            fee,
            request.requested_fee_in_base_unit,
            &telemetry,
            &policy,
            outputs_total,
        )?;

        // Step 8: attach the decision trace
        let trace = PolicyTrace {
            selection_mode: policy.selection.mode.as_str().to_string(),
            selection_passes,
            coinbase_inputs: plan.coinbase_inputs(),
            truncated_by_cap: plan.truncated_by_cap,
            fee: breakdown,
            freshness: telemetry.freshness(),
            change_folded: assembled.change_folded,
            fallback: fallback_trace,
        };

        let inputs_used = assembled.transaction.inputs.len();
        info!(
            inputs = inputs_used,
            fee = assembled.fee_paid,
            attempt = attempt.as_str(),
            freshness = telemetry.freshness().as_str(),
            "transaction constructed"
        );

        Ok(BuildResult {
            serialized_transaction: assembled.serialized.clone(),
            fee_paid: assembled.fee_paid,
            inputs_used,
            total_inputs_available,
            truncated_by_cap: plan.truncated_by_cap,
            fallback_used: attempt == Attempt::AllInputs,
            trace,
        })
    }

    /// Try the policy-optimal plan, then once more with every candidate
    /// up to the input cap. Both failures are preserved.
    #[allow(clippy::too_many_arguments)]
    fn construct(
        &self,
        plan: &SelectionPlan,
        selector: &mut Selector,
        payments: &[PaymentOutput],
        change_address: &Address,
        fee: u64,
        requested_fee: Option<u64>,
        telemetry: &TelemetrySnapshot,
        policy: &PolicyConfig,
        outputs_total: u64,
    ) -> Result<(AssembledTransaction, Option<FallbackTrace>, Attempt), BuildError> {
        let primary = self.assembler.assemble(AssembleRequest {
            inputs: plan.inputs.clone(),
            payments: payments.to_vec(),
            change_address: change_address.clone(),
            fee,
        });
        let primary_err = match primary {
            Ok(assembled) => return Ok((assembled, None, Attempt::Optimal)),
            Err(err) => err,
        };

        if !selector.is_strict_subset() {
            // Nothing left to add; surface the single attempt
            return Err(BuildError::ConstructionFailed {
                primary: primary_err.to_string(),
                fallback: None,
            });
        }

        // A policy heuristic must never block a transaction that would
        // succeed with the full candidate set
        self.metrics.fallback_attempts.inc();
        selector.extend_to_cap();
        let required_target = outputs_total.saturating_add(fee);
        let fallback_plan = selector.plan(required_target);
        // The caller's floor binds here too, and the truncation signal
        // reflects whether the larger set still falls short of its target
        let fee_input = FeeInput {
            requested_fee,
            outputs_total,
            output_count: payments.len(),
            selected_input_count: fallback_plan.inputs.len(),
            truncated_by_cap: fallback_plan.truncated_by_cap,
            telemetry,
        };
        let (fallback_fee, _) = compute_fee(&fee_input, &policy.fee);
        debug!(
            primary_error = %primary_err,
            inputs = fallback_plan.inputs.len(),
            fee = fallback_fee,
            "primary construction failed, attempting all-inputs fallback"
        );

        let inputs_used = fallback_plan.inputs.len();
        match self.assembler.assemble(AssembleRequest {
            inputs: fallback_plan.inputs,
            payments: payments.to_vec(),
            change_address: change_address.clone(),
            fee: fallback_fee,
        }) {
            Ok(assembled) => Ok((
                assembled,
                Some(FallbackTrace { primary_error: primary_err.to_string(), inputs_used }),
                Attempt::AllInputs,
            )),
            Err(fallback_err) => Err(BuildError::ConstructionFailed {
                primary: primary_err.to_string(),
                fallback: Some(fallback_err.to_string()),
            }),
        }
    }
}

/// Read one telemetry source through its cache
async fn read_source<T: Clone + Send + Sync + 'static>(
    cache: &Option<SummaryCache<T>>,
) -> SourceReading<T> {
    match cache {
        None => SourceReading::Disabled,
        Some(cache) => match cache.get().await {
            None => SourceReading::Unavailable,
            Some(summary) => SourceReading::Available(summary),
        },
    }
}

/// Validate every payment output, rejecting the request on the first bad
/// entry
fn validate_outputs(
    outputs: &[RequestedOutput],
    network: NetworkId,
) -> Result<Vec<PaymentOutput>, BuildError> {
    if outputs.is_empty() {
        return Err(BuildError::InvalidRequest("at least one output is required".to_string()));
    }
    outputs
        .iter()
        .enumerate()
        .map(|(i, out)| {
            if out.amount_in_base_unit == 0 {
                return Err(BuildError::invalid_output(i, "amount must be positive"));
            }
            let address = Address::parse(&out.address, network)
                .map_err(|e| BuildError::invalid_output(i, e.to_string()))?;
            Ok(PaymentOutput { address, amount: out.amount_in_base_unit })
        })
        .collect()
}
