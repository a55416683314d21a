//! Transaction assembly boundary
//!
//! The construction primitive is modeled as a trait so the orchestrator's
//! fallback path can be exercised against injected failures. The
//! production [`WireAssembler`] emits an unsigned, Kaspa-shaped wire
//! transaction: inputs carry their previous outpoint and the UTXO entry
//! data a signer needs, outputs carry destination addresses and amounts.
//! Script construction and signing happen outside this service.

use crate::types::{hex_bytes, Address, PaymentOutput, SpendableOutput, TransactionId};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transaction version emitted on the wire
const TX_VERSION: u16 = 0;

/// Native subnetwork id (20 zero bytes)
const SUBNETWORK_ID_NATIVE: [u8; 20] = [0u8; 20];

/// Mass ceiling for a standard transaction
pub const MAX_TX_MASS: u64 = 100_000;

/// Mass contribution per input (outpoint + signature budget)
const MASS_PER_INPUT: u64 = 1_118;

/// Mass contribution per output
const MASS_PER_OUTPUT: u64 = 500;

/// Fixed mass overhead of the transaction envelope
const MASS_BASE: u64 = 1_000;

/// Change below this amount is uneconomic to spend and folds into the fee
pub const DUST_THRESHOLD: u64 = 1_000;

/// Failures of one assembly attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssembleError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Transaction mass {mass} exceeds ceiling {max_mass}")]
    MassExceeded { mass: u64, max_mass: u64 },

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("No inputs to spend")]
    EmptyInputSet,
}

/// One assembly attempt's inputs
#[derive(Debug, Clone)]
pub struct AssembleRequest {
    pub inputs: Vec<SpendableOutput>,
    pub payments: Vec<PaymentOutput>,
    pub change_address: Address,
    pub fee: u64,
}

/// Previous outpoint reference on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOutpoint {
    pub transaction_id: TransactionId,
    pub index: u32,
}

/// Unsigned input: outpoint plus the UTXO entry data a signer needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInput {
    pub previous_outpoint: WireOutpoint,
    /// Empty until signed
    #[serde(with = "hex_bytes")]
    pub signature_script: Vec<u8>,
    pub sequence: u64,
    pub sig_op_count: u8,
    pub utxo_amount: u64,
    #[serde(with = "hex_bytes")]
    pub utxo_script: Vec<u8>,
}

/// Destination output on the wire; the signer derives the locking script
/// from the address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOutput {
    pub address: Address,
    pub amount: u64,
}

/// Unsigned transaction in its serializable wire form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    pub version: u16,
    pub inputs: Vec<WireInput>,
    pub outputs: Vec<WireOutput>,
    pub lock_time: u64,
    #[serde(with = "hex_bytes")]
    pub subnetwork_id: Vec<u8>,
    pub fee: u64,
}

/// Result of a successful assembly
#[derive(Debug, Clone)]
pub struct AssembledTransaction {
    pub transaction: UnsignedTransaction,
    /// Base64 of the canonical wire JSON, handed to the external signer
    pub serialized: String,
    /// Fee actually paid, including any folded sub-dust change
    pub fee_paid: u64,
    pub change_amount: u64,
    /// Sub-dust change folded into the fee, zero when none
    pub change_folded: u64,
    pub mass: u64,
}

/// The external construction primitive's interface
pub trait TransactionAssembler: Send + Sync {
    fn assemble(&self, request: AssembleRequest) -> Result<AssembledTransaction, AssembleError>;
}

/// Production assembler producing the unsigned wire form
#[derive(Debug, Default)]
pub struct WireAssembler;

impl WireAssembler {
    pub fn new() -> Self {
        Self
    }

    fn estimate_mass(input_count: usize, output_count: usize) -> u64 {
        MASS_BASE
            .saturating_add(MASS_PER_INPUT.saturating_mul(input_count as u64))
            .saturating_add(MASS_PER_OUTPUT.saturating_mul(output_count as u64))
    }
}

impl TransactionAssembler for WireAssembler {
    fn assemble(&self, request: AssembleRequest) -> Result<AssembledTransaction, AssembleError> {
        if request.inputs.is_empty() {
            return Err(AssembleError::EmptyInputSet);
        }
        if request.payments.is_empty() {
            return Err(AssembleError::InvalidOutput("no payment outputs".to_string()));
        }

        let available: u64 = request.inputs.iter().map(|i| i.amount).sum();
        let payments_total: u64 = request.payments.iter().map(|p| p.amount).sum();
        let required = payments_total.saturating_add(request.fee);
        if available < required {
            return Err(AssembleError::InsufficientFunds { required, available });
        }

        let mut change_amount = available - required;
        let mut change_folded = 0;
        let mut fee_paid = request.fee;
        if change_amount > 0 && change_amount < DUST_THRESHOLD {
            change_folded = change_amount;
            fee_paid = fee_paid.saturating_add(change_amount);
            change_amount = 0;
        }

        let output_count = request.payments.len() + usize::from(change_amount > 0);
        let mass = Self::estimate_mass(request.inputs.len(), output_count);
        if mass > MAX_TX_MASS {
            return Err(AssembleError::MassExceeded { mass, max_mass: MAX_TX_MASS });
        }

        let inputs = request
            .inputs
            .iter()
            .map(|utxo| WireInput {
                previous_outpoint: WireOutpoint {
                    transaction_id: utxo.transaction_id,
                    index: utxo.index,
                },
                signature_script: Vec::new(),
                sequence: 0,
                sig_op_count: 1,
                utxo_amount: utxo.amount,
                utxo_script: utxo.script_bytes.clone(),
            })
            .collect();

        let mut outputs: Vec<WireOutput> = request
            .payments
            .iter()
            .map(|p| WireOutput { address: p.address.clone(), amount: p.amount })
            .collect();
        if change_amount > 0 {
            outputs.push(WireOutput { address: request.change_address.clone(), amount: change_amount });
        }

        let transaction = UnsignedTransaction {
            version: TX_VERSION,
            inputs,
            outputs,
            lock_time: 0,
            subnetwork_id: SUBNETWORK_ID_NATIVE.to_vec(),
            fee: fee_paid,
        };

        let encoded = serde_json::to_vec(&transaction)
            .map_err(|e| AssembleError::InvalidOutput(e.to_string()))?;
        let serialized = BASE64_STANDARD.encode(encoded);

        Ok(AssembledTransaction {
            transaction,
            serialized,
            fee_paid,
            change_amount,
            change_folded,
            mass,
        })
    }
}
