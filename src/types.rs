//! Common domain types used throughout the service

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while validating caller-supplied identifiers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid transaction id: {0}")]
    TransactionId(String),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Unknown network id: {0}")]
    Network(String),
}

/// 32-byte transaction id, hex-encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for TransactionId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|e| ParseError::TransactionId(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| ParseError::TransactionId(format!("expected 32 bytes, got {}", s.len() / 2)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<String> for TransactionId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.to_string()
    }
}

/// Ledger network, selecting the expected address prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Mainnet,
    Testnet,
    Simnet,
    Devnet,
}

impl NetworkId {
    /// Address prefix expected for this network
    pub fn address_prefix(&self) -> &'static str {
        match self {
            NetworkId::Mainnet => "kaspa",
            NetworkId::Testnet => "kaspatest",
            NetworkId::Simnet => "kaspasim",
            NetworkId::Devnet => "kaspadev",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkId::Mainnet => "mainnet",
            NetworkId::Testnet => "testnet",
            NetworkId::Simnet => "simnet",
            NetworkId::Devnet => "devnet",
        }
    }
}

impl FromStr for NetworkId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Suffixed testnet ids ("testnet-10") collapse to the testnet prefix
        let base = s.split('-').next().unwrap_or(s);
        match base {
            "mainnet" => Ok(NetworkId::Mainnet),
            "testnet" => Ok(NetworkId::Testnet),
            "simnet" => Ok(NetworkId::Simnet),
            "devnet" => Ok(NetworkId::Devnet),
            _ => Err(ParseError::Network(s.to_string())),
        }
    }
}

/// Bech32 character set used by address payloads
const ADDRESS_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Validated destination address
///
/// Addresses are `prefix:payload` strings. Validation checks the prefix
/// against the request's network and the payload against the bech32
/// charset and plausible length bounds; full checksum verification is the
/// signer's concern, not this service's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and validate an address for the given network
    pub fn parse(s: &str, network: NetworkId) -> Result<Self, ParseError> {
        let (prefix, payload) = s
            .split_once(':')
            .ok_or_else(|| ParseError::Address(format!("missing prefix separator: {s}")))?;
        if prefix != network.address_prefix() {
            return Err(ParseError::Address(format!(
                "prefix {prefix} does not match network {}",
                network.as_str()
            )));
        }
        if payload.len() < 32 || payload.len() > 90 {
            return Err(ParseError::Address(format!(
                "payload length {} out of range",
                payload.len()
            )));
        }
        if let Some(bad) = payload.chars().find(|c| !ADDRESS_CHARSET.contains(*c)) {
            return Err(ParseError::Address(format!("invalid character {bad:?} in payload")));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hex-encoded byte strings on the wire
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A spendable UTXO owned by the funding address
///
/// Fetched from the indexer per build request; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendableOutput {
    /// Id of the transaction that created this output
    pub transaction_id: TransactionId,

    /// Output index within that transaction
    pub index: u32,

    /// Amount in sompi
    pub amount: u64,

    /// Locking script of the output
    #[serde(with = "hex_bytes")]
    pub script_bytes: Vec<u8>,

    /// DAA score at which the output was confirmed (age proxy)
    pub confirmation_height: u64,

    /// Whether this output was produced by a coinbase transaction
    #[serde(default)]
    pub is_coinbase: bool,
}

/// A desired payment, validated before use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutput {
    pub address: Address,

    /// Amount in sompi, strictly positive
    pub amount: u64,
}

/// Trustworthiness of cached telemetry values
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    StaleSoft,
    StaleHard,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::StaleSoft => "stale_soft",
            Freshness::StaleHard => "stale_hard",
        }
    }

    /// The more degraded of two states
    pub fn worst(self, other: Freshness) -> Freshness {
        self.max(other)
    }
}

/// Congestion and latency signals consumed by the adaptive fee policy
///
/// Built per request by merging caller-supplied fields with the cached
/// summaries; absent fields simply contribute nothing to the fee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySnapshot {
    pub observed_confirm_latency_p95_ms: Option<u64>,

    /// Network congestion proxy, 0..=100
    pub daa_congestion_pct: Option<u8>,

    pub receipt_lag_p95_ms: Option<u64>,

    pub scheduler_callback_latency_p95_ms: Option<u64>,

    #[serde(skip_deserializing)]
    pub freshness: Option<Freshness>,
}

impl TelemetrySnapshot {
    /// Effective freshness, defaulting to hard-stale when never resolved
    pub fn freshness(&self) -> Freshness {
        self.freshness.unwrap_or(Freshness::StaleHard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_roundtrip() {
        let hex_id = "aa".repeat(32);
        let id: TransactionId = hex_id.parse().unwrap();
        assert_eq!(id.to_string(), hex_id);
    }

    #[test]
    fn test_transaction_id_rejects_short_input() {
        let err = "abcd".parse::<TransactionId>().unwrap_err();
        assert!(matches!(err, ParseError::TransactionId(_)));
    }

    #[test]
    fn test_address_prefix_must_match_network() {
        let payload = "qr5ex6yxzkvq0hq2w7y3z4v8n0j9k2m4c6u7a5l3s8d0f2g4h6j8k0l2q4w6e8r0";
        let addr = format!("kaspa:{payload}");
        assert!(Address::parse(&addr, NetworkId::Mainnet).is_ok());
        assert!(Address::parse(&addr, NetworkId::Testnet).is_err());
    }

    #[test]
    fn test_address_rejects_bad_charset() {
        // 'b' and '1' are outside the bech32 charset
        let addr = format!("kaspa:{}", "b1".repeat(20));
        assert!(Address::parse(&addr, NetworkId::Mainnet).is_err());
    }

    #[test]
    fn test_network_id_parses_suffixed_testnet() {
        assert_eq!("testnet-10".parse::<NetworkId>().unwrap(), NetworkId::Testnet);
        assert_eq!(NetworkId::Testnet.address_prefix(), "kaspatest");
    }

    #[test]
    fn test_freshness_worst_orders_correctly() {
        assert_eq!(Freshness::Fresh.worst(Freshness::StaleSoft), Freshness::StaleSoft);
        assert_eq!(Freshness::StaleHard.worst(Freshness::Fresh), Freshness::StaleHard);
    }
}
