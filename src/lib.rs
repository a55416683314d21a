//! txforge - transaction-construction service for a UTXO ledger
//!
//! Given a funding address, a set of desired payments, and live
//! congestion signals, the service selects which unspent outputs to
//! spend, computes a priority fee, and emits a serialized unsigned
//! transaction ready for external signing.

pub mod builder;
pub mod config;
pub mod indexer;
pub mod metrics;
pub mod server;
pub mod telemetry;
pub mod types;
