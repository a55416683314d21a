//! UTXO indexer client
//!
//! Fetches the funding address's spendable outputs over HTTP with a
//! bounded timeout. No retry happens at this layer; the operator retries
//! the whole build.

use crate::types::{Address, SpendableOutput};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum IndexerError {
    #[error("Indexer unreachable: {0}")]
    Unavailable(String),

    #[error("Indexer request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Indexer payload undecodable: {0}")]
    Decode(String),
}

/// Source of spendable outputs for a funding address
#[async_trait]
pub trait UtxoProvider: Send + Sync {
    async fn utxos_for_address(
        &self,
        address: &Address,
    ) -> Result<Vec<SpendableOutput>, IndexerError>;
}

/// HTTP indexer client
pub struct HttpUtxoProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpUtxoProvider {
    pub fn new(client: reqwest::Client, base_url: String, timeout: Duration) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, base_url, timeout }
    }
}

#[async_trait]
impl UtxoProvider for HttpUtxoProvider {
    async fn utxos_for_address(
        &self,
        address: &Address,
    ) -> Result<Vec<SpendableOutput>, IndexerError> {
        let url = format!("{}/addresses/{}/utxos", self.base_url, address);
        debug!(url = %url, "fetching spendable outputs");
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IndexerError::Timeout(self.timeout)
                } else {
                    IndexerError::Unavailable(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| IndexerError::Unavailable(e.to_string()))?;

        let utxos: Vec<SpendableOutput> =
            response.json().await.map_err(|e| IndexerError::Decode(e.to_string()))?;
        debug!(address = %address, count = utxos.len(), "spendable outputs fetched");
        Ok(utxos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NetworkId;

    fn addr() -> Address {
        let payload: String = std::iter::repeat('q').take(60).collect();
        Address::parse(&format!("kaspa:{payload}"), NetworkId::Mainnet).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_parses_wire_shape() {
        let mut server = mockito::Server::new_async().await;
        let address = addr();
        let body = format!(
            r#"[{{
                "transactionId": "{}",
                "index": 1,
                "amount": 500000000,
                "scriptBytes": "20ab",
                "confirmationHeight": 123456,
                "isCoinbase": true
            }}]"#,
            "ab".repeat(32)
        );
        let mock = server
            .mock("GET", format!("/addresses/{address}/utxos").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let provider = HttpUtxoProvider::new(
            reqwest::Client::new(),
            server.url(),
            Duration::from_secs(2),
        );
        let utxos = provider.utxos_for_address(&address).await.unwrap();

        mock.assert_async().await;
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].amount, 500_000_000);
        assert_eq!(utxos[0].script_bytes, vec![0x20, 0xab]);
        assert!(utxos[0].is_coinbase);
    }

    #[tokio::test]
    async fn test_server_error_maps_to_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let address = addr();
        server
            .mock("GET", format!("/addresses/{address}/utxos").as_str())
            .with_status(503)
            .create_async()
            .await;

        let provider = HttpUtxoProvider::new(
            reqwest::Client::new(),
            server.url(),
            Duration::from_secs(2),
        );
        let err = provider.utxos_for_address(&address).await.unwrap_err();
        assert!(matches!(err, IndexerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_garbage_payload_maps_to_decode() {
        let mut server = mockito::Server::new_async().await;
        let address = addr();
        server
            .mock("GET", format!("/addresses/{address}/utxos").as_str())
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let provider = HttpUtxoProvider::new(
            reqwest::Client::new(),
            server.url(),
            Duration::from_secs(2),
        );
        let err = provider.utxos_for_address(&address).await.unwrap_err();
        assert!(matches!(err, IndexerError::Decode(_)));
    }
}
