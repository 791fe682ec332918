use std::time::Duration;

use reqwest::{Client, header::CONTENT_TYPE};
use serde::Deserialize;

use crate::ledger::{Address, Ledger, LedgerError, SignedTransaction};

#[derive(Debug, Deserialize)]
struct NonceReply {
    nonce: u64,
}

/// Ledger reached through a node's HTTP gateway.
///
/// `GET /v1/accounts/{address}/nonce?round=latest` returns `{"nonce": n}`;
/// `POST /v1/transactions` takes a CBOR signed transaction and blocks until it
/// is included, answering with the raw contract reply.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: Client,
    endpoint: String,
}

impl HttpLedger {
    pub fn new(endpoint: &str, connect_timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

impl Ledger for HttpLedger {
    async fn fetch_sequence_number(&self, address: &Address) -> Result<u64, LedgerError> {
        let url = format!("{}/v1/accounts/{address}/nonce?round=latest", self.endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Unreachable(format!("{status}: {body}")));
        }

        let reply: NonceReply = response
            .json()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        Ok(reply.nonce)
    }

    async fn commit(&self, transaction: &SignedTransaction) -> Result<Vec<u8>, LedgerError> {
        let url = format!("{}/v1/transactions", self.endpoint);
        let body = transaction
            .to_cbor()
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/cbor")
            .body(body)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected(format!("{status}: {body}")));
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        Ok(raw.to_vec())
    }
}
