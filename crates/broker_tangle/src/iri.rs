//! HTTP client for an IRI ledger node's JSON command API.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::api::{Ledger, LedgerError, TransactionsToApprove};
use crate::transaction::Transaction;

const API_VERSION_HEADER: &str = "X-IOTA-API-Version";
const API_VERSION: &str = "1";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindTransactionsResponse {
    hashes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTrytesResponse {
    trytes: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

/// Ledger client talking to a single IRI node.
#[derive(Clone, Debug)]
pub struct IriClient {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl IriClient {
    pub fn new(url: reqwest::Url, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                error!("Failed to build HTTP client: {:?}", e);
                e
            })?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    async fn command<T: DeserializeOwned>(&self, body: Value) -> Result<T, LedgerError> {
        debug!("Sending {} to {}", body["command"], self.url);
        let response = self
            .client
            .post(self.url.clone())
            .header(API_VERSION_HEADER, API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&bytes)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            return Err(LedgerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Ledger for IriClient {
    async fn get_transactions_to_approve(
        &self,
        depth: u64,
    ) -> Result<TransactionsToApprove, LedgerError> {
        self.command(json!({
            "command": "getTransactionsToApprove",
            "depth": depth,
        }))
        .await
    }

    async fn find_transactions(&self, addresses: &[String]) -> Result<Vec<String>, LedgerError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let response: FindTransactionsResponse = self
            .command(json!({
                "command": "findTransactions",
                "addresses": addresses,
            }))
            .await?;
        Ok(response.hashes)
    }

    async fn get_trytes(&self, hashes: &[String]) -> Result<Vec<Transaction>, LedgerError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let response: GetTrytesResponse = self
            .command(json!({
                "command": "getTrytes",
                "hashes": hashes,
            }))
            .await?;
        response
            .trytes
            .iter()
            .map(|t| Transaction::from_trytes(t).map_err(LedgerError::from))
            .collect()
    }

    async fn broadcast_transactions(
        &self,
        transactions: &[Transaction],
    ) -> Result<(), LedgerError> {
        let trytes = transactions
            .iter()
            .map(Transaction::trytes)
            .collect::<Result<Vec<_>, _>>()?;
        let _: Value = self
            .command(json!({
                "command": "broadcastTransactions",
                "trytes": trytes,
            }))
            .await?;
        Ok(())
    }
}
