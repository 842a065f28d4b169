//! JSON-RPC ledger client.
//!
//! Submits `ledger_storeMetadata` to a chain gateway, which signs and stores the
//! commitment under the configured subnet and hotkey.

use super::{LedgerClient, LedgerSubmitError};
use crate::config::LedgerSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub struct RpcLedgerClient {
    http_client: Client,
    endpoint: String,
    netuid: u16,
    hotkey: Option<String>,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    #[must_use]
    pub fn new(settings: &LedgerSettings) -> Self {
        Self {
            http_client: Client::new(),
            endpoint: settings.endpoint.clone(),
            netuid: settings.netuid,
            hotkey: settings.hotkey.clone(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn store_metadata(&self, message: &str) -> Result<(), LedgerSubmitError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "ledger_storeMetadata",
            "params": { "netuid": self.netuid, "hotkey": self.hotkey, "data": message },
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerSubmitError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LedgerSubmitError::Transport(format!("{status}: {text}")));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerSubmitError::Transport(format!("malformed response: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(LedgerSubmitError::Rejected(format!("{} ({})", err.message, err.code)));
        }

        debug!(request_id = id, "Ledger accepted metadata");
        Ok(())
    }
}
