//! JSON-RPC Transport
//!
//! HTTP JSON-RPC client shared by the chain adapters. Tracks whether the adapter
//! is connected so calls after `close` fail instead of silently reaching the node.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{RelayError, Result};

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<serde_json::Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

// ============================================================================
// CLIENT IMPLEMENTATION
// ============================================================================

/// HTTP JSON-RPC client bound to one endpoint.
pub struct JsonRpcClient {
    client: Client,
    endpoint: String,
    next_id: AtomicU64,
    connected: AtomicBool,
}

impl JsonRpcClient {
    /// Creates a client for `endpoint`. No request is sent until [`connect`](Self::connect).
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::connection(endpoint, format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Probes the endpoint with `probe_method` and marks the client connected.
    pub async fn connect(&self, probe_method: &str) -> Result<()> {
        self.send(probe_method, vec![])
            .await
            .map_err(|e| RelayError::connection(&self.endpoint, e.to_string()))?;
        self.connected.store(true, Ordering::SeqCst);
        debug!(endpoint = %self.endpoint, "Connected");
        Ok(())
    }

    /// Marks the client closed.
    pub fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!(endpoint = %self.endpoint, "Connection closed");
        }
    }

    /// Calls `method` and deserializes a non-null result.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<serde_json::Value>) -> Result<T> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| RelayError::rpc(method, "empty result"))
    }

    /// Calls `method`; a `null` result maps to `None`.
    pub async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>> {
        if !self.is_connected() {
            return Err(RelayError::connection(&self.endpoint, "not connected"));
        }

        match self.send(method, params).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| RelayError::rpc(method, format!("unexpected result shape: {}", e))),
        }
    }

    async fn send(&self, method: &str, params: Vec<serde_json::Value>) -> Result<Option<serde_json::Value>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response: JsonRpcResponse = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::rpc(method, format!("request to {} failed: {}", self.endpoint, e)))?
            .json()
            .await
            .map_err(|e| RelayError::rpc(method, format!("invalid response from {}: {}", self.endpoint, e)))?;

        if let Some(error) = response.error {
            return Err(RelayError::rpc(
                method,
                format!("{} (code: {})", error.message, error.code),
            ));
        }

        Ok(response.result)
    }
}
