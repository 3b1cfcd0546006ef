//! Shared utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for a single RPC request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure of a single JSON-RPC call.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The request never produced a response (connection refused, DNS, timeout).
    #[error("failed to reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The node answered with a JSON-RPC error object.
    #[error("{method} failed with code {code}: {message}")]
    Node {
        method: String,
        code: i64,
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("unexpected {method} response: {reason}")]
    Decode { method: String, reason: String },
}

impl RpcError {
    /// Whether the request failed before a connection was established, so the node
    /// never saw it.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Transport { source, .. } if source.is_connect())
    }
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|source| RpcError::Transport {
            url: url.to_string(),
            source,
        })?;

    let body: Value = response.json().await.map_err(|e| RpcError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(error) = body.get("error") {
        return Err(RpcError::Node {
            method: method.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    // A `null` result is meaningful (e.g. a receipt that does not exist yet).
    let result = body.get("result").cloned().unwrap_or(Value::Null);

    serde_json::from_value(result).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// Deserialize an optional hex quantity.
pub fn deserialize_opt_u64_from_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| parse_quantity(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Parse a hex quantity such as `0x1b4`.
pub fn parse_quantity(s: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
}
