//! JSON-RPC client for the canonical node.
//!
//! The node is a remote oracle: raw transaction fetch, broadcast, chain
//! height and the mempool snapshot. Credentials come from the environment
//! (`COIND_RPCUSER`, `COIND_RPCPASSWORD`, `COIND_HOST`, `COIND_RPCPORT`).

use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RpcError {
    pub message: String,
}

impl RpcError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RpcError {}

pub struct NodeRpc {
    client: reqwest::Client,
    url: String,
    user: String,
    password: String,
}

impl NodeRpc {
    pub fn new(user: String, password: String, host: String, port: u16) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: format!("http://{}:{}", host, port),
            user,
            password,
        }
    }

    pub fn from_env() -> Result<Self, RpcError> {
        let get = |name: &str| {
            std::env::var(name).map_err(|_| RpcError::new(format!("{} is not set", name)))
        };
        let user = get("COIND_RPCUSER")?;
        let password = get("COIND_RPCPASSWORD")?;
        let host = get("COIND_HOST")?;
        let port = get("COIND_RPCPORT")?
            .parse::<u16>()
            .map_err(|_| RpcError::new("COIND_RPCPORT is not a port number"))?;
        Ok(Self::new(user, password, host, port))
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "blockdex",
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::new(format!("{} request failed: {}", method, e)))?;

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| RpcError::new(format!("{} returned invalid JSON: {}", method, e)))?;

        if let Some(error) = envelope.get("error") {
            if !error.is_null() {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown RPC error");
                return Err(RpcError::new(message));
            }
        }

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::new(format!("{} response without result", method)))
    }

    /// `verbose = false` yields the raw hex string, `true` the decoded object.
    pub async fn get_raw_transaction(&self, txid: &str, verbose: bool) -> Result<Value, RpcError> {
        self.call("getrawtransaction", json!([txid, verbose])).await
    }

    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        let result = self.call("getblockcount", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| RpcError::new("getblockcount returned a non-numeric height"))
    }

    pub async fn send_raw_transaction(&self, hex: &str) -> Result<String, RpcError> {
        let result = self.call("sendrawtransaction", json!([hex])).await?;
        result
            .as_str()
            .map(String::from)
            .ok_or_else(|| RpcError::new("sendrawtransaction returned a non-string txid"))
    }

    pub async fn get_raw_mempool(&self) -> Result<Vec<String>, RpcError> {
        let result = self.call("getrawmempool", json!([])).await?;
        let txids = result
            .as_array()
            .ok_or_else(|| RpcError::new("getrawmempool returned a non-array"))?;
        Ok(txids
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect())
    }
}
