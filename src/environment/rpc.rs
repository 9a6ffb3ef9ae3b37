//! JSON-RPC environment for live networks and external dev nodes

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    DeployReceipt, DeployRequest, EnvError, ExecutionEnvironment, Signer, SnapshotId,
};
use crate::types::{chain_id_hex, decode_hex, encode_hex, parse_quantity, Address};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client over HTTP.
#[derive(Debug)]
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call a method and deserialize its `result`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, EnvError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EnvError::Timeout(self.timeout)
                } else {
                    EnvError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(EnvError::Transport(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(EnvError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = body.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| EnvError::Malformed(format!("{}: {}", method, e)))
    }
}

/// Receipt polling settings
#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(120),
        }
    }
}

/// Environment backed by a JSON-RPC node.
#[derive(Debug)]
pub struct RpcEnvironment {
    nickname: String,
    rpc: JsonRpcClient,
    ephemeral: bool,
    polling: ReceiptPolling,
}

impl RpcEnvironment {
    /// Connect to a node. `ephemeral` marks dev nodes whose state does not outlive the run.
    pub fn new(nickname: impl Into<String>, url: impl Into<String>, timeout: Duration, ephemeral: bool) -> Self {
        Self {
            nickname: nickname.into(),
            rpc: JsonRpcClient::new(url, timeout),
            ephemeral,
            polling: ReceiptPolling::default(),
        }
    }

    pub fn with_polling(mut self, polling: ReceiptPolling) -> Self {
        self.polling = polling;
        self
    }

    pub fn client(&self) -> &JsonRpcClient {
        &self.rpc
    }

    async fn send_transaction(&self, signer: &Signer, tx: Value) -> Result<String, EnvError> {
        match signer {
            Signer::Local(_) => self.rpc.call("eth_sendTransaction", json!([tx])).await,
            Signer::Delegated(delegated) => delegated.send_transaction(tx).await,
        }
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Value, EnvError> {
        let started = Instant::now();
        loop {
            let receipt: Option<Value> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            if started.elapsed() >= self.polling.max_wait {
                return Err(EnvError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.polling.interval).await;
        }
    }
}

#[async_trait]
impl ExecutionEnvironment for RpcEnvironment {
    fn nickname(&self) -> &str {
        &self.nickname
    }

    fn rpc_url(&self) -> Option<&str> {
        Some(self.rpc.url())
    }

    fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    async fn chain_id(&self) -> Result<u64, EnvError> {
        let raw: String = self.rpc.call("eth_chainId", json!([])).await?;
        parse_quantity(&raw).ok_or_else(|| EnvError::Malformed(format!("eth_chainId: {}", raw)))
    }

    async fn get_code(&self, address: &Address) -> Result<Vec<u8>, EnvError> {
        let raw: String = self
            .rpc
            .call("eth_getCode", json!([address.to_string(), "latest"]))
            .await?;
        decode_hex(&raw).map_err(|e| EnvError::Malformed(format!("eth_getCode: {}", e)))
    }

    async fn deploy(&mut self, signer: &Signer, request: DeployRequest) -> Result<DeployReceipt, EnvError> {
        let chain_id = self.chain_id().await?;
        let deployer = signer.address();
        let tx = json!({
            "from": deployer.to_string(),
            "data": encode_hex(&request.init_code),
            "chainId": chain_id_hex(chain_id),
        });

        let tx_hash = self.send_transaction(signer, tx.clone()).await?;
        info!(tx_hash = %tx_hash, network = %self.nickname, "Deployment broadcast, waiting for receipt");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        let status = receipt.get("status").and_then(Value::as_str).and_then(parse_quantity);
        if status == Some(0) {
            return Err(EnvError::Reverted(tx_hash));
        }

        let contract_address = receipt
            .get("contractAddress")
            .and_then(Value::as_str)
            .ok_or_else(|| EnvError::Malformed("receipt has no contractAddress".to_string()))?
            .parse::<Address>()
            .map_err(|e| EnvError::Malformed(e.to_string()))?;

        let mut tx_envelope: Value = self
            .rpc
            .call::<Option<Value>>("eth_getTransactionByHash", json!([tx_hash]))
            .await?
            .unwrap_or(tx);
        // The ledger filters on `$.chainId`, so it must always be present
        if let Some(obj) = tx_envelope.as_object_mut() {
            obj.entry("chainId")
                .or_insert_with(|| Value::String(chain_id_hex(chain_id)));
        }

        debug!(address = %contract_address, tx_hash = %tx_hash, "Deployment confirmed");
        Ok(DeployReceipt {
            contract_address,
            deployer,
            tx_hash,
            tx_envelope,
            receipt_envelope: receipt,
        })
    }

    async fn set_code(&mut self, address: &Address, code: &[u8]) -> Result<(), EnvError> {
        if !self.ephemeral {
            return Err(EnvError::Unsupported("set_code on a live network".to_string()));
        }
        let _: Value = self
            .rpc
            .call("anvil_setCode", json!([address.to_string(), encode_hex(code)]))
            .await?;
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<SnapshotId, EnvError> {
        if !self.ephemeral {
            return Err(EnvError::Unsupported("snapshot on a live network".to_string()));
        }
        let raw: String = self.rpc.call("evm_snapshot", json!([])).await?;
        parse_quantity(&raw)
            .map(SnapshotId)
            .ok_or_else(|| EnvError::Malformed(format!("evm_snapshot: {}", raw)))
    }

    async fn revert(&mut self, id: SnapshotId) -> Result<(), EnvError> {
        if !self.ephemeral {
            return Err(EnvError::Unsupported("revert on a live network".to_string()));
        }
        let reverted: bool = self
            .rpc
            .call("evm_revert", json!([format!("{:#x}", id.0)]))
            .await?;
        if !reverted {
            return Err(EnvError::UnknownSnapshot(id.0));
        }
        Ok(())
    }
}
