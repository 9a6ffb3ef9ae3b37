//! Transaction signers
//!
//! Two capabilities exist: keys the connected node (or the local VM) already
//! holds, and signing delegated to another process reachable over JSON-RPC,
//! such as a browser wallet bridge. Key storage itself lives elsewhere.

use std::time::Duration;

use serde_json::{json, Value};

use super::rpc::JsonRpcClient;
use super::EnvError;
use crate::types::Address;

/// Default dev-node sender used when nothing else is configured.
pub const DEFAULT_DEV_SENDER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Debug)]
pub enum Signer {
    Local(LocalAccount),
    Delegated(DelegatedSigner),
}

impl Signer {
    pub fn address(&self) -> Address {
        match self {
            Signer::Local(account) => account.address,
            Signer::Delegated(delegated) => delegated.address,
        }
    }

    /// The unlocked dev account every local VM and dev node funds.
    pub fn dev_default() -> Self {
        let address = DEFAULT_DEV_SENDER
            .parse()
            .unwrap_or(Address::ZERO);
        Signer::Local(LocalAccount { address })
    }
}

/// An account whose key is held by the node or VM we are connected to.
#[derive(Debug, Clone, Copy)]
pub struct LocalAccount {
    pub address: Address,
}

/// Signing delegated to an out-of-process service.
#[derive(Debug)]
pub struct DelegatedSigner {
    pub address: Address,
    rpc: JsonRpcClient,
}

impl DelegatedSigner {
    pub fn new(address: Address, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address,
            rpc: JsonRpcClient::new(endpoint, timeout),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.rpc.url()
    }

    /// Hand the unsigned transaction to the delegate; it signs, broadcasts and returns the hash.
    pub async fn send_transaction(&self, mut tx: Value) -> Result<String, EnvError> {
        if let Some(obj) = tx.as_object_mut() {
            obj.insert("from".to_string(), Value::String(self.address.to_string()));
        }
        self.rpc.call("eth_sendTransaction", json!([tx])).await
    }
}
