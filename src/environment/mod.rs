//! Execution environments
//!
//! The cache never talks to a chain directly. It goes through
//! [`ExecutionEnvironment`], which has one implementation per persona:
//!
//! - [`LocalVm`] - in-process ephemeral code store
//! - [`ForkVm`] - local overlay lazily seeded from a live chain
//! - [`RpcEnvironment`] - a real JSON-RPC node (live network or dev node)

pub mod fork;
pub mod local;
pub mod rpc;
pub mod signer;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::Address;

pub use fork::ForkVm;
pub use local::LocalVm;
pub use rpc::{JsonRpcClient, RpcEnvironment};
pub use signer::{DelegatedSigner, LocalAccount, Signer};

/// Default local chain id, shared with common dev nodes.
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Errors raised by an execution environment
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed RPC response: {0}")]
    Malformed(String),

    #[error("Unsupported operation on this environment: {0}")]
    Unsupported(String),

    #[error("Unknown snapshot {0}")]
    UnknownSnapshot(u64),

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("No receipt for transaction {tx_hash} after {waited:?}")]
    ReceiptTimeout { tx_hash: String, waited: Duration },
}

impl From<reqwest::Error> for EnvError {
    fn from(e: reqwest::Error) -> Self {
        EnvError::Transport(e.to_string())
    }
}

/// Identifier returned by [`ExecutionEnvironment::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId(pub u64);

/// A contract creation transaction.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Creation code with constructor arguments appended
    pub init_code: Vec<u8>,
}

impl DeployRequest {
    pub fn new(init_code: Vec<u8>) -> Self {
        Self { init_code }
    }
}

/// Result of a successful contract creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReceipt {
    pub contract_address: Address,
    pub deployer: Address,
    pub tx_hash: String,
    /// Transaction as reported by the environment; always carries `chainId`
    pub tx_envelope: Value,
    pub receipt_envelope: Value,
}

/// The active VM or RPC connection.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Network nickname this environment was created for
    fn nickname(&self) -> &str;

    /// RPC endpoint, if the environment talks to one
    fn rpc_url(&self) -> Option<&str>;

    /// Whether state disappears with the process
    fn is_ephemeral(&self) -> bool;

    async fn chain_id(&self) -> Result<u64, EnvError>;

    /// Code currently deployed at `address` (empty if none)
    async fn get_code(&self, address: &Address) -> Result<Vec<u8>, EnvError>;

    /// Broadcast a contract creation and wait for its receipt
    async fn deploy(&mut self, signer: &Signer, request: DeployRequest)
        -> Result<DeployReceipt, EnvError>;

    /// Overwrite code at an address (dev nodes only)
    async fn set_code(&mut self, address: &Address, code: &[u8]) -> Result<(), EnvError>;

    async fn snapshot(&mut self) -> Result<SnapshotId, EnvError>;

    /// Roll state back to a snapshot, discarding later snapshots
    async fn revert(&mut self, id: SnapshotId) -> Result<(), EnvError>;
}
