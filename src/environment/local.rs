//! In-process ephemeral VM
//!
//! A code store with deterministic addresses and snapshots. It does not
//! execute EVM bytecode: creation code is stored as the account code, which
//! is all the cache needs to validate what lives at an address.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{
    DeployReceipt, DeployRequest, EnvError, ExecutionEnvironment, Signer, SnapshotId,
    LOCAL_CHAIN_ID,
};
use crate::types::{chain_id_hex, encode_hex, Address};

#[derive(Debug, Clone, Default)]
struct VmState {
    code: HashMap<Address, Vec<u8>>,
    nonces: HashMap<Address, u64>,
    block_number: u64,
}

/// Ephemeral in-process VM.
#[derive(Debug)]
pub struct LocalVm {
    nickname: String,
    chain_id: u64,
    state: VmState,
    snapshots: Vec<VmState>,
}

impl LocalVm {
    pub fn new(nickname: impl Into<String>) -> Self {
        Self::with_chain_id(nickname, LOCAL_CHAIN_ID)
    }

    pub fn with_chain_id(nickname: impl Into<String>, chain_id: u64) -> Self {
        Self {
            nickname: nickname.into(),
            chain_id,
            state: VmState::default(),
            snapshots: Vec::new(),
        }
    }

    /// Code stored locally at `address`, if this VM has ever written it.
    pub fn local_code(&self, address: &Address) -> Option<&[u8]> {
        self.state.code.get(address).map(Vec::as_slice)
    }

    /// Address a deployer's next creation lands on.
    pub fn next_address(&self, deployer: &Address) -> Address {
        let nonce = self.state.nonces.get(deployer).copied().unwrap_or(0);
        creation_address(deployer, nonce)
    }

    pub(crate) fn deploy_local(&mut self, deployer: Address, request: DeployRequest) -> DeployReceipt {
        let nonce = self.state.nonces.get(&deployer).copied().unwrap_or(0);
        let contract_address = creation_address(&deployer, nonce);
        let tx_hash = creation_tx_hash(&deployer, nonce, &request.init_code);

        self.state.nonces.insert(deployer, nonce + 1);
        self.state.block_number += 1;
        self.state
            .code
            .insert(contract_address, request.init_code.clone());

        debug!(
            network = %self.nickname,
            address = %contract_address,
            bytes = request.init_code.len(),
            "Local deployment"
        );

        DeployReceipt {
            contract_address,
            deployer,
            tx_hash: tx_hash.clone(),
            tx_envelope: json!({
                "from": deployer.to_string(),
                "to": null,
                "nonce": format!("{:#x}", nonce),
                "data": encode_hex(&request.init_code),
                "chainId": chain_id_hex(self.chain_id),
            }),
            receipt_envelope: json!({
                "transactionHash": tx_hash,
                "contractAddress": contract_address.to_string(),
                "blockNumber": format!("{:#x}", self.state.block_number),
                "status": "0x1",
            }),
        }
    }

    pub(crate) fn set_code_local(&mut self, address: &Address, code: &[u8]) {
        self.state.code.insert(*address, code.to_vec());
    }

    pub(crate) fn snapshot_local(&mut self) -> SnapshotId {
        self.snapshots.push(self.state.clone());
        SnapshotId(self.snapshots.len() as u64 - 1)
    }

    pub(crate) fn revert_local(&mut self, id: SnapshotId) -> Result<(), EnvError> {
        let index = id.0 as usize;
        if index >= self.snapshots.len() {
            return Err(EnvError::UnknownSnapshot(id.0));
        }
        self.snapshots.truncate(index + 1);
        // Reverting consumes the snapshot, matching dev node semantics
        if let Some(state) = self.snapshots.pop() {
            self.state = state;
        }
        Ok(())
    }
}

fn creation_address(deployer: &Address, nonce: u64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(deployer.as_bytes());
    hasher.update(nonce.to_be_bytes());
    Address::from_word(&hasher.finalize())
}

fn creation_tx_hash(deployer: &Address, nonce: u64, init_code: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"tx");
    hasher.update(deployer.as_bytes());
    hasher.update(nonce.to_be_bytes());
    hasher.update(init_code);
    encode_hex(&hasher.finalize())
}

#[async_trait]
impl ExecutionEnvironment for LocalVm {
    fn nickname(&self) -> &str {
        &self.nickname
    }

    fn rpc_url(&self) -> Option<&str> {
        None
    }

    fn is_ephemeral(&self) -> bool {
        true
    }

    async fn chain_id(&self) -> Result<u64, EnvError> {
        Ok(self.chain_id)
    }

    async fn get_code(&self, address: &Address) -> Result<Vec<u8>, EnvError> {
        Ok(self.state.code.get(address).cloned().unwrap_or_default())
    }

    async fn deploy(&mut self, signer: &Signer, request: DeployRequest) -> Result<DeployReceipt, EnvError> {
        Ok(self.deploy_local(signer.address(), request))
    }

    async fn set_code(&mut self, address: &Address, code: &[u8]) -> Result<(), EnvError> {
        self.set_code_local(address, code);
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<SnapshotId, EnvError> {
        Ok(self.snapshot_local())
    }

    async fn revert(&mut self, id: SnapshotId) -> Result<(), EnvError> {
        self.revert_local(id)
    }
}
