//! Forked environment: a local overlay on top of a live chain
//!
//! Reads for addresses the overlay never touched go upstream; every write
//! stays in the overlay. The fork reports the upstream chain id but is
//! ephemeral, so nothing it deploys may reach a durable ledger.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{
    DeployReceipt, DeployRequest, EnvError, ExecutionEnvironment, LocalVm, RpcEnvironment,
    Signer, SnapshotId,
};
use crate::types::Address;

#[derive(Debug)]
pub struct ForkVm {
    overlay: LocalVm,
    upstream: RpcEnvironment,
}

impl ForkVm {
    /// Fork from `url`, pinning the overlay to the upstream chain id.
    pub async fn connect(nickname: &str, url: &str, timeout: Duration) -> Result<Self, EnvError> {
        let upstream = RpcEnvironment::new(nickname, url, timeout, false);
        let chain_id = upstream.chain_id().await?;
        info!(network = nickname, chain_id, "Forked from upstream");
        Ok(Self {
            overlay: LocalVm::with_chain_id(nickname, chain_id),
            upstream,
        })
    }
}

#[async_trait]
impl ExecutionEnvironment for ForkVm {
    fn nickname(&self) -> &str {
        self.overlay.nickname()
    }

    fn rpc_url(&self) -> Option<&str> {
        self.upstream.rpc_url()
    }

    fn is_ephemeral(&self) -> bool {
        true
    }

    async fn chain_id(&self) -> Result<u64, EnvError> {
        self.overlay.chain_id().await
    }

    async fn get_code(&self, address: &Address) -> Result<Vec<u8>, EnvError> {
        match self.overlay.local_code(address) {
            Some(code) => Ok(code.to_vec()),
            None => self.upstream.get_code(address).await,
        }
    }

    async fn deploy(&mut self, signer: &Signer, request: DeployRequest) -> Result<DeployReceipt, EnvError> {
        Ok(self.overlay.deploy_local(signer.address(), request))
    }

    async fn set_code(&mut self, address: &Address, code: &[u8]) -> Result<(), EnvError> {
        self.overlay.set_code_local(address, code);
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<SnapshotId, EnvError> {
        Ok(self.overlay.snapshot_local())
    }

    async fn revert(&mut self, id: SnapshotId) -> Result<(), EnvError> {
        self.overlay.revert_local(id)
    }
}
