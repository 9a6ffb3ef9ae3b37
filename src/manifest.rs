//! Contract manifestation cache
//!
//! Turns a contract name into a live handle on the active network. Tiers
//! are tried in a fixed order and the first hit wins:
//!
//! 1. `force_deploy` skips every cache and deploys
//! 2. a pinned address is used as-is
//! 3. durable networks consult the deployment ledger (integrity-checked)
//! 4. the session cache, validated against on-chain code
//! 5. deploy with the configured procedure
//!
//! Only durable networks write to the ledger. Forks and the local VM keep
//! their deployments in the session cache alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactSource;
use crate::contract::{
    AbiSource, ContractHandle, DeployOutcome, HandleOrigin, NamedContractSpec, ProcedureRegistry,
};
use crate::error::{ManifestError, Result};
use crate::integrity::{self, IntegrityDigest};
use crate::ledger::{now_ts, DeploymentFilter, DeploymentRecord};
use crate::network::{Confirmation, ExecutionContext, NetworkDescriptor};
use crate::types::{chain_id_hex, Address};

/// Per-call overrides layered over the network's contract settings.
#[derive(Debug, Clone, Default)]
pub struct ResolveOverrides {
    pub force_deploy: Option<bool>,
    pub address: Option<Address>,
    pub abi: Option<AbiSource>,
    pub abi_from_explorer: Option<bool>,
    pub deploy_procedure: Option<String>,
}

impl ResolveOverrides {
    pub fn force_deploy() -> Self {
        Self {
            force_deploy: Some(true),
            ..Self::default()
        }
    }

    pub fn at(address: Address) -> Self {
        Self {
            address: Some(address),
            ..Self::default()
        }
    }

    fn apply(self, name: &str, configured: &NamedContractSpec) -> NamedContractSpec {
        NamedContractSpec {
            name: name.to_string(),
            force_deploy: self.force_deploy,
            abi: self.abi,
            abi_from_explorer: self.abi_from_explorer,
            deploy_procedure: self.deploy_procedure,
            address: self.address,
        }
        .merge(configured)
    }
}

/// Name filter for [`ContractManifestationCache::list_deployments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractSelector {
    All,
    Named(String),
}

impl ContractSelector {
    /// `all` selects every contract; anything else is a contract name.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("all") {
            ContractSelector::All
        } else {
            ContractSelector::Named(raw.to_string())
        }
    }

    fn name(&self) -> Option<&str> {
        match self {
            ContractSelector::All => None,
            ContractSelector::Named(name) => Some(name),
        }
    }
}

pub struct ContractManifestationCache {
    artifacts: Arc<dyn ArtifactSource>,
    procedures: ProcedureRegistry,
    confirmation: Arc<dyn Confirmation>,
    project_root: PathBuf,
    session_id: String,
}

impl std::fmt::Debug for ContractManifestationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractManifestationCache")
            .field("procedures", &self.procedures)
            .field("project_root", &self.project_root)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl ContractManifestationCache {
    pub fn new(
        artifacts: Arc<dyn ArtifactSource>,
        procedures: ProcedureRegistry,
        confirmation: Arc<dyn Confirmation>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            artifacts,
            procedures,
            confirmation,
            project_root: project_root.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Identifier stamped on every record written by this process.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve `name` on the active network.
    pub async fn resolve(
        &self,
        ctx: &mut ExecutionContext,
        name: &str,
        overrides: ResolveOverrides,
    ) -> Result<ContractHandle> {
        let network = ctx.active_mut()?;
        let spec = overrides.apply(name, &network.contract_spec(name));
        spec.validate()?;

        if spec.is_force_deploy() {
            debug!(contract = name, "Force deploy requested");
            return self.deploy(network, &spec).await;
        }

        if let Some(address) = spec.address {
            return Ok(self.pinned(network, &spec, address).await);
        }

        if let Some(handle) = self.from_ledger(network, name)? {
            return Ok(handle);
        }

        if let Some(handle) = self.from_session(network, name).await {
            return Ok(handle);
        }

        self.deploy(network, &spec).await
    }

    async fn pinned(&self, network: &NetworkDescriptor, spec: &NamedContractSpec, address: Address) -> ContractHandle {
        let abi = match (&spec.abi, spec.wants_explorer_abi()) {
            (Some(source), _) => source.load(&self.project_root, self.artifacts.as_ref()),
            (None, true) => match network.explorer() {
                Some(explorer) => explorer.fetch_abi(&address).await,
                None => Err(ManifestError::Config(format!(
                    "network {} has no explorer configured",
                    network.name()
                ))),
            },
            (None, false) => AbiSource::Artifact(spec.name.clone())
                .load(&self.project_root, self.artifacts.as_ref()),
        };

        let abi = match abi {
            Ok(abi) => abi,
            Err(e) => {
                warn!(
                    contract = %spec.name,
                    address = %address,
                    error = %e,
                    "No ABI for pinned contract, returning a bare handle"
                );
                Vec::new()
            }
        };

        let mut handle = ContractHandle::bare(spec.name.clone(), address, abi, HandleOrigin::Pinned);
        handle.deploy_procedure = spec.deploy_procedure.clone();
        handle
    }

    fn from_ledger(&self, network: &mut NetworkDescriptor, name: &str) -> Result<Option<ContractHandle>> {
        if !network.is_durable() {
            return Ok(None);
        }
        let chain_id = network.require_chain_id()?;
        let Some(ledger) = network.read_ledger()? else {
            return Ok(None);
        };

        let filter = DeploymentFilter::new()
            .contract_name(name)
            .chain_id(chain_id)
            .limit(1);
        let record = match ledger.query_checked(&filter, self.artifacts.as_ref())?.into_iter().next() {
            Some(record) => record,
            None => {
                debug!(contract = name, chain_id, "No valid ledger record");
                return Ok(None);
            }
        };

        info!(
            contract = name,
            address = %record.contract_address,
            deployment_id = ?record.deployment_id,
            "Resolved from deployment ledger"
        );
        let bytecode = match self.artifacts.locate(name) {
            Ok(Some(artifact)) => artifact.bytecode,
            _ => Vec::new(),
        };
        Ok(Some(ContractHandle {
            name: name.to_string(),
            address: record.contract_address,
            abi: record.abi.clone(),
            integrity: record.integrity(),
            deploy_procedure: None,
            bytecode,
            runtime_code: Vec::new(),
            origin: HandleOrigin::Ledger,
        }))
    }

    async fn from_session(&self, network: &mut NetworkDescriptor, name: &str) -> Option<ContractHandle> {
        let handle = network.cached(name)?.clone();

        let code = match network.environment() {
            Ok(env) => env.get_code(&handle.address).await.map_err(ManifestError::from),
            Err(e) => Err(e),
        };
        match code {
            Ok(code) if handle.matches_code(&code) => {
                debug!(contract = name, address = %handle.address, "Resolved from session cache");
                return Some(handle.with_origin(HandleOrigin::Session));
            }
            Ok(_) => info!(
                contract = name,
                address = %handle.address,
                "On-chain code changed, evicting session entry"
            ),
            Err(e) => warn!(
                contract = name,
                address = %handle.address,
                error = %e,
                "Cannot validate session entry, evicting"
            ),
        }
        network.evict(name);
        None
    }

    async fn deploy(&self, network: &mut NetworkDescriptor, spec: &NamedContractSpec) -> Result<ContractHandle> {
        let name = spec.name.as_str();
        let reference = spec
            .deploy_procedure
            .as_deref()
            .ok_or_else(|| ManifestError::MissingDeployProcedure(name.to_string()))?;
        let procedure = self.procedures.resolve(name, reference)?;

        network
            .confirm_mutation(self.confirmation.as_ref(), &format!("deploy {}", name))
            .await?;
        let chain_id = network.require_chain_id()?;

        let (env, signer) = network.deploy_parts()?;
        let outcome = procedure
            .deploy(name, env, signer, self.artifacts.as_ref())
            .await
            .map_err(|e| match e {
                ManifestError::Environment(inner) => ManifestError::DeployFailed {
                    contract: name.to_string(),
                    reason: inner.to_string(),
                },
                other => other,
            })?;
        let digest = integrity::digest(&outcome.artifact)?;
        // The deployment already happened, so a failed read must not lose its record
        let runtime_code = match env.get_code(&outcome.address).await {
            Ok(code) => code,
            Err(e) => {
                warn!(
                    contract = name,
                    address = %outcome.address,
                    error = %e,
                    "Cannot read deployed code, continuing without it"
                );
                Vec::new()
            }
        };
        let rpc = env.rpc_url().map(str::to_string);

        info!(
            contract = name,
            address = %outcome.address,
            network = %network.name(),
            "Deployed"
        );

        let handle = ContractHandle {
            name: name.to_string(),
            address: outcome.address,
            abi: outcome.artifact.abi.clone(),
            integrity: Some(digest.clone()),
            deploy_procedure: Some(reference.to_string()),
            bytecode: outcome.artifact.bytecode.clone(),
            runtime_code,
            origin: HandleOrigin::Deployed,
        };
        network.cache_handle(handle.clone());

        if let Some(ledger) = network.write_ledger()? {
            let record = self.record_for(name, chain_id, rpc, &digest, outcome);
            ledger.append(&record)?;
        }
        Ok(handle)
    }

    fn record_for(
        &self,
        name: &str,
        chain_id: u64,
        rpc: Option<String>,
        digest: &IntegrityDigest,
        outcome: DeployOutcome,
    ) -> DeploymentRecord {
        let DeployOutcome { address, artifact, receipt } = outcome;

        let mut tx_envelope = receipt.tx_envelope;
        if let Value::Object(tx) = &mut tx_envelope {
            tx.entry("chainId")
                .or_insert_with(|| Value::String(chain_id_hex(chain_id)));
        }

        DeploymentRecord {
            contract_address: address,
            contract_name: Some(name.to_string()),
            rpc,
            deployer: Some(receipt.deployer.to_string()),
            tx_hash: Some(receipt.tx_hash),
            broadcast_ts: now_ts(),
            tx_envelope,
            receipt_envelope: receipt.receipt_envelope,
            source_bundle: json!({
                "integrity": digest.as_str(),
                "contract_name": artifact.contract_name,
                "sources": artifact.sources,
            }),
            abi: artifact.abi,
            session_id: self.session_id.clone(),
            deployment_id: None,
        }
    }

    /// Ledger records on the active network, most recent first. The chain
    /// id defaults to the active network's.
    pub fn list_deployments(
        &self,
        ctx: &mut ExecutionContext,
        selector: &ContractSelector,
        chain_id: Option<u64>,
        limit: Option<u32>,
        checked: bool,
    ) -> Result<Vec<DeploymentRecord>> {
        let network = ctx.active_mut()?;
        let chain_id = chain_id.or(network.chain_id());
        let Some(ledger) = network.read_ledger()? else {
            return Ok(Vec::new());
        };

        let filter = DeploymentFilter {
            contract_name: selector.name().map(str::to_string),
            chain_id,
            limit,
        };
        if checked {
            ledger.query_checked(&filter, self.artifacts.as_ref())
        } else {
            ledger.query(&filter)
        }
    }

    /// Attach `name` to the latest unnamed deployment at `address` on the
    /// active network. Returns whether a record was updated.
    pub fn name_deployment(&self, ctx: &mut ExecutionContext, address: &Address, name: &str) -> Result<bool> {
        let network = ctx.active_mut()?;
        let chain_id = network.require_chain_id()?;
        let Some(ledger) = network.read_ledger()? else {
            return Ok(false);
        };
        let updated = ledger.associate_name(chain_id, address, name)?;
        if !updated {
            warn!(address = %address, contract = name, "No deployment found to name");
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactSet, CompiledArtifact};
    use crate::config::Config;
    use crate::network::{AutoConfirm, NetworkRegistry, SwitchRequest};

    fn cache_with(artifacts: ArtifactSet) -> ContractManifestationCache {
        ContractManifestationCache::new(
            Arc::new(artifacts),
            ProcedureRegistry::new(),
            Arc::new(AutoConfirm::yes()),
            "/project",
        )
    }

    async fn local_ctx() -> ExecutionContext {
        let config = Config::from_toml_str(
            r#"
            [networks.contracts.Counter]
            deploy_procedure = "artifact:Counter"
            "#,
            Path::new("/project"),
        )
        .unwrap();
        let mut ctx = ExecutionContext::new(NetworkRegistry::from_config(&config).unwrap());
        ctx.switch_network(SwitchRequest::named("local")).await.unwrap();
        ctx
    }

    fn counter() -> ArtifactSet {
        let mut set = ArtifactSet::new();
        set.insert(CompiledArtifact::new(
            "Counter",
            vec![json!({"type": "function", "name": "count"})],
            vec![0x60, 0x80, 0x60, 0x40],
        ));
        set
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(ContractSelector::parse("all"), ContractSelector::All);
        assert_eq!(
            ContractSelector::parse("Counter"),
            ContractSelector::Named("Counter".to_string())
        );
    }

    #[test]
    fn test_overrides_win_over_configuration() {
        let configured = NamedContractSpec {
            name: "Counter".to_string(),
            force_deploy: Some(false),
            deploy_procedure: Some("artifact:Counter".to_string()),
            ..Default::default()
        };
        let spec = ResolveOverrides::force_deploy().apply("Counter", &configured);
        assert!(spec.is_force_deploy());
        assert_eq!(spec.deploy_procedure.as_deref(), Some("artifact:Counter"));
    }

    #[tokio::test]
    async fn test_resolve_requires_active_network() {
        let cache = cache_with(counter());
        let registry = NetworkRegistry::from_config(&Config::empty(Path::new("/project"))).unwrap();
        let mut ctx = ExecutionContext::new(registry);
        let result = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await;
        assert!(matches!(result, Err(ManifestError::NoActiveNetwork)));
    }

    #[tokio::test]
    async fn test_deploy_then_session_hit() {
        let cache = cache_with(counter());
        let mut ctx = local_ctx().await;

        let first = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
        assert_eq!(first.origin, HandleOrigin::Deployed);
        assert!(first.integrity.is_some());

        let second = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
        assert_eq!(second.origin, HandleOrigin::Session);
        assert_eq!(second.address, first.address);
    }

    #[tokio::test]
    async fn test_missing_deploy_procedure() {
        let cache = cache_with(counter());
        let mut ctx = local_ctx().await;
        let result = cache.resolve(&mut ctx, "Token", ResolveOverrides::default()).await;
        assert!(matches!(result, Err(ManifestError::MissingDeployProcedure(name)) if name == "Token"));
    }

    #[tokio::test]
    async fn test_pinned_address_uses_artifact_abi() {
        let cache = cache_with(counter());
        let mut ctx = local_ctx().await;
        let address: Address = "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap();

        let handle = cache.resolve(&mut ctx, "Counter", ResolveOverrides::at(address)).await.unwrap();
        assert_eq!(handle.origin, HandleOrigin::Pinned);
        assert_eq!(handle.address, address);
        assert_eq!(handle.abi.len(), 1);
        assert_eq!(ctx.active().unwrap().session_len(), 0);
    }

    #[tokio::test]
    async fn test_pinned_address_without_abi_is_bare() {
        let cache = cache_with(ArtifactSet::new());
        let mut ctx = local_ctx().await;
        let address: Address = "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap();

        let handle = cache.resolve(&mut ctx, "Unknown", ResolveOverrides::at(address)).await.unwrap();
        assert!(handle.abi.is_empty());
        assert_eq!(handle.origin, HandleOrigin::Pinned);
    }

    #[tokio::test]
    async fn test_list_on_local_is_empty() {
        let cache = cache_with(counter());
        let mut ctx = local_ctx().await;
        cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();

        let records = cache
            .list_deployments(&mut ctx, &ContractSelector::All, None, None, false)
            .unwrap();
        assert!(records.is_empty());
    }
}
