//! Contract resolution integration tests
//!
//! Drives the manifestation cache through every tier on each persona:
//! - Idempotent resolution within a session
//! - Durable ledger hits and integrity-checked misses
//! - Session cache invalidation after code changes and reverts
//! - Fork and local isolation from the ledger file
//! - Force deploy bypass and the live confirmation prompt

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use contract_manifest::artifact::{ArtifactSet, ArtifactSource, CompiledArtifact};
use contract_manifest::contract::{ArtifactDeployer, DeployOutcome, DeployProcedure};
use contract_manifest::environment::{
    DeployReceipt, DeployRequest, EnvError, ExecutionEnvironment, LocalVm, Signer, SnapshotId,
};
use contract_manifest::integrity;
use contract_manifest::ledger::{now_ts, DeploymentLedger, DeploymentRecord};
use contract_manifest::network::{AutoConfirm, Confirmation};
use contract_manifest::types::{chain_id_hex, Address};
use contract_manifest::{
    Config, ContractManifestationCache, ContractSelector, ExecutionContext, HandleOrigin,
    ManifestError, NamedContractSpec, NetworkDescriptor, NetworkRegistry, Persona,
    ProcedureRegistry, ResolveOverrides, SwitchRequest,
};

const SEPOLIA: u64 = 11155111;
const PINNED: &str = "0x1111111111111111111111111111111111111111";

// =============================================================================
// Fixtures
// =============================================================================

fn counter_artifact() -> CompiledArtifact {
    CompiledArtifact::new(
        "Counter",
        vec![json!({"type": "function", "name": "count", "inputs": [], "outputs": []})],
        vec![0x60, 0x80, 0x60, 0x40, 0x52],
    )
    .with_source("src/Counter.sol", "contract Counter { uint256 public count; }\n")
}

fn artifacts() -> ArtifactSet {
    let mut set = ArtifactSet::new();
    set.insert(counter_artifact());
    set
}

fn counter_spec() -> NamedContractSpec {
    NamedContractSpec {
        deploy_procedure: Some("artifact:Counter".to_string()),
        ..NamedContractSpec::new("Counter")
    }
}

/// Deploys through [`ArtifactDeployer`] and counts invocations.
struct CountingDeployer {
    calls: AtomicUsize,
}

impl CountingDeployer {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeployProcedure for CountingDeployer {
    async fn deploy(
        &self,
        contract: &str,
        env: &mut dyn ExecutionEnvironment,
        signer: &Signer,
        artifacts: &dyn ArtifactSource,
    ) -> contract_manifest::Result<DeployOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ArtifactDeployer::new("Counter")
            .deploy(contract, env, signer, artifacts)
            .await
    }
}

fn cache(procedures: ProcedureRegistry, confirmation: Arc<dyn Confirmation>) -> ContractManifestationCache {
    ContractManifestationCache::new(Arc::new(artifacts()), procedures, confirmation, "/project")
}

fn counting_cache(deployer: &Arc<CountingDeployer>) -> ContractManifestationCache {
    let mut procedures = ProcedureRegistry::new();
    procedures.register("artifact:Counter", deployer.clone());
    cache(procedures, Arc::new(AutoConfirm::yes()))
}

fn empty_registry(root: &Path) -> NetworkRegistry {
    NetworkRegistry::from_config(&Config::empty(root)).unwrap()
}

async fn local_context() -> ExecutionContext {
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

/// A live network backed by an in-process VM reporting the Sepolia chain id.
async fn live_context(db_path: &Path) -> ExecutionContext {
    let network = NetworkDescriptor::new("sepolia", Persona::Live)
        .with_expected_chain_id(SEPOLIA)
        .with_prompt_live(false)
        .with_db_path(Some(db_path.to_path_buf()))
        .with_contract(counter_spec())
        .with_environment(Box::new(LocalVm::with_chain_id("sepolia", SEPOLIA)));

    let mut registry = empty_registry(db_path.parent().unwrap());
    registry.insert(network);
    let mut ctx = ExecutionContext::new(registry);
    ctx.switch_network(SwitchRequest::named("sepolia")).await.unwrap();
    ctx
}

fn ledger_record(address: &str, integrity: &str, ts: f64) -> DeploymentRecord {
    DeploymentRecord {
        contract_address: address.parse().unwrap(),
        contract_name: Some("Counter".to_string()),
        rpc: Some("https://rpc.sepolia.test".to_string()),
        deployer: Some("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string()),
        tx_hash: Some("0xfeed".to_string()),
        broadcast_ts: ts,
        tx_envelope: json!({"chainId": chain_id_hex(SEPOLIA)}),
        receipt_envelope: json!({"status": "0x1"}),
        source_bundle: json!({"integrity": integrity}),
        abi: counter_artifact().abi,
        session_id: "earlier-session".to_string(),
        deployment_id: None,
    }
}

fn seed_ledger(path: &Path, records: &[DeploymentRecord]) {
    let ledger = DeploymentLedger::open(path).unwrap();
    for record in records {
        ledger.append(record).unwrap();
    }
}

fn current_integrity() -> String {
    integrity::digest(&counter_artifact()).unwrap().as_str().to_string()
}

// =============================================================================
// Idempotent Resolution
// =============================================================================

#[tokio::test]
async fn test_repeated_resolve_deploys_once() {
    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = local_context().await;

    let first = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    let second = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    let third = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();

    assert_eq!(deployer.calls(), 1);
    assert_eq!(first.address, second.address);
    assert_eq!(second.address, third.address);
    assert_eq!(first.origin, HandleOrigin::Deployed);
    assert_eq!(third.origin, HandleOrigin::Session);
}

#[tokio::test]
async fn test_session_cache_survives_network_round_trip() {
    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = local_context().await;
    ctx.registry_mut().insert(
        NetworkDescriptor::new("other", Persona::Fork)
            .with_environment(Box::new(LocalVm::with_chain_id("other", 10))),
    );

    let before = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    ctx.switch_network(SwitchRequest::named("other")).await.unwrap();
    ctx.switch_network(SwitchRequest::named("local")).await.unwrap();
    let after = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();

    assert_eq!(before.address, after.address);
    assert_eq!(deployer.calls(), 1);
}

// =============================================================================
// Durable Ledger
// =============================================================================

#[tokio::test]
async fn test_ledger_record_wins_on_durable_network() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");
    let recorded = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
    seed_ledger(&db_path, &[ledger_record(recorded, &current_integrity(), now_ts() - 60.0)]);

    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = live_context(&db_path).await;

    let handle = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    assert_eq!(handle.address.to_string(), recorded);
    assert_eq!(handle.origin, HandleOrigin::Ledger);
    assert_eq!(handle.abi, counter_artifact().abi);
    assert_eq!(deployer.calls(), 0);
}

#[tokio::test]
async fn test_stale_ledger_record_is_skipped_and_new_one_recorded() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");
    seed_ledger(
        &db_path,
        &[ledger_record("0x5fbdb2315678afecb367f032d93f642f64180aa3", "0badc0de", now_ts() - 60.0)],
    );

    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = live_context(&db_path).await;

    let handle = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    assert_eq!(handle.origin, HandleOrigin::Deployed);
    assert_eq!(deployer.calls(), 1);

    let all = cache
        .list_deployments(&mut ctx, &ContractSelector::parse("Counter"), None, None, false)
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].contract_address, handle.address);
    assert_eq!(all[0].session_id, cache.session_id());
    assert_eq!(all[0].chain_id(), Some(SEPOLIA));

    let checked = cache
        .list_deployments(&mut ctx, &ContractSelector::parse("Counter"), None, None, true)
        .unwrap();
    assert_eq!(checked.len(), 1);
    assert_eq!(checked[0].integrity().unwrap().as_str(), current_integrity());

    // A fresh session now resolves straight from the ledger
    let next_session = counting_cache(&deployer);
    let mut ctx = live_context(&db_path).await;
    let again = next_session
        .resolve(&mut ctx, "Counter", ResolveOverrides::default())
        .await
        .unwrap();
    assert_eq!(again.origin, HandleOrigin::Ledger);
    assert_eq!(again.address, handle.address);
    assert_eq!(deployer.calls(), 1);
}

#[tokio::test]
async fn test_ledger_for_other_chain_is_ignored() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");
    let mut mainnet = ledger_record("0x5fbdb2315678afecb367f032d93f642f64180aa3", &current_integrity(), now_ts());
    mainnet.tx_envelope = json!({"chainId": chain_id_hex(1)});
    seed_ledger(&db_path, &[mainnet]);

    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = live_context(&db_path).await;

    let handle = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    assert_eq!(handle.origin, HandleOrigin::Deployed);
    assert_eq!(deployer.calls(), 1);
}

#[tokio::test]
async fn test_name_deployment_backfills_unnamed_record() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");
    let mut unnamed = ledger_record(PINNED, &current_integrity(), now_ts());
    unnamed.contract_name = None;
    seed_ledger(&db_path, &[unnamed]);

    let cache = counting_cache(&CountingDeployer::new());
    let mut ctx = live_context(&db_path).await;
    let address: Address = PINNED.parse().unwrap();

    assert!(cache.name_deployment(&mut ctx, &address, "Counter").unwrap());
    let named = cache
        .list_deployments(&mut ctx, &ContractSelector::parse("Counter"), None, Some(1), false)
        .unwrap();
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].contract_address, address);
}

/// Live VM whose code reads fail after the deployment goes through.
struct UnreadableCodeVm {
    inner: LocalVm,
}

#[async_trait]
impl ExecutionEnvironment for UnreadableCodeVm {
    fn nickname(&self) -> &str {
        self.inner.nickname()
    }

    fn rpc_url(&self) -> Option<&str> {
        self.inner.rpc_url()
    }

    fn is_ephemeral(&self) -> bool {
        false
    }

    async fn chain_id(&self) -> Result<u64, EnvError> {
        self.inner.chain_id().await
    }

    async fn get_code(&self, _address: &Address) -> Result<Vec<u8>, EnvError> {
        Err(EnvError::Transport("connection reset by peer".to_string()))
    }

    async fn deploy(&mut self, signer: &Signer, request: DeployRequest) -> Result<DeployReceipt, EnvError> {
        self.inner.deploy(signer, request).await
    }

    async fn set_code(&mut self, address: &Address, code: &[u8]) -> Result<(), EnvError> {
        self.inner.set_code(address, code).await
    }

    async fn snapshot(&mut self) -> Result<SnapshotId, EnvError> {
        self.inner.snapshot().await
    }

    async fn revert(&mut self, id: SnapshotId) -> Result<(), EnvError> {
        self.inner.revert(id).await
    }
}

#[tokio::test]
async fn test_deploy_is_recorded_when_code_read_fails() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");
    let network = NetworkDescriptor::new("sepolia", Persona::Live)
        .with_expected_chain_id(SEPOLIA)
        .with_prompt_live(false)
        .with_db_path(Some(db_path.clone()))
        .with_contract(counter_spec())
        .with_environment(Box::new(UnreadableCodeVm {
            inner: LocalVm::with_chain_id("sepolia", SEPOLIA),
        }));
    let mut registry = empty_registry(dir.path());
    registry.insert(network);
    let mut ctx = ExecutionContext::new(registry);
    ctx.switch_network(SwitchRequest::named("sepolia")).await.unwrap();

    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let handle = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();

    assert_eq!(handle.origin, HandleOrigin::Deployed);
    assert!(handle.runtime_code.is_empty());
    assert_eq!(deployer.calls(), 1);

    let ledger = DeploymentLedger::open(&db_path).unwrap();
    assert_eq!(ledger.count().unwrap(), 1);
}

// =============================================================================
// Integrity Invalidation
// =============================================================================

#[tokio::test]
async fn test_changed_code_evicts_session_entry() {
    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = local_context().await;

    let first = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    ctx.active_mut()
        .unwrap()
        .environment_mut()
        .unwrap()
        .set_code(&first.address, &[0xde, 0xad])
        .await
        .unwrap();

    let second = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    assert_ne!(first.address, second.address);
    assert_eq!(second.origin, HandleOrigin::Deployed);
    assert_eq!(deployer.calls(), 2);
}

#[tokio::test]
async fn test_revert_evicts_session_entry() {
    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = local_context().await;

    let snapshot = ctx
        .active_mut()
        .unwrap()
        .environment_mut()
        .unwrap()
        .snapshot()
        .await
        .unwrap();
    let deployed = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    ctx.active_mut()
        .unwrap()
        .environment_mut()
        .unwrap()
        .revert(snapshot)
        .await
        .unwrap();

    let redeployed = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    assert_eq!(redeployed.origin, HandleOrigin::Deployed);
    assert_eq!(deployer.calls(), 2);
    // Nonces were rolled back too, so the same address is reused with fresh code
    assert_eq!(redeployed.address, deployed.address);
}

// =============================================================================
// Fork And Local Isolation
// =============================================================================

#[tokio::test]
async fn test_fork_never_writes_ledger() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");

    let fork = NetworkDescriptor::new("mainnet-fork", Persona::Fork)
        .with_db_path(Some(db_path.clone()))
        .with_contract(counter_spec())
        .with_environment(Box::new(LocalVm::with_chain_id("mainnet-fork", 1)));
    let mut registry = empty_registry(dir.path());
    registry.insert(fork);
    let mut ctx = ExecutionContext::new(registry);
    ctx.switch_network(SwitchRequest::named("mainnet-fork")).await.unwrap();

    let cache = cache(ProcedureRegistry::new(), Arc::new(AutoConfirm::yes()));
    let first = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    let forced = cache
        .resolve(&mut ctx, "Counter", ResolveOverrides::force_deploy())
        .await
        .unwrap();

    assert_ne!(first.address, forced.address);
    assert!(!db_path.exists());
    assert!(cache
        .list_deployments(&mut ctx, &ContractSelector::All, None, None, false)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_fork_ignores_existing_ledger_records() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");
    let mut record = ledger_record(PINNED, &current_integrity(), now_ts());
    record.tx_envelope = json!({"chainId": chain_id_hex(1)});
    seed_ledger(&db_path, &[record]);

    let fork = NetworkDescriptor::new("mainnet-fork", Persona::Fork)
        .with_db_path(Some(db_path.clone()))
        .with_contract(counter_spec())
        .with_environment(Box::new(LocalVm::with_chain_id("mainnet-fork", 1)));
    let mut registry = empty_registry(dir.path());
    registry.insert(fork);
    let mut ctx = ExecutionContext::new(registry);
    ctx.switch_network(SwitchRequest::named("mainnet-fork")).await.unwrap();

    let cache = cache(ProcedureRegistry::new(), Arc::new(AutoConfirm::yes()));
    let handle = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    assert_eq!(handle.origin, HandleOrigin::Deployed);
    assert_ne!(handle.address.to_string(), PINNED);
    assert_eq!(DeploymentLedger::open(&db_path).unwrap().count().unwrap(), 1);
}

// =============================================================================
// Force Deploy
// =============================================================================

#[tokio::test]
async fn test_force_deploy_bypasses_session_cache() {
    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = local_context().await;

    let cached = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    let forced = cache
        .resolve(&mut ctx, "Counter", ResolveOverrides::force_deploy())
        .await
        .unwrap();
    assert_ne!(cached.address, forced.address);
    assert_eq!(deployer.calls(), 2);

    // The forced deployment replaces the session entry
    let again = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await.unwrap();
    assert_eq!(again.address, forced.address);
    assert_eq!(again.origin, HandleOrigin::Session);
}

#[tokio::test]
async fn test_force_deploy_bypasses_ledger_and_appends() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");
    seed_ledger(&db_path, &[ledger_record(PINNED, &current_integrity(), now_ts() - 60.0)]);

    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = live_context(&db_path).await;

    let forced = cache
        .resolve(&mut ctx, "Counter", ResolveOverrides::force_deploy())
        .await
        .unwrap();
    assert_ne!(forced.address.to_string(), PINNED);
    assert_eq!(deployer.calls(), 1);

    let latest = cache
        .list_deployments(&mut ctx, &ContractSelector::All, None, Some(1), false)
        .unwrap();
    assert_eq!(latest[0].contract_address, forced.address);
    assert_eq!(DeploymentLedger::open(&db_path).unwrap().count().unwrap(), 2);
}

#[tokio::test]
async fn test_force_deploy_without_procedure_fails() {
    let cache = cache(ProcedureRegistry::new(), Arc::new(AutoConfirm::yes()));
    let mut ctx = local_context().await;
    let result = cache
        .resolve(&mut ctx, "Token", ResolveOverrides::force_deploy())
        .await;
    assert!(matches!(result, Err(ManifestError::MissingDeployProcedure(_))));
}

// =============================================================================
// Pinned Addresses
// =============================================================================

#[tokio::test]
async fn test_pinned_address_skips_ledger_and_session() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");
    seed_ledger(
        &db_path,
        &[ledger_record("0x5fbdb2315678afecb367f032d93f642f64180aa3", &current_integrity(), now_ts())],
    );

    let deployer = CountingDeployer::new();
    let cache = counting_cache(&deployer);
    let mut ctx = live_context(&db_path).await;
    let pinned: Address = PINNED.parse().unwrap();

    let handle = cache.resolve(&mut ctx, "Counter", ResolveOverrides::at(pinned)).await.unwrap();
    assert_eq!(handle.address, pinned);
    assert_eq!(handle.origin, HandleOrigin::Pinned);
    assert_eq!(handle.abi, counter_artifact().abi);
    assert_eq!(ctx.active().unwrap().session_len(), 0);
    assert_eq!(deployer.calls(), 0);
}

// =============================================================================
// Live Confirmation
// =============================================================================

#[tokio::test]
async fn test_declined_prompt_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");

    let network = NetworkDescriptor::new("sepolia", Persona::Live)
        .with_prompt_live(true)
        .with_db_path(Some(db_path.clone()))
        .with_contract(counter_spec())
        .with_environment(Box::new(LocalVm::with_chain_id("sepolia", SEPOLIA)));
    let mut registry = empty_registry(dir.path());
    registry.insert(network);
    let mut ctx = ExecutionContext::new(registry);
    ctx.switch_network(SwitchRequest::named("sepolia")).await.unwrap();

    let confirm = Arc::new(AutoConfirm::no());
    let cache = cache(ProcedureRegistry::new(), confirm.clone());
    let result = cache.resolve(&mut ctx, "Counter", ResolveOverrides::default()).await;

    assert!(matches!(result, Err(ManifestError::Declined)));
    assert_eq!(confirm.times_asked(), 1);
    assert!(!db_path.exists());
    assert_eq!(ctx.active().unwrap().session_len(), 0);
}

#[tokio::test]
async fn test_accepted_prompt_asked_once_per_network() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".deployments.db");

    let network = NetworkDescriptor::new("sepolia", Persona::Live)
        .with_prompt_live(true)
        .with_db_path(Some(db_path.clone()))
        .with_contract(counter_spec())
        .with_environment(Box::new(LocalVm::with_chain_id("sepolia", SEPOLIA)));
    let mut registry = empty_registry(dir.path());
    registry.insert(network);
    let mut ctx = ExecutionContext::new(registry);
    ctx.switch_network(SwitchRequest::named("sepolia")).await.unwrap();

    let confirm = Arc::new(AutoConfirm::yes());
    let cache = cache(ProcedureRegistry::new(), confirm.clone());
    cache.resolve(&mut ctx, "Counter", ResolveOverrides::force_deploy()).await.unwrap();
    cache.resolve(&mut ctx, "Counter", ResolveOverrides::force_deploy()).await.unwrap();

    assert_eq!(confirm.times_asked(), 1);
    assert_eq!(DeploymentLedger::open(&db_path).unwrap().count().unwrap(), 2);
}

// =============================================================================
// Chain Id
// =============================================================================

#[tokio::test]
async fn test_chain_id_mismatch_on_switch() {
    let dir = TempDir::new().unwrap();
    let network = NetworkDescriptor::new("sepolia", Persona::Live)
        .with_expected_chain_id(SEPOLIA)
        .with_environment(Box::new(LocalVm::with_chain_id("sepolia", 1)));
    let mut registry = empty_registry(dir.path());
    registry.insert(network);
    let mut ctx = ExecutionContext::new(registry);

    let result = ctx.switch_network(SwitchRequest::named("sepolia")).await;
    assert!(matches!(result, Err(ManifestError::ChainIdMismatch { .. })));
    assert!(ctx.active_name().is_none());
}
