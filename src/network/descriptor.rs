//! Network descriptors
//!
//! One [`NetworkDescriptor`] per configured network. It is built when the
//! configuration loads and mutated in place as the network is activated:
//! the execution environment is created, the chain id is read and frozen,
//! and the session cache and ledger handle fill up.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::prompt::Confirmation;
use crate::config::{Config, NetworkConfig, LOCAL_NETWORK};
use crate::contract::{ContractHandle, NamedContractSpec};
use crate::environment::{
    DelegatedSigner, ExecutionEnvironment, ForkVm, LocalAccount, LocalVm, RpcEnvironment, Signer,
};
use crate::error::{ManifestError, Result};
use crate::explorer::ExplorerClient;
use crate::ledger::DeploymentLedger;
use crate::types::Address;

/// Execution persona of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    /// In-process VM, gone with the process
    Local,
    /// Local overlay on a live chain
    Fork,
    /// A real, persistent network
    Live,
}

impl Persona {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Persona::Local)
    }

    pub fn is_fork(&self) -> bool {
        matches!(self, Persona::Fork)
    }

    /// Whether deployments on this persona outlive the process.
    pub fn is_durable(&self) -> bool {
        !self.is_ephemeral() && !self.is_fork()
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Persona::Local => "local",
            Persona::Fork => "fork",
            Persona::Live => "live",
        };
        f.write_str(s)
    }
}

/// Settings a switch may override, kept for rollback.
struct SavedSettings {
    persona: Persona,
    prompt_live: bool,
    db_path: Option<PathBuf>,
    expected_chain_id: Option<u64>,
    had_env: bool,
}

pub struct NetworkDescriptor {
    name: String,
    persona: Persona,
    url: Option<String>,
    /// Chain id the configuration expects, if any
    expected_chain_id: Option<u64>,
    /// Chain id observed on first activation; never changes afterwards
    chain_id: Option<u64>,
    prompt_live: bool,
    /// Ledger file; `None` keeps the ledger in memory
    db_path: Option<PathBuf>,
    rpc_timeout: Duration,
    explorer: Option<ExplorerClient>,
    contracts: BTreeMap<String, NamedContractSpec>,
    signer: Signer,

    env: Option<Box<dyn ExecutionEnvironment>>,
    session_cache: HashMap<String, ContractHandle>,
    ledger: Option<DeploymentLedger>,
    confirmed: bool,
}

impl fmt::Debug for NetworkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkDescriptor")
            .field("name", &self.name)
            .field("persona", &self.persona)
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .field("activated", &self.env.is_some())
            .field("cached", &self.session_cache.len())
            .finish()
    }
}

impl NetworkDescriptor {
    /// A bare descriptor with persona defaults. Live networks prompt before
    /// mutating and persist to `.deployments.db` in the working directory.
    pub fn new(name: impl Into<String>, persona: Persona) -> Self {
        let durable = persona.is_durable();
        Self {
            name: name.into(),
            persona,
            url: None,
            expected_chain_id: None,
            chain_id: None,
            prompt_live: durable,
            db_path: durable.then(|| PathBuf::from(".deployments.db")),
            rpc_timeout: Duration::from_secs(30),
            explorer: None,
            contracts: BTreeMap::new(),
            signer: Signer::dev_default(),
            env: None,
            session_cache: HashMap::new(),
            ledger: None,
            confirmed: false,
        }
    }

    /// The built-in in-process network.
    pub fn local(contracts: BTreeMap<String, NamedContractSpec>) -> Self {
        let mut descriptor = Self::new(LOCAL_NETWORK, Persona::Local);
        descriptor.contracts = contracts;
        descriptor
    }

    /// Build from a `[networks.<name>]` table.
    pub fn from_config(name: &str, network: &NetworkConfig, config: &Config) -> Result<Self> {
        let persona = if network.is_fork() { Persona::Fork } else { Persona::Live };
        let mut descriptor = Self::new(name, persona);

        descriptor.url = network.url.clone();
        descriptor.expected_chain_id = network.chain_id;
        descriptor.rpc_timeout = config.rpc_timeout(Some(network));
        descriptor.contracts = config.contract_specs(name)?;

        if persona.is_durable() {
            descriptor.prompt_live = network.prompt_live.unwrap_or(true);
            descriptor.db_path = if network.save_to_db.unwrap_or(true) {
                config.db_path_for(Some(network))
            } else {
                None
            };
        } else {
            descriptor.prompt_live = false;
            descriptor.db_path = None;
        }

        let explorer_uri = network
            .explorer_uri
            .clone()
            .or_else(|| config.project.explorer_uri.clone());
        if let Some(uri) = explorer_uri {
            let api_key = network
                .explorer_api_key
                .clone()
                .or_else(|| config.project.explorer_api_key.clone());
            descriptor.explorer = Some(ExplorerClient::new(uri, api_key, descriptor.rpc_timeout));
        }

        descriptor.signer = build_signer(name, network, descriptor.rpc_timeout)?;
        Ok(descriptor)
    }

    /// A network known only by its RPC endpoint.
    pub fn adhoc(url: &str, is_fork: bool, chain_id: Option<u64>, config: &Config) -> Self {
        let persona = if is_fork { Persona::Fork } else { Persona::Live };
        let mut descriptor = Self::new(url, persona);
        descriptor.url = Some(url.to_string());
        descriptor.expected_chain_id = chain_id;
        descriptor.rpc_timeout = config.rpc_timeout(None);
        descriptor.db_path = if persona.is_durable() {
            config.db_path_for(None)
        } else {
            None
        };
        descriptor
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_expected_chain_id(mut self, chain_id: u64) -> Self {
        self.expected_chain_id = Some(chain_id);
        self
    }

    pub fn with_prompt_live(mut self, prompt_live: bool) -> Self {
        self.prompt_live = prompt_live;
        self
    }

    /// Ledger file for durable networks; `None` keeps it in memory.
    pub fn with_db_path(mut self, db_path: Option<PathBuf>) -> Self {
        self.db_path = db_path;
        self
    }

    pub fn with_contract(mut self, spec: NamedContractSpec) -> Self {
        self.contracts.insert(spec.name.clone(), spec);
        self
    }

    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_explorer(mut self, explorer: ExplorerClient) -> Self {
        self.explorer = Some(explorer);
        self
    }

    /// Use an already-built environment instead of creating one on activation.
    pub fn with_environment(mut self, env: Box<dyn ExecutionEnvironment>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.persona.is_ephemeral()
    }

    pub fn is_fork(&self) -> bool {
        self.persona.is_fork()
    }

    pub fn is_durable(&self) -> bool {
        self.persona.is_durable()
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn explorer(&self) -> Option<&ExplorerClient> {
        self.explorer.as_ref()
    }

    pub fn expected_chain_id(&self) -> Option<u64> {
        self.expected_chain_id
    }

    /// Frozen chain id, once activated.
    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn require_chain_id(&self) -> Result<u64> {
        self.chain_id
            .ok_or_else(|| ManifestError::NotActivated(self.name.clone()))
    }

    pub fn is_activated(&self) -> bool {
        self.env.is_some() && self.chain_id.is_some()
    }

    /// Configured view of a contract; unknown names get an empty spec.
    pub fn contract_spec(&self, name: &str) -> NamedContractSpec {
        self.contracts
            .get(name)
            .cloned()
            .unwrap_or_else(|| NamedContractSpec::new(name))
    }

    pub fn contract_names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    /// Change the chain id this network is expected to report.
    pub fn set_expected_chain_id(&mut self, chain_id: u64) -> Result<()> {
        if let Some(frozen) = self.chain_id {
            if frozen != chain_id {
                return Err(ManifestError::ChainIdMismatch {
                    network: self.name.clone(),
                    configured: chain_id,
                    observed: frozen,
                });
            }
        }
        self.expected_chain_id = Some(chain_id);
        Ok(())
    }

    /// Turn a not-yet-activated live network into a fork of itself.
    pub fn make_fork(&mut self) -> Result<()> {
        match self.persona {
            Persona::Fork => Ok(()),
            Persona::Local => Err(ManifestError::Config(format!(
                "network {} has no upstream to fork",
                self.name
            ))),
            Persona::Live if self.env.is_some() => Err(ManifestError::Config(format!(
                "network {} is already active and cannot be forked",
                self.name
            ))),
            Persona::Live => {
                self.persona = Persona::Fork;
                self.prompt_live = false;
                self.db_path = None;
                self.ledger = None;
                Ok(())
            }
        }
    }

    /// Create the execution environment if needed, then read and freeze the
    /// chain id. Returns the frozen id.
    pub async fn activate(&mut self) -> Result<u64> {
        if self.env.is_none() {
            let env: Box<dyn ExecutionEnvironment> = match self.persona {
                Persona::Local => Box::new(LocalVm::new(self.name.clone())),
                Persona::Fork => {
                    let url = self.require_url()?.to_string();
                    Box::new(ForkVm::connect(&self.name, &url, self.rpc_timeout).await?)
                }
                Persona::Live => {
                    let url = self.require_url()?.to_string();
                    Box::new(RpcEnvironment::new(self.name.clone(), url, self.rpc_timeout, false))
                }
            };
            self.env = Some(env);
        }

        let observed = self.environment()?.chain_id().await?;
        self.freeze_chain_id(observed)
    }

    /// Apply switch-time overrides, then activate. If anything fails the
    /// descriptor keeps its previous persona, expectation and environment.
    pub async fn activate_with(&mut self, fork: bool, chain_id: Option<u64>) -> Result<u64> {
        let saved = SavedSettings {
            persona: self.persona,
            prompt_live: self.prompt_live,
            db_path: self.db_path.clone(),
            expected_chain_id: self.expected_chain_id,
            had_env: self.env.is_some(),
        };

        let result = self.apply_and_activate(fork, chain_id).await;
        if let Err(e) = &result {
            debug!(network = %self.name, error = %e, "Activation failed, restoring settings");
            self.restore(saved);
        }
        result
    }

    async fn apply_and_activate(&mut self, fork: bool, chain_id: Option<u64>) -> Result<u64> {
        if fork {
            self.make_fork()?;
        }
        if let Some(chain_id) = chain_id {
            self.set_expected_chain_id(chain_id)?;
        }
        self.activate().await
    }

    fn restore(&mut self, saved: SavedSettings) {
        if saved.persona != self.persona {
            // The ledger handle was dropped by make_fork and reopens lazily
            self.persona = saved.persona;
            self.prompt_live = saved.prompt_live;
            self.db_path = saved.db_path;
        }
        self.expected_chain_id = saved.expected_chain_id;
        if !saved.had_env {
            self.env = None;
        }
    }

    fn freeze_chain_id(&mut self, observed: u64) -> Result<u64> {
        if let Some(frozen) = self.chain_id {
            if frozen != observed {
                return Err(ManifestError::ChainIdMismatch {
                    network: self.name.clone(),
                    configured: frozen,
                    observed,
                });
            }
            return Ok(frozen);
        }

        // Forks and the local VM report whatever they run; only live
        // networks are held to their configured id
        if self.persona == Persona::Live {
            if let Some(expected) = self.expected_chain_id {
                if expected != observed {
                    return Err(ManifestError::ChainIdMismatch {
                        network: self.name.clone(),
                        configured: expected,
                        observed,
                    });
                }
            }
        }

        self.chain_id = Some(observed);
        info!(network = %self.name, persona = %self.persona, chain_id = observed, "Network activated");
        Ok(observed)
    }

    fn require_url(&self) -> Result<&str> {
        self.url.as_deref().ok_or_else(|| {
            ManifestError::Config(format!("network {} has no url", self.name))
        })
    }

    pub fn environment(&self) -> Result<&dyn ExecutionEnvironment> {
        match self.env.as_deref() {
            Some(env) => Ok(env),
            None => Err(ManifestError::NotActivated(self.name.clone())),
        }
    }

    pub fn environment_mut(&mut self) -> Result<&mut dyn ExecutionEnvironment> {
        match self.env.as_deref_mut() {
            Some(env) => Ok(env),
            None => Err(ManifestError::NotActivated(self.name.clone())),
        }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Environment and signer together, as a deploy needs both.
    pub fn deploy_parts(&mut self) -> Result<(&mut dyn ExecutionEnvironment, &Signer)> {
        match self.env.as_deref_mut() {
            Some(env) => Ok((env, &self.signer)),
            None => Err(ManifestError::NotActivated(self.name.clone())),
        }
    }

    /// Ask once before the first state change on a live network.
    pub async fn confirm_mutation(&mut self, confirmation: &dyn Confirmation, action: &str) -> Result<()> {
        if self.persona != Persona::Live || !self.prompt_live || self.confirmed {
            return Ok(());
        }

        let question = format!(
            "About to {} on live network {} (chain id {}).",
            action,
            self.name,
            self.chain_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        if confirmation.confirm(&question).await? {
            self.confirmed = true;
            Ok(())
        } else {
            info!(network = %self.name, "Operation cancelled.");
            Err(ManifestError::Declined)
        }
    }

    // Session cache

    pub fn cached(&self, name: &str) -> Option<&ContractHandle> {
        self.session_cache.get(name)
    }

    pub fn cache_handle(&mut self, handle: ContractHandle) {
        debug!(network = %self.name, contract = %handle.name, address = %handle.address, "Cached in session");
        self.session_cache.insert(handle.name.clone(), handle);
    }

    pub fn evict(&mut self, name: &str) -> Option<ContractHandle> {
        self.session_cache.remove(name)
    }

    pub fn session_len(&self) -> usize {
        self.session_cache.len()
    }

    // Ledger

    /// Ledger for reads. `None` on non-durable networks and on first run,
    /// before the ledger file exists.
    pub fn read_ledger(&mut self) -> Result<Option<&DeploymentLedger>> {
        if !self.is_durable() {
            return Ok(None);
        }
        if self.ledger.is_none() {
            match self.db_path.clone() {
                None => self.ledger = Some(DeploymentLedger::open_in_memory()?),
                Some(path) => match DeploymentLedger::open_existing(&path)? {
                    Some(ledger) => self.ledger = Some(ledger),
                    None => {
                        warn!(
                            network = %self.name,
                            path = %path.display(),
                            "No deployment ledger yet, nothing recorded for this network"
                        );
                        return Ok(None);
                    }
                },
            }
        }
        Ok(self.ledger.as_ref())
    }

    /// Ledger for writes, created on demand. `None` on non-durable networks.
    pub fn write_ledger(&mut self) -> Result<Option<&DeploymentLedger>> {
        if !self.is_durable() {
            return Ok(None);
        }
        if self.ledger.is_none() {
            let ledger = match &self.db_path {
                None => DeploymentLedger::open_in_memory()?,
                Some(path) => DeploymentLedger::open(path)?,
            };
            self.ledger = Some(ledger);
        }
        Ok(self.ledger.as_ref())
    }
}

fn build_signer(name: &str, network: &NetworkConfig, timeout: Duration) -> Result<Signer> {
    let account = network
        .default_account
        .as_deref()
        .map(str::parse::<Address>)
        .transpose()?;

    match (account, network.signer_url.as_deref()) {
        (Some(address), Some(url)) => Ok(Signer::Delegated(DelegatedSigner::new(address, url, timeout))),
        (Some(address), None) => Ok(Signer::Local(LocalAccount { address })),
        (None, Some(_)) => Err(ManifestError::Config(format!(
            "network {}: signer_url requires default_account",
            name
        ))),
        (None, None) => Ok(Signer::dev_default()),
    }
}
