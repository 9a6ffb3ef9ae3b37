//! Project configuration
//!
//! Read from `manifest.toml`, found by walking up from the working directory.
//!
//! ```toml
//! [project]
//! build_dir = "out"
//! default_network = "sepolia"
//!
//! [networks.contracts.Counter]
//! deploy_procedure = "artifact:Counter"
//!
//! [networks.sepolia]
//! url = "${SEPOLIA_RPC_URL}"
//! chain_id = 11155111
//!
//! [networks.sepolia.contracts.Counter]
//! address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
//! ```
//!
//! `[networks.contracts]` holds defaults for every network; a network's own
//! `contracts` table overrides them field by field.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::contract::{AbiSource, NamedContractSpec};
use crate::error::{ManifestError, Result};
use crate::types::Address;

/// Project file name searched for in the working directory and its parents.
pub const CONFIG_FILE_NAME: &str = "manifest.toml";

/// Name of the built-in in-process network.
pub const LOCAL_NETWORK: &str = "local";

/// Ledger path used by networks that keep an in-memory ledger.
pub const MEMORY_DB_PATH: &str = ":memory:";

/// Keys the built-in local network may not set.
const LOCAL_RESTRICTED_KEYS: [&str; 5] = ["url", "chain_id", "fork", "explorer_uri", "explorer_api_key"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub networks: NetworksConfig,

    /// Directory the configuration was loaded from
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory compiled artifacts are read from
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Network used when none is given on the command line
    #[serde(default)]
    pub default_network: Option<String>,

    /// Ledger file for durable networks without their own `db_path`
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// JSON-RPC request deadline in seconds
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// Explorer API used when a network sets none
    #[serde(default)]
    pub explorer_uri: Option<String>,

    #[serde(default)]
    pub explorer_api_key: Option<String>,

    /// Dotenv file loaded before `${VAR}` expansion, relative to the root
    #[serde(default = "default_dot_env")]
    pub dot_env: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            default_network: None,
            db_path: default_db_path(),
            rpc_timeout_secs: default_rpc_timeout(),
            explorer_uri: None,
            explorer_api_key: None,
            dot_env: default_dot_env(),
        }
    }
}

/// `[networks]`: shared contract defaults plus one table per network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworksConfig {
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractConfig>,

    #[serde(flatten)]
    pub named: BTreeMap<String, NetworkConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    #[serde(default)]
    pub url: Option<String>,

    /// Expected chain id; checked against the node on first connection
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Run against a local fork of `url`
    #[serde(default)]
    pub fork: Option<bool>,

    /// Ask before the first state-changing operation
    #[serde(default)]
    pub prompt_live: Option<bool>,

    /// Persist deployments to the ledger file
    #[serde(default)]
    pub save_to_db: Option<bool>,

    #[serde(default)]
    pub db_path: Option<String>,

    #[serde(default)]
    pub explorer_uri: Option<String>,

    #[serde(default)]
    pub explorer_api_key: Option<String>,

    /// Sender address
    #[serde(default)]
    pub default_account: Option<String>,

    /// Endpoint of an out-of-process signer for `default_account`
    #[serde(default)]
    pub signer_url: Option<String>,

    #[serde(default)]
    pub rpc_timeout_secs: Option<u64>,

    #[serde(default)]
    pub contracts: BTreeMap<String, ContractConfig>,
}

impl NetworkConfig {
    pub fn is_fork(&self) -> bool {
        self.fork.unwrap_or(false)
    }

    fn set_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.url.is_some() {
            keys.push("url");
        }
        if self.chain_id.is_some() {
            keys.push("chain_id");
        }
        if self.fork.is_some() {
            keys.push("fork");
        }
        if self.explorer_uri.is_some() {
            keys.push("explorer_uri");
        }
        if self.explorer_api_key.is_some() {
            keys.push("explorer_api_key");
        }
        keys
    }
}

/// ABI setting: an inline list, or a string naming a JSON file or a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AbiSetting {
    Inline(Vec<Value>),
    Reference(String),
}

impl AbiSetting {
    fn to_source(&self) -> AbiSource {
        match self {
            AbiSetting::Inline(abi) => AbiSource::Inline(abi.clone()),
            AbiSetting::Reference(r) if r.ends_with(".json") => AbiSource::File(PathBuf::from(r)),
            AbiSetting::Reference(r) => AbiSource::Artifact(r.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractConfig {
    #[serde(default)]
    pub force_deploy: Option<bool>,

    #[serde(default)]
    pub abi: Option<AbiSetting>,

    #[serde(default)]
    pub abi_from_explorer: Option<bool>,

    #[serde(default, alias = "deployer_script")]
    pub deploy_procedure: Option<String>,

    #[serde(default)]
    pub address: Option<String>,
}

impl ContractConfig {
    pub fn to_spec(&self, name: &str) -> Result<NamedContractSpec> {
        let address = self
            .address
            .as_deref()
            .map(str::parse::<Address>)
            .transpose()
            .map_err(|_| {
                ManifestError::Config(format!(
                    "contract {}: invalid address {:?}",
                    name,
                    self.address.as_deref().unwrap_or_default()
                ))
            })?;

        Ok(NamedContractSpec {
            name: name.to_string(),
            force_deploy: self.force_deploy,
            abi: self.abi.as_ref().map(AbiSetting::to_source),
            abi_from_explorer: self.abi_from_explorer,
            deploy_procedure: self.deploy_procedure.clone(),
            address,
        })
    }
}

// Defaults
fn default_build_dir() -> PathBuf { PathBuf::from("out") }
fn default_db_path() -> String { ".deployments.db".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_dot_env() -> String { ".env".to_string() }

impl Config {
    /// Parse configuration text. `root` anchors relative paths.
    pub fn from_toml_str(raw: &str, root: &Path) -> Result<Self> {
        let mut value: toml::Value = toml::from_str(raw)?;
        let dot_env = value
            .get("project")
            .and_then(|p| p.get("dot_env"))
            .and_then(toml::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(default_dot_env);
        load_dot_env(&root.join(dot_env));
        expand_env_in(&mut value);
        let mut config: Config = value.try_into()?;
        config.root = root.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file; its directory becomes the project root.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(path = %path.display(), "Loading configuration");
        Self::from_toml_str(&raw, &root)
    }

    /// Defaults only, rooted at `root`.
    pub fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }

    /// Walk up from `start` looking for [`CONFIG_FILE_NAME`].
    pub fn discover(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, network) in &self.networks.named {
            if name == LOCAL_NETWORK {
                let set = network.set_keys();
                if !set.is_empty() {
                    return Err(ManifestError::Config(format!(
                        "network {} may not set {} (restricted: {})",
                        LOCAL_NETWORK,
                        set.join(", "),
                        LOCAL_RESTRICTED_KEYS.join(", ")
                    )));
                }
                if network.save_to_db == Some(true) || network.prompt_live == Some(true) {
                    return Err(ManifestError::Config(format!(
                        "network {} is ephemeral: save_to_db and prompt_live must be false",
                        LOCAL_NETWORK
                    )));
                }
            } else {
                if network.url.is_none() {
                    return Err(ManifestError::Config(format!("network {} has no url", name)));
                }
                if network.is_fork() && network.save_to_db == Some(true) {
                    return Err(ManifestError::Config(format!(
                        "network {} is a fork and cannot save to the deployment ledger",
                        name
                    )));
                }
            }

            for spec in self.contract_specs(name)?.values() {
                spec.validate()?;
            }
        }

        if let Some(default) = &self.project.default_network {
            if default != LOCAL_NETWORK && !self.networks.named.contains_key(default) {
                return Err(ManifestError::NetworkNotFound(default.clone()));
            }
        }
        Ok(())
    }

    /// Contract specs for `network`, with shared defaults merged underneath.
    pub fn contract_specs(&self, network: &str) -> Result<BTreeMap<String, NamedContractSpec>> {
        let overrides = self.networks.named.get(network).map(|n| &n.contracts);
        let names: BTreeSet<&String> = self
            .networks
            .contracts
            .keys()
            .chain(overrides.into_iter().flat_map(|c| c.keys()))
            .collect();

        let mut specs = BTreeMap::new();
        for name in names {
            let defaults = match self.networks.contracts.get(name) {
                Some(c) => c.to_spec(name)?,
                None => NamedContractSpec::new(name.as_str()),
            };
            let spec = match overrides.and_then(|c| c.get(name)) {
                Some(c) => c.to_spec(name)?.merge(&defaults),
                None => defaults,
            };
            specs.insert(name.clone(), spec);
        }
        Ok(specs)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve_path(&self.project.build_dir.to_string_lossy())
    }

    pub fn rpc_timeout(&self, network: Option<&NetworkConfig>) -> Duration {
        let secs = network
            .and_then(|n| n.rpc_timeout_secs)
            .unwrap_or(self.project.rpc_timeout_secs);
        Duration::from_secs(secs)
    }

    /// Ledger location for a network; `None` means in-memory.
    pub fn db_path_for(&self, network: Option<&NetworkConfig>) -> Option<PathBuf> {
        let raw = network
            .and_then(|n| n.db_path.as_deref())
            .unwrap_or(&self.project.db_path);
        if raw == MEMORY_DB_PATH {
            return None;
        }
        Some(self.resolve_path(raw))
    }

    /// Expand `~` and anchor relative paths at the project root.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        if raw == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
        if let Some(rest) = raw.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }
}

fn expand_env_in(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => {
            if s.contains('$') {
                *s = expand_env(s);
            }
        }
        toml::Value::Array(items) => items.iter_mut().for_each(expand_env_in),
        toml::Value::Table(table) => table.iter_mut().for_each(|(_, v)| expand_env_in(v)),
        _ => {}
    }
}

/// Replace `${VAR}` and `$VAR` with the value of `VAR`. Unset variables are
/// left as written.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let (var, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .char_indices()
                .find(|&(i, c)| !(c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if var.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }
        match std::env::var(var) {
            Ok(val) => out.push_str(&val),
            Err(_) => {
                warn!(variable = var, "Environment variable not set");
                out.push_str(&rest[start..start + 1 + consumed]);
            }
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// Load `KEY=value` pairs from the project's dotenv file into the process
/// environment. Variables already set win; a missing file is not an error.
fn load_dot_env(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Cannot read environment file"),
    }
}
