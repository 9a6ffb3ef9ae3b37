//! Named contracts, resolved handles and deploy procedures
//!
//! A [`NamedContractSpec`] is what the project says about a contract on a
//! network. A [`ContractHandle`] is what resolution produced. Deployment is
//! delegated to a [`DeployProcedure`] looked up by reference in a
//! [`ProcedureRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::artifact::{ArtifactSource, CompiledArtifact};
use crate::environment::{DeployReceipt, DeployRequest, ExecutionEnvironment, Signer};
use crate::error::{ManifestError, Result};
use crate::integrity::IntegrityDigest;
use crate::types::Address;

/// Reference prefix that deploys a compiled artifact directly.
pub const ARTIFACT_PROCEDURE_PREFIX: &str = "artifact:";

/// Where a pinned contract's ABI comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AbiSource {
    /// ABI entries written into the configuration
    Inline(Vec<Value>),
    /// A JSON file holding either an ABI array or an artifact with `abi`
    File(PathBuf),
    /// The compiled artifact of the named contract
    Artifact(String),
}

impl AbiSource {
    /// Load the ABI. Relative file paths resolve against `root`.
    pub fn load(&self, root: &Path, artifacts: &dyn ArtifactSource) -> Result<Vec<Value>> {
        match self {
            AbiSource::Inline(abi) => Ok(abi.clone()),
            AbiSource::File(path) => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    root.join(path)
                };
                let raw = std::fs::read_to_string(&path)?;
                match serde_json::from_str::<Value>(&raw)? {
                    Value::Array(items) => Ok(items),
                    Value::Object(mut obj) => match obj.remove("abi") {
                        Some(Value::Array(items)) => Ok(items),
                        _ => Err(ManifestError::Config(format!(
                            "{} has no abi array",
                            path.display()
                        ))),
                    },
                    _ => Err(ManifestError::Config(format!(
                        "{} is not an ABI file",
                        path.display()
                    ))),
                }
            }
            AbiSource::Artifact(name) => artifacts
                .locate(name)?
                .map(|artifact| artifact.abi)
                .ok_or_else(|| ManifestError::ArtifactNotFound(name.clone())),
        }
    }
}

/// Per-network view of a named contract. Unset fields fall back to the
/// project-wide defaults via [`merge`](Self::merge).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedContractSpec {
    pub name: String,
    pub force_deploy: Option<bool>,
    pub abi: Option<AbiSource>,
    pub abi_from_explorer: Option<bool>,
    /// Opaque reference resolved through a [`ProcedureRegistry`]
    pub deploy_procedure: Option<String>,
    /// Pinned address; skips the ledger and session cache
    pub address: Option<Address>,
}

impl NamedContractSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Field-by-field merge where values already set on `self` win.
    pub fn merge(self, defaults: &NamedContractSpec) -> Self {
        Self {
            name: self.name,
            force_deploy: self.force_deploy.or(defaults.force_deploy),
            abi: self.abi.or_else(|| defaults.abi.clone()),
            abi_from_explorer: self.abi_from_explorer.or(defaults.abi_from_explorer),
            deploy_procedure: self
                .deploy_procedure
                .or_else(|| defaults.deploy_procedure.clone()),
            address: self.address.or(defaults.address),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.abi.is_some() && self.wants_explorer_abi() {
            return Err(ManifestError::ConflictingAbiSources(self.name.clone()));
        }
        Ok(())
    }

    pub fn is_force_deploy(&self) -> bool {
        self.force_deploy.unwrap_or(false)
    }

    pub fn wants_explorer_abi(&self) -> bool {
        self.abi_from_explorer.unwrap_or(false)
    }
}

/// How a handle was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleOrigin {
    Pinned,
    Ledger,
    Session,
    Deployed,
}

impl fmt::Display for HandleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandleOrigin::Pinned => "pinned",
            HandleOrigin::Ledger => "ledger",
            HandleOrigin::Session => "session",
            HandleOrigin::Deployed => "deployed",
        };
        f.write_str(s)
    }
}

/// A usable reference to a contract at an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractHandle {
    pub name: String,
    pub address: Address,
    pub abi: Vec<Value>,
    pub integrity: Option<IntegrityDigest>,
    pub deploy_procedure: Option<String>,
    /// Artifact bytecode the contract was deployed from
    #[serde(with = "crate::types::hex_bytes")]
    pub bytecode: Vec<u8>,
    /// Code observed at the address right after deployment
    #[serde(with = "crate::types::hex_bytes")]
    pub runtime_code: Vec<u8>,
    pub origin: HandleOrigin,
}

impl ContractHandle {
    /// A handle with no code or integrity attached.
    pub fn bare(name: impl Into<String>, address: Address, abi: Vec<Value>, origin: HandleOrigin) -> Self {
        Self {
            name: name.into(),
            address,
            abi,
            integrity: None,
            deploy_procedure: None,
            bytecode: Vec::new(),
            runtime_code: Vec::new(),
            origin,
        }
    }

    /// Whether `code` read from the chain is what this handle was built from.
    pub fn matches_code(&self, code: &[u8]) -> bool {
        if code.is_empty() {
            return false;
        }
        (!self.bytecode.is_empty() && code == self.bytecode.as_slice())
            || (!self.runtime_code.is_empty() && code == self.runtime_code.as_slice())
    }

    pub fn with_origin(mut self, origin: HandleOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// What a deploy procedure hands back.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub address: Address,
    /// Artifact the deployment was built from; its digest is recorded
    pub artifact: CompiledArtifact,
    pub receipt: DeployReceipt,
}

/// Caller-supplied deployment logic.
#[async_trait]
pub trait DeployProcedure: Send + Sync {
    async fn deploy(
        &self,
        contract: &str,
        env: &mut dyn ExecutionEnvironment,
        signer: &Signer,
        artifacts: &dyn ArtifactSource,
    ) -> Result<DeployOutcome>;
}

/// Deploys a compiled artifact's creation code as-is.
#[derive(Debug, Clone)]
pub struct ArtifactDeployer {
    artifact_name: String,
}

impl ArtifactDeployer {
    pub fn new(artifact_name: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
        }
    }

    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }
}

#[async_trait]
impl DeployProcedure for ArtifactDeployer {
    async fn deploy(
        &self,
        contract: &str,
        env: &mut dyn ExecutionEnvironment,
        signer: &Signer,
        artifacts: &dyn ArtifactSource,
    ) -> Result<DeployOutcome> {
        let artifact = artifacts
            .locate(&self.artifact_name)?
            .ok_or_else(|| ManifestError::ArtifactNotFound(self.artifact_name.clone()))?;
        if artifact.bytecode.is_empty() {
            return Err(ManifestError::ArtifactInvalid {
                contract: contract.to_string(),
                reason: "empty bytecode".to_string(),
            });
        }

        info!(
            contract = contract,
            artifact = %self.artifact_name,
            network = env.nickname(),
            "Deploying artifact"
        );
        let receipt = env
            .deploy(signer, DeployRequest::new(artifact.bytecode.clone()))
            .await?;

        Ok(DeployOutcome {
            address: receipt.contract_address,
            artifact,
            receipt,
        })
    }
}

/// Deploy procedures by reference.
#[derive(Default, Clone)]
pub struct ProcedureRegistry {
    procedures: HashMap<String, Arc<dyn DeployProcedure>>,
}

impl fmt::Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.procedures.keys().collect();
        names.sort();
        f.debug_struct("ProcedureRegistry")
            .field("procedures", &names)
            .finish()
    }
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reference: impl Into<String>, procedure: Arc<dyn DeployProcedure>) {
        let reference = reference.into();
        debug!(reference = %reference, "Registered deploy procedure");
        self.procedures.insert(reference, procedure);
    }

    /// Look up `reference`. `artifact:<Name>` always resolves to an
    /// [`ArtifactDeployer`] unless a procedure was registered under that exact
    /// reference.
    pub fn resolve(&self, contract: &str, reference: &str) -> Result<Arc<dyn DeployProcedure>> {
        if let Some(procedure) = self.procedures.get(reference) {
            return Ok(Arc::clone(procedure));
        }
        if let Some(name) = reference.strip_prefix(ARTIFACT_PROCEDURE_PREFIX) {
            if !name.is_empty() {
                return Ok(Arc::new(ArtifactDeployer::new(name)));
            }
        }
        Err(ManifestError::UnknownDeployProcedure {
            contract: contract.to_string(),
            reference: reference.to_string(),
        })
    }
}
