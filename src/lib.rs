//! contract-manifest - resolve named contracts to live handles
//!
//! Answers "give me contract X on this network" by choosing between an
//! address pinned in configuration, a record in the persistent deployment
//! ledger, an entry in the session cache, or a fresh deployment.
//!
//! ## Networks
//!
//! | Persona | Environment | Ledger |
//! |---------|-------------|--------|
//! | local   | in-process VM | none |
//! | fork    | local overlay on a live chain | none |
//! | live    | JSON-RPC node | SQLite file (or in-memory with `save_to_db = false`) |
//!
//! ## Project Layout
//!
//! ```text
//! project/
//! ├── manifest.toml          # Networks and named contracts
//! ├── out/                   # Compiled artifacts, one <Name>.json each
//! └── .deployments.db        # Deployment ledger
//! ```

pub mod artifact;
pub mod cli;
pub mod config;
pub mod contract;
pub mod environment;
pub mod error;
pub mod explorer;
pub mod integrity;
pub mod ledger;
pub mod manifest;
pub mod network;
pub mod types;

// Re-exports
pub use artifact::{ArtifactSet, ArtifactSource, BuildDirArtifacts, CompiledArtifact};
pub use config::Config;
pub use contract::{
    AbiSource, ArtifactDeployer, ContractHandle, DeployOutcome, DeployProcedure, HandleOrigin,
    NamedContractSpec, ProcedureRegistry,
};
pub use environment::{ExecutionEnvironment, ForkVm, LocalVm, RpcEnvironment, Signer};
pub use error::{ManifestError, Result};
pub use integrity::IntegrityDigest;
pub use ledger::{DeploymentFilter, DeploymentLedger, DeploymentRecord};
pub use manifest::{ContractManifestationCache, ContractSelector, ResolveOverrides};
pub use network::{ExecutionContext, NetworkDescriptor, NetworkRegistry, Persona, SwitchRequest};
pub use types::Address;
