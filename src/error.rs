//! Error types for contract-manifest

use thiserror::Error;

use crate::environment::EnvError;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    #[error("No active network. Switch to a network before resolving contracts")]
    NoActiveNetwork,

    #[error("Network {0} has not been activated")]
    NotActivated(String),

    #[error("Chain ID mismatch on network {network}: configured {configured}, observed {observed}")]
    ChainIdMismatch {
        network: String,
        configured: u64,
        observed: u64,
    },

    #[error("Contract {0}: abi and abi_from_explorer are mutually exclusive")]
    ConflictingAbiSources(String),

    #[error("Contract {0} must be deployed but no deploy procedure is configured")]
    MissingDeployProcedure(String),

    #[error("Unknown deploy procedure {reference} for contract {contract}")]
    UnknownDeployProcedure { contract: String, reference: String },

    #[error("Invalid artifact for {contract}: {reason}")]
    ArtifactInvalid { contract: String, reason: String },

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Ledger unavailable at {path}: {reason}")]
    LedgerUnavailable { path: String, reason: String },

    #[error("Deploy failed for {contract}: {reason}")]
    DeployFailed { contract: String, reason: String },

    #[error("Explorer error: {0}")]
    Explorer(String),

    #[error("Operation cancelled by user")]
    Declined,

    #[error("Environment error: {0}")]
    Environment(#[from] EnvError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ManifestError {
    /// Whether this error is the clean user-declined abort rather than a failure.
    pub fn is_declined(&self) -> bool {
        matches!(self, ManifestError::Declined)
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
