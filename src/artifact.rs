//! Compiled contract artifacts
//!
//! The compiler is a black box: it leaves one JSON file per contract in the
//! build directory with the shape `{abi, bytecode, contractName, sources?}`.
//! This module only reads those files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ManifestError, Result};
use crate::types::hex_bytes;

/// A compiled contract as produced by the build collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    pub contract_name: String,

    #[serde(default)]
    pub abi: Vec<Value>,

    /// Creation bytecode
    #[serde(with = "hex_bytes")]
    pub bytecode: Vec<u8>,

    /// Source files keyed by path, used for the integrity fingerprint
    #[serde(default)]
    pub sources: BTreeMap<String, String>,
}

impl CompiledArtifact {
    pub fn new(contract_name: impl Into<String>, abi: Vec<Value>, bytecode: Vec<u8>) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi,
            bytecode,
            sources: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.sources.insert(path.into(), content.into());
        self
    }

    /// Parse an artifact from its JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load an artifact file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| ManifestError::ArtifactInvalid {
            contract: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Anything that can locate the compiled artifact for a contract name today.
pub trait ArtifactSource: Send + Sync {
    fn locate(&self, contract_name: &str) -> Result<Option<CompiledArtifact>>;
}

/// Artifacts read from `<build_dir>/<Name>.json`.
#[derive(Debug, Clone)]
pub struct BuildDirArtifacts {
    build_dir: PathBuf,
}

impl BuildDirArtifacts {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    fn search(&self, dir: &Path, file_name: &str, found: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.search(&path, file_name, found)?;
            } else if path.file_name().and_then(|n| n.to_str()) == Some(file_name) {
                found.push(path);
            }
        }
        Ok(())
    }
}

impl ArtifactSource for BuildDirArtifacts {
    fn locate(&self, contract_name: &str) -> Result<Option<CompiledArtifact>> {
        let file_name = format!("{}.json", contract_name);
        let direct = self.build_dir.join(&file_name);
        if direct.is_file() {
            return CompiledArtifact::load(&direct).map(Some);
        }
        if !self.build_dir.is_dir() {
            debug!(dir = %self.build_dir.display(), "Build directory does not exist");
            return Ok(None);
        }

        let mut found = Vec::new();
        self.search(&self.build_dir, &file_name, &mut found)?;
        match found.len() {
            0 => Ok(None),
            1 => CompiledArtifact::load(&found[0]).map(Some),
            _ => {
                let paths: Vec<String> = found.iter().map(|p| p.display().to_string()).collect();
                Err(ManifestError::Config(format!(
                    "Multiple artifacts named {} found: {}",
                    file_name,
                    paths.join(", ")
                )))
            }
        }
    }
}

/// In-memory artifact set, for callers that compile in-process.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, CompiledArtifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: CompiledArtifact) {
        self.artifacts.insert(artifact.contract_name.clone(), artifact);
    }
}

impl ArtifactSource for ArtifactSet {
    fn locate(&self, contract_name: &str) -> Result<Option<CompiledArtifact>> {
        Ok(self.artifacts.get(contract_name).cloned())
    }
}
