//! Integrity digests over compiled artifacts
//!
//! A digest covers the ABI, the creation bytecode and a canonicalized
//! fingerprint of the sources. Two artifacts share a digest iff they are
//! byte-for-byte the same build, which is the only thing the cache trusts
//! when deciding whether a recorded deployment still matches the code on disk.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifact::CompiledArtifact;
use crate::error::{ManifestError, Result};

/// Hex-encoded SHA-256 digest of a compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrityDigest(String);

impl IntegrityDigest {
    pub fn from_hex(hex_digest: impl Into<String>) -> Self {
        Self(hex_digest.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntegrityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the integrity digest of an artifact.
pub fn digest(artifact: &CompiledArtifact) -> Result<IntegrityDigest> {
    if artifact.bytecode.is_empty() {
        return Err(ManifestError::ArtifactInvalid {
            contract: artifact.contract_name.clone(),
            reason: "missing bytecode".to_string(),
        });
    }

    let mut hasher = Sha256::new();

    // serde_json maps are sorted by key, so this encoding is canonical
    let abi = serde_json::to_vec(&artifact.abi)?;
    update_field(&mut hasher, b"abi", &abi);
    update_field(&mut hasher, b"bytecode", &artifact.bytecode);

    // BTreeMap iteration is already sorted by path
    for (path, content) in &artifact.sources {
        let normalized = content.replace("\r\n", "\n");
        update_field(&mut hasher, b"source-path", path.replace('\\', "/").as_bytes());
        update_field(&mut hasher, b"source", normalized.as_bytes());
    }

    Ok(IntegrityDigest(hex::encode(hasher.finalize())))
}

/// Length-prefixed so adjacent fields cannot collide.
fn update_field(hasher: &mut Sha256, tag: &[u8], data: &[u8]) {
    hasher.update((tag.len() as u64).to_be_bytes());
    hasher.update(tag);
    hasher.update((data.len() as u64).to_be_bytes());
    hasher.update(data);
}
