//! Known networks, by name

use std::collections::BTreeMap;

use tracing::debug;

use super::descriptor::NetworkDescriptor;
use crate::config::{Config, LOCAL_NETWORK};
use crate::error::{ManifestError, Result};

#[derive(Debug)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkDescriptor>,
    config: Config,
}

impl NetworkRegistry {
    /// All configured networks plus the built-in `local` one.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut networks = BTreeMap::new();
        networks.insert(
            LOCAL_NETWORK.to_string(),
            NetworkDescriptor::local(config.contract_specs(LOCAL_NETWORK)?),
        );
        for (name, network) in &config.networks.named {
            if name == LOCAL_NETWORK {
                continue;
            }
            networks.insert(name.clone(), NetworkDescriptor::from_config(name, network, config)?);
        }
        debug!(count = networks.len(), "Networks loaded");

        Ok(Self {
            networks,
            config: config.clone(),
        })
    }

    pub fn insert(&mut self, descriptor: NetworkDescriptor) {
        self.networks.insert(descriptor.name().to_string(), descriptor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.networks.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&NetworkDescriptor> {
        self.networks.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut NetworkDescriptor> {
        self.networks.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    /// First network whose configured or observed chain id is `chain_id`.
    pub fn name_for_chain_id(&self, chain_id: u64) -> Option<&str> {
        self.networks
            .values()
            .find(|n| n.chain_id() == Some(chain_id) || n.expected_chain_id() == Some(chain_id))
            .map(NetworkDescriptor::name)
    }

    /// Resolve a name, falling back to a numeric chain id.
    pub fn resolve_name(&self, name_or_chain_id: &str) -> Result<String> {
        if self.contains(name_or_chain_id) {
            return Ok(name_or_chain_id.to_string());
        }
        name_or_chain_id
            .parse::<u64>()
            .ok()
            .and_then(|id| self.name_for_chain_id(id))
            .map(str::to_string)
            .ok_or_else(|| ManifestError::NetworkNotFound(name_or_chain_id.to_string()))
    }

    /// Register (or reuse) a network identified only by its URL.
    pub fn ensure_adhoc(&mut self, url: &str, is_fork: bool, chain_id: Option<u64>) -> &mut NetworkDescriptor {
        let config = &self.config;
        self.networks
            .entry(url.to_string())
            .or_insert_with(|| NetworkDescriptor::adhoc(url, is_fork, chain_id, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
