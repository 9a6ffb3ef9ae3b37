//! The active network
//!
//! Exactly one network is active at a time. Switching keeps the previous
//! network's descriptor, so its session cache survives a round trip.

use tracing::info;

use super::descriptor::NetworkDescriptor;
use super::registry::NetworkRegistry;
use crate::error::{ManifestError, Result};

/// Which network to switch to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkTarget {
    /// Configured name, or a numeric chain id
    Name(String),
    /// Ad-hoc RPC endpoint
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRequest {
    pub target: NetworkTarget,
    pub is_fork: bool,
    pub chain_id: Option<u64>,
}

impl SwitchRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            target: NetworkTarget::Name(name.into()),
            is_fork: false,
            chain_id: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            target: NetworkTarget::Url(url.into()),
            is_fork: false,
            chain_id: None,
        }
    }

    pub fn fork(mut self, is_fork: bool) -> Self {
        self.is_fork = is_fork;
        self
    }

    pub fn chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.chain_id = chain_id;
        self
    }
}

#[derive(Debug)]
pub struct ExecutionContext {
    registry: NetworkRegistry,
    active: Option<String>,
}

impl ExecutionContext {
    pub fn new(registry: NetworkRegistry) -> Self {
        Self {
            registry,
            active: None,
        }
    }

    /// Make the requested network active, activating it if needed.
    pub async fn switch_network(&mut self, request: SwitchRequest) -> Result<&mut NetworkDescriptor> {
        let name = match &request.target {
            NetworkTarget::Name(name) => self.registry.resolve_name(name)?,
            NetworkTarget::Url(url) => {
                self.registry
                    .ensure_adhoc(url, request.is_fork, request.chain_id);
                url.clone()
            }
        };

        self.registry
            .get_mut(&name)
            .ok_or_else(|| ManifestError::NetworkNotFound(name.clone()))?
            .activate_with(request.is_fork, request.chain_id)
            .await?;

        if self.active.as_deref() != Some(name.as_str()) {
            info!(network = %name, previous = ?self.active, "Switched network");
        }
        self.active = Some(name);
        self.active_mut()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Result<&NetworkDescriptor> {
        self.active
            .as_deref()
            .and_then(|name| self.registry.get(name))
            .ok_or(ManifestError::NoActiveNetwork)
    }

    pub fn active_mut(&mut self) -> Result<&mut NetworkDescriptor> {
        match self.active.as_deref() {
            Some(name) => self
                .registry
                .get_mut(name)
                .ok_or(ManifestError::NoActiveNetwork),
            None => Err(ManifestError::NoActiveNetwork),
        }
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NetworkRegistry {
        &mut self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::environment::LocalVm;
    use crate::network::Persona;
    use std::path::Path;

    fn context() -> ExecutionContext {
        let registry = NetworkRegistry::from_config(&Config::empty(Path::new("/project"))).unwrap();
        ExecutionContext::new(registry)
    }

    #[tokio::test]
    async fn test_no_active_network_initially() {
        let ctx = context();
        assert!(matches!(ctx.active(), Err(ManifestError::NoActiveNetwork)));
    }

    #[tokio::test]
    async fn test_switch_to_local() {
        let mut ctx = context();
        let network = ctx.switch_network(SwitchRequest::named("local")).await.unwrap();
        assert_eq!(network.chain_id(), Some(31337));
        assert_eq!(ctx.active_name(), Some("local"));
    }

    #[tokio::test]
    async fn test_switch_to_unknown_network() {
        let mut ctx = context();
        let result = ctx.switch_network(SwitchRequest::named("mainnet")).await;
        assert!(matches!(result, Err(ManifestError::NetworkNotFound(_))));
        assert!(ctx.active_name().is_none());
    }

    #[tokio::test]
    async fn test_cannot_fork_local() {
        let mut ctx = context();
        let result = ctx
            .switch_network(SwitchRequest::named("local").fork(true))
            .await;
        assert!(matches!(result, Err(ManifestError::Config(_))));
    }

    #[tokio::test]
    async fn test_failed_chain_id_override_is_not_kept() {
        let mut ctx = context();
        ctx.registry_mut().insert(
            NetworkDescriptor::new("sepolia", Persona::Live)
                .with_expected_chain_id(11155111)
                .with_environment(Box::new(LocalVm::with_chain_id("sepolia", 11155111))),
        );

        let result = ctx
            .switch_network(SwitchRequest::named("sepolia").chain_id(Some(1)))
            .await;
        assert!(matches!(result, Err(ManifestError::ChainIdMismatch { .. })));
        assert!(ctx.active_name().is_none());

        let network = ctx.switch_network(SwitchRequest::named("sepolia")).await.unwrap();
        assert_eq!(network.chain_id(), Some(11155111));
        assert_eq!(network.expected_chain_id(), Some(11155111));
    }

    #[tokio::test]
    async fn test_failed_fork_switch_keeps_live_persona() {
        let mut ctx = context();
        ctx.registry_mut().insert(
            NetworkDescriptor::new("mainnet", Persona::Live).with_url("http://127.0.0.1:1"),
        );

        let result = ctx
            .switch_network(SwitchRequest::named("mainnet").fork(true))
            .await;
        assert!(result.is_err());

        let mainnet = ctx.registry().get("mainnet").unwrap();
        assert_eq!(mainnet.persona(), Persona::Live);
        assert!(mainnet.db_path().is_some());
        assert!(!mainnet.is_activated());
    }
}
