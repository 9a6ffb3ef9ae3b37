//! Command-line interface
//!
//! Thin layer over the library: load configuration, switch to the requested
//! network, run one command and render its result as text.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use crate::artifact::BuildDirArtifacts;
use crate::config::{Config, LOCAL_NETWORK};
use crate::contract::{ContractHandle, ProcedureRegistry};
use crate::error::Result;
use crate::ledger::DeploymentRecord;
use crate::manifest::{ContractManifestationCache, ContractSelector, ResolveOverrides};
use crate::network::{
    AutoConfirm, Confirmation, ExecutionContext, NetworkRegistry, StdinConfirmation, SwitchRequest,
};
use crate::types::Address;

const RULE_WIDTH: usize = 60;

#[derive(Debug, Parser)]
#[command(name = "contract-manifest")]
#[command(about = "Resolve named contracts to deployed addresses, deploying when needed")]
pub struct Cli {
    /// Path to manifest.toml (default: search upward from the working directory)
    #[arg(short, long, env = "CONTRACT_MANIFEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Network name or chain id
    #[arg(short, long, env = "CONTRACT_MANIFEST_NETWORK")]
    pub network: Option<String>,

    /// Ad-hoc RPC endpoint instead of a configured network
    #[arg(long, conflicts_with = "network")]
    pub url: Option<String>,

    /// Run against a local fork of the network
    #[arg(long)]
    pub fork: bool,

    /// Expected chain id
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Deployment ledger path (overrides config file)
    #[arg(long, env = "CONTRACT_MANIFEST_DB_PATH")]
    pub db_path: Option<String>,

    /// Do not ask before changing state on live networks
    #[arg(long)]
    pub no_prompt: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Errors only
    #[arg(long, global = true, conflicts_with = "debug")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve a named contract, deploying it if nothing valid exists
    Resolve {
        /// Contract name
        name: String,

        /// Skip every cache and deploy
        #[arg(long)]
        force_deploy: bool,

        /// Use the contract at this address
        #[arg(long)]
        address: Option<String>,
    },

    /// Deploy a named contract unconditionally
    Deploy {
        /// Contract name
        name: String,
    },

    /// List recorded deployments on the active network
    Deployments {
        /// Contract name, or "all"
        #[arg(default_value = "all")]
        name: String,

        /// Only deployments matching the current artifacts
        #[arg(long)]
        checked: bool,

        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<u32>,

        /// 0 address, 1 name, 2 sources, 3 full details, 4 raw
        #[arg(short, long, default_value_t = 1)]
        format_level: u8,
    },

    /// Attach a contract name to the latest deployment at an address
    Name {
        address: String,
        name: String,
    },
}

impl Cli {
    /// Default log directive for the chosen verbosity.
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "contract_manifest=debug"
        } else if self.quiet {
            "contract_manifest=error"
        } else {
            "contract_manifest=info"
        }
    }
}

/// How much of each deployment to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrintVerbosity {
    ContractAddress = 0,
    AddressAndName = 1,
    AddressNameDeployer = 2,
    FullDetails = 3,
    Raw = 4,
}

impl From<u8> for PrintVerbosity {
    fn from(level: u8) -> Self {
        match level {
            0 => PrintVerbosity::ContractAddress,
            1 => PrintVerbosity::AddressAndName,
            2 => PrintVerbosity::AddressNameDeployer,
            3 => PrintVerbosity::FullDetails,
            _ => PrintVerbosity::Raw,
        }
    }
}

/// Load configuration as the command line asks.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let cwd = std::env::current_dir()?;
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => match Config::discover(&cwd) {
            Some(path) => Config::load(&path)?,
            None => {
                info!("No manifest.toml found, using defaults");
                Config::empty(&cwd)
            }
        },
    };

    if let Some(db_path) = &cli.db_path {
        config.project.db_path = db_path.clone();
        if let Some(network) = cli
            .network
            .as_ref()
            .and_then(|name| config.networks.named.get_mut(name))
        {
            network.db_path = Some(db_path.clone());
        }
    }
    Ok(config)
}

/// Run one command and return what to print.
pub async fn execute(cli: Cli) -> Result<String> {
    let config = load_config(&cli)?;
    let mut ctx = ExecutionContext::new(NetworkRegistry::from_config(&config)?);

    let request = match (&cli.url, &cli.network) {
        (Some(url), _) => SwitchRequest::url(url.clone()),
        (None, Some(network)) => SwitchRequest::named(network.clone()),
        (None, None) => SwitchRequest::named(
            config
                .project
                .default_network
                .clone()
                .unwrap_or_else(|| LOCAL_NETWORK.to_string()),
        ),
    }
    .fork(cli.fork)
    .chain_id(cli.chain_id);
    ctx.switch_network(request).await?;

    let confirmation: Arc<dyn Confirmation> = if cli.no_prompt {
        Arc::new(AutoConfirm::yes())
    } else {
        Arc::new(StdinConfirmation)
    };
    let cache = ContractManifestationCache::new(
        Arc::new(BuildDirArtifacts::new(config.build_dir())),
        ProcedureRegistry::new(),
        confirmation,
        config.root.clone(),
    );

    match cli.command {
        Commands::Resolve { name, force_deploy, address } => {
            let mut overrides = ResolveOverrides::default();
            if force_deploy {
                overrides.force_deploy = Some(true);
            }
            overrides.address = address.as_deref().map(str::parse::<Address>).transpose()?;
            let handle = cache.resolve(&mut ctx, &name, overrides).await?;
            Ok(format_handle(&handle))
        }

        Commands::Deploy { name } => {
            let handle = cache
                .resolve(&mut ctx, &name, ResolveOverrides::force_deploy())
                .await?;
            Ok(format_handle(&handle))
        }

        Commands::Deployments { name, checked, limit, format_level } => {
            let selector = ContractSelector::parse(name.trim());
            let records = cache.list_deployments(&mut ctx, &selector, None, limit, checked)?;
            Ok(format_deployments(&records, PrintVerbosity::from(format_level)))
        }

        Commands::Name { address, name } => {
            let address: Address = address.parse()?;
            if cache.name_deployment(&mut ctx, &address, &name)? {
                Ok(format!("Named deployment at {} as {}", address, name))
            } else {
                Ok(format!("No unnamed deployment found at {}", address))
            }
        }
    }
}

/// Format a resolved handle for display
pub fn format_handle(handle: &ContractHandle) -> String {
    let mut output = String::new();
    output.push_str(&format!("Contract:   {}\n", handle.name));
    output.push_str(&format!("Address:    {}\n", handle.address));
    output.push_str(&format!("Origin:     {}\n", handle.origin));
    output.push_str(&format!(
        "Integrity:  {}\n",
        handle
            .integrity
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    output.push_str(&format!("ABI items:  {}\n", handle.abi.len()));
    output
}

/// Format deployment records for display
pub fn format_deployments(records: &[DeploymentRecord], level: PrintVerbosity) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut output = String::new();
    if !records.is_empty() {
        output.push_str(&rule);
        output.push('\n');
    }

    for record in records {
        if level == PrintVerbosity::ContractAddress {
            output.push_str(&format!("Contract Address: {}\n", record.contract_address));
            continue;
        }
        if level == PrintVerbosity::Raw {
            output.push_str(&format!("{:#?}\n{}\n", record, rule));
            continue;
        }

        output.push_str(&format!("Contract Address: {}\n", record.contract_address));
        output.push_str(&format!(
            "Contract Name: {}\n",
            record.contract_name.as_deref().unwrap_or("<unnamed>")
        ));
        output.push_str(&format!("Deployer: {}\n", record.deployer.as_deref().unwrap_or("-")));

        if level >= PrintVerbosity::AddressNameDeployer {
            output.push_str(&format!("RPC: {}\n", record.rpc.as_deref().unwrap_or("-")));
            output.push_str(&format!("Transaction Hash: {}\n", record.tx_hash.as_deref().unwrap_or("-")));
        }
        if level == PrintVerbosity::FullDetails {
            output.push_str(&format!("Broadcast Timestamp: {}\n", format_timestamp(record.broadcast_ts)));
            push_object(&mut output, "Transaction Dict", &record.tx_envelope);
            push_object(&mut output, "Receipt Dict", &record.receipt_envelope);
        }
        if level >= PrintVerbosity::AddressNameDeployer {
            push_sources(&mut output, &record.source_bundle, level == PrintVerbosity::FullDetails);
        }
        if level == PrintVerbosity::FullDetails {
            output.push_str("ABI:\n");
            for item in &record.abi {
                output.push_str(&format!("  {}\n", item));
            }
            output.push_str(&format!("Session ID: {}\n", record.session_id));
            output.push_str(&format!(
                "Deployment ID: {}\n",
                record.deployment_id.map(|id| id.to_string()).unwrap_or_default()
            ));
        }
        output.push_str(&rule);
        output.push('\n');
    }

    output.push_str(&format!("Total deployments: {}\n", records.len()));
    output
}

fn push_object(output: &mut String, title: &str, value: &Value) {
    output.push_str(&format!("{}:\n", title));
    if let Value::Object(map) = value {
        for (key, value) in map {
            output.push_str(&format!("  {}: {}\n", key, value));
        }
    }
}

fn push_sources(output: &mut String, bundle: &Value, full: bool) {
    output.push_str("Source Code:\n");
    let Some(sources) = bundle.get("sources").and_then(Value::as_object) else {
        return;
    };
    for (file_name, content) in sources {
        // Either the text itself or a `{content}` object
        let content = content
            .as_str()
            .or_else(|| content.get("content").and_then(Value::as_str))
            .unwrap_or_default();
        output.push_str(&format!("  File: {}\n", file_name));
        output.push_str("  Content:\n");
        if full {
            output.push_str(content);
            output.push('\n');
        } else {
            let preview: String = content.chars().take(200).collect();
            output.push_str(&format!("{}...\n", preview));
        }
    }
}

fn format_timestamp(ts: f64) -> String {
    let secs = ts.trunc() as i64;
    let nanos = (ts.fract() * 1e9) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
