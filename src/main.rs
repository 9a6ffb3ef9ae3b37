//! contract-manifest: resolve named contracts to live handles
//!
//! See the library crate for the resolution order and network personas.

use clap::Parser;
use tracing::error;

use contract_manifest::cli::{self, Cli};
use contract_manifest::ManifestError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(args.log_directive().parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli::execute(args).await {
        Ok(output) => {
            println!("{}", output.trim_end());
            Ok(())
        }
        // Declining the live prompt is a clean exit
        Err(ManifestError::Declined) => Ok(()),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
