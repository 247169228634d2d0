//! skiffctl library
//!
//! Provisions and manages a local single-node Skiff deployment: a kind
//! cluster carrying the platform, installed via its helm chart.

pub mod commands;
pub mod docker;
pub mod error;
pub mod exec;
pub mod installer;
pub mod kind;
pub mod provision;
pub mod telemetry;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default host port for platform ingress traffic.
pub const DEFAULT_INGRESS_PORT: u16 = 8000;

/// Container port the cluster node publishes for ingress traffic.
pub const INGRESS_CONTAINER_PORT: u16 = 80;

/// skiffctl - run the Skiff platform locally
#[derive(Parser, Debug)]
#[command(name = "skiffctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Local cluster backend
    #[arg(long, global = true, value_enum, default_value_t = kind::ProviderName::Kind)]
    pub provider: kind::ProviderName,

    /// Name of the local cluster
    #[arg(
        long,
        global = true,
        env = "SKIFFCTL_CLUSTER_NAME",
        default_value = kind::DEFAULT_CLUSTER_NAME
    )]
    pub cluster_name: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install Skiff locally
    Install(commands::install::InstallArgs),
    /// Remove the local Skiff cluster
    Uninstall,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let cancel = CancellationToken::new();
        spawn_interrupt_handler(cancel.clone());

        let provider = kind::Provider::new(self.provider, self.cluster_name);
        match self.command {
            Commands::Install(args) => commands::install::run(provider, args, cancel).await,
            Commands::Uninstall => commands::uninstall::run(provider, cancel).await,
        }
    }
}

/// Cancel the token on the first Ctrl-C so in-flight child processes are
/// torn down instead of left running.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, aborting");
            cancel.cancel();
        }
    });
}
