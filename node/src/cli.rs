//! # CLI Interface
//!
//! Defines the command-line argument structure for `helios-node` using
//! `clap` derive. Supports three subcommands: `run`, `status`, and
//! `version`.

use clap::{Parser, Subcommand};

/// Helios reference consensus node.
///
/// Runs the Helios consensus core over an in-memory chain: verifies and
/// applies blocks, resolves forks, serves a status API, and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "helios-node",
    about = "Helios reference consensus node",
    version,
    propagate_version = true
)]
pub struct HeliosNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Helios node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the consensus node.
    Run(RunArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port for the HTTP status API.
    #[arg(long, env = "HELIOS_API_PORT", default_value_t = 7330)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "HELIOS_METRICS_PORT", default_value_t = 7332)]
    pub metrics_port: u16,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "HELIOS_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Network identifier reported by the status API.
    #[arg(long, env = "HELIOS_NETWORK", default_value = "devnet")]
    pub network: String,

    /// Disable the local forge loop.
    ///
    /// The reference node has no peer transport, so without local forging
    /// the chain sits at genesis forever. Useful when driving the node
    /// purely through tests.
    #[arg(long)]
    pub no_forge: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:7330")]
    pub api_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        HeliosNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults_are_usable() {
        let cli = HeliosNodeCli::parse_from(["helios-node", "run"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.api_port, 7330);
        assert_eq!(args.metrics_port, 7332);
        assert!(!args.no_forge);
    }
}
