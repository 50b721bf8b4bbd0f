// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plaudit - review-solicitation delivery service.
//!
//! Binary entry point: configuration, logging and subcommand dispatch.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use plaudit_config::PlauditConfig;

/// Plaudit - review-solicitation delivery service.
#[derive(Parser, Debug)]
#[command(name = "plaudit", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway, the dispatch worker and the webhook re-poll.
    Serve,
    /// Run only the dispatch worker.
    Worker,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Cancel a queued dispatch that no worker has claimed yet.
    Cancel {
        /// Dispatch id.
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => plaudit_config::load_and_validate_path(path),
        None => plaudit_config::load_and_validate(),
    };
    let config: PlauditConfig = match loaded {
        Ok(config) => config,
        Err(errors) => {
            plaudit_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.service.log_level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config, serve::ServeMode::Full).await,
        Commands::Worker => serve::run_serve(config, serve::ServeMode::WorkerOnly).await,
        Commands::Migrate => commands::run_migrate(&config).await,
        Commands::Cancel { id } => commands::run_cancel(&config, &id).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "plaudit exited with an error");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over `log_level`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("plaudit={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_cancel_with_config_flag() {
        let cli = Cli::try_parse_from(["plaudit", "cancel", "d-42", "--config", "/tmp/p.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
        match cli.command {
            Commands::Cancel { id } => assert_eq!(id, "d-42"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = plaudit_config::load_config_from_str("").expect("defaults deserialize");
        assert_eq!(config.service.name, "plaudit");
        assert!(config.gateway.enabled);
    }
}
