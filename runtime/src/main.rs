// Copyright 2026 Lead Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use lead_harvest_runtime::cli::{self, harvest_cmd::HarvestArgs, harvest_cmd::Mode, output};

#[derive(Parser)]
#[command(
    name = "leadharvest",
    about = "Lead Harvest — collect deduplicated business leads from map search results",
    version,
    after_help = "Run 'leadharvest <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest records for one or more search queries
    Harvest(HarvestArgs),
    /// Check Chromium and the output directory
    Doctor {
        /// Config file whose output directory is checked
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON
    Config {
        /// Config file to load instead of a preset
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Preset to print when no config file is given
        #[arg(long, value_enum, default_value = "card")]
        mode: Mode,
        /// Fail if the configuration is inconsistent
        #[arg(long)]
        validate: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Global flags reach every subcommand through the environment.
    if cli.json {
        std::env::set_var(output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(output::QUIET_ENV, "1");
    }
    init_tracing(&cli.log_level, cli.log_json);

    let result = match cli.command {
        Commands::Harvest(args) => cli::harvest_cmd::run(args).await,
        Commands::Doctor { config } => cli::doctor::run(config.as_deref()).await,
        Commands::Config {
            config,
            mode,
            validate,
        } => cli::config_cmd::run(config.as_deref(), mode, validate).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "leadharvest", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
