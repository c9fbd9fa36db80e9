mod commands;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mcpgym_core::EnvConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "MCPGYM_LOG";

/// MCPGym - play turn-based environments served by a remote MCP tool server
#[derive(Parser, Debug)]
#[command(name = "mcpgym-cli", version = mcpgym_core::VERSION, about, long_about = None)]
struct Cli {
    /// Environment config (toml, yaml or json). Defaults to <config dir>/mcpgym/env.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// MCP endpoint; overrides the config file or replaces it entirely
    #[arg(short, long, global = true)]
    server_url: Option<String>,

    /// Debug logging (ignored when MCPGYM_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play episodes, reading one action per line from stdin
    Play {
        /// Seed of the first episode; later episodes use seed + index
        #[arg(long, allow_negative_numbers = true)]
        seed: Option<i64>,

        /// Number of episodes to play
        #[arg(short, long, default_value_t = 1)]
        episodes: u32,

        /// Sample random actions instead of reading stdin
        #[arg(long)]
        random: bool,
    },

    /// Show the server handshake and its tools
    Tools,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mcpgym").join("env.toml"))
}

fn load_config(cli: &Cli) -> Result<EnvConfig> {
    let path = cli.config.clone().or_else(default_config_path);

    let mut config = match path {
        Some(path) if path.exists() => EnvConfig::from_path(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        Some(path) if cli.config.is_some() => {
            bail!("Config file not found: {}", path.display())
        }
        _ => match &cli.server_url {
            Some(url) => EnvConfig::new(url.clone()),
            None => bail!("No config file found; pass --config or --server-url"),
        },
    };

    if let Some(url) = &cli.server_url {
        config.server_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Play {
            seed,
            episodes,
            random,
        } => commands::play(config, seed, episodes, random),
        Commands::Tools => commands::tools(&config),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
