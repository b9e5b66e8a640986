use anyhow::{Context, Result};
use bounty_node::{keys, logging, BountyNode, NodeConfig};
use bounty_types::BountyId;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "./bounty-config.toml";

#[derive(Parser)]
#[command(name = "bountyd")]
#[command(about = "Bounty escrow payout daemon", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the payout daemon
    Run {
        /// Data directory, overrides the configuration file
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Output file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        output: PathBuf,

        /// Treasury wallet receiving the fee share
        #[arg(long)]
        treasury: Option<String>,
    },

    /// Generate an escrow authority key
    Keygen {
        /// Output key file
        #[arg(short, long, default_value = "./escrow.key")]
        output: PathBuf,
    },

    /// Print the audit trail of one bounty as JSON lines
    Audit {
        /// Bounty identifier
        bounty: String,
    },
}

fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    let mut config = match path {
        Some(path) => NodeConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => NodeConfig::from_file(Path::new(DEFAULT_CONFIG))?,
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (ignore if it doesn't)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Load config early to get logging settings
    let early = load_config(cli.config.as_deref()).ok();
    let logging_config = early
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();

    if logging_config.show_boot_banner && cli.verbose == 0 && std::env::var("RUST_LOG").is_err() {
        logging::display_boot_banner(env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = logging::init_logging(&logging_config, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        let log_level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| format!("bounty_node={}", log_level)),
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command {
        Commands::Run { data_dir } => {
            // Priority: CLI args > env vars > config file > defaults
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(data_dir) = data_dir {
                config.node.data_dir = data_dir;
            }

            let node = BountyNode::new(config).await?;
            node.run().await?;
        }
        Commands::Init { output, treasury } => {
            let mut config = NodeConfig::default();
            if let Some(treasury) = treasury {
                config.ledger.treasury_wallet = treasury;
            }
            config.save_to_file(&output)?;
            info!(path = ?output, "⚙️ Wrote default configuration");
            if config.validate().is_err() {
                println!("Set ledger.treasury_wallet in {:?} before running", output);
            }
        }
        Commands::Keygen { output } => {
            if output.exists() {
                anyhow::bail!("Refusing to overwrite existing key {:?}", output);
            }
            let authority = keys::load_or_create(&output)?;
            println!("Escrow address: {}", authority.address());
        }
        Commands::Audit { bounty } => {
            let config = load_config(cli.config.as_deref())?;
            let id = BountyId::new(bounty).context("Invalid bounty id")?;
            let audit = bounty_core::FileAuditLog::open(config.audit_log_path()).await?;
            for entry in bounty_core::AuditLog::entries_for(&audit, &id).await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
    }

    Ok(())
}
