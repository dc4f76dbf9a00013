//! # InferMesh CLI
//!
//! Operator tooling for InferMesh hosts: registration, staking,
//! model catalog, earnings, wallet and supervisor control.

mod commands;
mod config;
mod error;
mod helpers;
mod keystore;

use clap::Parser;
use commands::Context;
use config::CliConfig;
use error::CliError;
use infermesh_chain::GasProfile;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(name = "infermesh")]
#[clap(about = "InferMesh host operator CLI", version)]
struct Cli {
    /// CLI configuration file
    #[clap(long, global = true, default_value = "infermesh.toml")]
    config: PathBuf,

    /// Private key override (insecure; prefer the keystore)
    #[clap(long, global = true)]
    key: Option<String>,

    /// EIP-1559 fee profile for transactions
    #[clap(long, global = true, default_value = "normal")]
    priority: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Register this host in the on-chain node registry
    Register {
        /// Publicly reachable API URL
        #[clap(long)]
        url: String,
        /// Model id (0x…) or repo:filename; repeatable
        #[clap(long = "model", required = true)]
        models: Vec<String>,
        /// Stake in FAB
        #[clap(long)]
        stake: String,
        /// Price in base units per million tokens
        #[clap(long)]
        pricing: String,
    },

    /// Remove this host from the registry
    Unregister,

    /// Update the registered API URL
    UpdateUrl { url: String },

    /// Replace the advertised model set
    UpdateModels {
        #[clap(required = true)]
        models: Vec<String>,
    },

    /// Add stake
    AddStake { amount: String },

    /// Publish host metadata to storage and record the reference
    UpdateMetadata {
        #[clap(short = 'f', long)]
        file: Option<PathBuf>,
        #[clap(short = 'j', long)]
        json: Option<String>,
        #[clap(short = 't', long)]
        template: Option<String>,
    },

    /// Show this host's registry record
    Info {
        #[clap(long)]
        json: bool,
    },

    /// Query the running inference server
    Status,

    /// Show accumulated earnings
    Balance,

    /// Model catalog operations
    Models {
        #[clap(subcommand)]
        cmd: ModelsCommands,
    },

    /// Start the supervisor
    Start,

    /// Stop the supervisor
    Stop,

    /// Show the local dashboard
    Dashboard {
        #[clap(long, default_value = "http://localhost:8080")]
        url: String,
    },

    /// Wallet operations
    Wallet {
        #[clap(subcommand)]
        cmd: WalletCommands,
    },

    /// Withdraw earnings (all tokens, or --token per token)
    Withdraw {
        #[clap(long = "token")]
        tokens: Vec<String>,
    },
}

#[derive(Parser)]
enum ModelsCommands {
    /// List models in the on-chain registry
    List,
    /// Show one model
    Info { model: String },
    /// Download a model and verify its content hash
    Download {
        model: String,
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Parser)]
enum WalletCommands {
    /// Import a private key into the keystore
    Import {
        /// Hex key; prompted for when omitted
        key: Option<String>,
    },
    /// Print the decrypted private key
    Export,
    /// Show wallet balances
    Balance,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let gas_profile: GasProfile =
        cli.priority.parse().map_err(CliError::Config)?;
    let config = CliConfig::load(&cli.config)?;
    let ctx = Context { config, key_override: cli.key, gas_profile };

    match cli.command {
        Commands::Register { url, models, stake, pricing } => {
            commands::register(&ctx, &url, &models, &stake, &pricing).await
        }
        Commands::Unregister => commands::unregister(&ctx).await,
        Commands::UpdateUrl { url } => commands::update_url(&ctx, &url).await,
        Commands::UpdateModels { models } => commands::update_models(&ctx, &models).await,
        Commands::AddStake { amount } => commands::add_stake(&ctx, &amount).await,
        Commands::UpdateMetadata { file, json, template } => {
            commands::update_metadata(&ctx, file.as_ref(), json.as_deref(), template.as_deref())
                .await
        }
        Commands::Info { json } => commands::info(&ctx, json).await,
        Commands::Status => commands::status(&ctx).await,
        Commands::Balance => commands::balance(&ctx).await,
        Commands::Models { cmd } => match cmd {
            ModelsCommands::List => commands::models_list(&ctx).await,
            ModelsCommands::Info { model } => commands::models_info(&ctx, &model).await,
            ModelsCommands::Download { model, output } => {
                commands::models_download(&ctx, &model, output.as_ref()).await
            }
        },
        Commands::Start => commands::start(&ctx),
        Commands::Stop => commands::stop(&ctx),
        Commands::Dashboard { url } => commands::dashboard(&url).await,
        Commands::Wallet { cmd } => match cmd {
            WalletCommands::Import { key } => commands::wallet_import(&ctx, key.as_deref()).await,
            WalletCommands::Export => commands::wallet_export(&ctx).await,
            WalletCommands::Balance => commands::wallet_balance(&ctx).await,
        },
        Commands::Withdraw { tokens } => commands::withdraw(&ctx, &tokens).await,
    }
}
