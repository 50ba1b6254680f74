//! Tuya CLI - Lightweight Tuya IoT Cloud client
//!
//! Signs every request with the platform's HMAC-SHA256 recipe and
//! keeps the bearer token fresh across invocations.

mod api;
mod auth;
mod config;
mod error;
mod models;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth::SignVersion;

#[derive(Parser)]
#[command(name = "tuya-cli")]
#[command(about = "Lightweight CLI client for the Tuya IoT Cloud", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Sign requests with the pre-2021 legacy recipe
    #[arg(long, global = true)]
    legacy_sign: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire an access token (reuses the cached one when valid)
    Login {
        /// Force re-acquisition even if the cached token is valid
        #[arg(short, long)]
        force: bool,
    },

    /// Clear cached token state (credentials are kept)
    Logout,

    /// Show credential and token status
    Status,

    /// Save cloud project credentials to the env store
    SetCredentials {
        /// Access ID of the cloud project
        #[arg(long)]
        access_id: Option<String>,

        /// Access secret of the cloud project
        #[arg(long)]
        access_key: Option<String>,

        /// Regional API endpoint, e.g. https://openapi.tuyaeu.com
        #[arg(long)]
        base_url: Option<String>,
    },

    /// List devices registered to the account
    Devices {
        /// List devices of this cloud user id instead of all devices
        #[arg(long)]
        uid: Option<String>,

        /// Persist a device id as the default command target
        #[arg(long)]
        select: Option<String>,
    },

    /// Show the function set of a device
    Functions {
        /// Device id (defaults to the selected device)
        device_id: Option<String>,
    },

    /// Toggle a device switch on or off
    Switch {
        /// Device id (defaults to the selected device)
        device_id: Option<String>,

        /// Function code to toggle
        #[arg(long, default_value = "switch_1")]
        code: String,

        #[arg(long)]
        on: bool,

        #[arg(long, conflicts_with = "on")]
        off: bool,
    },

    /// Keep the token fresh in the background until interrupted
    Watch {
        /// Seconds between expiry checks
        #[arg(long, default_value = "60")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let sign_version = if cli.legacy_sign {
        SignVersion::Legacy
    } else {
        SignVersion::V2
    };

    match cli.command {
        Commands::Login { force } => {
            auth::login(force, sign_version).await?;
        }
        Commands::Logout => {
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::SetCredentials {
            access_id,
            access_key,
            base_url,
        } => {
            auth::set_credentials(access_id, access_key, base_url)?;
        }
        Commands::Devices { uid, select } => {
            tracing::info!("Fetching devices...");
            api::list_devices(uid.as_deref(), select.as_deref(), sign_version).await?;
        }
        Commands::Functions { device_id } => {
            api::show_functions(device_id, sign_version).await?;
        }
        Commands::Switch {
            device_id,
            code,
            on,
            off,
        } => {
            if !on && !off {
                bail!("pass --on or --off");
            }
            api::switch(device_id, &code, on, sign_version).await?;
        }
        Commands::Watch { interval } => {
            auth::watch(interval, sign_version).await?;
        }
    }

    Ok(())
}
