//! Werkstatt license tool
//!
//! Operator entry point for the license subsystem:
//! 1. Show the hardware fingerprint support needs to issue a key
//! 2. Activate, check or remove the license of this machine
//! 3. Serve the license API the authentication layer calls
//!
//! Usage:
//!   werkstatt-license hardware-id
//!   werkstatt-license activate WS-2024-0001
//!   werkstatt-license serve --port 4310

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use werkstatt_license::{LicenseCheck, LicenseConfig, LicenseContext, LicenseStateMachine};
use werkstatt_license_api::{build_router, AppState, HardwareIdResponse};

#[derive(Parser, Debug)]
#[command(name = "werkstatt-license")]
#[command(about = "Werkstatt license activation and diagnostics")]
struct Args {
    /// Path to the license config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print this machine's hardware fingerprint
    HardwareId {
        /// Print the fingerprint with the facts it was computed from
        #[arg(long)]
        json: bool,
    },
    /// Activate a license key on this machine
    Activate { license_key: String },
    /// Run the periodic license check
    Status,
    /// Run the login license check
    Login,
    /// Remove the local license record
    Deactivate,
    /// Serve the license HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4310")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = load_config(args.config.as_deref())?;
    let ctx = LicenseContext::new(config);

    match args.command {
        Command::HardwareId { json } => {
            let response = HardwareIdResponse::from_context(&ctx);
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.hardware_id);
            }
        }
        Command::Activate { license_key } => {
            let mut machine = LicenseStateMachine::new(ctx)?;
            let check = machine
                .activate(&license_key)
                .await
                .context("license activation failed")?;
            print_check(&check)?;
        }
        Command::Status => {
            let check = LicenseStateMachine::new(ctx)?.check_license_status().await;
            print_check(&check)?;
            require_valid(&check)?;
        }
        Command::Login => {
            let check = LicenseStateMachine::new(ctx)?.validate_on_login().await;
            print_check(&check)?;
            require_valid(&check)?;
        }
        Command::Deactivate => {
            if LicenseStateMachine::new(ctx)?.deactivate()? {
                println!("local license removed");
            } else {
                println!("no local license found");
            }
        }
        Command::Serve { port, bind } => {
            info!(license_file = %ctx.config().license_file().display(), "license API starting");
            let state = Arc::new(AppState::new(ctx)?);
            let app = build_router(state);

            let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
                .await
                .with_context(|| format!("failed to bind {bind}:{port}"))?;
            info!("license API listening on {}:{}", bind, port);
            axum::serve(listener, app).await.context("HTTP server failed")?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<LicenseConfig> {
    let config = match path {
        Some(path) => LicenseConfig::from_file(path)?,
        None => LicenseConfig::default(),
    };
    Ok(config.apply_env_overrides()?)
}

fn print_check(check: &LicenseCheck) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(check)?);
    Ok(())
}

fn require_valid(check: &LicenseCheck) -> Result<()> {
    if !check.valid {
        bail!(
            "license not valid: {}",
            check.error.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}
