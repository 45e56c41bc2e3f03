//! profile-gate CLI
//!
//! # Configuration
//!
//! Settings are resolved with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`PROFILE_GATE_PORT`, `PROFILE_GATE_STORE`)
//! 3. `~/.profile-gate/config.toml` (or `--config`)
//! 4. Default values (lowest priority)

use anyhow::Result;
use clap::{Parser, Subcommand};
use profile_gate::auth::hasher::{DEFAULT_COST, MAX_COST, MIN_COST};
use profile_gate::auth::PasswordHasher;
use profile_gate::config::Config;
use profile_gate::gateway;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Password-gated launcher for browser profiles
#[derive(Parser, Debug)]
#[command(name = "profile-gate")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP auth service (default)
    Serve(ServeArgs),

    /// Print the bcrypt hash of a password and exit
    HashPassword {
        password: String,

        /// bcrypt work factor
        #[arg(long, default_value_t = DEFAULT_COST,
              value_parser = clap::value_parser!(u32).range(MIN_COST as i64..=MAX_COST as i64))]
        cost: u32,
    },
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config and PROFILE_GATE_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path (default: ~/.profile-gate/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Never start the browser, even on guest fallback
    #[arg(long)]
    no_launch: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .init();
}

fn hash_password(password: &str, cost: u32) -> Result<()> {
    let hashed = PasswordHasher::new(cost).hash(password)?;
    println!("Password: {password}");
    println!("Hashed:   {hashed}");
    println!();
    println!("Register it with POST /admin/add-profile, or add");
    println!("  \"{hashed}\": \"<profile>\"");
    println!("to the credential store file.");
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.gateway.host = host;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    config.validate()?;

    tracing::info!(
        config = %config.config_path.display(),
        store = %config.store_path().display(),
        "Starting profile-gate"
    );
    gateway::run_gateway(config, args.no_launch).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::HashPassword { password, cost }) => hash_password(&password, cost),
        Some(Command::Serve(args)) => {
            init_tracing();
            serve(args).await
        }
        None => {
            init_tracing();
            serve(ServeArgs::default()).await
        }
    }
}
