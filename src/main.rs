//! Bouncer CLI - token-issuing gatekeeper for protected systems
//!
//! Run `bouncer --help` for usage information.

use bouncer::auth::{Gatekeeper, SendmailDelivery};
use bouncer::config::{Config, LogFormat, DEFAULT_CONFIG};
use bouncer::crypto::{char_salt, password_hash, HashAlgorithm};
use bouncer::directory::{MemoryDirectory, UserRecord};
use bouncer::server::BouncerServer;
use bouncer::storage::MemorySecretStore;
use bouncer::Secret;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Salt length for newly hashed passwords
const PASSWORD_SALT_LENGTH: usize = 32;

/// How often `serve` drops expired cache entries
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(
    name = "bouncer",
    about = "Token-issuing gatekeeper: credentials in, signed tokens and access decisions out",
    version
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve line-delimited JSON requests on stdin/stdout
    Serve {
        /// Directory document (overrides [backend] directory)
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },

    /// Print a directory user record with a freshly salted password hash
    HashPassword {
        /// User id (login name)
        username: String,

        /// Digest algorithm (sha1, sha256, sha384, sha512)
        #[arg(long)]
        hash: Option<String>,

        /// Group ids to put the user in
        #[arg(short, long)]
        group: Vec<String>,

        /// Create the account disabled
        #[arg(long)]
        inactive: bool,
    },

    /// Initialize configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path).await?
    } else {
        let default_path = Config::default_path();
        if default_path.exists() {
            Config::load(&default_path).await?
        } else {
            Config::default()
        }
    };

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { directory } => {
            run_server(config, directory).await?;
        }
        Commands::HashPassword {
            username,
            hash,
            group,
            inactive,
        } => {
            hash_password(&config, username, hash, group, !inactive)?;
        }
        Commands::Init { force } => {
            init_config(force).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries server replies
fn init_logging(config: &Config, verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str())),
        1 => EnvFilter::from_default_env().add_directive(Level::DEBUG.into()),
        _ => EnvFilter::from_default_env().add_directive(Level::TRACE.into()),
    };

    let json = config.logging.format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(io::stderr)))
        .init();
}

async fn run_server(
    config: Config,
    directory: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = directory.unwrap_or_else(|| config.backend.directory.clone());
    let directory = MemoryDirectory::load(&path).await.map_err(|e| {
        format!(
            "Failed to load directory from {}: {}",
            path.display(),
            e
        )
    })?;
    info!(path = %path.display(), "Loaded directory");

    let store = Arc::new(MemorySecretStore::new());
    let purger = MemorySecretStore::spawn_purge_task(&store, PURGE_INTERVAL);

    let mut gatekeeper = Gatekeeper::new(&config, Arc::new(directory), store);
    match &config.onetime.sendmail {
        Some(program) => {
            info!(program = %program.display(), "One-time passwords are delivered by mail");
            gatekeeper = gatekeeper.with_one_time_delivery(Arc::new(SendmailDelivery::new(
                program.clone(),
                config.onetime.sender.clone(),
            )));
        }
        None => warn!("No [onetime] sendmail configured; one-time passwords are disabled"),
    }
    info!(
        algorithm = %gatekeeper.tokens().algorithm(),
        expiration = ?config.token.expiration,
        "Gatekeeper ready"
    );

    let result = BouncerServer::new(Arc::new(gatekeeper)).run_stdio().await;
    purger.abort();
    result?;
    Ok(())
}

fn hash_password(
    config: &Config,
    username: String,
    hash: Option<String>,
    groups: Vec<String>,
    active: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let algorithm = match hash {
        Some(name) => name.parse::<HashAlgorithm>()?,
        None => config.backend.hash,
    };

    eprint!("Password: ");
    io::stderr().flush()?;
    let password = Secret::new(rpassword::read_password()?);
    if password.is_empty() {
        return Err("Password must not be empty".into());
    }

    eprint!("Confirm password: ");
    io::stderr().flush()?;
    let confirm = Secret::new(rpassword::read_password()?);
    if password.expose() != confirm.expose() {
        return Err("Passwords do not match".into());
    }

    let salt = char_salt(PASSWORD_SALT_LENGTH);
    let record = UserRecord {
        id: username.to_lowercase(),
        password: Some(password_hash(algorithm, password.expose(), &salt)),
        hash: Some(algorithm.name().to_string()),
        salt: Some(salt),
        active,
        groups,
        ..Default::default()
    };

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn init_config(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = Config::default_path();

    if config_path.exists() && !force {
        return Err(format!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_path.display()
        )
        .into());
    }

    // Create config directory
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(&config_path, DEFAULT_CONFIG).await?;
    println!("Configuration initialized at {}", config_path.display());

    let directory_path = Config::default_directory_path();
    if !directory_path.exists() {
        if let Some(parent) = directory_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&directory_path, "{\n  \"users\": [],\n  \"groups\": []\n}\n").await?;
        println!("Empty directory created at {}", directory_path.display());
    }

    println!("\nNext steps:");
    println!("1. Add users with `bouncer hash-password <username>` and paste the record into the directory");
    println!("2. Run `bouncer serve` and send one JSON request per line on stdin");

    Ok(())
}
