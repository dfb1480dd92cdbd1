//! User Session - command-line front end for the persisted login session

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user_session::config::Config;
use user_session::{PersistedSessionRecord, SessionManager};
use zeroize::Zeroize;

/// Inspect and manage the persisted login session
#[derive(Parser, Debug)]
#[command(name = "user_session")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in, replacing any stored session
    Login {
        #[arg(short, long)]
        username: String,

        /// Password (falls back to USER_SESSION_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,

        /// Privileges label (defaults to the configured default)
        #[arg(long)]
        privileges: Option<String>,
    },

    /// Show the stored session
    Status,

    /// Check a password against the stored session
    Verify {
        /// Password (falls back to USER_SESSION_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Change the privileges of the stored session
    SetPrivileges { privileges: String },

    /// End the stored session and remove it from the store
    Logout,
}

fn read_password(arg: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    arg.or_else(|| std::env::var("USER_SESSION_PASSWORD").ok())
        .ok_or_else(|| "password required: pass --password or set USER_SESSION_PASSWORD".into())
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from file if specified, otherwise use default loading
    let config = if let Some(ref path) = cli.config {
        Config::from_file(path)?
    } else {
        Config::load()
    };

    // Initialize tracing
    let log_level = if cli.verbose {
        "user_session=trace".to_string()
    } else {
        config.log_level.clone()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let manager = SessionManager::new(config.open_store()?);
    info!(namespace = manager.store().namespace(), "Session store opened");

    match cli.command {
        Command::Login {
            username,
            password,
            privileges,
        } => {
            if manager.has_stored_credentials()? {
                warn!("Replacing previously stored session");
            }
            let mut password = read_password(password)?;
            let privileges = privileges.unwrap_or_else(|| config.default_privileges.clone());
            let result = manager.acquire(&username, &password, &privileges);
            password.zeroize();
            let session = result?;
            println!("{}", manager.describe(&session));
        }
        Command::Status => match manager.restore_if_present()? {
            Some(session) => println!("{}", manager.describe(&session)),
            None => println!("No stored session"),
        },
        Command::Verify { password } => {
            let Some(session) = manager.restore_if_present()? else {
                eprintln!("No stored session");
                return Ok(ExitCode::from(2));
            };
            let mut password = read_password(password)?;
            let result = manager.verify(&session, &password);
            password.zeroize();
            if result? {
                println!("Password matches");
            } else {
                println!("Password does not match");
                return Ok(ExitCode::from(1));
            }
        }
        Command::SetPrivileges { privileges } => {
            let Some(session) = manager.restore_if_present()? else {
                eprintln!("No stored session");
                return Ok(ExitCode::from(2));
            };
            manager.update_privileges(&session, &privileges)?;
            println!("{}", manager.describe(&session));
        }
        Command::Logout => match manager.restore_if_present()? {
            Some(session) => {
                let username = manager.username(&session);
                manager.end(&session)?;
                println!("Logged out {}", username.as_deref().unwrap_or("-"));
            }
            None => {
                // a record missing USERNAME or PASSWORD is still cleared
                PersistedSessionRecord::clear(manager.store())?;
                println!("No stored session");
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
