use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod client;
mod config;
mod document;
mod error;
mod logging;
mod managers;
mod projector;
mod session;
mod state;
mod web;

use client::{CheckTarget, HttpVerificationClient, VerificationRequest};
use config::{AppConfig, CheckConfiguration, DocumentType, ValidityPeriod};
use document::{DocumentEncoder, SourceFile};
use managers::CheckManager;
use state::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, SharedCredentialStore,
    API_KEY_KEY,
};

/// Proof-of-address flash checks against the document verification service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding persisted state (overrides STATE_PATH)
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    /// Use this API key for this run only, without touching the stored one
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Log at debug level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one flash check and print the result
    Check {
        /// PDF document to verify
        file: PathBuf,
        #[command(flatten)]
        options: CheckOptions,
        /// Also print the equivalent request (key redacted)
        #[arg(long)]
        show_request: bool,
    },
    /// Print the request a check would send, without sending it
    Transcript {
        file: PathBuf,
        #[command(flatten)]
        options: CheckOptions,
    },
    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Start the web front end
    Serve {
        /// Port to listen on (overrides WEB_PORT)
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },
}

#[derive(clap::Args, Debug)]
struct CheckOptions {
    /// Accepted document type, repeatable (default: bank_statement, utility_bill, tenancy_agreement)
    #[arg(long = "type", value_name = "TAG")]
    types: Vec<DocumentType>,

    /// Maximum document age in days: 90, 365 or 1825
    #[arg(long, value_name = "DAYS")]
    validity: Option<u32>,
}

impl CheckOptions {
    fn configuration(&self) -> error::Result<CheckConfiguration> {
        let defaults = CheckConfiguration::default();
        let validity = match self.validity {
            Some(days) => ValidityPeriod::try_from(days)?,
            None => defaults.validity_period(),
        };
        if self.types.is_empty() {
            CheckConfiguration::new(defaults.accepted_types().iter().copied(), validity)
        } else {
            CheckConfiguration::new(self.types.iter().copied(), validity)
        }
    }
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Store a new API key
    Set { key: String },
    /// Show the stored API key, masked
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let log_buffer = logging::create_log_buffer(1000);
    logging::init(args.verbose, log_buffer.clone());

    let mut config = AppConfig::from_env();
    if let Some(path) = args.state_path.clone() {
        config.state_path = path;
    }

    match args.command {
        Command::Check {
            file,
            options,
            show_request,
        } => {
            let manager = build_manager(&config, args.api_key.as_deref()).await?;
            manager.configure(options.configuration()?);

            let source = SourceFile::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let outcome = manager.submit_file(source).await;
            if show_request {
                if let Ok(transcript) = manager.transcript() {
                    println!("{}\n", transcript);
                }
            }

            match outcome {
                Ok(view) => println!("{}", view.render()),
                Err(e) => {
                    error!("Check failed: {}", e);
                    anyhow::bail!(e.user_message());
                }
            }
        }

        Command::Transcript { file, options } => {
            let source = SourceFile::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let request = VerificationRequest {
                target: CheckTarget::from_config(&config),
                credential: String::new(),
                document: DocumentEncoder::encode(source).await?,
                configuration: options.configuration()?,
            };
            println!("{}", projector::audit_transcript(&request));
        }

        Command::Key { action } => {
            let store = FileCredentialStore::load(config.credentials_path()).await?;
            match action {
                KeyAction::Set { key } => {
                    store.set(API_KEY_KEY, key.trim()).await?;
                    info!("API key saved to {}", config.credentials_path().display());
                }
                KeyAction::Show => match store.get(API_KEY_KEY).await? {
                    Some(key) if !key.is_empty() => println!("{}", mask(&key)),
                    _ => println!("No API key stored"),
                },
            }
        }

        Command::Serve { port } => {
            let port = port.unwrap_or(config.web_port);
            let manager = build_manager(&config, args.api_key.as_deref()).await?;
            if !manager.credential_is_set() {
                info!("No API key stored yet; set one from the page or with `flashcheck key set`");
            }

            let state = web::AppState {
                manager: Arc::new(manager),
                log_buffer,
            };
            web::start_web_server(port, state).await?;
        }
    }

    Ok(())
}

/// Wire the HTTP client and credential store into a manager.
///
/// A key given on the command line lives in memory only.
async fn build_manager(config: &AppConfig, api_key: Option<&str>) -> Result<CheckManager> {
    let client = Arc::new(HttpVerificationClient::new(config.timeout)?);

    let store: SharedCredentialStore = match api_key {
        Some(key) => {
            let store = MemoryCredentialStore::new();
            store.set(API_KEY_KEY, key).await?;
            Arc::new(store)
        }
        None => Arc::new(FileCredentialStore::load(config.credentials_path()).await?),
    };

    info!("Using verification endpoint {}", config.check_endpoint());
    Ok(CheckManager::load(config, client, store).await?)
}

/// Keep only the last four characters visible
fn mask(key: &str) -> String {
    let visible: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}{}", "*".repeat(key.chars().count().saturating_sub(4)), visible)
}
