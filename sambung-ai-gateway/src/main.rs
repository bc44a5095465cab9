mod doctor;
mod server;

use clap::{Parser, Subcommand};
use sambung_ai::{FileCredentialStore, ProviderKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sambung-ai-gateway", version, about = "Multi-provider LLM gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8787")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Per-user credentials file
        #[arg(long)]
        credentials: Option<PathBuf>,
    },

    /// List known models
    Models {
        #[arg(long)]
        provider: Option<ProviderKind>,
    },

    /// Manage per-user API keys in the credentials file
    Keys {
        #[command(subcommand)]
        action: KeyAction,

        #[arg(long, global = true)]
        credentials: Option<PathBuf>,
    },

    /// Send one streamed prompt to a provider and report the result
    Doctor {
        #[arg(long)]
        provider: ProviderKind,

        /// Model id; the provider's default when omitted
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        api_key: Option<String>,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    Set {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: ProviderKind,
        #[arg(long)]
        key: String,
    },
    Remove {
        #[arg(long)]
        user: String,
        #[arg(long)]
        provider: ProviderKind,
    },
}

fn credentials_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("no config directory; pass --credentials"))?;
    Ok(FileCredentialStore::default_path(&dir))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sambung_ai=info,sambung_ai_gateway=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host, credentials } => {
            server::run_server(&host, port, credentials_path(credentials)?).await?;
        }
        Commands::Models { provider } => {
            doctor::print_models(provider);
        }
        Commands::Keys { action, credentials } => {
            let store = FileCredentialStore::new(credentials_path(credentials)?);
            match action {
                KeyAction::Set { user, provider, key } => {
                    store.set_key(&user, provider, &key).await?;
                    println!("Saved {} key for {}", provider, user);
                }
                KeyAction::Remove { user, provider } => {
                    if store.remove_key(&user, provider).await? {
                        println!("Removed {} key for {}", provider, user);
                    } else {
                        println!("No {} key stored for {}", provider, user);
                    }
                }
            }
        }
        Commands::Doctor { provider, model, api_key } => {
            doctor::run_doctor(provider, model.as_deref(), api_key.as_deref()).await?;
        }
    }

    Ok(())
}
