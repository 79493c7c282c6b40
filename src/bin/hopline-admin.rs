use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hopline::auth::AuthService;
use hopline::config::Config;
use hopline::storage::{self, StorageError};

#[derive(Parser)]
#[command(name = "hopline-admin")]
#[command(about = "Hopline account and API key management", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user and print its first API key
    CreateUser { username: String, email: String },
    /// Issue an additional API key for a user
    IssueKey { user_id: i64 },
    /// List a user's API keys
    ListKeys { user_id: i64 },
    /// Revoke one of a user's API keys
    RevokeKey { user_id: i64, api_key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let storage = storage::connect(&config.database).await?;
    let auth = AuthService::new(storage.clone());

    match cli.command {
        Commands::CreateUser { username, email } => {
            let user = match storage.create_user(&username, &email).await {
                Ok(user) => user,
                Err(StorageError::Conflict) => {
                    anyhow::bail!("username or email already registered")
                }
                Err(StorageError::Other(e)) => return Err(e),
            };
            let (key, _) = auth.issue_key(user.id).await?;
            println!("✓ Created user {} (id {})", user.username, user.id);
            println!("  API key: {}", key);
        }
        Commands::IssueKey { user_id } => {
            storage
                .get_user(user_id)
                .await?
                .with_context(|| format!("user {} does not exist", user_id))?;
            let (key, record) = auth.issue_key(user_id).await?;
            println!("✓ Issued key {} for user {}", record.prefix, user_id);
            println!("  API key: {}", key);
        }
        Commands::ListKeys { user_id } => {
            let keys = storage.list_api_keys(user_id).await?;
            if keys.is_empty() {
                println!("No API keys for user {}", user_id);
            } else {
                println!("API keys for user {}:", user_id);
                println!("{:<8} {:<12} {}", "ID", "Prefix", "Created");
                println!("{}", "-".repeat(40));
                for key in keys {
                    let created = chrono::DateTime::from_timestamp(key.created_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| key.created_at.to_string());
                    println!("{:<8} {:<12} {}", key.id, key.prefix, created);
                }
            }
        }
        Commands::RevokeKey { user_id, api_key } => {
            if auth.revoke_key(user_id, &api_key).await? {
                println!("✓ Revoked key for user {}", user_id);
            } else {
                println!("✗ No such key for user {}", user_id);
            }
        }
    }

    Ok(())
}
