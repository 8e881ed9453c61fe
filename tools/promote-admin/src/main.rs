//! Grant the admin role to an existing user.
//!
//! Reads `TABLE_NAME` (default `evok-leads`) and the usual AWS environment.

use aws_sdk_dynamodb::Client as DynamoClient;
use clap::Parser;
use evok_shared::{config::DEFAULT_TABLE_NAME, store::DynamoUserStore, store::UserStore, users};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Promote an EVOK user to admin", long_about = None)]
struct Cli {
    /// Email address of the user to promote
    #[arg(long)]
    email: String,

    /// DynamoDB table holding users
    #[arg(long, env = "TABLE_NAME", default_value = DEFAULT_TABLE_NAME)]
    table_name: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let aws = aws_config::load_from_env().await;
    let store = DynamoUserStore::new(DynamoClient::new(&aws), &cli.table_name);

    match users::promote_to_admin(&store, &cli.email).await? {
        Some((user, true)) => {
            tracing::info!("{} ({}) is now an admin", user.email, user.user_id);
            tracing::info!("Log out and back in for the new role to take effect");
            Ok(ExitCode::SUCCESS)
        }
        Some((user, false)) => {
            tracing::info!("{} already has the admin role", user.email);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            tracing::error!("No user with email {}", cli.email);
            let known = store.list_all().await?;
            if known.is_empty() {
                tracing::info!("There are no users in table {}", cli.table_name);
            }
            for user in known {
                tracing::info!("Available: {} ({}) role={}", user.email, user.username, user.role);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
