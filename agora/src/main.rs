mod migrations;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use agora_core::{
    bootstrap::{init_database, init_services, load_config},
    logging, metrics,
    models::{ForumId, UserId},
    Config,
};

#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(about = "Agora forum permission engine", long_about = None)]
struct Cli {
    /// Configuration file; defaults to the usual search locations
    #[arg(long, global = true)]
    config: Option<String>,

    /// Write the Prometheus text exposition to stderr after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending database migrations
    Migrate {
        /// Only list pending migration versions
        #[arg(long)]
        dry_run: bool,
    },
    /// Recompute and print a user's global permissions
    ResolveUser { user: String },
    /// Print a user's permissions in a forum (cache-backed)
    ResolveForum { forum: String, user: String },
    /// Drop cached rows for a forum
    InvalidateForum {
        forum: String,
        /// Include every descendant forum
        #[arg(long)]
        tree: bool,
    },
    /// Recompute a user's global permissions and drop their cached rows
    InvalidateUser { user: String },
    /// Report keys the lowest default group leaves unresolved
    CheckFloor,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?,
        None => load_config()?,
    };
    logging::init_logging(&config.logging)?;

    let outcome = run(cli.command, &config).await;
    if cli.metrics {
        eprint!("{}", metrics::gather_metrics());
    }
    outcome
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let pool = init_database(config).await?;
    if let Command::Migrate { dry_run } = command {
        if dry_run {
            return print_json(&migrations::pending_migrations(&pool).await?);
        }
        migrations::run_migrations(&pool).await?;
        return print_json(&serde_json::json!({ "migrated": true }));
    }

    let services = init_services(pool, config);
    let permissions = &services.permissions;

    match command {
        Command::Migrate { .. } => Ok(()),
        Command::ResolveUser { user } => {
            let resolved = permissions.resolve_user_permissions(&UserId::from(user)).await?;
            print_json(&resolved)
        }
        Command::ResolveForum { forum, user } => {
            let resolved = permissions
                .resolve_forum_permissions(&ForumId::from(forum), &UserId::from(user))
                .await?;
            print_json(&resolved)
        }
        Command::InvalidateForum { forum, tree } => {
            let forum_id = ForumId::from(forum);
            let deleted = if tree {
                permissions.invalidate_forum_tree(&forum_id).await?
            } else {
                permissions.invalidate_forum(&forum_id).await?
            };
            info!(forum_id = %forum_id, deleted, "Forum invalidated");
            print_json(&serde_json::json!({ "forum_id": forum_id, "deleted": deleted }))
        }
        Command::InvalidateUser { user } => {
            let resolved = permissions.invalidate_user(&UserId::from(user)).await?;
            print_json(&resolved)
        }
        Command::CheckFloor => print_json(&permissions.floor_report().await?),
    }
}
