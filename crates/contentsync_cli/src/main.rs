mod config;
mod role;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use contentsync_destination::build_router;
use contentsync_source::Selection;
use tracing::{error, info};

use crate::config::RuntimeConfig;
use crate::role::SyncRole;

#[derive(Debug, Parser)]
#[command(author, version, about = "Content sync daemon: source exporter and destination importer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the sync endpoint (destination mode).
    Serve {
        #[arg(long, default_value = "config/contentsync.toml")]
        config: PathBuf,
    },
    /// Push selected posts and pages to the destination (source mode).
    Push {
        #[arg(long, default_value = "config/contentsync.toml")]
        config: PathBuf,
        #[arg(long = "id", conflicts_with = "all")]
        ids: Vec<i64>,
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await.map(|()| ExitCode::SUCCESS),
        Command::Push { config, ids, all } => {
            let selection = if all {
                Selection::Everything
            } else {
                Selection::Ids(ids)
            };
            push(config, selection).await
        }
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = RuntimeConfig::load(&config_path)?;
    let role = SyncRole::build(&config).await?;
    let role_name = role.name();
    let SyncRole::Destination(destination) = role else {
        bail!("`serve` needs mode = \"destination\", configured role is {role_name}");
    };

    let app = build_router(destination.state);
    let listener = tokio::net::TcpListener::bind(destination.bind)
        .await
        .with_context(|| format!("failed to bind {}", destination.bind))?;

    info!(bind = %destination.bind, "contentsyncd destination listening");
    axum::serve(listener, app).await.context("axum server failed")
}

async fn push(config_path: PathBuf, selection: Selection) -> Result<ExitCode> {
    if selection == Selection::Ids(Vec::new()) {
        bail!("nothing selected: pass --id <ID> (repeatable) or --all");
    }

    let config = RuntimeConfig::load(&config_path)?;
    let role = SyncRole::build(&config).await?;
    let role_name = role.name();
    let SyncRole::Source(exporter) = role else {
        bail!("`push` needs mode = \"source\", configured role is {role_name}");
    };

    let outcome = exporter.sync(&selection).await?;
    println!("{}", outcome.notice());
    if outcome.is_success() {
        info!(%outcome, "sync finished");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(%outcome, "sync failed");
        Ok(ExitCode::FAILURE)
    }
}
