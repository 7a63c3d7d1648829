//! Danceflow CLI - Database migrations and checkout tooling.
//!
//! # Usage
//!
//! ```bash
//! # Run checkout database migrations
//! danceflow migrate
//!
//! # Show unassigned placeholder attendees
//! danceflow placeholders --user 42 --ticket-type 7
//!
//! # Re-run attendee reconciliation from a saved handoff record
//! danceflow reconcile --user 42 --pending pending.json
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `placeholders` - Inspect unassigned placeholders
//! - `reconcile` - Bind attendees of a handoff record

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "danceflow")]
#[command(author, version, about = "Danceflow checkout tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// List unassigned placeholders of a user
    Placeholders {
        /// User id
        #[arg(short, long)]
        user: i32,

        /// Event ticket type id (repeatable)
        #[arg(short, long = "ticket-type", required = true)]
        ticket_types: Vec<i32>,
    },
    /// Bind the attendees of a saved handoff record
    Reconcile {
        /// User id
        #[arg(short, long)]
        user: i32,

        /// Path to the handoff record JSON
        #[arg(short, long)]
        pending: PathBuf,
    },
}

/// Initialize Sentry if `SENTRY_DSN` is set.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|v| !v.is_empty())?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: std::env::var("SENTRY_ENVIRONMENT")
                .ok()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let _sentry_guard = init_sentry();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "danceflow_cli=info,danceflow_checkout=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::checkout().await?,
        Commands::Placeholders { user, ticket_types } => {
            commands::placeholders::list(user, &ticket_types).await?;
        }
        Commands::Reconcile { user, pending } => {
            commands::placeholders::reconcile(user, &pending).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_reconcile_arguments_parse() {
        let cli = Cli::try_parse_from([
            "danceflow",
            "reconcile",
            "--user",
            "42",
            "--pending",
            "pending.json",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Reconcile { user: 42, .. })
        ));
    }

    #[test]
    fn test_list_requires_a_ticket_type() {
        assert!(Cli::try_parse_from(["danceflow", "placeholders", "--user", "1"]).is_err());
    }
}
