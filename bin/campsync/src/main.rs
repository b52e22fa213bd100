//! `campsync`: reconcile an HR directory with TimeCamp.
//!
//! The pipeline runs in two scheduled stages that hand JSON artifacts to
//! each other through the blob store:
//!
//!   [fetcher] → users.json → `campsync prepare` → timecamp_users.json
//!            → `campsync sync` → TimeCamp API

mod commands;

use clap::{Parser, Subcommand};

/// CampSync CLI.
#[derive(Parser, Debug)]
#[command(name = "campsync", about = "HR directory to TimeCamp synchroniser")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transform fetched people into the desired TimeCamp user set.
    Prepare {
        /// Compute and log without writing the output artifact.
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Blob key of the fetched person set.
        #[arg(long, default_value = "var/users.json")]
        input: String,

        /// Blob key for the prepared user set.
        #[arg(long, default_value = "var/timecamp_users.json")]
        output: String,
    },

    /// Converge live TimeCamp state onto the prepared user set.
    Sync {
        /// Compute the full plan but log writes instead of applying them.
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Blob key of the prepared user set.
        #[arg(long, default_value = "var/timecamp_users.json")]
        input: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if cli.debug { "debug".into() } else { "info".into() }
            }),
        )
        .init();

    let result = match cli.command {
        Commands::Prepare {
            dry_run,
            input,
            output,
        } => commands::prepare::run(dry_run, &input, &output),
        Commands::Sync { dry_run, input } => commands::sync::run(dry_run, &input),
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
