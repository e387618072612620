//! Herald maintenance CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use herald_cli::commands::{migrate, name_check};
use herald_cli::config::{self, HeraldConfig};
use herald_cli::error::AppError;
use herald_outbox::application::store_factory::DEFAULT_PARTITION;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Maintenance commands for the Herald domain event outbox", long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "HERALD_CONFIG", default_value = "herald.yaml", global = true)]
    config: PathBuf,

    /// Used as the `default` partition when the configuration lists none.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check and/or update legacy event type names stored in a partition.
    NameCheck {
        /// Fix legacy names using the configured legacy map.
        #[arg(long, short)]
        fix: bool,

        /// Remove events mapped to no new name. THIS IS DESTRUCTIVE.
        #[arg(long, short)]
        delete: bool,

        /// The partition to check.
        #[arg(long, default_value = DEFAULT_PARTITION)]
        partition: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Create the event table in one partition, or in all of them.
    Migrate {
        #[arg(long)]
        partition: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so reports on stdout stay parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = HeraldConfig::load(&cli.config)?.with_database_url(cli.database_url);
    let partitions = config.pg_partitions()?;

    match cli.command {
        Commands::NameCheck {
            fix,
            delete,
            partition,
            json,
        } => {
            let report = name_check::run(
                config::registry(&partitions)?,
                &config.known_types(),
                &config.name_check(delete),
                &name_check::NameCheckOptions { partition, fix },
            )
            .await?;
            if json {
                let rendered = serde_json::to_string_pretty(&report)
                    .map_err(|e| AppError::Config(format!("cannot render report: {e}")))?;
                println!("{rendered}");
            } else {
                print!("{}", report.render());
            }
        }
        Commands::Migrate { partition } => {
            for name in migrate::run(&partitions, partition.as_deref()).await? {
                println!("Migrated partition: {name}");
            }
        }
    }
    Ok(())
}
