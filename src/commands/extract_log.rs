// ABOUTME: extract-log command - writes pending replication slot changes to a log file
// ABOUTME: Optionally advances the slot once the log file is durable

use anyhow::Context;
use clap::Parser;

use super::CommonArgs;
use crate::extract::{extract, ExtractOptions, ExtractOutcome};
use crate::lock::PidFile;
use crate::lsn::Lsn;
use crate::postgres::{self, PgReplicationSession};

pub const TOOL: &str = "extract-log";

/// Write changes from the replication slot to a log file
#[derive(Parser, Debug)]
#[command(name = TOOL, version)]
pub struct ExtractLogArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Advance the replication slot to the last commit written to the log
    #[arg(long)]
    pub catchup: bool,
    /// Ignore changes at or before this LSN (e.g. 0/16B2D50)
    #[arg(long, value_name = "LSN")]
    pub ignore_earlier_than: Option<Lsn>,
    /// Exit 0 instead of 1 when every pending change was ignored
    #[arg(long)]
    pub empty_is_ok: bool,
}

/// Exit code for a completed extraction.
pub fn outcome_exit_code(outcome: &ExtractOutcome, empty_is_ok: bool) -> u8 {
    match outcome {
        ExtractOutcome::AllFiltered { .. } if !empty_is_ok => 1,
        _ => 0,
    }
}

pub async fn run(args: ExtractLogArgs) -> anyhow::Result<u8> {
    let config = args.common.load_config()?;
    let options = ExtractOptions {
        slot: config.replication_slot().to_string(),
        log_dir: config.require_log_dir()?.to_path_buf(),
        catchup: args.catchup,
        ignore_earlier_than: args.ignore_earlier_than,
    };

    let _pid_file = PidFile::acquire(config.run_dir(), TOOL)?;

    tracing::info!("Connecting to database...");
    let mut client = postgres::connect(&config.connection_string())
        .await
        .context("Failed to connect to database")?;
    let transaction = client
        .transaction()
        .await
        .context("Failed to start transaction")?;
    let session = PgReplicationSession::new(transaction);
    tracing::info!("Database version: {}", session.server_version().await?);

    let outcome = extract(session, &options, &chrono::Local::now()).await?;
    if let ExtractOutcome::Written {
        path,
        entries,
        caught_up,
        ..
    } = &outcome
    {
        tracing::info!(
            "Log {:?} has {} entries (slot advanced: {}).",
            path,
            entries,
            caught_up
        );
    }
    tracing::info!("Done.");

    Ok(outcome_exit_code(&outcome, args.empty_is_ok))
}
