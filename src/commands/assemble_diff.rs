// ABOUTME: assemble-diff command - builds the .osc.gz change file for one log file
// ABOUTME: Every failure exits 2; the partial output is removed

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use super::CommonArgs;
use crate::assemble::{assemble, AssembleOptions};
use crate::postgres::{self, PgObjectSession};

pub const TOOL: &str = "assemble-diff";

/// Create an OSM change file from a replication log file
#[derive(Parser, Debug)]
#[command(name = TOOL, version)]
pub struct AssembleDiffArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Log file written by extract-log
    #[arg(value_name = "LOG-FILE")]
    pub log_file: PathBuf,
}

pub async fn run(args: AssembleDiffArgs) -> anyhow::Result<()> {
    let config = args.common.load_config()?;

    let mut options = AssembleOptions::new(&args.log_file);
    options.output_dir = config.changes_dir().map(|dir| dir.to_path_buf());

    tracing::info!("Connecting to database...");
    let mut client = postgres::connect(&config.connection_string())
        .await
        .context("Failed to connect to database")?;
    let transaction = client
        .transaction()
        .await
        .context("Failed to start transaction")?;
    let session = PgObjectSession::new(transaction)
        .await
        .context("Failed to prepare object queries")?;

    let summary = assemble(session, &options)
        .await
        .with_context(|| format!("Failed to assemble diff for {:?}", args.log_file))?;
    tracing::info!(
        "{} objects from {} changesets written to {:?}.",
        summary.objects,
        summary.changesets,
        summary.output
    );
    tracing::info!("Done.");
    Ok(())
}
