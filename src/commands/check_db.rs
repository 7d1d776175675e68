// ABOUTME: check-db command - verifies the database connection and lists logical slots
// ABOUTME: Read-only; the transaction is committed without side effects

use anyhow::Context;
use clap::Parser;

use super::CommonArgs;
use crate::postgres::{self, PgReplicationSession};
use crate::store::Transactional;

pub const TOOL: &str = "check-db";

/// Check the database connection and show the logical replication slots
#[derive(Parser, Debug)]
#[command(name = TOOL, version)]
pub struct CheckDbArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn run(args: CheckDbArgs) -> anyhow::Result<()> {
    let config = args.common.load_config()?;

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

    let slots = session
        .logical_slots()
        .await
        .context("Failed to list replication slots")?;
    if slots.is_empty() {
        tracing::info!("Replication not enabled");
    } else {
        tracing::info!("Active replication slots:");
        for slot in &slots {
            tracing::info!(
                "  name={} db={} lsn={}",
                slot.name,
                slot.database.as_deref().unwrap_or("-"),
                slot.confirmed_flush_lsn.as_deref().unwrap_or("-")
            );
        }
    }
    if !slots.iter().any(|slot| slot.name == config.replication_slot()) {
        tracing::warn!(
            "Configured replication slot '{}' does not exist",
            config.replication_slot()
        );
    }

    session.commit().await?;
    tracing::info!("Done.");
    Ok(())
}
