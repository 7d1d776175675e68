// ABOUTME: Logical replication slot access inside one PostgreSQL transaction
// ABOUTME: Peeks pending changes without consuming them and advances the slot on request

use tokio_postgres::Transaction;

use crate::error::Result;
use crate::lsn::Lsn;
use crate::store::{ReplicationSlot, SlotChange, Transactional};

const PEEK_CHANGES: &str =
    "SELECT lsn::text, xid::text, data FROM pg_logical_slot_peek_changes($1, NULL, NULL)";

const ADVANCE_SLOT: &str = "SELECT pg_replication_slot_advance($1, $2::text::pg_lsn)";

const LOGICAL_SLOTS: &str = "SELECT slot_name::text, database::text, confirmed_flush_lsn::text
     FROM pg_replication_slots
     WHERE slot_type = 'logical'
     ORDER BY slot_name";

/// One row of `pg_replication_slots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSlot {
    pub name: String,
    pub database: Option<String>,
    pub confirmed_flush_lsn: Option<String>,
}

/// A transaction used by the extractor. Dropping it without
/// [`Transactional::commit`] rolls back the transaction, but a slot advance
/// takes effect immediately and is not undone.
pub struct PgReplicationSession<'a> {
    transaction: Transaction<'a>,
}

impl<'a> PgReplicationSession<'a> {
    pub fn new(transaction: Transaction<'a>) -> Self {
        Self { transaction }
    }

    pub async fn server_version(&self) -> Result<String> {
        super::server_version(&self.transaction).await
    }

    /// All logical replication slots, by name.
    pub async fn logical_slots(&self) -> Result<Vec<LogicalSlot>> {
        let rows = self.transaction.query(LOGICAL_SLOTS, &[]).await?;
        rows.iter()
            .map(|row| -> Result<LogicalSlot> {
                Ok(LogicalSlot {
                    name: row.try_get(0)?,
                    database: row.try_get(1)?,
                    confirmed_flush_lsn: row.try_get(2)?,
                })
            })
            .collect()
    }
}

impl Transactional for PgReplicationSession<'_> {
    async fn commit(self) -> Result<()> {
        self.transaction.commit().await?;
        Ok(())
    }
}

impl ReplicationSlot for PgReplicationSession<'_> {
    async fn peek_changes(&self, slot: &str) -> Result<Vec<SlotChange>> {
        let rows = self.transaction.query(PEEK_CHANGES, &[&slot]).await?;
        rows.iter()
            .map(|row| -> Result<SlotChange> {
                Ok(SlotChange {
                    lsn: row.try_get(0)?,
                    xid: row.try_get(1)?,
                    data: row.try_get(2)?,
                })
            })
            .collect()
    }

    async fn advance_slot(&self, slot: &str, lsn: Lsn) -> Result<()> {
        let lsn = lsn.to_string();
        self.transaction.query(ADVANCE_SLOT, &[&slot, &lsn]).await?;
        Ok(())
    }
}
