// ABOUTME: Narrow database capability traits used by the extractor and assembler
// ABOUTME: Implemented over tokio-postgres transactions and by an in-memory store

pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::lsn::Lsn;
use crate::osm::{Location, Member, ObjectType, Tag, UserInfo};

/// A row as returned by peeking a logical replication slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChange {
    pub lsn: String,
    pub xid: String,
    pub data: String,
}

impl SlotChange {
    pub fn new(lsn: impl Into<String>, xid: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            lsn: lsn.into(),
            xid: xid.into(),
            data: data.into(),
        }
    }
}

/// Current state of one object version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRow {
    pub changeset: i64,
    pub visible: bool,
    pub timestamp: String,
    /// Only nodes have one.
    pub location: Option<Location>,
}

/// Everything that runs inside one database transaction. Consuming the
/// session commits it; dropping it rolls back.
#[allow(async_fn_in_trait)]
pub trait Transactional: Sized {
    async fn commit(self) -> Result<()>;
}

/// Access to a logical replication slot.
#[allow(async_fn_in_trait)]
pub trait ReplicationSlot {
    /// All pending changes, without moving the slot.
    async fn peek_changes(&self, slot: &str) -> Result<Vec<SlotChange>>;

    /// Confirm everything up to and including `lsn`.
    async fn advance_slot(&self, slot: &str, lsn: Lsn) -> Result<()>;
}

/// Read access to the object tables. Every method returns all matching rows
/// so callers can check cardinality themselves.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    async fn changeset_user(&self, changeset: i64) -> Result<Vec<UserInfo>>;

    async fn fetch_object(
        &self,
        object_type: ObjectType,
        id: i64,
        version: i64,
    ) -> Result<Vec<ObjectRow>>;

    /// Tags of one object version, ordered by key.
    async fn fetch_tags(&self, object_type: ObjectType, id: i64, version: i64)
        -> Result<Vec<Tag>>;

    /// Node references of a way, ordered by sequence.
    async fn fetch_way_nodes(&self, way_id: i64, version: i64) -> Result<Vec<i64>>;

    /// Members of a relation, ordered by sequence.
    async fn fetch_members(&self, relation_id: i64, version: i64) -> Result<Vec<Member>>;
}
