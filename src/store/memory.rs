// ABOUTME: In-memory implementation of the database capability traits
// ABOUTME: Backs the extractor and assembler tests without a PostgreSQL server

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{ObjectRow, ObjectStore, ReplicationSlot, SlotChange, Transactional};
use crate::error::Result;
use crate::lsn::Lsn;
use crate::osm::{Location, Member, ObjectType, Tag, UserInfo};

type VersionKey = (ObjectType, i64, i64);

/// What a session did to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    pub peeks: usize,
    pub advanced_to: Option<Lsn>,
    pub committed: bool,
    pub changeset_lookups: Vec<i64>,
    pub object_fetches: usize,
}

/// Fixed slot contents and object tables. Sessions are `&MemoryStore`, so
/// the store outlives the commit and can be inspected afterwards.
///
/// Child rows are kept in insertion order and sorted by their sequence
/// number, or tags by key, only when fetched, like an unclustered table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot_changes: Vec<SlotChange>,
    changesets: HashMap<i64, Vec<UserInfo>>,
    objects: HashMap<VersionKey, Vec<ObjectRow>>,
    tags: HashMap<VersionKey, Vec<Tag>>,
    way_nodes: HashMap<(i64, i64), Vec<(i64, i64)>>,
    members: HashMap<(i64, i64), Vec<(i64, Member)>>,
    activity: Mutex<Activity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_slot_change(&mut self, lsn: &str, xid: &str, data: &str) -> &mut Self {
        self.slot_changes.push(SlotChange::new(lsn, xid, data));
        self
    }

    pub fn add_changeset(&mut self, changeset: i64, user_id: i64, username: &str) -> &mut Self {
        self.changesets.entry(changeset).or_default().push(UserInfo {
            id: user_id,
            username: username.to_string(),
        });
        self
    }

    pub fn add_object(
        &mut self,
        object_type: ObjectType,
        id: i64,
        version: i64,
        row: ObjectRow,
    ) -> &mut Self {
        self.objects
            .entry((object_type, id, version))
            .or_default()
            .push(row);
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_node(
        &mut self,
        id: i64,
        version: i64,
        changeset: i64,
        visible: bool,
        timestamp: &str,
        lon: i64,
        lat: i64,
    ) -> &mut Self {
        self.add_object(
            ObjectType::Node,
            id,
            version,
            ObjectRow {
                changeset,
                visible,
                timestamp: timestamp.to_string(),
                location: Some(Location { lon, lat }),
            },
        )
    }

    pub fn add_tag(
        &mut self,
        object_type: ObjectType,
        id: i64,
        version: i64,
        key: &str,
        value: &str,
    ) -> &mut Self {
        self.tags
            .entry((object_type, id, version))
            .or_default()
            .push(Tag::new(key, value));
        self
    }

    pub fn add_way_node(
        &mut self,
        way_id: i64,
        version: i64,
        sequence: i64,
        node_id: i64,
    ) -> &mut Self {
        self.way_nodes
            .entry((way_id, version))
            .or_default()
            .push((sequence, node_id));
        self
    }

    pub fn add_member(
        &mut self,
        relation_id: i64,
        version: i64,
        sequence: i64,
        member_type: ObjectType,
        member_id: i64,
        role: &str,
    ) -> &mut Self {
        self.members
            .entry((relation_id, version))
            .or_default()
            .push((
                sequence,
                Member {
                    member_type,
                    member_id,
                    role: role.to_string(),
                },
            ));
        self
    }

    /// Snapshot of what sessions have done so far.
    pub fn activity(&self) -> Activity {
        self.record().clone()
    }

    fn record(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transactional for &MemoryStore {
    async fn commit(self) -> Result<()> {
        self.record().committed = true;
        Ok(())
    }
}

impl ReplicationSlot for &MemoryStore {
    async fn peek_changes(&self, _slot: &str) -> Result<Vec<SlotChange>> {
        self.record().peeks += 1;
        Ok(self.slot_changes.clone())
    }

    /// Recorded at once, whether or not the session commits.
    async fn advance_slot(&self, _slot: &str, lsn: Lsn) -> Result<()> {
        self.record().advanced_to = Some(lsn);
        Ok(())
    }
}

impl ObjectStore for &MemoryStore {
    async fn changeset_user(&self, changeset: i64) -> Result<Vec<UserInfo>> {
        self.record().changeset_lookups.push(changeset);
        Ok(self.changesets.get(&changeset).cloned().unwrap_or_default())
    }

    async fn fetch_object(
        &self,
        object_type: ObjectType,
        id: i64,
        version: i64,
    ) -> Result<Vec<ObjectRow>> {
        self.record().object_fetches += 1;
        Ok(self
            .objects
            .get(&(object_type, id, version))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_tags(
        &self,
        object_type: ObjectType,
        id: i64,
        version: i64,
    ) -> Result<Vec<Tag>> {
        let mut tags = self
            .tags
            .get(&(object_type, id, version))
            .cloned()
            .unwrap_or_default();
        tags.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(tags)
    }

    async fn fetch_way_nodes(&self, way_id: i64, version: i64) -> Result<Vec<i64>> {
        let mut rows = self
            .way_nodes
            .get(&(way_id, version))
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|(sequence, _)| *sequence);
        Ok(rows.into_iter().map(|(_, node_id)| node_id).collect())
    }

    async fn fetch_members(&self, relation_id: i64, version: i64) -> Result<Vec<Member>> {
        let mut rows = self
            .members
            .get(&(relation_id, version))
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|(sequence, _)| *sequence);
        Ok(rows.into_iter().map(|(_, member)| member).collect())
    }
}
