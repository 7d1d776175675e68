// ABOUTME: Rebuilds full object versions named by the replication log
// ABOUTME: Fetches attributes, tags and child references and commits them to a change buffer

use crate::error::{Error, Result};
use crate::logfile::ChangeRecord;
use crate::osm::{ChangeBuffer, Node, ObjectMeta, ObjectType, OsmObject, Relation, Way};
use crate::store::{ObjectRow, ObjectStore};
use crate::users::ChangesetUsers;

/// Turns [`ChangeRecord`]s into [`OsmObject`]s using one database session
/// and the run's resolved changeset authors.
pub struct Reconstructor<'a, S> {
    store: &'a S,
    users: &'a ChangesetUsers,
}

impl<'a, S: ObjectStore> Reconstructor<'a, S> {
    pub fn new(store: &'a S, users: &'a ChangesetUsers) -> Self {
        Self { store, users }
    }

    /// Fetch the current state of one object version.
    ///
    /// # Errors
    ///
    /// [`Error::DataIntegrity`] if the object table does not hold exactly
    /// one row for `(id, version)`, or the row's changeset differs from the
    /// log's or has no resolved author.
    pub async fn fetch(&self, record: &ChangeRecord) -> Result<OsmObject> {
        let row = self.fetch_row(record).await?;
        let meta = self.meta(record, &row)?;

        let object = match record.object_type {
            ObjectType::Node => self.node(record, meta, &row).await?,
            ObjectType::Way => self.way(record, meta).await?,
            ObjectType::Relation => self.relation(record, meta).await?,
        };
        Ok(object)
    }

    /// Fetch one object version and commit it to `buffer`.
    pub async fn reconstruct_into(
        &self,
        record: &ChangeRecord,
        buffer: &mut ChangeBuffer,
    ) -> Result<()> {
        let object = self.fetch(record).await?;
        buffer.push(&object);
        Ok(())
    }

    async fn fetch_row(&self, record: &ChangeRecord) -> Result<ObjectRow> {
        let mut rows = self
            .store
            .fetch_object(record.object_type, record.id, record.version)
            .await?;
        if rows.len() != 1 {
            return Err(Error::DataIntegrity(format!(
                "{} {} version {} returned {} rows, expected exactly one",
                record.object_type,
                record.id,
                record.version,
                rows.len()
            )));
        }
        Ok(rows.remove(0))
    }

    fn meta(&self, record: &ChangeRecord, row: &ObjectRow) -> Result<ObjectMeta> {
        if row.changeset != record.changeset {
            return Err(Error::DataIntegrity(format!(
                "{} {} version {} is in changeset {} but the log says {}, \
                 log and database are out of sync",
                record.object_type, record.id, record.version, row.changeset, record.changeset
            )));
        }
        Ok(ObjectMeta {
            id: record.id,
            version: record.version,
            changeset: row.changeset,
            visible: row.visible,
            timestamp: row.timestamp.clone(),
            user: self.users.get(row.changeset)?.clone(),
        })
    }

    async fn node(
        &self,
        record: &ChangeRecord,
        meta: ObjectMeta,
        row: &ObjectRow,
    ) -> Result<OsmObject> {
        let location = row.location.ok_or_else(|| {
            Error::DataIntegrity(format!(
                "node {} version {} has no location",
                record.id, record.version
            ))
        })?;
        let tags = self
            .store
            .fetch_tags(ObjectType::Node, record.id, record.version)
            .await?;
        Ok(OsmObject::Node(Node {
            meta,
            location,
            tags,
        }))
    }

    async fn way(&self, record: &ChangeRecord, meta: ObjectMeta) -> Result<OsmObject> {
        let nodes = self.store.fetch_way_nodes(record.id, record.version).await?;
        let tags = self
            .store
            .fetch_tags(ObjectType::Way, record.id, record.version)
            .await?;
        Ok(OsmObject::Way(Way { meta, nodes, tags }))
    }

    async fn relation(&self, record: &ChangeRecord, meta: ObjectMeta) -> Result<OsmObject> {
        let members = self.store.fetch_members(record.id, record.version).await?;
        let tags = self
            .store
            .fetch_tags(ObjectType::Relation, record.id, record.version)
            .await?;
        Ok(OsmObject::Relation(Relation {
            meta,
            members,
            tags,
        }))
    }
}
