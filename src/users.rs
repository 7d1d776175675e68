// ABOUTME: Changeset to author lookup built once per diff assembly run
// ABOUTME: Seeded from the log's change records, then filled with one query per changeset

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::logfile::ChangeRecord;
use crate::osm::UserInfo;
use crate::store::ObjectStore;

/// Authors of the changesets named in one log file.
///
/// Filled in two phases: [`ChangesetUsers::seed`] collects the keys,
/// [`ChangesetUsers::populate`] resolves them. Each changeset is queried
/// once no matter how many objects reference it.
#[derive(Debug, Default)]
pub struct ChangesetUsers {
    users: BTreeMap<i64, Option<UserInfo>>,
}

impl ChangesetUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[ChangeRecord]) -> Self {
        let mut users = Self::new();
        for record in records {
            users.seed(record.changeset);
        }
        users
    }

    pub fn seed(&mut self, changeset: i64) {
        self.users.entry(changeset).or_insert(None);
    }

    /// Resolve every seeded changeset that is still pending.
    ///
    /// # Errors
    ///
    /// [`Error::DataIntegrity`] if a changeset does not map to exactly one
    /// author.
    pub async fn populate<S: ObjectStore>(&mut self, store: &S) -> Result<()> {
        for (changeset, user) in self.users.iter_mut() {
            if user.is_some() {
                continue;
            }
            let mut rows = store.changeset_user(*changeset).await?;
            if rows.len() != 1 {
                return Err(Error::DataIntegrity(format!(
                    "changeset_user for changeset {} returned {} rows, expected exactly one",
                    changeset,
                    rows.len()
                )));
            }
            let info = rows.remove(0);
            tracing::debug!(
                "Changeset {} belongs to user {} ({})",
                changeset,
                info.id,
                info.username
            );
            *user = Some(info);
        }
        Ok(())
    }

    /// Author of a resolved changeset.
    pub fn get(&self, changeset: i64) -> Result<&UserInfo> {
        self.users
            .get(&changeset)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                Error::DataIntegrity(format!(
                    "changeset {} was not resolved before use",
                    changeset
                ))
            })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::ObjectType;
    use crate::store::MemoryStore;

    fn record(id: i64, changeset: i64) -> ChangeRecord {
        ChangeRecord {
            object_type: ObjectType::Node,
            id,
            version: 1,
            changeset,
        }
    }

    #[tokio::test]
    async fn test_populate_resolves_every_changeset_once() {
        let mut store = MemoryStore::new();
        store
            .add_changeset(5, 9, "alice")
            .add_changeset(6, 10, "bob")
            .add_changeset(7, 11, "carol");

        let records = [record(1, 5), record(2, 6), record(3, 5), record(4, 7), record(5, 5)];
        let mut users = ChangesetUsers::from_records(&records);
        assert_eq!(users.len(), 3);
        users.populate(&&store).await.unwrap();

        assert_eq!(users.get(5).unwrap().username, "alice");
        assert_eq!(users.get(6).unwrap().id, 10);
        assert_eq!(users.get(7).unwrap().username, "carol");
        assert_eq!(store.activity().changeset_lookups, vec![5, 6, 7]);
    }

    #[tokio::test]
    async fn test_missing_changeset_is_integrity_error() {
        let mut store = MemoryStore::new();
        store.add_changeset(5, 9, "alice");

        let mut users = ChangesetUsers::from_records(&[record(1, 5), record(2, 8)]);
        let err = users.populate(&&store).await.unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
        assert!(err.to_string().contains("changeset 8"));
    }

    #[tokio::test]
    async fn test_ambiguous_changeset_is_integrity_error() {
        let mut store = MemoryStore::new();
        store.add_changeset(5, 9, "alice").add_changeset(5, 10, "mallory");

        let mut users = ChangesetUsers::from_records(&[record(1, 5)]);
        let err = users.populate(&&store).await.unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
    }

    #[tokio::test]
    async fn test_populate_skips_resolved_entries() {
        let mut store = MemoryStore::new();
        store.add_changeset(5, 9, "alice").add_changeset(6, 10, "bob");

        let mut users = ChangesetUsers::from_records(&[record(1, 5)]);
        users.populate(&&store).await.unwrap();
        users.seed(6);
        users.seed(5);
        users.populate(&&store).await.unwrap();
        assert_eq!(store.activity().changeset_lookups, vec![5, 6]);
    }

    #[test]
    fn test_unseeded_changeset_is_integrity_error() {
        let users = ChangesetUsers::new();
        assert!(users.is_empty());
        assert!(matches!(users.get(1), Err(Error::DataIntegrity(_))));
    }
}
