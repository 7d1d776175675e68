// ABOUTME: Object table access inside one PostgreSQL transaction
// ABOUTME: Prepares the per-type attribute, tag and child queries once per session

use tokio_postgres::{Row, Statement, Transaction};

use crate::error::{Error, Result};
use crate::osm::{Location, Member, ObjectType, Tag, UserInfo};
use crate::store::{ObjectRow, ObjectStore, Transactional};

const TIMESTAMP: &str = r#"to_char(timestamp, 'YYYY-MM-DD"T"HH24:MI:SS"Z"')"#;

struct Statements {
    changeset_user: Statement,
    node: Statement,
    way: Statement,
    relation: Statement,
    node_tags: Statement,
    way_tags: Statement,
    relation_tags: Statement,
    way_nodes: Statement,
    members: Statement,
}

/// A read-only transaction used by the assembler.
pub struct PgObjectSession<'a> {
    transaction: Transaction<'a>,
    statements: Statements,
}

impl<'a> PgObjectSession<'a> {
    /// Prepare every query this session runs.
    pub async fn new(transaction: Transaction<'a>) -> Result<Self> {
        let statements = Statements {
            changeset_user: transaction
                .prepare(
                    "SELECT u.id, u.display_name::text
                     FROM changesets c JOIN users u ON c.user_id = u.id
                     WHERE c.id = $1",
                )
                .await?,
            node: transaction
                .prepare(&format!(
                    "SELECT changeset_id, visible, {TIMESTAMP},
                            longitude::bigint, latitude::bigint
                     FROM nodes WHERE node_id = $1 AND version = $2"
                ))
                .await?,
            way: transaction
                .prepare(&format!(
                    "SELECT changeset_id, visible, {TIMESTAMP}
                     FROM ways WHERE way_id = $1 AND version = $2"
                ))
                .await?,
            relation: transaction
                .prepare(&format!(
                    "SELECT changeset_id, visible, {TIMESTAMP}
                     FROM relations WHERE relation_id = $1 AND version = $2"
                ))
                .await?,
            node_tags: transaction
                .prepare(
                    "SELECT k::text, v::text FROM node_tags
                     WHERE node_id = $1 AND version = $2
                     ORDER BY k",
                )
                .await?,
            way_tags: transaction
                .prepare(
                    "SELECT k::text, v::text FROM way_tags
                     WHERE way_id = $1 AND version = $2
                     ORDER BY k",
                )
                .await?,
            relation_tags: transaction
                .prepare(
                    "SELECT k::text, v::text FROM relation_tags
                     WHERE relation_id = $1 AND version = $2
                     ORDER BY k",
                )
                .await?,
            way_nodes: transaction
                .prepare(
                    "SELECT node_id FROM way_nodes
                     WHERE way_id = $1 AND version = $2
                     ORDER BY sequence_id",
                )
                .await?,
            members: transaction
                .prepare(
                    "SELECT member_type::text, member_id, member_role::text
                     FROM relation_members
                     WHERE relation_id = $1 AND version = $2
                     ORDER BY sequence_id",
                )
                .await?,
        };
        Ok(Self {
            transaction,
            statements,
        })
    }

    fn object_statement(&self, object_type: ObjectType) -> &Statement {
        match object_type {
            ObjectType::Node => &self.statements.node,
            ObjectType::Way => &self.statements.way,
            ObjectType::Relation => &self.statements.relation,
        }
    }

    fn tag_statement(&self, object_type: ObjectType) -> &Statement {
        match object_type {
            ObjectType::Node => &self.statements.node_tags,
            ObjectType::Way => &self.statements.way_tags,
            ObjectType::Relation => &self.statements.relation_tags,
        }
    }
}

impl Transactional for PgObjectSession<'_> {
    async fn commit(self) -> Result<()> {
        self.transaction.commit().await?;
        Ok(())
    }
}

impl ObjectStore for PgObjectSession<'_> {
    async fn changeset_user(&self, changeset: i64) -> Result<Vec<UserInfo>> {
        let rows = self
            .transaction
            .query(&self.statements.changeset_user, &[&changeset])
            .await?;
        rows.iter()
            .map(|row| -> Result<UserInfo> {
                Ok(UserInfo {
                    id: row.try_get(0)?,
                    username: row.try_get(1)?,
                })
            })
            .collect()
    }

    async fn fetch_object(
        &self,
        object_type: ObjectType,
        id: i64,
        version: i64,
    ) -> Result<Vec<ObjectRow>> {
        let rows = self
            .transaction
            .query(self.object_statement(object_type), &[&id, &version])
            .await?;
        rows.iter()
            .map(|row| object_row(object_type, row))
            .collect()
    }

    async fn fetch_tags(
        &self,
        object_type: ObjectType,
        id: i64,
        version: i64,
    ) -> Result<Vec<Tag>> {
        let rows = self
            .transaction
            .query(self.tag_statement(object_type), &[&id, &version])
            .await?;
        rows.iter()
            .map(|row| -> Result<Tag> {
                Ok(Tag {
                    key: row.try_get(0)?,
                    value: row.try_get(1)?,
                })
            })
            .collect()
    }

    async fn fetch_way_nodes(&self, way_id: i64, version: i64) -> Result<Vec<i64>> {
        let rows = self
            .transaction
            .query(&self.statements.way_nodes, &[&way_id, &version])
            .await?;
        rows.iter()
            .map(|row| -> Result<i64> { Ok(row.try_get(0)?) })
            .collect()
    }

    async fn fetch_members(&self, relation_id: i64, version: i64) -> Result<Vec<Member>> {
        let rows = self
            .transaction
            .query(&self.statements.members, &[&relation_id, &version])
            .await?;
        rows.iter().map(member).collect()
    }
}

fn object_row(object_type: ObjectType, row: &Row) -> Result<ObjectRow> {
    let location = match object_type {
        ObjectType::Node => Some(Location {
            lon: row.try_get(3)?,
            lat: row.try_get(4)?,
        }),
        ObjectType::Way | ObjectType::Relation => None,
    };
    Ok(ObjectRow {
        changeset: row.try_get(0)?,
        visible: row.try_get(1)?,
        timestamp: row.try_get(2)?,
        location,
    })
}

fn member(row: &Row) -> Result<Member> {
    let type_name: String = row.try_get(0)?;
    let member_type = type_name
        .chars()
        .next()
        .and_then(ObjectType::from_char)
        .ok_or_else(|| Error::Format(format!("unknown relation member type '{}'", type_name)))?;
    Ok(Member {
        member_type,
        member_id: row.try_get(1)?,
        role: row.try_get(2)?,
    })
}
