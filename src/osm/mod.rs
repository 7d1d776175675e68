// ABOUTME: OSM object model produced by the reconstructor
// ABOUTME: Nodes, ways and relations with author, tags and child references

pub mod osc;

pub use osc::{Action, ChangeBuffer, Header, OscFile, OscWriter};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    Node,
    Way,
    Relation,
}

impl ObjectType {
    /// Accepts the single-letter type codes used by the change feed and by
    /// the relation member table, in either case.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'n' | 'N' => Some(ObjectType::Node),
            'w' | 'W' => Some(ObjectType::Way),
            'r' | 'R' => Some(ObjectType::Relation),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            ObjectType::Node => 'n',
            ObjectType::Way => 'w',
            ObjectType::Relation => 'r',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Node => "node",
            ObjectType::Way => "way",
            ObjectType::Relation => "relation",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Author of a changeset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Coordinates in fixed-point 1e-7 degree units, as the database stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub lon: i64,
    pub lat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member_type: ObjectType,
    pub member_id: i64,
    pub role: String,
}

/// Attributes every object version carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub id: i64,
    pub version: i64,
    pub changeset: i64,
    pub visible: bool,
    pub timestamp: String,
    pub user: UserInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub meta: ObjectMeta,
    pub location: Location,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Way {
    pub meta: ObjectMeta,
    pub nodes: Vec<i64>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub meta: ObjectMeta,
    pub members: Vec<Member>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsmObject {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl OsmObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            OsmObject::Node(_) => ObjectType::Node,
            OsmObject::Way(_) => ObjectType::Way,
            OsmObject::Relation(_) => ObjectType::Relation,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            OsmObject::Node(node) => &node.meta,
            OsmObject::Way(way) => &way.meta,
            OsmObject::Relation(relation) => &relation.meta,
        }
    }

    pub fn tags(&self) -> &[Tag] {
        match self {
            OsmObject::Node(node) => &node.tags,
            OsmObject::Way(way) => &way.tags,
            OsmObject::Relation(relation) => &relation.tags,
        }
    }
}

/// Render a fixed-point coordinate as decimal degrees without trailing zeros.
pub fn format_coordinate(value: i64) -> String {
    const SCALE: u64 = 10_000_000;
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let whole = abs / SCALE;
    let fraction = abs % SCALE;
    if fraction == 0 {
        return format!("{}{}", sign, whole);
    }
    let digits = format!("{:07}", fraction);
    format!("{}{}.{}", sign, whole, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_codes() {
        for c in ['n', 'N'] {
            assert_eq!(ObjectType::from_char(c), Some(ObjectType::Node));
        }
        assert_eq!(ObjectType::from_char('W'), Some(ObjectType::Way));
        assert_eq!(ObjectType::from_char('r'), Some(ObjectType::Relation));
        assert_eq!(ObjectType::from_char('c'), None);
        assert_eq!(ObjectType::Relation.to_string(), "relation");
    }

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_coordinate(0), "0");
        assert_eq!(format_coordinate(515_000_000), "51.5");
        assert_eq!(format_coordinate(-1_278_000), "-0.1278");
        assert_eq!(format_coordinate(1_800_000_000), "180");
        assert_eq!(format_coordinate(-900_000_000), "-90");
        assert_eq!(format_coordinate(1), "0.0000001");
        assert_eq!(format_coordinate(123_456_789), "12.3456789");
    }
}
