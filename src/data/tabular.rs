//! Flat row shapes produced from one element, in the column order the loader expects.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::osm::ElementKind;

pub const NODE_FIELDS: [&str; 8] = ["id", "lat", "lon", "user", "uid", "version", "changeset", "timestamp"];
pub const NODE_TAGS_FIELDS: [&str; 4] = ["id", "key", "value", "type"];
pub const WAY_FIELDS: [&str; 6] = ["id", "user", "uid", "version", "changeset", "timestamp"];
pub const WAY_TAGS_FIELDS: [&str; 4] = ["id", "key", "value", "type"];
pub const WAY_NODES_FIELDS: [&str; 3] = ["id", "node_id", "position"];

/// The five row collections an element can contribute to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RowGroup {
    Node,
    NodeTags,
    Way,
    WayNodes,
    WayTags,
}

impl RowGroup {
    pub const ALL: [RowGroup; 5] = [
        RowGroup::Node,
        RowGroup::NodeTags,
        RowGroup::Way,
        RowGroup::WayNodes,
        RowGroup::WayTags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RowGroup::Node => "node",
            RowGroup::NodeTags => "node_tags",
            RowGroup::Way => "way",
            RowGroup::WayNodes => "way_nodes",
            RowGroup::WayTags => "way_tags",
        }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            RowGroup::Node => &NODE_FIELDS,
            RowGroup::NodeTags => &NODE_TAGS_FIELDS,
            RowGroup::Way => &WAY_FIELDS,
            RowGroup::WayNodes => &WAY_NODES_FIELDS,
            RowGroup::WayTags => &WAY_TAGS_FIELDS,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            RowGroup::Node => "nodes.csv",
            RowGroup::NodeTags => "nodes_tags.csv",
            RowGroup::Way => "ways.csv",
            RowGroup::WayNodes => "ways_nodes.csv",
            RowGroup::WayTags => "ways_tags.csv",
        }
    }
}

impl fmt::Display for RowGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field lookup by column name, used by the schema validator.
pub trait Record {
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

fn borrowed(value: &Option<String>) -> Option<Cow<'_, str>> {
    value.as_deref().map(Cow::Borrowed)
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub id: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub user: Option<String>,
    pub uid: Option<String>,
    pub version: Option<String>,
    pub changeset: Option<String>,
    pub timestamp: Option<String>,
}

impl NodeRow {
    /// Keeps only the node columns; anything else on the element is dropped.
    pub fn from_attributes(attributes: &[(String, String)]) -> Self {
        let mut row = NodeRow::default();
        for (name, value) in attributes {
            let slot = match name.as_str() {
                "id" => &mut row.id,
                "lat" => &mut row.lat,
                "lon" => &mut row.lon,
                "user" => &mut row.user,
                "uid" => &mut row.uid,
                "version" => &mut row.version,
                "changeset" => &mut row.changeset,
                "timestamp" => &mut row.timestamp,
                _ => continue,
            };
            *slot = Some(value.clone());
        }
        row
    }
}

impl Record for NodeRow {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "id" => borrowed(&self.id),
            "lat" => borrowed(&self.lat),
            "lon" => borrowed(&self.lon),
            "user" => borrowed(&self.user),
            "uid" => borrowed(&self.uid),
            "version" => borrowed(&self.version),
            "changeset" => borrowed(&self.changeset),
            "timestamp" => borrowed(&self.timestamp),
            _ => None,
        }
    }
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct WayRow {
    pub id: Option<String>,
    pub user: Option<String>,
    pub uid: Option<String>,
    pub version: Option<String>,
    pub changeset: Option<String>,
    pub timestamp: Option<String>,
}

impl WayRow {
    pub fn from_attributes(attributes: &[(String, String)]) -> Self {
        let mut row = WayRow::default();
        for (name, value) in attributes {
            let slot = match name.as_str() {
                "id" => &mut row.id,
                "user" => &mut row.user,
                "uid" => &mut row.uid,
                "version" => &mut row.version,
                "changeset" => &mut row.changeset,
                "timestamp" => &mut row.timestamp,
                _ => continue,
            };
            *slot = Some(value.clone());
        }
        row
    }
}

impl Record for WayRow {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "id" => borrowed(&self.id),
            "user" => borrowed(&self.user),
            "uid" => borrowed(&self.uid),
            "version" => borrowed(&self.version),
            "changeset" => borrowed(&self.changeset),
            "timestamp" => borrowed(&self.timestamp),
            _ => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: Option<String>,
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub tag_type: String,
}

impl Record for TagRow {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "id" => borrowed(&self.id),
            "key" => Some(Cow::Borrowed(&self.key)),
            "value" => Some(Cow::Borrowed(&self.value)),
            "type" => Some(Cow::Borrowed(&self.tag_type)),
            _ => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WayNodeRow {
    pub id: Option<String>,
    pub node_id: String,
    pub position: usize,
}

impl Record for WayNodeRow {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "id" => borrowed(&self.id),
            "node_id" => Some(Cow::Borrowed(&self.node_id)),
            "position" => Some(Cow::Owned(self.position.to_string())),
            _ => None,
        }
    }
}

/// All rows derived from one element. Emitted as a unit or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapedElement {
    Node {
        node: NodeRow,
        tags: Vec<TagRow>,
    },
    Way {
        way: WayRow,
        nodes: Vec<WayNodeRow>,
        tags: Vec<TagRow>,
    },
}

impl ShapedElement {
    pub fn kind(&self) -> ElementKind {
        match self {
            ShapedElement::Node { .. } => ElementKind::Node,
            ShapedElement::Way { .. } => ElementKind::Way,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ShapedElement::Node { node, .. } => node.id.as_deref(),
            ShapedElement::Way { way, .. } => way.id.as_deref(),
        }
    }

    /// Total rows across every group, the entity row included.
    pub fn row_count(&self) -> usize {
        match self {
            ShapedElement::Node { tags, .. } => 1 + tags.len(),
            ShapedElement::Way { nodes, tags, .. } => 1 + nodes.len() + tags.len(),
        }
    }
}
