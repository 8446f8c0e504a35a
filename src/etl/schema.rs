//! Declared row schema and the validator that gates rows before they reach a sink.

use std::fmt;

use serde::Deserialize;

use crate::data::osm::ElementKind;
use crate::data::tabular::{Record, RowGroup, ShapedElement};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    String,
}

impl FieldType {
    fn accepts(&self, value: &str) -> bool {
        match self {
            FieldType::Integer => value.parse::<i64>().is_ok(),
            FieldType::Float => value.parse::<f64>().is_ok_and(f64::is_finite),
            FieldType::String => true,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::String => "string",
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

fn required_by_default() -> bool {
    true
}

impl FieldSpec {
    pub fn required(name: &str, field_type: FieldType) -> Self {
        FieldSpec {
            name: name.to_string(),
            field_type,
            required: true,
        }
    }
}

/// Fields of one row group.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct RowSchema {
    pub fields: Vec<FieldSpec>,
}

impl RowSchema {
    fn check<R: Record>(&self, group: RowGroup, row_index: usize, row: &R, violations: &mut Vec<FieldViolation>) {
        for spec in &self.fields {
            let problem = match row.field(&spec.name) {
                None if spec.required => Some("required field is missing".to_string()),
                None => None,
                Some(value) if !spec.field_type.accepts(&value) => Some(format!(
                    "'{}' is not a valid {}",
                    value,
                    spec.field_type.as_str()
                )),
                Some(_) => None,
            };
            if let Some(problem) = problem {
                violations.push(FieldViolation {
                    group,
                    row: row_index,
                    field: spec.name.clone(),
                    problem,
                });
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ElementSchema {
    pub node: RowSchema,
    pub node_tags: RowSchema,
    pub way: RowSchema,
    pub way_nodes: RowSchema,
    pub way_tags: RowSchema,
}

impl Default for ElementSchema {
    fn default() -> Self {
        use FieldType::{Float, Integer, String};

        let row = |fields: &[(&str, FieldType)]| RowSchema {
            fields: fields
                .iter()
                .map(|(name, field_type)| FieldSpec::required(name, *field_type))
                .collect(),
        };
        let tags = [("id", Integer), ("key", String), ("value", String), ("type", String)];

        ElementSchema {
            node: row(&[
                ("id", Integer),
                ("lat", Float),
                ("lon", Float),
                ("user", String),
                ("uid", Integer),
                ("version", String),
                ("changeset", Integer),
                ("timestamp", String),
            ]),
            node_tags: row(&tags),
            way: row(&[
                ("id", Integer),
                ("user", String),
                ("uid", Integer),
                ("version", String),
                ("changeset", Integer),
                ("timestamp", String),
            ]),
            way_nodes: row(&[("id", Integer), ("node_id", Integer), ("position", Integer)]),
            way_tags: row(&tags),
        }
    }
}

impl ElementSchema {
    /// Checks every row of the element; all violations are reported, not just the first.
    pub fn validate(&self, shaped: &ShapedElement) -> Result<(), ValidationFailure> {
        let mut violations = Vec::new();
        match shaped {
            ShapedElement::Node { node, tags } => {
                self.node.check(RowGroup::Node, 0, node, &mut violations);
                for (index, tag) in tags.iter().enumerate() {
                    self.node_tags.check(RowGroup::NodeTags, index, tag, &mut violations);
                }
            }
            ShapedElement::Way { way, nodes, tags } => {
                self.way.check(RowGroup::Way, 0, way, &mut violations);
                for (index, node) in nodes.iter().enumerate() {
                    self.way_nodes.check(RowGroup::WayNodes, index, node, &mut violations);
                }
                for (index, tag) in tags.iter().enumerate() {
                    self.way_tags.check(RowGroup::WayTags, index, tag, &mut violations);
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure {
                kind: shaped.kind(),
                element_id: shaped.id().map(str::to_string),
                violations,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub group: RowGroup,
    pub row: usize,
    pub field: String,
    pub problem: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}: {}", self.group, self.row, self.field, self.problem)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub kind: ElementKind,
    pub element_id: Option<String>,
    pub violations: Vec<FieldViolation>,
}

impl ValidationFailure {
    /// First row group with a violation.
    pub fn group(&self) -> Option<RowGroup> {
        self.violations.first().map(|violation| violation.group)
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} has {} invalid field(s): ",
            self.kind,
            self.element_id.as_deref().unwrap_or("without id"),
            self.violations.len()
        )?;
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tabular::{NodeRow, TagRow, WayNodeRow, WayRow};

    fn valid_node() -> ShapedElement {
        ShapedElement::Node {
            node: NodeRow {
                id: Some("757860928".into()),
                lat: Some("41.9747374".into()),
                lon: Some("-87.6920102".into()),
                user: Some("uboot".into()),
                uid: Some("26299".into()),
                version: Some("2".into()),
                changeset: Some("5288876".into()),
                timestamp: Some("2010-07-22T16:16:51Z".into()),
            },
            tags: vec![TagRow {
                id: Some("757860928".into()),
                key: "amenity".into(),
                value: "fast_food".into(),
                tag_type: "regular".into(),
            }],
        }
    }

    #[test]
    fn well_formed_node_passes() {
        assert_eq!(ElementSchema::default().validate(&valid_node()), Ok(()));
    }

    #[test]
    fn reports_group_and_fields() {
        let mut shaped = valid_node();
        if let ShapedElement::Node { node, tags } = &mut shaped {
            node.lat = Some("north".into());
            node.uid = None;
            tags[0].id = Some("x1".into());
        }
        let failure = ElementSchema::default().validate(&shaped).unwrap_err();
        assert_eq!(failure.kind, ElementKind::Node);
        assert_eq!(failure.element_id.as_deref(), Some("757860928"));
        assert_eq!(failure.group(), Some(RowGroup::Node));

        let fields: Vec<(RowGroup, &str)> = failure
            .violations
            .iter()
            .map(|v| (v.group, v.field.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![(RowGroup::Node, "lat"), (RowGroup::Node, "uid"), (RowGroup::NodeTags, "id")]
        );
        assert!(failure.to_string().contains("node_tags[0].id"));
    }

    #[test]
    fn way_node_refs_must_be_integers() {
        let shaped = ShapedElement::Way {
            way: WayRow {
                id: Some("1".into()),
                user: Some("u".into()),
                uid: Some("2".into()),
                version: Some("1".into()),
                changeset: Some("3".into()),
                timestamp: Some("2013-03-13T15:58:04Z".into()),
            },
            nodes: vec![
                WayNodeRow { id: Some("1".into()), node_id: "10".into(), position: 0 },
                WayNodeRow { id: Some("1".into()), node_id: "ten".into(), position: 1 },
            ],
            tags: vec![],
        };
        let failure = ElementSchema::default().validate(&shaped).unwrap_err();
        assert_eq!(failure.violations.len(), 1);
        assert_eq!(failure.violations[0].group, RowGroup::WayNodes);
        assert_eq!(failure.violations[0].row, 1);
        assert_eq!(failure.violations[0].field, "node_id");
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let mut schema = ElementSchema::default();
        for spec in &mut schema.node.fields {
            if spec.name == "user" {
                spec.required = false;
            }
        }
        let mut shaped = valid_node();
        if let ShapedElement::Node { node, .. } = &mut shaped {
            node.user = None;
        }
        assert!(schema.validate(&shaped).is_ok());
        assert!(ElementSchema::default().validate(&shaped).is_err());
    }

    #[test]
    fn schema_loads_from_json() {
        let json = r#"{
            "node": [{"name": "id", "type": "integer"}, {"name": "user", "type": "string", "required": false}],
            "node_tags": [{"name": "id", "type": "integer"}],
            "way": [{"name": "id", "type": "integer"}],
            "way_nodes": [{"name": "position", "type": "integer"}],
            "way_tags": []
        }"#;
        let schema: ElementSchema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.node.fields.len(), 2);
        assert!(!schema.node.fields[1].required);
        assert_eq!(schema.way_nodes.fields[0].field_type, FieldType::Integer);
        assert!(schema.way_tags.fields.is_empty());
    }
}
