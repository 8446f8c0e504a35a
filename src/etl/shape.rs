use regex::Regex;

use crate::data::osm::{ElementKind, RawElement, RawTag};
use crate::data::tabular::{NodeRow, ShapedElement, TagRow, WayNodeRow, WayRow};
use crate::etl::classify::Domain;
use crate::etl::normalize::Normalizer;

pub const DEFAULT_TAG_TYPE: &str = "regular";

const PROBLEM_CHARS: &str = r#"[=+/&<>;'"?%#$@,. \t\r\n]"#;

/// Splits a tag key into `(type, key)` at the first colon; later colons stay in the key.
pub fn split_key<'k>(raw_key: &'k str, default_tag_type: &'k str) -> (&'k str, &'k str) {
    match raw_key.split_once(':') {
        Some((tag_type, key)) => (tag_type, key),
        None => (default_tag_type, raw_key),
    }
}

/// Turns one element into its rows.
#[derive(Debug, Clone)]
pub struct Shaper {
    normalizer: Normalizer,
    default_tag_type: String,
    problem_chars: Option<Regex>,
}

impl Shaper {
    pub fn new(normalizer: Normalizer) -> Self {
        Shaper {
            normalizer,
            default_tag_type: DEFAULT_TAG_TYPE.to_string(),
            problem_chars: None,
        }
    }

    pub fn with_default_tag_type(mut self, default_tag_type: impl Into<String>) -> Self {
        self.default_tag_type = default_tag_type.into();
        self
    }

    /// Drop tags whose key contains characters a loader would choke on.
    pub fn skip_problem_keys(mut self, skip: bool) -> Self {
        self.problem_chars = if skip {
            Some(Regex::new(PROBLEM_CHARS).unwrap())
        } else {
            None
        };
        self
    }

    /// `None` for relations; only nodes and ways have a tabular shape.
    pub fn shape(&self, element: &RawElement) -> Option<ShapedElement> {
        match element.kind {
            ElementKind::Node => Some(ShapedElement::Node {
                node: NodeRow::from_attributes(&element.attributes),
                tags: self.shape_tags(element),
            }),
            ElementKind::Way => Some(ShapedElement::Way {
                way: WayRow::from_attributes(&element.attributes),
                nodes: element
                    .node_refs
                    .iter()
                    .enumerate()
                    .map(|(position, node_ref)| WayNodeRow {
                        id: element.id().map(str::to_string),
                        node_id: node_ref.clone(),
                        position,
                    })
                    .collect(),
                tags: self.shape_tags(element),
            }),
            ElementKind::Relation => None,
        }
    }

    fn shape_tags(&self, element: &RawElement) -> Vec<TagRow> {
        element
            .tags
            .iter()
            .filter(|tag| !self.is_problem_key(&tag.key))
            .map(|tag| self.shape_tag(element.id(), tag))
            .collect()
    }

    fn is_problem_key(&self, key: &str) -> bool {
        self.problem_chars
            .as_ref()
            .is_some_and(|problem_chars| problem_chars.is_match(key))
    }

    fn shape_tag(&self, parent_id: Option<&str>, tag: &RawTag) -> TagRow {
        let value = match Domain::from_tag_key(&tag.key) {
            Some(domain) => self.normalizer.normalize(domain, &tag.value).into_owned(),
            None => tag.value.clone(),
        };
        let (tag_type, key) = split_key(&tag.key, &self.default_tag_type);
        TagRow {
            id: parent_id.map(str::to_string),
            key: key.to_string(),
            value,
            tag_type: tag_type.to_string(),
        }
    }
}
