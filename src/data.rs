use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

pub mod osm;
pub mod tabular;

/// Distinct raw values observed per classification token, collected while auditing.
/// Sorted containers keep reports stable between runs.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ClassificationIndex {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl ClassificationIndex {
    pub fn record(&mut self, token: &str, value: &str) {
        self.groups
            .entry(token.to_string())
            .or_default()
            .insert(value.to_string());
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.groups.contains_key(token)
    }

    #[cfg(test)]
    pub fn get(&self, token: &str) -> Option<&BTreeSet<String>> {
        self.groups.get(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.groups.iter()
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn value_count(&self) -> usize {
        self.groups.values().map(BTreeSet::len).sum()
    }
}
