use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::errors::{Error, Result};
use crate::etl::classify::{Classifier, Domain, UNKNOWN};

/// Abbreviated or misspelled street types and their canonical spelling.
pub fn default_street_mapping() -> BTreeMap<String, String> {
    [
        ("St", "Street"),
        ("St.", "Street"),
        ("street", "Street"),
        ("Ave", "Avenue"),
        ("AVE", "Avenue"),
        ("Ave.", "Avenue"),
        ("ave", "Avenue"),
        ("Blvd", "Boulevard"),
        ("Blvd.", "Boulevard"),
        ("blvd", "Boulevard"),
        ("Cir", "Circle"),
        ("Dr", "Drive"),
        ("drive", "Drive"),
        ("Ln", "Lane"),
        ("Ln.", "Lane"),
        ("Pkwy", "Parkway"),
        ("parkway", "Parkway"),
        ("Rd", "Road"),
        ("Rd.", "Road"),
        ("Rd5", "Road"),
        ("raod", "road"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

/// Rewrites street and postal values into canonical form.
#[derive(Debug, Clone)]
pub struct Normalizer {
    classifier: Classifier,
    street_mapping: BTreeMap<String, String>,
}

impl Normalizer {
    /// Canonical words must be single tokens that are not themselves mapped,
    /// otherwise a second pass could rewrite them again.
    pub fn new(classifier: Classifier, street_mapping: BTreeMap<String, String>) -> Result<Self> {
        for (from, to) in &street_mapping {
            if classifier.is_expected_street_type(from) {
                return Err(Error::Config(format!(
                    "street mapping '{}' -> '{}': '{}' is already an expected street type",
                    from, to, from
                )));
            }
            let starts_alphanumeric = to.chars().next().is_some_and(char::is_alphanumeric);
            if !starts_alphanumeric || to.chars().any(char::is_whitespace) {
                return Err(Error::Config(format!(
                    "street mapping '{}' -> '{}': canonical form must be a single word",
                    from, to
                )));
            }
            if street_mapping.contains_key(to) {
                return Err(Error::Config(format!(
                    "street mapping '{}' -> '{}': canonical form is itself mapped",
                    from, to
                )));
            }
        }
        Ok(Normalizer {
            classifier,
            street_mapping,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn normalize<'v>(&self, domain: Domain, value: &'v str) -> Cow<'v, str> {
        match domain {
            Domain::Street => self.normalize_street(value),
            Domain::Postal => Cow::Owned(self.normalize_postal(value)),
        }
    }

    fn normalize_street<'v>(&self, value: &'v str) -> Cow<'v, str> {
        let Some(found) = self.classifier.street_match(value) else {
            return Cow::Borrowed(value);
        };
        match self.street_mapping.get(found.as_str()) {
            Some(canonical) => {
                let mut fixed = String::with_capacity(found.start() + canonical.len());
                fixed.push_str(&value[..found.start()]);
                fixed.push_str(canonical);
                Cow::Owned(fixed)
            }
            None => Cow::Borrowed(value),
        }
    }

    /// Lossy: ZIP+4 suffixes are cut off, anything without five digits becomes `unknown`.
    fn normalize_postal(&self, value: &str) -> String {
        match self.classifier.postal_match(value) {
            Some(found) => found.as_str().to_string(),
            None => UNKNOWN.to_string(),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            classifier: Classifier::default(),
            street_mapping: default_street_mapping(),
        }
    }
}
