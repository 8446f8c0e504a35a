use std::collections::BTreeSet;

use regex::{Match, Regex, RegexBuilder};

use crate::data::ClassificationIndex;
use crate::errors::Result;

pub const UNKNOWN: &str = "unknown";

pub const STREET_KEY: &str = "addr:street";
pub const POSTAL_KEY: &str = "addr:postcode";

pub const DEFAULT_STREET_PATTERN: &str = r"\b\S+\.?$";
pub const DEFAULT_POSTAL_PATTERN: &str = r"\d{5}-?";

pub const DEFAULT_EXPECTED_STREET_TYPES: [&str; 15] = [
    "Street", "Avenue", "Boulevard", "Drive", "Court", "Place", "Square", "Lane", "Road",
    "Trail", "Parkway", "Commons", "Circle", "Highway", "Way",
];

/// Which kind of free-text value a tag carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Street,
    Postal,
}

impl Domain {
    pub fn from_tag_key(key: &str) -> Option<Domain> {
        match key {
            STREET_KEY => Some(Domain::Street),
            POSTAL_KEY => Some(Domain::Postal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub token: String,
    pub expected: bool,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    street_pattern: Regex,
    postal_pattern: Regex,
    expected_street_types: BTreeSet<String>,
}

impl Classifier {
    pub fn new<I, S>(street_pattern: &str, postal_pattern: &str, expected_street_types: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Classifier {
            street_pattern: RegexBuilder::new(street_pattern).case_insensitive(true).build()?,
            postal_pattern: Regex::new(postal_pattern)?,
            expected_street_types: expected_street_types.into_iter().map(Into::into).collect(),
        })
    }

    pub fn is_expected_street_type(&self, token: &str) -> bool {
        self.expected_street_types.contains(token)
    }

    pub fn street_match<'v>(&self, value: &'v str) -> Option<Match<'v>> {
        self.street_pattern.find(value)
    }

    pub fn postal_match<'v>(&self, value: &'v str) -> Option<Match<'v>> {
        self.postal_pattern.find(value)
    }

    pub fn classify(&self, domain: Domain, value: &str) -> Classification {
        match domain {
            Domain::Street => match self.street_match(value) {
                Some(found) => Classification {
                    token: found.as_str().to_string(),
                    expected: self.is_expected_street_type(found.as_str()),
                },
                None => Classification {
                    token: UNKNOWN.to_string(),
                    expected: false,
                },
            },
            Domain::Postal => match self.postal_match(value) {
                Some(found) => Classification {
                    token: found.as_str().to_string(),
                    expected: true,
                },
                None => Classification {
                    token: UNKNOWN.to_string(),
                    expected: false,
                },
            },
        }
    }

    /// Classifies and files the value in `index`. Streets are filed only when unexpected.
    /// A postal token keeps the first value seen for it; unmatched postcodes all go under `unknown`.
    pub fn audit(&self, domain: Domain, value: &str, index: &mut ClassificationIndex) -> Classification {
        let classification = self.classify(domain, value);
        let record = match domain {
            Domain::Street => !classification.expected,
            Domain::Postal => classification.token == UNKNOWN || !index.contains_token(&classification.token),
        };
        if record {
            index.record(&classification.token, value);
        }
        classification
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier {
            street_pattern: RegexBuilder::new(DEFAULT_STREET_PATTERN)
                .case_insensitive(true)
                .build()
                .unwrap(),
            postal_pattern: Regex::new(DEFAULT_POSTAL_PATTERN).unwrap(),
            expected_street_types: DEFAULT_EXPECTED_STREET_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
