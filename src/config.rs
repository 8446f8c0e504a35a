use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::data::osm::ElementKind;
use crate::errors::{Error, Result};
use crate::etl::classify::{
    Classifier, DEFAULT_EXPECTED_STREET_TYPES, DEFAULT_POSTAL_PATTERN, DEFAULT_STREET_PATTERN,
};
use crate::etl::normalize::{default_street_mapping, Normalizer};
use crate::etl::schema::ElementSchema;
use crate::etl::shape::{Shaper, DEFAULT_TAG_TYPE};

/// What happens to an element whose rows do not match the schema.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Abort the run on the first invalid element.
    #[default]
    Strict,
    /// Drop the invalid element and keep going.
    Lenient,
    /// Do not validate at all.
    Off,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UserConfig {
    pub data_path: PathBuf,
    #[serde(default = "default_dest_path")]
    pub dest_path: PathBuf,
    #[serde(default = "default_elements")]
    pub elements: Vec<ElementKind>,
    /// Unset means strict, or off when `validate` is false.
    #[serde(default)]
    pub validation: Option<ValidationMode>,
    /// Shorthand switch: `false` skips validation, `true` enforces it strictly.
    #[serde(default)]
    pub validate: Option<bool>,
    #[serde(default = "default_street_pattern")]
    pub street_pattern: String,
    #[serde(default = "default_postal_pattern")]
    pub postal_pattern: String,
    #[serde(default = "default_expected_street_types")]
    pub expected_street_types: Vec<String>,
    #[serde(default = "default_street_mapping")]
    pub street_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub skip_problem_keys: bool,
    #[serde(default = "default_tag_type")]
    pub default_tag_type: String,
    #[serde(default)]
    pub schema: Option<ElementSchema>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_dest_path() -> PathBuf {
    PathBuf::from("output")
}

fn default_elements() -> Vec<ElementKind> {
    vec![ElementKind::Node, ElementKind::Way]
}

fn default_street_pattern() -> String {
    DEFAULT_STREET_PATTERN.to_string()
}

fn default_postal_pattern() -> String {
    DEFAULT_POSTAL_PATTERN.to_string()
}

fn default_expected_street_types() -> Vec<String> {
    DEFAULT_EXPECTED_STREET_TYPES.iter().map(|s| s.to_string()).collect()
}

fn default_tag_type() -> String {
    DEFAULT_TAG_TYPE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let file = File::open(path)?;
    let config: UserConfig = serde_json::from_reader(file)?;
    if config.elements.is_empty() {
        return Err(Error::Config("no element kinds to traverse".into()));
    }
    match (config.validate, config.validation) {
        (Some(false), Some(ValidationMode::Strict | ValidationMode::Lenient))
        | (Some(true), Some(ValidationMode::Off)) => {
            return Err(Error::Config(
                "'validate' contradicts the chosen 'validation' mode".into(),
            ))
        }
        _ => (),
    }
    Ok(config)
}

impl UserConfig {
    pub fn validation_mode(&self) -> ValidationMode {
        match (self.validation, self.validate) {
            (Some(mode), _) => mode,
            (None, Some(false)) => ValidationMode::Off,
            (None, _) => ValidationMode::Strict,
        }
    }

    pub fn classifier(&self) -> Result<Classifier> {
        Classifier::new(
            &self.street_pattern,
            &self.postal_pattern,
            self.expected_street_types.iter().cloned(),
        )
    }

    pub fn normalizer(&self) -> Result<Normalizer> {
        Normalizer::new(self.classifier()?, self.street_mapping.clone())
    }

    pub fn shaper(&self) -> Result<Shaper> {
        Ok(Shaper::new(self.normalizer()?)
            .with_default_tag_type(self.default_tag_type.clone())
            .skip_problem_keys(self.skip_problem_keys))
    }

    pub fn schema(&self) -> ElementSchema {
        self.schema.clone().unwrap_or_default()
    }
}
