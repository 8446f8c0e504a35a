use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::config::UserConfig;
use crate::data::ClassificationIndex;
use crate::errors::Result;
use crate::etl::classify::Domain;
use crate::etl::normalize::Normalizer;
use crate::etl::stream::ElementStream;
use crate::etl::{open_source, Etl};

pub const ETL_NAME: &str = "audit";
pub const OUTPUT_FILE_NAME: &str = "audit.json";

/// Unexpected street types and all postal code groups seen in one pass over the document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditIndex {
    pub street: ClassificationIndex,
    pub postal: ClassificationIndex,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub street: BTreeMap<String, Vec<Correction>>,
    pub postal: BTreeMap<String, Vec<Correction>>,
}

impl AuditReport {
    fn corrections(index: &ClassificationIndex, domain: Domain, normalizer: &Normalizer) -> BTreeMap<String, Vec<Correction>> {
        index
            .iter()
            .map(|(token, values)| {
                let corrections = values
                    .iter()
                    .map(|value| Correction {
                        original: value.clone(),
                        corrected: normalizer.normalize(domain, value).into_owned(),
                    })
                    .collect();
                (token.clone(), corrections)
            })
            .collect()
    }

    pub fn build(index: &AuditIndex, normalizer: &Normalizer) -> Self {
        AuditReport {
            street: Self::corrections(&index.street, Domain::Street, normalizer),
            postal: Self::corrections(&index.postal, Domain::Postal, normalizer),
        }
    }
}

/// Walks every element and files its street and postal values.
pub fn audit_document<R: BufRead>(stream: &mut ElementStream<R>, normalizer: &Normalizer) -> Result<AuditIndex> {
    let classifier = normalizer.classifier();
    let mut index = AuditIndex::default();

    while let Some(element) = stream.next_element()? {
        for tag in &element.tags {
            match Domain::from_tag_key(&tag.key) {
                Some(Domain::Street) => {
                    classifier.audit(Domain::Street, &tag.value, &mut index.street);
                }
                Some(Domain::Postal) => {
                    classifier.audit(Domain::Postal, &tag.value, &mut index.postal);
                }
                None => (),
            }
        }
    }
    Ok(index)
}

pub struct AuditEtl<'a> {
    config: &'a UserConfig,
}

impl AuditEtl<'_> {
    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }

    pub fn new(config: &UserConfig) -> AuditEtl {
        AuditEtl { config }
    }
}

impl Etl for AuditEtl<'_> {
    type Input = ElementStream<Box<dyn BufRead>>;
    type Output = AuditReport;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_paths(&self, dir: &Path) -> Vec<PathBuf> {
        vec![Self::output_path(dir)]
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        let source = open_source(&self.config.data_path)?;
        Ok(ElementStream::new(source, &self.config.elements))
    }

    fn transform(&mut self, mut input: Self::Input) -> Result<Self::Output> {
        let normalizer = self.config.normalizer()?;
        let index = audit_document(&mut input, &normalizer)?;
        info!(
            etl_name = ETL_NAME,
            elements = input.elements_read(),
            street_types = index.street.len(),
            street_values = index.street.value_count(),
            postal_groups = index.postal.len();
            "Audit finished"
        );
        if index.street.is_empty() && index.postal.is_empty() {
            info!(etl_name = ETL_NAME; "No street or postal values needed attention");
        }
        Ok(AuditReport::build(&index, &normalizer))
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let mut writer = BufWriter::new(File::create(Self::output_path(dir))?);
        serde_json::to_writer_pretty(&mut writer, &output)?;
        writer.flush()?;
        Ok(())
    }
}
