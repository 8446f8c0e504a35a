use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::config::UserConfig;
use crate::errors::Result;
use crate::etl::classify::Domain;
use crate::etl::normalize::Normalizer;
use crate::etl::{open_source, Etl};

pub const ETL_NAME: &str = "clean_osm";
pub const OUTPUT_FILE_NAME: &str = "cleaned.osm";
const STAGING_FILE_NAME: &str = "cleaned.osm.partial";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanStats {
    pub streets_fixed: u64,
    pub postcodes_fixed: u64,
}

/// Builds a replacement `<tag>` when its value needs normalizing, `None` when it can stay as is.
fn rewrite_tag(tag: &BytesStart, normalizer: &Normalizer, stats: &mut CleanStats) -> Result<Option<BytesStart<'static>>> {
    let mut key: Option<String> = None;
    let mut value: Option<String> = None;
    for attribute_res in tag.attributes() {
        let attribute = attribute_res?;
        match attribute.key.as_ref() {
            b"k" => key = Some(attribute.unescape_value()?.into_owned()),
            b"v" => value = Some(attribute.unescape_value()?.into_owned()),
            _ => (),
        }
    }
    let (Some(key), Some(value)) = (key, value) else {
        return Ok(None);
    };
    let Some(domain) = Domain::from_tag_key(&key) else {
        return Ok(None);
    };
    let corrected = normalizer.normalize(domain, &value);
    if corrected == value {
        return Ok(None);
    }
    match domain {
        Domain::Street => stats.streets_fixed += 1,
        Domain::Postal => stats.postcodes_fixed += 1,
    }

    let mut rewritten = BytesStart::new("tag");
    for attribute_res in tag.attributes() {
        let attribute = attribute_res?;
        if attribute.key.as_ref() == b"v" {
            rewritten.push_attribute(("v", &*corrected));
        } else {
            rewritten.push_attribute(attribute);
        }
    }
    Ok(Some(rewritten))
}

/// Copies the document event by event, normalizing street and postcode tag values on the way.
pub fn clean_document<R: BufRead, W: Write>(source: R, output: W, normalizer: &Normalizer) -> Result<CleanStats> {
    let mut reader = Reader::from_reader(source);
    let mut writer = Writer::new(output);
    let mut buf = Vec::new();
    let mut stats = CleanStats::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) if e.name().as_ref() == b"tag" => match rewrite_tag(&e, normalizer, &mut stats)? {
                Some(rewritten) => writer.write_event(Event::Empty(rewritten))?,
                None => writer.write_event(Event::Empty(e))?,
            },
            Event::Start(e) if e.name().as_ref() == b"tag" => match rewrite_tag(&e, normalizer, &mut stats)? {
                Some(rewritten) => writer.write_event(Event::Start(rewritten))?,
                None => writer.write_event(Event::Start(e))?,
            },
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    writer.into_inner().flush()?;
    Ok(stats)
}

pub struct CleanOsmEtl<'a> {
    config: &'a UserConfig,
}

pub struct Output {
    staged: PathBuf,
    stats: CleanStats,
}

impl CleanOsmEtl<'_> {
    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }

    pub fn new(config: &UserConfig) -> CleanOsmEtl {
        CleanOsmEtl { config }
    }
}

impl Etl for CleanOsmEtl<'_> {
    type Input = (Box<dyn BufRead>, PathBuf);
    type Output = Output;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_paths(&self, dir: &Path) -> Vec<PathBuf> {
        vec![Self::output_path(dir)]
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        fs::create_dir_all(dir)?;
        Ok((open_source(&self.config.data_path)?, dir.join(STAGING_FILE_NAME)))
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let (source, staged) = input;
        let normalizer = self.config.normalizer()?;
        let result = File::create(&staged)
            .map_err(Into::into)
            .and_then(|file| clean_document(source, BufWriter::new(file), &normalizer));
        match result {
            Ok(stats) => Ok(Output { staged, stats }),
            Err(err) => {
                if staged.exists() {
                    if let Err(remove_err) = fs::remove_file(&staged) {
                        warn!(
                            path = staged.display().to_string().as_str(),
                            err = remove_err.to_string().as_str();
                            "Could not remove staged output"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        fs::rename(&output.staged, Self::output_path(dir))?;
        info!(
            etl_name = ETL_NAME,
            streets_fixed = output.stats.streets_fixed,
            postcodes_fixed = output.stats.postcodes_fixed;
            "Wrote cleaned document"
        );
        Ok(())
    }
}
