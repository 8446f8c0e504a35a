use std::io::BufRead;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{UserConfig, ValidationMode};
use crate::data::osm::ElementKind;
use crate::data::tabular::RowGroup;
use crate::errors::{Error, Result};
use crate::etl::schema::ElementSchema;
use crate::etl::shape::Shaper;
use crate::etl::sink::{CsvSink, RowSink};
use crate::etl::stream::ElementStream;
use crate::etl::{open_source, Etl};

pub const ETL_NAME: &str = "shape_osm";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShapeStats {
    pub elements_seen: u64,
    pub elements_written: u64,
    pub elements_rejected: u64,
    pub elements_unshaped: u64,
    pub rows_written: u64,
}

/// Drives one document through shaping, validation and into `sink`.
///
/// Each element is fully handled before the next is pulled from the stream. In strict mode the
/// first invalid element aborts the run; in lenient mode it is dropped whole.
pub fn shape_document<R: BufRead, S: RowSink>(
    stream: &mut ElementStream<R>,
    shaper: &Shaper,
    schema: &ElementSchema,
    mode: ValidationMode,
    sink: &mut S,
) -> Result<ShapeStats> {
    let mut stats = ShapeStats::default();

    while let Some(element) = stream.next_element()? {
        stats.elements_seen += 1;
        let Some(shaped) = shaper.shape(&element) else {
            stats.elements_unshaped += 1;
            continue;
        };
        drop(element);

        if mode != ValidationMode::Off {
            if let Err(failure) = schema.validate(&shaped) {
                if mode == ValidationMode::Strict {
                    return Err(Error::Validation(failure));
                }
                warn!(
                    kind = shaped.kind().as_str(),
                    element_id = shaped.id().unwrap_or(""),
                    group = failure.group().map(|group| group.as_str()).unwrap_or(""),
                    violations = failure.to_string().as_str();
                    "Dropping element that failed validation"
                );
                stats.elements_rejected += 1;
                continue;
            }
        }

        sink.write(&shaped)?;
        stats.elements_written += 1;
        stats.rows_written += shaped.row_count() as u64;
    }

    Ok(stats)
}

pub struct ShapeOsmEtl<'a> {
    config: &'a UserConfig,
}

pub struct Input {
    stream: ElementStream<Box<dyn BufRead>>,
    sink: CsvSink,
}

pub struct Output {
    sink: CsvSink,
    stats: ShapeStats,
}

impl ShapeOsmEtl<'_> {
    pub fn new(config: &UserConfig) -> ShapeOsmEtl {
        ShapeOsmEtl { config }
    }
}

impl Etl for ShapeOsmEtl<'_> {
    type Input = Input;
    type Output = Output;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_paths(&self, dir: &Path) -> Vec<PathBuf> {
        RowGroup::ALL
            .iter()
            .map(|group| CsvSink::final_path(dir, *group))
            .collect()
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input> {
        let source = open_source(&self.config.data_path)?;
        Ok(Input {
            stream: ElementStream::new(source, &self.config.elements),
            sink: CsvSink::create(dir)?,
        })
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let Input { mut stream, mut sink } = input;
        let shaper = self.config.shaper()?;
        let schema = self.config.schema();

        let stats = shape_document(&mut stream, &shaper, &schema, self.config.validation_mode(), &mut sink)?;
        Ok(Output { sink, stats })
    }

    fn load(&mut self, _dir: &Path, output: Self::Output) -> Result<()> {
        let paths = output.sink.commit()?;
        let stats = output.stats;
        info!(
            etl_name = ETL_NAME,
            elements_seen = stats.elements_seen,
            elements_written = stats.elements_written,
            elements_rejected = stats.elements_rejected,
            elements_unshaped = stats.elements_unshaped,
            rows_written = stats.rows_written,
            files = paths.len();
            "Wrote tabular output"
        );
        if self.config.elements.contains(&ElementKind::Relation) && stats.elements_unshaped > 0 {
            info!(relations = stats.elements_unshaped; "Relations were traversed but have no tabular shape");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tabular::ShapedElement;
    use crate::etl::normalize::Normalizer;
    use crate::etl::sink::MemorySink;
    use std::fs;
    use tempfile::TempDir;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm>
  <node id="1" lat="36.1" lon="-115.1" user="a" uid="7" version="2" changeset="9" timestamp="2010-07-22T16:16:51Z">
    <tag k="addr:street" v="West Lexington St."/>
    <tag k="addr:postcode" v="89123-4567"/>
  </node>
  <node id="2" lat="north" lon="-115.2" user="b" uid="8" version="1" changeset="9" timestamp="2010-07-22T16:16:51Z">
    <tag k="name" v="bad coordinates"/>
  </node>
  <way id="10" user="a" uid="7" version="1" changeset="9" timestamp="2013-03-13T15:58:04Z">
    <nd ref="1"/>
    <tag k="addr:street" v="Baldwin Rd."/>
    <nd ref="2"/>
    <tag k="building:levels" v="1"/>
  </way>
  <relation id="20" user="a" uid="7" version="1" changeset="9" timestamp="2013-03-13T15:58:04Z">
    <tag k="type" v="multipolygon"/>
  </relation>
</osm>"#;

    fn run(mode: ValidationMode, kinds: &[ElementKind]) -> (Result<ShapeStats>, MemorySink) {
        let mut stream = ElementStream::new(DOC.as_bytes(), kinds);
        let shaper = Shaper::new(Normalizer::default());
        let mut sink = MemorySink::default();
        let result = shape_document(&mut stream, &shaper, &ElementSchema::default(), mode, &mut sink);
        (result, sink)
    }

    #[test]
    fn lenient_mode_drops_invalid_elements_whole() {
        let (result, sink) = run(ValidationMode::Lenient, &[ElementKind::Node, ElementKind::Way]);
        let stats = result.unwrap();
        assert_eq!(stats.elements_seen, 3);
        assert_eq!(stats.elements_written, 2);
        assert_eq!(stats.elements_rejected, 1);
        assert_eq!(stats.rows_written, 3 + 5);

        assert_eq!(sink.row_count(RowGroup::Node), 1);
        assert_eq!(sink.row_count(RowGroup::NodeTags), 2);
        assert!(sink.elements.iter().all(|shaped| shaped.id() != Some("2")));

        let ShapedElement::Way { nodes, tags, .. } = &sink.elements[1] else {
            panic!("expected the way second");
        };
        assert_eq!(nodes.iter().map(|n| n.position).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(tags[0].value, "Baldwin Road");
    }

    #[test]
    fn strict_mode_aborts_with_element_and_field() {
        let (result, sink) = run(ValidationMode::Strict, &[ElementKind::Node, ElementKind::Way]);
        let Err(Error::Validation(failure)) = result else {
            panic!("expected a validation failure");
        };
        assert_eq!(failure.element_id.as_deref(), Some("2"));
        assert_eq!(failure.group(), Some(RowGroup::Node));
        assert_eq!(failure.violations[0].field, "lat");
        // element 1 went through before the failure; element 2 contributed nothing
        assert_eq!(sink.elements.len(), 1);
        assert_eq!(sink.row_count(RowGroup::NodeTags), 2);
    }

    #[test]
    fn validation_can_be_skipped() {
        let (result, sink) = run(ValidationMode::Off, &[ElementKind::Node, ElementKind::Way]);
        assert_eq!(result.unwrap().elements_written, 3);
        assert_eq!(sink.row_count(RowGroup::Node), 2);
    }

    #[test]
    fn relations_are_traversed_but_not_shaped() {
        let (result, sink) = run(ValidationMode::Off, &[ElementKind::Relation]);
        let stats = result.unwrap();
        assert_eq!(stats.elements_seen, 1);
        assert_eq!(stats.elements_unshaped, 1);
        assert!(sink.elements.is_empty());
    }

    fn config_for(temp_dir: &TempDir, doc: &str, validation: ValidationMode) -> UserConfig {
        let data_path = temp_dir.path().join("map.osm");
        fs::write(&data_path, doc).unwrap();
        let json = format!(
            r#"{{"data_path": {:?}, "dest_path": {:?}}}"#,
            data_path.display().to_string(),
            temp_dir.path().join("out").display().to_string()
        );
        let mut config: UserConfig = serde_json::from_str(&json).unwrap();
        config.validation = Some(validation);
        config
    }

    #[test]
    fn etl_writes_all_five_files() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir, DOC, ValidationMode::Lenient);
        let mut etl = ShapeOsmEtl::new(&config);
        etl.process(&config.dest_path).unwrap();

        for path in etl.output_paths(&config.dest_path) {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(etl.is_cached(&config.dest_path).unwrap());
        let way_tags = fs::read_to_string(config.dest_path.join("ways_tags.csv")).unwrap();
        assert_eq!(
            way_tags,
            "id,key,value,type\n10,street,Baldwin Road,addr\n10,levels,1,building\n"
        );

        etl.clean(&config.dest_path).unwrap();
        assert!(!etl.is_cached(&config.dest_path).unwrap());
    }

    #[test]
    fn failed_run_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir, DOC, ValidationMode::Strict);
        let mut etl = ShapeOsmEtl::new(&config);
        assert!(matches!(etl.process(&config.dest_path), Err(Error::Validation(_))));
        assert_eq!(fs::read_dir(&config.dest_path).unwrap().count(), 0);

        let broken = config_for(&temp_dir, "<osm><node id=\"1\" lat=\"0\" lon=\"0\">", ValidationMode::Off);
        let err = ShapeOsmEtl::new(&broken).process(&broken.dest_path).unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(fs::read_dir(&broken.dest_path).unwrap().count(), 0);
    }
}
