use std::fs::{self, File};
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use log::warn;

use crate::data::tabular::{RowGroup, ShapedElement};
use crate::errors::Result;

const STAGING_SUFFIX: &str = "partial";

/// Destination for validated rows. An element's rows are handed over in one call.
pub trait RowSink {
    fn write(&mut self, shaped: &ShapedElement) -> Result<()>;
}

/// Rows kept in memory, grouped the way the CSV files are.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub elements: Vec<ShapedElement>,
}

#[cfg(test)]
impl MemorySink {
    pub fn row_count(&self, group: RowGroup) -> usize {
        self.elements
            .iter()
            .map(|shaped| match (group, shaped) {
                (RowGroup::Node, ShapedElement::Node { .. }) => 1,
                (RowGroup::NodeTags, ShapedElement::Node { tags, .. }) => tags.len(),
                (RowGroup::Way, ShapedElement::Way { .. }) => 1,
                (RowGroup::WayNodes, ShapedElement::Way { nodes, .. }) => nodes.len(),
                (RowGroup::WayTags, ShapedElement::Way { tags, .. }) => tags.len(),
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
impl RowSink for MemorySink {
    fn write(&mut self, shaped: &ShapedElement) -> Result<()> {
        self.elements.push(shaped.clone());
        Ok(())
    }
}

struct CsvWriters {
    nodes: Writer<File>,
    node_tags: Writer<File>,
    ways: Writer<File>,
    way_nodes: Writer<File>,
    way_tags: Writer<File>,
}

impl CsvWriters {
    fn all(&mut self) -> [&mut Writer<File>; 5] {
        [
            &mut self.nodes,
            &mut self.node_tags,
            &mut self.ways,
            &mut self.way_nodes,
            &mut self.way_tags,
        ]
    }
}

/// Writes the five CSV files into staging paths next to their final names.
/// Nothing appears under the final names until [`CsvSink::commit`]; an uncommitted
/// sink deletes its staging files when dropped.
pub struct CsvSink {
    dir: PathBuf,
    writers: Option<CsvWriters>,
    committed: bool,
}

impl CsvSink {
    pub fn final_path(dir: &Path, group: RowGroup) -> PathBuf {
        dir.join(group.file_name())
    }

    fn staging_path(dir: &Path, group: RowGroup) -> PathBuf {
        dir.join(format!("{}.{}", group.file_name(), STAGING_SUFFIX))
    }

    fn open(dir: &Path, group: RowGroup) -> Result<Writer<File>> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(Self::staging_path(dir, group))?;
        writer.write_record(group.fields())?;
        Ok(writer)
    }

    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let mut sink = CsvSink {
            dir: dir.to_path_buf(),
            writers: None,
            committed: false,
        };
        // assigned after construction so a failure halfway still cleans up through Drop
        sink.writers = Some(CsvWriters {
            nodes: Self::open(dir, RowGroup::Node)?,
            node_tags: Self::open(dir, RowGroup::NodeTags)?,
            ways: Self::open(dir, RowGroup::Way)?,
            way_nodes: Self::open(dir, RowGroup::WayNodes)?,
            way_tags: Self::open(dir, RowGroup::WayTags)?,
        });
        Ok(sink)
    }

    /// Flushes and moves every staged file to its final name.
    pub fn commit(mut self) -> Result<Vec<PathBuf>> {
        let Some(mut writers) = self.writers.take() else {
            return Err("csv sink already closed".into());
        };
        for writer in writers.all() {
            writer.flush()?;
        }
        drop(writers);

        let mut paths = Vec::with_capacity(RowGroup::ALL.len());
        for group in RowGroup::ALL {
            let final_path = Self::final_path(&self.dir, group);
            fs::rename(Self::staging_path(&self.dir, group), &final_path)?;
            paths.push(final_path);
        }
        self.committed = true;
        Ok(paths)
    }
}

impl RowSink for CsvSink {
    fn write(&mut self, shaped: &ShapedElement) -> Result<()> {
        let Some(writers) = self.writers.as_mut() else {
            return Err("csv sink already closed".into());
        };
        match shaped {
            ShapedElement::Node { node, tags } => {
                writers.nodes.serialize(node)?;
                for tag in tags {
                    writers.node_tags.serialize(tag)?;
                }
            }
            ShapedElement::Way { way, nodes, tags } => {
                writers.ways.serialize(way)?;
                for node in nodes {
                    writers.way_nodes.serialize(node)?;
                }
                for tag in tags {
                    writers.way_tags.serialize(tag)?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.writers.take());
        for group in RowGroup::ALL {
            let path = Self::staging_path(&self.dir, group);
            if path.exists() {
                if let Err(err) = fs::remove_file(&path) {
                    warn!(
                        path = path.display().to_string().as_str(),
                        err = err.to_string().as_str();
                        "Could not remove staged output"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tabular::{NodeRow, TagRow, WayNodeRow, WayRow};
    use tempfile::TempDir;

    fn sample_way() -> ShapedElement {
        ShapedElement::Way {
            way: WayRow {
                id: Some("209809850".into()),
                user: Some("chicago-buildings".into()),
                uid: Some("674454".into()),
                version: Some("1".into()),
                changeset: Some("15353317".into()),
                timestamp: Some("2013-03-13T15:58:04Z".into()),
            },
            nodes: vec![
                WayNodeRow { id: Some("209809850".into()), node_id: "2199822281".into(), position: 0 },
                WayNodeRow { id: Some("209809850".into()), node_id: "2199822390".into(), position: 1 },
            ],
            tags: vec![TagRow {
                id: Some("209809850".into()),
                key: "street".into(),
                value: "West Lexington Street".into(),
                tag_type: "addr".into(),
            }],
        }
    }

    #[test]
    fn commit_writes_headers_and_rows_in_column_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = CsvSink::create(temp_dir.path()).unwrap();
        sink.write(&sample_way()).unwrap();
        sink.write(&ShapedElement::Node {
            node: NodeRow {
                id: Some("1".into()),
                lat: Some("36.1".into()),
                lon: Some("-115.1".into()),
                ..NodeRow::default()
            },
            tags: vec![],
        })
        .unwrap();
        let paths = sink.commit().unwrap();
        assert_eq!(paths.len(), 5);

        let read = |group: RowGroup| fs::read_to_string(CsvSink::final_path(temp_dir.path(), group)).unwrap();
        assert_eq!(read(RowGroup::Node), "id,lat,lon,user,uid,version,changeset,timestamp\n1,36.1,-115.1,,,,,\n");
        assert_eq!(read(RowGroup::NodeTags), "id,key,value,type\n");
        assert_eq!(
            read(RowGroup::Way),
            "id,user,uid,version,changeset,timestamp\n209809850,chicago-buildings,674454,1,15353317,2013-03-13T15:58:04Z\n"
        );
        assert_eq!(
            read(RowGroup::WayNodes),
            "id,node_id,position\n209809850,2199822281,0\n209809850,2199822390,1\n"
        );
        assert_eq!(read(RowGroup::WayTags), "id,key,value,type\n209809850,street,West Lexington Street,addr\n");
        assert!(!temp_dir.path().join("ways.csv.partial").exists());
    }

    #[test]
    fn dropped_sink_leaves_no_files() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut sink = CsvSink::create(temp_dir.path()).unwrap();
            sink.write(&sample_way()).unwrap();
            assert!(temp_dir.path().join("ways.csv.partial").exists());
        }
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn memory_sink_counts_rows_per_group() {
        let mut sink = MemorySink::default();
        sink.write(&sample_way()).unwrap();
        assert_eq!(sink.row_count(RowGroup::Way), 1);
        assert_eq!(sink.row_count(RowGroup::WayNodes), 2);
        assert_eq!(sink.row_count(RowGroup::WayTags), 1);
        assert_eq!(sink.row_count(RowGroup::Node), 0);
    }
}
