pub mod audit;
pub mod classify;
pub mod clean_osm;
pub mod normalize;
pub mod schema;
pub mod shape;
pub mod shape_osm;
pub mod sink;
pub mod stream;

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{error, info};
use xz::bufread::XzDecoder;

use crate::errors::Result;

/// Opens an .osm document, decompressing `.xz` files on the fly.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = fs::File::open(path)?;
    let file_reader = BufReader::new(file);
    if path.extension().is_some_and(|ext| ext == "xz") {
        let xz_reader = XzDecoder::new(file_reader);
        Ok(Box::new(BufReader::new(xz_reader)))
    } else {
        Ok(Box::new(file_reader))
    }
}

pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    /// Files this stage produces inside `dir`.
    fn output_paths(&self, dir: &Path) -> Vec<PathBuf>;

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        for path in self.output_paths(dir) {
            if !path.try_exists()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        for path in self.output_paths(dir) {
            if path.try_exists()? {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        if self.is_cached(dir)? {
            info!(etl_name = self.etl_name(); "Using cached value");
        } else {
            info!(etl_name = self.etl_name(); "Extracting");
            let input = match self.extract(dir) {
                Ok(input) => Ok(input),
                Err(err) => {
                    error!(
                        etl_name = self.etl_name(),
                        err = err.to_string().as_str(),
                        parse_error = err.is_parse_error();
                        "Extraction failed with error"
                    );
                    Err(err)
                },
            }?;

            info!(etl_name = self.etl_name(); "Transforming");
            let output = match self.transform(input) {
                Ok(output) => Ok(output),
                Err(err) => {
                    error!(
                        etl_name = self.etl_name(),
                        err = err.to_string().as_str(),
                        parse_error = err.is_parse_error();
                        "Transformation failed with error"
                    );
                    Err(err)
                },
            }?;

            info!(etl_name = self.etl_name(); "Loading");
            match self.load(dir, output) {
                Ok(_) => Ok(()),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.to_string().as_str(); "Loading failed with error");
                    Err(err)
                },
            }?;
        }
        info!(etl_name = self.etl_name(); "Process finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;
    use xz::write::XzEncoder;

    #[test]
    fn reads_plain_and_xz_sources() {
        let temp_dir = TempDir::new().unwrap();
        let doc = "<osm><node id=\"1\" lat=\"0\" lon=\"0\"/></osm>";

        let plain = temp_dir.path().join("map.osm");
        fs::write(&plain, doc).unwrap();

        let packed = temp_dir.path().join("map.osm.xz");
        let mut encoder = XzEncoder::new(fs::File::create(&packed).unwrap(), 6);
        encoder.write_all(doc.as_bytes()).unwrap();
        encoder.finish().unwrap();

        for path in [plain, packed] {
            let mut text = String::new();
            open_source(&path).unwrap().read_to_string(&mut text).unwrap();
            assert_eq!(text, doc);
        }
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let result = open_source(Path::new("/nonexistent/map.osm"));
        assert!(matches!(result, Err(crate::errors::Error::Io(_))));
    }
}
