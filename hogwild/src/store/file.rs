use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::PathBuf,
};

use deep_learning::ModelInfo;

use super::ModelStore;
use crate::Result;

/// A `ModelStore` keeping one JSON file per key inside a directory.
///
/// Writes go to a temporary file first and are renamed into place, so readers never observe a
/// partially written snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates the store, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl ModelStore for JsonFileStore {
    fn put(&self, key: &str, model: &ModelInfo) -> Result<()> {
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, model)?;
        writer.flush()?;
        drop(writer);

        fs::rename(tmp, self.path(key))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<ModelInfo>> {
        let file = match File::open(self.path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let model = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(model))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
