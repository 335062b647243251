//! Data platform collaborators.
//!
//! The pipeline only needs four operations from the storage
//! platform that dispatches datasets to it. [`LocalPlatform`] serves
//! them from the local filesystem so that datasets can be
//! processed without a remote service.

use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use glob::{glob, Pattern};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

pub trait Platform {
    /// Materialize the files of a dataset locally.
    fn download(&self, dataset_id: &str) -> Result<Vec<PathBuf>>;

    /// Attach a local file to a dataset, returning its file id.
    fn upload(&self, dataset_id: &str, path: &Path) -> Result<String>;

    fn get_metadata(&self, dataset_id: &str) -> Result<Vec<Value>>;

    fn put_metadata(&self, dataset_id: &str, record: Value) -> Result<()>;
}

/// Datasets are directories; metadata records are kept under
/// `<root>/.metadata/<dataset>.json`.
#[derive(Debug, Clone)]
pub struct LocalPlatform {
    root: PathBuf,
}

impl LocalPlatform {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        LocalPlatform { root: root.into() }
    }

    fn metadata_path(&self, dataset_id: &str) -> PathBuf {
        let name = Path::new(dataset_id)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dataset_id.replace('/', "_"));
        self.root.join(".metadata").join(format!("{}.json", name))
    }
}

impl Platform for LocalPlatform {
    fn download(&self, dataset_id: &str) -> Result<Vec<PathBuf>> {
        let dir = Path::new(dataset_id);
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }
        let dir_str = dir
            .to_str()
            .ok_or_else(|| Error::Platform(format!("non-UTF-8 dataset path {:?}", dir)))?;
        let pattern = format!("{}/*", Pattern::escape(dir_str));
        let mut files: Vec<PathBuf> = glob(&pattern)
            .map_err(|e| Error::Platform(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    fn upload(&self, dataset_id: &str, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(Error::Platform(format!(
                "cannot upload {} to {}: not a file",
                path.display(),
                dataset_id
            )));
        }
        debug!("{} attached to {}", path.display(), dataset_id);
        Ok(path.display().to_string())
    }

    fn get_metadata(&self, dataset_id: &str) -> Result<Vec<Value>> {
        let path = self.metadata_path(dataset_id);
        if !path.exists() {
            return Ok(vec![]);
        }
        let rdr = BufReader::new(File::open(&path)?);
        serde_json::from_reader(rdr)
            .map_err(|e| Error::Platform(format!("corrupt metadata store {}: {}", path.display(), e)))
    }

    fn put_metadata(&self, dataset_id: &str, record: Value) -> Result<()> {
        let mut records = self.get_metadata(dataset_id)?;
        records.push(record);

        let path = self.metadata_path(dataset_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| Error::Platform(e.to_string()))?;
        fs::write(&path, json)?;
        Ok(())
    }
}
