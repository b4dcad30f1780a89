use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serializing artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!("{} is not a directory", dir.display())));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Writes whole files into one directory via temp file + rename, so readers
/// never observe a partially written artifact.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }

    /// Serializes `value` as indented JSON.
    pub fn write_json<T: Serialize + ?Sized>(&self, filename: &str, value: &T) -> Result<PathBuf, PersistError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write(filename, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_artifact_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AtomicFileWriter::new(dir.path().join("out"));
        writer.write("a.json", b"[1]").unwrap();
        let path = writer.write_json("a.json", &vec![2, 3]).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(serde_json::from_str::<Vec<u32>>(&text).unwrap(), vec![2, 3]);
    }

    #[test]
    fn file_in_place_of_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        assert!(matches!(ensure_output_dir(&blocker), Err(PersistError::OutputDir(_))));
    }
}
