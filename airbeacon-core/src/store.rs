//! JSON file persistence for the idempotency marker and the subscriber list.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The file did not contain the expected JSON.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a JSON document, returning `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// Returns a [`StoreError`] when the file cannot be opened or decoded.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(value))
}

/// Write a JSON document atomically (write to `.tmp`, then rename).
///
/// # Errors
///
/// Returns a [`StoreError`] when the file cannot be written or renamed.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let loaded: Option<Vec<String>> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("list.json");

        write_json_atomic(&path, &["a", "b"]).unwrap();

        let loaded: Option<Vec<String>> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(vec!["a".to_owned(), "b".to_owned()]));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn garbage_is_a_json_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"{not json").unwrap();

        let result: Result<Option<Vec<String>>, _> = read_json(&path);
        assert!(matches!(result, Err(StoreError::Json(_))));
    }
}
