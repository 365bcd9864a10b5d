//! Consolidated JSON snapshot of harvested records.
//!
//! The snapshot is a single UTF-8 JSON array of objects, pretty-printed with
//! non-ASCII text kept as is. It lets the load stages run without network
//! access.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::harvest::RawRecord;

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors reading or writing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error on snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot is not a JSON array")]
    NotAnArray,

    #[error("Snapshot element {index} is not an object")]
    NotAnObject { index: usize },
}

impl SnapshotError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write `records` to `path`.
///
/// Data goes to a temporary file in the same directory which is then renamed
/// over `path`, so readers never observe a half-written snapshot.
pub fn write(path: &Path, records: &[RawRecord]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| SnapshotError::io(dir, e))?;

    let tmp = NamedTempFile::new_in(dir).map_err(|e| SnapshotError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush().map_err(|e| SnapshotError::io(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| SnapshotError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| SnapshotError::io(path, e.error))?;

    Ok(())
}

/// Read every record from the snapshot at `path`.
pub fn read(path: &Path) -> Result<Vec<RawRecord>> {
    if !path.exists() {
        return Err(SnapshotError::NotFound(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|e| SnapshotError::io(path, e))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))?;

    let Value::Array(items) = value else {
        return Err(SnapshotError::NotAnArray);
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(SnapshotError::NotAnObject { index }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn records() -> Vec<RawRecord> {
        let value = json!([
            {"codigo_paciente": "P1", "nome_municipio_paciente": "SÃO PAULO"},
            {"codigo_paciente": null, "numero_idade_paciente": 61}
        ]);
        match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doses.json");

        write(&path, &records()).unwrap();
        let loaded = read(&path).unwrap();

        assert_eq!(loaded, records());
    }

    #[test]
    fn test_write_keeps_non_ascii_and_indents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doses.json");

        write(&path, &records()).unwrap();
        let text = fs::read_to_string(&path).unwrap();

        assert!(text.contains("SÃO PAULO"));
        assert!(text.starts_with("[\n  {"));
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doses.json");
        fs::write(&path, "stale").unwrap();

        write(&path, &[]).unwrap();

        assert_eq!(read(&path).unwrap().len(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doses.json");

        write(&path, &records()).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = read(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(SnapshotError::NotFound(_))));
    }

    #[test]
    fn test_read_rejects_non_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doses.json");
        fs::write(&path, r#"{"doses_aplicadas_pni": []}"#).unwrap();

        assert!(matches!(read(&path), Err(SnapshotError::NotAnArray)));
    }

    #[test]
    fn test_read_rejects_non_object_element() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doses.json");
        fs::write(&path, r#"[{"a": 1}, 2]"#).unwrap();

        assert!(matches!(
            read(&path),
            Err(SnapshotError::NotAnObject { index: 1 })
        ));
    }
}
