//! Async JSON file utilities.
//!
//! Every persisted Canopy document (flat-file vector collections, metadata
//! sidecars, recovery logs) is a pretty-printed JSON file. Writes go through
//! a temporary sibling file and a rename so a crash mid-write never leaves a
//! truncated document behind.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use crate::{Error, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Read and deserialize a JSON file.
///
/// Returns `Ok(None)` when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_with_path(e, path)),
    };

    let value = serde_json::from_slice(&bytes).map_err(|e| {
        Error::serialization(format!("Failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(value))
}

/// Serialize a value and write it atomically.
///
/// Parent directories are created as needed.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(e, parent))?;
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);

    fs::write(&tmp, json)
        .await
        .map_err(|e| Error::io_with_path(e, &tmp))?;

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(Error::io_with_path(e, path));
    }

    Ok(())
}

/// List the names of the immediate subdirectories of `dir`, sorted.
///
/// A missing directory yields an empty list.
pub async fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io_with_path(e, dir)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_with_path(e, dir))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if is_dir {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}

/// Remove a file, treating "not found" as success.
pub async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io_with_path(e, path)),
    }
}

/// Remove a directory tree, treating "not found" as success.
pub async fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io_with_path(e, path)),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{file_name}.{}.{n}.tmp", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let doc = Doc {
            name: "alpha".into(),
            count: 3,
        };

        write_json_atomic(&path, &doc).await.unwrap();
        let loaded: Option<Doc> = read_json(&path).await.unwrap();
        assert_eq!(loaded, Some(doc));
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let loaded: Option<Doc> = read_json(&dir.path().join("missing.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_read_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let result: Result<Option<Doc>> = read_json(&path).await;
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[tokio::test]
    async fn test_no_tmp_files_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        for i in 0..3 {
            let doc = Doc {
                name: "x".into(),
                count: i,
            };
            write_json_atomic(&path, &doc).await.unwrap();
        }
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc.json".to_string()]);
    }

    #[tokio::test]
    async fn test_list_subdirs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("beta")).unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        std::fs::write(dir.path().join("file.json"), "{}").unwrap();

        let names = list_subdirs(dir.path()).await.unwrap();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);

        let missing = list_subdirs(&dir.path().join("nope")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_remove_helpers() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.json");
        std::fs::write(&file, "{}").unwrap();
        assert!(remove_file_if_exists(&file).await.unwrap());
        assert!(!remove_file_if_exists(&file).await.unwrap());

        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        assert!(remove_dir_if_exists(&sub).await.unwrap());
        assert!(!remove_dir_if_exists(&sub).await.unwrap());
    }
}
