//! Scenario document storage.
//!
//! The system reads raw documents through the [`ScenarioStore`] trait so
//! the storage backend stays swappable; the shipped backend is a plain
//! directory of JSON files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scenario directory {0:?} does not exist")]
    MissingDirectory(PathBuf),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One stored document as raw text. Parsing happens in the loader so a
/// malformed document can be reported against its name.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub text: String,
}

#[async_trait]
pub trait ScenarioStore: Send + Sync {
    async fn load(&self) -> StoreResult<Vec<Document>>;
}

/// Reads every `.json` file in one directory, in file-name order so load
/// order (and thus intent priority) is deterministic.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ScenarioStore for DirectoryStore {
    async fn load(&self) -> StoreResult<Vec<Document>> {
        if !self.dir.is_dir() {
            return Err(StoreError::MissingDirectory(self.dir.clone()));
        }
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let text = tokio::fs::read_to_string(&path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!("read scenario document {:?} ({} bytes)", name, text.len());
            documents.push(Document { name, text });
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_json_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = DirectoryStore::new(dir.path());
        let documents = store.load().await.unwrap();
        let names: Vec<_> = documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let store = DirectoryStore::new("/definitely/not/here");
        assert!(matches!(
            store.load().await,
            Err(StoreError::MissingDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_directory_yields_no_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(store.load().await.unwrap().is_empty());
    }
}
