//! Filesystem checkpoint store: one JSON file per key.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::{CheckpointError, CheckpointStore};

/// Stores each checkpoint as `<root>/<key>.json`.
///
/// Writes go through a temporary file and a rename, so a crash mid-write
/// never leaves a truncated checkpoint behind.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at the given directory.
    ///
    /// The directory is created lazily on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn storage_err(key: &str, source: std::io::Error) -> CheckpointError {
        CheckpointError::Storage {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, key: &str, payload: &Value) -> Result<(), CheckpointError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::storage_err(key, e))?;
        }

        let bytes = serde_json::to_vec_pretty(payload).map_err(|source| {
            CheckpointError::Payload {
                key: key.to_string(),
                source,
            }
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Self::storage_err(key, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::storage_err(key, e))?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Value, CheckpointError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(key.to_string()));
            }
            Err(e) => return Err(Self::storage_err(key, e)),
        };

        serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Payload {
            key: key.to_string(),
            source,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CheckpointError> {
        let dir = self.root.join(prefix);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::storage_err(prefix, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::storage_err(prefix, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(format!("{prefix}/{stem}"));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        let payload = json!({"cash": "120", "positions_value": "55"});
        store.save("cumulative_performance", &payload).await.unwrap();

        let loaded = store.load("cumulative_performance").await.unwrap();
        assert_eq!(loaded, payload);
    }

    #[tokio::test]
    async fn overwrite_replaces_the_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save("cumulative_performance", &json!({"v": 1})).await.unwrap();
        store.save("cumulative_performance", &json!({"v": 2})).await.unwrap();

        let loaded = store.load("cumulative_performance").await.unwrap();
        assert_eq!(loaded, json!({"v": 2}));
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        let err = store.load("cumulative_performance").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_returns_day_keys_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save("daily_perf/2026-03-03", &json!([])).await.unwrap();
        store.save("daily_perf/2026-03-01", &json!([])).await.unwrap();
        store.save("daily_perf/2026-03-02", &json!([])).await.unwrap();

        let keys = store.list("daily_perf").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "daily_perf/2026-03-01",
                "daily_perf/2026-03-02",
                "daily_perf/2026-03-03",
            ]
        );
    }

    #[tokio::test]
    async fn list_of_unwritten_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.list("daily_perf").await.unwrap().is_empty());
    }
}
