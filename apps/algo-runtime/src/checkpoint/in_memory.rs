//! Map-backed checkpoint store for tests.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::{CheckpointError, CheckpointStore};

/// In-memory store; survives a simulated restart as long as the instance
/// itself is shared between the "old" and "new" process state.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store holds no checkpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, key: &str, payload: &Value) -> Result<(), CheckpointError> {
        let mut entries = self.entries.write().map_err(|_| CheckpointError::Storage {
            key: key.to_string(),
            source: std::io::Error::other("checkpoint map poisoned"),
        })?;
        entries.insert(key.to_string(), payload.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Value, CheckpointError> {
        let entries = self.entries.read().map_err(|_| CheckpointError::Storage {
            key: key.to_string(),
            source: std::io::Error::other("checkpoint map poisoned"),
        })?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CheckpointError> {
        let entries = self.entries.read().map_err(|_| CheckpointError::Storage {
            key: prefix.to_string(),
            source: std::io::Error::other("checkpoint map poisoned"),
        })?;
        let full_prefix = format!("{prefix}/");
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(&full_prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn save_load_list_behave_like_the_file_store() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.is_empty());

        store.save("cumulative_performance", &json!({"v": 1})).await.unwrap();
        store.save("daily_perf/2026-03-02", &json!([])).await.unwrap();
        store.save("daily_perf/2026-03-01", &json!([])).await.unwrap();

        assert_eq!(store.load("cumulative_performance").await.unwrap(), json!({"v": 1}));
        assert!(store.load("missing").await.unwrap_err().is_not_found());
        assert_eq!(
            store.list("daily_perf").await.unwrap(),
            vec!["daily_perf/2026-03-01", "daily_perf/2026-03-02"]
        );
        assert_eq!(store.len(), 3);
    }
}
