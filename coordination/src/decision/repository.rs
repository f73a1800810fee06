//! Optional persistence hook for decision results
//!
//! The engine works without a repository; when one is configured every
//! result is handed to it after processing. Neither implementation here
//! offers transactional or crash-safe guarantees.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::{DecisionResult, DecisionType};

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid decision id: {0}")]
    InvalidId(String),
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Storage for decision results
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    /// Store a result. Returns whether it was written.
    async fn save_decision(&self, result: &DecisionResult) -> RepositoryResult<bool>;

    /// Load a result by request id
    async fn load_decision(&self, request_id: &str) -> RepositoryResult<Option<DecisionResult>>;

    /// All stored results of one decision type
    async fn get_decisions_by_type(
        &self,
        decision_type: DecisionType,
    ) -> RepositoryResult<Vec<DecisionResult>>;
}

/// Process-local repository
#[derive(Debug, Default)]
pub struct InMemoryDecisionRepository {
    decisions: RwLock<HashMap<String, DecisionResult>>,
}

impl InMemoryDecisionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored decisions
    pub async fn len(&self) -> usize {
        self.decisions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.decisions.read().await.is_empty()
    }
}

#[async_trait]
impl DecisionRepository for InMemoryDecisionRepository {
    async fn save_decision(&self, result: &DecisionResult) -> RepositoryResult<bool> {
        self.decisions
            .write()
            .await
            .insert(result.request_id.clone(), result.clone());
        Ok(true)
    }

    async fn load_decision(&self, request_id: &str) -> RepositoryResult<Option<DecisionResult>> {
        Ok(self.decisions.read().await.get(request_id).cloned())
    }

    async fn get_decisions_by_type(
        &self,
        decision_type: DecisionType,
    ) -> RepositoryResult<Vec<DecisionResult>> {
        let mut results: Vec<DecisionResult> = self
            .decisions
            .read()
            .await
            .values()
            .filter(|r| r.decision_type == decision_type)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(results)
    }
}

/// One pretty-printed JSON file per decision under a directory
#[derive(Debug, Clone)]
pub struct JsonFileDecisionRepository {
    dir: PathBuf,
}

impl JsonFileDecisionRepository {
    /// Open (and create if missing) a repository directory
    pub fn open(dir: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Repository directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, request_id: &str) -> RepositoryResult<PathBuf> {
        if request_id.is_empty()
            || request_id.contains(['/', '\\'])
            || request_id.starts_with('.')
        {
            return Err(RepositoryError::InvalidId(request_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", request_id)))
    }
}

#[async_trait]
impl DecisionRepository for JsonFileDecisionRepository {
    async fn save_decision(&self, result: &DecisionResult) -> RepositoryResult<bool> {
        let path = self.file_for(&result.request_id)?;
        let json = serde_json::to_string_pretty(result)?;
        tokio::fs::write(&path, json).await?;
        debug!(request_id = %result.request_id, path = %path.display(), "Decision saved");
        Ok(true)
    }

    async fn load_decision(&self, request_id: &str) -> RepositoryResult<Option<DecisionResult>> {
        let path = self.file_for(request_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_decisions_by_type(
        &self,
        decision_type: DecisionType,
    ) -> RepositoryResult<Vec<DecisionResult>> {
        let mut results = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<DecisionResult>(&content) {
                Ok(result) if result.decision_type == decision_type => results.push(result),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), "Skipping unreadable decision: {}", e),
            }
        }

        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn result(id: &str, decision_type: DecisionType) -> DecisionResult {
        DecisionResult::completed(id, decision_type, json!({"ok": true}), 0.9, "test")
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let repo = InMemoryDecisionRepository::new();
        assert!(repo.save_decision(&result("a", DecisionType::Scheduling)).await.unwrap());
        repo.save_decision(&result("b", DecisionType::TaskAssignment))
            .await
            .unwrap();

        assert_eq!(repo.len().await, 2);
        assert!(repo.load_decision("a").await.unwrap().is_some());
        assert!(repo.load_decision("zzz").await.unwrap().is_none());
        let scheduling = repo
            .get_decisions_by_type(DecisionType::Scheduling)
            .await
            .unwrap();
        assert_eq!(scheduling.len(), 1);
        assert_eq!(scheduling[0].request_id, "a");
    }

    #[tokio::test]
    async fn test_json_file_repository() {
        let dir = tempdir().unwrap();
        let repo = JsonFileDecisionRepository::open(dir.path().join("decisions")).unwrap();

        repo.save_decision(&result("req-1", DecisionType::ResourceAllocation))
            .await
            .unwrap();
        repo.save_decision(&result("req-2", DecisionType::TaskAssignment))
            .await
            .unwrap();

        let loaded = repo.load_decision("req-1").await.unwrap().unwrap();
        assert_eq!(loaded.decision_type, DecisionType::ResourceAllocation);
        assert!(repo.load_decision("missing").await.unwrap().is_none());

        let by_type = repo
            .get_decisions_by_type(DecisionType::TaskAssignment)
            .await
            .unwrap();
        assert_eq!(by_type.len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_rejects_path_ids() {
        let dir = tempdir().unwrap();
        let repo = JsonFileDecisionRepository::open(dir.path()).unwrap();
        let bad = result("../escape", DecisionType::Scheduling);
        assert!(matches!(
            repo.save_decision(&bad).await,
            Err(RepositoryError::InvalidId(_))
        ));
    }
}
