//! The boundary to the external project/codebase catalog (§1, §6): out of
//! scope as a system, but the orchestrator needs *some* way to resolve a
//! codebase reference into a Git URL/branch and to persist the
//! last-indexed commit on success. [`CodebaseCatalog`] is that seam.

use async_trait::async_trait;

use crate::error::Result;

/// A resolved codebase record (§3 "Codebase"), as read from the catalog.
#[derive(Debug, Clone)]
pub struct CodebaseRecord {
    pub id: String,
    pub display_name: String,
    pub git_url: String,
    pub default_branch: String,
    pub language_hint: Option<String>,
    pub last_indexed_commit: Option<String>,
}

#[async_trait]
pub trait CodebaseCatalog: Send + Sync {
    async fn resolve(&self, codebase_ref: &str) -> Result<CodebaseRecord>;

    /// Called once a job succeeds (§4.1 "updated codebase last-indexed
    /// commit on success").
    async fn record_indexed_commit(&self, codebase_id: &str, commit_hash: &str) -> Result<()>;
}

/// An in-memory stand-in, for tests and for `codegraph-indexer submit
/// --codebase-url` invocations that bypass a real catalog entirely
/// (§10.6 "Fakes over mocks").
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: std::sync::Mutex<std::collections::HashMap<String, CodebaseRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: CodebaseRecord) {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl CodebaseCatalog for InMemoryCatalog {
    async fn resolve(&self, codebase_ref: &str) -> Result<CodebaseRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(codebase_ref)
            .cloned()
            .ok_or_else(|| {
                crate::error::IndexerError::Validation(format!(
                    "no codebase registered under '{codebase_ref}'"
                ))
            })
    }

    async fn record_indexed_commit(&self, codebase_id: &str, commit_hash: &str) -> Result<()> {
        if let Some(record) = self
            .records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get_mut(codebase_id)
        {
            record.last_indexed_commit = Some(commit_hash.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_a_registered_codebase() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(CodebaseRecord {
            id: "cb1".into(),
            display_name: "demo".into(),
            git_url: "https://example.invalid/demo.git".into(),
            default_branch: "main".into(),
            language_hint: None,
            last_indexed_commit: None,
        });

        let record = catalog.resolve("cb1").await.unwrap();
        assert_eq!(record.git_url, "https://example.invalid/demo.git");
    }

    #[tokio::test]
    async fn unregistered_codebase_is_an_error() {
        let catalog = InMemoryCatalog::new();
        assert!(catalog.resolve("missing").await.is_err());
    }

    #[tokio::test]
    async fn records_last_indexed_commit() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(CodebaseRecord {
            id: "cb1".into(),
            display_name: "demo".into(),
            git_url: "https://example.invalid/demo.git".into(),
            default_branch: "main".into(),
            language_hint: None,
            last_indexed_commit: None,
        });

        catalog.record_indexed_commit("cb1", "abc123").await.unwrap();
        let record = catalog.resolve("cb1").await.unwrap();
        assert_eq!(record.last_indexed_commit.as_deref(), Some("abc123"));
    }
}
