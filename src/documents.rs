//! Document-fetch capability supplied by the caller.
//!
//! The surrounding service owns document storage; the core only needs a way to
//! resolve a document id into its extracted text. An in-memory implementation
//! is provided for tests and embedding scenarios.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while resolving a document id.
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    /// The id does not exist in the backing store.
    #[error("document '{0}' not found")]
    NotFound(String),
    /// The backing store could not be reached.
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// Interface implemented by document storage backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Resolve a document id into its extracted text.
    async fn fetch(&self, document_id: &str) -> Result<String, DocumentStoreError>;
}

/// Simple map-backed store for tests and in-process callers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    documents: HashMap<String, String>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document.
    pub fn insert(&mut self, document_id: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(document_id.into(), text.into());
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn fetch(&self, document_id: &str) -> Result<String, DocumentStoreError> {
        self.documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| DocumentStoreError::NotFound(document_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_stored_text() {
        let mut store = InMemoryDocumentStore::new();
        store.insert("doc-1", "inspection report");
        assert_eq!(store.fetch("doc-1").await.unwrap(), "inspection report");
    }

    #[tokio::test]
    async fn fetch_reports_missing_documents() {
        let store = InMemoryDocumentStore::new();
        let error = store.fetch("doc-9").await.unwrap_err();
        assert!(matches!(error, DocumentStoreError::NotFound(id) if id == "doc-9"));
    }
}
