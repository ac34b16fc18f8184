//! External data sources feeding the snapshots. Implementations live outside
//! the engine; the engine only relies on these contracts.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::{config::RecordCollection, document::Document};

/// Read access to structured records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch one page of documents from `collection`, ordered stably.
    ///
    /// Implementations must skip documents flagged `deleted: true` when
    /// `collection.soft_delete` is set and must omit `collection.excluded_fields`.
    /// A page shorter than `limit` marks the end of the collection.
    async fn fetch_page(
        &self,
        collection: &RecordCollection,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<Document>>;
}

/// Metadata for one hosted repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub pushed_at: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
}

/// Repository listing plus best-effort readme access.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn list_repositories(&self) -> anyhow::Result<Vec<RepositoryInfo>>;

    /// Raw readme text, or `None` when the repository has no readme.
    async fn fetch_readme(&self, full_name: &str) -> anyhow::Result<Option<String>>;
}

/// Plain text of the resume document.
#[async_trait]
pub trait ResumeSource: Send + Sync {
    async fn resume_text(&self) -> anyhow::Result<String>;
}
