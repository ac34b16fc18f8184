//! Snapshot manager: keeps one normalized, timestamped snapshot per category
//! fresh on a daily cadence.
//!
//! Each category refreshes independently. A failed refresh leaves the
//! previously persisted snapshot and its context-meta timestamp untouched, so
//! retrieval keeps working against stale-but-present data.

use std::sync::Arc;

use {
    chrono::{DateTime, Utc},
    serde_json::{Map, Value, json},
    tracing::{debug, info, warn},
};

use crate::{
    category::Category,
    config::{RecordsConfig, RepositoryConfig},
    document::{prune_document, prune_empty, truncate_chars, without_fields},
    error::{ContextError, Result},
    sources::{RecordSource, RepositoryInfo, RepositorySource, ResumeSource},
    store::ContextStore,
};

/// Key holding the resume text inside the resume snapshot payload.
pub const RESUME_TEXT_KEY: &str = "resume_text";

/// Normalized copy of one knowledge category.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub category: Category,
    /// Records: `{collection: [document, ...]}`; repositories: `[repo, ...]`;
    /// resume: `{"resume_text": "..."}`.
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a staleness-gated refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Already refreshed today; nothing was fetched.
    Fresh,
    /// Fetched, normalized and persisted.
    Refreshed,
}

/// Per-category outcome of refreshing every category.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub fresh: Vec<Category>,
    pub refreshed: Vec<Category>,
    pub failed: Vec<(Category, String)>,
}

impl RefreshReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SnapshotManager {
    store: Arc<dyn ContextStore>,
    records: Arc<dyn RecordSource>,
    repositories: Arc<dyn RepositorySource>,
    resume: Arc<dyn ResumeSource>,
    records_config: RecordsConfig,
    repository_config: RepositoryConfig,
}

impl SnapshotManager {
    pub fn new(
        store: Arc<dyn ContextStore>,
        records: Arc<dyn RecordSource>,
        repositories: Arc<dyn RepositorySource>,
        resume: Arc<dyn ResumeSource>,
    ) -> Self {
        Self {
            store,
            records,
            repositories,
            resume,
            records_config: RecordsConfig::default(),
            repository_config: RepositoryConfig::default(),
        }
    }

    pub fn with_records_config(mut self, config: RecordsConfig) -> Self {
        self.records_config = config;
        self
    }

    pub fn with_repository_config(mut self, config: RepositoryConfig) -> Self {
        self.repository_config = config;
        self
    }

    pub fn records_config(&self) -> &RecordsConfig {
        &self.records_config
    }

    /// Refresh `category` unless it was already refreshed today (UTC).
    pub async fn ensure_fresh(&self, category: Category) -> Result<Freshness> {
        self.ensure_fresh_at(category, Utc::now()).await
    }

    pub async fn ensure_fresh_at(&self, category: Category, now: DateTime<Utc>) -> Result<Freshness> {
        let meta = self.store.context_meta().await?;
        if !meta.is_stale(category, now) {
            debug!(%category, "snapshot is fresh, skipping refresh");
            return Ok(Freshness::Fresh);
        }
        self.refresh_at(category, now).await?;
        Ok(Freshness::Refreshed)
    }

    /// Staleness-gated refresh of every category. Failures are logged and
    /// reported per category; they never stop the remaining categories.
    pub async fn ensure_all_fresh_at(&self, now: DateTime<Utc>) -> RefreshReport {
        let mut report = RefreshReport::default();
        for category in Category::ALL {
            match self.ensure_fresh_at(category, now).await {
                Ok(Freshness::Fresh) => report.fresh.push(category),
                Ok(Freshness::Refreshed) => report.refreshed.push(category),
                Err(e) => {
                    warn!(%category, error = %e, "snapshot refresh failed, keeping previous snapshot");
                    report.failed.push((category, e.to_string()));
                },
            }
        }
        report
    }

    /// Unconditional refresh of every category, with the same isolation as
    /// [`Self::ensure_all_fresh_at`].
    pub async fn refresh_all_at(&self, now: DateTime<Utc>) -> RefreshReport {
        let mut report = RefreshReport::default();
        for category in Category::ALL {
            match self.refresh_at(category, now).await {
                Ok(_) => report.refreshed.push(category),
                Err(e) => {
                    warn!(%category, error = %e, "snapshot refresh failed, keeping previous snapshot");
                    report.failed.push((category, e.to_string()));
                },
            }
        }
        report
    }

    /// Fetch, normalize and persist one category, stamped with `now`.
    pub async fn refresh_at(&self, category: Category, now: DateTime<Utc>) -> Result<Snapshot> {
        let data = self
            .collect(category)
            .await
            .map_err(|source| ContextError::Refresh { category, source })?;
        let snapshot = Snapshot {
            category,
            data,
            created_at: now,
        };
        self.store.save_snapshot(&snapshot).await?;
        info!(%category, entries = entry_count(&snapshot.data), "snapshot saved");
        Ok(snapshot)
    }

    /// The persisted snapshot for `category`. When none exists yet, one
    /// refresh is attempted; if that fails too the category is treated as
    /// having no data.
    pub async fn current(&self, category: Category) -> Result<Option<Snapshot>> {
        if let Some(snapshot) = self.store.load_snapshot(category).await? {
            return Ok(Some(snapshot));
        }
        match self.refresh_at(category, Utc::now()).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e @ ContextError::Refresh { .. }) => {
                warn!(%category, error = %e, "no snapshot available");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    async fn collect(&self, category: Category) -> anyhow::Result<Value> {
        match category {
            Category::Records => self.collect_records().await,
            Category::Repositories => self.collect_repositories().await,
            Category::Resume => self.collect_resume().await,
        }
    }

    async fn collect_records(&self) -> anyhow::Result<Value> {
        let page_size = self.records_config.page_size.max(1);
        let mut aggregated = Map::new();
        for collection in &self.records_config.collections {
            let mut docs = Vec::new();
            let mut offset = 0;
            loop {
                let page = self
                    .records
                    .fetch_page(collection, offset, page_size)
                    .await?;
                let fetched = page.len();
                docs.extend(
                    page.into_iter()
                        .map(|doc| without_fields(doc, &collection.excluded_fields))
                        .map(|doc| Value::Object(prune_document(doc))),
                );
                if fetched < page_size {
                    break;
                }
                offset += fetched;
            }
            debug!(collection = %collection.name, documents = docs.len(), "collected records");
            aggregated.insert(collection.name.clone(), Value::Array(docs));
        }
        Ok(prune_empty(Value::Object(aggregated)).unwrap_or_else(|| json!({})))
    }

    async fn collect_repositories(&self) -> anyhow::Result<Value> {
        let repos = self.repositories.list_repositories().await?;
        let mut out = Vec::with_capacity(repos.len());
        for repo in repos {
            let readme = match self.repositories.fetch_readme(&repo.full_name).await {
                Ok(readme) => readme,
                Err(e) => {
                    warn!(repo = %repo.full_name, error = %e, "readme fetch failed");
                    None
                },
            };
            let readme = readme
                .map(|md| truncate_chars(md.trim(), self.repository_config.readme_max_chars));
            if let Some(entry) = prune_empty(repository_entry(&repo, readme)) {
                out.push(entry);
            }
        }
        Ok(Value::Array(out))
    }

    async fn collect_resume(&self) -> anyhow::Result<Value> {
        let text = self.resume.resume_text().await?;
        Ok(json!({ RESUME_TEXT_KEY: text.trim() }))
    }
}

fn repository_entry(repo: &RepositoryInfo, readme: Option<String>) -> Value {
    json!({
        "name": repo.name,
        "full_name": repo.full_name,
        "description": repo.description,
        "html_url": repo.html_url,
        "language": repo.language,
        "visibility": if repo.private { "private" } else { "public" },
        "created_at": repo.created_at,
        "updated_at": repo.updated_at,
        "pushed_at": repo.pushed_at,
        "stargazers_count": repo.stargazers_count,
        "forks_count": repo.forks_count,
        "readme": readme,
    })
}

fn entry_count(data: &Value) -> usize {
    match data {
        Value::Array(items) => items.len(),
        Value::Object(map) => map
            .values()
            .map(|v| v.as_array().map_or(1, Vec::len))
            .sum(),
        _ => 0,
    }
}
