//! Engine facade: owns the snapshot manager, the memory index and the query
//! paths, and exposes the maintenance triggers the scheduler drives.

use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::Serialize,
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use {
    crate::telemetry::{self, labels},
    metrics::counter,
};

use crate::{
    category::Category,
    config::ContextConfig,
    embeddings::EmbeddingProvider,
    error::Result,
    index::{BuildReport, MemoryIndex},
    retrieval::{RetrievedContext, Retriever, render_prompt},
    search::{Citations, Citer, LocalVectorSearch, VectorSearch},
    snapshot::{RefreshReport, SnapshotManager},
    sources::{RecordSource, RepositorySource, ResumeSource},
    store::ContextStore,
};

/// Maintenance work that can be requested explicitly or on a cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceTask {
    /// Refresh every category whose snapshot is stale.
    RefreshSnapshots,
    /// Rebuild the index only if its month rolled over or it is empty.
    CheckIndex,
    /// Rebuild the index unconditionally.
    RebuildIndex,
}

impl std::fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::RefreshSnapshots => "refresh-snapshots",
            Self::CheckIndex => "check-index",
            Self::RebuildIndex => "rebuild-index",
        })
    }
}

/// Something that can carry out maintenance tasks.
#[async_trait]
pub trait MaintenanceTrigger: Send + Sync {
    async fn trigger(&self, task: MaintenanceTask) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStatus {
    pub category: Category,
    pub last_update: Option<DateTime<Utc>>,
    pub stale: bool,
    pub indexed_items: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub categories: Vec<CategoryStatus>,
    pub last_rebuild: Option<DateTime<Utc>>,
    pub indexed_items: usize,
    pub persisted_items: usize,
}

pub struct ContextEngine {
    store: Arc<dyn ContextStore>,
    snapshots: Arc<SnapshotManager>,
    index: Arc<MemoryIndex>,
    retriever: Retriever,
    citer: Citer,
    config: ContextConfig,
}

impl ContextEngine {
    pub fn new(
        config: ContextConfig,
        store: Arc<dyn ContextStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        records: Arc<dyn RecordSource>,
        repositories: Arc<dyn RepositorySource>,
        resume: Arc<dyn ResumeSource>,
    ) -> Self {
        let snapshots = Arc::new(
            SnapshotManager::new(Arc::clone(&store), records, repositories, resume)
                .with_records_config(config.records.clone())
                .with_repository_config(config.repositories.clone()),
        );
        let index = Arc::new(
            MemoryIndex::new(Arc::clone(&store), embedder, Arc::clone(&snapshots))
                .with_config(config.index.clone()),
        );
        let retriever = Retriever::new(Arc::clone(&index), config.retrieval.clone());
        let citer = Citer::new(
            Arc::clone(&index),
            Arc::new(LocalVectorSearch::new(Arc::clone(&index))),
            config.retrieval.clone(),
        );
        Self {
            store,
            snapshots,
            index,
            retriever,
            citer,
            config,
        }
    }

    /// Route citation searches to another vector-search backend.
    pub fn with_vector_search(mut self, search: Arc<dyn VectorSearch>) -> Self {
        self.citer = Citer::new(Arc::clone(&self.index), search, self.config.retrieval.clone());
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<MemoryIndex> {
        &self.index
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    /// Bring stale snapshots up to date, then load or build the index.
    /// Snapshot failures are logged and do not prevent the build.
    pub async fn init(&self) -> Result<BuildReport> {
        let report = self.snapshots.ensure_all_fresh_at(Utc::now()).await;
        log_refresh(&report);
        self.index.build(false).await
    }

    /// Refresh snapshots; `force` ignores staleness.
    pub async fn refresh_all(&self, force: bool) -> RefreshReport {
        let now = Utc::now();
        let report = if force {
            self.snapshots.refresh_all_at(now).await
        } else {
            self.snapshots.ensure_all_fresh_at(now).await
        };
        log_refresh(&report);
        report
    }

    pub async fn rebuild_index(&self, force: bool) -> Result<BuildReport> {
        self.index.build(force).await
    }

    /// Assemble the ranked context block for `query`. An index that was never
    /// loaded in this process is loaded (or built) first.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext> {
        self.ensure_index_loaded(query).await?;
        self.retriever.retrieve(query).await
    }

    /// Chat-provider input for `query`, with optional conversation memory.
    pub async fn prompt(&self, query: &str, memory: Option<&str>) -> Result<String> {
        let retrieved = self.retrieve(query).await?;
        Ok(render_prompt(&retrieved.context, query.trim(), memory))
    }

    /// Top references across categories, numbered for citation.
    pub async fn cite(&self, query: &str) -> Result<Citations> {
        self.ensure_index_loaded(query).await?;
        self.citer.cite(query).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let now = Utc::now();
        let meta = self.store.context_meta().await?;
        let index_meta = self.store.index_meta().await?;
        let counts = self.index.category_counts();
        let categories = Category::ALL
            .iter()
            .map(|&category| CategoryStatus {
                category,
                last_update: meta.last_update(category),
                stale: meta.is_stale(category, now),
                indexed_items: counts[category.index()],
            })
            .collect();
        Ok(EngineStatus {
            categories,
            last_rebuild: index_meta.last_rebuild,
            indexed_items: counts.iter().sum(),
            persisted_items: self.store.count_items().await?,
        })
    }

    async fn ensure_index_loaded(&self, query: &str) -> Result<()> {
        if self.index.is_empty() && !query.trim().is_empty() {
            self.index.build(false).await?;
        }
        Ok(())
    }
}

fn log_refresh(report: &RefreshReport) {
    info!(
        fresh = report.fresh.len(),
        refreshed = report.refreshed.len(),
        failed = report.failed.len(),
        "snapshot refresh finished"
    );
    for (category, error) in &report.failed {
        warn!(%category, %error, "snapshot left stale");
        #[cfg(feature = "metrics")]
        counter!(telemetry::SNAPSHOT_REFRESH_FAILURES_TOTAL, labels::CATEGORY => category.as_str())
            .increment(1);
    }
}

#[async_trait]
impl MaintenanceTrigger for ContextEngine {
    async fn trigger(&self, task: MaintenanceTask) -> Result<()> {
        info!(%task, "maintenance triggered");
        match task {
            MaintenanceTask::RefreshSnapshots => {
                self.refresh_all(false).await;
            },
            MaintenanceTask::CheckIndex => {
                self.index.build(false).await?;
            },
            MaintenanceTask::RebuildIndex => {
                self.index.build(true).await?;
            },
        }
        Ok(())
    }
}
