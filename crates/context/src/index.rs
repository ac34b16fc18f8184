//! Memory index: embedded chunks with precomputed norms.
//!
//! The persisted items are the durable source of truth; the in-process cache
//! is a read-only view replaced wholesale after every build. Readers clone the
//! current `Arc` and keep a consistent view even while a rebuild runs.

use std::sync::{Arc, PoisonError, RwLock};

use {
    chrono::{DateTime, Utc},
    futures::{StreamExt, stream},
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use {
    crate::telemetry::{self, labels},
    metrics::{counter, gauge},
};

use crate::{
    category::Category,
    chunker::{Chunk, Chunker},
    config::IndexConfig,
    embeddings::{EmbeddingProvider, l2_norm},
    error::Result,
    snapshot::SnapshotManager,
    store::{ContextStore, StoredItem},
};

/// One indexed chunk. `norm` is always derived from `embedding`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryItem {
    pub category: Category,
    pub text: String,
    pub embedding: Vec<f32>,
    pub norm: f64,
}

impl MemoryItem {
    pub fn new(category: Category, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        let norm = l2_norm(&embedding);
        Self {
            category,
            text: text.into(),
            embedding,
            norm,
        }
    }
}

impl From<StoredItem> for MemoryItem {
    fn from(item: StoredItem) -> Self {
        Self::new(item.category, item.text, item.embedding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Hydrated from the persisted items without embedding anything.
    Reused,
    /// Chunked and embedded from the current snapshots.
    Rebuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub outcome: BuildOutcome,
    pub items: usize,
    /// Chunks dropped because their embedding call failed.
    pub skipped: usize,
}

pub struct MemoryIndex {
    store: Arc<dyn ContextStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    snapshots: Arc<SnapshotManager>,
    chunker: Chunker,
    config: IndexConfig,
    items: RwLock<Arc<Vec<MemoryItem>>>,
    build_lock: Mutex<()>,
}

impl MemoryIndex {
    pub fn new(
        store: Arc<dyn ContextStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        snapshots: Arc<SnapshotManager>,
    ) -> Self {
        let chunker = Chunker::new(snapshots.records_config().clone());
        Self {
            store,
            embedder,
            snapshots,
            chunker,
            config: IndexConfig::default(),
            items: RwLock::new(Arc::new(Vec::new())),
            build_lock: Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// The current complete item set.
    pub fn items(&self) -> Arc<Vec<MemoryItem>> {
        Arc::clone(&self.items.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Item count per category, indexed by [`Category::index`].
    pub fn category_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for item in self.items().iter() {
            counts[item.category.index()] += 1;
        }
        counts
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub async fn build(&self, force: bool) -> Result<BuildReport> {
        self.build_at(force, Utc::now()).await
    }

    /// Reuse the persisted items when they were rebuilt this month and are not
    /// empty, otherwise rebuild. Builds are serialized; readers are never
    /// blocked.
    pub async fn build_at(&self, force: bool, now: DateTime<Utc>) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;

        if !force {
            let meta = self.store.index_meta().await?;
            if meta.rebuilt_in_month_of(now) && self.store.count_items().await? > 0 {
                let items: Vec<MemoryItem> = self
                    .store
                    .load_items()
                    .await?
                    .into_iter()
                    .map(MemoryItem::from)
                    .collect();
                let count = items.len();
                self.swap(items);
                info!(items = count, "memory index up to date, loaded from store");
                #[cfg(feature = "metrics")]
                counter!(telemetry::INDEX_BUILDS_TOTAL, labels::OUTCOME => "reused").increment(1);
                return Ok(BuildReport {
                    outcome: BuildOutcome::Reused,
                    items: count,
                    skipped: 0,
                });
            }
        }

        self.rebuild(now).await
    }

    async fn rebuild(&self, now: DateTime<Utc>) -> Result<BuildReport> {
        info!(month = %now.format("%Y-%m"), "rebuilding memory index");
        let chunks = self.collect_chunks().await?;
        let total = chunks.len();

        let embedder = &self.embedder;
        let embedded: Vec<(Chunk, anyhow::Result<Vec<f32>>)> = stream::iter(chunks)
            .map(|chunk| async move {
                let result = embedder.embed(&chunk.text).await;
                (chunk, result)
            })
            .buffered(self.config.embed_concurrency.max(1))
            .collect()
            .await;

        let mut stored = Vec::with_capacity(total);
        let mut items = Vec::with_capacity(total);
        let mut skipped = 0;
        for (chunk, result) in embedded {
            match result {
                Ok(embedding) if !embedding.is_empty() => {
                    stored.push(StoredItem {
                        category: chunk.category,
                        text: chunk.text.clone(),
                        embedding: embedding.clone(),
                        created_at: now,
                    });
                    items.push(MemoryItem::new(chunk.category, chunk.text, embedding));
                },
                Ok(_) => {
                    warn!(category = %chunk.category, "empty embedding, skipping chunk");
                    skipped += 1;
                },
                Err(e) => {
                    warn!(category = %chunk.category, error = %e, "embedding failed, skipping chunk");
                    skipped += 1;
                },
            }
        }

        #[cfg(feature = "metrics")]
        if skipped > 0 {
            counter!(telemetry::EMBEDDING_FAILURES_TOTAL).increment(skipped as u64);
        }

        self.store.replace_items(&stored, now).await?;
        let count = items.len();
        self.swap(items);

        #[cfg(feature = "metrics")]
        {
            counter!(telemetry::INDEX_BUILDS_TOTAL, labels::OUTCOME => "rebuilt").increment(1);
            gauge!(telemetry::INDEX_ITEMS).set(count as f64);
        }

        if count == 0 && total > 0 {
            warn!(chunks = total, "every embedding failed, memory index is empty");
        }
        info!(items = count, skipped, "memory index rebuilt");
        Ok(BuildReport {
            outcome: BuildOutcome::Rebuilt,
            items: count,
            skipped,
        })
    }

    async fn collect_chunks(&self) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for category in Category::ALL {
            match self.snapshots.current(category).await? {
                Some(snapshot) => {
                    let produced = self.chunker.chunk(&snapshot);
                    debug!(%category, chunks = produced.len(), "chunked snapshot");
                    chunks.extend(produced);
                },
                None => debug!(%category, "no snapshot to chunk"),
            }
        }
        Ok(chunks)
    }

    fn swap(&self, items: Vec<MemoryItem>) {
        *self.items.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(items);
    }

    #[cfg(test)]
    pub(crate) fn replace_items(&self, items: Vec<MemoryItem>) {
        self.swap(items);
    }
}
