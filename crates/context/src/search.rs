//! Citation retrieval: per-category top-k vector search issued concurrently,
//! merged into one numbered list of references.

use std::sync::Arc;

use {
    async_trait::async_trait,
    tokio::{sync::Mutex, task::JoinSet},
    tracing::{debug, warn},
};

use crate::{
    category::Category,
    config::{CitationLimits, RetrievalConfig},
    embeddings::{cosine_similarity, l2_norm},
    error::{ContextError, Result, Stage},
    index::MemoryIndex,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub category: Category,
    pub text: String,
    pub score: f64,
}

/// Nearest-neighbour search restricted to one category.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        category: Category,
        query_embedding: &[f32],
        k: usize,
    ) -> anyhow::Result<Vec<SearchHit>>;
}

/// Exhaustive cosine search over the in-process memory index.
pub struct LocalVectorSearch {
    index: Arc<MemoryIndex>,
}

impl LocalVectorSearch {
    pub fn new(index: Arc<MemoryIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl VectorSearch for LocalVectorSearch {
    async fn search(
        &self,
        category: Category,
        query_embedding: &[f32],
        k: usize,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let items = self.index.items();
        let query_norm = l2_norm(query_embedding);
        let mut hits: Vec<SearchHit> = items
            .iter()
            .filter(|item| item.category == category)
            .map(|item| SearchHit {
                category,
                text: item.text.clone(),
                score: cosine_similarity(&item.embedding, item.norm, query_embedding, query_norm),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

/// One search task per category; results land in a shared list behind a
/// single lock. A failing category is logged and contributes nothing.
///
/// Returns the merged hits and the number of categories that failed.
pub async fn fan_out(
    search: Arc<dyn VectorSearch>,
    query_embedding: Arc<Vec<f32>>,
    limits: CitationLimits,
) -> (Vec<SearchHit>, usize) {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = JoinSet::new();

    for category in Category::ALL {
        let k = limits.for_category(category);
        if k == 0 {
            continue;
        }
        let search = Arc::clone(&search);
        let query_embedding = Arc::clone(&query_embedding);
        let hits = Arc::clone(&hits);
        tasks.spawn(async move {
            match search.search(category, &query_embedding, k).await {
                Ok(found) => {
                    debug!(%category, hits = found.len(), "vector search done");
                    hits.lock().await.extend(found);
                    true
                },
                Err(e) => {
                    warn!(%category, error = %e, "vector search failed");
                    false
                },
            }
        });
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(true) => {},
            Ok(false) => failed += 1,
            Err(e) => {
                warn!(error = %e, "vector search task aborted");
                failed += 1;
            },
        }
    }

    let merged = std::mem::take(&mut *hits.lock().await);
    (merged, failed)
}

/// Numbered references ready to be cited by `[n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Citations {
    pub hits: Vec<SearchHit>,
    /// One line per hit: `[n] (category) text`.
    pub context: String,
}

impl Citations {
    fn from_hits(hits: Vec<SearchHit>) -> Self {
        let context = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                format!("[{}] ({}) {}", i + 1, hit.category, hit.text.replace('\n', " "))
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self { hits, context }
    }

    /// Chat-provider input for a cited answer.
    pub fn prompt(&self, query: &str) -> String {
        format!("CONTEXT:\n{}\nQUESTION: {query}", self.context)
    }
}

pub struct Citer {
    index: Arc<MemoryIndex>,
    search: Arc<dyn VectorSearch>,
    config: RetrievalConfig,
}

impl Citer {
    pub fn new(index: Arc<MemoryIndex>, search: Arc<dyn VectorSearch>, config: RetrievalConfig) -> Self {
        Self {
            index,
            search,
            config,
        }
    }

    pub async fn cite(&self, query: &str) -> Result<Citations> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ContextError::Validation("query is empty".into()));
        }
        let query_embedding = self
            .index
            .embedder()
            .embed(query)
            .await
            .map_err(|e| ContextError::upstream(Stage::QueryEmbedding, e))?;

        let (mut hits, failed) = fan_out(
            Arc::clone(&self.search),
            Arc::new(query_embedding),
            self.config.citation_per_category,
        )
        .await;

        if hits.is_empty() {
            if failed > 0 {
                return Err(ContextError::upstream(
                    Stage::Search,
                    anyhow::anyhow!("vector search failed for {failed} categories"),
                ));
            }
            return Err(ContextError::empty("no context available for query"));
        }

        // Fan-in order is arbitrary; break score ties by category.
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.category.index().cmp(&b.category.index()))
        });
        hits.truncate(self.config.citation_top_k);
        Ok(Citations::from_hits(hits))
    }
}
