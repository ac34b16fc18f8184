//! Query-time ranking: score every indexed chunk against the query, weight and
//! filter per category, then select a bounded set of chunks under a
//! cross-category budget and assemble them into one context block.

use std::sync::Arc;

use tracing::{debug, info};

#[cfg(feature = "metrics")]
use {
    crate::telemetry::{self, labels},
    metrics::{counter, histogram},
};

use crate::{
    category::Category,
    config::RetrievalConfig,
    embeddings::{cosine_similarity, l2_norm},
    error::{ContextError, Result, Stage},
    index::{MemoryIndex, MemoryItem},
};

/// Query terms that switch on the records keyword boost. Also matched against
/// record label prefixes for the focus multiplier.
pub const RECORD_TERMS: [&str; 6] = [
    "experience",
    "project",
    "honors",
    "skills",
    "involvement",
    "yearinreview",
];

/// Normalized first words that mark a resume section chunk.
pub const RESUME_SECTIONS: [&str; 7] = [
    "education",
    "experience",
    "skills",
    "projects",
    "honors",
    "involvement",
    "yearinreview",
];

/// Record labels hidden unless the query asks for them.
const GATED_RECORD_LABELS: [&str; 2] = ["honors", "year in review"];

/// Multiplier for chunks whose label or heading the query names.
const FOCUS_MULTIPLIER: f64 = 1.2;

const CHUNK_SEPARATOR: &str = "\n\n";

/// One chunk with its raw similarity and its final weighted score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk<'a> {
    pub item: &'a MemoryItem,
    pub similarity: f64,
    pub score: f64,
}

/// Per-category ranked candidates, sorted by descending score and capped.
#[derive(Debug, Clone)]
pub struct RetrievalBucket<'a> {
    pub category: Category,
    pub chunks: Vec<ScoredChunk<'a>>,
}

impl RetrievalBucket<'_> {
    /// Summed weighted score, the bucket's share of the proportional budget.
    pub fn signal(&self) -> f64 {
        self.chunks.iter().map(|c| c.score).sum()
    }
}

/// A chunk that made it into the context block.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedChunk {
    pub category: Category,
    pub text: String,
    pub similarity: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    /// Chunks in the order they appear in `context`.
    pub chunks: Vec<SelectedChunk>,
    pub context: String,
}

/// Lowercased query plus the facts the ranking rules check against it.
struct QueryTerms {
    lowered: String,
}

impl QueryTerms {
    fn new(query: &str) -> Self {
        Self {
            lowered: query.to_lowercase(),
        }
    }

    fn mentions(&self, term: &str) -> bool {
        self.lowered.contains(term)
    }

    fn triggers(&self, category: Category) -> bool {
        match category {
            Category::Records => RECORD_TERMS.iter().any(|t| self.mentions(t)),
            Category::Resume => self.mentions("resume"),
            Category::Repositories => self.mentions("github"),
        }
    }
}

/// Lowercased text before the first `" - "`, i.e. the record label.
fn record_prefix(text: &str) -> String {
    text.split(" - ").next().unwrap_or_default().to_lowercase()
}

/// First whitespace-separated word, lowercased, non-alphanumerics removed.
fn resume_heading(text: &str) -> String {
    text.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// The pure ranking algorithm, independent of where items come from.
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    config: RetrievalConfig,
}

impl Ranker {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Score, weight, boost, filter, sort and cap. Buckets come back in
    /// [`Category::ALL`] order.
    pub fn rank<'a>(
        &self,
        items: &'a [MemoryItem],
        query: &str,
        query_embedding: &[f32],
    ) -> [RetrievalBucket<'a>; 3] {
        let query_norm = l2_norm(query_embedding);
        let terms = QueryTerms::new(query);

        let mut buckets = Category::ALL.map(|category| RetrievalBucket {
            category,
            chunks: Vec::new(),
        });
        for item in items {
            let similarity =
                cosine_similarity(&item.embedding, item.norm, query_embedding, query_norm);
            buckets[item.category.index()].chunks.push(ScoredChunk {
                item,
                similarity,
                score: similarity * item.category.profile().weight,
            });
        }

        for bucket in &mut buckets {
            let profile = bucket.category.profile();
            if terms.triggers(bucket.category) {
                for chunk in &mut bucket.chunks {
                    chunk.score += profile.keyword_boost;
                }
            }
            match bucket.category {
                Category::Records => apply_record_rules(&mut bucket.chunks, &terms),
                Category::Resume => apply_resume_rules(&mut bucket.chunks, &terms),
                Category::Repositories => {},
            }
            // Stable: equal scores keep index order.
            bucket.chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
            bucket.chunks.truncate(profile.max_chunks);
        }
        buckets
    }

    /// Budget allocation. Minimums first, then a proportional share of what is
    /// left, split by each bucket's summed score. Shares are truncated and the
    /// truncation remainder is not redistributed, so fewer than
    /// `total_budget` chunks may be selected.
    pub fn select<'a>(&self, buckets: &[RetrievalBucket<'a>; 3]) -> Vec<ScoredChunk<'a>> {
        let mut selected = Vec::new();
        let mut remaining = self.config.total_budget;
        let mut taken = [0_usize; 3];

        for bucket in buckets.iter().filter(|b| !b.chunks.is_empty()) {
            let take = bucket
                .category
                .profile()
                .min_chunks
                .min(bucket.chunks.len())
                .min(remaining);
            selected.extend_from_slice(&bucket.chunks[..take]);
            taken[bucket.category.index()] = take;
            remaining -= take;
        }

        if remaining == 0 {
            return selected;
        }

        let total_signal: f64 = buckets
            .iter()
            .filter(|b| !b.chunks.is_empty())
            .map(RetrievalBucket::signal)
            .sum();
        let pool = remaining as f64;

        for bucket in buckets.iter().filter(|b| !b.chunks.is_empty()) {
            if remaining == 0 {
                break;
            }
            let profile = bucket.category.profile();
            let start = taken[bucket.category.index()];
            let share = if total_signal > 0.0 {
                // Saturating cast: negative shares become zero.
                (pool * bucket.signal() / total_signal).floor() as usize
            } else {
                0
            };
            let extra = share
                .min(profile.max_chunks.saturating_sub(profile.min_chunks))
                .min(bucket.chunks.len() - start)
                .min(remaining);
            selected.extend_from_slice(&bucket.chunks[start..start + extra]);
            remaining -= extra;
        }
        selected
    }

    /// Join chunk texts (inner newlines collapsed) until the next chunk would
    /// push the block past `max_context_chars`. Chunks are never cut.
    pub fn assemble(&self, selected: &[ScoredChunk<'_>]) -> RetrievedContext {
        let max = self.config.max_context_chars;
        let mut context = String::new();
        let mut length = 0;
        let mut chunks = Vec::new();

        for chunk in selected {
            let line = chunk.item.text.replace('\n', " ");
            let separator = if chunks.is_empty() { 0 } else { CHUNK_SEPARATOR.len() };
            let added = separator + line.chars().count();
            if length + added > max {
                break;
            }
            if separator > 0 {
                context.push_str(CHUNK_SEPARATOR);
            }
            context.push_str(&line);
            length += added;
            chunks.push(SelectedChunk {
                category: chunk.item.category,
                text: chunk.item.text.clone(),
                similarity: chunk.similarity,
                score: chunk.score,
            });
        }
        RetrievedContext { chunks, context }
    }
}

/// Hide honors/year-in-review records unless asked for, then apply the focus
/// multiplier once to records whose label names a queried term.
fn apply_record_rules(chunks: &mut Vec<ScoredChunk<'_>>, terms: &QueryTerms) {
    let wants_gated = GATED_RECORD_LABELS.iter().any(|t| terms.mentions(t));
    chunks.retain(|chunk| {
        wants_gated || {
            let prefix = record_prefix(&chunk.item.text);
            !GATED_RECORD_LABELS.iter().any(|t| prefix.contains(t))
        }
    });
    for chunk in chunks.iter_mut() {
        let prefix = record_prefix(&chunk.item.text);
        if RECORD_TERMS
            .iter()
            .any(|t| prefix.contains(t) && terms.mentions(t))
        {
            chunk.score *= FOCUS_MULTIPLIER;
        }
    }
}

/// Keep resume sections only when the query names their heading; those get
/// the focus multiplier. Chunks that don't start with a known heading pass.
fn apply_resume_rules(chunks: &mut Vec<ScoredChunk<'_>>, terms: &QueryTerms) {
    chunks.retain_mut(|chunk| {
        let heading = resume_heading(&chunk.item.text);
        if !RESUME_SECTIONS.contains(&heading.as_str()) {
            return true;
        }
        if terms.mentions(&heading) {
            chunk.score *= FOCUS_MULTIPLIER;
            true
        } else {
            false
        }
    });
}

/// Chat-provider input: the context block and the question, optionally
/// preceded by conversation memory.
pub fn render_prompt(context: &str, query: &str, memory: Option<&str>) -> String {
    match memory.map(str::trim).filter(|m| !m.is_empty()) {
        Some(memory) => format!("MEMORY:\n{memory}\nCONTEXT:\n{context}\n\nQUESTION: {query}"),
        None => format!("CONTEXT:\n{context}\n\nQUESTION: {query}"),
    }
}

/// Retrieves a bounded context block for a query from the memory index.
pub struct Retriever {
    index: Arc<MemoryIndex>,
    ranker: Ranker,
}

impl Retriever {
    pub fn new(index: Arc<MemoryIndex>, config: RetrievalConfig) -> Self {
        Self {
            index,
            ranker: Ranker::new(config),
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext> {
        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        let result = self.retrieve_inner(query).await;

        #[cfg(feature = "metrics")]
        {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) if e.is_empty_result() => "empty",
                Err(_) => "error",
            };
            counter!(telemetry::RETRIEVALS_TOTAL, labels::OUTCOME => outcome).increment(1);
            histogram!(telemetry::RETRIEVAL_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        }

        result
    }

    async fn retrieve_inner(&self, query: &str) -> Result<RetrievedContext> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ContextError::Validation("query is empty".into()));
        }
        let items = self.index.items();
        if items.is_empty() {
            return Err(ContextError::empty("memory index is empty"));
        }

        let query_embedding = self
            .index
            .embedder()
            .embed(query)
            .await
            .map_err(|e| ContextError::upstream(Stage::QueryEmbedding, e))?;

        let buckets = self.ranker.rank(&items, query, &query_embedding);
        for bucket in &buckets {
            debug!(category = %bucket.category, candidates = bucket.chunks.len(), signal = bucket.signal(), "ranked bucket");
        }
        if buckets.iter().all(|b| b.chunks.is_empty()) {
            return Err(ContextError::empty("no chunks survived filtering"));
        }

        let selected = self.ranker.select(&buckets);
        let retrieved = self.ranker.assemble(&selected);
        if retrieved.chunks.is_empty() {
            return Err(ContextError::empty("no chunk fits the context bound"));
        }
        info!(
            selected = retrieved.chunks.len(),
            chars = retrieved.context.chars().count(),
            "context assembled"
        );
        Ok(retrieved)
    }
}
