//! Metric names recorded through the `metrics` facade when the `metrics`
//! feature is enabled. Exporters are installed by the embedding application.

pub mod labels {
    pub const PROVIDER: &str = "provider";
    pub const CATEGORY: &str = "category";
    pub const OUTCOME: &str = "outcome";
}

pub const EMBEDDINGS_GENERATED_TOTAL: &str = "folio_embeddings_generated_total";
pub const EMBEDDING_DURATION_SECONDS: &str = "folio_embedding_duration_seconds";
pub const EMBEDDING_FAILURES_TOTAL: &str = "folio_embedding_failures_total";
pub const INDEX_BUILDS_TOTAL: &str = "folio_index_builds_total";
pub const INDEX_ITEMS: &str = "folio_index_items";
pub const SNAPSHOT_REFRESH_FAILURES_TOTAL: &str = "folio_snapshot_refresh_failures_total";
pub const RETRIEVALS_TOTAL: &str = "folio_retrievals_total";
pub const RETRIEVAL_DURATION_SECONDS: &str = "folio_retrieval_duration_seconds";
