use crate::category::Category;

/// Pipeline stage an error originated from, surfaced to callers so a failed
/// request can be attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    QueryEmbedding,
    Retrieval,
    Search,
    Refresh,
    IndexBuild,
    Storage,
    Config,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::QueryEmbedding => "query-embedding",
            Self::Retrieval => "retrieval",
            Self::Search => "search",
            Self::Refresh => "refresh",
            Self::IndexBuild => "index-build",
            Self::Storage => "storage",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The request itself was malformed (e.g. an empty query).
    #[error("invalid request: {0}")]
    Validation(String),

    /// An external provider call failed.
    #[error("{stage} failed: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// Nothing to answer from: the index is empty or no chunk survived selection.
    #[error("no context available: {reason}")]
    EmptyResult { reason: String },

    /// Refreshing one category's snapshot failed. Other categories are unaffected.
    #[error("refreshing {category} snapshot failed: {source}")]
    Refresh {
        category: Category,
        #[source]
        source: anyhow::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ContextError {
    pub fn upstream(stage: Stage, source: anyhow::Error) -> Self {
        Self::Upstream { stage, source }
    }

    pub fn empty(reason: impl Into<String>) -> Self {
        Self::EmptyResult {
            reason: reason.into(),
        }
    }

    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Validation(_) => Stage::Validation,
            Self::Upstream { stage, .. } => *stage,
            Self::EmptyResult { .. } => Stage::Retrieval,
            Self::Refresh { .. } => Stage::Refresh,
            Self::Storage(_) | Self::Corrupt(_) => Stage::Storage,
            Self::Config(_) => Stage::Config,
        }
    }

    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::EmptyResult { .. })
    }
}

pub type Result<T, E = ContextError> = std::result::Result<T, E>;
