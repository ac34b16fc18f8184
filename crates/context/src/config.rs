use serde::{Deserialize, Serialize};

use crate::category::Category;

/// Configuration for the context engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub records: RecordsConfig,
    pub repositories: RepositoryConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub cadence: CadenceConfig,
}

/// Which record collections make up the records snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub collections: Vec<RecordCollection>,
    /// Documents fetched per page from the record source.
    pub page_size: usize,
}

/// One source collection of structured records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordCollection {
    /// Source collection name, also the key inside the records snapshot.
    pub name: String,
    /// Human label that prefixes every chunk built from this collection.
    pub label: String,
    /// Fields never copied into the snapshot (links, images, like counts, ids).
    #[serde(default)]
    pub excluded_fields: Vec<String>,
    /// Skip documents flagged `deleted: true`.
    #[serde(default = "default_true")]
    pub soft_delete: bool,
}

fn default_true() -> bool {
    true
}

impl RecordCollection {
    /// A soft-deletable collection whose link/URL/image fields share `prefix`.
    pub fn with_prefix(name: &str, label: &str, prefix: &str) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            excluded_fields: vec![
                "_id".into(),
                format!("{prefix}Link"),
                format!("{prefix}URLs"),
                "likesCount".into(),
                format!("{prefix}Images"),
            ],
            soft_delete: true,
        }
    }

    /// A plain collection with no soft-delete flag and only the id excluded.
    pub fn plain(name: &str, label: &str) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            excluded_fields: vec!["_id".into()],
            soft_delete: false,
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            collections: vec![
                RecordCollection::with_prefix("experienceTable", "Experience", "experience"),
                RecordCollection::with_prefix(
                    "honorsExperienceTable",
                    "Honors Experience",
                    "honorsExperience",
                ),
                RecordCollection::with_prefix("involvementTable", "Involvement", "involvement"),
                RecordCollection::with_prefix("projectTable", "Project", "project"),
                RecordCollection::plain("skillsCollection", "Skills Collection"),
                RecordCollection::plain("skillsTable", "Skill"),
                RecordCollection::with_prefix("yearInReviewTable", "Year In Review", "yearInReview"),
            ],
            page_size: 100,
        }
    }
}

impl RecordsConfig {
    /// Chunk label for a collection; unknown collections are labelled by name.
    pub fn label_for<'a>(&'a self, collection: &'a str) -> &'a str {
        self.collections
            .iter()
            .find(|c| c.name == collection)
            .map_or(collection, |c| c.label.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Readmes longer than this are cut and suffixed with an ellipsis.
    pub readme_max_chars: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            readme_max_chars: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Embedding calls kept in flight during a rebuild.
    pub embed_concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embed_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Total chunks selected across all categories.
    pub total_budget: usize,
    /// Upper bound on the assembled context block, in characters.
    pub max_context_chars: usize,
    /// Hits kept overall for citation retrieval.
    pub citation_top_k: usize,
    /// Per-category k for citation retrieval.
    pub citation_per_category: CitationLimits,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            total_budget: 12,
            max_context_chars: 8000,
            citation_top_k: 15,
            citation_per_category: CitationLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationLimits {
    pub records: usize,
    pub repositories: usize,
    pub resume: usize,
}

impl Default for CitationLimits {
    fn default() -> Self {
        Self {
            records: 10,
            repositories: 5,
            resume: 3,
        }
    }
}

impl CitationLimits {
    pub fn for_category(&self, category: Category) -> usize {
        match category {
            Category::Records => self.records,
            Category::Resume => self.resume,
            Category::Repositories => self.repositories,
        }
    }
}

/// When the scheduler fires maintenance triggers. Six-field cron expressions
/// (`sec min hour day month weekday`), evaluated in UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Snapshot staleness check and refresh.
    pub refresh_schedule: String,
    /// Index check; the index itself only rebuilds when its month rolls over.
    pub index_schedule: String,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            refresh_schedule: "0 0 5 * * *".into(),
            index_schedule: "0 5 5 * * *".into(),
        }
    }
}
