/// Persisted-store abstraction: the durable source of truth for snapshots,
/// their metadata and the memory items.
use std::collections::BTreeMap;

use {
    async_trait::async_trait,
    chrono::{DateTime, Datelike, Utc},
};

use crate::{category::Category, error::Result, snapshot::Snapshot};

/// One persisted memory item. Norms are derived on load, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub category: Category,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// Per-category timestamp of the last successful snapshot refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextMeta {
    last_update: BTreeMap<Category, DateTime<Utc>>,
}

impl ContextMeta {
    pub fn last_update(&self, category: Category) -> Option<DateTime<Utc>> {
        self.last_update.get(&category).copied()
    }

    pub fn set(&mut self, category: Category, at: DateTime<Utc>) {
        self.last_update.insert(category, at);
    }

    /// A category is stale when it was never refreshed, or its last refresh
    /// happened on an earlier UTC calendar day than `now`.
    pub fn is_stale(&self, category: Category, now: DateTime<Utc>) -> bool {
        match self.last_update(category) {
            None => true,
            Some(at) => at.date_naive() < now.date_naive(),
        }
    }
}

/// Timestamp of the last full index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryIndexMeta {
    pub last_rebuild: Option<DateTime<Utc>>,
}

impl MemoryIndexMeta {
    /// Whether the last rebuild happened in the same UTC month as `now`.
    pub fn rebuilt_in_month_of(&self, now: DateTime<Utc>) -> bool {
        self.last_rebuild
            .is_some_and(|at| month_ordinal(at) == month_ordinal(now))
    }
}

fn month_ordinal(at: DateTime<Utc>) -> i64 {
    i64::from(at.year()) * 12 + i64::from(at.month0())
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// The current snapshot for a category, if one was ever persisted.
    async fn load_snapshot(&self, category: Category) -> Result<Option<Snapshot>>;

    /// Replace the category's snapshot and stamp its context-meta entry with
    /// the snapshot's `created_at`, atomically.
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    async fn context_meta(&self) -> Result<ContextMeta>;

    async fn index_meta(&self) -> Result<MemoryIndexMeta>;

    async fn count_items(&self) -> Result<usize>;

    async fn load_items(&self) -> Result<Vec<StoredItem>>;

    /// Delete every memory item, insert `items`, and record `rebuilt_at` as the
    /// last rebuild, atomically.
    async fn replace_items(&self, items: &[StoredItem], rebuilt_at: DateTime<Utc>) -> Result<()>;
}
