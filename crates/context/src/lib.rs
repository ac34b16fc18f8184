//! Context retrieval: daily snapshots → chunks → embedded memory index →
//! weighted, budgeted context blocks for a language model.

pub mod category;
pub mod chunker;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod embeddings_openai;
pub mod engine;
pub mod error;
pub mod index;
pub mod retrieval;
pub mod schedule;
pub mod schema;
pub mod search;
pub mod snapshot;
pub mod sources;
pub mod store;
pub mod store_sqlite;
#[cfg(feature = "metrics")]
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use {
    category::Category,
    engine::{ContextEngine, MaintenanceTask, MaintenanceTrigger},
    error::{ContextError, Result},
};
