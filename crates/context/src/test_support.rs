//! Deterministic collaborators for unit tests.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    chrono::{DateTime, TimeZone, Utc},
    serde_json::Value,
    tokio::sync::Semaphore,
};

use crate::{
    config::RecordCollection,
    document::Document,
    embeddings::EmbeddingProvider,
    sources::{RecordSource, RepositoryInfo, RepositorySource, ResumeSource},
};

pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

#[derive(Default)]
pub struct StubRecords {
    collections: HashMap<String, Vec<Value>>,
    pub calls: AtomicUsize,
}

impl StubRecords {
    pub fn with_collection(name: &str, docs: Vec<Value>) -> Self {
        Self::default().and(name, docs)
    }

    pub fn and(mut self, name: &str, docs: Vec<Value>) -> Self {
        self.collections.insert(name.to_string(), docs);
        self
    }
}

#[async_trait]
impl RecordSource for StubRecords {
    async fn fetch_page(
        &self,
        collection: &RecordCollection,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let docs = self
            .collections
            .get(&collection.name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(docs
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|v| v.as_object().cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct StubRepositories {
    repos: Vec<RepositoryInfo>,
    readmes: HashMap<String, Option<String>>,
    pub fail: AtomicBool,
}

impl StubRepositories {
    pub fn with_repos(repos: Vec<RepositoryInfo>) -> Self {
        Self {
            repos,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        let stub = Self::default();
        stub.fail.store(true, Ordering::SeqCst);
        stub
    }

    pub fn readme(mut self, full_name: &str, text: &str) -> Self {
        self.readmes
            .insert(full_name.to_string(), Some(text.to_string()));
        self
    }

    /// Make the readme fetch for `full_name` fail.
    pub fn readme_error(mut self, full_name: &str) -> Self {
        self.readmes.insert(full_name.to_string(), None);
        self
    }
}

#[async_trait]
impl RepositorySource for StubRepositories {
    async fn list_repositories(&self) -> anyhow::Result<Vec<RepositoryInfo>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("repository host unavailable");
        }
        Ok(self.repos.clone())
    }

    async fn fetch_readme(&self, full_name: &str) -> anyhow::Result<Option<String>> {
        match self.readmes.get(full_name) {
            Some(Some(text)) => Ok(Some(text.clone())),
            Some(None) => anyhow::bail!("readme fetch timed out"),
            None => Ok(None),
        }
    }
}

pub struct StubResume {
    text: Mutex<String>,
    pub calls: AtomicUsize,
}

impl StubResume {
    pub fn text(text: &str) -> Self {
        Self {
            text: Mutex::new(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
    }
}

#[async_trait]
impl ResumeSource for StubResume {
    async fn resume_text(&self) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.lock().unwrap().clone())
    }
}

/// Bag-of-keywords embedder: one dimension per keyword, 1.0 when the text
/// contains it. Texts containing a `fail_on` marker fail to embed.
pub struct KeywordEmbedder {
    keywords: Vec<&'static str>,
    fail_on: Vec<&'static str>,
    gate: Option<Semaphore>,
    pub calls: AtomicUsize,
}

pub const KEYWORDS: [&str; 8] = [
    "rust", "robot", "award", "education", "skills", "github", "music", "cooking",
];

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self {
            keywords: KEYWORDS.to_vec(),
            fail_on: Vec::new(),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }
}

impl KeywordEmbedder {
    pub fn failing_on(markers: &[&'static str]) -> Self {
        Self {
            fail_on: markers.to_vec(),
            ..Self::default()
        }
    }

    /// Every embed call waits for a permit from [`Self::open_gate`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await?;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        if self.fail_on.iter().any(|m| lower.contains(m)) {
            anyhow::bail!("embedding rejected");
        }
        Ok(self
            .keywords
            .iter()
            .map(|kw| if lower.contains(kw) { 1.0 } else { 0.0 })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword-stub"
    }

    fn dimensions(&self) -> usize {
        self.keywords.len()
    }
}

/// Embedder whose every call fails.
#[derive(Default)]
pub struct FailingEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("provider unavailable")
    }

    fn model_name(&self) -> &str {
        "failing-stub"
    }

    fn dimensions(&self) -> usize {
        8
    }
}

/// Embedder returning fixed vectors for known texts and a fallback otherwise.
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl TableEmbedder {
    pub fn new(entries: &[(&str, Vec<f32>)], fallback: Vec<f32>) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            fallback,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn model_name(&self) -> &str {
        "table-stub"
    }

    fn dimensions(&self) -> usize {
        self.fallback.len()
    }
}
