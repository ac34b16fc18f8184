//! Snapshot → chunk transformation.
//!
//! Pure functions, one per snapshot shape. Every produced chunk has non-empty
//! trimmed text; an empty snapshot yields no chunks.

use std::sync::LazyLock;

use {
    regex::Regex,
    serde_json::{Map, Value},
};

use crate::{
    category::Category,
    config::RecordsConfig,
    document::render_value,
    snapshot::{RESUME_TEXT_KEY, Snapshot},
};

/// Fields longer than this are treated as long text.
const LONG_FIELD_CHARS: usize = 100;

/// Resume section headings. A heading must start a line.
static RESUME_HEADING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?mi)^(Education|Experience|Skills|Projects|Honors|Involvement|Year ?in ?Review)\b")
        .ok()
});

/// Minimal retrievable unit of text tagged with a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub category: Category,
    pub text: String,
}

impl Chunk {
    fn new(category: Category, text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            category,
            text: if trimmed.len() == text.len() {
                text
            } else {
                trimmed.to_string()
            },
        })
    }
}

/// Turns snapshots into chunks. Holds the collection → label mapping used for
/// record chunks.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    records: RecordsConfig,
}

impl Chunker {
    pub fn new(records: RecordsConfig) -> Self {
        Self { records }
    }

    /// Chunk any snapshot according to its category.
    pub fn chunk(&self, snapshot: &Snapshot) -> Vec<Chunk> {
        match snapshot.category {
            Category::Records => self.chunk_records(&snapshot.data),
            Category::Repositories => chunk_repositories(&snapshot.data),
            Category::Resume => chunk_resume(
                snapshot
                    .data
                    .get(RESUME_TEXT_KEY)
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            ),
        }
    }

    /// One chunk per record document, in collection then document order.
    pub fn chunk_records(&self, data: &Value) -> Vec<Chunk> {
        let Some(collections) = data.as_object() else {
            return Vec::new();
        };
        collections
            .iter()
            .flat_map(|(name, docs)| {
                let label = self.records.label_for(name);
                docs.as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_object)
                    .filter_map(move |doc| Chunk::new(Category::Records, record_text(label, doc)))
            })
            .collect()
    }
}

fn is_title_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.ends_with("title") || key.ends_with("name")
}

fn is_sensitive_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("password")
}

fn is_long_field(key: &str, value: &str) -> bool {
    value.chars().count() > LONG_FIELD_CHARS
        || value.contains('\n')
        || key.to_ascii_lowercase().contains("description")
}

/// `<label> - <title> (<k: v; ...>)\n<long text>`, omitting empty parts.
fn record_text(label: &str, doc: &Map<String, Value>) -> String {
    let mut title: Option<String> = None;
    let mut short = Vec::new();
    let mut long = Vec::new();

    for (key, value) in doc {
        if is_sensitive_key(key) {
            continue;
        }
        let rendered = render_value(value);
        let rendered = rendered.trim();
        if rendered.is_empty() {
            continue;
        }
        if title.is_none() && is_title_key(key) {
            title = Some(rendered.to_string());
        } else if is_long_field(key, rendered) {
            long.push(rendered.to_string());
        } else {
            short.push(format!("{key}: {rendered}"));
        }
    }

    let mut text = label.to_string();
    if let Some(title) = title {
        text.push_str(" - ");
        text.push_str(&title);
    }
    if !short.is_empty() {
        text.push_str(" (");
        text.push_str(&short.join("; "));
        text.push(')');
    }
    if !long.is_empty() {
        text.push('\n');
        text.push_str(&long.join("\n"));
    }
    text
}

/// One chunk per repository:
/// `<full name> (<language>)\nDescription: <description>\nREADME: <readme>`.
pub fn chunk_repositories(data: &Value) -> Vec<Chunk> {
    let Some(repos) = data.as_array() else {
        return Vec::new();
    };
    repos
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|repo| Chunk::new(Category::Repositories, repository_text(repo)))
        .collect()
}

fn repository_text(repo: &Map<String, Value>) -> String {
    let field = |key: &str| {
        repo.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let mut text = field("full_name")
        .or_else(|| field("name"))
        .unwrap_or_default()
        .to_string();
    if let Some(language) = field("language") {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&format!("({language})"));
    }
    if let Some(description) = field("description") {
        text.push_str("\nDescription: ");
        text.push_str(description);
    }
    if let Some(readme) = field("readme") {
        text.push_str("\nREADME: ");
        text.push_str(readme);
    }
    text
}

/// Split resume text at section headings. Fewer than two headings means the
/// whole text is one chunk; otherwise each chunk runs from its heading to the
/// next one and anything before the first heading is dropped.
pub fn chunk_resume(text: &str) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let starts: Vec<usize> = RESUME_HEADING
        .as_ref()
        .map(|re| re.find_iter(text).map(|m| m.start()).collect())
        .unwrap_or_default();
    if starts.len() < 2 {
        return Chunk::new(Category::Resume, text).into_iter().collect();
    }
    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            Chunk::new(Category::Resume, &text[start..end])
        })
        .collect()
}
