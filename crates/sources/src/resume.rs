/// Resume text read from a local `.pdf` or plain-text file.
use std::path::{Path, PathBuf};

use {async_trait::async_trait, folio_context::sources::ResumeSource, tracing::warn};

pub struct FileResumeSource {
    path: PathBuf,
}

impl FileResumeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_pdf(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    }
}

#[async_trait]
impl ResumeSource for FileResumeSource {
    /// A missing file yields empty text rather than an error.
    async fn resume_text(&self) -> anyhow::Result<String> {
        if !tokio::fs::try_exists(&self.path).await? {
            warn!(path = %self.path.display(), "resume file not found");
            return Ok(String::new());
        }
        let text = if self.is_pdf() {
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path)).await??
        } else {
            tokio::fs::read_to_string(&self.path).await?
        };
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn plain_text_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.txt");
        std::fs::write(&path, "\n  Education\nState University\n\n").unwrap();
        let text = FileResumeSource::new(&path).resume_text().await.unwrap();
        assert_eq!(text, "Education\nState University");
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileResumeSource::new(dir.path().join("nope.pdf"));
        assert_eq!(source.resume_text().await.unwrap(), "");
    }

    #[tokio::test]
    async fn unreadable_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.PDF");
        std::fs::write(&path, "not a pdf").unwrap();
        let source = FileResumeSource::new(&path);
        assert!(source.is_pdf());
        assert!(source.resume_text().await.is_err());
    }
}
