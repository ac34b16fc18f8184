//! `folio.toml` loading plus environment overrides.

use std::path::{Path, PathBuf};

use {
    anyhow::Context as _,
    directories::ProjectDirs,
    folio_context::config::ContextConfig,
    secrecy::Secret,
    serde::Deserialize,
};

pub const CONFIG_FILE: &str = "folio.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    /// SQLite URL for snapshots, the memory index and the records table.
    pub database_url: Option<String>,
    /// Resume document, `.pdf` or plain text.
    pub resume_path: Option<PathBuf>,
    pub openai: OpenAiConfig,
    pub github: GitHubConfig,
    #[serde(flatten)]
    pub context: ContextConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<Secret<String>>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: Option<Secret<String>>,
    pub api_url: Option<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "folio", "folio")
}

impl FolioConfig {
    /// Load from `explicit`, else from the platform config dir, else defaults.
    /// Returns the file actually read, if any.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => project_dirs()
                .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
                .filter(|path| path.is_file()),
        };
        let Some(path) = path else {
            return Ok((Self::default(), None));
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok((config, Some(path)))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Environment values win over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("OPENAI_API_KEY") {
            self.openai.api_key = Some(Secret::new(key));
        }
        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = Some(Secret::new(token));
        }
        if let Some(url) = var("FOLIO_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(path) = var("FOLIO_RESUME_PATH") {
            self.resume_path = Some(PathBuf::from(path));
        }
    }

    /// Configured database URL, else `folio.db` in the platform data dir.
    pub fn database_url(&self) -> anyhow::Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        let Some(dirs) = project_dirs() else {
            return Ok("sqlite://folio.db?mode=rwc".into());
        };
        let dir = dirs.data_dir();
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(format!("sqlite://{}?mode=rwc", dir.join("folio.db").display()))
    }

    pub fn resume_path(&self) -> PathBuf {
        self.resume_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("data/resume.pdf"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn file_sections_and_engine_tables_share_one_document() {
        let config = FolioConfig::parse(
            r#"
            database_url = "sqlite://tmp.db"

            [openai]
            model = "text-embedding-3-large"
            dimensions = 3072

            [retrieval]
            total_budget = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite://tmp.db"));
        assert_eq!(config.openai.dimensions, Some(3072));
        assert_eq!(config.context.retrieval.total_budget, 8);
        assert_eq!(config.context.retrieval.max_context_chars, 8000);
        assert_eq!(config.context.records.collections.len(), 7);
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = FolioConfig::parse(
            r#"
            database_url = "sqlite://file.db"
            [github]
            token = "from-file"
            "#,
        )
        .unwrap();
        config.apply_env(|name| match name {
            "OPENAI_API_KEY" => Some("sk-env".into()),
            "FOLIO_DATABASE_URL" => Some("sqlite://env.db".into()),
            _ => None,
        });
        assert_eq!(config.database_url().unwrap(), "sqlite://env.db");
        assert_eq!(config.openai.api_key.unwrap().expose_secret(), "sk-env");
        assert_eq!(config.github.token.unwrap().expose_secret(), "from-file");
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FolioConfig::load(Some(&dir.path().join("missing.toml"))).is_err());

        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "resume_path = \"cv.txt\"\n").unwrap();
        let (config, used) = FolioConfig::load(Some(&path)).unwrap();
        assert_eq!(used.as_deref(), Some(path.as_path()));
        assert_eq!(config.resume_path(), PathBuf::from("cv.txt"));
    }

    #[test]
    fn malformed_file_is_reported() {
        assert!(FolioConfig::parse("[retrieval]\ntotal_budget = \"many\"").is_err());
    }
}
