/// Repository listing and readme access through the GitHub REST API.
use {
    async_trait::async_trait,
    folio_context::sources::{RepositoryInfo, RepositorySource},
    reqwest::{StatusCode, header},
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const USER_AGENT: &str = concat!("folio/", env!("CARGO_PKG_VERSION"));

pub struct GitHubRepositorySource {
    client: reqwest::Client,
    token: Secret<String>,
    api_url: String,
}

impl GitHubRepositorySource {
    pub fn new(token: Secret<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.api_url))
            .header(header::AUTHORIZATION, format!("token {}", self.token.expose_secret()))
            .header(header::USER_AGENT, USER_AGENT)
    }
}

#[async_trait]
impl RepositorySource for GitHubRepositorySource {
    /// Every repository visible to the token, walking pages until one comes
    /// back empty.
    async fn list_repositories(&self) -> anyhow::Result<Vec<RepositoryInfo>> {
        let mut repos = Vec::new();
        for page in 1.. {
            let batch: Vec<RepositoryInfo> = self
                .get(&format!("/user/repos?per_page={PER_PAGE}&page={page}"))
                .header(header::ACCEPT, "application/vnd.github+json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if batch.is_empty() {
                break;
            }
            repos.extend(batch);
        }
        debug!(count = repos.len(), "repositories listed");
        Ok(repos)
    }

    async fn fetch_readme(&self, full_name: &str) -> anyhow::Result<Option<String>> {
        let resp = self
            .get(&format!("/repos/{full_name}/readme"))
            .header(header::ACCEPT, "application/vnd.github.raw")
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = resp.error_for_status()?.text().await?;
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {super::*, mockito::Matcher};

    fn page_query(page: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("per_page".into(), "100".into()),
            Matcher::UrlEncoded("page".into(), page.into()),
        ])
    }

    fn source(server: &mockito::Server) -> GitHubRepositorySource {
        GitHubRepositorySource::new(Secret::new("ghp-test".into())).with_api_url(server.url())
    }

    #[tokio::test]
    async fn lists_every_page_until_empty() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/user/repos")
            .match_query(page_query("1"))
            .match_header("authorization", "token ghp-test")
            .with_body(
                r#"[{"name":"rover","full_name":"me/rover","language":"Rust","private":true,"stargazers_count":3},
                    {"name":"kiln","full_name":"me/kiln","description":null}]"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/user/repos")
            .match_query(page_query("2"))
            .with_body("[]")
            .create_async()
            .await;

        let repos = source(&server).list_repositories().await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].full_name, "me/rover");
        assert!(repos[0].private);
        assert_eq!(repos[0].stargazers_count, 3);
        assert_eq!(repos[1].description, None);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user/repos")
            .match_query(page_query("1"))
            .with_status(401)
            .create_async()
            .await;
        assert!(source(&server).list_repositories().await.is_err());
    }

    #[tokio::test]
    async fn readme_is_fetched_raw() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/me/rover/readme")
            .match_header("accept", "application/vnd.github.raw")
            .with_body("# Rover\nA robot.\n")
            .create_async()
            .await;
        let readme = source(&server).fetch_readme("me/rover").await.unwrap();
        assert_eq!(readme.as_deref(), Some("# Rover\nA robot.\n"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_readme_is_none_and_other_failures_error() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/repos/me/kiln/readme")
            .with_status(404)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/repos/me/rover/readme")
            .with_status(502)
            .create_async()
            .await;
        let source = source(&server);
        assert_eq!(source.fetch_readme("me/kiln").await.unwrap(), None);
        assert!(source.fetch_readme("me/rover").await.is_err());
    }
}
