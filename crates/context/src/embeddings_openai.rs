/// OpenAI-compatible embeddings provider using the `/v1/embeddings` endpoint.
use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

#[cfg(feature = "metrics")]
use {
    crate::telemetry::{self, labels},
    metrics::{counter, histogram},
};

use crate::embeddings::EmbeddingProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_DIMENSIONS: usize = 1536;

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: Secret<String>,
    endpoint: String,
    model: String,
    dims: usize,
}

/// Resolve the embeddings URL from a host (`https://api.openai.com`), a
/// versioned API root (`http://localhost:11434/v1`) or the endpoint itself.
fn endpoint_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/embeddings") {
        return base.to_string();
    }
    let versioned = base
        .rsplit_once('/')
        .and_then(|(_, last)| last.strip_prefix('v'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    if versioned {
        format!("{base}/embeddings")
    } else {
        format!("{base}/v1/embeddings")
    }
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: endpoint_url(DEFAULT_BASE_URL),
            model: DEFAULT_MODEL.into(),
            dims: DEFAULT_DIMENSIONS,
        }
    }

    /// Switch model; `dims` must match what the model returns.
    pub fn with_model(mut self, model: String, dims: usize) -> Self {
        self.model = model;
        self.dims = dims;
        self
    }

    /// Point at any OpenAI-compatible server.
    pub fn with_base_url(mut self, url: String) -> Self {
        self.endpoint = endpoint_url(&url);
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        #[cfg(feature = "metrics")]
        counter!(telemetry::EMBEDDINGS_GENERATED_TOTAL, labels::PROVIDER => "openai")
            .increment(texts.len() as u64);

        let req = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let result = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await;

        #[cfg(feature = "metrics")]
        histogram!(telemetry::EMBEDDING_DURATION_SECONDS, labels::PROVIDER => "openai")
            .record(start.elapsed().as_secs_f64());

        let mut data = result?.data;
        if data.len() != texts.len() {
            anyhow::bail!(
                "embedding response has {} vectors for {} inputs",
                data.len(),
                texts.len()
            );
        }
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {super::*, rstest::rstest};

    #[rstest]
    #[case::host("https://api.openai.com", "https://api.openai.com/v1/embeddings")]
    #[case::trailing_slash("http://localhost:11434/v1/", "http://localhost:11434/v1/embeddings")]
    #[case::versioned_root("https://example.cn/api/paas/v4", "https://example.cn/api/paas/v4/embeddings")]
    #[case::full_endpoint("https://proxy.local/v1/embeddings", "https://proxy.local/v1/embeddings")]
    #[case::not_a_version("https://proxy.local/vault", "https://proxy.local/vault/v1/embeddings")]
    fn endpoint_resolution(#[case] base: &str, #[case] expected: &str) {
        assert_eq!(endpoint_url(base), expected);
    }

    #[tokio::test]
    async fn embed_posts_model_and_input() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["hello"],
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"index":0,"embedding":[0.5,-0.25]}]}"#)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(Secret::new("sk-test".into()))
            .with_base_url(server.url());
        let v = provider.embed("hello").await.unwrap();
        assert_eq!(v, vec![0.5, -0.25]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn batch_results_follow_input_order() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_body(r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(Secret::new("k".into()))
            .with_base_url(server.url());
        let out = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(500)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new(Secret::new("k".into()))
            .with_base_url(server.url());
        assert!(provider.embed("x").await.is_err());
        assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);
        assert_eq!(provider.model_name(), DEFAULT_MODEL);
    }
}
