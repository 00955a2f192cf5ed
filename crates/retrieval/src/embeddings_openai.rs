/// OpenAI embeddings provider using the `/v1/embeddings` endpoint.
use async_trait::async_trait;
use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::embeddings::EmbeddingProvider;

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: Secret<String>,
    base_url: String,
    model: String,
    dims: usize,
}

pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Resolve `resource` (e.g. `embeddings`, `chat/completions`) against an
/// OpenAI-compatible base URL that may or may not carry a version segment.
pub(crate) fn openai_endpoint(base_url: &str, resource: &str) -> String {
    let normalized = normalize_base_url(base_url);
    if normalized.ends_with(&format!("/{resource}")) {
        return normalized;
    }
    if has_version_suffix(&normalized) {
        return format!("{normalized}/{resource}");
    }
    format!("{normalized}/v1/{resource}")
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: normalize_base_url("https://api.openai.com"),
            model: "text-embedding-3-large".to_string(),
            dims: 3072,
        }
    }

    pub fn with_model(mut self, model: String, dims: usize) -> Self {
        self.model = model;
        self.dims = dims;
        self
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = normalize_base_url(&url);
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
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
        if texts.is_empty() {
            anyhow::bail!("refusing to embed an empty batch");
        }

        let req = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let start = std::time::Instant::now();
        let mut resp = self
            .client
            .post(openai_endpoint(&self.base_url, "embeddings"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        debug!(
            model = %self.model,
            inputs = texts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "embedding request finished"
        );

        resp.data.sort_by_key(|d| d.index);
        Ok(resp.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
