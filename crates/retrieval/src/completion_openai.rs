//! OpenAI chat completions provider (`/v1/chat/completions`, non-streaming).

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{
    completion::{CompletionProvider, CompletionRequest},
    embeddings_openai::{normalize_base_url, openai_endpoint},
};

pub struct OpenAiCompletionProvider {
    client: reqwest::Client,
    api_key: Secret<String>,
    base_url: String,
    model: String,
}

impl OpenAiCompletionProvider {
    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: normalize_base_url("https://api.openai.com"),
            model: "gpt-4o".to_string(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
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
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
        };

        let resp = self
            .client
            .post(openai_endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        if let Some(usage) = &resp.usage {
            debug!(
                model = %self.model,
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                "chat completion finished"
            );
        }

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("chat completion returned no content"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
