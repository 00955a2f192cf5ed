use async_trait::async_trait;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// A single-turn prompt for a chat-style completion model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt: prompt.into(),
            max_tokens,
        }
    }
}

/// Text in, text out. Used for keyword derivation, curation, and summaries.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;

    fn model_name(&self) -> &str;
}
