#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    chrono::NaiveDateTime,
    dmrecall_archive::{MessageStore, SqliteMessageStore, connect},
    dmrecall_common::{Message, parse_timestamp},
};

use crate::{
    completion::{CompletionProvider, CompletionRequest},
    embeddings::EmbeddingProvider,
};

pub const CONVERSATION: u64 = 383761744830529537;

/// Mock embedding provider that produces deterministic vectors from content.
///
/// Each of 8 dimensions corresponds to a keyword: 1.0 when the text contains
/// it, 0.0 otherwise.
pub struct MockEmbedder {
    pub batch_calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
}

pub const KEYWORDS: [&str; 8] = [
    "pizza", "camping", "concert", "movie", "birthday", "game", "cooking", "music",
];

pub fn keyword_embedding(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .map(|kw| if lower.contains(kw) { 1.0 } else { 0.0 })
        .collect()
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            batch_calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(keyword_embedding(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_embedding(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len()
    }
}

/// Embedder that always fails.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding service unavailable")
    }

    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        0
    }
}

/// Completion provider that replays canned responses in order and records
/// every prompt it was given.
pub struct ScriptedCompleter {
    responses: Mutex<VecDeque<anyhow::Result<String>>>,
    pub prompts: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompleter {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].prompt.clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompleter {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response left")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn ts(raw: &str) -> NaiveDateTime {
    parse_timestamp(raw).unwrap()
}

pub fn msg(id: i64, author: &str, at: &str, contents: &str) -> Message {
    Message::new(CONVERSATION, id, author, ts(at), contents)
}

pub async fn store_with(messages: &[Message]) -> SqliteMessageStore {
    let store = SqliteMessageStore::new(connect(":memory:").await.unwrap());
    store.insert_batch(messages).await.unwrap();
    store
}

pub fn ids(messages: &[Message]) -> Vec<i64> {
    messages.iter().map(|m| m.message_id).collect()
}
