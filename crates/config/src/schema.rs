use std::{collections::HashMap, path::PathBuf};

use {secrecy::Secret, serde::Deserialize};

/// Root of `dmrecall.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DmrecallConfig {
    pub archive: ArchiveConfig,
    /// Participant id → display name. Used to resolve mentions at ingestion
    /// and kept out of derived search keywords.
    pub participants: HashMap<String, String>,
    pub openai: OpenAiConfig,
    pub search: SearchConfig,
    pub audit: AuditConfig,
    pub digest: DigestConfig,
}

impl DmrecallConfig {
    /// Participant display names, sorted.
    pub fn participant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.participants.values().cloned().collect();
        names.sort();
        names.dedup();
        names
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// SQLite database file, or `:memory:`.
    pub db_path: String,
    /// The direct-message conversation every deep link points into.
    pub conversation_id: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            db_path: "database/messages.db".into(),
            conversation_id: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Falls back to `OPENAI_API_KEY`, `OPENAI_KEY`, then `OPENAI_KEY.txt`.
    pub api_key: Option<Secret<String>>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    /// Completion token cap for keyword derivation.
    pub keyword_max_tokens: u32,
    /// Completion token cap for curation and summaries.
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".into(),
            chat_model: "gpt-4o".into(),
            embedding_model: "text-embedding-3-large".into(),
            embedding_dimensions: 3072,
            keyword_max_tokens: 1000,
            max_tokens: 2000,
        }
    }
}

/// Retrieval knobs. Unset values keep the pipeline defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub keyword_limit: Option<usize>,
    pub top_n: Option<usize>,
    pub curate_limit: Option<usize>,
    pub context_window_minutes: Option<i64>,
    pub token_budget: Option<usize>,
    pub embed_word_ceiling: Option<usize>,
    pub embedding_batch_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Directory the per-query summary files are written to.
    pub dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("searches"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub period_days: i64,
    pub chunk_chars: usize,
    pub max_tokens: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            period_days: 14,
            chunk_chars: 29_500,
            max_tokens: 1000,
        }
    }
}
