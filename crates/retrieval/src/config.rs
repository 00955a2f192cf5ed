use std::path::PathBuf;

/// Configuration for the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Conversation the deep links in summaries point into.
    pub conversation_id: u64,
    /// Participant display names. Kept out of derived keywords and named in prompts.
    pub participant_names: Vec<String>,
    /// Upper bound on keywords requested from the completion capability.
    pub keyword_limit: usize,
    /// Candidates kept after embedding similarity ranking.
    pub top_n: usize,
    /// Upper bound on message ids the curator is asked for.
    pub curate_limit: usize,
    /// Half-width of the context window around each curated message.
    pub context_window_minutes: i64,
    /// Token budget for the expanded context (estimated as chars / 4).
    pub token_budget: usize,
    /// Running word-count ceiling for the texts sent to the embedder.
    pub embed_word_ceiling: usize,
    /// Texts per embedding request.
    pub embedding_batch_size: usize,
    /// Completion token cap for keyword derivation.
    pub keyword_max_tokens: u32,
    /// Completion token cap for curation and the summary.
    pub max_tokens: u32,
    /// Where per-query summaries are written. `None` disables the audit trail.
    pub audit_dir: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            conversation_id: 0,
            participant_names: Vec::new(),
            keyword_limit: 50,
            top_n: 200,
            curate_limit: 30,
            context_window_minutes: 60,
            token_budget: 128_000,
            embed_word_ceiling: 900_000,
            embedding_batch_size: 512,
            keyword_max_tokens: 1000,
            max_tokens: 2000,
            audit_dir: Some(PathBuf::from("searches")),
        }
    }
}
