/// Search service: runs one query through every retrieval stage in order.
use std::{path::PathBuf, sync::Arc};

use {
    dmrecall_archive::MessageStore,
    dmrecall_common::{Error, Result},
    tracing::{info, warn},
};

use crate::{
    audit,
    budget::{estimate_tokens, trim_to_budget},
    completion::CompletionProvider,
    config::RetrievalConfig,
    curator::curate,
    embeddings::EmbeddingProvider,
    expander::expand,
    ranker::{self, RankOptions},
    selector::{derive_keywords, parse_keyword_override, select_candidates},
    summarizer::summarize,
};

pub struct SearchService {
    config: RetrievalConfig,
    store: Arc<dyn MessageStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    completer: Arc<dyn CompletionProvider>,
}

/// What a query produced, stage by stage.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub summary: String,
    pub keywords: Vec<String>,
    pub candidates: usize,
    pub ranked: usize,
    pub curated: Vec<i64>,
    pub context_messages: usize,
    pub estimated_tokens: usize,
    pub trimmed: bool,
    pub audit_path: Option<PathBuf>,
}

impl SearchService {
    pub fn new(
        config: RetrievalConfig,
        store: Arc<dyn MessageStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            completer,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Answer `search_term` with a summary of the matching conversations.
    pub async fn process_query(
        &self,
        search_term: &str,
        keyword_override: Option<&str>,
        all_matches: bool,
    ) -> Result<String> {
        self.run(search_term, keyword_override, all_matches)
            .await
            .map(|outcome| outcome.summary)
    }

    /// Like [`Self::process_query`], but reports what each stage produced.
    pub async fn run(
        &self,
        search_term: &str,
        keyword_override: Option<&str>,
        all_matches: bool,
    ) -> Result<SearchOutcome> {
        let cfg = &self.config;
        let override_keywords = keyword_override
            .map(parse_keyword_override)
            .filter(|k| !k.is_empty());

        let keywords = match override_keywords {
            Some(keywords) => {
                info!(?keywords, "using keyword override");
                keywords
            },
            None => {
                if search_term.trim().is_empty() {
                    return Err(Error::InvalidQuery("search term is empty".into()));
                }
                derive_keywords(
                    self.completer.as_ref(),
                    search_term,
                    &cfg.participant_names,
                    cfg.keyword_limit,
                    cfg.keyword_max_tokens,
                )
                .await?
            },
        };

        let candidates = select_candidates(self.store.as_ref(), &keywords).await?;
        let candidate_count = candidates.len();

        let ranked = if all_matches {
            info!(
                candidates = candidate_count,
                "all-matches mode, skipping similarity ranking"
            );
            ranker::pass_through(candidates)
        } else {
            ranker::rank(
                self.embedder.as_ref(),
                search_term,
                candidates,
                RankOptions {
                    top_n: cfg.top_n,
                    embed_word_ceiling: cfg.embed_word_ceiling,
                    batch_size: cfg.embedding_batch_size,
                },
            )
            .await?
        };
        let ranked_count = ranked.len();

        let curated = curate(
            self.completer.as_ref(),
            search_term,
            ranked,
            &cfg.participant_names,
            cfg.curate_limit,
            cfg.max_tokens,
        )
        .await?;
        if curated.is_empty() {
            return Err(Error::NoResults(format!(
                "none of the {ranked_count} ranked messages were selected as relevant"
            )));
        }

        let mut windows = expand(
            self.store.as_ref(),
            &curated,
            cfg.context_window_minutes,
        )
        .await?;
        let trimmed = trim_to_budget(&mut windows, cfg.token_budget);
        let estimated_tokens = estimate_tokens(&windows);
        let context_messages: usize = windows.iter().map(|w| w.messages.len()).sum();
        info!(
            context_messages,
            estimated_tokens, trimmed, "context ready for summary"
        );
        if context_messages == 0 {
            return Err(Error::NoResults(format!(
                "no context left for the {} curated messages within a budget of {} tokens",
                curated.len(),
                cfg.token_budget
            )));
        }

        let summary = summarize(
            self.completer.as_ref(),
            search_term,
            &windows,
            &cfg.participant_names,
            cfg.conversation_id,
            cfg.max_tokens,
        )
        .await?;

        let audit_path = match &cfg.audit_dir {
            Some(dir) => match audit::write_summary(dir, search_term, &summary).await {
                Ok(path) => {
                    info!(path = %path.display(), "saved search summary");
                    Some(path)
                },
                Err(e) => {
                    warn!(error = %e, dir = %dir.display(), "failed to save search summary");
                    None
                },
            },
            None => None,
        };

        Ok(SearchOutcome {
            summary,
            keywords,
            candidates: candidate_count,
            ranked: ranked_count,
            curated: curated.iter().map(|r| r.message.message_id).collect(),
            context_messages,
            estimated_tokens,
            trimmed,
            audit_path,
        })
    }
}
