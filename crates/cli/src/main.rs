use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    anyhow::Context,
    chrono::{NaiveDate, Utc},
    clap::{Parser, Subcommand},
    dmrecall_archive::{
        MessageStore, SqliteMessageStore, connect,
        ingest::{IngestOptions, ingest_paths},
    },
    dmrecall_common::format_timestamp,
    dmrecall_config::DmrecallConfig,
    dmrecall_retrieval::{
        CompletionProvider, EmbeddingProvider, RetrievalConfig, SearchService,
        completion_openai::OpenAiCompletionProvider,
        digest::{DigestOptions, run_digest},
        embeddings_openai::OpenAiEmbeddingProvider,
    },
    secrecy::{ExposeSecret, Secret},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "dmrecall", version, about = "Search and summarize a direct-message archive")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./dmrecall.toml, then the user config dir).
    #[arg(long, global = true, env = "DMRECALL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about the conversation.
    Search {
        /// Search term; multiple words are joined with spaces.
        #[arg(required = true)]
        terms: Vec<String>,
        /// Literal keywords to match instead of derived ones (comma-separated, repeatable).
        #[arg(long)]
        keyword_override: Vec<String>,
        /// Send every keyword match to curation without similarity ranking.
        /// Common keywords can exceed the context budget.
        #[arg(long)]
        send_all_matches: bool,
        /// Give up after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Load JSON exports (files or directories) into the archive.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Delete the existing database first.
        #[arg(long)]
        fresh: bool,
    },
    /// Summarize the archive period by period.
    Digest {
        /// First day to summarize (YYYY-MM-DD). Defaults to the oldest message.
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long, default_value_t = 10)]
        max_chunks: usize,
    },
    /// Show archive statistics.
    Stats,
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

/// Pipeline settings from the config file; unset knobs keep the defaults.
fn retrieval_config(config: &DmrecallConfig) -> RetrievalConfig {
    let defaults = RetrievalConfig::default();
    let search = &config.search;
    RetrievalConfig {
        conversation_id: config.archive.conversation_id,
        participant_names: config.participant_names(),
        keyword_limit: search.keyword_limit.unwrap_or(defaults.keyword_limit),
        top_n: search.top_n.unwrap_or(defaults.top_n),
        curate_limit: search.curate_limit.unwrap_or(defaults.curate_limit),
        context_window_minutes: search
            .context_window_minutes
            .unwrap_or(defaults.context_window_minutes),
        token_budget: search.token_budget.unwrap_or(defaults.token_budget),
        embed_word_ceiling: search
            .embed_word_ceiling
            .unwrap_or(defaults.embed_word_ceiling),
        embedding_batch_size: search
            .embedding_batch_size
            .unwrap_or(defaults.embedding_batch_size),
        keyword_max_tokens: config.openai.keyword_max_tokens,
        max_tokens: config.openai.max_tokens,
        audit_dir: config.audit.enabled.then(|| config.audit.dir.clone()),
    }
}

fn api_key(config: &DmrecallConfig) -> anyhow::Result<Secret<String>> {
    config
        .openai
        .api_key
        .as_ref()
        .map(|key| Secret::new(key.expose_secret().clone()))
        .context("no OpenAI API key configured")
}

fn completion_provider(config: &DmrecallConfig) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    Ok(Arc::new(
        OpenAiCompletionProvider::new(api_key(config)?)
            .with_base_url(config.openai.base_url.clone())
            .with_model(config.openai.chat_model.clone()),
    ))
}

fn embedding_provider(config: &DmrecallConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(
        OpenAiEmbeddingProvider::new(api_key(config)?)
            .with_base_url(config.openai.base_url.clone())
            .with_model(
                config.openai.embedding_model.clone(),
                config.openai.embedding_dimensions,
            ),
    ))
}

async fn open_store(config: &DmrecallConfig) -> anyhow::Result<SqliteMessageStore> {
    let pool = connect(&config.archive.db_path)
        .await
        .with_context(|| format!("failed to open archive at {}", config.archive.db_path))?;
    Ok(SqliteMessageStore::new(pool))
}

async fn remove_database(db_path: &str) -> anyhow::Result<()> {
    if db_path == ":memory:" {
        return Ok(());
    }
    let path = Path::new(db_path);
    if tokio::fs::try_exists(path).await? {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("failed to remove {}", path.display()))?;
        warn!(path = %path.display(), "removed existing archive");
    }
    Ok(())
}

async fn search(
    config: &DmrecallConfig,
    terms: &[String],
    keyword_override: &[String],
    send_all_matches: bool,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    config.validate()?;
    let service = SearchService::new(
        retrieval_config(config),
        Arc::new(open_store(config).await?),
        embedding_provider(config)?,
        completion_provider(config)?,
    );

    let search_term = terms.join(" ");
    let keyword_override = (!keyword_override.is_empty()).then(|| keyword_override.join(","));
    let query = service.run(&search_term, keyword_override.as_deref(), send_all_matches);
    let outcome = match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), query)
            .await
            .with_context(|| format!("search timed out after {secs}s"))??,
        None => query.await?,
    };

    info!(
        keywords = outcome.keywords.len(),
        candidates = outcome.candidates,
        ranked = outcome.ranked,
        curated = outcome.curated.len(),
        context_messages = outcome.context_messages,
        estimated_tokens = outcome.estimated_tokens,
        trimmed = outcome.trimmed,
        "search finished"
    );
    println!("{}", outcome.summary);
    Ok(())
}

async fn ingest(config: &DmrecallConfig, paths: &[PathBuf], fresh: bool) -> anyhow::Result<()> {
    config.validate_archive()?;
    if fresh {
        remove_database(&config.archive.db_path).await?;
    }
    let store = open_store(config).await?;
    let options = IngestOptions {
        conversation_id: config.archive.conversation_id,
        participants: config.participants.clone(),
    };
    let report = ingest_paths(&store, paths, &options).await?;

    println!(
        "Inserted {} messages from {} files ({} in archive)",
        report.messages, report.files, report.total_in_store
    );
    for (author, count) in &report.per_author {
        println!("  {author}: {count}");
    }
    Ok(())
}

async fn digest(
    config: &DmrecallConfig,
    start_date: Option<NaiveDate>,
    max_chunks: usize,
) -> anyhow::Result<()> {
    config.validate()?;
    let store = open_store(config).await?;
    let completer = completion_provider(config)?;
    let options = DigestOptions {
        period_days: config.digest.period_days,
        chunk_chars: config.digest.chunk_chars,
        max_chunks,
        max_tokens: config.digest.max_tokens,
    };

    let summaries = run_digest(
        &store,
        completer.as_ref(),
        start_date,
        &options,
        Utc::now().naive_utc(),
    )
    .await?;
    if summaries.is_empty() {
        println!("No messages to summarize.");
    }
    for period in &summaries {
        println!(
            "Summary for {} to {} ({} messages):\n{}\n",
            format_timestamp(&period.first),
            format_timestamp(&period.last),
            period.messages,
            period.summary
        );
    }
    Ok(())
}

async fn stats(config: &DmrecallConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    println!("Messages: {}", store.count().await?);
    if let Some(first) = store.first_timestamp().await? {
        println!("First message: {}", format_timestamp(&first));
    }
    for (author, count) in store.author_counts().await? {
        println!("  {author}: {count}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let config = dmrecall_config::load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Search {
            terms,
            keyword_override,
            send_all_matches,
            timeout_secs,
        } => {
            search(
                &config,
                terms,
                keyword_override,
                *send_all_matches,
                *timeout_secs,
            )
            .await
        },
        Commands::Ingest { paths, fresh } => ingest(&config, paths, *fresh).await,
        Commands::Digest {
            start_date,
            max_chunks,
        } => digest(&config, *start_date, *max_chunks).await,
        Commands::Stats => stats(&config).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn search_flags_parse() {
        let cli = Cli::try_parse_from([
            "dmrecall",
            "search",
            "that",
            "pizza",
            "place",
            "--keyword-override",
            "pizza",
            "--keyword-override",
            "pepperoni, slice",
            "--send-all-matches",
            "--timeout-secs",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                terms,
                keyword_override,
                send_all_matches,
                timeout_secs,
            } => {
                assert_eq!(terms.join(" "), "that pizza place");
                assert_eq!(keyword_override.join(","), "pizza,pepperoni, slice");
                assert!(send_all_matches);
                assert_eq!(timeout_secs, Some(30));
            },
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn digest_start_date_parses() {
        let cli =
            Cli::try_parse_from(["dmrecall", "digest", "--start-date", "2024-01-15"]).unwrap();
        match cli.command {
            Commands::Digest {
                start_date,
                max_chunks,
            } => {
                assert_eq!(start_date, NaiveDate::from_ymd_opt(2024, 1, 15));
                assert_eq!(max_chunks, 10);
            },
            _ => panic!("expected digest"),
        }
    }

    #[test]
    fn search_requires_a_term() {
        assert!(Cli::try_parse_from(["dmrecall", "search"]).is_err());
    }

    #[test]
    fn config_overrides_reach_the_pipeline() {
        let raw = r#"
            [archive]
            conversation_id = 42

            [participants]
            "111" = "bob"
            "222" = "alice"

            [search]
            top_n = 50
            context_window_minutes = 30

            [audit]
            enabled = false
        "#;
        let config = dmrecall_config::parse_config(raw, Path::new("dmrecall.toml")).unwrap();
        let retrieval = retrieval_config(&config);
        assert_eq!(retrieval.conversation_id, 42);
        assert_eq!(retrieval.participant_names, vec!["alice", "bob"]);
        assert_eq!(retrieval.top_n, 50);
        assert_eq!(retrieval.context_window_minutes, 30);
        assert_eq!(retrieval.curate_limit, 30);
        assert!(retrieval.audit_dir.is_none());
    }

    #[tokio::test]
    async fn fresh_ingest_removes_the_old_database() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("messages.db");
        std::fs::write(&db, "stale").unwrap();
        remove_database(db.to_str().unwrap()).await.unwrap();
        assert!(!db.exists());
        remove_database(db.to_str().unwrap()).await.unwrap();
        remove_database(":memory:").await.unwrap();
    }
}
