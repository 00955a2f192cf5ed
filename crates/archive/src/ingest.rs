//! Load chat export files into the archive.
//!
//! An export is one JSON file per participant holding an array of
//! `{"ID", "Timestamp", "Contents", "Attachments"}` records. The file stem is
//! the author's display name.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use {
    anyhow::Context,
    chrono::{DateTime, NaiveDateTime, Timelike},
    dmrecall_common::{Message, parse_timestamp},
    serde::{Deserialize, Deserializer},
    tracing::{debug, info, warn},
    walkdir::WalkDir,
};

use crate::store::MessageStore;

/// Settings that turn raw export records into archived messages.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Conversation the deep links point into.
    pub conversation_id: u64,
    /// Participant id → display name, used to resolve `<@id>` mentions.
    pub participants: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ExportRecord {
    #[serde(rename = "ID", deserialize_with = "id_from_number_or_string")]
    id: i64,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Contents", default)]
    contents: String,
    #[serde(rename = "Attachments", default)]
    attachments: String,
}

fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: usize,
    pub messages: usize,
    pub total_in_store: u64,
    pub per_author: Vec<(String, u64)>,
}

/// Replace `<@id>` and `<@!id>` mentions of known participants with `@Name`.
pub fn resolve_mentions(contents: &str, participants: &HashMap<String, String>) -> String {
    let mut out = contents.to_string();
    for (id, name) in participants {
        out = out
            .replace(&format!("<@{id}>"), &format!("@{name}"))
            .replace(&format!("<@!{id}>"), &format!("@{name}"));
    }
    out
}

/// Accepts the archive format as well as RFC 3339 / ISO timestamps with an
/// offset, normalised to UTC and truncated to whole seconds.
fn parse_export_timestamp(raw: &str) -> anyhow::Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = parse_timestamp(raw) {
        return Ok(ts);
    }
    let with_offset = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .with_context(|| format!("unrecognised timestamp {raw:?}"))?;
    let naive = with_offset.naive_utc();
    Ok(naive.with_nanosecond(0).unwrap_or(naive))
}

fn author_from_path(path: &Path) -> anyhow::Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .with_context(|| format!("cannot derive author from {}", path.display()))
}

/// Parse one export file into messages, in file order.
pub fn load_export(path: &Path, options: &IngestOptions) -> anyhow::Result<Vec<Message>> {
    let author = author_from_path(path)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: Vec<ExportRecord> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    records
        .into_iter()
        .map(|record| -> anyhow::Result<Message> {
            let timestamp = parse_export_timestamp(&record.timestamp)
                .with_context(|| format!("message {} in {}", record.id, path.display()))?;
            Ok(Message::new(
                options.conversation_id,
                record.id,
                author.clone(),
                timestamp,
                resolve_mentions(&record.contents, &options.participants),
            )
            .with_attachments(record.attachments))
        })
        .collect()
}

/// Expand files and directories into the list of `*.json` export files, sorted
/// per directory for a stable ingestion order.
pub fn collect_export_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            warn!(path = %path.display(), "export path does not exist, skipping");
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .flatten()
            .map(|entry| entry.into_path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

/// Load every export under `paths` into `store`.
///
/// Each file is written in its own transaction; the first failing file aborts
/// the run.
pub async fn ingest_paths(
    store: &dyn MessageStore,
    paths: &[PathBuf],
    options: &IngestOptions,
) -> anyhow::Result<IngestReport> {
    let files = collect_export_files(paths);
    if files.is_empty() {
        anyhow::bail!("no export files found");
    }

    let mut report = IngestReport::default();
    for file in &files {
        let messages = load_export(file, options)?;
        debug!(path = %file.display(), messages = messages.len(), "parsed export file");
        let written = store
            .insert_batch(&messages)
            .await
            .with_context(|| format!("failed to store messages from {}", file.display()))?;
        info!(path = %file.display(), messages = written, "ingested export file");
        report.files += 1;
        report.messages += written;
    }

    report.total_in_store = store.count().await?;
    report.per_author = store.author_counts().await?;
    Ok(report)
}
