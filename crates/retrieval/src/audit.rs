//! Per-query audit trail: every successful summary is written to
//! `summary_{term}.txt`, never overwriting an earlier file.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use {
    tokio::io::{AsyncWrite, AsyncWriteExt},
    tracing::{debug, warn},
};

const MAX_TERM_CHARS: usize = 100;

/// File-name-safe form of a search term.
pub fn sanitize_search_term(term: &str) -> String {
    let replaced: String = term
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .take(MAX_TERM_CHARS)
        .collect();
    if replaced.trim().is_empty() {
        "query".to_string()
    } else {
        replaced
    }
}

fn candidate_name(stem: &str, attempt: u32) -> String {
    match attempt {
        1 => format!("summary_{stem}.txt"),
        n => format!("summary_{stem}-{n}.txt"),
    }
}

/// Write `contents` to the freshly created `path`, removing the file again if
/// the write fails so the name stays free.
async fn fill_new_file(
    path: &Path,
    mut file: impl AsyncWrite + Unpin,
    contents: &[u8],
) -> std::io::Result<()> {
    let written = match file.write_all(contents).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove partial summary");
        }
    }
    written
}

/// Write `summary` under `dir`, creating the directory if needed. On a name
/// collision `-2`, `-3`, ... is appended before the extension.
pub async fn write_summary(
    dir: &Path,
    search_term: &str,
    summary: &str,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let stem = sanitize_search_term(search_term);
    let mut attempt = 1;
    loop {
        let path = dir.join(candidate_name(&stem, attempt));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                fill_new_file(&path, file, summary.as_bytes()).await?;
                debug!(path = %path.display(), "wrote search summary");
                return Ok(path);
            },
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}
