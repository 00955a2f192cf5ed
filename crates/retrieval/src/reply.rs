use tracing::{info, warn};

use crate::service::SearchService;

/// Longest message a Discord bot may post.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// A `/search` invocation from the chat boundary.
#[derive(Debug, Clone, Default)]
pub struct SearchCommand {
    pub search_term: String,
    pub keyword_override: Option<String>,
    pub send_all_matches: bool,
}

/// Text to post back, already split to fit the platform limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPayload {
    pub parts: Vec<String>,
    pub is_error: bool,
}

/// Posted immediately, before the (slow) query runs.
pub fn acknowledgement(command: &SearchCommand) -> String {
    format!(
        "Processing your request to find {}, please wait...",
        command.search_term
    )
}

/// Run the command and turn the summary, or the failure, into reply text.
pub async fn get_reply(service: &SearchService, command: &SearchCommand) -> ReplyPayload {
    info!(
        search_term = %command.search_term,
        keyword_override = command.keyword_override.as_deref().unwrap_or(""),
        all_matches = command.send_all_matches,
        "incoming search"
    );

    let (text, is_error) = match service
        .process_query(
            &command.search_term,
            command.keyword_override.as_deref(),
            command.send_all_matches,
        )
        .await
    {
        Ok(summary) => (summary, false),
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "search failed");
            (format!("Search failed: {e}"), true)
        },
    };

    ReplyPayload {
        parts: split_message(&text, DISCORD_MESSAGE_LIMIT),
        is_error,
    }
}

/// Split `text` into parts of at most `limit` characters, breaking after a
/// newline when one falls inside the part. Lines longer than `limit` are cut
/// at a character boundary.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut rest = text;
    while rest.chars().count() > limit {
        let hard_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let end = match rest[..hard_end].rfind('\n') {
            Some(newline) if newline > 0 => newline + 1,
            _ => hard_end,
        };
        let part = rest[..end].trim_end();
        if !part.is_empty() {
            parts.push(part.to_string());
        }
        rest = &rest[end..];
    }
    if !rest.trim().is_empty() || parts.is_empty() {
        parts.push(rest.trim_end().to_string());
    }
    parts
}
