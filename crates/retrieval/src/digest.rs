//! Period digest: walk the archive in fixed-length periods and ask for one
//! overview paragraph per chunk of messages.

use {
    chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta},
    dmrecall_archive::MessageStore,
    dmrecall_common::{Error, Message, Result, format_timestamp},
    tracing::{debug, info},
};

use crate::completion::{CompletionProvider, CompletionRequest};

#[derive(Debug, Clone)]
pub struct DigestOptions {
    pub period_days: i64,
    /// Upper bound on summed message contents per chunk, in characters.
    pub chunk_chars: usize,
    /// Stop after this many chunks have been summarized.
    pub max_chunks: usize,
    pub max_tokens: u32,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            period_days: 14,
            chunk_chars: 29_500,
            max_chunks: 10,
            max_tokens: 1000,
        }
    }
}

/// Overview of one chunk of messages.
#[derive(Debug, Clone)]
pub struct PeriodSummary {
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub messages: usize,
    pub summary: String,
}

/// Group consecutive messages so each group's contents total at most
/// `max_chars`. A single longer message gets a chunk of its own.
pub fn chunk_by_chars(messages: Vec<Message>, max_chars: usize) -> Vec<Vec<Message>> {
    let mut chunks = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_len = 0usize;
    for message in messages {
        let len = message.contents.chars().count();
        if !current.is_empty() && current_len + len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += len;
        current.push(message);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub fn digest_prompt(chunk: &[Message]) -> String {
    let (first, last) = match (chunk.first(), chunk.last()) {
        (Some(first), Some(last)) => (
            format_timestamp(&first.timestamp),
            format_timestamp(&last.timestamp),
        ),
        _ => (String::new(), String::new()),
    };
    let conversation = chunk
        .iter()
        .map(|m| {
            format!(
                "User: {}\nTimestamp: {}\nContents: {}\nmessage_id: {}",
                m.author,
                format_timestamp(&m.timestamp),
                m.contents,
                m.message_id
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given the messages between two friends from {first} to {last}, summarize the main \
         things that went on in the period as one large paragraph. Focus on important events \
         and on things that happened repeatedly. Describe the period as a single unit while \
         keeping things in order, and mention dates only when necessary. Always include user \
         names. Never mention hours, minutes or seconds unless it matters when a conversation \
         started:\n\n{conversation}\n"
    )
}

/// Summarize the archive from `start` (or the first stored day) onward.
///
/// Periods are `[day, day + period_days)`. Empty periods are skipped. The walk
/// ends once `max_chunks` summaries exist or the next period starts after `now`.
pub async fn run_digest(
    store: &dyn MessageStore,
    completer: &dyn CompletionProvider,
    start: Option<NaiveDate>,
    options: &DigestOptions,
    now: NaiveDateTime,
) -> Result<Vec<PeriodSummary>> {
    let start = match start {
        Some(day) => day,
        None => match store.first_timestamp().await? {
            Some(ts) => ts.date(),
            None => {
                info!("archive is empty, nothing to digest");
                return Ok(Vec::new());
            },
        },
    };

    let period = TimeDelta::try_days(options.period_days)
        .filter(|p| *p > TimeDelta::zero())
        .ok_or_else(|| {
            Error::InvalidQuery(format!(
                "digest period of {} days is out of range",
                options.period_days
            ))
        })?;
    let mut period_start = start.and_time(NaiveTime::MIN);
    let mut summaries = Vec::new();

    while summaries.len() < options.max_chunks {
        let Some(period_end) = period_start.checked_add_signed(period) else {
            return Err(Error::InvalidQuery(format!(
                "digest period starting {period_start} runs past the last representable date"
            )));
        };
        let messages = store
            .find_by_time_range(period_start, period_end - TimeDelta::seconds(1))
            .await?;
        if messages.is_empty() {
            debug!(start = %period_start, "empty period, skipping");
        }

        for chunk in chunk_by_chars(messages, options.chunk_chars) {
            let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
                continue;
            };
            let (first, last) = (first.timestamp, last.timestamp);
            let request = CompletionRequest::new(digest_prompt(&chunk), options.max_tokens);
            let summary = completer
                .complete(&request)
                .await
                .map_err(|e| Error::Completion(format!("digest: {e:#}")))?;
            info!(
                first = %first,
                last = %last,
                messages = chunk.len(),
                "summarized period chunk"
            );
            summaries.push(PeriodSummary {
                first,
                last,
                messages: chunk.len(),
                summary: summary.trim().to_string(),
            });
            if summaries.len() >= options.max_chunks {
                break;
            }
        }

        period_start = period_end;
        if period_start >= now {
            break;
        }
    }
    Ok(summaries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::test_support::*};

    fn options(max_chunks: usize) -> DigestOptions {
        DigestOptions {
            max_chunks,
            ..DigestOptions::default()
        }
    }

    #[test]
    fn chunks_respect_the_char_limit() {
        let msgs = vec![
            msg(1, "a", "2024-01-01 10:00:00", "aaaa"),
            msg(2, "a", "2024-01-01 10:01:00", "bbbb"),
            msg(3, "a", "2024-01-01 10:02:00", "cccccccccccc"),
            msg(4, "a", "2024-01-01 10:03:00", "d"),
        ];
        let chunks = chunk_by_chars(msgs, 10);
        let sizes: Vec<Vec<i64>> = chunks.iter().map(|c| ids(c)).collect();
        assert_eq!(sizes, vec![vec![1, 2], vec![3], vec![4]]);
        assert!(chunk_by_chars(Vec::new(), 10).is_empty());
    }

    #[test]
    fn prompt_covers_the_chunk_span() {
        let prompt = digest_prompt(&[
            msg(1, "alice", "2024-01-01 10:00:00", "hi"),
            msg(2, "bob", "2024-01-03 11:00:00", "hey"),
        ]);
        assert!(prompt.contains("from 2024-01-01 10:00:00 to 2024-01-03 11:00:00"));
        assert!(prompt.contains(
            "User: bob\nTimestamp: 2024-01-03 11:00:00\nContents: hey\nmessage_id: 2"
        ));
    }

    #[tokio::test]
    async fn walks_periods_and_skips_gaps() {
        let store = store_with(&[
            msg(1, "alice", "2024-01-01 10:00:00", "new year"),
            msg(2, "bob", "2024-01-14 23:59:59", "last of period one"),
            msg(3, "alice", "2024-01-15 00:00:00", "period two"),
            msg(4, "bob", "2024-03-01 09:00:00", "after a gap"),
        ])
        .await;
        let completer = ScriptedCompleter::new(["one", "two", "three"]);

        let now = ts("2024-03-20 00:00:00");
        let summaries = run_digest(&store, &completer, None, &options(10), now)
            .await
            .unwrap();

        let counts: Vec<usize> = summaries.iter().map(|s| s.messages).collect();
        assert_eq!(counts, vec![2, 1, 1]);
        assert_eq!(summaries[2].summary, "three");
        assert_eq!(summaries[1].first, ts("2024-01-15 00:00:00"));
        assert_eq!(completer.calls(), 3);
    }

    #[tokio::test]
    async fn stops_at_max_chunks() {
        let store = store_with(&[
            msg(1, "alice", "2024-01-01 10:00:00", "a"),
            msg(2, "alice", "2024-01-20 10:00:00", "b"),
        ])
        .await;
        let completer = ScriptedCompleter::new(["one", "two"]);

        let now = ts("2024-03-01 00:00:00");
        let summaries = run_digest(&store, &completer, None, &options(1), now)
            .await
            .unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(completer.calls(), 1);
    }

    #[tokio::test]
    async fn explicit_start_and_empty_archive() {
        let store = store_with(&[
            msg(1, "alice", "2024-01-01 10:00:00", "early"),
            msg(2, "alice", "2024-02-01 10:00:00", "later"),
        ])
        .await;
        let completer = ScriptedCompleter::new(["later"]);
        let start = NaiveDate::from_ymd_opt(2024, 1, 25);

        let now = ts("2024-02-10 00:00:00");
        let summaries = run_digest(&store, &completer, start, &options(10), now)
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].first, ts("2024-02-01 10:00:00"));

        let empty = store_with(&[]).await;
        let none = run_digest(&empty, &completer, None, &options(10), now)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_periods_are_rejected() {
        let store = store_with(&[msg(1, "alice", "2024-01-01 10:00:00", "hi")]).await;
        let completer = ScriptedCompleter::new(Vec::<String>::new());
        let now = ts("2024-02-01 00:00:00");

        for period_days in [0, -14, i64::MAX / 2] {
            let options = DigestOptions {
                period_days,
                ..DigestOptions::default()
            };
            let err = run_digest(&store, &completer, None, &options, now)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidQuery(_)), "{period_days}: {err}");
        }

        let options = DigestOptions {
            period_days: 200_000_000,
            ..DigestOptions::default()
        };
        let err = run_digest(&store, &completer, None, &options, now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        assert_eq!(completer.calls(), 0);
    }
}
