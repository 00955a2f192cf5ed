use {
    chrono::TimeDelta,
    dmrecall_archive::MessageStore,
    dmrecall_common::{Error, Message, Result},
    tracing::info,
};

use crate::ranker::RankedMessage;

/// The messages around one curated message, oldest first.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    pub anchor_id: i64,
    pub messages: Vec<Message>,
}

/// Fetch `[ts - minutes, ts + minutes]` around every curated message.
///
/// Windows are neither merged nor deduplicated: two curated messages a few
/// minutes apart produce two heavily overlapping windows.
///
/// A negative width, or one that takes a window outside the representable
/// date range, is rejected as [`Error::InvalidQuery`].
pub async fn expand(
    store: &dyn MessageStore,
    curated: &[RankedMessage],
    minutes: i64,
) -> Result<Vec<ContextWindow>> {
    let half_width = TimeDelta::try_minutes(minutes)
        .filter(|w| *w >= TimeDelta::zero())
        .ok_or_else(|| {
            Error::InvalidQuery(format!("context window of {minutes} minutes is out of range"))
        })?;
    let mut windows = Vec::with_capacity(curated.len());
    for anchor in curated {
        let at = anchor.message.timestamp;
        let (Some(from), Some(to)) = (
            at.checked_sub_signed(half_width),
            at.checked_add_signed(half_width),
        ) else {
            return Err(Error::InvalidQuery(format!(
                "context window of {minutes} minutes around message {} is out of range",
                anchor.message.message_id
            )));
        };
        let messages = store.find_by_time_range(from, to).await?;
        windows.push(ContextWindow {
            anchor_id: anchor.message.message_id,
            messages,
        });
    }
    info!(
        windows = windows.len(),
        messages = windows.iter().map(|w| w.messages.len()).sum::<usize>(),
        "expanded curated messages into context windows"
    );
    Ok(windows)
}
