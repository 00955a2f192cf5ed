//! Token budgeting for the expanded context.
//!
//! Tokens are estimated as `ceil(chars / 4)` of each message's transcript
//! line. Trimming drops whole messages from the end of the flattened window
//! sequence, so later windows lose messages before earlier ones do.

use {
    dmrecall_common::Message,
    tracing::{debug, warn},
};

use crate::expander::ContextWindow;

/// The line a message contributes to the estimate.
pub fn estimate_line(message: &Message) -> String {
    format!(
        "User: {}, Date: {}, Contents: {}",
        message.author,
        message.date(),
        message.contents
    )
}

pub fn message_tokens(message: &Message) -> usize {
    estimate_line(message).chars().count().div_ceil(4)
}

pub fn estimate_tokens(windows: &[ContextWindow]) -> usize {
    windows
        .iter()
        .flat_map(|w| &w.messages)
        .map(message_tokens)
        .sum()
}

fn flattened_len(windows: &[ContextWindow]) -> usize {
    windows.iter().map(|w| w.messages.len()).sum()
}

/// Drop `count` messages from the end of the flattened sequence.
fn drop_tail(windows: &mut Vec<ContextWindow>, mut count: usize) {
    while count > 0 {
        let Some(last) = windows.last_mut() else {
            return;
        };
        let take = count.min(last.messages.len());
        last.messages.truncate(last.messages.len() - take);
        count -= take;
        if last.messages.is_empty() {
            windows.pop();
        }
    }
}

/// Trim `windows` until the estimate fits `budget`. Returns whether anything
/// was removed.
///
/// Each round drops 5% of the remaining messages (at least one) from the tail.
/// Windows left empty are removed.
pub fn trim_to_budget(windows: &mut Vec<ContextWindow>, budget: usize) -> bool {
    let before = estimate_tokens(windows);
    if before <= budget {
        return false;
    }

    let mut estimate = before;
    while estimate > budget && !windows.is_empty() {
        let step = flattened_len(windows).saturating_mul(5).div_ceil(100).max(1);
        drop_tail(windows, step);
        estimate = estimate_tokens(windows);
        debug!(dropped = step, estimate, "trimmed context tail");
    }
    warn!(
        before,
        after = estimate,
        budget,
        remaining = flattened_len(windows),
        "context over token budget, trimmed from the end"
    );
    true
}
