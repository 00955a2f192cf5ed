use {
    dmrecall_common::{Error, Message, Result, format_timestamp, link_template},
    tracing::info,
};

use crate::{
    completion::{CompletionProvider, CompletionRequest},
    expander::ContextWindow,
    selector::describe_participants,
};

fn transcript_line(message: &Message) -> String {
    format!(
        "User: {}, Timestamp: {}, message_id: {}, Contents: {}",
        message.author,
        format_timestamp(&message.timestamp),
        message.message_id,
        message.contents
    )
}

/// One line per message, windows separated by a blank line.
pub fn transcript(windows: &[ContextWindow]) -> String {
    windows
        .iter()
        .map(|w| {
            w.messages
                .iter()
                .map(transcript_line)
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn summary_prompt(
    query: &str,
    windows: &[ContextWindow],
    participant_names: &[String],
    conversation_id: u64,
) -> String {
    let example_link = link_template(conversation_id);
    format!(
        "Given the original query: '{query}', and the following messages between {people}, \
         answer the query by summarizing at least 1 but not more than 5 occurrences of it. \
         Start with a short paragraph summarizing the answer, especially if the query asked \
         for a summary, before listing the occurrences. For each occurrence give one link to \
         its most relevant message, considering who sent it and what the query asks. Summarize \
         each conversation's main point rather than only its best message. Avoid flowery \
         language. Quote messages when they are especially funny or poignant. Links look like \
         {example_link} and must always include the {conversation_id} segment or they will not \
         work. Write links as raw URLs, never as markdown, never inside parentheses or \
         brackets. Describe the year, month, day and time of day of each occurrence. \
         Here are the messages:\n\n{conversations}\n",
        people = describe_participants(participant_names),
        conversations = transcript(windows),
    )
}

/// Ask for the final answer. The response is returned as-is apart from
/// surrounding whitespace.
pub async fn summarize(
    completer: &dyn CompletionProvider,
    query: &str,
    windows: &[ContextWindow],
    participant_names: &[String],
    conversation_id: u64,
    max_tokens: u32,
) -> Result<String> {
    let request = CompletionRequest::new(
        summary_prompt(query, windows, participant_names, conversation_id),
        max_tokens,
    );
    let summary = completer
        .complete(&request)
        .await
        .map_err(|e| Error::Completion(format!("summary: {e:#}")))?;
    let summary = summary.trim().to_string();
    if summary.is_empty() {
        return Err(Error::Completion("summary response was empty".into()));
    }
    info!(chars = summary.len(), "summarized context windows");
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::test_support::*};

    fn windows() -> Vec<ContextWindow> {
        vec![
            ContextWindow {
                anchor_id: 1,
                messages: vec![
                    msg(1, "alice", "2024-01-01 12:00:00", "pizza?"),
                    msg(2, "bob", "2024-01-01 12:01:30", "yes"),
                ],
            },
            ContextWindow {
                anchor_id: 9,
                messages: vec![msg(9, "bob", "2024-02-01 08:00:00", "more pizza")],
            },
        ]
    }

    #[test]
    fn transcript_separates_windows() {
        assert_eq!(
            transcript(&windows()),
            "User: alice, Timestamp: 2024-01-01 12:00:00, message_id: 1, Contents: pizza?\n\
             User: bob, Timestamp: 2024-01-01 12:01:30, message_id: 2, Contents: yes\n\
             \n\
             User: bob, Timestamp: 2024-02-01 08:00:00, message_id: 9, Contents: more pizza"
        );
    }

    #[test]
    fn prompt_carries_link_format_and_query() {
        let names = ["alice".to_string(), "bob".to_string()];
        let prompt = summary_prompt("pizza nights", &windows(), &names, 42);
        assert!(prompt.contains("'pizza nights'"));
        assert!(prompt.contains("https://discord.com/channels/@me/42/message_id"));
        assert!(prompt.contains("two friends named alice and bob"));
        assert!(prompt.contains("message_id: 9, Contents: more pizza"));
    }

    #[tokio::test]
    async fn returns_trimmed_response() {
        let completer = ScriptedCompleter::new([
            "  They ate pizza.\nhttps://discord.com/channels/@me/42/1 \n",
        ]);
        let summary = summarize(&completer, "pizza", &windows(), &[], 42, 2000)
            .await
            .unwrap();
        assert_eq!(summary, "They ate pizza.\nhttps://discord.com/channels/@me/42/1");
        assert_eq!(completer.prompts.lock().unwrap()[0].max_tokens, 2000);
    }

    #[tokio::test]
    async fn empty_summary_is_an_error() {
        let completer = ScriptedCompleter::new(["   "]);
        let err = summarize(&completer, "pizza", &windows(), &[], 42, 2000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Completion(_)));
    }
}
