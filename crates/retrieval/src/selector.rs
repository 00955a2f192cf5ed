//! Candidate selection: query → keyword set → substring matches.

use {
    dmrecall_archive::MessageStore,
    dmrecall_common::{Error, Message, Result},
    tracing::{info, warn},
};

use crate::{
    completion::{CompletionProvider, CompletionRequest},
    decoder::decode_keywords,
};

/// Split a comma-separated override into literal keywords.
pub fn parse_keyword_override(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn keyword_prompt(query: &str, participant_names: &[String], limit: usize) -> String {
    let people = describe_participants(participant_names);
    format!(
        "Given the query: '{query}', return ONLY a JSON object of keywords to search the \
         direct-message history between {people}. The keywords are matched as literal, \
         case-sensitive substrings against every message, and the messages around each hit \
         are read afterwards, so pick words and phrases whose nearby messages are likely to \
         be about the query. Return about {limit} keywords, sorted by how likely they are to \
         give correct hits that are not false positives. Focus on phrases and expressions \
         people would actually use in this context. Exclude common words and the \
         participants' names.\n\
         ONLY RESPOND WITH JSON in the form {{\"keywords\": [\"keyword1\", \"keyword2\"]}}"
    )
}

pub(crate) fn describe_participants(names: &[String]) -> String {
    match names {
        [] => "two friends".to_string(),
        [one] => format!("{one} and a friend"),
        [first, second] => format!("two friends named {first} and {second}"),
        [init @ .., last] => format!("friends named {} and {last}", init.join(", ")),
    }
}

/// Ask the completion capability for search keywords.
///
/// Participant names are removed even if the model returns them, and the list
/// is capped at `limit`. An unparseable response is a `MalformedResponse`
/// carrying the raw text; there is no fallback keyword source.
pub async fn derive_keywords(
    completer: &dyn CompletionProvider,
    query: &str,
    participant_names: &[String],
    limit: usize,
    max_tokens: u32,
) -> Result<Vec<String>> {
    let request = CompletionRequest::new(
        keyword_prompt(query, participant_names, limit),
        max_tokens,
    );
    let raw = completer
        .complete(&request)
        .await
        .map_err(|e| Error::Completion(format!("keyword derivation: {e:#}")))?;

    let mut keywords = decode_keywords(&raw).map_err(|e| Error::MalformedResponse {
        stage: "keyword",
        reason: e.to_string(),
        raw: raw.clone(),
    })?;

    let before = keywords.len();
    keywords.retain(|k| {
        !participant_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(k) || format!("@{name}").eq_ignore_ascii_case(k))
    });
    if keywords.len() < before {
        warn!(
            removed = before - keywords.len(),
            "dropped participant names from derived keywords"
        );
    }
    keywords.truncate(limit);
    info!(keywords = keywords.len(), "derived search keywords");
    Ok(keywords)
}

/// Fetch every message matching at least one keyword.
///
/// Zero matches is `NoResults`: the pipeline stops here.
pub async fn select_candidates(
    store: &dyn MessageStore,
    keywords: &[String],
) -> Result<Vec<Message>> {
    let candidates = store.find_by_substring(keywords).await?;
    info!(
        candidates = candidates.len(),
        keywords = keywords.len(),
        "initial matching messages"
    );
    if candidates.is_empty() {
        return Err(Error::NoResults(format!(
            "no messages matched any of {} keywords",
            keywords.len()
        )));
    }
    Ok(candidates)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::test_support::*};

    fn names() -> Vec<String> {
        vec!["alice".into(), "bob".into()]
    }

    #[test]
    fn override_is_split_and_trimmed() {
        assert_eq!(
            parse_keyword_override(" pizza, it's ,, pepperoni pie "),
            vec!["pizza", "it's", "pepperoni pie"]
        );
        assert!(parse_keyword_override(" , ").is_empty());
    }

    #[test]
    fn prompt_names_participants_and_limit() {
        let prompt = keyword_prompt("that pizza place", &names(), 50);
        assert!(prompt.contains("'that pizza place'"));
        assert!(prompt.contains("two friends named alice and bob"));
        assert!(prompt.contains("about 50 keywords"));
    }

    #[test]
    fn participant_descriptions() {
        assert_eq!(describe_participants(&[]), "two friends");
        assert_eq!(
            describe_participants(&["a".into(), "b".into(), "c".into()]),
            "friends named a, b and c"
        );
    }

    #[tokio::test]
    async fn derived_keywords_exclude_names_and_respect_limit() {
        let completer = ScriptedCompleter::new([
            r#"```json
{"keywords": ["Alice", "pizza", "@bob", "pepperoni", "slice"]}
```"#,
        ]);
        let keywords = derive_keywords(&completer, "pizza", &names(), 2, 1000)
            .await
            .unwrap();
        assert_eq!(keywords, vec!["pizza", "pepperoni"]);
        assert_eq!(completer.prompts.lock().unwrap()[0].max_tokens, 1000);
    }

    #[tokio::test]
    async fn malformed_keyword_response_surfaces_raw_text() {
        let completer = ScriptedCompleter::new(["I can't help with that."]);
        let err = derive_keywords(&completer, "pizza", &names(), 50, 1000)
            .await
            .unwrap_err();
        match err {
            Error::MalformedResponse { stage, raw, .. } => {
                assert_eq!(stage, "keyword");
                assert_eq!(raw, "I can't help with that.");
            },
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn completion_failure_is_fatal() {
        let completer = ScriptedCompleter::new(Vec::<String>::new());
        completer.push_error("timeout");
        let err = derive_keywords(&completer, "pizza", &names(), 50, 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Completion(_)));
    }

    #[tokio::test]
    async fn candidates_or_no_results() {
        let store = store_with(&[
            msg(1, "alice", "2024-01-01 10:00:00", "pizza tonight?"),
            msg(2, "bob", "2024-01-01 10:01:00", "sure"),
        ])
        .await;

        let found = select_candidates(&store, &["pizza".into()]).await.unwrap();
        assert_eq!(ids(&found), vec![1]);

        let err = select_candidates(&store, &["sushi".into()]).await.unwrap_err();
        assert!(matches!(err, Error::NoResults(_)));

        let err = select_candidates(&store, &[]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }
}
