//! LLM curation of the ranked set down to the messages worth reading.

use std::collections::HashSet;

use {
    dmrecall_common::{Error, Result},
    serde::Serialize,
    tracing::{info, warn},
};

use crate::{
    completion::{CompletionProvider, CompletionRequest},
    decoder::decode_message_ids,
    ranker::RankedMessage,
    selector::describe_participants,
};

#[derive(Serialize)]
struct CandidateView<'a> {
    id: i64,
    author: &'a str,
    text: &'a str,
}

pub fn curation_prompt(
    search_term: &str,
    ranked: &[RankedMessage],
    participant_names: &[String],
    limit: usize,
) -> String {
    let view: Vec<CandidateView<'_>> = ranked
        .iter()
        .map(|r| CandidateView {
            id: r.message.message_id,
            author: &r.message.author,
            text: &r.message.contents,
        })
        .collect();
    // Serializing plain structs of strings and integers cannot fail.
    let listing = serde_json::to_string(&view).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Given the search term: '{search_term}', select the most relevant messages from the \
         following list, up to {limit} if they do seem relevant. The messages are between {}. \
         Return ONLY the IDs of the selected messages as a JSON array:\n\n{listing}\n\n\
         ONLY RESPOND WITH THE MESSAGE IDs IN JSON.",
        describe_participants(participant_names)
    )
}

/// Keep the ranked messages whose ids the model picked, in ranked order.
///
/// Unknown ids are dropped. A response that cannot be decoded is logged and
/// treated as an empty selection; a transport failure is fatal.
pub async fn curate(
    completer: &dyn CompletionProvider,
    search_term: &str,
    ranked: Vec<RankedMessage>,
    participant_names: &[String],
    limit: usize,
    max_tokens: u32,
) -> Result<Vec<RankedMessage>> {
    let request = CompletionRequest::new(
        curation_prompt(search_term, &ranked, participant_names, limit),
        max_tokens,
    );
    let raw = completer
        .complete(&request)
        .await
        .map_err(|e| Error::Completion(format!("curation: {e:#}")))?;

    let picked: HashSet<i64> = match decode_message_ids(&raw) {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            warn!(error = %e, raw = %raw, "could not decode curated ids, selecting nothing");
            HashSet::new()
        },
    };

    let offered = ranked.len();
    let curated: Vec<RankedMessage> = ranked
        .into_iter()
        .filter(|r| picked.contains(&r.message.message_id))
        .collect();
    info!(
        curated = curated.len(),
        offered,
        requested = picked.len(),
        "curated relevant messages"
    );
    Ok(curated)
}
