/// Error kinds a query or store operation can fail with.
///
/// Every variant is terminal for the query that raised it; nothing retries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The keyword set was empty or contained only blank keywords.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A stage produced nothing for the next stage to work with.
    #[error("no results: {0}")]
    NoResults(String),

    /// The embedding capability failed or returned unusable vectors.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The completion capability failed before producing a response.
    #[error("completion failed: {0}")]
    Completion(String),

    /// A capability answered, but not in the requested structured shape.
    /// The raw response is kept so the caller can show it.
    #[error("malformed {stage} response ({reason}): {raw}")]
    MalformedResponse {
        stage: &'static str,
        reason: String,
        raw: String,
    },

    #[error("store write failed: {0}")]
    StoreWrite(String),

    #[error("store read failed: {0}")]
    StoreRead(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short, stable label used in logs and reply texts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "invalid_query",
            Self::NoResults(_) => "no_results",
            Self::Embedding(_) => "embedding",
            Self::Completion(_) => "completion",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::StoreWrite(_) => "store_write",
            Self::StoreRead(_) => "store_read",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_response_keeps_raw_text_in_message() {
        let err = Error::MalformedResponse {
            stage: "keyword",
            reason: "expected a list of keywords".into(),
            raw: "sure! here are some keywords".into(),
        };
        let text = err.to_string();
        assert!(text.contains("keyword"));
        assert!(text.contains("sure! here are some keywords"));
        assert_eq!(err.kind(), "malformed_response");
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::other("disk full").into();
        assert_eq!(err.kind(), "io");
    }
}
