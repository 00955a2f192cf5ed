use {
    chrono::NaiveDateTime,
    serde::{Deserialize, Serialize},
};

/// Storage and display format of message timestamps.
///
/// Fixed width, so lexical order in the store matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const LINK_BASE: &str = "https://discord.com/channels/@me";

/// One archived chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Platform-native id; unique within the store.
    pub message_id: i64,
    /// Display name, resolved at ingestion.
    pub author: String,
    pub timestamp: NaiveDateTime,
    /// Text with `<@id>` mentions already replaced by `@Name`.
    pub contents: String,
    /// Opaque attachment metadata as exported. Not used for retrieval.
    #[serde(default)]
    pub attachments: String,
    pub link: String,
}

impl Message {
    /// Build a message whose `link` is derived from `conversation_id` and `message_id`.
    pub fn new(
        conversation_id: u64,
        message_id: i64,
        author: impl Into<String>,
        timestamp: NaiveDateTime,
        contents: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            author: author.into(),
            timestamp,
            contents: contents.into(),
            attachments: String::new(),
            link: message_link(conversation_id, message_id),
        }
    }

    pub fn with_attachments(mut self, attachments: impl Into<String>) -> Self {
        self.attachments = attachments.into();
        self
    }

    /// `YYYY-MM-DD` part of the timestamp.
    pub fn date(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Canonical deep link back to a message in the direct-message conversation.
pub fn message_link(conversation_id: u64, message_id: i64) -> String {
    format!("{LINK_BASE}/{conversation_id}/{message_id}")
}

/// The link shape with a literal `message_id` placeholder, for prompts.
pub fn link_template(conversation_id: u64) -> String {
    format!("{LINK_BASE}/{conversation_id}/message_id")
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
}
