use {
    async_trait::async_trait,
    chrono::NaiveDateTime,
    dmrecall_common::{Message, Result},
};

/// Ordered, read-mostly collection of archived messages.
///
/// Reads may run concurrently. Writes belong to the ingestion phase and must
/// not overlap with queries; nothing here enforces that.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message. A duplicate `message_id` is a `StoreWrite` error.
    async fn insert(&self, message: &Message) -> Result<()>;

    /// Append all messages atomically. Returns how many were written.
    async fn insert_batch(&self, messages: &[Message]) -> Result<usize>;

    /// Messages whose contents contain at least one keyword, case-sensitively
    /// and literally, in store order.
    ///
    /// Fails with `InvalidQuery` when no non-blank keyword is given.
    async fn find_by_substring(&self, keywords: &[String]) -> Result<Vec<Message>>;

    /// Messages with `start <= timestamp <= end`, oldest first.
    async fn find_by_time_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Message>>;

    async fn count(&self) -> Result<u64>;

    /// Message count per author, ordered by author name.
    async fn author_counts(&self) -> Result<Vec<(String, u64)>>;

    /// Timestamp of the oldest message, if any.
    async fn first_timestamp(&self) -> Result<Option<NaiveDateTime>>;
}
