//! Chat archive: export files → messages table in SQLite → substring and time-range reads.

pub mod ingest;
pub mod schema;
pub mod store;
pub mod store_sqlite;

pub use {
    store::MessageStore,
    store_sqlite::{SqliteMessageStore, connect},
};
