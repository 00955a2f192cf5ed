//! Types shared by every dmrecall crate: the archived chat message, deep-link
//! formatting, and the pipeline error kinds.

pub mod error;
pub mod types;

pub use {
    error::{Error, Result},
    types::{
        Message, TIMESTAMP_FORMAT, format_timestamp, link_template, message_link, parse_timestamp,
    },
};
