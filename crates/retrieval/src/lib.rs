//! Retrieval pipeline: query → keywords → substring candidates → embedding
//! rank → LLM curation → time-window context → token budget → LLM summary.

pub mod audit;
pub mod budget;
pub mod completion;
pub mod completion_openai;
pub mod config;
pub mod curator;
pub mod decoder;
pub mod digest;
pub mod embeddings;
pub mod embeddings_openai;
pub mod expander;
pub mod ranker;
pub mod reply;
pub mod selector;
pub mod service;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod test_support;

pub use {
    completion::{CompletionProvider, CompletionRequest},
    config::RetrievalConfig,
    embeddings::EmbeddingProvider,
    service::{SearchOutcome, SearchService},
};
