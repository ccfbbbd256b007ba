//! Retrieval and experience storage for Meridian.
//!
//! - [`KeywordRetriever`] — BM25-backed in-memory [`RetrievalProvider`](meridian_core::RetrievalProvider).
//! - [`InMemoryExperienceStore`] / [`JsonlExperienceStore`] — [`ExperienceStore`](meridian_core::ExperienceStore) backends.

/// BM25 inverted index.
pub mod bm25;
/// Experience event stores.
pub mod experience;
/// Keyword retrieval over an in-memory corpus.
pub mod keyword;

pub use bm25::Bm25Index;
pub use experience::{InMemoryExperienceStore, JsonlExperienceStore};
pub use keyword::{chunk_text, Document, KeywordRetriever, DEFAULT_CHUNK_CHARS};
