//! invoice-rag: question answering over a single uploaded financial document
//!
//! A user uploads an invoice or statement (PDF, Word, spreadsheet, CSV, text or a scanned
//! image), the service extracts and chunks its text, embeds the chunks with Gemini into a
//! per-document vector collection, and answers questions through multi-query retrieval
//! with the supporting snippets attached.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use types::{Chunk, DocumentProgress, FileType, LoadedDocument, ProcessingStatus};
