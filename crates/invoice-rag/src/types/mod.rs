//! Core types for the invoice RAG service

pub mod document;
pub mod query;
pub mod response;
pub mod status;

pub use document::{Chunk, FileType, LoadedDocument, Metadata};
pub use query::QueryKind;
pub use status::{DocumentProgress, ProcessingStatus, StageEvent};
