//! Provider abstractions for embeddings and text generation
//!
//! The pipeline only talks to these traits, so the hosted Gemini backend can be
//! swapped for another implementation (tests use in-process fakes).

pub mod embedding;
pub mod gemini;
pub mod llm;

pub use embedding::EmbeddingProvider;
pub use gemini::GeminiClient;
pub use llm::LlmProvider;
