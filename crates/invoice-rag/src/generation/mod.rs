//! Answer generation: prompt templates and the QA chain

pub mod prompt;
pub mod qa_chain;

pub use prompt::PromptBuilder;
pub use qa_chain::{QaAnswer, QaChain};
