//! Prompt templates for query expansion and answering

/// Separator between retrieved chunks in the answer context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Prompt builder for the QA chain
pub struct PromptBuilder;

impl PromptBuilder {
    /// Join retrieved chunk texts into a single context block
    pub fn build_context<S: AsRef<str>>(chunks: &[S]) -> String {
        chunks
            .iter()
            .map(|c| c.as_ref())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    /// Answer prompt for invoice questions, grounded in the given context
    pub fn build_invoice_prompt(question: &str, context: &str) -> String {
        format!(
            r#"You are a financial assistant specializing in invoice analysis. Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.

Context: {context}
Question: {question}
Answer:"#,
            context = context,
            question = question
        )
    }

    /// Ask for `variants` rephrasings of a question, one per line
    pub fn multi_query_prompt(question: &str, variants: usize) -> String {
        format!(
            "You are an AI language model assistant. Your task is to generate {variants} different versions of the given user question to retrieve relevant documents from a vector database. By generating multiple perspectives on the user question, your goal is to help the user overcome some of the limitations of distance-based similarity search. Provide these alternative questions separated by newlines. Original question: {question}",
            variants = variants,
            question = question
        )
    }
}
