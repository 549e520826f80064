//! Retrieval-augmented QA over one processed upload

use std::path::Path;
use std::sync::Arc;

use super::prompt::PromptBuilder;
use crate::error::Result;
use crate::providers::LlmProvider;
use crate::retrieval::{MultiQueryRetriever, SearchHit};

/// Answer with the chunks it was grounded on
#[derive(Debug, Clone)]
pub struct QaAnswer {
    pub result: String,
    pub source_documents: Vec<SearchHit>,
}

impl QaAnswer {
    /// Source chunk texts in retrieval order
    pub fn source_texts(&self) -> Vec<String> {
        self.source_documents.iter().map(|h| h.content.clone()).collect()
    }
}

/// Multi-query retrieval followed by a single "stuffed" generation call
pub struct QaChain {
    filename: String,
    retriever: MultiQueryRetriever,
    llm: Arc<dyn LlmProvider>,
}

impl QaChain {
    pub fn new(filename: impl Into<String>, retriever: MultiQueryRetriever, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            filename: filename.into(),
            retriever,
            llm,
        }
    }

    /// Storage filename this chain answers for
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Directory of the backing collection
    pub fn collection_dir(&self) -> &Path {
        self.retriever.collection().dir()
    }

    pub async fn answer(&self, question: &str) -> Result<QaAnswer> {
        let hits = self.retriever.retrieve(question).await?;

        let texts: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
        let context = PromptBuilder::build_context(&texts);
        let prompt = PromptBuilder::build_invoice_prompt(question, &context);

        tracing::info!(
            "Answering for '{}' with {} context chunks via {}",
            self.filename,
            hits.len(),
            self.llm.model()
        );

        let result = self.llm.generate(&prompt).await?;

        Ok(QaAnswer {
            result: result.trim().to_string(),
            source_documents: hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::providers::EmbeddingProvider;
    use crate::retrieval::VectorCollection;
    use crate::types::{Chunk, Metadata};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn name(&self) -> &str {
            "unit"
        }
    }

    /// Records prompts; answers variant requests with one line and others with a fixed reply
    #[derive(Default)]
    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
        fail_answers: bool,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            if prompt.contains("Original question:") {
                Ok("invoice total?".to_string())
            } else if self.fail_answers {
                Err(Error::llm("prompt blocked by safety filter: SAFETY"))
            } else {
                Ok("  The total is $42.  ".to_string())
            }
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn model(&self) -> &str {
            "recording-1"
        }
    }

    fn chain(dir: &Path, llm: Arc<RecordingLlm>) -> QaChain {
        let mut collection = VectorCollection::create(dir, "rag_").unwrap();
        collection
            .insert(
                &[Chunk {
                    index: 0,
                    content: "Total: $42".to_string(),
                    metadata: Metadata::new(),
                }],
                vec![vec![1.0, 0.0]],
            )
            .unwrap();
        let retriever = MultiQueryRetriever::new(Arc::new(collection), Arc::new(UnitEmbedder), llm.clone());
        QaChain::new("abcd1234_invoice.txt", retriever, llm)
    }

    #[tokio::test]
    async fn test_answer_uses_retrieved_context() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RecordingLlm::default());
        let chain = chain(dir.path(), llm.clone());

        let answer = chain.answer("What is the total?").await.unwrap();
        assert_eq!(answer.result, "The total is $42.");
        assert_eq!(answer.source_texts(), vec!["Total: $42"]);

        let prompts = llm.prompts.lock();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Context: Total: $42\nQuestion: What is the total?"));
    }

    #[tokio::test]
    async fn test_generation_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RecordingLlm {
            fail_answers: true,
            ..Default::default()
        });
        let err = chain(dir.path(), llm).answer("What is the total?").await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
    }
}
