//! Multi-query retrieval: search once per LLM-generated rephrasing and merge

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

use super::collection::{SearchHit, VectorCollection};
use crate::error::Result;
use crate::generation::PromptBuilder;
use crate::providers::{EmbeddingProvider, LlmProvider};

/// Leading list markers such as `1.`, `2)`, `-` or `*`
static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s*").expect("list marker pattern is valid"));

/// Wraps a top-k collection search with query expansion
pub struct MultiQueryRetriever {
    collection: Arc<VectorCollection>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
    variants: usize,
    include_original: bool,
}

impl MultiQueryRetriever {
    pub fn new(
        collection: Arc<VectorCollection>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            collection,
            embedder,
            llm,
            top_k: 5,
            variants: 3,
            include_original: false,
        }
    }

    /// Set the per-query result count
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set how many rephrasings to request
    pub fn with_variants(mut self, variants: usize) -> Self {
        self.variants = variants;
        self
    }

    /// Also search with the question as asked
    pub fn include_original(mut self, include: bool) -> Self {
        self.include_original = include;
        self
    }

    pub fn collection(&self) -> &VectorCollection {
        &self.collection
    }

    /// Queries to search with. Falls back to the question alone when generation fails.
    pub async fn generate_queries(&self, question: &str) -> Vec<String> {
        let prompt = PromptBuilder::multi_query_prompt(question, self.variants);

        let mut queries = match self.llm.generate(&prompt).await {
            Ok(raw) => parse_query_variants(&raw),
            Err(e) => {
                tracing::warn!("Query variant generation failed, using the question as is: {}", e);
                Vec::new()
            }
        };

        if queries.is_empty() {
            return vec![question.to_string()];
        }

        tracing::debug!("Generated queries: {:?}", queries);

        if self.include_original && !queries.iter().any(|q| q == question) {
            queries.push(question.to_string());
        }
        queries
    }

    /// De-duplicated union of hits over every query, in first-seen order
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>> {
        let queries = self.generate_queries(question).await;
        let embeddings = self.embedder.embed_batch(&queries).await?;

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for embedding in &embeddings {
            for hit in self.collection.search(embedding, self.top_k)? {
                if seen.insert(hit.id) {
                    hits.push(hit);
                }
            }
        }

        tracing::debug!(
            "Retrieved {} unique chunks for {} queries from {}",
            hits.len(),
            queries.len(),
            self.collection.name()
        );
        Ok(hits)
    }
}

/// One query per non-blank line, with list markers stripped
pub fn parse_query_variants(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| LIST_MARKER_RE.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{Chunk, Metadata};
    use async_trait::async_trait;

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.to_lowercase();
            Ok(vec![
                text.contains("total") as u8 as f32,
                text.contains("vendor") as u8 as f32,
                text.contains("date") as u8 as f32,
            ])
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    struct ScriptedLlm(Option<&'static str>);

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| Error::llm("quota exceeded"))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    async fn collection(dir: &std::path::Path) -> Arc<VectorCollection> {
        let mut collection = VectorCollection::create(dir, "rag_").unwrap();
        let chunks: Vec<Chunk> = ["Total due: $42", "Vendor: ACME", "Date: 2024-01-05"]
            .iter()
            .enumerate()
            .map(|(index, content)| Chunk {
                index,
                content: content.to_string(),
                metadata: Metadata::new(),
            })
            .collect();
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = KeywordEmbedder.embed_batch(&texts).await.unwrap();
        collection.insert(&chunks, embeddings).unwrap();
        Arc::new(collection)
    }

    #[test]
    fn test_parse_query_variants() {
        let raw = "1. What is the invoice total?\n\n2) Who is the vendor?\n- When was it issued?\n   \n";
        assert_eq!(
            parse_query_variants(raw),
            vec![
                "What is the invoice total?",
                "Who is the vendor?",
                "When was it issued?"
            ]
        );
    }

    #[tokio::test]
    async fn test_union_is_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = MultiQueryRetriever::new(
            collection(dir.path()).await,
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedLlm(Some("total amount?\nthe total?\nvendor name?"))),
        )
        .with_top_k(1);

        let hits = retriever.retrieve("How much?").await.unwrap();
        let contents: Vec<_> = hits.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["Total due: $42", "Vendor: ACME"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_question_when_generation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = MultiQueryRetriever::new(
            collection(dir.path()).await,
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedLlm(None)),
        );

        assert_eq!(
            retriever.generate_queries("What is the date?").await,
            vec!["What is the date?"]
        );
        let hits = retriever.retrieve("What is the date?").await.unwrap();
        assert_eq!(hits[0].content, "Date: 2024-01-05");
    }

    #[tokio::test]
    async fn test_original_included_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = MultiQueryRetriever::new(
            collection(dir.path()).await,
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedLlm(Some("variant one"))),
        )
        .include_original(true);

        assert_eq!(
            retriever.generate_queries("original?").await,
            vec!["variant one", "original?"]
        );
    }
}
