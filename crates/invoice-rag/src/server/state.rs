//! Application state for the invoice RAG server

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::generation::QaChain;
use crate::ingestion::{FileParser, RecursiveTextSplitter, UploadStore};
use crate::processing::{JobQueue, ProcessingWorker};
use crate::providers::{EmbeddingProvider, GeminiClient, LlmProvider};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Uploaded files
    uploads: UploadStore,
    /// Format loaders
    parser: FileParser,
    splitter: RecursiveTextSplitter,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    /// Job queue and status registry
    job_queue: Arc<JobQueue>,
    /// QA chains by storage filename
    qa_chains: DashMap<String, Arc<QaChain>>,
}

impl AppState {
    /// Create state backed by Gemini. Requires an API key.
    pub async fn new(config: RagConfig) -> Result<Self> {
        config.validate()?;

        let gemini = Arc::new(GeminiClient::new(&config.llm)?);
        tracing::info!(
            "Gemini client initialized (generation: {}, embeddings: {})",
            config.llm.generate_model,
            config.llm.embed_model
        );

        Self::with_providers(config, gemini.clone(), gemini)
    }

    /// Create state with explicit providers and start the processing worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_providers(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        config.validate_pipeline()?;

        let uploads = UploadStore::new(&config.storage.uploads_dir)?;
        std::fs::create_dir_all(&config.storage.index_root)?;
        tracing::info!(
            "Storage ready (uploads: {}, collections: {})",
            config.storage.uploads_dir.display(),
            config.storage.index_root.display()
        );

        let parser = FileParser::new(config.ocr.clone(), &config.storage.uploads_dir);
        let splitter =
            RecursiveTextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap);

        let (job_queue, receiver) = JobQueue::new(config.processing.queue_capacity);
        let job_queue = Arc::new(job_queue);
        tracing::info!(
            "Job queue initialized (capacity {}, {} concurrent jobs)",
            config.processing.queue_capacity,
            config.processing.max_concurrent_jobs
        );

        let state = Self {
            inner: Arc::new(AppStateInner {
                config,
                uploads,
                parser,
                splitter,
                embedder,
                llm,
                job_queue,
                qa_chains: DashMap::new(),
            }),
        };

        // Start background worker with a clone of the state
        let worker = ProcessingWorker::new(state.clone());
        tokio::spawn(async move {
            worker.run(receiver).await;
        });

        Ok(state)
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.inner.uploads
    }

    pub fn parser(&self) -> &FileParser {
        &self.inner.parser
    }

    pub fn splitter(&self) -> &RecursiveTextSplitter {
        &self.inner.splitter
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedder
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.inner.llm
    }

    /// Get job queue
    pub fn job_queue(&self) -> &Arc<JobQueue> {
        &self.inner.job_queue
    }

    /// QA chain for a storage filename
    pub fn qa_chain(&self, filename: &str) -> Option<Arc<QaChain>> {
        self.inner.qa_chains.get(filename).map(|c| Arc::clone(c.value()))
    }

    /// Register a finished chain if its upload still exists.
    ///
    /// The upload is checked after inserting: uploads delete the old file before
    /// dropping its chain, so a concurrent supersede cannot leave a stale entry.
    pub fn register_chain(&self, chain: Arc<QaChain>) -> bool {
        let filename = chain.filename().to_string();
        self.inner.qa_chains.insert(filename.clone(), chain);

        if self.uploads().exists(&filename) {
            tracing::info!("QA chain ready for '{}'", filename);
            true
        } else {
            self.inner.qa_chains.remove(&filename);
            false
        }
    }

    /// Drop the chain for a filename
    pub fn remove_chain(&self, filename: &str) -> Option<Arc<QaChain>> {
        self.inner.qa_chains.remove(filename).map(|(_, chain)| chain)
    }

    /// Drop chains whose collection directory is gone. Returns how many were evicted.
    pub fn evict_orphaned_chains(&self) -> usize {
        let before = self.inner.qa_chains.len();
        self.inner
            .qa_chains
            .retain(|filename, chain| {
                let alive = chain.collection_dir().is_dir();
                if !alive {
                    tracing::info!("Evicting QA chain for '{}' (collection purged)", filename);
                }
                alive
            });
        before.saturating_sub(self.inner.qa_chains.len())
    }

    /// Number of registered QA chains
    pub fn chain_count(&self) -> usize {
        self.inner.qa_chains.len()
    }
}
