//! Background worker running the extract, chunk, embed, index and chain pipeline

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};

use super::job_queue::Job;
use crate::error::{Error, Result};
use crate::generation::QaChain;
use crate::retrieval::{MultiQueryRetriever, VectorCollection};
use crate::server::state::AppState;
use crate::types::ProcessingStatus;

/// Worker draining the job queue
pub struct ProcessingWorker {
    state: AppState,
    semaphore: Arc<Semaphore>,
}

impl ProcessingWorker {
    pub fn new(state: AppState) -> Self {
        let permits = state.config().processing.max_concurrent_jobs.max(1);
        Self {
            state,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Take jobs until every sender is gone, each in its own task once a permit is free
    pub async fn run(self, mut receiver: mpsc::Receiver<Job>) {
        tracing::info!(
            "Processing worker started ({} concurrent jobs)",
            self.semaphore.available_permits()
        );

        while let Some(job) = receiver.recv().await {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("Worker semaphore closed, stopping");
                    break;
                }
            };

            let state = self.state.clone();
            tokio::spawn(async move {
                let _permit = permit;
                Self::run_job(&state, job).await;
            });
        }

        tracing::info!("Processing worker stopped");
    }

    /// Run one job and record its outcome
    pub async fn run_job(state: &AppState, job: Job) {
        let started = Instant::now();
        tracing::info!(
            "Processing job {} for '{}' after {}ms in queue",
            job.id,
            job.filename,
            (chrono::Utc::now() - job.submitted_at).num_milliseconds()
        );

        match Self::process_document(state, &job.filename).await {
            Ok(()) => {
                state.job_queue().advance(&job.filename, ProcessingStatus::Completed);
                tracing::info!(
                    "Job {} for '{}' completed in {:.1}s",
                    job.id,
                    job.filename,
                    started.elapsed().as_secs_f64()
                );
            }
            Err(e) => {
                tracing::error!("Job {} for '{}' failed: {:?}", job.id, job.filename, e);
                state.job_queue().fail(&job.filename, e.to_string());
            }
        }
    }

    async fn process_document(state: &AppState, filename: &str) -> Result<()> {
        let config = state.config();
        let queue = state.job_queue();

        let path = state.uploads().path_for(filename);
        if !path.is_file() {
            return Err(Error::file_parse(filename, "Uploaded file no longer exists"));
        }

        // Extraction shells out and parses on the blocking pool
        let parser = state.parser().clone();
        let documents = tokio::task::spawn_blocking(move || parser.load(&path))
            .await
            .map_err(|e| Error::internal(format!("Extraction task failed: {}", e)))??;

        let chunks = state.splitter().split_documents(&documents);
        if chunks.is_empty() {
            return Err(Error::file_parse(filename, "Document produced no chunks"));
        }
        tracing::info!(
            "'{}': {} documents, {} chunks",
            filename,
            documents.len(),
            chunks.len()
        );
        queue.advance(filename, ProcessingStatus::Processing);

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = state.embedder().embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(Error::embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let index_root = config.storage.index_root.clone();
        let prefix = config.storage.collection_prefix.clone();
        let collection = tokio::task::spawn_blocking(move || {
            VectorCollection::build(&index_root, &prefix, &chunks, embeddings)
        })
        .await
        .map_err(|e| Error::internal(format!("Indexing task failed: {}", e)))??;
        queue.advance(filename, ProcessingStatus::Processing2);

        queue.advance(filename, ProcessingStatus::Processing3);
        let collection_dir = collection.dir().to_path_buf();
        let retriever = MultiQueryRetriever::new(
            Arc::new(collection),
            state.embedder().clone(),
            state.llm().clone(),
        )
        .with_top_k(config.retrieval.top_k)
        .with_variants(config.retrieval.query_variants)
        .include_original(config.retrieval.include_original);
        let chain = QaChain::new(filename, retriever, state.llm().clone());

        if !state.register_chain(Arc::new(chain)) {
            tracing::info!(
                "'{}' was superseded during processing, dropping its QA chain",
                filename
            );
            if let Err(e) = tokio::fs::remove_dir_all(&collection_dir).await {
                tracing::warn!("Failed to remove {}: {}", collection_dir.display(), e);
            }
            return Err(Error::internal("Upload was removed before processing finished"));
        }

        Ok(())
    }
}
