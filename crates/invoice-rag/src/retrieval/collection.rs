//! Flat cosine-similarity collection persisted as a single JSON file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Chunk, Metadata};

/// File holding a collection inside its directory
pub const COLLECTION_FILE: &str = "collection.json";

/// One embedded chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: Uuid,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// Search result with record and similarity
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    pub content: String,
    pub metadata: Metadata,
    /// Cosine similarity in [-1, 1], higher is closer
    pub score: f32,
}

#[derive(Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    dimensions: usize,
    created_at: DateTime<Utc>,
    records: Vec<CollectionRecord>,
}

/// Vectors for one processed upload, searched by brute force
#[derive(Debug)]
pub struct VectorCollection {
    name: String,
    dir: PathBuf,
    dimensions: usize,
    created_at: DateTime<Utc>,
    records: Vec<CollectionRecord>,
}

impl VectorCollection {
    /// Create a fresh `<prefix><hex8>` directory under `root`
    pub fn create(root: &Path, prefix: &str) -> Result<Self> {
        let token = Uuid::new_v4().simple().to_string();
        let name = format!("{}{}", prefix, &token[..8]);
        let dir = root.join(&name);
        std::fs::create_dir_all(&dir)?;

        tracing::debug!("Created collection {}", dir.display());

        Ok(Self {
            name,
            dir,
            dimensions: 0,
            created_at: Utc::now(),
            records: Vec::new(),
        })
    }

    /// Create, fill and persist a collection. The directory is removed when any step fails.
    pub fn build(root: &Path, prefix: &str, chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> Result<Self> {
        let mut collection = Self::create(root, prefix)?;
        let filled = collection
            .insert(chunks, embeddings)
            .and_then(|()| collection.persist());

        if let Err(e) = filled {
            if let Err(cleanup) = std::fs::remove_dir_all(&collection.dir) {
                tracing::warn!(
                    "Failed to remove partial collection {}: {}",
                    collection.dir.display(),
                    cleanup
                );
            }
            return Err(e);
        }
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add chunks with their embeddings (same order, same length)
    pub fn insert(&mut self, chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(Error::vector_db(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            if embedding.is_empty() {
                return Err(Error::vector_db(format!("Chunk {} has no embedding", chunk.index)));
            }
            if self.dimensions == 0 {
                self.dimensions = embedding.len();
            } else if embedding.len() != self.dimensions {
                return Err(Error::vector_db(format!(
                    "Dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    embedding.len()
                )));
            }

            self.records.push(CollectionRecord {
                id: Uuid::new_v4(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                embedding,
            });
        }

        Ok(())
    }

    /// Write `collection.json` via a temp file and rename
    pub fn persist(&self) -> Result<()> {
        let file = CollectionFile {
            name: self.name.clone(),
            dimensions: self.dimensions,
            created_at: self.created_at,
            records: self.records.clone(),
        };

        let target = self.dir.join(COLLECTION_FILE);
        let tmp = self.dir.join(format!("{}.tmp", COLLECTION_FILE));
        std::fs::write(&tmp, serde_json::to_vec(&file)?)?;
        std::fs::rename(&tmp, &target)?;

        tracing::info!(
            "Persisted collection {} ({} vectors, {} dims)",
            self.name,
            self.records.len(),
            self.dimensions
        );
        Ok(())
    }

    /// Top-k records by cosine similarity, ties in insertion order
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if self.records.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(Error::vector_db(format!(
                "Query has {} dims, collection {} has {}",
                query.len(),
                self.name,
                self.dimensions
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (i, cosine_similarity(query, &r.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| {
                let record = &self.records[i];
                SearchHit {
                    id: record.id,
                    content: record.content.clone(),
                    metadata: record.metadata.clone(),
                    score,
                }
            })
            .collect())
    }
}

/// Cosine similarity; zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, content: &str) -> Chunk {
        Chunk {
            index,
            content: content.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_search_ranks_and_truncates() {
        let root = tempfile::tempdir().unwrap();
        let mut collection = VectorCollection::create(root.path(), "rag_").unwrap();
        collection
            .insert(
                &[chunk(0, "tax"), chunk(1, "total"), chunk(2, "vendor")],
                vec![vec![0.0, 1.0], vec![1.0, 0.1], vec![0.7, 0.7]],
            )
            .unwrap();

        let hits = collection.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "total");
        assert_eq!(hits[1].content, "vendor");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_insert_rejects_mismatches() {
        let root = tempfile::tempdir().unwrap();
        let mut collection = VectorCollection::create(root.path(), "rag_").unwrap();

        let err = collection.insert(&[chunk(0, "a")], vec![]).unwrap_err();
        assert!(matches!(err, Error::VectorDb(_)));

        let err = collection
            .insert(&[chunk(0, "a"), chunk(1, "b")], vec![vec![1.0, 0.0], vec![1.0]])
            .unwrap_err();
        assert!(err.to_string().contains("Dimension mismatch"));

        assert!(collection.search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_persist_writes_collection_file() {
        let root = tempfile::tempdir().unwrap();
        let mut collection = VectorCollection::create(root.path(), "rag_").unwrap();
        assert!(collection.name().starts_with("rag_"));
        assert_eq!(collection.name().len(), 12);

        collection
            .insert(&[chunk(0, "Invoice total: $42")], vec![vec![0.5, 0.5, 0.0]])
            .unwrap();
        collection.persist().unwrap();

        assert!(collection.dir().join(COLLECTION_FILE).is_file());
        assert!(!collection.dir().join("collection.json.tmp").exists());

        let raw = std::fs::read(collection.dir().join(COLLECTION_FILE)).unwrap();
        let file: CollectionFile = serde_json::from_slice(&raw).unwrap();
        assert_eq!(file.name, collection.name());
        assert_eq!(file.dimensions, 3);
        assert_eq!(file.records.len(), 1);
        assert_eq!(file.records[0].content, "Invoice total: $42");
    }

    #[test]
    fn test_build_indexes_and_persists() {
        let root = tempfile::tempdir().unwrap();
        let collection = VectorCollection::build(
            root.path(),
            "rag_",
            &[chunk(0, "subtotal"), chunk(1, "total due")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();

        assert_eq!(collection.len(), 2);
        assert!(collection.dir().join(COLLECTION_FILE).is_file());
        let hits = collection.search(&[0.1, 1.0], 1).unwrap();
        assert_eq!(hits[0].content, "total due");
    }

    #[test]
    fn test_failed_build_leaves_no_directory() {
        let root = tempfile::tempdir().unwrap();

        let err = VectorCollection::build(
            root.path(),
            "rag_",
            &[chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Dimension mismatch"));

        let err = VectorCollection::build(root.path(), "rag_", &[chunk(0, "a")], vec![]).unwrap_err();
        assert!(matches!(err, Error::VectorDb(_)));

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
