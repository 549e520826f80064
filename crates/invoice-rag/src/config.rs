//! Configuration for the invoice RAG service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable holding the provider API key
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
/// Environment variable overriding the listen port
pub const PORT_ENV: &str = "PORT";
/// Environment variable pointing at an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "INVOICE_RAG_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// On-disk locations for uploads and collections
    pub storage: StorageConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Gemini configuration (embeddings and generation)
    pub llm: LlmConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Processing queue configuration
    pub processing: ProcessingConfig,
    /// OCR and conversion tools
    pub ocr: OcrConfig,
    /// Periodic cleanup configuration
    pub cleanup: CleanupConfig,
}

impl RagConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides.
    ///
    /// When `path` is `None` the `INVOICE_RAG_CONFIG` variable is consulted; with
    /// neither set, defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text (missing sections fall back to defaults)
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Apply `GOOGLE_API_KEY` and `PORT` overrides
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }

        if let Ok(port) = std::env::var(PORT_ENV) {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid {} value: {}", PORT_ENV, port),
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.validate_pipeline()?;

        if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(Error::Config(format!("{} is not set", API_KEY_ENV)));
        }

        Ok(())
    }

    /// Validation without the API key requirement (used with injected providers)
    pub fn validate_pipeline(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("top_k must be greater than 0".to_string()));
        }
        if self.processing.max_concurrent_jobs == 0 || self.processing.queue_capacity == 0 {
            return Err(Error::Config(
                "max_concurrent_jobs and queue_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bundled chat assets, resolved at build time so the server finds them from any working directory
pub const DEFAULT_STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum request body size in bytes (default: 16MB)
    pub max_upload_size: usize,
    /// Directory served under /static
    pub static_dir: PathBuf,
    /// Enable permissive CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_size: 16 * 1024 * 1024,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            enable_cors: false,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Flat directory of uploaded files
    pub uploads_dir: PathBuf,
    /// Root directory holding one subdirectory per collection
    pub index_root: PathBuf,
    /// Name prefix identifying collection directories
    pub collection_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            index_root: PathBuf::from("chroma_db"),
            collection_prefix: "rag_".to_string(),
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Gemini configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Generative Language API base URL
    pub base_url: String,
    /// API key (usually from GOOGLE_API_KEY)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Generation model name
    pub generate_model: String,
    /// Embedding model name
    pub embed_model: String,
    /// Embedding task type
    pub embed_task_type: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Block threshold applied to every harm category
    pub safety_threshold: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            generate_model: "gemini-1.5-flash".to_string(),
            embed_model: "text-embedding-004".to_string(),
            embed_task_type: "RETRIEVAL_QUERY".to_string(),
            temperature: 0.7,
            timeout_secs: 120,
            safety_threshold: "BLOCK_LOW_AND_ABOVE".to_string(),
        }
    }
}

impl LlmConfig {
    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned by the base retriever per query
    pub top_k: usize,
    /// Number of paraphrases requested from the LLM
    pub query_variants: usize,
    /// Also retrieve with the unmodified question
    pub include_original: bool,
    /// Characters of each source chunk echoed back to the client
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            query_variants: 3,
            include_original: false,
            snippet_chars: 200,
        }
    }
}

/// Processing queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Documents processed at the same time (1 = fully serialized)
    pub max_concurrent_jobs: usize,
    /// Pending jobs accepted before /process answers 503
    pub queue_capacity: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            queue_capacity: 64,
        }
    }
}

/// External tools used during extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// tesseract executable
    pub tesseract_bin: String,
    /// tesseract language
    pub language: String,
    /// LibreOffice executable for legacy .doc conversion
    pub libreoffice_bin: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_bin: "tesseract".to_string(),
            language: "eng".to_string(),
            libreoffice_bin: "libreoffice".to_string(),
        }
    }
}

/// Periodic cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Files and collections older than this are deleted (default: 24h)
    pub retention_secs: u64,
    /// Time between sweeps (default: 24h)
    pub sweep_interval_secs: u64,
    /// How often the scheduler checks whether a sweep is due (default: 60s)
    pub poll_interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_secs: 86_400,
            sweep_interval_secs: 86_400,
            poll_interval_secs: 60,
        }
    }
}

impl CleanupConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_constants() {
        let config = RagConfig::default();
        assert_eq!(config.server.max_upload_size, 16 * 1024 * 1024);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.cleanup.retention_secs, 86_400);
        assert_eq!(config.storage.collection_prefix, "rag_");
        assert!(config.server.static_dir.join("script.js").is_file());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RagConfig::from_toml(
            r#"
            [server]
            port = 8081

            [chunking]
            chunk_size = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 200);
    }

    #[test]
    fn test_validation() {
        let mut config = RagConfig::default();
        assert!(config.validate_pipeline().is_ok());
        assert!(config.validate().is_err()); // no API key

        config.llm.api_key = Some("key".to_string());
        assert!(config.validate().is_ok());

        config.chunking.chunk_overlap = 1000;
        assert!(matches!(config.validate_pipeline(), Err(Error::Config(_))));
    }
}
