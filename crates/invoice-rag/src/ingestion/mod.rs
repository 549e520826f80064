//! Document ingestion: upload storage, text extraction and chunking

mod chunker;
mod external;
mod parser;
mod upload;

pub use chunker::RecursiveTextSplitter;
pub use external::{ocr_artifact_path, ExternalTools};
pub use parser::FileParser;
pub use upload::{secure_filename, unique_filename, StoredUpload, UploadStore};
