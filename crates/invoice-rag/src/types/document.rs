//! Document and chunk types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Supported upload types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Plain text file
    Txt,
    /// CSV file
    Csv,
    /// Excel spreadsheet (.xlsx)
    Xlsx,
    /// Old Excel spreadsheet (.xls)
    Xls,
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Old Microsoft Word document (.doc)
    Doc,
    /// Image, text comes from OCR
    Image,
}

impl FileType {
    /// Detect file type from an extension (case-insensitive, without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::Txt),
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::Doc),
            "jpg" | "jpeg" | "png" => Some(Self::Image),
            _ => None,
        }
    }

    /// Lower-cased extension of a filename, empty if there is none
    pub fn extension_of(filename: &str) -> String {
        std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Txt => "Text File",
            Self::Csv => "CSV",
            Self::Xlsx => "Excel Spreadsheet (.xlsx)",
            Self::Xls => "Excel Spreadsheet (.xls)",
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Doc => "Word Document (.doc)",
            Self::Image => "Image",
        }
    }
}

/// Metadata attached to loaded documents and carried onto their chunks
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One unit produced by a format loader (a page, a sheet, a CSV row, or a whole file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedDocument {
    /// Extracted text
    pub content: String,
    /// Source information (`source`, `page`, `row`, `sheet`)
    pub metadata: Metadata,
}

impl LoadedDocument {
    /// Create a document tagged with its source filename
    pub fn new(content: impl Into<String>, source: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), serde_json::Value::from(source));
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Add a metadata entry
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A chunk of text ready for embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of the chunk within its document set
    pub index: usize,
    /// Chunk text
    pub content: String,
    /// Metadata copied from the loaded document
    pub metadata: Metadata,
}
