//! Multi-format text extraction

use calamine::Reader;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use unicode_normalization::UnicodeNormalization;

use super::external::ExternalTools;
use crate::config::OcrConfig;
use crate::error::{Error, Result};
use crate::types::{FileType, LoadedDocument};

/// Upper bound on pdf-extract, which can spin on malformed fonts
const PDF_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// `uniXXXX` glyph names leaked by some PDF fonts: delimited as `(uniXXXX)`/`<uniXXXX>`,
/// or standalone with uppercase hex as in Adobe glyph names
static UNI_GLYPH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[(<]uni([0-9A-Fa-f]{4})[)>]|\buni([0-9A-F]{4})\b").expect("glyph pattern is valid")
});

/// Underscore ligature glyph names (`f_i`, `f_f_l`, ...)
static LIGATURE_GLYPH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[(<]?\b(f_f_i|f_f_l|f_f|f_i|f_l)\b[)>]?").expect("ligature pattern is valid")
});

/// Replace leaked glyph names, fold compatibility forms and typographic punctuation to
/// ASCII, and drop blank lines
fn cleanup_pdf_text(text: &str) -> String {
    let decoded = UNI_GLYPH_RE.replace_all(text, |caps: &regex::Captures| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|hex| u32::from_str_radix(hex.as_str(), 16).ok())
            .and_then(char::from_u32)
            .map(String::from)
            // Not a scalar value (e.g. a surrogate): leave the text alone
            .unwrap_or_else(|| caps[0].to_string())
    });
    let decoded = LIGATURE_GLYPH_RE.replace_all(&decoded, |caps: &regex::Captures| caps[1].replace('_', ""));

    // NFKC splits ligatures and turns exotic spaces and ellipses into ASCII
    let mut folded = String::with_capacity(decoded.len());
    for c in decoded.nfkc() {
        match c {
            '\0' => {}
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2212}' => folded.push('-'),
            '\u{2014}' | '\u{2015}' => folded.push_str("--"),
            '\u{2018}' | '\u{2019}' | '\u{201A}' => folded.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' => folded.push('"'),
            '\u{2022}' => folded.push_str("* "),
            _ => folded.push(c),
        }
    }

    folded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Loads an uploaded file into one or more documents, dispatching on extension
#[derive(Debug, Clone)]
pub struct FileParser {
    tools: ExternalTools,
    /// Where OCR artifacts are staged
    artifacts_dir: PathBuf,
}

impl FileParser {
    pub fn new(ocr: OcrConfig, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools: ExternalTools::new(ocr),
            artifacts_dir: artifacts_dir.into(),
        }
    }

    /// Extract text from a stored upload. Fails if nothing but whitespace comes out.
    pub fn load(&self, path: &Path) -> Result<Vec<LoadedDocument>> {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = FileType::extension_of(&source);

        let file_type = FileType::from_extension(&extension)
            .ok_or_else(|| Error::UnsupportedFileType(format!(".{}", extension)))?;

        tracing::debug!("Loading '{}' as {}", source, file_type.display_name());

        let documents = match file_type {
            FileType::Image => {
                let text = self.tools.ocr_image(path, &self.artifacts_dir)?;
                vec![LoadedDocument::new(text, &source)]
            }
            FileType::Txt => {
                let data = std::fs::read(path)?;
                vec![LoadedDocument::new(String::from_utf8_lossy(&data), &source)]
            }
            FileType::Csv => Self::load_csv(&std::fs::read(path)?, &source)?,
            FileType::Xlsx | FileType::Xls => Self::load_spreadsheet(&std::fs::read(path)?, &source)?,
            FileType::Pdf => Self::load_pdf(&std::fs::read(path)?, &source)?,
            FileType::Docx => {
                vec![LoadedDocument::new(Self::docx_text(&std::fs::read(path)?, &source)?, &source)]
            }
            FileType::Doc => vec![LoadedDocument::new(self.doc_text(path, &source)?, &source)],
        };

        let documents: Vec<LoadedDocument> = documents
            .into_iter()
            .filter(|d| !d.content.trim().is_empty())
            .collect();

        if documents.is_empty() {
            return Err(Error::file_parse(&source, "No text content could be extracted"));
        }

        tracing::info!(
            "Loaded {} document(s) from '{}' ({} chars)",
            documents.len(),
            source,
            documents.iter().map(|d| d.content.len()).sum::<usize>()
        );

        Ok(documents)
    }

    /// One document per row, each field rendered as `header: value`
    fn load_csv(data: &[u8], source: &str) -> Result<Vec<LoadedDocument>> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::file_parse(source, e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut documents = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::file_parse(source, e.to_string()))?;

            let content = record
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    let header = headers.get(i).map(String::as_str).unwrap_or("");
                    format!("{}: {}", header, value.trim())
                })
                .collect::<Vec<_>>()
                .join("\n");

            documents.push(LoadedDocument::new(content, source).with_meta("row", row));
        }

        Ok(documents)
    }

    /// One document per sheet, rows joined with ` | `
    fn load_spreadsheet(data: &[u8], source: &str) -> Result<Vec<LoadedDocument>> {
        let cursor = std::io::Cursor::new(data);
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| Error::file_parse(source, e.to_string()))?;

        let mut documents = Vec::new();
        for sheet_name in workbook.sheet_names().to_vec() {
            let range = match workbook.worksheet_range(&sheet_name) {
                Ok(range) => range,
                Err(e) => {
                    tracing::warn!("Skipping sheet '{}' in '{}': {}", sheet_name, source, e);
                    continue;
                }
            };

            let mut content = format!("Sheet: {}\n", sheet_name);
            for row in range.rows() {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| match cell {
                        calamine::Data::Empty => String::new(),
                        calamine::Data::String(s) => s.clone(),
                        calamine::Data::Float(f) => f.to_string(),
                        calamine::Data::Int(i) => i.to_string(),
                        calamine::Data::Bool(b) => b.to_string(),
                        calamine::Data::DateTime(dt) => dt.as_f64().to_string(),
                        _ => String::new(),
                    })
                    .collect();

                if cells.iter().any(|c| !c.is_empty()) {
                    content.push_str(&cells.join(" | "));
                    content.push('\n');
                }
            }

            documents.push(LoadedDocument::new(content, source).with_meta("sheet", sheet_name));
        }

        Ok(documents)
    }

    /// One document per page when lopdf can read the page tree, otherwise the whole text
    fn load_pdf(data: &[u8], source: &str) -> Result<Vec<LoadedDocument>> {
        if let Ok(doc) = lopdf::Document::load_mem(data) {
            let pages: Vec<LoadedDocument> = doc
                .get_pages()
                .keys()
                .filter_map(|&page| {
                    let text = doc.extract_text(&[page]).ok()?;
                    let text = cleanup_pdf_text(&text);
                    (!text.is_empty())
                        .then(|| LoadedDocument::new(text, source).with_meta("page", page))
                })
                .collect();

            if !pages.is_empty() {
                return Ok(pages);
            }
            tracing::debug!("lopdf found no page text in '{}', trying pdf-extract", source);
        }

        let text = Self::extract_pdf_with_timeout(data, source)?;
        Ok(vec![LoadedDocument::new(cleanup_pdf_text(&text), source)])
    }

    /// pdf-extract on a helper thread, falling back to a content-stream scan on error or timeout
    fn extract_pdf_with_timeout(data: &[u8], source: &str) -> Result<String> {
        let owned = data.to_vec();
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let _ = tx.send(pdf_extract::extract_text_from_mem(&owned));
        });

        match rx.recv_timeout(PDF_EXTRACT_TIMEOUT) {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
            Ok(Ok(_)) => Self::extract_pdf_content_streams(data, source),
            Ok(Err(e)) => {
                tracing::warn!("pdf-extract failed on '{}': {}, scanning content streams", source, e);
                Self::extract_pdf_content_streams(data, source)
            }
            Err(_) => {
                tracing::error!(
                    "pdf-extract did not finish within {:?} on '{}'",
                    PDF_EXTRACT_TIMEOUT,
                    source
                );
                Self::extract_pdf_content_streams(data, source)
            }
        }
    }

    /// Last resort: pull literal strings out of `Tj`/`TJ` operators
    fn extract_pdf_content_streams(data: &[u8], source: &str) -> Result<String> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::file_parse(source, format!("Failed to load PDF: {}", e)))?;

        let mut text = String::new();
        for (page, page_id) in doc.get_pages() {
            match doc.get_page_content(page_id) {
                Ok(content) => {
                    let page_text = text_from_content_stream(&content);
                    if !page_text.is_empty() {
                        text.push_str(&page_text);
                        text.push('\n');
                    }
                }
                Err(e) => tracing::debug!("No content for page {} of '{}': {}", page, source, e),
            }
        }

        if text.trim().is_empty() {
            return Err(Error::file_parse(
                source,
                "PDF appears to be image-based or has no extractable text",
            ));
        }
        Ok(text)
    }

    /// Paragraph and table-cell text of a DOCX
    fn docx_text(data: &[u8], source: &str) -> Result<String> {
        let doc = docx_rs::read_docx(data).map_err(|e| Error::file_parse(source, e.to_string()))?;

        let mut content = String::new();
        for child in &doc.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(p) => {
                    content.push_str(&paragraph_text(p));
                    content.push('\n');
                }
                docx_rs::DocumentChild::Table(table) => {
                    for row in &table.rows {
                        let docx_rs::TableChild::TableRow(row) = row;
                        let cells: Vec<String> = row
                            .cells
                            .iter()
                            .map(|cell| {
                                let docx_rs::TableRowChild::TableCell(cell) = cell;
                                cell_text(cell)
                            })
                            .collect();
                        content.push_str(&cells.join(" | "));
                        content.push('\n');
                    }
                }
                _ => {}
            }
        }

        Ok(content)
    }

    /// Many `.doc` uploads are DOCX underneath; otherwise convert with LibreOffice
    fn doc_text(&self, path: &Path, source: &str) -> Result<String> {
        let data = std::fs::read(path)?;
        match Self::docx_text(&data, source) {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::info!("'{}' is not DOCX ({}), converting with LibreOffice", source, e);
                let converted = self.tools.convert_to_docx(path)?;
                Self::docx_text(&converted, source)
            }
        }
    }
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

fn cell_text(cell: &docx_rs::TableCell) -> String {
    cell.children
        .iter()
        .filter_map(|content| match content {
            docx_rs::TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Literal strings shown between `BT` and `ET`
fn text_from_content_stream(content: &[u8]) -> String {
    let stream = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;

    for line in stream.lines().map(str::trim) {
        match line {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                if !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
            }
            _ if in_text_block && (line.ends_with("Tj") || line.ends_with("TJ")) => {
                if let (Some(start), Some(end)) = (line.find('('), line.rfind(')')) {
                    if start < end {
                        text.push_str(
                            &line[start + 1..end]
                                .replace("\\n", "\n")
                                .replace("\\(", "(")
                                .replace("\\)", ")")
                                .replace("\\\\", "\\"),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    text.trim().to_string()
}
