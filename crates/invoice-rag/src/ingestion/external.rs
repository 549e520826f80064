//! External tools: tesseract for image OCR and LibreOffice for legacy Word files

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::OcrConfig;
use crate::error::{Error, Result};

/// Runs the command-line tools extraction depends on
#[derive(Debug, Clone)]
pub struct ExternalTools {
    config: OcrConfig,
}

impl ExternalTools {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    /// OCR an image with tesseract.
    ///
    /// The recognized text is staged as `ocr_<hex8>.txt` in `artifacts_dir`, read back,
    /// and the artifact deleted. A failed delete is logged only.
    pub fn ocr_image(&self, image_path: &Path, artifacts_dir: &Path) -> Result<String> {
        let output = Command::new(&self.config.tesseract_bin)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.config.language])
            .output()
            .map_err(|e| Error::Ocr(format!("failed to run {}: {}", self.config.tesseract_bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!("tesseract error: {}", stderr.trim())));
        }

        let text = stage_ocr_text(artifacts_dir, &output.stdout)?;
        tracing::info!(
            "OCR extracted {} characters from {}",
            text.len(),
            image_path.display()
        );
        Ok(text)
    }

    /// Convert a legacy `.doc` to DOCX bytes with headless LibreOffice
    pub fn convert_to_docx(&self, input: &Path) -> Result<Vec<u8>> {
        let out_dir = std::env::temp_dir().join(format!("invoice-rag-convert-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&out_dir)?;

        let result = self.run_libreoffice(input, &out_dir);

        if let Err(e) = fs::remove_dir_all(&out_dir) {
            tracing::debug!("Could not remove {}: {}", out_dir.display(), e);
        }

        result
    }

    fn run_libreoffice(&self, input: &Path, out_dir: &Path) -> Result<Vec<u8>> {
        let filename = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let output = Command::new(&self.config.libreoffice_bin)
            .args(["--headless", "--convert-to", "docx", "--outdir"])
            .arg(out_dir)
            .arg(input)
            .output()
            .map_err(|e| Error::file_parse(&filename, format!("LibreOffice conversion failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::file_parse(&filename, format!("LibreOffice error: {}", stderr.trim())));
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let converted = out_dir.join(format!("{}.docx", stem));

        fs::read(&converted)
            .map_err(|e| Error::file_parse(&filename, format!("Failed to read converted file: {}", e)))
    }
}

/// `ocr_<hex8>.txt` inside `dir`
pub fn ocr_artifact_path(dir: &Path) -> PathBuf {
    let token = uuid::Uuid::new_v4().simple().to_string();
    dir.join(format!("ocr_{}.txt", &token[..8]))
}

/// Write OCR output to an artifact, read it back as text and delete it.
///
/// The artifact is removed whether the write or the read failed.
fn stage_ocr_text(artifacts_dir: &Path, bytes: &[u8]) -> Result<String> {
    let artifact = ocr_artifact_path(artifacts_dir);

    let text = fs::write(&artifact, bytes)
        .and_then(|()| fs::read(&artifact))
        .map(|raw| String::from_utf8_lossy(&raw).into_owned());

    match fs::remove_file(&artifact) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to delete OCR artifact {}: {}", artifact.display(), e),
    }

    Ok(text?)
}
