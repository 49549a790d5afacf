//! OCR engines: turn one page bitmap into raw text.
//!
//! The [`OcrEngine`] trait is synchronous because recognition is CPU-bound;
//! the worker pool in [`super::recognize`] runs each call on a blocking
//! thread. [`TesseractEngine`] shells out to the `tesseract` binary, which
//! keeps the build free of native Tesseract/Leptonica linkage.

use crate::config::OcrConfig;
use crate::error::PageError;
use crate::pipeline::encode::encode_png;
use crate::pipeline::render::PageImage;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Recognises text on a single page.
///
/// Implementations must be `Send + Sync`: one engine instance is shared by
/// every worker. Errors are per-page and never abort the job.
pub trait OcrEngine: Send + Sync {
    /// Engine identifier for logs, e.g. `"tesseract"`.
    fn name(&self) -> &'static str;

    /// Recognise `page`, returning raw (uncleaned) text.
    fn recognize(&self, page: &PageImage) -> Result<String, PageError>;
}

/// Tesseract OCR via its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    cmd: PathBuf,
    language: String,
    dpi: u32,
}

impl TesseractEngine {
    pub fn new(cmd: impl Into<PathBuf>, language: impl Into<String>, dpi: u32) -> Self {
        Self {
            cmd: cmd.into(),
            language: language.into(),
            dpi,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(&config.tesseract_cmd, &config.ocr_language, config.dpi)
    }

    /// Whether the configured binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.cmd)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::from_config(&OcrConfig::default())
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, page: &PageImage) -> Result<String, PageError> {
        let page_num = page.ordinal + 1;
        let png = encode_png(&page.image).map_err(|e| PageError::EncodeFailed {
            page: page_num,
            detail: e.to_string(),
        })?;

        // The temp file is removed when `tmp` drops, whatever happens below.
        let mut tmp = tempfile::Builder::new()
            .prefix("ocr-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| PageError::EncodeFailed {
                page: page_num,
                detail: format!("tempfile: {e}"),
            })?;
        tmp.write_all(&png)
            .and_then(|_| tmp.flush())
            .map_err(|e| PageError::EncodeFailed {
                page: page_num,
                detail: format!("tempfile write: {e}"),
            })?;

        let output = Command::new(&self.cmd)
            .arg(tmp.path())
            .arg("stdout")
            .args(["-l", &self.language])
            .args(["--dpi", &self.dpi.to_string()])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout).into_owned();
                debug!("Page {}: tesseract produced {} bytes", page_num, text.len());
                Ok(text)
            }
            Ok(output) => Err(PageError::EngineFailed {
                page: page_num,
                detail: format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PageError::EngineUnavailable {
                    page: page_num,
                    detail: format!(
                        "'{}' not found (install tesseract-ocr)",
                        self.cmd.display()
                    ),
                })
            }
            Err(e) => Err(PageError::EngineFailed {
                page: page_num,
                detail: e.to_string(),
            }),
        }
    }
}
