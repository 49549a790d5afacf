//! # edgequake-ocr
//!
//! Turn scanned PDF documents into editable plain text with OCR, then
//! optionally clean the text up with a language model.
//!
//! ## Why this crate?
//!
//! Scanned PDFs have no text layer, so text extractors return nothing. This
//! crate rasterises each page at OCR resolution, runs Tesseract over the
//! pages in parallel, and stitches the results back together in page order.
//! A page that cannot be read never sinks the whole document: it becomes a
//! visible placeholder in the output so a reviewer knows where the gap is.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Validate   extension, size limit, %PDF magic
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Recognize  tesseract per page on a bounded worker pool
//!  ├─ 4. Clean      deterministic whitespace / invisible-char cleanup
//!  ├─ 5. Assemble   page order + page-break markers → <job_id>_output.txt
//!  └─ 6. Refine     (on request) chunked LLM correction of OCR artifacts
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr::{OcrConfig, OcrService, Upload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = OcrService::open(OcrConfig::default()).await?;
//!     let bytes = std::fs::read("scan.pdf")?;
//!     let extraction = service.submit(Upload::new("scan.pdf", bytes)).await?;
//!     println!("job {}: {}", extraction.job_id(), extraction.preview);
//!
//!     service.save(&extraction.job_id(), "corrected text").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2txt` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-ocr = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Tool | Used by | Lookup |
//! |------|---------|--------|
//! | pdfium | [`PdfiumRasterizer`] | `pdfium_lib_path`, else the system library |
//! | tesseract | [`TesseractEngine`] | `tesseract_cmd`, default `tesseract` on `PATH` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod refine;
pub mod service;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrConfig, OcrConfigBuilder, RefineConfig, RefineConfigBuilder};
pub use error::{ErrorKind, ExternalServiceKind, OcrError, PageError};
pub use job::{DocumentJob, JobOutcome, JobStatus};
pub use output::{
    Artifact, Extraction, ExtractionStats, RecognitionResult, RefineResponse, SaveResponse,
    SubmitResponse,
};
pub use pipeline::ocr::{OcrEngine, TesseractEngine};
pub use pipeline::render::{PageImage, PdfiumRasterizer, Rasterizer, RenderOptions};
pub use pipeline::validate::Upload;
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use refine::{
    ChatCompletionsBackend, Credential, ProviderBackend, RefineBackend, RefineHandle, Refiner,
};
pub use service::OcrService;
pub use store::{JobId, JobStore};
pub use tokio_util::sync::CancellationToken;
