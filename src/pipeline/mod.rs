//! Pipeline stages for PDF-to-text extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (a different rasteriser or OCR engine) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ render ──▶ recognize ──▶ postprocess ──▶ assemble
//! (upload)    (pdfium)   (ocr + pool)   (cleanup)      (page breaks)
//! ```
//!
//! 1. [`validate`]: reject bad uploads before a job exists
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`recognize`]: run the [`ocr::OcrEngine`] over pages concurrently,
//!    with [`encode`] producing the PNG the engine reads
//! 4. [`postprocess`]: deterministic cleanup of engine output
//! 5. [`assemble`]: ordered concatenation plus the display preview

pub mod assemble;
pub mod encode;
pub mod ocr;
pub mod postprocess;
pub mod recognize;
pub mod render;
pub mod validate;
