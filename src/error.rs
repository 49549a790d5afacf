//! Error types for the edgequake-ocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrError`]: **Fatal**. The operation cannot proceed at all (bad
//!   upload, unreadable PDF, missing artifact, refinement call rejected).
//!   Returned as `Err(OcrError)` from every public entry point.
//!
//! * [`PageError`]: **Non-fatal**. A single page could not be recognised
//!   but every other page is fine. Stored inside
//!   [`crate::output::RecognitionResult`] and rendered as a visible marker in
//!   the assembled text, so a reviewer can see exactly where the gap is.
//!
//! Callers that only need the coarse category (for a JSON envelope or an
//! HTTP status) use [`OcrError::kind`].

use crate::store::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Validation errors (no job created) ────────────────────────────────
    /// Upload name does not carry an accepted extension.
    #[error("Unsupported file type '{filename}': only {allowed} files are accepted")]
    UnsupportedFileType { filename: String, allowed: String },

    /// Upload exceeds the configured size limit.
    #[error("File '{filename}' is {size} bytes; the limit is {limit} bytes")]
    FileTooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    /// Upload carried no bytes at all.
    #[error("File '{filename}' is empty")]
    EmptyUpload { filename: String },

    /// Upload has the right name but the content is not a PDF.
    #[error("File '{filename}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { filename: String, magic: [u8; 4] },

    // ── Document errors (job aborted, no artifact) ────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Document is unreadable: {detail}")]
    CorruptDocument { detail: String },

    /// PDF requires a password but none (or the wrong one) was provided.
    #[error("Document is encrypted and requires a password")]
    PasswordRequired,

    /// PDF opened but contains no pages.
    #[error("Document contains no pages")]
    NoPages,

    /// pdfium could not render a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// Every page failed recognition; no artifact was written.
    #[error("All {total} pages failed recognition for job {job_id}\nFirst error: {first_error}")]
    AllPagesFailed {
        job_id: JobId,
        total: usize,
        first_error: String,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// No artifact exists for this job id (never created, or deleted).
    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    /// The supplied string is not a well-formed job id.
    #[error("Invalid job id '{input}'")]
    InvalidJobId { input: String },

    /// Reading or writing an artifact failed.
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Refinement errors (text left unmodified) ──────────────────────────
    /// The caller-supplied credential is malformed; no call was issued.
    #[error("Invalid credential: {reason}")]
    InvalidCredential { reason: String },

    /// The external refinement service failed. Not retried automatically.
    #[error("Refinement service error ({kind}): {message}")]
    ExternalService {
        kind: ExternalServiceKind,
        message: String,
    },

    // ── Lifecycle errors ──────────────────────────────────────────────────
    /// The job was cancelled before every page was recognised.
    #[error("Job cancelled")]
    Cancelled,

    /// The job exceeded its wall-time budget.
    #[error("Job exceeded its time limit of {limit:?}")]
    JobTimedOut { limit: Duration },

    /// A job state transition that the lifecycle does not allow.
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// Coarse category of this error, suitable for a wire envelope.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcrError::UnsupportedFileType { .. }
            | OcrError::FileTooLarge { .. }
            | OcrError::EmptyUpload { .. }
            | OcrError::NotAPdf { .. } => ErrorKind::Validation,

            OcrError::CorruptDocument { .. }
            | OcrError::PasswordRequired
            | OcrError::NoPages
            | OcrError::RasterisationFailed { .. }
            | OcrError::PdfiumBindingFailed(_)
            | OcrError::AllPagesFailed { .. } => ErrorKind::Document,

            OcrError::JobNotFound { .. } => ErrorKind::NotFound,
            OcrError::InvalidJobId { .. } => ErrorKind::Validation,
            OcrError::Storage { .. } => ErrorKind::Storage,

            OcrError::InvalidCredential { .. } => ErrorKind::Credential,
            OcrError::ExternalService { .. } => ErrorKind::ExternalService,

            OcrError::Cancelled | OcrError::JobTimedOut { .. } => ErrorKind::Cancelled,

            OcrError::InvalidTransition { .. }
            | OcrError::InvalidConfig(_)
            | OcrError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may reasonably re-trigger the same request.
    ///
    /// Every external-service failure qualifies: a refinement call never
    /// touches stored text, so the caller can fix the credential or wait out
    /// a rate limit and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OcrError::ExternalService { .. }
                | OcrError::Storage { .. }
                | OcrError::JobTimedOut { .. }
        )
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OcrError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Error categories exposed to callers of the service façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Document,
    Storage,
    NotFound,
    Credential,
    ExternalService,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Document => "document",
            ErrorKind::Storage => "storage",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Credential => "credential",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an external refinement call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ExternalServiceKind {
    /// Connection refused, DNS failure, reset, …
    Network,
    /// The request did not complete within the configured timeout.
    Timeout,
    /// HTTP 401/403: the credential was rejected.
    Authentication,
    /// HTTP 429: caller should back off.
    RateLimited { retry_after_secs: Option<u64> },
    /// Any other non-success HTTP status.
    Api { status: u16 },
    /// The response body did not contain the expected completion.
    MalformedResponse,
}

impl fmt::Display for ExternalServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalServiceKind::Network => f.write_str("network"),
            ExternalServiceKind::Timeout => f.write_str("timeout"),
            ExternalServiceKind::Authentication => f.write_str("authentication"),
            ExternalServiceKind::RateLimited {
                retry_after_secs: Some(secs),
            } => write!(f, "rate limited, retry after {secs}s"),
            ExternalServiceKind::RateLimited {
                retry_after_secs: None,
            } => f.write_str("rate limited"),
            ExternalServiceKind::Api { status } => write!(f, "HTTP {status}"),
            ExternalServiceKind::MalformedResponse => f.write_str("malformed response"),
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::RecognitionResult`] when a page fails.
/// The job continues unless ALL pages fail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// The OCR engine ran but reported an error.
    #[error("Page {page}: OCR engine failed: {detail}")]
    EngineFailed { page: usize, detail: String },

    /// The OCR engine binary/library could not be started.
    #[error("Page {page}: OCR engine unavailable: {detail}")]
    EngineUnavailable { page: usize, detail: String },

    /// The page bitmap could not be handed to the engine.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The worker recognising this page panicked.
    #[error("Page {page}: recognition worker crashed: {detail}")]
    WorkerPanicked { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number this error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::EngineFailed { page, .. }
            | PageError::EngineUnavailable { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::WorkerPanicked { page, .. } => *page,
        }
    }
}
