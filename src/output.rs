//! Result types produced by extraction, plus the response envelopes a
//! transport layer serialises for its callers.

use crate::error::{ErrorKind, OcrError, PageError};
use crate::job::{DocumentJob, JobOutcome};
use crate::store::JobId;
use serde::{Deserialize, Serialize};

/// Recognition outcome for one page.
///
/// Exactly one exists per page ordinal, even when recognition failed: a
/// failed page carries empty text and its [`PageError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// 0-based page ordinal.
    pub ordinal: usize,
    /// Cleaned page text; empty on failure.
    pub text: String,
    /// Wall-clock time spent on this page.
    pub duration_ms: u64,
    /// `Some` when recognition failed.
    pub error: Option<PageError>,
}

impl RecognitionResult {
    pub fn success(ordinal: usize, text: String) -> Self {
        Self {
            ordinal,
            text,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn failure(ordinal: usize, error: PageError) -> Self {
        Self {
            ordinal,
            text: String::new(),
            duration_ms: 0,
            error: Some(error),
        }
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// 1-indexed page number.
    pub fn page_num(&self) -> usize {
        self.ordinal + 1
    }
}

/// Aggregate statistics for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    pub render_duration_ms: u64,
    pub recognition_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a successful (possibly partial) extraction produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub job: DocumentJob,
    /// Full assembled text as persisted.
    pub text: String,
    /// Bounded-length preview for display.
    pub preview: String,
    /// Per-page results in ordinal order.
    pub pages: Vec<RecognitionResult>,
    pub stats: ExtractionStats,
}

impl Extraction {
    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        self.job.outcome()
    }
}

/// Media type of every downloaded artifact.
pub const ARTIFACT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Attachment-style download of a job artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

// ── Wire envelopes ───────────────────────────────────────────────────────

/// Response to a document submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Extraction, OcrError>> for SubmitResponse {
    fn from(result: Result<Extraction, OcrError>) -> Self {
        match result {
            Ok(extraction) => SubmitResponse {
                success: true,
                job_id: Some(extraction.job.id.to_string()),
                extracted_text: Some(extraction.preview),
                outcome: extraction.job.outcome(),
                page_count: Some(extraction.job.page_count),
                failed_pages: Some(extraction.stats.failed_pages),
                error_kind: None,
                error: None,
            },
            Err(e) => {
                // An all-pages-failed job still has an id the caller can quote.
                let job_id = match &e {
                    OcrError::AllPagesFailed { job_id, .. } => Some(job_id.to_string()),
                    _ => None,
                };
                SubmitResponse {
                    success: false,
                    job_id,
                    extracted_text: None,
                    outcome: None,
                    page_count: None,
                    failed_pages: None,
                    error_kind: Some(e.kind()),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Response to an overwrite (save) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<(), OcrError>> for SaveResponse {
    fn from(result: Result<(), OcrError>) -> Self {
        match result {
            Ok(()) => SaveResponse {
                success: true,
                error_kind: None,
                error: None,
            },
            Err(e) => SaveResponse {
                success: false,
                error_kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Response to a refinement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String, OcrError>> for RefineResponse {
    fn from(result: Result<String, OcrError>) -> Self {
        match result {
            Ok(text) => RefineResponse {
                success: true,
                refined_text: Some(text),
                error_kind: None,
                error: None,
            },
            Err(e) => RefineResponse {
                success: false,
                refined_text: None,
                error_kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        }
    }
}
