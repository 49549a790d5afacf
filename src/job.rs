//! Document job record and lifecycle.
//!
//! ```text
//! Created ──▶ Rasterizing ──▶ Recognizing ──▶ Assembled{Success|PartialFailure}
//!    │             │               │                   │   ▲
//!    └─────────────┴───────────────┴──▶ Failed{..}     ▼   │
//!                                                   Cleaning
//! ```
//!
//! `Assembled` is re-enterable through `Cleaning` until the job is deleted.
//! `Failed` is terminal.

use crate::error::{ErrorKind, OcrError};
use crate::output::RecognitionResult;
use crate::store::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Job-level outcome derived from the per-page results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Every page was recognised.
    Success,
    /// At least one page succeeded and at least one failed.
    PartialFailure,
    /// No page was recognised; no artifact is produced.
    Failed,
}

impl JobOutcome {
    /// Classify a complete set of page results.
    pub fn from_results(results: &[RecognitionResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        match succeeded {
            0 => JobOutcome::Failed,
            n if n == results.len() => JobOutcome::Success,
            _ => JobOutcome::PartialFailure,
        }
    }
}

/// Why a job ended in [`JobStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&OcrError> for FailureReason {
    fn from(e: &OcrError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Lifecycle state of a [`DocumentJob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobStatus {
    Created,
    Rasterizing,
    Recognizing,
    Assembled { outcome: JobOutcome },
    Cleaning { outcome: JobOutcome },
    Failed { reason: FailureReason },
}

impl JobStatus {
    fn name(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Rasterizing => "rasterizing",
            JobStatus::Recognizing => "recognizing",
            JobStatus::Assembled { .. } => "assembled",
            JobStatus::Cleaning { .. } => "cleaning",
            JobStatus::Failed { .. } => "failed",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Created, Rasterizing) => true,
            (Rasterizing, Recognizing) => true,
            (Recognizing, Assembled { outcome }) => *outcome != JobOutcome::Failed,
            (Created | Rasterizing | Recognizing, Failed { .. }) => true,
            (Assembled { outcome: a }, Cleaning { outcome: b }) => a == b,
            (Cleaning { outcome: a }, Assembled { outcome: b }) => a == b,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed { .. })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Assembled { outcome } | JobStatus::Cleaning { outcome } => {
                write!(f, "{}({:?})", self.name(), outcome)
            }
            JobStatus::Failed { reason } => write!(f, "failed({})", reason.kind),
            _ => f.write_str(self.name()),
        }
    }
}

/// One upload-to-artifact processing unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentJob {
    pub id: JobId,
    pub status: JobStatus,
    /// Pages in the source document; 0 until rasterisation completes.
    pub page_count: usize,
    pub created_at: DateTime<Utc>,
    /// Artifact path once persisted.
    pub artifact: Option<PathBuf>,
}

impl DocumentJob {
    /// A freshly validated job with a new id.
    pub fn new() -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Created,
            page_count: 0,
            created_at: Utc::now(),
            artifact: None,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle forbids.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), OcrError> {
        if !self.status.can_transition_to(&next) {
            return Err(OcrError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!("Job {}: {} → {}", self.id, self.status, next);
        self.status = next;
        Ok(())
    }

    /// Record `err` as the terminal failure of this job.
    pub fn fail(&mut self, err: &OcrError) -> Result<(), OcrError> {
        self.transition(JobStatus::Failed {
            reason: FailureReason::from(err),
        })
    }

    /// Outcome of an assembled job, if it has one.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.status {
            JobStatus::Assembled { outcome } | JobStatus::Cleaning { outcome } => Some(outcome),
            _ => None,
        }
    }
}

impl Default for DocumentJob {
    fn default() -> Self {
        Self::new()
    }
}
