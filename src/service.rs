//! Service façade: the operations a transport layer exposes.
//!
//! ## Submit Pipeline
//!
//! ```text
//! submit(upload)
//!  ├─ 1. Validate   extension, size, %PDF magic (no job on failure)
//!  ├─ 2. Sweep      drop artifacts older than the retention TTL
//!  ├─ 3. Render     all pages, one decode context (spawn_blocking)
//!  ├─ 4. Recognize  bounded worker pool, one result per page
//!  ├─ 5. Assemble   page order, break markers, failed-page placeholders
//!  └─ 6. Persist    <job_id>_output.txt, then build the preview
//! ```
//!
//! Steps 3–4 share the job's wall-time budget and cancellation token. A job
//! in which every page failed is reported as [`OcrError::AllPagesFailed`]
//! and leaves no artifact behind.

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::job::{DocumentJob, JobOutcome, JobStatus};
use crate::output::{Artifact, Extraction, ExtractionStats, RecognitionResult, ARTIFACT_CONTENT_TYPE};
use crate::pipeline::assemble::{assemble_text, preview};
use crate::pipeline::ocr::{OcrEngine, TesseractEngine};
use crate::pipeline::recognize::recognize_pages;
use crate::pipeline::render::{render_pages, PdfiumRasterizer, Rasterizer, RenderOptions};
use crate::pipeline::validate::{validate_upload, Upload};
use crate::refine::{RefineHandle, Refiner};
use crate::store::{JobId, JobStore};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wires validation, rasterisation, recognition, storage and refinement.
///
/// Cheap to clone; clones share the same store directory and backends.
#[derive(Clone)]
pub struct OcrService {
    config: Arc<OcrConfig>,
    store: JobStore,
    rasterizer: Arc<dyn Rasterizer>,
    engine: Arc<dyn OcrEngine>,
    refiner: Option<Refiner>,
}

impl OcrService {
    /// pdfium + tesseract, storing artifacts under `config.output_dir`.
    pub async fn open(config: OcrConfig) -> Result<Self, OcrError> {
        let store = JobStore::open(&config.output_dir).await?;
        Ok(Self::new(config, store))
    }

    /// Service over an existing store with the default pdfium and tesseract
    /// backends and no refinement.
    pub fn new(config: OcrConfig, store: JobStore) -> Self {
        let engine = TesseractEngine::from_config(&config);
        Self {
            config: Arc::new(config),
            store,
            rasterizer: Arc::new(PdfiumRasterizer),
            engine: Arc::new(engine),
            refiner: None,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_refiner(mut self, refiner: Refiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    // ── Extraction ───────────────────────────────────────────────────────

    /// Validate, OCR and persist an upload.
    pub async fn submit(&self, upload: Upload) -> Result<Extraction, OcrError> {
        self.submit_with_cancel(upload, CancellationToken::new()).await
    }

    /// As [`OcrService::submit`], abandoning the job when `cancel` fires.
    ///
    /// Pages not yet started are skipped and the call returns
    /// [`OcrError::Cancelled`]; no artifact is written.
    pub async fn submit_with_cancel(
        &self,
        upload: Upload,
        cancel: CancellationToken,
    ) -> Result<Extraction, OcrError> {
        validate_upload(&upload, &self.config)?;

        let mut job = DocumentJob::new();
        info!(
            "Job {}: accepted '{}' ({} bytes)",
            job.id,
            upload.filename,
            upload.size()
        );

        match self.run_job(&mut job, upload.bytes, &cancel).await {
            Ok(extraction) => Ok(extraction),
            Err(e) => {
                if !job.status.is_terminal() {
                    if let Err(te) = job.fail(&e) {
                        warn!("Job {}: could not record failure: {}", job.id, te);
                    }
                }
                warn!("Job {} failed: {}", job.id, e);
                Err(e)
            }
        }
    }

    async fn run_job(
        &self,
        job: &mut DocumentJob,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Extraction, OcrError> {
        let total_start = Instant::now();
        self.sweep_quietly().await;

        let job_id = job.id;
        let work = self.render_and_recognize(job, bytes, cancel);
        let (results, render_ms, recognition_ms) = match self.config.job_timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| OcrError::JobTimedOut { limit })??,
            None => work.await?,
        };

        let outcome = JobOutcome::from_results(&results);
        if outcome == JobOutcome::Failed {
            let first_error = results
                .iter()
                .find_map(|r| r.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(OcrError::AllPagesFailed {
                job_id,
                total: results.len(),
                first_error,
            });
        }

        let text = assemble_text(&results, &self.config.page_break);
        self.store.create_with_id(&job_id, &text).await?;
        job.artifact = Some(self.store.artifact_path(&job_id));
        job.transition(JobStatus::Assembled { outcome })?;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let stats = ExtractionStats {
            total_pages: results.len(),
            succeeded_pages: succeeded,
            failed_pages: results.len() - succeeded,
            render_duration_ms: render_ms,
            recognition_duration_ms: recognition_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Job {}: {}/{} pages, {} chars, {}ms total",
            job_id,
            stats.succeeded_pages,
            stats.total_pages,
            text.chars().count(),
            stats.total_duration_ms
        );

        Ok(Extraction {
            job: job.clone(),
            preview: preview(&text, self.config.preview_chars),
            text,
            pages: results,
            stats,
        })
    }

    /// Rasterise then recognise; returns results with stage durations in ms.
    async fn render_and_recognize(
        &self,
        job: &mut DocumentJob,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<RecognitionResult>, u64, u64), OcrError> {
        job.transition(JobStatus::Rasterizing)?;
        let render_start = Instant::now();
        let options = RenderOptions::from(self.config.as_ref());
        let pages = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OcrError::Cancelled),
            pages = render_pages(Arc::clone(&self.rasterizer), bytes, options) => pages?,
        };
        let render_ms = render_start.elapsed().as_millis() as u64;

        job.page_count = pages.len();
        info!("Job {}: rendered {} pages in {}ms", job.id, pages.len(), render_ms);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_job_start(pages.len());
        }

        job.transition(JobStatus::Recognizing)?;
        let recognition_start = Instant::now();
        let results = recognize_pages(
            pages,
            Arc::clone(&self.engine),
            self.config.concurrency,
            cancel,
            self.config.progress_callback.as_ref(),
        )
        .await?;

        Ok((
            results,
            render_ms,
            recognition_start.elapsed().as_millis() as u64,
        ))
    }

    // ── Artifacts ────────────────────────────────────────────────────────

    /// Full text of a job's artifact.
    pub async fn read(&self, job_id: &JobId) -> Result<String, OcrError> {
        self.store.read(job_id).await
    }

    /// Replace a job's text with user edits. Idempotent.
    pub async fn save(&self, job_id: &JobId, text: &str) -> Result<(), OcrError> {
        self.store.overwrite(job_id, text).await?;
        info!("Job {}: saved {} chars", job_id, text.chars().count());
        Ok(())
    }

    /// The artifact as an attachment.
    pub async fn download(&self, job_id: &JobId) -> Result<Artifact, OcrError> {
        let text = self.store.read(job_id).await?;
        Ok(Artifact {
            filename: job_id.artifact_file_name(),
            content_type: ARTIFACT_CONTENT_TYPE,
            bytes: text.into_bytes(),
        })
    }

    /// Remove a job's artifact. Deleting an unknown job is not an error.
    pub async fn delete(&self, job_id: &JobId) -> Result<(), OcrError> {
        self.store.delete(job_id).await
    }

    /// Apply the retention policy now; returns the number of artifacts removed.
    pub async fn sweep(&self) -> Result<usize, OcrError> {
        match self.config.artifact_ttl {
            Some(ttl) => self.store.sweep_expired(ttl).await,
            None => Ok(0),
        }
    }

    async fn sweep_quietly(&self) {
        if let Err(e) = self.sweep().await {
            warn!("Retention sweep failed: {}", e);
        }
    }

    // ── Refinement ───────────────────────────────────────────────────────

    fn refiner(&self) -> Result<&Refiner, OcrError> {
        self.refiner
            .as_ref()
            .ok_or_else(|| OcrError::InvalidConfig("No refinement backend configured".into()))
    }

    /// Refine arbitrary text with the caller's credential. Stateless.
    pub async fn refine(&self, text: &str, credential: &str) -> Result<String, OcrError> {
        self.refiner()?.refine(text, credential).await
    }

    /// Start a refinement in the background.
    pub fn spawn_refine(&self, text: String, credential: String) -> Result<RefineHandle, OcrError> {
        Ok(self.refiner()?.spawn_refine(text, credential))
    }

    /// Refine a job's stored text in place.
    ///
    /// The job moves through `Cleaning` and back to `Assembled` whether or
    /// not the call succeeds. On failure the artifact is left as it was.
    pub async fn refine_job(
        &self,
        job: &mut DocumentJob,
        credential: &str,
    ) -> Result<String, OcrError> {
        let refiner = self.refiner()?;
        let outcome = job.outcome().ok_or_else(|| OcrError::InvalidTransition {
            from: job.status.to_string(),
            to: "cleaning".into(),
        })?;
        job.transition(JobStatus::Cleaning { outcome })?;

        let job_id = job.id;
        let result = async {
            let text = self.store.read(&job_id).await?;
            let refined = refiner.refine(&text, credential).await?;
            self.store.overwrite(&job_id, &refined).await?;
            Ok::<_, OcrError>(refined)
        }
        .await;

        job.transition(JobStatus::Assembled { outcome })?;
        match &result {
            Ok(refined) => info!("Job {}: refined to {} chars", job_id, refined.chars().count()),
            Err(e) => warn!("Job {}: refinement failed, text unchanged: {}", job_id, e),
        }
        result
    }
}

impl std::fmt::Debug for OcrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrService")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("engine", &self.engine.name())
            .field("refiner", &self.refiner)
            .finish_non_exhaustive()
    }
}
