//! Integration tests for the service façade.
//!
//! pdfium and tesseract are replaced by in-process fakes so these run
//! everywhere, quickly, with no external tools or network.

use async_trait::async_trait;
use edgequake_ocr::error::ErrorKind;
use edgequake_ocr::{
    CancellationToken, Credential, DocumentJob, JobOutcome, JobStatus, JobStore, OcrConfig,
    OcrEngine, OcrError, OcrService, PageError, PageImage, Rasterizer, RefineBackend,
    RefineConfig, RefineResponse, Refiner, RenderOptions, SubmitResponse, Upload,
};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Produces `pages` blank bitmaps, or fails like a corrupt file.
struct FakeRasterizer {
    pages: usize,
    corrupt: bool,
}

impl FakeRasterizer {
    fn pages(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            corrupt: false,
        })
    }

    fn corrupt() -> Arc<Self> {
        Arc::new(Self {
            pages: 0,
            corrupt: true,
        })
    }
}

impl Rasterizer for FakeRasterizer {
    fn rasterize(
        &self,
        _bytes: &[u8],
        _options: &RenderOptions,
    ) -> Result<Vec<PageImage>, OcrError> {
        if self.corrupt {
            return Err(OcrError::CorruptDocument {
                detail: "xref table damaged".into(),
            });
        }
        Ok((0..self.pages)
            .map(|ordinal| PageImage {
                ordinal,
                image: DynamicImage::new_luma8(2, 2),
            })
            .collect())
    }
}

/// Returns a scripted text per page; `None` makes that page fail.
struct ScriptedEngine {
    texts: Vec<Option<&'static str>>,
    delay: Duration,
}

impl ScriptedEngine {
    fn new(texts: Vec<Option<&'static str>>) -> Arc<Self> {
        Arc::new(Self {
            texts,
            delay: Duration::ZERO,
        })
    }

    fn slow(pages: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            texts: vec![Some("slow"); pages],
            delay,
        })
    }
}

impl OcrEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn recognize(&self, page: &PageImage) -> Result<String, PageError> {
        std::thread::sleep(self.delay);
        match self.texts.get(page.ordinal).copied().flatten() {
            Some(text) => Ok(format!("{text}  \r\n\u{000C}")),
            None => Err(PageError::EngineFailed {
                page: page.ordinal + 1,
                detail: "image too noisy".into(),
            }),
        }
    }
}

/// Fixes two known misspellings.
struct Speller;

#[async_trait]
impl RefineBackend for Speller {
    fn name(&self) -> &str {
        "speller"
    }

    async fn refine_chunk(
        &self,
        _system_prompt: &str,
        chunk: &str,
        _credential: &Credential,
    ) -> Result<String, OcrError> {
        Ok(chunk.replace("Helllo", "Hello").replace("Wrold", "World"))
    }
}

/// Always rejects the credential, as a real endpoint would with a bad key.
struct Rejecting;

#[async_trait]
impl RefineBackend for Rejecting {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn refine_chunk(
        &self,
        _system_prompt: &str,
        _chunk: &str,
        _credential: &Credential,
    ) -> Result<String, OcrError> {
        Err(OcrError::ExternalService {
            kind: edgequake_ocr::ExternalServiceKind::Authentication,
            message: "HTTP 401: invalid api key".into(),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const KEY: &str = "sk-test-0123456789abcdef";
const BREAK: &str = "\n\n--- page break ---\n\n";

fn pdf_upload(name: &str) -> Upload {
    Upload::new(name, b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj\n".to_vec())
}

fn config_in(dir: &Path) -> OcrConfig {
    OcrConfig::builder()
        .output_dir(dir)
        .concurrency(2)
        .build()
        .unwrap()
}

async fn service(
    dir: &TempDir,
    config: OcrConfig,
    rasterizer: Arc<dyn Rasterizer>,
    engine: Arc<dyn OcrEngine>,
) -> OcrService {
    let store = JobStore::open(dir.path()).await.unwrap();
    OcrService::new(config, store)
        .with_rasterizer(rasterizer)
        .with_engine(engine)
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_page_document_round_trip() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(3),
        ScriptedEngine::new(vec![Some("First page"), Some("Second page"), Some("Third page")]),
    )
    .await;

    let extraction = svc.submit(pdf_upload("scan.pdf")).await.unwrap();
    let job_id = extraction.job_id();

    let expected = format!("First page{BREAK}Second page{BREAK}Third page");
    assert_eq!(extraction.text, expected);
    assert_eq!(extraction.preview, expected);
    assert_eq!(extraction.text.matches("--- page break ---").count(), 2);
    assert_eq!(extraction.outcome(), Some(JobOutcome::Success));
    assert_eq!(extraction.job.page_count, 3);
    assert_eq!(extraction.stats.succeeded_pages, 3);
    assert_eq!(extraction.stats.failed_pages, 0);
    assert!(extraction.job.artifact.as_ref().unwrap().exists());

    // The persisted artifact is the full text.
    assert_eq!(svc.read(&job_id).await.unwrap(), expected);

    // Overwrite, then read back exactly.
    let edited = "Edited text\n\nwith  spacing \n";
    svc.save(&job_id, edited).await.unwrap();
    assert_eq!(svc.read(&job_id).await.unwrap(), edited);

    // Saving the same text again is a no-op.
    svc.save(&job_id, edited).await.unwrap();
    assert_eq!(svc.read(&job_id).await.unwrap(), edited);

    let artifact = svc.download(&job_id).await.unwrap();
    assert_eq!(artifact.filename, format!("{job_id}_output.txt"));
    assert_eq!(artifact.content_type, "text/plain; charset=utf-8");
    assert_eq!(artifact.bytes, edited.as_bytes());

    svc.delete(&job_id).await.unwrap();
    let err = svc.read(&job_id).await.unwrap_err();
    assert!(matches!(err, OcrError::JobNotFound { .. }));
    // Deleting again is harmless.
    svc.delete(&job_id).await.unwrap();
}

#[tokio::test]
async fn submit_response_carries_preview_not_full_text() {
    let dir = TempDir::new().unwrap();
    let config = OcrConfig::builder()
        .output_dir(dir.path())
        .preview_chars(10)
        .build()
        .unwrap();
    let svc = service(
        &dir,
        config,
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("A fairly long line of recognised text")]),
    )
    .await;

    let response = SubmitResponse::from(svc.submit(pdf_upload("a.pdf")).await);
    assert!(response.success);
    assert_eq!(response.extracted_text.as_deref(), Some("A fairly l..."));
    assert_eq!(response.page_count, Some(1));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["outcome"], "success");
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn failed_page_becomes_placeholder_and_job_is_partial() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(3),
        ScriptedEngine::new(vec![Some("One"), None, Some("Three")]),
    )
    .await;

    let extraction = svc.submit(pdf_upload("scan.pdf")).await.unwrap();
    assert_eq!(extraction.outcome(), Some(JobOutcome::PartialFailure));
    assert_eq!(
        extraction.text,
        format!("One{BREAK}[page 2: text could not be recognized]{BREAK}Three")
    );
    assert_eq!(extraction.stats.failed_pages, 1);
    assert!(matches!(
        extraction.pages[1].error,
        Some(PageError::EngineFailed { page: 2, .. })
    ));

    let response = SubmitResponse::from(Ok(extraction));
    assert!(response.success);
    assert_eq!(response.failed_pages, Some(1));
}

#[tokio::test]
async fn blank_last_page_keeps_one_segment_per_page() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(3),
        ScriptedEngine::new(vec![Some("one"), Some("two"), Some("")]),
    )
    .await;

    let extraction = svc.submit(pdf_upload("scan.pdf")).await.unwrap();
    let stored = svc.read(&extraction.job_id()).await.unwrap();
    assert_eq!(stored.split(BREAK).collect::<Vec<_>>(), ["one", "two", ""]);
}

#[tokio::test]
async fn all_pages_failing_leaves_no_artifact() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(2),
        ScriptedEngine::new(vec![None, None]),
    )
    .await;

    let err = svc.submit(pdf_upload("blank.pdf")).await.unwrap_err();
    let job_id = match &err {
        OcrError::AllPagesFailed { job_id, total, .. } => {
            assert_eq!(*total, 2);
            *job_id
        }
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(err.kind(), ErrorKind::Document);

    assert!(matches!(
        svc.read(&job_id).await.unwrap_err(),
        OcrError::JobNotFound { .. }
    ));
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn rejected_uploads_create_nothing() {
    let dir = TempDir::new().unwrap();
    let config = OcrConfig::builder()
        .output_dir(dir.path())
        .max_upload_bytes(64)
        .build()
        .unwrap();
    let svc = service(
        &dir,
        config,
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("x")]),
    )
    .await;

    let cases = [
        Upload::new("notes.txt", b"%PDF-1.7".to_vec()),
        Upload::new("huge.pdf", [b"%PDF".as_slice(), &[0u8; 100]].concat()),
        Upload::new("empty.pdf", Vec::new()),
        Upload::new("image.pdf", b"\xff\xd8\xff\xe0JFIF".to_vec()),
    ];
    for upload in cases {
        let name = upload.filename.clone();
        let response = SubmitResponse::from(svc.submit(upload).await);
        assert!(!response.success, "{name}");
        assert_eq!(response.error_kind, Some(ErrorKind::Validation), "{name}");
        assert!(response.job_id.is_none(), "{name}");
    }
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn corrupt_document_aborts_the_job() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::corrupt(),
        ScriptedEngine::new(vec![]),
    )
    .await;

    let err = svc.submit(pdf_upload("broken.pdf")).await.unwrap_err();
    assert!(matches!(err, OcrError::CorruptDocument { .. }));
    assert_eq!(err.kind(), ErrorKind::Document);
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn concurrent_jobs_are_independent() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(2),
        ScriptedEngine::new(vec![Some("left"), Some("right")]),
    )
    .await;

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let svc = svc.clone();
            tokio::spawn(async move { svc.submit(pdf_upload(&format!("doc{i}.pdf"))).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let extraction = handle.await.unwrap().unwrap();
        ids.push(extraction.job_id());
    }
    ids.sort_by_key(|id| id.to_string());
    ids.dedup();
    assert_eq!(ids.len(), 4);

    // Editing one job leaves the others untouched.
    svc.save(&ids[0], "changed").await.unwrap();
    for id in &ids[1..] {
        assert_eq!(svc.read(id).await.unwrap(), format!("left{BREAK}right"));
    }
}

// ── Cancellation and time limits ─────────────────────────────────────────────

#[tokio::test]
async fn cancelled_job_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(3),
        ScriptedEngine::new(vec![Some("a"), Some("b"), Some("c")]),
    )
    .await;

    let token = CancellationToken::new();
    token.cancel();
    let err = svc
        .submit_with_cancel(pdf_upload("scan.pdf"), token)
        .await
        .unwrap_err();
    assert!(matches!(err, OcrError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn job_over_time_limit_is_abandoned() {
    let dir = TempDir::new().unwrap();
    let config = OcrConfig::builder()
        .output_dir(dir.path())
        .concurrency(1)
        .job_timeout(Some(Duration::from_millis(100)))
        .build()
        .unwrap();
    let svc = service(
        &dir,
        config,
        FakeRasterizer::pages(4),
        ScriptedEngine::slow(4, Duration::from_millis(300)),
    )
    .await;

    let err = svc.submit(pdf_upload("slow.pdf")).await.unwrap_err();
    assert!(matches!(
        err,
        OcrError::JobTimedOut { limit } if limit == Duration::from_millis(100)
    ));
    assert!(err.to_string().contains("100ms"));
    assert!(err.is_recoverable());
    assert_eq!(files_in(dir.path()), 0);
}

// ── Retention ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_artifacts_are_swept_on_submit() {
    let dir = TempDir::new().unwrap();
    let config = OcrConfig::builder()
        .output_dir(dir.path())
        .artifact_ttl(Some(Duration::from_millis(20)))
        .build()
        .unwrap();
    let svc = service(
        &dir,
        config,
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("text")]),
    )
    .await;

    let first = svc.submit(pdf_upload("a.pdf")).await.unwrap().job_id();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = svc.submit(pdf_upload("b.pdf")).await.unwrap().job_id();

    assert!(matches!(
        svc.read(&first).await.unwrap_err(),
        OcrError::JobNotFound { .. }
    ));
    assert_eq!(svc.read(&second).await.unwrap(), "text");
}

#[tokio::test]
async fn sweep_is_a_no_op_without_ttl() {
    let dir = TempDir::new().unwrap();
    let config = OcrConfig::builder()
        .output_dir(dir.path())
        .artifact_ttl(None)
        .build()
        .unwrap();
    let svc = service(
        &dir,
        config,
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("keep")]),
    )
    .await;

    let id = svc.submit(pdf_upload("a.pdf")).await.unwrap().job_id();
    assert_eq!(svc.sweep().await.unwrap(), 0);
    assert_eq!(svc.read(&id).await.unwrap(), "keep");
}

// ── Refinement ───────────────────────────────────────────────────────────────

fn refiner(backend: Arc<dyn RefineBackend>) -> Refiner {
    Refiner::new(backend, RefineConfig::default())
}

#[tokio::test]
async fn refine_corrects_spelling_and_keeps_structure() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("x")]),
    )
    .await
    .with_refiner(refiner(Arc::new(Speller)));

    let response = RefineResponse::from(svc.refine("Helllo Wrold", KEY).await);
    assert!(response.success);
    assert_eq!(response.refined_text.as_deref(), Some("Hello World"));

    let text = format!("Helllo\n\nWrold{BREAK}Helllo Wrold\n");
    let refined = svc.refine(&text, KEY).await.unwrap();
    assert_eq!(refined, format!("Hello\n\nWorld{BREAK}Hello World\n"));
}

#[tokio::test]
async fn refine_rejects_malformed_credential() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("x")]),
    )
    .await
    .with_refiner(refiner(Arc::new(Speller)));

    let response = RefineResponse::from(svc.refine("Helllo", "  ").await);
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::Credential));
    assert!(response.refined_text.is_none());
}

#[tokio::test]
async fn refine_without_backend_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("x")]),
    )
    .await;

    let err = svc.refine("text", KEY).await.unwrap_err();
    assert!(matches!(err, OcrError::InvalidConfig(_)));
}

#[tokio::test]
async fn refine_job_rewrites_artifact_and_returns_to_assembled() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(2),
        ScriptedEngine::new(vec![Some("Helllo"), Some("Wrold")]),
    )
    .await
    .with_refiner(refiner(Arc::new(Speller)));

    let mut job = svc.submit(pdf_upload("scan.pdf")).await.unwrap().job;
    let refined = svc.refine_job(&mut job, KEY).await.unwrap();

    assert_eq!(refined, format!("Hello{BREAK}World"));
    assert_eq!(svc.read(&job.id).await.unwrap(), refined);
    assert_eq!(
        job.status,
        JobStatus::Assembled {
            outcome: JobOutcome::Success
        }
    );
}

#[tokio::test]
async fn failed_refine_job_leaves_text_unmodified() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("Helllo")]),
    )
    .await
    .with_refiner(refiner(Arc::new(Rejecting)));

    let mut job = svc.submit(pdf_upload("scan.pdf")).await.unwrap().job;
    let err = svc.refine_job(&mut job, KEY).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert!(err.is_recoverable());
    assert_eq!(svc.read(&job.id).await.unwrap(), "Helllo");
    assert!(matches!(job.status, JobStatus::Assembled { .. }));
}

#[tokio::test]
async fn refine_job_requires_an_assembled_job() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("x")]),
    )
    .await
    .with_refiner(refiner(Arc::new(Speller)));

    let mut job = DocumentJob::new();
    let err = svc.refine_job(&mut job, KEY).await.unwrap_err();
    assert!(matches!(err, OcrError::InvalidTransition { .. }));
    assert_eq!(job.status, JobStatus::Created);
}

#[tokio::test]
async fn background_refine_handle_yields_result() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        config_in(dir.path()),
        FakeRasterizer::pages(1),
        ScriptedEngine::new(vec![Some("x")]),
    )
    .await
    .with_refiner(refiner(Arc::new(Speller)));

    let handle = svc
        .spawn_refine("Helllo Wrold".into(), KEY.into())
        .unwrap();
    assert_eq!(handle.join().await.unwrap(), "Hello World");
}
