//! Recognition worker pool: run the OCR engine over every page concurrently.
//!
//! Each page is recognised on a blocking thread (`spawn_blocking`), with at
//! most `concurrency` pages in flight via `buffer_unordered`. Pages complete
//! in any order; results are placed into a slot per page so the returned
//! vector is always in page order and always has exactly one entry per page.
//!
//! A page failure never aborts the job. It is recorded as a failed
//! [`RecognitionResult`] and the remaining pages carry on. Cancellation does
//! abort the job: no new page is started once the token fires, and the call
//! returns [`OcrError::Cancelled`] without waiting for pages already running
//! (their results are discarded when the blocking threads finish).

use crate::error::{OcrError, PageError};
use crate::output::RecognitionResult;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::postprocess::clean_page_text;
use crate::pipeline::render::PageImage;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Recognise `pages` with `engine`, returning one result per page in order.
pub async fn recognize_pages(
    pages: Vec<PageImage>,
    engine: Arc<dyn OcrEngine>,
    concurrency: usize,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<RecognitionResult>, OcrError> {
    let total_pages = pages.len();
    info!(
        "Recognising {} pages with {} (concurrency {})",
        total_pages,
        engine.name(),
        concurrency
    );

    let mut slots: Vec<Option<RecognitionResult>> = (0..total_pages).map(|_| None).collect();

    let mut in_flight = stream::iter(pages.into_iter().enumerate().map(|(slot, page)| {
        let engine = Arc::clone(&engine);
        let progress = progress.cloned();
        let cancel = cancel.clone();
        async move {
            if cancel.is_cancelled() {
                return None;
            }
            let result = recognize_one(page, engine, total_pages, progress.as_ref()).await;
            Some((slot, result))
        }
    }))
    .buffer_unordered(concurrency.max(1));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Recognition cancelled with {} pages outstanding",
                    slots.iter().filter(|s| s.is_none()).count());
                return Err(OcrError::Cancelled);
            }
            next = in_flight.next() => match next {
                Some(Some((slot, result))) => slots[slot] = Some(result),
                Some(None) => {}
                None => break,
            }
        }
    }

    // A skipped page can only come from a cancellation racing the last
    // completion; treat it the same as an explicit cancel.
    if cancel.is_cancelled() {
        return Err(OcrError::Cancelled);
    }

    let results: Vec<RecognitionResult> = slots
        .into_iter()
        .enumerate()
        .map(|(slot, r)| {
            r.unwrap_or_else(|| {
                RecognitionResult::failure(
                    slot,
                    PageError::WorkerPanicked {
                        page: slot + 1,
                        detail: "worker produced no result".into(),
                    },
                )
            })
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    if let Some(cb) = progress {
        cb.on_job_complete(total_pages, succeeded);
    }
    info!("Recognition done: {}/{} pages succeeded", succeeded, total_pages);

    Ok(results)
}

async fn recognize_one(
    page: PageImage,
    engine: Arc<dyn OcrEngine>,
    total_pages: usize,
    progress: Option<&ProgressCallback>,
) -> RecognitionResult {
    let ordinal = page.ordinal;
    let page_num = ordinal + 1;
    if let Some(cb) = progress {
        cb.on_page_start(page_num, total_pages);
    }

    let start = Instant::now();
    // The bitmap moves into the worker and is dropped when it returns.
    let joined = tokio::task::spawn_blocking(move || engine.recognize(&page)).await;
    let elapsed = start.elapsed().as_millis() as u64;

    let result = match joined {
        Ok(Ok(raw)) => RecognitionResult::success(ordinal, clean_page_text(&raw)),
        Ok(Err(e)) => RecognitionResult::failure(ordinal, e),
        Err(e) => RecognitionResult::failure(
            ordinal,
            PageError::WorkerPanicked {
                page: page_num,
                detail: e.to_string(),
            },
        ),
    }
    .with_duration_ms(elapsed);

    match &result.error {
        None => {
            debug!("Page {} recognised in {}ms", page_num, elapsed);
            if let Some(cb) = progress {
                cb.on_page_complete(page_num, total_pages, result.text.len());
            }
        }
        Some(e) => {
            warn!("Page {} failed: {}", page_num, e);
            if let Some(cb) = progress {
                cb.on_page_error(page_num, total_pages, &e.to_string());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::JobProgressCallback;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pages(n: usize) -> Vec<PageImage> {
        (0..n)
            .map(|ordinal| PageImage {
                ordinal,
                image: DynamicImage::new_luma8(1, 1),
            })
            .collect()
    }

    /// Earlier pages take longer, so completion order is reversed.
    struct SlowFirstEngine {
        total: usize,
    }

    impl OcrEngine for SlowFirstEngine {
        fn name(&self) -> &'static str {
            "slow-first"
        }

        fn recognize(&self, page: &PageImage) -> Result<String, PageError> {
            let delay = (self.total - page.ordinal) as u64 * 20;
            std::thread::sleep(Duration::from_millis(delay));
            Ok(format!("text of page {}\u{000C}", page.ordinal + 1))
        }
    }

    struct FailOnPage(usize);

    impl OcrEngine for FailOnPage {
        fn name(&self) -> &'static str {
            "fail-on-page"
        }

        fn recognize(&self, page: &PageImage) -> Result<String, PageError> {
            if page.ordinal == self.0 {
                Err(PageError::EngineFailed {
                    page: page.ordinal + 1,
                    detail: "unreadable".into(),
                })
            } else {
                Ok(format!("page {}", page.ordinal + 1))
            }
        }
    }

    struct PanicOnPage(usize);

    impl OcrEngine for PanicOnPage {
        fn name(&self) -> &'static str {
            "panic-on-page"
        }

        fn recognize(&self, page: &PageImage) -> Result<String, PageError> {
            if page.ordinal == self.0 {
                panic!("engine crashed");
            }
            Ok("fine".into())
        }
    }

    struct SleepEngine(Duration);

    impl OcrEngine for SleepEngine {
        fn name(&self) -> &'static str {
            "sleep"
        }

        fn recognize(&self, _page: &PageImage) -> Result<String, PageError> {
            std::thread::sleep(self.0);
            Ok("late".into())
        }
    }

    #[derive(Default)]
    struct Counter {
        started: AtomicUsize,
        completed: AtomicUsize,
        failed: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl JobProgressCallback for Counter {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _text_len: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_job_complete(&self, _total_pages: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn results_are_in_page_order_despite_completion_order() {
        let engine = Arc::new(SlowFirstEngine { total: 4 });
        let token = CancellationToken::new();
        let results = recognize_pages(pages(4), engine, 4, &token, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.ordinal, i);
            // Cleaned: the trailing form feed is gone.
            assert_eq!(r.text, format!("text of page {}", i + 1));
        }
    }

    #[tokio::test]
    async fn one_failed_page_does_not_abort_the_rest() {
        let counter = Arc::new(Counter::default());
        let cb: ProgressCallback = counter.clone();
        let token = CancellationToken::new();
        let results = recognize_pages(pages(3), Arc::new(FailOnPage(1)), 2, &token, Some(&cb))
            .await
            .unwrap();

        assert!(results[0].is_success());
        assert!(!results[1].is_success());
        assert!(results[1].text.is_empty());
        assert!(results[2].is_success());

        assert_eq!(counter.started.load(Ordering::SeqCst), 3);
        assert_eq!(counter.completed.load(Ordering::SeqCst), 2);
        assert_eq!(counter.failed.load(Ordering::SeqCst), 1);
        assert_eq!(counter.succeeded.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_engine_becomes_page_error() {
        let token = CancellationToken::new();
        let results = recognize_pages(pages(2), Arc::new(PanicOnPage(0)), 1, &token, None)
            .await
            .unwrap();

        assert!(matches!(
            results[0].error,
            Some(PageError::WorkerPanicked { page: 1, .. })
        ));
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn zero_pages_yields_empty_results() {
        let token = CancellationToken::new();
        let results = recognize_pages(Vec::new(), Arc::new(FailOnPage(0)), 4, &token, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_token_returns_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let err = recognize_pages(pages(3), Arc::new(FailOnPage(9)), 1, &token, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_mid_run_stops_without_waiting_for_all_pages() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let engine = Arc::new(SleepEngine(Duration::from_millis(200)));
        let err = recognize_pages(pages(10), engine, 1, &token, None)
            .await
            .unwrap_err();

        assert!(matches!(err, OcrError::Cancelled));
        // Ten sequential 200ms pages would take 2s.
        assert!(start.elapsed() < Duration::from_millis(1500));
    }
}
