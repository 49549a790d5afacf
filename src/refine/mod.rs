//! Cleanup orchestration: send OCR text through an external model to fix
//! recognition artifacts.
//!
//! ## Flow
//!
//! ```text
//! credential ──▶ Credential::parse ──▶ split_chunks ──▶ backend (per chunk) ──▶ concat
//!                  (no network)         (lossless)       (ordered, no retry)
//! ```
//!
//! The credential is checked before anything leaves the process, so a
//! malformed key fails fast with [`OcrError::InvalidCredential`] and no
//! external call. Chunks are refined with up to `RefineConfig::concurrency`
//! calls in flight but always reassembled in their original order. The first
//! failing chunk aborts the whole call and the input text is returned to the
//! caller untouched. Nothing is retried automatically.

pub mod backend;
pub mod chunk;

pub use backend::{ChatCompletionsBackend, ProviderBackend, RefineBackend};
pub use chunk::split_chunks;

use crate::config::RefineConfig;
use crate::error::{ExternalServiceKind, OcrError};
use crate::pipeline::postprocess::strip_outer_fences;
use crate::prompts::REFINE_SYSTEM_PROMPT;
use chunk::split_edges;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A caller-supplied API credential.
///
/// Lives only for the duration of one refinement call. `Debug` never prints
/// the secret.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Check the shape of `raw` against `config` without any network call.
    pub fn parse(raw: &str, config: &RefineConfig) -> Result<Self, OcrError> {
        let value = raw.trim();
        let invalid = |reason: String| OcrError::InvalidCredential { reason };

        if value.is_empty() {
            return Err(invalid("credential is empty".into()));
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_graphic()) {
            return Err(invalid(format!(
                "credential contains an invalid character ({:?})",
                bad
            )));
        }
        if value.len() < config.credential_min_len {
            return Err(invalid(format!(
                "credential is too short ({} characters, at least {} required)",
                value.len(),
                config.credential_min_len
            )));
        }
        if let Some(prefix) = &config.credential_prefix {
            if !value.starts_with(prefix.as_str()) {
                return Err(invalid(format!("credential must start with '{}'", prefix)));
            }
        }

        Ok(Self(value.to_string()))
    }

    /// The raw secret, for placing in an outgoing request.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Chunked, ordered refinement over a [`RefineBackend`].
#[derive(Clone)]
pub struct Refiner {
    backend: Arc<dyn RefineBackend>,
    config: RefineConfig,
}

impl Refiner {
    pub fn new(backend: Arc<dyn RefineBackend>, config: RefineConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Validate `credential`, then refine `text` chunk by chunk.
    pub async fn refine(&self, text: &str, credential: &str) -> Result<String, OcrError> {
        let credential = Credential::parse(credential, &self.config)?;
        self.refine_with(text, &credential).await
    }

    /// Refine `text` with an already validated credential.
    pub async fn refine_with(&self, text: &str, credential: &Credential) -> Result<String, OcrError> {
        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(REFINE_SYSTEM_PROMPT);
        let chunks = split_chunks(text, self.config.chunk_chars);
        info!(
            "Refining {} chars in {} chunks via {}",
            text.len(),
            chunks.len(),
            self.backend.name()
        );

        // Collected first: a lazy `map` inside the stream is not `Send`.
        let backend = self.backend.as_ref();
        let calls: Vec<_> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| refine_chunk(backend, system_prompt, index, chunk, credential))
            .collect();
        let refined: Vec<String> = stream::iter(calls)
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        Ok(refined.concat())
    }

    /// Run [`Refiner::refine`] as a background task.
    ///
    /// The returned handle can be cancelled; dropping it lets the task
    /// finish on its own.
    pub fn spawn_refine(&self, text: String, credential: String) -> RefineHandle {
        let refiner = self.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => Err(OcrError::Cancelled),
                result = refiner.refine(&text, &credential) => result,
            }
        });
        RefineHandle { task, cancel }
    }
}

impl fmt::Debug for Refiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refiner")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Result handle for one in-flight refinement.
#[derive(Debug)]
pub struct RefineHandle {
    task: JoinHandle<Result<String, OcrError>>,
    cancel: CancellationToken,
}

impl RefineHandle {
    /// Request cancellation; [`RefineHandle::join`] then yields `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the refined text.
    pub async fn join(self) -> Result<String, OcrError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(OcrError::Cancelled),
            Err(e) => Err(OcrError::Internal(format!("Refinement task panicked: {}", e))),
        }
    }
}

/// Refine one chunk, keeping its surrounding whitespace byte-for-byte.
async fn refine_chunk(
    backend: &dyn RefineBackend,
    system_prompt: &str,
    index: usize,
    chunk: &str,
    credential: &Credential,
) -> Result<String, OcrError> {
    let (lead, core, trail) = split_edges(chunk);
    if core.is_empty() {
        return Ok(chunk.to_string());
    }

    let raw = backend
        .refine_chunk(system_prompt, core, credential)
        .await
        .inspect_err(|e| warn!("Chunk {} failed: {}", index, e))?;

    let refined = if core.contains("```") {
        raw
    } else {
        strip_outer_fences(&raw)
    };
    let refined = refined.trim();
    if refined.is_empty() {
        return Err(OcrError::ExternalService {
            kind: ExternalServiceKind::MalformedResponse,
            message: format!("Empty completion for chunk {}", index),
        });
    }

    debug!("Chunk {}: {} → {} chars", index, core.len(), refined.len());
    Ok(format!("{lead}{refined}{trail}"))
}
