//! Configuration types for document OCR and text refinement.
//!
//! Extraction behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. The external refinement call has its own
//! [`RefineConfig`] because it is invoked independently of extraction,
//! often long after the job that produced the text has finished.

use crate::error::OcrError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Separator inserted between page texts in the assembled artifact.
pub const DEFAULT_PAGE_BREAK: &str = "\n\n--- page break ---\n\n";

/// Upload size limit: 16 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Configuration for turning an uploaded PDF into text.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .dpi(200)
///     .concurrency(4)
///     .ocr_language("deu")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–600. Default: 300.
    ///
    /// Tesseract is trained on ~300 DPI scans; lower values lose small print,
    /// higher values mostly cost memory and time.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 6000.
    ///
    /// A safety cap independent of DPI so a poster-sized page cannot exhaust
    /// memory.
    pub max_rendered_pixels: u32,

    /// Number of pages recognised at once. Default: number of logical CPUs.
    pub concurrency: usize,

    /// Largest accepted upload in bytes. Default: 16 MiB.
    pub max_upload_bytes: u64,

    /// Accepted file-name extensions, lowercase, without the dot. Default: `["pdf"]`.
    pub allowed_extensions: Vec<String>,

    /// Tesseract language code(s), e.g. `"eng"` or `"eng+deu"`. Default: `"eng"`.
    pub ocr_language: String,

    /// Tesseract executable. Default: `"tesseract"` (resolved via `PATH`).
    pub tesseract_cmd: PathBuf,

    /// Directory containing the pdfium shared library. `None` binds to the
    /// system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Marker inserted between consecutive pages. Default: [`DEFAULT_PAGE_BREAK`].
    pub page_break: String,

    /// Maximum number of characters in the UI preview. Default: 500.
    pub preview_chars: usize,

    /// Flat directory holding one text artifact per job. Default: `outputs`.
    pub output_dir: PathBuf,

    /// Artifacts older than this are removed by the retention sweep.
    /// Default: 24 h. `None` keeps artifacts until explicitly deleted.
    pub artifact_ttl: Option<Duration>,

    /// Wall-time budget for rasterising and recognising one job.
    /// Default: 10 min. `None` disables the bound.
    pub job_timeout: Option<Duration>,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 6000,
            concurrency: num_cpus::get().max(1),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: vec!["pdf".to_string()],
            ocr_language: "eng".to_string(),
            tesseract_cmd: PathBuf::from("tesseract"),
            pdfium_lib_path: None,
            password: None,
            page_break: DEFAULT_PAGE_BREAK.to_string(),
            preview_chars: 500,
            output_dir: PathBuf::from("outputs"),
            artifact_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            job_timeout: Some(Duration::from_secs(10 * 60)),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("page_break", &self.page_break)
            .field("preview_chars", &self.preview_chars)
            .field("output_dir", &self.output_dir)
            .field("artifact_ttl", &self.artifact_ttl)
            .field("job_timeout", &self.job_timeout)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `extension` (any case, no dot) is accepted.
    pub fn accepts_extension(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|a| *a == ext)
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn page_break(mut self, marker: impl Into<String>) -> Self {
        self.config.page_break = marker.into();
        self
    }

    pub fn preview_chars(mut self, n: usize) -> Self {
        self.config.preview_chars = n;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn artifact_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.config.artifact_ttl = ttl;
        self
    }

    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.job_timeout = timeout;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(OcrError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.allowed_extensions.is_empty() {
            return Err(OcrError::InvalidConfig(
                "At least one file extension must be allowed".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(OcrError::InvalidConfig(
                "Upload limit must be greater than zero".into(),
            ));
        }
        if c.page_break.is_empty() {
            return Err(OcrError::InvalidConfig(
                "Page break marker must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Configuration for the external text-refinement call.
///
/// The credential is deliberately absent: it is supplied per call and never
/// stored (see [`crate::refine::Credential`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Base URL of an OpenAI-compatible API. Default: `https://api.openai.com/v1`.
    pub base_url: String,

    /// Model identifier. Default: `gpt-4.1-nano`.
    pub model: String,

    /// Maximum characters per refinement request. Default: 6000.
    pub chunk_chars: usize,

    /// Sampling temperature. Default: 0.0 so corrections are deterministic.
    pub temperature: f32,

    /// Maximum tokens the model may generate per chunk. Default: 4096.
    pub max_tokens: usize,

    /// Per-request timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Chunks in flight at once; results are still reassembled in order. Default: 1.
    pub concurrency: usize,

    /// Minimum credential length accepted without a network round-trip. Default: 20.
    pub credential_min_len: usize,

    /// Required credential prefix, e.g. `"sk-"`. Default: none.
    pub credential_prefix: Option<String>,

    /// Custom system prompt. If None, uses [`crate::prompts::REFINE_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-nano".to_string(),
            chunk_chars: 6000,
            temperature: 0.0,
            max_tokens: 4096,
            api_timeout_secs: 60,
            concurrency: 1,
            credential_min_len: 20,
            credential_prefix: None,
            system_prompt: None,
        }
    }
}

impl RefineConfig {
    /// Create a new builder for `RefineConfig`.
    pub fn builder() -> RefineConfigBuilder {
        RefineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RefineConfig`].
#[derive(Debug)]
pub struct RefineConfigBuilder {
    config: RefineConfig,
}

impl RefineConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn chunk_chars(mut self, n: usize) -> Self {
        self.config.chunk_chars = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn credential_min_len(mut self, n: usize) -> Self {
        self.config.credential_min_len = n;
        self
    }

    pub fn credential_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.credential_prefix = Some(prefix.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RefineConfig, OcrError> {
        let c = &self.config;
        if c.chunk_chars == 0 {
            return Err(OcrError::InvalidConfig(
                "Chunk size must be ≥ 1 character".into(),
            ));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(OcrError::InvalidConfig(format!(
                "Refinement base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(OcrError::InvalidConfig("Model must not be empty".into()));
        }
        Ok(self.config)
    }
}
