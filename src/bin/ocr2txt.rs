//! CLI binary for edgequake-ocr.
//!
//! A thin shim over the library crate that maps subcommands onto
//! `OcrService` operations and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_ocr::{
    ChatCompletionsBackend, JobId, JobProgressCallback, OcrConfig, OcrService, ProgressCallback,
    ProviderBackend, RefineBackend, RefineConfig, RefineResponse, Refiner, SaveResponse,
    SubmitResponse, Upload,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// page. Pages finish out of order, so timings are tracked per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_job_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn page_elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Recognising {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        let elapsed = self.page_elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.page_elapsed_secs(page_num);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages recognised",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages recognised  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a scan; prints the job id on stderr and the text on stdout
  ocr2txt extract scan.pdf

  # German document, 4 workers, text straight to a file
  ocr2txt extract --lang deu --concurrency 4 scan.pdf -o scan.txt

  # Replace a job's text with an edited copy, then fetch it back
  ocr2txt save 3f0c2a9e-8d4b-4c1e-9a57-0b6f2d1e7c44 edited.txt
  ocr2txt download 3f0c2a9e-8d4b-4c1e-9a57-0b6f2d1e7c44

  # Fix OCR artifacts in a stored job with an LLM
  OCR2TXT_API_KEY=sk-... ocr2txt refine --job 3f0c2a9e-8d4b-4c1e-9a57-0b6f2d1e7c44

  # JSON envelopes for scripting
  ocr2txt --json extract scan.pdf | jq .job_id

ENVIRONMENT VARIABLES:
  OCR2TXT_OUTPUT_DIR      Artifact directory (default: outputs)
  OCR2TXT_API_KEY         Credential for the refinement endpoint
  OCR2TXT_BASE_URL        OpenAI-compatible base URL for refinement
  OCR2TXT_MODEL           Refinement model (default: gpt-4.1-nano)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  EDGEQUAKE_LLM_PROVIDER  Provider for `refine --provider auto`
  EDGEQUAKE_MODEL         Model for `refine --provider auto`

SETUP:
  Requires the pdfium shared library and the tesseract binary:
    apt install tesseract-ocr            # or: brew install tesseract
    export PDFIUM_LIB_PATH=/opt/pdfium/lib
"#;

/// OCR scanned PDFs into editable text.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2txt",
    version,
    about = "OCR scanned PDF documents into editable plain text",
    long_about = "Rasterise each page of a PDF, recognise it with Tesseract on a parallel \
worker pool, and store the assembled text as a job artifact that can be edited, downloaded, \
or refined with an OpenAI-compatible language model.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding job artifacts.
    #[arg(long, global = true, env = "OCR2TXT_OUTPUT_DIR", default_value = "outputs")]
    output_dir: PathBuf,

    /// Print JSON response envelopes instead of plain text.
    #[arg(long, global = true, env = "OCR2TXT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "OCR2TXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCR2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCR2TXT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR a PDF and store the text as a new job.
    Extract(ExtractArgs),
    /// Overwrite a job's text with the contents of a file (or stdin).
    Save {
        job_id: String,
        /// Text file; `-` or omitted reads stdin.
        file: Option<PathBuf>,
    },
    /// Write a job's artifact to disk.
    Download {
        job_id: String,
        /// Destination; defaults to `<job_id>_output.txt` in the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Correct OCR artifacts with a language model.
    Refine(RefineArgs),
    /// Delete a job's artifact.
    Delete { job_id: String },
    /// Remove artifacts older than the retention period.
    Sweep {
        /// Retention period in hours.
        #[arg(long, env = "OCR2TXT_TTL_HOURS", default_value_t = 24)]
        ttl_hours: u64,
    },
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// PDF file to recognise.
    input: PathBuf,

    /// Also write the full text to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "OCR2TXT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pages recognised in parallel (default: number of CPUs).
    #[arg(short, long, env = "OCR2TXT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Tesseract language code(s), e.g. eng or eng+deu.
    #[arg(long, env = "OCR2TXT_LANG", default_value = "eng")]
    lang: String,

    /// Tesseract executable.
    #[arg(long, env = "OCR2TXT_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OCR2TXT_PASSWORD")]
    password: Option<String>,

    /// Upload size limit in MiB.
    #[arg(long, env = "OCR2TXT_MAX_UPLOAD_MB", default_value_t = 16)]
    max_upload_mb: u64,

    /// Per-job time limit in seconds (0 disables).
    #[arg(long, env = "OCR2TXT_JOB_TIMEOUT", default_value_t = 600)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct RefineArgs {
    /// Refine this job's text and save the result back.
    #[arg(long, conflicts_with = "file")]
    job: Option<String>,

    /// Refine the text in this file and print the result.
    #[arg(long, required_unless_present = "job")]
    file: Option<PathBuf>,

    /// Credential for the refinement endpoint.
    #[arg(long, env = "OCR2TXT_API_KEY", hide_env_values = true)]
    api_key: String,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "OCR2TXT_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// Model ID.
    #[arg(long, env = "OCR2TXT_MODEL", default_value = "gpt-4.1-nano")]
    model: String,

    /// Route through an edgequake-llm provider (openai, anthropic, gemini,
    /// ollama, or `auto`) instead of calling the base URL directly.
    #[arg(long, env = "OCR2TXT_PROVIDER")]
    provider: Option<String>,

    /// Maximum characters per request.
    #[arg(long, env = "OCR2TXT_CHUNK_CHARS", default_value_t = 6000)]
    chunk_chars: usize,

    /// Requests in flight at once.
    #[arg(long, env = "OCR2TXT_REFINE_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Per-request timeout in seconds.
    #[arg(long, env = "OCR2TXT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "OCR2TXT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !cli.json
        && matches!(cli.command, Command::Extract(_));
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Extract(args) => run_extract(&cli, args, show_progress).await,
        Command::Save { job_id, file } => run_save(&cli, job_id, file.as_ref()).await,
        Command::Download { job_id, output } => run_download(&cli, job_id, output.as_ref()).await,
        Command::Refine(args) => run_refine(&cli, args).await,
        Command::Delete { job_id } => {
            let service = open_service(&cli, OcrConfig::builder()).await?;
            let id = parse_job_id(job_id)?;
            let result = service.delete(&id).await;
            finish_save_like(&cli, result, &format!("Deleted job {id}"))
        }
        Command::Sweep { ttl_hours } => {
            let builder = OcrConfig::builder()
                .artifact_ttl(Some(Duration::from_secs(ttl_hours.saturating_mul(3600))));
            let service = open_service(&cli, builder).await?;
            let removed = service.sweep().await.context("Retention sweep failed")?;
            if cli.json {
                println!("{}", serde_json::json!({ "success": true, "removed": removed }));
            } else if !cli.quiet {
                eprintln!("{} removed {} expired artifacts", green("✔"), removed);
            }
            Ok(())
        }
    }
}

async fn open_service(cli: &Cli, builder: edgequake_ocr::OcrConfigBuilder) -> Result<OcrService> {
    let config = builder
        .output_dir(&cli.output_dir)
        .build()
        .context("Invalid configuration")?;
    OcrService::open(config)
        .await
        .with_context(|| format!("Failed to open job store at {:?}", cli.output_dir))
}

fn parse_job_id(s: &str) -> Result<JobId> {
    s.parse::<JobId>().context("Invalid job id")
}

async fn run_extract(cli: &Cli, args: &ExtractArgs, show_progress: bool) -> Result<()> {
    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {:?}", args.input))?;
    let filename = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());

    let mut builder = OcrConfig::builder()
        .dpi(args.dpi)
        .ocr_language(&args.lang)
        .tesseract_cmd(&args.tesseract)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024))
        .job_timeout((args.timeout > 0).then(|| Duration::from_secs(args.timeout)));
    if let Some(n) = args.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref dir) = args.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new_dynamic();
        builder = builder.progress_callback(cb);
    }

    let service = open_service(cli, builder).await?;
    let result = service.submit(Upload::new(filename, bytes)).await;

    if cli.json {
        let response = SubmitResponse::from(result);
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialise response")?
        );
        if !response.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let extraction = result.context("Extraction failed")?;

    if let Some(ref path) = args.output {
        tokio::fs::write(path, &extraction.text)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(extraction.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !extraction.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        let stats = &extraction.stats;
        eprintln!(
            "{}  job {}  {}/{} pages  {}ms",
            if stats.failed_pages == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(&extraction.job_id().to_string()),
            stats.succeeded_pages,
            stats.total_pages,
            stats.total_duration_ms,
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "render {}ms  /  recognition {}ms",
                stats.render_duration_ms, stats.recognition_duration_ms
            ))
        );
    }

    Ok(())
}

async fn run_save(cli: &Cli, job_id: &str, file: Option<&PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let service = open_service(cli, OcrConfig::builder()).await?;
    let id = parse_job_id(job_id)?;
    let result = service.save(&id, &text).await;
    finish_save_like(cli, result, &format!("Saved job {id}"))
}

async fn run_download(cli: &Cli, job_id: &str, output: Option<&PathBuf>) -> Result<()> {
    let service = open_service(cli, OcrConfig::builder()).await?;
    let id = parse_job_id(job_id)?;
    let artifact = service.download(&id).await.context("Download failed")?;

    let path = output
        .cloned()
        .unwrap_or_else(|| PathBuf::from(&artifact.filename));
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "path": path,
                "content_type": artifact.content_type,
                "bytes": artifact.bytes.len(),
            })
        );
    } else if !cli.quiet {
        eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()));
    }
    Ok(())
}

async fn run_refine(cli: &Cli, args: &RefineArgs) -> Result<()> {
    let mut builder = RefineConfig::builder()
        .base_url(&args.base_url)
        .model(&args.model)
        .chunk_chars(args.chunk_chars)
        .concurrency(args.concurrency)
        .api_timeout_secs(args.api_timeout);
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    let refine_config = builder.build().context("Invalid refinement configuration")?;

    let backend: Arc<dyn RefineBackend> = match args.provider.as_deref() {
        Some(name) => {
            let name = (name != "auto").then_some(name);
            Arc::new(
                ProviderBackend::from_env(name, &refine_config)
                    .context("Failed to resolve LLM provider")?,
            )
        }
        None => Arc::new(
            ChatCompletionsBackend::new(&refine_config)
                .context("Failed to build refinement client")?,
        ),
    };
    let refiner = Refiner::new(backend, refine_config);
    let service = open_service(cli, OcrConfig::builder())
        .await?
        .with_refiner(refiner);

    let (text, job_id) = match (&args.job, &args.file) {
        (Some(job), _) => {
            let id = parse_job_id(job)?;
            (service.read(&id).await.context("Failed to read job")?, Some(id))
        }
        (None, Some(path)) => (
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?,
            None,
        ),
        (None, None) => anyhow::bail!("Either --job or --file is required"),
    };

    let result = service.refine(&text, &args.api_key).await;

    // Text is only written back once the whole refinement succeeded.
    let result = match (result, job_id) {
        (Ok(refined), Some(id)) => service.save(&id, &refined).await.map(|_| refined),
        (other, _) => other,
    };

    if cli.json {
        let response = RefineResponse::from(result);
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialise response")?
        );
        if !response.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let refined = result.context("Refinement failed")?;
    match job_id {
        Some(id) if !cli.quiet => eprintln!("{} refined job {}", green("✔"), bold(&id.to_string())),
        Some(_) => {}
        None => println!("{refined}"),
    }
    Ok(())
}

fn finish_save_like(
    cli: &Cli,
    result: Result<(), edgequake_ocr::OcrError>,
    message: &str,
) -> Result<()> {
    if cli.json {
        let response = SaveResponse::from(result);
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialise response")?
        );
        if !response.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    result.context("Operation failed")?;
    if !cli.quiet {
        eprintln!("{} {}", green("✔"), message);
    }
    Ok(())
}
