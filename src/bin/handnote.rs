//! CLI binary for handnote2docx.
//!
//! Maps flags onto `AnalyzerConfig` and an analysis client, runs the
//! pipeline and writes the DOCX.

use anyhow::{Context, Result};
use clap::Parser;
use handnote2docx::pipeline::analyze::DEFAULT_GEMINI_MODEL;
use handnote2docx::{
    analyze_file, inspect, write_artifact, AnalysisClient, AnalysisProgressCallback,
    AnalyzerConfig, Credential, GeminiClient, GeminiOptions, ProgressCallback, ProviderClient,
    ProviderOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── Progress bar ─────────────────────────────────────────────────────────

/// Pages run one at a time, so a single start timestamp is enough.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Loading");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            failures: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .unwrap()
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        self.bar.set_prefix("Analysing");
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        *self.page_started.lock().unwrap() = Some(Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, reason: &str) {
        let secs = self.elapsed_secs();
        self.failures.fetch_add(1, Ordering::SeqCst);

        let msg: String = if reason.chars().count() > 80 {
            reason.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.failures.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} page(s) analysed", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} page(s) analysed  ({} failed)",
                if failed == total_pages { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

// ── Arguments ────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a photo of a note (writes analysis_result.docx)
  handnote note.jpg

  # Scanned PDF to a chosen file
  handnote lecture.pdf -o lecture.docx

  # Print the combined report as well
  handnote lecture.pdf --print

  # Another vision provider through edgequake-llm
  handnote --provider openai --model gpt-4.1 note.png

  # Page count and type only, no API key needed
  handnote --inspect-only lecture.pdf

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY     Gemini API key (checked first)
  GEMINI_API_KEY     Gemini API key
  PDFIUM_LIB_PATH    Path to libpdfium, otherwise the system library is used
  RUST_LOG           Overrides the log filter
"#;

/// Transcribe and summarise handwritten notes into a Word document.
#[derive(Parser, Debug)]
#[command(
    name = "handnote",
    version,
    about = "Transcribe and summarise handwritten notes into a Word document",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image (PNG/JPEG) or PDF: local path or HTTP/HTTPS URL.
    input: String,

    /// Where to write the DOCX. Defaults to a name derived from the input type.
    #[arg(short, long, env = "HANDNOTE_OUTPUT")]
    output: Option<PathBuf>,

    /// Also print the combined report to stdout.
    #[arg(long)]
    print: bool,

    /// Print the run result (report, outcomes, stats) as JSON.
    #[arg(long)]
    json: bool,

    /// Print media type and page count only.
    #[arg(long)]
    inspect_only: bool,

    /// Rendering DPI for PDF pages (72–400).
    #[arg(long, env = "HANDNOTE_DPI", default_value_t = handnote2docx::DEFAULT_DPI,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Model ID. Defaults to gemini-2.5-pro (or gpt-4.1-nano with --provider).
    #[arg(long, env = "HANDNOTE_MODEL")]
    model: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, …)
    /// instead of the built-in Gemini client.
    #[arg(long, env = "HANDNOTE_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key. Overrides GOOGLE_API_KEY / GEMINI_API_KEY.
    #[arg(long)]
    api_key: Option<String>,

    /// Text file with a replacement instruction.
    #[arg(long, env = "HANDNOTE_INSTRUCTION", value_name = "FILE")]
    instruction: Option<PathBuf>,

    /// Password for encrypted PDFs.
    #[arg(long, env = "HANDNOTE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Sampling temperature.
    #[arg(long, env = "HANDNOTE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max output tokens per page.
    #[arg(long, env = "HANDNOTE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: u32,

    /// Per-page request timeout in seconds.
    #[arg(long, env = "HANDNOTE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "HANDNOTE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the progress bar.
    #[arg(long, env = "HANDNOTE_NO_PROGRESS")]
    no_progress: bool,

    /// DEBUG-level logs.
    #[arg(short, long, env = "HANDNOTE_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, env = "HANDNOTE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
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

    if cli.inspect_only {
        let config = build_config(&cli, None).await?;
        let info = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect input")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise source info")?
            );
        } else {
            println!("Input:   {}", cli.input);
            println!("Type:    {}", info.media_type);
            println!("Pages:   {}", info.page_count);
            if let Some(name) = &info.file_name {
                println!("Name:    {}", name);
            }
        }
        return Ok(());
    }

    // Resolve the client before touching the input so a missing key fails fast.
    let client = build_client(&cli)?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress).await?;

    let output = analyze_file(&cli.input, client, config)
        .await
        .context("Analysis failed")?;

    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&output.artifact.file_name));
    write_artifact(&output.artifact, &path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if cli.print {
        write_report(&mut io::stdout().lock(), output.report.text())
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            if stats.failed_pages() == 0 { green("✔") } else { yellow("⚠") },
            stats.succeeded_pages,
            stats.total_pages,
            stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
    }

    Ok(())
}

fn build_client(cli: &Cli) -> Result<Arc<dyn AnalysisClient>> {
    if let Some(provider) = &cli.provider {
        let model = cli.model.as_deref().unwrap_or(if provider == "gemini" {
            DEFAULT_GEMINI_MODEL
        } else {
            DEFAULT_PROVIDER_MODEL
        });
        let client = ProviderClient::from_name(
            provider,
            model,
            ProviderOptions {
                temperature: cli.temperature,
                max_tokens: cli.max_tokens as usize,
                timeout_secs: cli.api_timeout,
            },
        )?;
        return Ok(Arc::new(client));
    }

    let credential = match &cli.api_key {
        Some(key) => Credential::new(key.clone()),
        None => Credential::from_env()?,
    };
    let options = GeminiOptions {
        model: cli
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        temperature: cli.temperature,
        max_output_tokens: cli.max_tokens,
        timeout_secs: cli.api_timeout,
        ..GeminiOptions::default()
    };
    Ok(Arc::new(GeminiClient::new(credential, options)?))
}

async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalyzerConfig> {
    let mut builder = AnalyzerConfig::builder()
        .dpi(cli.dpi)
        .download_timeout_secs(cli.download_timeout);

    if let Some(path) = &cli.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(text);
    }
    if let Some(pwd) = &cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    Ok(builder.build()?)
}

/// Write the report followed by exactly one trailing newline.
fn write_report(out: &mut impl Write, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()
}
