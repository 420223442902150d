//! The batch-analysis pipeline and its entry points.
//!
//! [`PipelineController::run`] walks the pages of a [`SourceDocument`] in
//! order, renders each one, asks the analysis client about it, records a
//! [`PageOutcome`], and finally folds the outcomes into a report and exports
//! it. A page that fails to render or analyse is recorded as a failure and
//! the run moves on; only an empty document or a broken exporter abort.

use crate::aggregate::aggregate;
use crate::config::AnalyzerConfig;
use crate::document::{MediaType, Page, SourceDocument};
use crate::error::{AnalyzerError, PageError};
use crate::output::{AnalysisOutput, ExportArtifact, PageOutcome, RunStats};
use crate::pipeline::analyze::AnalysisClient;
use crate::pipeline::export::{DocumentExporter, DocxExporter};
use crate::pipeline::input::{self, Upload};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrates renderer, client, aggregator and exporter for one document.
pub struct PipelineController {
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn AnalysisClient>,
    exporter: Arc<dyn DocumentExporter>,
    config: AnalyzerConfig,
}

impl PipelineController {
    /// Controller with the default pdfium renderer and DOCX exporter.
    pub fn new(client: Arc<dyn AnalysisClient>, config: AnalyzerConfig) -> Self {
        Self {
            renderer: Arc::new(PdfiumRenderer::from_config(&config)),
            client,
            exporter: Arc::new(DocxExporter::new()),
            config,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn DocumentExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Process every page of `source` and build the export artifact.
    ///
    /// # Errors
    /// * [`AnalyzerError::EmptyInput`] — `source` has no pages; nothing is
    ///   rendered, analysed or exported.
    /// * [`AnalyzerError::Export`] — the exporter failed; no artifact.
    ///
    /// Per-page failures are not errors: they appear as
    /// [`PageOutcome::Failure`] and as the failure marker in the report.
    pub async fn run(&self, source: SourceDocument) -> Result<AnalysisOutput, AnalyzerError> {
        if source.is_empty() {
            return Err(AnalyzerError::EmptyInput);
        }

        let start = Instant::now();
        let total = source.len();
        info!("Analysing {} page(s) of {}", total, source.media_type());

        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_run_start(total);
        }

        let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(total);
        for page in source.pages() {
            if let Some(cb) = cb {
                cb.on_page_start(page.number(), total);
            }

            let outcome = self.process_page(page).await;

            if let Some(cb) = cb {
                match &outcome {
                    PageOutcome::Success { text, .. } => {
                        cb.on_page_complete(page.number(), total, text.len())
                    }
                    PageOutcome::Failure { error, .. } => {
                        cb.on_page_error(page.number(), total, &error.to_string())
                    }
                }
            }
            outcomes.push(outcome);
        }

        let report = aggregate(&outcomes);
        let bytes = self.exporter.export(report.text())?;
        let artifact = ExportArtifact {
            file_name: self
                .config
                .export_file_name
                .clone()
                .unwrap_or_else(|| source.media_type().default_export_name().to_string()),
            content_type: self.exporter.content_type().to_string(),
            bytes,
        };

        let stats = RunStats::from_outcomes(&outcomes, start.elapsed().as_millis() as u64);
        info!(
            "Analysis complete: {}/{} pages succeeded, {}ms",
            stats.succeeded_pages, stats.total_pages, stats.total_duration_ms
        );
        if let Some(cb) = cb {
            cb.on_run_complete(total, stats.succeeded_pages);
        }

        Ok(AnalysisOutput {
            artifact,
            report,
            outcomes,
            stats,
        })
    }

    /// Render and analyse one page. Never fails: errors become outcomes.
    async fn process_page(&self, page: &Page) -> PageOutcome {
        let page_index = page.index();
        let page_num = page.number();

        // Dropped at the end of this call, before the next page renders.
        let image = match self.renderer.render(page, self.config.dpi).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Page {}: render error — {}", page_num, e);
                return PageOutcome::Failure {
                    page_index,
                    error: PageError::RenderFailed {
                        page: page_num,
                        detail: e.to_string(),
                    },
                };
            }
        };
        debug!("Page {}: rendered {:?}", page_num, image);

        match self.client.analyze(&image, self.config.instruction()).await {
            Ok(text) if !text.trim().is_empty() => PageOutcome::Success { page_index, text },
            Ok(_) => {
                warn!("Page {}: analysis returned no text", page_num);
                PageOutcome::Failure {
                    page_index,
                    error: PageError::AnalysisFailed {
                        page: page_num,
                        detail: "empty response".to_string(),
                    },
                }
            }
            Err(e) => {
                warn!("Page {}: analysis failed — {}", page_num, e);
                PageOutcome::Failure {
                    page_index,
                    error: PageError::AnalysisFailed {
                        page: page_num,
                        detail: e.to_string(),
                    },
                }
            }
        }
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Analyse an in-memory upload.
///
/// # Example
/// ```rust,no_run
/// use handnote2docx::{analyze_bytes, AnalyzerConfig, Credential, GeminiClient, GeminiOptions};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GeminiClient::new(Credential::from_env()?, GeminiOptions::default())?;
/// let bytes = std::fs::read("notes.pdf")?;
/// let output = analyze_bytes(bytes, "application/pdf", Arc::new(client), AnalyzerConfig::default()).await?;
/// std::fs::write(&output.artifact.file_name, &output.artifact.bytes)?;
/// # Ok(())
/// # }
/// ```
pub async fn analyze_bytes(
    bytes: Vec<u8>,
    mime: &str,
    client: Arc<dyn AnalysisClient>,
    config: AnalyzerConfig,
) -> Result<AnalysisOutput, AnalyzerError> {
    let upload = Upload::from_mime(bytes, mime)?;
    analyze_upload(upload, client, config).await
}

/// Analyse a local file or HTTP(S) URL.
pub async fn analyze_file(
    input_str: impl AsRef<str>,
    client: Arc<dyn AnalysisClient>,
    config: AnalyzerConfig,
) -> Result<AnalysisOutput, AnalyzerError> {
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);
    let upload = input::resolve_input(input_str, config.download_timeout_secs).await?;
    analyze_upload(upload, client, config).await
}

/// Analyse `input_str` and write the DOCX to `output_path`.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// failed run never leaves a half-written document behind.
pub async fn analyze_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    client: Arc<dyn AnalysisClient>,
    config: AnalyzerConfig,
) -> Result<AnalysisOutput, AnalyzerError> {
    let output = analyze_file(input_str, client, config).await?;
    write_artifact(&output.artifact, output_path.as_ref()).await?;
    Ok(output)
}

/// Synchronous wrapper around [`analyze_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    client: Arc<dyn AnalysisClient>,
    config: AnalyzerConfig,
) -> Result<AnalysisOutput, AnalyzerError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnalyzerError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze_file(input_str, client, config))
}

async fn analyze_upload(
    upload: Upload,
    client: Arc<dyn AnalysisClient>,
    config: AnalyzerConfig,
) -> Result<AnalysisOutput, AnalyzerError> {
    let source = input::load_source(upload, config.password.as_deref()).await?;
    PipelineController::new(client, config).run(source).await
}

/// Write an artifact atomically (temp file in the same directory + rename).
pub async fn write_artifact(artifact: &ExportArtifact, path: &Path) -> Result<(), AnalyzerError> {
    let path = path.to_path_buf();
    let bytes = artifact.bytes.clone();

    tokio::task::spawn_blocking(move || -> Result<(), AnalyzerError> {
        let fail = |source: std::io::Error| AnalyzerError::OutputWriteFailed {
            path: path.clone(),
            source,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(fail)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(fail)?;
        tmp.write_all(&bytes).map_err(fail)?;
        tmp.persist(&path).map_err(|e| fail(e.error))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    })
    .await
    .map_err(|e| AnalyzerError::Internal(format!("Write task panicked: {}", e)))?
}

/// What an upload contains, without calling the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub media_type: MediaType,
    pub page_count: usize,
    pub file_name: Option<String>,
}

/// Inspect a local file or URL: type and page count.
///
/// Does not require a credential.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &AnalyzerConfig,
) -> Result<SourceInfo, AnalyzerError> {
    let upload = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let file_name = upload.file_name.clone();
    let source = input::load_source(upload, config.password.as_deref()).await?;
    Ok(SourceInfo {
        media_type: source.media_type(),
        page_count: source.len(),
        file_name,
    })
}
