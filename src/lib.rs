//! # handnote2docx
//!
//! Transcribe and summarise handwritten documents with a vision language
//! model, then package the result as a Word document.
//!
//! Upload a photo of a note (PNG/JPEG) or a scanned multi-page PDF. Every
//! page is rendered to an image, sent to the model with an instruction asking
//! for a `### Transcript` and a `### Summary`, and the answers are collected
//! into one report with a `## Results for Page N` section per page. Pages
//! that fail are marked `[ANALYSIS FAILED]` instead of sinking the run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (path / URL / bytes)
//!  │
//!  ├─ 1. Input      detect PNG / JPEG / PDF, split into pages
//!  ├─ 2. Render     pdfium at 200 DPI (images pass through untouched)
//!  ├─ 3. Analyse    one vision call per page, strictly in page order
//!  ├─ 4. Aggregate  ordered sections, failure marker for failed pages
//!  └─ 5. Export     DOCX artifact
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use handnote2docx::{analyze_to_file, AnalyzerConfig, Credential, GeminiClient, GeminiOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // GOOGLE_API_KEY or GEMINI_API_KEY
//!     let client = GeminiClient::new(Credential::from_env()?, GeminiOptions::default())?;
//!     let output = analyze_to_file(
//!         "lecture-notes.pdf",
//!         "lecture-notes.docx",
//!         Arc::new(client),
//!         AnalyzerConfig::default(),
//!     )
//!     .await?;
//!     eprintln!("{}/{} pages analysed", output.stats.succeeded_pages, output.stats.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `handnote` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::aggregate;
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, Credential, DEFAULT_DPI};
pub use controller::{
    analyze_bytes, analyze_file, analyze_sync, analyze_to_file, inspect, write_artifact,
    PipelineController, SourceInfo,
};
pub use document::{ImageEncoding, MediaType, Page, PageSource, RenderedImage, SourceDocument};
pub use error::{AnalysisError, AnalyzerError, ExportError, PageError, RenderError};
pub use output::{
    AggregatedReport, AnalysisOutput, ExportArtifact, PageOutcome, ReportSection, RunStats,
};
pub use pipeline::analyze::{
    AnalysisClient, GeminiClient, GeminiOptions, ProviderClient, ProviderOptions,
};
pub use pipeline::export::{DocumentExporter, DocxExporter, DOCX_CONTENT_TYPE};
pub use pipeline::input::Upload;
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{DEFAULT_INSTRUCTION, FAILURE_MARKER};
