//! Error types for the handnote2docx library.
//!
//! Two layers of errors reflect two distinct failure modes:
//!
//! * [`AnalyzerError`] — **Fatal**: the run cannot proceed at all (no pages,
//!   unreadable upload, credential missing, exporter broke). Returned as
//!   `Err(AnalyzerError)` from [`crate::PipelineController::run`] and the
//!   `analyze_*` entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single page could not be rendered or
//!   analysed. Stored inside [`crate::output::PageOutcome::Failure`] and shown
//!   as a failure marker in the report, while every other page carries on.
//!
//! The collaborator traits report their own narrow errors
//! ([`RenderError`], [`AnalysisError`], [`ExportError`]); the controller maps
//! the first two into [`PageError`] and the last into
//! [`AnalyzerError::Export`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the handnote2docx library.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source document contains no pages.
    #[error("Nothing to analyse: the uploaded document has no pages")]
    EmptyInput,

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upload is neither a PNG, a JPEG nor a PDF.
    #[error("Unsupported document type '{media_type}'. Upload a JPEG, PNG or PDF.")]
    UnsupportedMediaType { media_type: String },

    // ── Source errors ─────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// An uploaded image could not be decoded.
    #[error("Image could not be decoded: {detail}")]
    CorruptImage { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium system-wide, or set PDFIUM_LIB_PATH=/path/to/libpdfium\n\
to point at an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Service errors ────────────────────────────────────────────────────
    /// No credential for the external generation service.
    #[error("API key not found.\nSet GOOGLE_API_KEY or GEMINI_API_KEY, or pass --api-key.")]
    CredentialMissing,

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The exporter could not serialise the report.
    #[error("Failed to build the export document: {0}")]
    Export(#[from] ExportError),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Page numbers are 1-indexed, matching the section headings in the report.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page could not be turned into an image.
    #[error("Page {page}: render error: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The generation service failed or returned nothing usable.
    #[error("Page {page}: analysis failed: {detail}")]
    AnalysisFailed { page: usize, detail: String },
}

impl PageError {
    /// Short reason tag shown in progress notifications.
    pub fn reason(&self) -> &'static str {
        match self {
            PageError::RenderFailed { .. } => "render error",
            PageError::AnalysisFailed { .. } => "analysis failed",
        }
    }

    /// 1-indexed page number this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. } | PageError::AnalysisFailed { page, .. } => *page,
        }
    }
}

/// Failure reported by a [`crate::pipeline::render::PageRenderer`].
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not bind pdfium: {0}")]
    Binding(String),

    #[error("could not open document: {0}")]
    Document(String),

    #[error("page {index} does not exist (document has {total} pages)")]
    MissingPage { index: usize, total: usize },

    #[error("rasterisation failed: {0}")]
    Rasterise(String),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("render task panicked: {0}")]
    Join(String),
}

/// Failure reported by a [`crate::pipeline::analyze::AnalysisClient`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Transport-level failure (DNS, TLS, connection reset…).
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The response body could not be understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The service answered but produced no text.
    #[error("empty response")]
    EmptyResponse,

    /// The call did not finish within the client's timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Failure reported by a [`crate::pipeline::export::DocumentExporter`].
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("zip packaging failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML serialisation failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
