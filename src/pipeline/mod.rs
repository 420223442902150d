//! Pipeline stages and the collaborator seams the controller drives.
//!
//! Each submodule implements exactly one step. The three external
//! collaborators sit behind traits so the controller can be exercised with
//! fakes and the backends swapped without touching orchestration.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ analyze ──▶ (aggregate) ──▶ export
//! (path/URL) (pdfium)   (base64)   (VLM)                       (DOCX)
//! ```
//!
//! 1. [`input`]   — resolve a path or URL to an upload and load its pages
//! 2. [`render`]  — [`render::PageRenderer`]: PDF pages via pdfium on a
//!    render thread that parses the document once, images passed through
//! 3. [`encode`]  — base64-wrap rendered bytes for the request body
//! 4. [`analyze`] — [`analyze::AnalysisClient`]: one call per page, no retries
//! 5. [`export`]  — [`export::DocumentExporter`]: report text to DOCX

pub mod analyze;
pub mod encode;
pub mod export;
pub mod input;
pub mod render;
