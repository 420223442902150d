//! Page rasterisation: turn a [`Page`] into a [`RenderedImage`].
//!
//! PDF pages go through pdfium; uploaded images are passed through untouched
//! (only their dimensions are read), so the analysis call sees exactly what
//! the user uploaded.
//!
//! ## Render worker
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware, and a loaded `PdfDocument` borrows its `Pdfium` binding so
//! it cannot be parked between async calls. [`PdfiumRenderer`] therefore
//! starts one dedicated thread per PDF that binds pdfium and parses the
//! document once, then renders pages on request. The pipeline still awaits
//! each page before doing anything else. The thread exits when the renderer
//! is dropped or a different document arrives.

use crate::config::AnalyzerConfig;
use crate::document::{ImageEncoding, Page, PageSource, RenderedImage};
use crate::error::{AnalyzerError, RenderError};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

/// Environment variable pointing at an existing pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Renders one page at a given resolution.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, page: &Page, dpi: u32) -> Result<RenderedImage, RenderError>;
}

/// Default renderer: pdfium for PDF pages, pass-through for images.
#[derive(Clone, Default)]
pub struct PdfiumRenderer {
    password: Option<String>,
    max_rendered_pixels: Option<u32>,
    workers: Arc<Mutex<WorkerSlot>>,
}

#[derive(Default)]
struct WorkerSlot {
    current: Option<PdfWorker>,
    started: usize,
}

/// Handle to the thread holding one parsed PDF.
struct PdfWorker {
    document: Arc<Vec<u8>>,
    jobs: mpsc::Sender<RenderJob>,
}

struct RenderJob {
    page_index: usize,
    dpi: u32,
    reply: oneshot::Sender<Result<RenderedImage, RenderError>>,
}

impl std::fmt::Debug for PdfiumRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumRenderer")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .finish()
    }
}

impl PdfiumRenderer {
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            password: config.password.clone(),
            max_rendered_pixels: Some(config.max_rendered_pixels),
            workers: Arc::default(),
        }
    }

    /// Queue a page on the worker for `document`, starting one if needed.
    fn submit(
        &self,
        document: &Arc<Vec<u8>>,
        job: RenderJob,
    ) -> Result<(), RenderError> {
        let mut slot = self
            .workers
            .lock()
            .map_err(|_| RenderError::Join("render worker lock poisoned".to_string()))?;

        let job = match slot.current.as_ref() {
            Some(worker) if Arc::ptr_eq(&worker.document, document) => {
                match worker.jobs.send(job) {
                    Ok(()) => return Ok(()),
                    // Worker thread is gone; start a fresh one below.
                    Err(mpsc::SendError(job)) => job,
                }
            }
            _ => job,
        };

        let jobs = spawn_worker(
            Arc::clone(document),
            self.password.clone(),
            self.max_rendered_pixels,
        )?;
        slot.started += 1;
        debug!("Started pdfium render worker #{}", slot.started);
        jobs.send(job)
            .map_err(|_| RenderError::Join("render worker exited".to_string()))?;
        slot.current = Some(PdfWorker {
            document: Arc::clone(document),
            jobs,
        });
        Ok(())
    }

    #[cfg(test)]
    fn workers_started(&self) -> usize {
        self.workers.lock().map(|s| s.started).unwrap_or(0)
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render(&self, page: &Page, dpi: u32) -> Result<RenderedImage, RenderError> {
        match page.source() {
            PageSource::Image { data, encoding } => passthrough_image(data, *encoding),
            PageSource::Pdf {
                document,
                page_index,
            } => {
                let (reply, result) = oneshot::channel();
                self.submit(
                    document,
                    RenderJob {
                        page_index: *page_index,
                        dpi,
                        reply,
                    },
                )?;
                result
                    .await
                    .map_err(|_| RenderError::Join("render worker stopped".to_string()))?
            }
        }
    }
}

/// Bind pdfium and parse `document` once, then serve jobs until every
/// sender is dropped.
fn spawn_worker(
    document: Arc<Vec<u8>>,
    password: Option<String>,
    max_pixels: Option<u32>,
) -> Result<mpsc::Sender<RenderJob>, RenderError> {
    let (tx, rx) = mpsc::channel::<RenderJob>();

    std::thread::Builder::new()
        .name("pdfium-render".to_string())
        .spawn(move || {
            let pdfium = match bind_pdfium() {
                Ok(pdfium) => pdfium,
                Err(e) => {
                    for job in rx {
                        let _ = job.reply.send(Err(RenderError::Binding(e.clone())));
                    }
                    return;
                }
            };
            let loaded = match pdfium.load_pdf_from_byte_slice(&document, password.as_deref()) {
                Ok(loaded) => loaded,
                Err(e) => {
                    let detail = format!("{:?}", e);
                    for job in rx {
                        let _ = job.reply.send(Err(RenderError::Document(detail.clone())));
                    }
                    return;
                }
            };
            debug!("PDF parsed for rendering: {} pages", loaded.pages().len());

            for job in rx {
                let result = render_loaded_page(&loaded, job.page_index, job.dpi, max_pixels);
                // The caller may have given up on this page.
                let _ = job.reply.send(result);
            }
        })
        .map_err(|e| RenderError::Join(format!("cannot start render worker: {e}")))?;

    Ok(tx)
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, String> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(path.as_str()),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| format!("{:?}", e))?;
    Ok(Pdfium::new(bindings))
}

/// Count the pages of a PDF without rendering anything.
pub async fn count_pdf_pages(bytes: &[u8], password: Option<&str>) -> Result<usize, AnalyzerError> {
    let bytes = bytes.to_vec();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || count_pdf_pages_blocking(&bytes, password.as_deref()))
        .await
        .map_err(|e| AnalyzerError::Internal(format!("Page-count task panicked: {}", e)))?
}

fn count_pdf_pages_blocking(bytes: &[u8], password: Option<&str>) -> Result<usize, AnalyzerError> {
    let pdfium = bind_pdfium().map_err(AnalyzerError::PdfiumBindingFailed)?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    AnalyzerError::WrongPassword
                } else {
                    AnalyzerError::PasswordRequired
                }
            } else {
                AnalyzerError::CorruptPdf { detail: err_str }
            }
        })?;

    Ok(document.pages().len() as usize)
}

fn render_loaded_page(
    document: &PdfDocument<'_>,
    page_index: usize,
    dpi: u32,
    max_pixels: Option<u32>,
) -> Result<RenderedImage, RenderError> {
    let pages = document.pages();
    let total = pages.len() as usize;
    if page_index >= total {
        return Err(RenderError::MissingPage {
            index: page_index,
            total,
        });
    }

    let page = pages
        .get(page_index as u16)
        .map_err(|e| RenderError::Rasterise(format!("{:?}", e)))?;

    // PDF user space is 72 units per inch.
    let mut render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
    if let Some(max) = max_pixels {
        render_config = render_config
            .set_maximum_width(max as i32)
            .set_maximum_height(max as i32);
    }

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| RenderError::Rasterise(format!("{:?}", e)))?;

    let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
    debug!(
        "Rendered page {} at {} DPI → {}x{} px",
        page_index + 1,
        dpi,
        image.width(),
        image.height()
    );

    encode_png(&image)
}

/// Encode an RGB raster as PNG. Lossless keeps pen strokes crisp.
pub fn encode_png(image: &DynamicImage) -> Result<RenderedImage, RenderError> {
    let mut data = Vec::new();
    image.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)?;
    Ok(RenderedImage {
        data,
        width: image.width(),
        height: image.height(),
        encoding: ImageEncoding::Png,
    })
}

fn passthrough_image(data: &[u8], encoding: ImageEncoding) -> Result<RenderedImage, RenderError> {
    let (width, height) =
        image::ImageReader::with_format(Cursor::new(data), encoding.image_format())
            .into_dimensions()?;
    Ok(RenderedImage {
        data: data.to_vec(),
        width,
        height,
        encoding,
    })
}
