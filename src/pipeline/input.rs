//! Input resolution: turn a user-supplied path or URL into an in-memory
//! [`Upload`], then load it into a [`SourceDocument`].
//!
//! The upload always carries a [`MediaType`]. For HTTP inputs it comes from
//! the `Content-Type` header; for local files (or generic headers such as
//! `application/octet-stream`) it is sniffed from the magic bytes, with the
//! file extension as the last resort.

use crate::document::{ImageEncoding, MediaType, SourceDocument};
use crate::error::AnalyzerError;
use crate::pipeline::render;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raw uploaded bytes plus their type tag.
#[derive(Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
    pub file_name: Option<String>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("bytes", &self.bytes.len())
            .field("media_type", &self.media_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

impl Upload {
    /// Wrap bytes with an explicit MIME type tag.
    pub fn from_mime(bytes: Vec<u8>, mime: &str) -> Result<Self, AnalyzerError> {
        let media_type =
            MediaType::from_mime(mime).ok_or_else(|| AnalyzerError::UnsupportedMediaType {
                media_type: mime.to_string(),
            })?;
        Ok(Self {
            bytes,
            media_type,
            file_name: None,
        })
    }

    /// Wrap bytes, detecting the type from their content.
    pub fn sniffed(bytes: Vec<u8>, file_name: Option<String>) -> Result<Self, AnalyzerError> {
        let media_type = detect_media_type(&bytes, None, file_name.as_deref())?;
        Ok(Self {
            bytes,
            media_type,
            file_name,
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an [`Upload`].
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Upload, AnalyzerError> {
    if input.trim().is_empty() {
        return Err(AnalyzerError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Pick a media type from (in order) the declared MIME type, the magic
/// bytes, and the file extension.
pub fn detect_media_type(
    bytes: &[u8],
    declared: Option<&str>,
    file_name: Option<&str>,
) -> Result<MediaType, AnalyzerError> {
    if let Some(mt) = declared.and_then(MediaType::from_mime) {
        return Ok(mt);
    }
    if let Some(mt) = MediaType::sniff(bytes) {
        return Ok(mt);
    }
    let by_ext = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .and_then(MediaType::from_extension);
    by_ext.ok_or_else(|| AnalyzerError::UnsupportedMediaType {
        media_type: declared.unwrap_or("unknown").to_string(),
    })
}

async fn read_local(path_str: &str) -> Result<Upload, AnalyzerError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => AnalyzerError::PermissionDenied { path: path.clone() },
        _ => AnalyzerError::FileNotFound { path: path.clone() },
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());
    let media_type = detect_media_type(&bytes, None, file_name.as_deref())?;

    debug!(
        "Resolved local upload: {} ({}, {} bytes)",
        path.display(),
        media_type,
        bytes.len()
    );
    Ok(Upload {
        bytes,
        media_type,
        file_name,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, AnalyzerError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnalyzerError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AnalyzerError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnalyzerError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AnalyzerError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let file_name = file_name_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AnalyzerError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let media_type = detect_media_type(&bytes, declared.as_deref(), file_name.as_deref())?;
    info!("Downloaded {} bytes ({})", bytes.len(), media_type);

    Ok(Upload {
        bytes,
        media_type,
        file_name,
    })
}

/// Last non-empty path segment containing a dot, if any.
fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

/// Load an upload into a [`SourceDocument`].
///
/// Images become one page and are decoded once here so a corrupt upload is
/// rejected up front. PDFs are opened with pdfium to count their pages.
pub async fn load_source(
    upload: Upload,
    password: Option<&str>,
) -> Result<SourceDocument, AnalyzerError> {
    let Upload {
        bytes, media_type, ..
    } = upload;

    let source = match media_type {
        MediaType::Png | MediaType::Jpeg => {
            let encoding = if media_type == MediaType::Png {
                ImageEncoding::Png
            } else {
                ImageEncoding::Jpeg
            };
            image::load_from_memory_with_format(&bytes, encoding.image_format()).map_err(|e| {
                AnalyzerError::CorruptImage {
                    detail: e.to_string(),
                }
            })?;
            SourceDocument::single_image(bytes, encoding)
        }
        MediaType::Pdf => {
            let page_count = render::count_pdf_pages(&bytes, password).await?;
            SourceDocument::pdf(bytes, page_count)
        }
    };

    info!("Loaded {} with {} page(s)", source.media_type(), source.len());
    Ok(source)
}
