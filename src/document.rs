//! Input-side data model: the uploaded document, its pages, and the raster
//! images rendered from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kinds of upload the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Png,
    Jpeg,
    Pdf,
}

impl MediaType {
    /// Parse a MIME type tag, ignoring parameters such as `; charset=…`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "application/pdf" | "application/x-pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Detect the type from the leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(Self::Pdf)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    /// Guess the type from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, Self::Pdf)
    }

    /// Default name of the export artifact for this kind of upload.
    pub fn default_export_name(self) -> &'static str {
        if self.is_image() {
            "analysis_result.docx"
        } else {
            "full_pdf_analysis.docx"
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Raster encodings a [`RenderedImage`] may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageEncoding {
    Png,
    Jpeg,
}

impl ImageEncoding {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// How a page can be turned into pixels.
#[derive(Clone)]
pub enum PageSource {
    /// The upload itself is the page image.
    Image {
        data: Arc<Vec<u8>>,
        encoding: ImageEncoding,
    },
    /// One page of a PDF; the whole document buffer is shared between pages.
    Pdf {
        document: Arc<Vec<u8>>,
        page_index: usize,
    },
}

impl fmt::Debug for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSource::Image { data, encoding } => f
                .debug_struct("Image")
                .field("bytes", &data.len())
                .field("encoding", encoding)
                .finish(),
            PageSource::Pdf {
                document,
                page_index,
            } => f
                .debug_struct("Pdf")
                .field("bytes", &document.len())
                .field("page_index", page_index)
                .finish(),
        }
    }
}

/// One unit of input.
#[derive(Debug, Clone)]
pub struct Page {
    index: usize,
    source: PageSource,
}

impl Page {
    pub fn new(index: usize, source: PageSource) -> Self {
        Self { index, source }
    }

    /// 0-based position in the source document.
    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based number used in headings and progress events.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn source(&self) -> &PageSource {
        &self.source
    }
}

/// An uploaded document split into pages, in document order.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    media_type: MediaType,
    pages: Vec<Page>,
}

impl SourceDocument {
    /// Build a document from pages. Pages are re-indexed to match their
    /// position so indices are always `0..len`.
    pub fn new(media_type: MediaType, pages: impl IntoIterator<Item = PageSource>) -> Self {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, source)| Page::new(index, source))
            .collect();
        Self { media_type, pages }
    }

    /// A one-page document whose page is the image itself.
    pub fn single_image(data: Vec<u8>, encoding: ImageEncoding) -> Self {
        let media_type = match encoding {
            ImageEncoding::Png => MediaType::Png,
            ImageEncoding::Jpeg => MediaType::Jpeg,
        };
        Self::new(
            media_type,
            [PageSource::Image {
                data: Arc::new(data),
                encoding,
            }],
        )
    }

    /// A PDF with `page_count` pages sharing one buffer.
    pub fn pdf(document: Vec<u8>, page_count: usize) -> Self {
        let document = Arc::new(document);
        Self::new(
            MediaType::Pdf,
            (0..page_count).map(|page_index| PageSource::Pdf {
                document: Arc::clone(&document),
                page_index,
            }),
        )
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// A page rendered to an encoded raster image, ready for the analysis call.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
}

impl fmt::Debug for RenderedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedImage")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_parsing_ignores_case_and_parameters() {
        assert_eq!(MediaType::from_mime("image/PNG"), Some(MediaType::Png));
        assert_eq!(
            MediaType::from_mime("application/pdf; qs=0.9"),
            Some(MediaType::Pdf)
        );
        assert_eq!(MediaType::from_mime("image/jpg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime("text/html"), None);
    }

    #[test]
    fn sniff_magic_bytes() {
        assert_eq!(MediaType::sniff(b"%PDF-1.7\n"), Some(MediaType::Pdf));
        assert_eq!(
            MediaType::sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
            Some(MediaType::Png)
        );
        assert_eq!(MediaType::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(MediaType::Jpeg));
        assert_eq!(MediaType::sniff(b"GIF89a"), None);
        assert_eq!(MediaType::sniff(b""), None);
    }

    #[test]
    fn export_names_follow_upload_kind() {
        assert_eq!(MediaType::Png.default_export_name(), "analysis_result.docx");
        assert_eq!(MediaType::Pdf.default_export_name(), "full_pdf_analysis.docx");
    }

    #[test]
    fn pdf_pages_are_indexed_in_order_and_share_buffer() {
        let doc = SourceDocument::pdf(b"%PDF-1.4".to_vec(), 3);
        assert_eq!(doc.len(), 3);
        let indices: Vec<usize> = doc.pages().iter().map(Page::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(doc.pages()[2].number(), 3);

        match (doc.pages()[0].source(), doc.pages()[2].source()) {
            (
                PageSource::Pdf { document: a, .. },
                PageSource::Pdf {
                    document: b,
                    page_index,
                },
            ) => {
                assert!(Arc::ptr_eq(a, b));
                assert_eq!(*page_index, 2);
            }
            other => panic!("unexpected sources: {other:?}"),
        }
    }

    #[test]
    fn single_image_has_one_page() {
        let doc = SourceDocument::single_image(vec![1, 2, 3], ImageEncoding::Jpeg);
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.media_type(), MediaType::Jpeg);
        assert!(!doc.is_empty());
    }

    #[test]
    fn empty_document() {
        let doc = SourceDocument::pdf(Vec::new(), 0);
        assert!(doc.is_empty());
    }
}
