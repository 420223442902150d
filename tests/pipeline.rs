//! Integration tests for the batch pipeline with fake collaborators.
//!
//! No pdfium, no network: the renderer, client and exporter are in-memory
//! fakes that count their calls so ordering and "no work on empty input"
//! can be asserted directly.

use async_trait::async_trait;
use handnote2docx::{
    AnalysisClient, AnalysisError, AnalysisProgressCallback, AnalyzerConfig, AnalyzerError,
    DocumentExporter, ExportError, ImageEncoding, MediaType, Page, PageError, PageOutcome,
    PageRenderer, PageSource, PipelineController, RenderError, RenderedImage, SourceDocument,
    DEFAULT_DPI, DEFAULT_INSTRUCTION, FAILURE_MARKER,
};
use std::collections::HashSet;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────

/// Encodes the page index into the image bytes; fails on chosen pages.
#[derive(Default)]
struct FakeRenderer {
    fail_on: HashSet<usize>,
    calls: AtomicUsize,
    dpis: Mutex<Vec<u32>>,
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, page: &Page, dpi: u32) -> Result<RenderedImage, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dpis.lock().unwrap().push(dpi);
        if self.fail_on.contains(&page.index()) {
            return Err(RenderError::Rasterise(format!("page {} unreadable", page.index())));
        }
        Ok(RenderedImage {
            data: vec![page.index() as u8],
            width: 10,
            height: 10,
            encoding: ImageEncoding::Png,
        })
    }
}

/// Replies `T{n}` for page index n unless told to fail on it.
#[derive(Default)]
struct FakeClient {
    fail_on: HashSet<usize>,
    calls: AtomicUsize,
    seen: Mutex<Vec<usize>>,
    instructions: Mutex<Vec<String>>,
}

#[async_trait]
impl AnalysisClient for FakeClient {
    async fn analyze(
        &self,
        image: &RenderedImage,
        instruction: &str,
    ) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = image.data[0] as usize;
        self.seen.lock().unwrap().push(index);
        self.instructions.lock().unwrap().push(instruction.to_string());
        if self.fail_on.contains(&index) {
            return Err(AnalysisError::Api {
                status: 500,
                body: "internal".into(),
            });
        }
        Ok(format!("T{}", index + 1))
    }
}

/// Keeps the text it was asked to export.
#[derive(Default)]
struct CapturingExporter {
    calls: AtomicUsize,
    text: Mutex<Option<String>>,
    broken: bool,
}

impl DocumentExporter for CapturingExporter {
    fn export(&self, text: &str) -> Result<Vec<u8>, ExportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(ExportError::Io(std::io::Error::other("disk full")));
        }
        *self.text.lock().unwrap() = Some(text.to_string());
        Ok(text.as_bytes().to_vec())
    }

    fn content_type(&self) -> &'static str {
        "text/plain"
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl AnalysisProgressCallback for EventLog {
    fn on_run_start(&self, total: usize) {
        self.0.lock().unwrap().push(format!("start {total}"));
    }
    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.0.lock().unwrap().push(format!("page {page_num}"));
    }
    fn on_page_complete(&self, page_num: usize, _total: usize, _len: usize) {
        self.0.lock().unwrap().push(format!("ok {page_num}"));
    }
    fn on_page_error(&self, page_num: usize, _total: usize, _reason: &str) {
        self.0.lock().unwrap().push(format!("err {page_num}"));
    }
    fn on_run_complete(&self, total: usize, success_count: usize) {
        self.0.lock().unwrap().push(format!("done {success_count}/{total}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn pdf_with_pages(n: usize) -> SourceDocument {
    SourceDocument::new(
        MediaType::Pdf,
        (0..n).map(|i| PageSource::Pdf {
            document: Arc::new(Vec::new()),
            page_index: i,
        }),
    )
}

fn controller(
    renderer: &Arc<FakeRenderer>,
    client: &Arc<FakeClient>,
    exporter: &Arc<CapturingExporter>,
    config: AnalyzerConfig,
) -> PipelineController {
    PipelineController::new(client.clone(), config)
        .with_renderer(renderer.clone())
        .with_exporter(exporter.clone())
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_pages_all_succeed() {
    let renderer = Arc::new(FakeRenderer::default());
    let client = Arc::new(FakeClient::default());
    let exporter = Arc::new(CapturingExporter::default());

    let output = controller(&renderer, &client, &exporter, AnalyzerConfig::default())
        .run(pdf_with_pages(3))
        .await
        .unwrap();

    assert_eq!(
        output.report.text(),
        "## Results for Page 1\n\nT1\n\n## Results for Page 2\n\nT2\n\n## Results for Page 3\n\nT3"
    );
    assert_eq!(output.report.section_count(), 3);
    assert_eq!(output.stats.succeeded_pages, 3);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    assert_eq!(exporter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        exporter.text.lock().unwrap().as_deref(),
        Some(output.report.text())
    );
}

#[tokio::test]
async fn render_failure_on_middle_page_is_recorded_and_run_continues() {
    let renderer = Arc::new(FakeRenderer {
        fail_on: HashSet::from([1]),
        ..Default::default()
    });
    let client = Arc::new(FakeClient::default());
    let exporter = Arc::new(CapturingExporter::default());

    let output = controller(&renderer, &client, &exporter, AnalyzerConfig::default())
        .run(pdf_with_pages(3))
        .await
        .unwrap();

    assert_eq!(
        output.report.text(),
        format!(
            "## Results for Page 1\n\nT1\n\n## Results for Page 2\n\n{FAILURE_MARKER}\n\n## Results for Page 3\n\nT3"
        )
    );
    // The failed page never reaches the client.
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    assert_eq!(*client.seen.lock().unwrap(), vec![0, 2]);

    let error = output.outcomes[1].error().unwrap();
    assert!(matches!(error, PageError::RenderFailed { page: 2, .. }));
    assert_eq!(error.reason(), "render error");
    assert_eq!(output.stats.render_failures, 1);
}

#[tokio::test]
async fn single_page_analysis_failure_still_exports_docx() {
    let renderer = Arc::new(FakeRenderer::default());
    let client = Arc::new(FakeClient {
        fail_on: HashSet::from([0]),
        ..Default::default()
    });

    let controller = PipelineController::new(client.clone(), AnalyzerConfig::default())
        .with_renderer(renderer.clone());
    let source = SourceDocument::new(
        MediaType::Png,
        [PageSource::Image {
            data: Arc::new(vec![0]),
            encoding: ImageEncoding::Png,
        }],
    );
    let output = controller.run(source).await.unwrap();

    assert_eq!(
        output.report.text(),
        format!("## Results for Page 1\n\n{FAILURE_MARKER}")
    );
    assert_eq!(output.outcomes[0].error().unwrap().reason(), "analysis failed");
    assert_eq!(output.artifact.file_name, "analysis_result.docx");
    assert!(!output.artifact.bytes.is_empty());

    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(output.artifact.bytes.clone())).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    assert!(xml.contains(">## Results for Page 1</w:t>"));
    assert!(xml.contains(FAILURE_MARKER));
}

#[tokio::test]
async fn empty_source_is_rejected_before_any_work() {
    let renderer = Arc::new(FakeRenderer::default());
    let client = Arc::new(FakeClient::default());
    let exporter = Arc::new(CapturingExporter::default());
    let events = Arc::new(EventLog::default());
    let config = AnalyzerConfig::builder()
        .progress_callback(events.clone())
        .build()
        .unwrap();

    let err = controller(&renderer, &client, &exporter, config)
        .run(pdf_with_pages(0))
        .await
        .unwrap_err();

    assert!(matches!(err, AnalyzerError::EmptyInput));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    assert_eq!(exporter.calls.load(Ordering::SeqCst), 0);
    assert!(events.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn exporter_failure_is_fatal() {
    let renderer = Arc::new(FakeRenderer::default());
    let client = Arc::new(FakeClient::default());
    let exporter = Arc::new(CapturingExporter {
        broken: true,
        ..Default::default()
    });

    let err = controller(&renderer, &client, &exporter, AnalyzerConfig::default())
        .run(pdf_with_pages(2))
        .await
        .unwrap_err();

    assert!(matches!(err, AnalyzerError::Export(_)));
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);
}

// ── Properties ───────────────────────────────────────────────────────────

#[tokio::test]
async fn outcomes_match_pages_in_order_for_any_failure_pattern() {
    for n in 1..=6usize {
        for mask in 0u32..(1 << n) {
            let fails: HashSet<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
            let renderer = Arc::new(FakeRenderer::default());
            let client = Arc::new(FakeClient {
                fail_on: fails.clone(),
                ..Default::default()
            });
            let exporter = Arc::new(CapturingExporter::default());

            let output = controller(&renderer, &client, &exporter, AnalyzerConfig::default())
                .run(pdf_with_pages(n))
                .await
                .unwrap();

            assert_eq!(output.outcomes.len(), n);
            assert_eq!(output.report.section_count(), n);
            for (i, outcome) in output.outcomes.iter().enumerate() {
                assert_eq!(outcome.page_index(), i);
                assert_eq!(outcome.is_success(), !fails.contains(&i));
            }
            assert_eq!(client.calls.load(Ordering::SeqCst), n);
            assert_eq!(
                *client.seen.lock().unwrap(),
                (0..n).collect::<Vec<_>>(),
                "pages must be analysed in ascending order"
            );
            assert_eq!(output.stats.analysis_failures, fails.len());
        }
    }
}

#[tokio::test]
async fn progress_events_follow_page_order() {
    let renderer = Arc::new(FakeRenderer {
        fail_on: HashSet::from([1]),
        ..Default::default()
    });
    let client = Arc::new(FakeClient::default());
    let exporter = Arc::new(CapturingExporter::default());
    let events = Arc::new(EventLog::default());
    let config = AnalyzerConfig::builder()
        .progress_callback(events.clone())
        .build()
        .unwrap();

    controller(&renderer, &client, &exporter, config)
        .run(pdf_with_pages(3))
        .await
        .unwrap();

    assert_eq!(
        *events.0.lock().unwrap(),
        vec![
            "start 3", "page 1", "ok 1", "page 2", "err 2", "page 3", "ok 3", "done 2/3"
        ]
    );
}

#[tokio::test]
async fn dpi_and_instruction_are_fixed_for_the_run() {
    let renderer = Arc::new(FakeRenderer::default());
    let client = Arc::new(FakeClient::default());
    let exporter = Arc::new(CapturingExporter::default());

    controller(&renderer, &client, &exporter, AnalyzerConfig::default())
        .run(pdf_with_pages(3))
        .await
        .unwrap();

    assert_eq!(*renderer.dpis.lock().unwrap(), vec![DEFAULT_DPI; 3]);
    assert!(client
        .instructions
        .lock()
        .unwrap()
        .iter()
        .all(|i| i == DEFAULT_INSTRUCTION));
}

#[tokio::test]
async fn success_text_is_kept_verbatim() {
    struct Markdown;

    #[async_trait]
    impl AnalysisClient for Markdown {
        async fn analyze(&self, _: &RenderedImage, _: &str) -> Result<String, AnalysisError> {
            Ok("### Transcript\n  Dear   diary \n\n### Summary\n- x".to_string())
        }
    }

    let renderer = Arc::new(FakeRenderer::default());
    let controller = PipelineController::new(Arc::new(Markdown), AnalyzerConfig::default())
        .with_renderer(renderer);
    let output = controller.run(pdf_with_pages(1)).await.unwrap();

    match &output.outcomes[0] {
        PageOutcome::Success { text, .. } => {
            assert_eq!(text, "### Transcript\n  Dear   diary \n\n### Summary\n- x")
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert!(output
        .report
        .text()
        .ends_with("### Transcript\n  Dear   diary \n\n### Summary\n- x"));
}
