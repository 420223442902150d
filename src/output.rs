//! Output-side data model: per-page outcomes, the aggregated report, and the
//! export artifact.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of processing one page. Created once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageOutcome {
    Success { page_index: usize, text: String },
    Failure { page_index: usize, error: PageError },
}

impl PageOutcome {
    /// 0-based index of the page this outcome belongs to.
    pub fn page_index(&self) -> usize {
        match self {
            PageOutcome::Success { page_index, .. } | PageOutcome::Failure { page_index, .. } => {
                *page_index
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PageOutcome::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            PageOutcome::Success { text, .. } => Some(text),
            PageOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&PageError> {
        match self {
            PageOutcome::Success { .. } => None,
            PageOutcome::Failure { error, .. } => Some(error),
        }
    }
}

/// One labelled section of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    /// 1-indexed page number.
    pub page_num: usize,
    /// `## Results for Page N`
    pub heading: String,
    /// The page's text verbatim, or the failure marker.
    pub body: String,
}

impl ReportSection {
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.heading, self.body)
    }
}

/// All page sections in page order, plus the joined text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub(crate) sections: Vec<ReportSection>,
    pub(crate) text: String,
}

impl AggregatedReport {
    pub fn sections(&self) -> &[ReportSection] {
        &self.sections
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// The downloadable document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ExportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportArtifact")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub render_failures: usize,
    pub analysis_failures: usize,
    pub total_duration_ms: u64,
}

impl RunStats {
    pub fn failed_pages(&self) -> usize {
        self.render_failures + self.analysis_failures
    }

    pub(crate) fn from_outcomes(outcomes: &[PageOutcome], total_duration_ms: u64) -> Self {
        let mut stats = RunStats {
            total_pages: outcomes.len(),
            total_duration_ms,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.error() {
                None => stats.succeeded_pages += 1,
                Some(PageError::RenderFailed { .. }) => stats.render_failures += 1,
                Some(PageError::AnalysisFailed { .. }) => stats.analysis_failures += 1,
            }
        }
        stats
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub artifact: ExportArtifact,
    pub report: AggregatedReport,
    pub outcomes: Vec<PageOutcome>,
    pub stats: RunStats,
}
