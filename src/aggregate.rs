//! Fold per-page outcomes into one report.
//!
//! [`aggregate`] is a pure function: the same ordered outcomes always give
//! byte-identical text. It trusts the order it is given; the controller is
//! the one that guarantees ascending page order.

use crate::output::{AggregatedReport, PageOutcome, ReportSection};
use crate::prompts::{section_heading, FAILURE_MARKER, SECTION_SEPARATOR};

/// Build the report for `outcomes`, one section per outcome, in input order.
///
/// Successful pages contribute their text verbatim; failed pages contribute
/// [`FAILURE_MARKER`]. An empty slice yields an empty report with no sections.
pub fn aggregate(outcomes: &[PageOutcome]) -> AggregatedReport {
    let sections: Vec<ReportSection> = outcomes
        .iter()
        .map(|outcome| {
            let page_num = outcome.page_index() + 1;
            ReportSection {
                page_num,
                heading: section_heading(page_num),
                body: outcome.text().unwrap_or(FAILURE_MARKER).to_string(),
            }
        })
        .collect();

    let text = sections
        .iter()
        .map(ReportSection::render)
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);

    AggregatedReport { sections, text }
}
