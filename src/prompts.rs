//! Instruction text and report vocabulary.
//!
//! Everything the pipeline says to the generation service, and every fixed
//! string it writes into the report, lives here so tests can import and
//! inspect them directly.

/// Instruction sent with every page image.
///
/// Used when `AnalyzerConfig::instruction` is `None`. The requested shape is
/// never enforced on the response; whatever comes back is stored verbatim.
pub const DEFAULT_INSTRUCTION: &str = r#"Based on the provided image of a handwritten document, perform the following two tasks:
1.  **Transcript:** Provide a full transcript of all the text visible in the document. Preserve the original line breaks and formatting as much as possible.
2.  **Summary:** After the transcript, provide a concise summary of the document's content.

Structure your response exactly as follows, using Markdown formatting:
### Transcript
---
[Your full transcript here]

### Summary
---
[Your summary here]"#;

/// Written in place of the text for any page that failed.
pub const FAILURE_MARKER: &str = "[ANALYSIS FAILED]";

/// Placed between page sections in the report.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Heading line for the section of a 1-indexed page.
pub fn section_heading(page_num: usize) -> String {
    format!("## Results for Page {page_num}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_requests_both_sections_in_order() {
        let t = DEFAULT_INSTRUCTION.find("### Transcript").unwrap();
        let s = DEFAULT_INSTRUCTION.find("### Summary").unwrap();
        assert!(t < s);
    }

    #[test]
    fn heading_is_one_indexed_text() {
        assert_eq!(section_heading(1), "## Results for Page 1");
        assert_eq!(section_heading(12), "## Results for Page 12");
    }
}
