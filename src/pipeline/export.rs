//! Report → DOCX.
//!
//! [`DocxExporter`] writes a minimal WordprocessingML package with `zip` and
//! `quick-xml`: one paragraph per line of the report, text written exactly as
//! given. Optionally, lines starting with a Markdown ATX marker (`#` …
//! `######`) get the built-in `Heading1`…`Heading6` paragraph style; the
//! marker stays in the text either way. Any text, including the empty
//! string, yields a package Word and LibreOffice open without complaint.

use crate::error::ExportError;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use regex::Regex;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Serialises report text into a downloadable document.
pub trait DocumentExporter: Send + Sync {
    fn export(&self, text: &str) -> Result<Vec<u8>, ExportError>;

    /// MIME type of the produced bytes.
    fn content_type(&self) -> &'static str;
}

/// Writes `.docx` files.
#[derive(Debug, Clone)]
pub struct DocxExporter {
    title: String,
    markdown_headings: bool,
}

impl Default for DocxExporter {
    fn default() -> Self {
        Self {
            title: "Handwritten Document Analysis".to_string(),
            markdown_headings: false,
        }
    }
}

impl DocxExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document title stored in `docProps/core.xml`.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Style `#`-prefixed lines as headings. Off by default. The line text,
    /// markers included, is written unchanged in both modes.
    pub fn markdown_headings(mut self, enabled: bool) -> Self {
        self.markdown_headings = enabled;
        self
    }
}

impl DocumentExporter for DocxExporter {
    fn export(&self, text: &str) -> Result<Vec<u8>, ExportError> {
        let document_xml = self.document_xml(text)?;
        let core_xml = core_properties_xml(&self.title)?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let parts: [(&str, &[u8]); 6] = [
            ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
            ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
            ("docProps/core.xml", &core_xml),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.as_bytes()),
            ("word/styles.xml", STYLES_XML.as_bytes()),
            ("word/document.xml", &document_xml),
        ];
        for (name, data) in parts {
            zip.start_file(name, options)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    fn content_type(&self) -> &'static str {
        DOCX_CONTENT_TYPE
    }
}

// ── Line classification ──────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+\S").unwrap());

/// Paragraph style for `line`, if any.
fn heading_style(line: &str, markdown_headings: bool) -> Option<String> {
    if !markdown_headings {
        return None;
    }
    RE_HEADING
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("Heading{}", m.as_str().len()))
}

/// Drop characters XML 1.0 cannot carry. Tabs are handled separately.
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|&c| c == '\t' || !c.is_control())
        .filter(|&c| !matches!(c, '\u{FFFE}' | '\u{FFFF}'))
        .collect()
}

// ── document.xml ─────────────────────────────────────────────────────────

impl DocxExporter {
    fn document_xml(&self, text: &str) -> Result<Vec<u8>, ExportError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let mut root = BytesStart::new("w:document");
        root.push_attribute(("xmlns:w", NS_W));
        writer.write_event(Event::Start(root))?;
        writer.write_event(Event::Start(BytesStart::new("w:body")))?;

        let mut wrote_any = false;
        for line in text.lines() {
            let line = xml_safe(line);
            let style = heading_style(&line, self.markdown_headings);
            write_paragraph(&mut writer, style.as_deref(), &line)?;
            wrote_any = true;
        }
        if !wrote_any {
            write_paragraph(&mut writer, None, "")?;
        }

        write_section_properties(&mut writer)?;
        writer.write_event(Event::End(BytesEnd::new("w:body")))?;
        writer.write_event(Event::End(BytesEnd::new("w:document")))?;

        Ok(writer.into_inner().into_inner())
    }
}

fn write_paragraph<W: Write>(
    writer: &mut Writer<W>,
    style: Option<&str>,
    text: &str,
) -> Result<(), ExportError> {
    writer.write_event(Event::Start(BytesStart::new("w:p")))?;

    if let Some(style) = style {
        writer.write_event(Event::Start(BytesStart::new("w:pPr")))?;
        let mut p_style = BytesStart::new("w:pStyle");
        p_style.push_attribute(("w:val", style));
        writer.write_event(Event::Empty(p_style))?;
        writer.write_event(Event::End(BytesEnd::new("w:pPr")))?;
    }

    if !text.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("w:r")))?;
        for (i, segment) in text.split('\t').enumerate() {
            if i > 0 {
                writer.write_event(Event::Empty(BytesStart::new("w:tab")))?;
            }
            if segment.is_empty() {
                continue;
            }
            let mut t = BytesStart::new("w:t");
            t.push_attribute(("xml:space", "preserve"));
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::new(segment)))?;
            writer.write_event(Event::End(BytesEnd::new("w:t")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("w:r")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("w:p")))?;
    Ok(())
}

/// US Letter, one-inch margins.
fn write_section_properties<W: Write>(writer: &mut Writer<W>) -> Result<(), ExportError> {
    writer.write_event(Event::Start(BytesStart::new("w:sectPr")))?;

    let mut size = BytesStart::new("w:pgSz");
    size.push_attribute(("w:w", "12240"));
    size.push_attribute(("w:h", "15840"));
    writer.write_event(Event::Empty(size))?;

    let mut margins = BytesStart::new("w:pgMar");
    for (side, twips) in [
        ("w:top", "1440"),
        ("w:right", "1440"),
        ("w:bottom", "1440"),
        ("w:left", "1440"),
        ("w:header", "720"),
        ("w:footer", "720"),
        ("w:gutter", "0"),
    ] {
        margins.push_attribute((side, twips));
    }
    writer.write_event(Event::Empty(margins))?;

    writer.write_event(Event::End(BytesEnd::new("w:sectPr")))?;
    Ok(())
}

// ── Static package parts ─────────────────────────────────────────────────

fn core_properties_xml(title: &str) -> Result<Vec<u8>, ExportError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("cp:coreProperties");
    root.push_attribute((
        "xmlns:cp",
        "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
    ));
    root.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
    root.push_attribute(("xmlns:dcterms", "http://purl.org/dc/terms/"));
    root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    writer.write_event(Event::Start(root))?;

    for (name, value) in [("dc:title", xml_safe(title)), ("dc:creator", "handnote2docx".into())] {
        writer.write_event(Event::Start(BytesStart::new(name)))?;
        writer.write_event(Event::Text(BytesText::new(&value)))?;
        writer.write_event(Event::End(BytesEnd::new(name)))?;
    }

    writer.write_event(Event::End(BytesEnd::new("cp:coreProperties")))?;
    Ok(writer.into_inner().into_inner())
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:eastAsia="Calibri" w:cs="Calibri"/><w:sz w:val="22"/><w:szCs w:val="22"/></w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after="120" w:line="264" w:lineRule="auto"/></w:pPr></w:pPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="360" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="36"/><w:szCs w:val="36"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="320" w:after="120"/><w:outlineLvl w:val="1"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/><w:szCs w:val="32"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading3"><w:name w:val="heading 3"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="280" w:after="80"/><w:outlineLvl w:val="2"/></w:pPr><w:rPr><w:b/><w:sz w:val="28"/><w:szCs w:val="28"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading4"><w:name w:val="heading 4"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="80"/><w:outlineLvl w:val="3"/></w:pPr><w:rPr><w:b/><w:i/><w:sz w:val="24"/><w:szCs w:val="24"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading5"><w:name w:val="heading 5"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="220" w:after="60"/><w:outlineLvl w:val="4"/></w:pPr><w:rPr><w:b/><w:sz w:val="22"/><w:szCs w:val="22"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading6"><w:name w:val="heading 6"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="200" w:after="60"/><w:outlineLvl w:val="5"/></w:pPr><w:rPr><w:i/><w:sz w:val="22"/><w:szCs w:val="22"/></w:rPr></w:style></w:styles>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_part(docx: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(docx)).expect("valid zip");
        let mut part = archive.by_name(name).expect("part present");
        let mut s = String::new();
        part.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn package_contains_required_parts() {
        let bytes = DocxExporter::new().export("hello").unwrap();
        let archive = ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "docProps/core.xml",
                "word/_rels/document.xml.rels",
                "word/document.xml",
                "word/styles.xml",
            ]
        );
    }

    #[test]
    fn empty_text_still_yields_a_paragraph() {
        let bytes = DocxExporter::new().export("").unwrap();
        assert!(!bytes.is_empty());
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains("<w:body><w:p></w:p><w:sectPr>"), "got: {doc}");
    }

    const REPORT: &str = "## Results for Page 1\n\n### Transcript\n# 3 apples\nDear Sam,";

    #[test]
    fn default_writes_report_lines_verbatim() {
        let bytes = DocxExporter::new().export(REPORT).unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        for line in ["## Results for Page 1", "### Transcript", "# 3 apples", "Dear Sam,"] {
            assert!(doc.contains(&format!(">{line}</w:t>")), "missing {line:?} in {doc}");
        }
        assert!(!doc.contains("w:pStyle"));
    }

    #[test]
    fn heading_styles_keep_the_marker_text() {
        let bytes = DocxExporter::new()
            .markdown_headings(true)
            .export(REPORT)
            .unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains(r#"<w:pStyle w:val="Heading2"/>"#));
        assert!(doc.contains(r#"<w:pStyle w:val="Heading3"/>"#));
        assert!(doc.contains(r#"<w:pStyle w:val="Heading1"/>"#));
        assert!(doc.contains(">## Results for Page 1</w:t>"));
        assert!(doc.contains(">### Transcript</w:t>"));
        assert!(doc.contains("># 3 apples</w:t>"));
    }

    #[test]
    fn special_characters_are_escaped_and_controls_dropped() {
        let bytes = DocxExporter::new()
            .export("a < b & c > d\u{0007}\tnext")
            .unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains("a &lt; b &amp; c &gt; d</w:t><w:tab/>"));
        assert!(!doc.contains('\u{0007}'));
    }

    #[test]
    fn title_goes_into_core_properties() {
        let bytes = DocxExporter::new().title("Notes & Co").export("x").unwrap();
        let core = read_part(&bytes, "docProps/core.xml");
        assert!(core.contains("<dc:title>Notes &amp; Co</dc:title>"));
    }

    #[test]
    fn heading_style_levels() {
        assert_eq!(heading_style("### Summary", true).as_deref(), Some("Heading3"));
        assert_eq!(heading_style("### Summary", false), None);
        assert_eq!(heading_style("#hashtag", true), None);
        assert_eq!(heading_style("####### seven", true), None);
        assert_eq!(heading_style("##   ", true), None);
    }

    #[test]
    fn content_type_is_docx() {
        assert_eq!(DocxExporter::new().content_type(), DOCX_CONTENT_TYPE);
    }
}
