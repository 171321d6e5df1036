//! Plain-text extraction from uploaded files, chosen by file extension.
//!
//! | Extension | Method |
//! |-----------|--------|
//! | `.txt`, `.md` | UTF-8, invalid sequences replaced |
//! | `.pdf` | `pdf-extract` |
//! | `.docx` | `word/document.xml` runs (`w:t`), one line per paragraph |
//!
//! Extraction never panics on malformed input; it returns an
//! [`ExtractError`] and the upload is rejected.

use std::io::Read;
use thiserror::Error;

use quick_xml::events::Event;
use rag_assistant_core::validate::extension_of;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no text extractor for {0}")]
    UnsupportedExtension(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Extract text from `bytes` according to `filename`'s extension.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let extension = extension_of(filename).unwrap_or_default();
    match extension.as_str() {
        ".txt" | ".md" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ".pdf" => extract_pdf(bytes),
        ".docx" => extract_docx(bytes),
        _ => Err(ExtractError::UnsupportedExtension(filename.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn docx_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Docx(e.to_string())
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name).map_err(docx_err)?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(docx_err)?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(docx_err)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    paragraphs_from_document_xml(&xml)
}

/// Concatenate `w:t` runs, ending each `w:p` paragraph with a newline.
fn paragraphs_from_document_xml(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().map_err(docx_err)?.as_ref());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(docx_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        zip.write_all(document_xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_plain_text_and_markdown() {
        assert_eq!(extract_text("a.txt", b"hello").unwrap(), "hello");
        assert_eq!(extract_text("README.MD", b"# Title").unwrap(), "# Title");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let text = extract_text("a.txt", &[b'o', b'k', 0xff]).unwrap();
        assert!(text.starts_with("ok"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = extract_text("image.png", b"...").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedExtension(_)));
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = extract_text("report.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_invalid_zip_returns_error_for_docx() {
        let err = extract_text("memo.docx", b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn test_docx_paragraphs_and_runs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>world &amp; friends.</w:t></w:r></w:p>
    <w:p><w:r><w:t>Second paragraph.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = extract_text("memo.docx", &docx_with(xml)).unwrap();
        assert_eq!(text, "Hello world & friends.\nSecond paragraph.");
    }

    #[test]
    fn test_docx_without_document_xml() {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<x/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(
            extract_text("memo.docx", &bytes).unwrap_err(),
            ExtractError::Docx(_)
        ));
    }
}
