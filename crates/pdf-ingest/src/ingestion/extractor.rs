//! PDF text extraction

use async_trait::async_trait;
use lopdf::Object;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::error::{Error, Result};
use crate::processing::PdfAnalysis;

/// Text, page count and metadata pulled out of one file
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub page_count: u32,
    pub metadata: BTreeMap<String, String>,
}

/// Turns a file on disk into text.
///
/// Called again for the same file after a crash mid-extraction, so
/// implementations must not have side effects beyond reading the file.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract text and metadata from the file at `path`
    async fn extract(&self, path: &Path) -> Result<Extraction>;

    /// Get extractor name for logging
    fn name(&self) -> &str;
}

/// Info dictionary keys copied into task metadata
const INFO_KEYS: &[(&[u8], &str)] = &[
    (b"Title", "title"),
    (b"Author", "author"),
    (b"Subject", "subject"),
    (b"Creator", "creator"),
    (b"Producer", "producer"),
    (b"CreationDate", "creation_date"),
    (b"ModDate", "mod_date"),
];

/// PDF extractor: `pdf-extract` first, `lopdf` as fallback
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous extraction from bytes. Runs on a blocking thread.
    pub fn extract_bytes(filename: &str, data: &[u8]) -> Result<Extraction> {
        let analysis = PdfAnalysis::analyze(data);
        if !analysis.is_pdf {
            return Err(Error::extraction(filename, "not a PDF file (missing %PDF- header)"));
        }

        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::extraction(filename, format!("Failed to load PDF: {}", e)))?;
        let page_count = (doc.get_pages().len() as u32).max(1);

        let text = match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data))) {
            Ok(Ok(text)) if !cleanup_pdf_text(&text).is_empty() => text,
            Ok(Ok(_)) => {
                tracing::debug!("[{}] pdf-extract returned no text, trying lopdf", filename);
                Self::extract_with_lopdf(&doc)
            }
            Ok(Err(e)) => {
                tracing::warn!("[{}] pdf-extract failed: {}, trying lopdf", filename, e);
                Self::extract_with_lopdf(&doc)
            }
            Err(_) => {
                tracing::warn!("[{}] pdf-extract panicked, trying lopdf", filename);
                Self::extract_with_lopdf(&doc)
            }
        };

        let text = cleanup_pdf_text(&text);
        if text.is_empty() {
            return Err(Error::extraction(
                filename,
                "PDF appears to be image-based or has no extractable text",
            ));
        }

        let mut metadata = info_metadata(&doc);
        metadata.insert("pdf_version".to_string(), doc.version.clone());
        if analysis.is_encrypted {
            metadata.insert("encrypted".to_string(), "true".to_string());
        }
        if analysis.is_scanned {
            metadata.insert("likely_scanned".to_string(), "true".to_string());
        }

        Ok(Extraction {
            text,
            page_count,
            metadata,
        })
    }

    fn extract_with_lopdf(doc: &lopdf::Document) -> String {
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        match doc.extract_text(&pages) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("lopdf text extraction failed: {}", e);
                String::new()
            }
        }
    }
}

#[async_trait]
impl Extractor for PdfExtractor {
    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::extraction(&filename, format!("Failed to read file: {}", e)))?;

        let name = filename.clone();
        tokio::task::spawn_blocking(move || Self::extract_bytes(&name, &data))
            .await
            .map_err(|e| Error::extraction(&filename, format!("Extraction thread failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

/// Document information dictionary entries
fn info_metadata(doc: &lopdf::Document) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok(),
        Ok(object) => Some(object),
        Err(_) => None,
    };
    let Some(dict) = info.and_then(|o| o.as_dict().ok()) else {
        return metadata;
    };

    for (key, label) in INFO_KEYS {
        if let Ok(Object::String(bytes, _)) = dict.get(key) {
            let value = decode_pdf_string(bytes);
            let value = value.trim();
            if !value.is_empty() {
                metadata.insert(label.to_string(), value.to_string());
            }
        }
    }

    metadata
}

/// PDF text strings are UTF-16BE with a BOM or PDFDocEncoding (Latin-1 close enough)
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Normalize typographic characters and whitespace from PDF text
fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2010}', '\u{2011}', '\u{2212}'], "-")
        .replace('\u{00A0}', " ")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_pdf;

    #[test]
    fn test_cleanup() {
        let raw = "  \u{FB01}rst line \n\n\0second \u{201C}quoted\u{201D}\n   ";
        assert_eq!(cleanup_pdf_text(raw), "first line\nsecond \"quoted\"");
    }

    #[test]
    fn test_decode_utf16_string() {
        let bytes = [0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_pdf_string(&bytes), "Hi");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
    }

    #[test]
    fn test_rejects_non_pdf() {
        let err = PdfExtractor::extract_bytes("notes.pdf", b"just some text").unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn test_extracts_generated_pdf() {
        let data = sample_pdf(&["Hello from page one", "Hello from page two"]);
        let extraction = PdfExtractor::extract_bytes("report.pdf", &data).unwrap();

        assert_eq!(extraction.page_count, 2);
        assert!(extraction.text.contains("Hello"));
        assert_eq!(extraction.metadata.get("title").map(String::as_str), Some("Sample Report"));
        assert_eq!(extraction.metadata.get("pdf_version").map(String::as_str), Some("1.5"));
    }

    #[tokio::test]
    async fn test_extract_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.pdf");
        std::fs::write(&path, sample_pdf(&["Hello disk"])).unwrap();

        let extraction = PdfExtractor::new().extract(&path).await.unwrap();
        assert_eq!(extraction.page_count, 1);

        let missing = PdfExtractor::new().extract(&dir.path().join("missing.pdf")).await;
        assert!(matches!(missing, Err(Error::Extraction { .. })));
    }
}
