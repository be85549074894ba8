//! File tier classification for extraction timeouts
//!
//! Classifies PDFs into tiers based on size and complexity so that each
//! extraction gets a timeout proportional to the work it is likely to need.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ExtractionConfig;

/// File processing tier based on size and complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileTier {
    /// Small files (<10MB)
    Fast,
    /// Medium files (10-100MB)
    Medium,
    /// Large files (>=100MB)
    Heavy,
    /// Scanned or encrypted PDFs
    Complex,
}

impl FileTier {
    /// Classify file tier based on size
    pub fn from_size(size_bytes: u64) -> Self {
        const MB: u64 = 1024 * 1024;

        if size_bytes < 10 * MB {
            FileTier::Fast
        } else if size_bytes < 100 * MB {
            FileTier::Medium
        } else {
            FileTier::Heavy
        }
    }

    /// Size tier, upgraded to `Complex` for scanned or encrypted PDFs
    pub fn classify(size_bytes: u64, analysis: &PdfAnalysis) -> Self {
        if analysis.is_encrypted || analysis.is_scanned {
            FileTier::Complex
        } else {
            Self::from_size(size_bytes)
        }
    }
}

impl std::fmt::Display for FileTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileTier::Fast => write!(f, "fast"),
            FileTier::Medium => write!(f, "medium"),
            FileTier::Heavy => write!(f, "heavy"),
            FileTier::Complex => write!(f, "complex"),
        }
    }
}

/// Quick byte-level PDF analysis, no full parse
#[derive(Debug, Clone, Default)]
pub struct PdfAnalysis {
    /// Data starts with a PDF header
    pub is_pdf: bool,
    /// PDF is encrypted
    pub is_encrypted: bool,
    /// Has complex font encoding (ToUnicode CMaps)
    pub has_complex_fonts: bool,
    /// Likely a scanned document (image-based)
    pub is_scanned: bool,
}

impl PdfAnalysis {
    /// Perform quick analysis of PDF data without full parsing
    pub fn analyze(data: &[u8]) -> Self {
        if !data.starts_with(b"%PDF-") {
            return Self::default();
        }

        let is_encrypted = data.windows(8).any(|w| w == b"/Encrypt");
        let has_complex_fonts = data.windows(10).any(|w| w == b"/ToUnicode");

        let image_count = data.windows(6).filter(|w| w == b"/Image").count();

        // BT = Begin Text
        let text_stream_count = data
            .windows(3)
            .filter(|w| w == b"BT " || w == b"BT\n" || w == b"BT\r")
            .count();

        let is_scanned =
            image_count > 0 && (text_stream_count == 0 || image_count > text_stream_count * 3);

        Self {
            is_pdf: true,
            is_encrypted,
            has_complex_fonts,
            is_scanned,
        }
    }
}

/// Timeout for extracting one file
pub fn extraction_timeout(
    size_bytes: u64,
    analysis: &PdfAnalysis,
    config: &ExtractionConfig,
) -> Duration {
    if !config.tiered {
        return Duration::from_secs(config.timeout_secs);
    }

    let tier = FileTier::classify(size_bytes, analysis);

    // Base: 1 second per 100KB, minimum 60s
    let size_timeout = (size_bytes / (100 * 1024)).max(60);

    let multiplier = if analysis.is_scanned {
        3.0
    } else if analysis.has_complex_fonts {
        2.0
    } else if analysis.is_encrypted {
        1.5
    } else {
        1.0
    };

    let cap = config.timeout_for_tier(tier);
    let calculated = Duration::from_secs((size_timeout as f64 * multiplier) as u64);
    calculated.min(cap)
}
