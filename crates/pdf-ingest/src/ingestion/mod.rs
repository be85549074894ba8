//! Text extraction from uploaded files

mod extractor;

pub use extractor::{Extraction, Extractor, PdfExtractor};
