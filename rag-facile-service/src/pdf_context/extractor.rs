//! PDF text extraction backed by PDFium.

use std::path::Path;

use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::PdfError;

/// Source of plain text for a PDF document.
pub trait TextExtractor {
    /// Extract all page text from an in-memory PDF. `source_name` only labels errors.
    fn extract_bytes(&self, bytes: &[u8], source_name: &str) -> Result<String, PdfError>;

    /// Extract all page text from a file on disk.
    fn extract_path(&self, path: &Path) -> Result<String, PdfError> {
        if !path.exists() {
            return Err(PdfError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e))
                .unwrap_or_default();
            return Err(PdfError::NotAPdf { extension });
        }

        let bytes = std::fs::read(path).map_err(PdfError::Io)?;
        self.extract_bytes(&bytes, &path.display().to_string())
    }
}

/// Production extractor. Binds the PDFium library on each call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumExtractor;

impl TextExtractor for PdfiumExtractor {
    fn extract_bytes(&self, bytes: &[u8], source_name: &str) -> Result<String, PdfError> {
        let pdfium = create_pdfium(source_name)?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfError::UnreadablePdf {
                source_name: source_name.to_string(),
                message: format!("{:?}", e),
            })?;

        let mut text_parts = Vec::new();
        for (page_index, page) in document.pages().iter().enumerate() {
            let text = page.text().map_err(|e| {
                warn!(page = page_index + 1, error = ?e, "Failed to get text object for page");
                PdfError::UnreadablePdf {
                    source_name: source_name.to_string(),
                    message: format!("page {}: {:?}", page_index + 1, e),
                }
            })?;

            let page_text = text.all();
            if !page_text.is_empty() {
                text_parts.push(page_text);
            }
        }

        debug!(
            source = %source_name,
            pages = document.pages().len(),
            pages_with_text = text_parts.len(),
            "PDF text extracted"
        );

        Ok(text_parts.join("\n"))
    }
}

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
fn create_pdfium(source_name: &str) -> Result<Pdfium, PdfError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PdfError::UnreadablePdf {
            source_name: source_name.to_string(),
            message: format!("Failed to load PDFium library: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Extract all text from a PDF file, pages separated by newlines.
pub fn extract_text_from_pdf(path: impl AsRef<Path>) -> Result<String, PdfError> {
    PdfiumExtractor.extract_path(path.as_ref())
}

/// Extract all text from in-memory PDF bytes, pages separated by newlines.
pub fn extract_text_from_bytes(bytes: &[u8]) -> Result<String, PdfError> {
    PdfiumExtractor.extract_bytes(bytes, "bytes")
}
