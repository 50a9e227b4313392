//! Context blocks for prompt injection.

use std::path::Path;

use tracing::{info, warn};

use super::extractor::{PdfiumExtractor, TextExtractor};
use crate::error::{PdfError, format_error_chain};

/// A file uploaded alongside a chat message
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// Whether the name ends in `.pdf`, case-insensitively
    pub fn is_pdf(&self) -> bool {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
    }
}

/// Wrap extracted text in delimiters naming its source file.
pub fn format_as_context(text: &str, filename: &str) -> String {
    format!(
        "\n\n--- Content of attached file '{}' ---\n{}\n--- End of file ---\n",
        filename, text
    )
}

/// Inline block standing in for a file that could not be read
pub fn format_error_block(name: &str, error: &dyn std::error::Error) -> String {
    format!(
        "\n\nError reading PDF '{}': {}\n",
        name,
        format_error_chain(error)
    )
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract a PDF from disk and format it as a context block.
///
/// `display_name` defaults to the file's base name.
pub fn process_pdf_file(
    path: impl AsRef<Path>,
    display_name: Option<&str>,
) -> Result<String, PdfError> {
    process_pdf_file_with(&PdfiumExtractor, path.as_ref(), display_name)
}

pub fn process_pdf_file_with(
    extractor: &impl TextExtractor,
    path: &Path,
    display_name: Option<&str>,
) -> Result<String, PdfError> {
    let text = extractor.extract_path(path)?;
    let name = display_name
        .map(str::to_string)
        .unwrap_or_else(|| file_name_of(path));
    Ok(format_as_context(&text, &name))
}

/// Concatenate context blocks for every file in order.
///
/// Failing files contribute an inline error block; the call itself never fails.
pub fn process_multiple_files<P: AsRef<Path>>(paths: &[P]) -> String {
    process_multiple_files_with(&PdfiumExtractor, paths)
}

pub fn process_multiple_files_with<P: AsRef<Path>>(
    extractor: &impl TextExtractor,
    paths: &[P],
) -> String {
    let mut combined = String::new();
    for path in paths {
        let path = path.as_ref();
        match process_pdf_file_with(extractor, path, None) {
            Ok(block) => combined.push_str(&block),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to process PDF");
                combined.push_str(&format_error_block(&file_name_of(path), &e));
            }
        }
    }
    combined
}

/// Build the context for a message's uploaded attachments.
///
/// Only names ending in `.pdf` are processed; others are skipped silently.
/// Oversized or unreadable attachments contribute an inline error block.
pub fn process_attachments(attachments: &[Attachment], max_bytes: u64) -> String {
    process_attachments_with(&PdfiumExtractor, attachments, max_bytes)
}

pub fn process_attachments_with(
    extractor: &impl TextExtractor,
    attachments: &[Attachment],
    max_bytes: u64,
) -> String {
    let mut combined = String::new();
    for attachment in attachments.iter().filter(|a| a.is_pdf()) {
        let size = attachment.data.len() as u64;
        let result = if size > max_bytes {
            Err(PdfError::TooLarge {
                size,
                max: max_bytes,
            })
        } else {
            extractor.extract_bytes(&attachment.data, &attachment.name)
        };

        match result {
            Ok(text) => {
                info!(name = %attachment.name, chars = text.len(), "Attachment extracted");
                combined.push_str(&format_as_context(&text, &attachment.name));
            }
            Err(e) => {
                warn!(name = %attachment.name, error = %e, "Failed to process attachment");
                combined.push_str(&format_error_block(&attachment.name, &e));
            }
        }
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Treats file bytes as the page text; `corrupt` bytes are unreadable
    struct StubExtractor;

    impl TextExtractor for StubExtractor {
        fn extract_bytes(&self, bytes: &[u8], source_name: &str) -> Result<String, PdfError> {
            if bytes == b"corrupt" {
                return Err(PdfError::UnreadablePdf {
                    source_name: source_name.to_string(),
                    message: "bad xref table".to_string(),
                });
            }
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    #[test]
    fn test_format_as_context_exact() {
        assert_eq!(
            format_as_context("hello", "a.pdf"),
            "\n\n--- Content of attached file 'a.pdf' ---\nhello\n--- End of file ---\n"
        );
    }

    #[test]
    fn test_format_as_context_empty_text() {
        assert_eq!(
            format_as_context("", "empty.pdf"),
            "\n\n--- Content of attached file 'empty.pdf' ---\n\n--- End of file ---\n"
        );
    }

    #[test]
    fn test_process_pdf_file_display_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload-3f2a.pdf");
        std::fs::write(&path, "quarterly numbers").unwrap();

        let default_name = process_pdf_file_with(&StubExtractor, &path, None).unwrap();
        assert!(default_name.contains("'upload-3f2a.pdf'"));

        let renamed = process_pdf_file_with(&StubExtractor, &path, Some("Report.pdf")).unwrap();
        assert_eq!(renamed, format_as_context("quarterly numbers", "Report.pdf"));
    }

    #[test]
    fn test_multiple_files_with_missing_one() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.pdf");
        std::fs::write(&good, "hello").unwrap();
        let missing = dir.path().join("missing.pdf");

        let combined = process_multiple_files_with(&StubExtractor, &[good, missing.clone()]);

        let expected_good = format_as_context("hello", "good.pdf");
        assert!(combined.starts_with(&expected_good));

        let rest = &combined[expected_good.len()..];
        assert!(rest.starts_with("\n\nError reading PDF 'missing.pdf': PDF file not found:"));
        assert!(rest.contains(&missing.display().to_string()));
        assert!(rest.ends_with('\n'));
    }

    #[test]
    fn test_multiple_files_empty_input() {
        let paths: Vec<std::path::PathBuf> = Vec::new();
        assert_eq!(process_multiple_files_with(&StubExtractor, &paths), "");
    }

    #[test]
    fn test_attachments_skip_non_pdf_and_report_errors() {
        let attachments = vec![
            Attachment {
                name: "notes.txt".to_string(),
                data: b"ignored".to_vec(),
            },
            Attachment {
                name: "Brief.PDF".to_string(),
                data: b"summary".to_vec(),
            },
            Attachment {
                name: "broken.pdf".to_string(),
                data: b"corrupt".to_vec(),
            },
            Attachment {
                name: "huge.pdf".to_string(),
                data: vec![b'x'; 64],
            },
        ];

        let combined = process_attachments_with(&StubExtractor, &attachments, 32);

        assert!(!combined.contains("notes.txt"));
        assert!(combined.starts_with(&format_as_context("summary", "Brief.PDF")));
        assert!(combined.contains(
            "\n\nError reading PDF 'broken.pdf': Failed to read PDF 'broken.pdf': bad xref table\n"
        ));
        assert!(combined.ends_with(
            "\n\nError reading PDF 'huge.pdf': Attachment too large: 64 bytes (max 32 bytes)\n"
        ));
    }
}
