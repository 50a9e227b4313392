//! PDF text extraction and context formatting.
//!
//! Extracted text is wrapped in delimiters naming the source file so it can
//! be injected straight into a prompt. Aggregation over several files never
//! fails as a whole: a file that cannot be read contributes an inline error
//! block instead of its content.

pub mod extractor;
pub mod formatter;

pub use extractor::{
    PdfiumExtractor, TextExtractor, extract_text_from_bytes, extract_text_from_pdf,
};
pub use formatter::{
    Attachment, format_as_context, format_error_block, process_attachments, process_multiple_files,
    process_pdf_file,
};
