// Document Processing Module
//
// Turns uploaded documents into plain text for the prompt builder.
//
// Main components:
// - extractors: per-format decoders (plain text, PDF, DOCX, XLSX)
// - utils: path expansion for the CLI
//
// Dispatch picks a decoder from the declared media type when it is one we
// recognise, otherwise from the file-name extension. Formats we cannot read
// produce a placeholder note instead of an error.

pub mod extractors;
pub mod utils;

pub use extractors::{DocxExtractor, PdfExtractor, TxtExtractor, XlsxExtractor};
pub use utils::{collect_files, read_source_file};

use crate::UploadedFile;
use std::path::Path;
use tracing::{debug, warn};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A file as it arrives from the user: raw bytes plus whatever type
/// information came with it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, media_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Pdf,
    Docx,
    Xlsx,
    Unsupported,
}

impl DocumentKind {
    /// Media type first, file extension as the fallback.
    pub fn detect(media_type: Option<&str>, file_name: &str) -> DocumentKind {
        media_type
            .and_then(Self::from_media_type)
            .unwrap_or_else(|| Self::from_file_name(file_name))
    }

    fn from_media_type(media_type: &str) -> Option<DocumentKind> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            MIME_PDF => Some(DocumentKind::Pdf),
            MIME_TEXT => Some(DocumentKind::PlainText),
            MIME_DOCX => Some(DocumentKind::Docx),
            MIME_XLSX => Some(DocumentKind::Xlsx),
            _ => None,
        }
    }

    fn from_file_name(file_name: &str) -> DocumentKind {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => DocumentKind::Pdf,
            "txt" => DocumentKind::PlainText,
            "docx" => DocumentKind::Docx,
            "xlsx" => DocumentKind::Xlsx,
            _ => DocumentKind::Unsupported,
        }
    }
}

/// A single file could not be decoded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to extract text from '{name}': {reason}")]
pub struct ExtractionError {
    pub name: String,
    pub reason: String,
}

/// One or more files of a batch failed; the whole batch is rejected.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} of {total} files could not be read: {}", failures.len(), failed_names(failures))]
pub struct ReadAggregationError {
    pub total: usize,
    pub failures: Vec<ExtractionError>,
}

fn failed_names(failures: &[ExtractionError]) -> String {
    failures
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Note used in place of content for formats we do not decode.
pub fn unsupported_placeholder(file_name: &str) -> String {
    format!("[{file_name}] 파일은 내용을 분석할 수 없는 형식입니다. 파일 제출 사실만 확인됩니다.")
}

/// Extracts the plain text of one file.
pub fn extract_text(file: &SourceFile) -> Result<String, ExtractionError> {
    let kind = DocumentKind::detect(file.media_type.as_deref(), &file.name);
    debug!(name = %file.name, ?kind, bytes = file.bytes.len(), "extracting document text");

    let result = match kind {
        DocumentKind::PlainText => Ok(TxtExtractor::extract(&file.bytes)),
        DocumentKind::Pdf => PdfExtractor::extract(&file.bytes),
        DocumentKind::Docx => DocxExtractor::extract(&file.bytes),
        DocumentKind::Xlsx => XlsxExtractor::extract(&file.bytes),
        DocumentKind::Unsupported => {
            debug!(name = %file.name, "unsupported format, using placeholder");
            Ok(unsupported_placeholder(&file.name))
        }
    };

    result.map_err(|err| ExtractionError {
        name: file.name.clone(),
        reason: format!("{err:#}"),
    })
}

/// Extracts one file into an [`UploadedFile`].
pub fn extract_file(file: &SourceFile) -> Result<UploadedFile, ExtractionError> {
    let content = extract_text(file)?;
    Ok(UploadedFile::new(file.name.clone(), content))
}

/// Extracts every file, or reports all failures at once.
pub fn extract_batch(files: &[SourceFile]) -> Result<Vec<UploadedFile>, ReadAggregationError> {
    let mut extracted = Vec::with_capacity(files.len());
    let mut failures = Vec::new();

    for file in files {
        match extract_file(file) {
            Ok(uploaded) => extracted.push(uploaded),
            Err(err) => {
                warn!(name = %err.name, reason = %err.reason, "extraction failed");
                failures.push(err);
            }
        }
    }

    if failures.is_empty() {
        Ok(extracted)
    } else {
        Err(ReadAggregationError {
            total: files.len(),
            failures,
        })
    }
}
