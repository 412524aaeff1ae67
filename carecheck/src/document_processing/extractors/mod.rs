// Extractors for different document formats

pub mod docx;
pub mod pdf;
pub mod txt;
pub mod xlsx;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use txt::TxtExtractor;
pub use xlsx::XlsxExtractor;
