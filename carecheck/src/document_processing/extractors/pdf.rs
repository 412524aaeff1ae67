// PDF extraction module

use anyhow::{Context, Result};
use pdf_extract::extract_text_from_mem_by_pages;

pub struct PdfExtractor;

impl PdfExtractor {
    /// Extract the text of every page, in page order.
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let pages =
            extract_text_from_mem_by_pages(bytes).context("Failed to extract text from PDF")?;

        Ok(Self::join_pages(&pages))
    }

    /// Text runs within a page are joined by single spaces; pages are
    /// separated by a blank line. A page without text still keeps its
    /// separator.
    fn join_pages(pages: &[String]) -> String {
        pages
            .iter()
            .map(|page| page.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
