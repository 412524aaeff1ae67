// DOCX extractor
use anyhow::{anyhow, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use std::io::{Cursor, Read};
use zip::ZipArchive;

pub struct DocxExtractor;

impl DocxExtractor {
    /// Extract the raw text of a DOCX file.
    ///
    /// DOCX files are ZIP archives containing XML files.
    /// The main content is in word/document.xml
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).context("Failed to read DOCX as ZIP")?;

        let mut document_xml = archive
            .by_name("word/document.xml")
            .context("Invalid DOCX file: word/document.xml not found")?;

        let mut xml_content = String::new();
        document_xml
            .read_to_string(&mut xml_content)
            .context("Failed to read word/document.xml")?;

        Self::extract_text_from_xml(&xml_content)
    }

    /// Collects `<w:t>` runs paragraph by paragraph. Tabs and line breaks
    /// inside runs are kept; everything else about styling is dropped.
    fn extract_text_from_xml(xml: &str) -> Result<String> {
        let mut reader = XmlReader::from_str(xml);
        let mut paragraphs: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut in_run = false;
        let mut in_text = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"w:r" => in_run = true,
                    b"w:t" => in_text = true,
                    _ => {}
                },
                Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                    b"w:tab" if in_run => current.push('\t'),
                    b"w:br" | b"w:cr" if in_run => current.push('\n'),
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if in_text {
                        let value = e.unescape().map_err(|err| anyhow!(err))?;
                        current.push_str(&value);
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:r" => in_run = false,
                    b"w:p" => {
                        let paragraph = std::mem::take(&mut current);
                        if !paragraph.trim().is_empty() {
                            paragraphs.push(paragraph);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(err) => return Err(anyhow!("Failed to parse DOCX XML: {}", err)),
                _ => {}
            }
        }

        if !current.trim().is_empty() {
            paragraphs.push(current);
        }

        Ok(paragraphs.join("\n\n"))
    }
}
