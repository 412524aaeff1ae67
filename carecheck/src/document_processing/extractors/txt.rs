// Plain text extractor

pub struct TxtExtractor;

impl TxtExtractor {
    /// Decode a plain text upload.
    ///
    /// Valid UTF-8 is passed through untouched; invalid sequences are
    /// replaced rather than failing the whole file.
    pub fn extract(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}
