use cctext_core::{MimeType, RawRecord, ResolvedCharset};
use std::io::{self, BufRead, Cursor, Read, Seek, SeekFrom};

/// An independent, unconsumed view over a buffered payload.
pub type PayloadView<'a> = Cursor<&'a [u8]>;

/// A record's payload, buffered once. The stream itself is rewindable, and
/// [`PayloadStream::view`] hands out fresh views that never disturb it.
#[derive(Debug)]
pub struct PayloadStream {
    cursor: Cursor<Vec<u8>>,
}

impl PayloadStream {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fresh view positioned at the start of the payload.
    pub fn view(&self) -> PayloadView<'_> {
        Cursor::new(self.cursor.get_ref().as_slice())
    }
}

impl Read for PayloadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl BufRead for PayloadStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.cursor.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.cursor.consume(amt)
    }
}

impl Seek for PayloadStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

/// Wraps one raw archive record.
#[derive(Debug)]
pub struct RecordAdapter {
    record: RawRecord,
    // Assigned once, on first access.
    payload: Option<PayloadStream>,
}

impl RecordAdapter {
    pub fn new(record: RawRecord) -> Self {
        Self {
            record,
            payload: None,
        }
    }

    pub fn offset(&self) -> u64 {
        self.record.offset
    }

    pub fn warc_type(&self) -> &str {
        &self.record.warc_type
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.record.target_uri.as_deref()
    }

    pub fn is_response(&self) -> bool {
        self.record.warc_type == "response"
    }

    pub fn payload_len(&self) -> usize {
        self.record.payload_range().len()
    }

    pub fn block_len(&self) -> usize {
        self.record.block.len()
    }

    pub fn has_http_header(&self) -> bool {
        self.record.http_header().is_some()
    }

    /// First value of an HTTP header field (case-insensitive name).
    pub fn header_value(&self, name: &str) -> Option<String> {
        let block = self.record.http_header()?;
        let text = String::from_utf8_lossy(block);
        // Skip the status line.
        text.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    }

    /// Parsed `Content-Type`, or `application/octet-stream` when the header
    /// block or field is missing or unparsable.
    pub fn mime_type(&self) -> MimeType {
        self.header_value("content-type")
            .and_then(|v| MimeType::parse(&v))
            .unwrap_or_else(MimeType::octet_stream)
    }

    pub fn declared_charset_name(&self) -> Option<String> {
        self.mime_type().charset().map(str::to_string)
    }

    /// The declared charset, if named and supported by the registry.
    pub fn declared_charset(&self) -> Option<ResolvedCharset> {
        self.declared_charset_name()
            .and_then(|name| ResolvedCharset::for_label(&name))
    }

    /// The record's single payload stream, created on first call.
    pub fn payload_stream(&mut self) -> &mut PayloadStream {
        let record = &self.record;
        self.payload
            .get_or_insert_with(|| PayloadStream::new(record.payload().to_vec()))
    }
}
