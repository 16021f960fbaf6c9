//! Minimal WARC/1.x record framing.
//!
//! Input may be plain or gzip-compressed (one member per record or one for the
//! whole file). Offsets count bytes of the decompressed stream.

use cctext_core::{Error, RawRecord, Result};
use flate2::bufread::MultiGzDecoder;
use std::io::{BufRead, BufReader, Read};

pub const DEFAULT_BUFFER_SIZE: usize = 65536;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub struct WarcReader<'a> {
    input: Box<dyn BufRead + 'a>,
    offset: u64,
    finished: bool,
}

impl<'a> WarcReader<'a> {
    /// Wrap a byte stream. Gzip input is detected by its magic bytes.
    pub fn new<R: Read + 'a>(reader: R, buffer_size: usize) -> Result<Self> {
        let buffer_size = buffer_size.max(4096);
        let mut buffered = BufReader::with_capacity(buffer_size, reader);
        let gz = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
        let input: Box<dyn BufRead + 'a> = if gz {
            Box::new(BufReader::with_capacity(
                buffer_size,
                MultiGzDecoder::new(buffered),
            ))
        } else {
            Box::new(buffered)
        };
        Ok(Self {
            input,
            offset: 0,
            finished: false,
        })
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.clear();
        let n = self
            .input
            .read_until(b'\n', buf)
            .map_err(|e| Error::Container(format!("read failed at byte {}: {e}", self.offset)))?;
        self.offset += n as u64;
        Ok(n)
    }

    /// Next record, or `None` at a clean end of input.
    pub fn next_record(&mut self) -> Result<Option<RawRecord>> {
        let mut line = Vec::new();

        // Records are separated by blank lines; skip them.
        let start = loop {
            let at = self.offset;
            if self.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if !trim_eol(&line).is_empty() {
                break at;
            }
        };

        if !line.starts_with(b"WARC/") {
            return Err(Error::Container(format!(
                "expected WARC version line at byte {start}"
            )));
        }

        let mut fields: Vec<(String, String)> = Vec::new();
        loop {
            if self.read_line(&mut line)? == 0 {
                return Err(Error::Container(format!(
                    "truncated header in record at byte {start}"
                )));
            }
            let l = trim_eol(&line);
            if l.is_empty() {
                break;
            }
            let text = String::from_utf8_lossy(l);
            if text.starts_with(' ') || text.starts_with('\t') {
                if let Some((_, v)) = fields.last_mut() {
                    v.push(' ');
                    v.push_str(text.trim());
                }
                continue;
            }
            let Some((k, v)) = text.split_once(':') else {
                return Err(Error::Container(format!(
                    "malformed header line in record at byte {start}"
                )));
            };
            fields.push((k.trim().to_ascii_lowercase(), v.trim().to_string()));
        }

        let field = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        let len: u64 = field("content-length")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                Error::Container(format!(
                    "missing or invalid Content-Length in record at byte {start}"
                ))
            })?;

        let mut block = Vec::with_capacity(len.min(1 << 24) as usize);
        let got = (&mut self.input)
            .take(len)
            .read_to_end(&mut block)
            .map_err(|e| Error::Container(format!("read failed in record at byte {start}: {e}")))?;
        self.offset += got as u64;
        if (got as u64) < len {
            return Err(Error::Container(format!(
                "truncated block in record at byte {start}: expected {len} bytes, got {got}"
            )));
        }

        let is_http = field("content-type")
            .map(|ct| ct.to_ascii_lowercase().starts_with("application/http"))
            .unwrap_or(false);
        let http_header_len = if is_http {
            http_header_len(&block)
        } else {
            None
        };

        Ok(Some(RawRecord {
            offset: start,
            warc_type: field("warc-type").unwrap_or_default().to_string(),
            target_uri: field("warc-target-uri").map(|s| {
                s.trim_start_matches('<').trim_end_matches('>').to_string()
            }),
            block,
            http_header_len,
        }))
    }
}

impl Iterator for WarcReader<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(r)) => Some(Ok(r)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Length of the HTTP header block including its terminating blank line.
fn http_header_len(block: &[u8]) -> Option<usize> {
    let crlf = block.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = block.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
