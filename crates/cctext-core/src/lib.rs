use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::ops::Range;

mod charset;
mod mime;

pub use charset::{DetectionHint, ResolvedCharset};
pub use mime::MimeType;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The container could not produce its next record. Fatal.
    #[error("container format: {0}")]
    Container(String),
    /// Bytes invalid under the chosen charset: the guess was wrong.
    #[error("malformed input for {charset} at byte {offset}")]
    Decode { charset: &'static str, offset: u64 },
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("panic in record path: {0}")]
    Panic(String),
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable snake_case code for logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Container(_) => "container_format",
            Error::Decode { .. } => "decode_malformed",
            Error::Extraction(_) => "extraction",
            Error::Panic(_) => "panic",
            Error::Setup(_) => "setup",
            Error::Io(_) => "io",
        }
    }

    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One archive entry as produced by a container reader.
///
/// `block` holds the full record block. For HTTP records, the first
/// `http_header_len` bytes are the HTTP header block and the rest is payload.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Byte offset of the record in the (decompressed) input.
    pub offset: u64,
    /// Archive-type tag, e.g. `response`, `request`, `revisit`.
    pub warc_type: String,
    pub target_uri: Option<String>,
    pub block: Vec<u8>,
    pub http_header_len: Option<usize>,
}

impl RawRecord {
    pub fn http_header(&self) -> Option<&[u8]> {
        self.http_header_len.map(|n| &self.block[..n.min(self.block.len())])
    }

    pub fn payload_range(&self) -> Range<usize> {
        let start = self.http_header_len.unwrap_or(0).min(self.block.len());
        start..self.block.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.block[self.payload_range()]
    }
}

/// Which cascade step produced a charset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    Header,
    Markup,
    Universal,
    Locale,
    Fallback,
}

impl CascadeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStep::Header => "header",
            CascadeStep::Markup => "markup",
            CascadeStep::Universal => "universal",
            CascadeStep::Locale => "locale",
            CascadeStep::Fallback => "fallback",
        }
    }
}

/// A charset detector in the resolution cascade.
///
/// `view` is a fresh, unconsumed view of the payload bytes. Detectors may read
/// as much of it as they like; the caller never reuses it.
pub trait CharsetDetector {
    fn name(&self) -> &'static str;
    fn probe(&self, view: &mut dyn Read, hint: &DetectionHint) -> Result<Option<ResolvedCharset>>;
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractInput<'a> {
    /// Payload text, already decoded with the resolved charset.
    pub text: &'a str,
    pub xhtml: bool,
    /// Charset name declared by the HTTP header, if any.
    pub declared_charset: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Extracted {
    pub engine: &'static str,
    /// Visible text, one block per line.
    pub text: String,
    /// Language tags found in the document (`<html lang>`, content-language meta).
    pub language_hints: BTreeSet<String>,
}

/// Text extraction engine.
pub trait Extractor {
    fn name(&self) -> &'static str;
    fn extract(&self, input: &ExtractInput<'_>) -> Result<Extracted>;
}
