//! JSON-lines side channels: per-record faults and per-URL info.

use cctext_core::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use url::{Host, Url};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FaultEntry {
    pub archive: String,
    pub offset: u64,
    /// `(null)` when the record has no target URI.
    pub uri: String,
    pub kind: &'static str,
    pub message: String,
}

impl FaultEntry {
    pub fn new(archive: &str, offset: u64, uri: Option<&str>, err: &Error) -> Self {
        Self {
            archive: archive.to_string(),
            offset,
            uri: uri.unwrap_or("(null)").to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UrlInfo {
    pub url: String,
    #[serde(rename = "declared-languages")]
    pub declared_languages: BTreeSet<String>,
    pub tld: Option<String>,
    pub charset: &'static str,
    pub step: &'static str,
}

/// One JSON object per line; a sink of `None` discards entries.
pub struct JsonLines<W: Write> {
    sink: Option<W>,
    written: u64,
}

impl<W: Write> JsonLines<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Some(sink),
            written: 0,
        }
    }

    pub fn discard() -> Self {
        Self {
            sink: None,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write<T: Serialize>(&mut self, entry: &T) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        serde_json::to_writer(&mut *sink, entry).map_err(std::io::Error::other)?;
        sink.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> Option<W> {
        self.sink
    }
}

/// Last label of the URI's domain (lowercased, IDNA ASCII form). `None` for
/// unparsable URIs and IP hosts.
pub fn tld_of(uri: &str) -> Option<String> {
    let parsed = Url::parse(uri).ok()?;
    let Some(Host::Domain(host)) = parsed.host() else {
        return None;
    };
    let label = host.trim_end_matches('.').rsplit('.').next()?;
    (!label.is_empty()).then(|| label.to_ascii_lowercase())
}
