use encoding_rs::Encoding;
use std::fmt;

/// Labels that browsers decode as windows-1252 rather than strict ASCII or
/// ISO-8859-1.
const WESTERN_ALIASES: &[&str] = &[
    "ascii",
    "us-ascii",
    "us",
    "646",
    "ansi_x3.4-1968",
    "iso-ir-6",
    "ibm367",
    "cp367",
    "csascii",
    "iso-8859-1",
    "iso8859-1",
    "iso88591",
    "iso_8859-1",
    "iso_8859-1:1987",
    "iso-ir-100",
    "latin1",
    "l1",
    "cp819",
    "ibm819",
    "csisolatin1",
];

/// A charset that was resolved against the registry: canonical identity plus
/// decode capability.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCharset(&'static Encoding);

impl ResolvedCharset {
    /// Registry lookup. `None` for unknown labels and for labels that only
    /// map to the replacement encoding.
    pub fn for_label(label: &str) -> Option<Self> {
        let label = label
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_ascii_lowercase();
        if label.is_empty() {
            return None;
        }
        if WESTERN_ALIASES.contains(&label.as_str()) {
            return Some(Self::windows_1252());
        }
        Encoding::for_label_no_replacement(label.as_bytes()).map(Self)
    }

    pub fn from_encoding(encoding: &'static Encoding) -> Self {
        Self(encoding)
    }

    /// The fixed fallback of the cascade.
    pub fn windows_1252() -> Self {
        Self(encoding_rs::WINDOWS_1252)
    }

    pub fn utf_8() -> Self {
        Self(encoding_rs::UTF_8)
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.0
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// One byte per character; such encodings have no multi-byte structure
    /// that can be malformed.
    pub fn is_single_byte(&self) -> bool {
        self.0.is_single_byte()
    }

    pub fn is_utf16(&self) -> bool {
        self.0 == encoding_rs::UTF_16LE || self.0 == encoding_rs::UTF_16BE
    }
}

impl fmt::Debug for ResolvedCharset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolvedCharset").field(&self.name()).finish()
    }
}

impl fmt::Display for ResolvedCharset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Side-channel metadata for a detector: at most one previously detected
/// charset name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionHint {
    charset: Option<String>,
}

impl DetectionHint {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_charset(name: impl Into<String>) -> Self {
        Self {
            charset: Some(name.into()),
        }
    }

    pub fn charset_name(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.charset.is_none()
    }
}
