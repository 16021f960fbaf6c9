//! Charset detectors used by the resolution cascade.
//!
//! - [`MarkupDetector`]: byte-order mark, then XML declaration and `<meta>` prescan.
//! - [`UniversalDetector`]: statistical guess over the whole payload; ignores hints.
//! - [`LocaleDetector`]: statistical guess over a bounded prefix, biased toward the
//!   locale of a hinted charset.

use cctext_core::{CharsetDetector, DetectionHint, Error, ResolvedCharset, Result};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use regex::bytes::Regex;
use std::io::Read;

/// How far into the payload markup declarations are looked for.
pub const MARKUP_SCAN_LIMIT: u64 = 8192;
/// Prefix fed to the locale-aware detector.
pub const LOCALE_SCAN_LIMIT: u64 = 8000;

const FEED_CHUNK: usize = 8192;

pub struct MarkupDetector {
    xml_decl: Regex,
    meta_tag: Regex,
    charset_attr: Regex,
}

impl MarkupDetector {
    pub fn new() -> Result<Self> {
        let re = |p: &str| Regex::new(p).map_err(|e| Error::Setup(e.to_string()));
        Ok(Self {
            xml_decl: re(r#"(?i-u)\A\s*<\?xml[^>]*?\bencoding\s*=\s*["']?\s*([a-z0-9._:\-]+)"#)?,
            meta_tag: re(r"(?i-u)<meta\b[^>]*>")?,
            // Matches both `charset=x` and `content="text/html; charset=x"`.
            charset_attr: re(r#"(?i-u)\bcharset\s*=\s*["']?\s*([a-z0-9._:\-]+)"#)?,
        })
    }

    fn declared(&self, head: &[u8]) -> Option<ResolvedCharset> {
        if let Some(label) = self.xml_decl.captures(head).and_then(|c| c.get(1)) {
            if let Some(cs) = markup_label(label.as_bytes()) {
                return Some(cs);
            }
        }
        self.meta_tag
            .find_iter(head)
            .filter_map(|tag| self.charset_attr.captures(tag.as_bytes()))
            .filter_map(|c| c.get(1))
            .find_map(|label| markup_label(label.as_bytes()))
    }
}

/// A label found inside the document. An ASCII-compatible prescan cannot have
/// found a real UTF-16 document, so UTF-16 labels mean UTF-8 here;
/// x-user-defined means windows-1252.
fn markup_label(label: &[u8]) -> Option<ResolvedCharset> {
    let label = std::str::from_utf8(label).ok()?;
    let cs = ResolvedCharset::for_label(label)?;
    if cs.is_utf16() {
        return Some(ResolvedCharset::utf_8());
    }
    if cs.encoding() == encoding_rs::X_USER_DEFINED {
        return Some(ResolvedCharset::windows_1252());
    }
    Some(cs)
}

impl CharsetDetector for MarkupDetector {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn probe(&self, view: &mut dyn Read, _hint: &DetectionHint) -> Result<Option<ResolvedCharset>> {
        let mut head = Vec::new();
        view.take(MARKUP_SCAN_LIMIT).read_to_end(&mut head)?;
        // A BOM beats any declaration in the same document.
        if let Some((encoding, _bom_len)) = Encoding::for_bom(&head) {
            return Ok(Some(ResolvedCharset::from_encoding(encoding)));
        }
        Ok(self.declared(&head))
    }
}

#[derive(Debug, Default)]
pub struct UniversalDetector;

impl CharsetDetector for UniversalDetector {
    fn name(&self) -> &'static str {
        "universal"
    }

    fn probe(&self, view: &mut dyn Read, _hint: &DetectionHint) -> Result<Option<ResolvedCharset>> {
        let mut det = EncodingDetector::new();
        let mut buf = vec![0u8; FEED_CHUNK];
        let mut non_ascii = false;
        loop {
            let n = view.read(&mut buf)?;
            if n == 0 {
                break;
            }
            non_ascii = det.feed(&buf[..n], false);
        }
        non_ascii |= det.feed(&[], true);
        // Pure ASCII gives the statistics nothing to work with.
        if !non_ascii {
            return Ok(None);
        }
        Ok(Some(ResolvedCharset::from_encoding(det.guess(None, true))))
    }
}

#[derive(Debug, Default)]
pub struct LocaleDetector;

/// Top-level domain whose locale prefers the given encoding family.
fn locale_tld(cs: ResolvedCharset) -> Option<&'static [u8]> {
    let tld: &'static [u8] = match cs.name() {
        "windows-1251" | "KOI8-R" | "KOI8-U" | "IBM866" | "ISO-8859-5" | "x-mac-cyrillic" => b"ru",
        "windows-1253" | "ISO-8859-7" => b"gr",
        "Shift_JIS" | "EUC-JP" | "ISO-2022-JP" => b"jp",
        "GBK" | "gb18030" => b"cn",
        "Big5" => b"tw",
        "EUC-KR" => b"kr",
        "windows-874" => b"th",
        "windows-1254" => b"tr",
        "windows-1258" => b"vn",
        "windows-1255" | "ISO-8859-8" | "ISO-8859-8-I" => b"il",
        "windows-1256" | "ISO-8859-6" => b"eg",
        "windows-1257" | "ISO-8859-4" | "ISO-8859-13" => b"lt",
        "windows-1250" | "ISO-8859-2" => b"pl",
        _ => return None,
    };
    Some(tld)
}

impl CharsetDetector for LocaleDetector {
    fn name(&self) -> &'static str {
        "locale"
    }

    fn probe(&self, view: &mut dyn Read, hint: &DetectionHint) -> Result<Option<ResolvedCharset>> {
        let mut prefix = Vec::new();
        view.take(LOCALE_SCAN_LIMIT).read_to_end(&mut prefix)?;
        if prefix.is_empty() {
            return Ok(None);
        }
        let complete = (prefix.len() as u64) < LOCALE_SCAN_LIMIT;

        let tld = hint
            .charset_name()
            .and_then(ResolvedCharset::for_label)
            .and_then(locale_tld);

        let mut det = EncodingDetector::new();
        det.feed(&prefix, complete);
        Ok(Some(ResolvedCharset::from_encoding(det.guess(tld, true))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn markup(bytes: &[u8]) -> Option<&'static str> {
        MarkupDetector::new()
            .unwrap()
            .probe(&mut Cursor::new(bytes), &DetectionHint::empty())
            .unwrap()
            .map(|c| c.name())
    }

    #[test]
    fn markup_detects_meta_charset() {
        assert_eq!(
            markup(b"<html><head><meta charset=\"iso-8859-7\"></head></html>"),
            Some("ISO-8859-7")
        );
        assert_eq!(markup(b"<META CHARSET=koi8-r>"), Some("KOI8-R"));
    }

    #[test]
    fn markup_detects_http_equiv_content() {
        let html = b"<head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=windows-1251\"></head>";
        assert_eq!(markup(html), Some("windows-1251"));
    }

    #[test]
    fn markup_detects_xml_declaration() {
        let xml = b"<?xml version=\"1.0\" encoding=\"Shift_JIS\"?><html/>";
        assert_eq!(markup(xml), Some("Shift_JIS"));
    }

    #[test]
    fn markup_skips_unsupported_labels() {
        let html = b"<meta charset=bogus><meta charset=euc-kr>";
        assert_eq!(markup(html), Some("EUC-KR"));
        assert_eq!(markup(b"<meta charset=bogus>"), None);
    }

    #[test]
    fn markup_maps_utf16_and_latin1_labels() {
        assert_eq!(markup(b"<meta charset=utf-16>"), Some("UTF-8"));
        assert_eq!(markup(b"<meta charset=iso-8859-1>"), Some("windows-1252"));
        assert_eq!(markup(b"<meta charset=x-user-defined>"), Some("windows-1252"));
    }

    #[test]
    fn bom_wins_over_meta() {
        let mut html = vec![0xEF, 0xBB, 0xBF];
        html.extend_from_slice(b"<meta charset=\"windows-1251\">");
        assert_eq!(markup(&html), Some("UTF-8"));
        assert_eq!(markup(&[0xFF, 0xFE, b'<', 0]), Some("UTF-16LE"));
        assert_eq!(markup(&[0xFE, 0xFF, 0, b'<']), Some("UTF-16BE"));
    }

    #[test]
    fn markup_ignores_declarations_past_scan_limit() {
        let mut html = vec![b' '; MARKUP_SCAN_LIMIT as usize];
        html.extend_from_slice(b"<meta charset=euc-kr>");
        assert_eq!(markup(&html), None);
        assert_eq!(markup(b""), None);
    }

    #[test]
    fn universal_reports_nothing_for_ascii() {
        let got = UniversalDetector
            .probe(&mut Cursor::new(&b"plain ascii <p>text</p>"[..]), &DetectionHint::empty())
            .unwrap();
        assert_eq!(got, None);
        let got = UniversalDetector
            .probe(&mut Cursor::new(&b""[..]), &DetectionHint::empty())
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn universal_detects_utf8() {
        let text = "Ελληνικά κείμενα και λίγο ακόμη κείμενο για τη στατιστική.".repeat(4);
        let got = UniversalDetector
            .probe(&mut Cursor::new(text.as_bytes()), &DetectionHint::empty())
            .unwrap();
        assert_eq!(got, Some(ResolvedCharset::utf_8()));
    }

    #[test]
    fn universal_detects_cyrillic_legacy_encoding() {
        let text = "Съешь же ещё этих мягких французских булок, да выпей чаю. ".repeat(8);
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode(&text);
        let got = UniversalDetector
            .probe(&mut Cursor::new(&bytes[..]), &DetectionHint::empty())
            .unwrap();
        assert_eq!(got.map(|c| c.name()), Some("windows-1251"));
    }

    #[test]
    fn locale_reports_nothing_for_empty_payload_only() {
        let got = LocaleDetector
            .probe(&mut Cursor::new(&b""[..]), &DetectionHint::empty())
            .unwrap();
        assert_eq!(got, None);
        let got = LocaleDetector
            .probe(&mut Cursor::new(&b"ascii"[..]), &DetectionHint::empty())
            .unwrap();
        assert!(got.is_some());
    }

    #[test]
    fn locale_hint_maps_to_tld() {
        let greek = ResolvedCharset::for_label("iso-8859-7").unwrap();
        assert_eq!(locale_tld(greek), Some(&b"gr"[..]));
        assert_eq!(locale_tld(ResolvedCharset::utf_8()), None);
    }

    #[test]
    fn locale_guesses_utf8_for_ascii_regardless_of_hint() {
        for hint in [DetectionHint::empty(), DetectionHint::with_charset("windows-1251")] {
            let got = LocaleDetector
                .probe(&mut Cursor::new(&b"just ascii here"[..]), &hint)
                .unwrap();
            assert_eq!(got, Some(ResolvedCharset::utf_8()));
        }
    }

    #[test]
    fn locale_with_cyrillic_hint_detects_cyrillic() {
        let text = "Широкая электрификация южных губерний даст мощный толчок подъёму сельского хозяйства. ".repeat(4);
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode(&text);
        let hint = DetectionHint::with_charset("windows-1251");
        let got = LocaleDetector
            .probe(&mut Cursor::new(&bytes[..]), &hint)
            .unwrap();
        assert_eq!(got.map(|c| c.name()), Some("windows-1251"));
    }
}
