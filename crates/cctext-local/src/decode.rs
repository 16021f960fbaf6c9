//! Strict decoding of a payload under a resolved charset.
//!
//! Malformed input (invalid under a multi-byte or Unicode encoding) is an
//! error: the charset guess was wrong. Unmappable input is replaced with
//! U+FFFD and counted: an unmapped byte of a single-byte encoding, or a
//! well-formed lead/trail pair of a double-byte encoding whose table has no
//! entry for it.
//!
//! A leading byte-order mark overrides the resolved charset, as browsers do:
//! `DecodedText::charset` is the encoding that was actually used.

use cctext_core::{Error, ResolvedCharset, Result};
use encoding_rs::{DecoderResult, Encoding};
use serde::Serialize;
use std::io::{ErrorKind, Read};
use std::ops::RangeInclusive;

const READ_CHUNK: usize = 8192;

type ByteRanges = &'static [RangeInclusive<u8>];

const SHIFT_JIS_LEAD: ByteRanges = &[0x81..=0x9F, 0xE0..=0xFC];
const SHIFT_JIS_TRAIL: ByteRanges = &[0x40..=0x7E, 0x80..=0xFC];
const EUC_JP_LEAD: ByteRanges = &[0xA1..=0xFE];
const EUC_JP_TRAIL: ByteRanges = &[0xA1..=0xFE];
const EUC_KR_LEAD: ByteRanges = &[0x81..=0xFE];
const EUC_KR_TRAIL: ByteRanges = &[0x41..=0xFE];
const GBK_LEAD: ByteRanges = &[0x81..=0xFE];
const GBK_TRAIL: ByteRanges = &[0x40..=0x7E, 0x80..=0xFE];
const BIG5_LEAD: ByteRanges = &[0x81..=0xFE];
const BIG5_TRAIL: ByteRanges = &[0x40..=0x7E, 0xA1..=0xFE];

/// Lead and trail byte ranges of a double-byte encoding's two-byte form.
fn double_byte_ranges(encoding: &'static Encoding) -> Option<(ByteRanges, ByteRanges)> {
    if encoding == encoding_rs::SHIFT_JIS {
        Some((SHIFT_JIS_LEAD, SHIFT_JIS_TRAIL))
    } else if encoding == encoding_rs::EUC_JP {
        Some((EUC_JP_LEAD, EUC_JP_TRAIL))
    } else if encoding == encoding_rs::EUC_KR {
        Some((EUC_KR_LEAD, EUC_KR_TRAIL))
    } else if encoding == encoding_rs::GBK || encoding == encoding_rs::GB18030 {
        Some((GBK_LEAD, GBK_TRAIL))
    } else if encoding == encoding_rs::BIG5 {
        Some((BIG5_LEAD, BIG5_TRAIL))
    } else {
        None
    }
}

/// Whether a rejected sequence is a well-formed but unmapped two-byte pair.
///
/// When the trail is ASCII the decoder rejects only the lead and leaves the
/// trail unread, so `next` (the first unread byte) stands in for it.
fn is_unmapped_pair(encoding: &'static Encoding, bad: &[u8], next: Option<u8>) -> bool {
    let Some((leads, trails)) = double_byte_ranges(encoding) else {
        return false;
    };
    let (lead, trail) = match *bad {
        [lead, trail] => (lead, trail),
        [lead] => match next {
            Some(trail) if trail.is_ascii() => (lead, trail),
            _ => return false,
        },
        _ => return false,
    };
    leads.iter().any(|r| r.contains(&lead)) && trails.iter().any(|r| r.contains(&trail))
}

/// Keeps the last few consumed bytes so a rejected sequence that straddles
/// reads can still be inspected.
fn remember(recent: &mut Vec<u8>, consumed: &[u8]) {
    const KEEP: usize = 4;
    recent.extend_from_slice(&consumed[consumed.len().saturating_sub(KEEP)..]);
    let excess = recent.len().saturating_sub(KEEP);
    recent.drain(..excess);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub unmappable: u64,
    pub charset: ResolvedCharset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodeCheck {
    pub chars: u64,
    pub unmappable: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct StrictDecoder {
    charset: ResolvedCharset,
}

impl StrictDecoder {
    pub fn new(charset: ResolvedCharset) -> Self {
        Self { charset }
    }

    pub fn charset(&self) -> ResolvedCharset {
        self.charset
    }

    /// The charset decoding will actually use: a leading BOM wins.
    pub fn effective_charset(&self, head: &[u8]) -> ResolvedCharset {
        match Encoding::for_bom(head) {
            Some((encoding, _)) => ResolvedCharset::from_encoding(encoding),
            None => self.charset,
        }
    }

    pub fn decode<R: Read>(&self, reader: R) -> Result<DecodedText> {
        let mut text = String::new();
        let (unmappable, charset) = self.drive(reader, |s| text.push_str(s))?;
        Ok(DecodedText {
            text,
            unmappable,
            charset,
        })
    }

    /// Decodes into a counting sink.
    pub fn check<R: Read>(&self, reader: R) -> Result<DecodeCheck> {
        let mut chars = 0u64;
        let (unmappable, _) = self.drive(reader, |s| chars += s.chars().count() as u64)?;
        Ok(DecodeCheck { chars, unmappable })
    }

    fn drive<R: Read>(
        &self,
        mut reader: R,
        mut sink: impl FnMut(&str),
    ) -> Result<(u64, ResolvedCharset)> {
        // BOM sniffing: a UTF-8 or UTF-16 BOM switches the encoding and is swallowed.
        let mut decoder = self.charset.encoding().new_decoder();
        let mut input = vec![0u8; READ_CHUNK];
        let mut out = String::new();
        let mut consumed = 0u64;
        let mut unmappable = 0u64;
        let mut recent = Vec::with_capacity(8);

        loop {
            let n = match reader.read(&mut input) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let last = n == 0;
            let mut src = &input[..n];

            loop {
                out.clear();
                let need = decoder
                    .max_utf8_buffer_length_without_replacement(src.len())
                    .unwrap_or(READ_CHUNK * 4);
                out.reserve(need.max(4));
                let (result, read) =
                    decoder.decode_to_string_without_replacement(src, &mut out, last);
                consumed += read as u64;
                remember(&mut recent, &src[..read]);
                src = &src[read..];
                sink(&out);
                match result {
                    DecoderResult::InputEmpty => break,
                    DecoderResult::OutputFull => continue,
                    DecoderResult::Malformed(bad, after) => {
                        let effective = ResolvedCharset::from_encoding(decoder.encoding());
                        let end = recent.len().saturating_sub(usize::from(after));
                        let bad_bytes = &recent[end.saturating_sub(usize::from(bad))..end];
                        if effective.is_single_byte()
                            || is_unmapped_pair(decoder.encoding(), bad_bytes, src.first().copied())
                        {
                            unmappable += 1;
                            sink("\u{FFFD}");
                            continue;
                        }
                        // The bad sequence may have started in an earlier chunk.
                        let offset = consumed.saturating_sub(u64::from(bad) + u64::from(after));
                        return Err(Error::Decode {
                            charset: effective.name(),
                            offset,
                        });
                    }
                }
            }

            if last {
                return Ok((
                    unmappable,
                    ResolvedCharset::from_encoding(decoder.encoding()),
                ));
            }
        }
    }
}
