//! The charset resolution cascade.
//!
//! Order: header-declared charset, markup detector, universal detector,
//! hinted locale detector, fixed windows-1252 fallback. The first step that
//! yields a supported charset wins. Each detector reads its own fresh view of
//! the buffered payload.

use crate::detect::{LocaleDetector, MarkupDetector, UniversalDetector};
use crate::record::RecordAdapter;
use cctext_core::{CascadeStep, CharsetDetector, DetectionHint, ResolvedCharset, Result};
use tracing::debug;

/// One detector slot in the cascade.
pub struct CascadeEntry {
    pub step: CascadeStep,
    pub detector: Box<dyn CharsetDetector>,
    /// Whether the detector receives the best charset found so far as a hint.
    pub hinted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub charset: ResolvedCharset,
    pub step: CascadeStep,
}

/// The hint handed to hinted detectors: the markup result if any, else the
/// header result.
pub fn best_hint(
    header: Option<ResolvedCharset>,
    markup: Option<ResolvedCharset>,
) -> Option<DetectionHint> {
    markup
        .or(header)
        .map(|cs| DetectionHint::with_charset(cs.name()))
}

pub struct CharsetResolver {
    cascade: Vec<CascadeEntry>,
    empty_hint: DetectionHint,
    fallback: ResolvedCharset,
}

impl CharsetResolver {
    pub fn new(cascade: Vec<CascadeEntry>) -> Self {
        Self {
            cascade,
            empty_hint: DetectionHint::empty(),
            fallback: ResolvedCharset::windows_1252(),
        }
    }

    /// Markup, universal, then hinted locale detection.
    pub fn standard() -> Result<Self> {
        Ok(Self::new(vec![
            CascadeEntry {
                step: CascadeStep::Markup,
                detector: Box::new(MarkupDetector::new()?),
                hinted: false,
            },
            CascadeEntry {
                step: CascadeStep::Universal,
                detector: Box::new(UniversalDetector),
                hinted: false,
            },
            CascadeEntry {
                step: CascadeStep::Locale,
                detector: Box::new(LocaleDetector),
                hinted: true,
            },
        ]))
    }

    pub fn cascade(&self) -> &[CascadeEntry] {
        &self.cascade
    }

    pub fn empty_hint(&self) -> &DetectionHint {
        &self.empty_hint
    }

    pub fn fallback(&self) -> ResolvedCharset {
        self.fallback
    }

    /// Always yields a charset.
    pub fn resolve(&self, record: &mut RecordAdapter) -> Result<Resolution> {
        let header = record.declared_charset();
        if let Some(charset) = header {
            debug!(offset = record.offset(), charset = charset.name(), "charset from header");
            return Ok(Resolution {
                charset,
                step: CascadeStep::Header,
            });
        }

        let offset = record.offset();
        let stream = record.payload_stream();
        let mut markup = None;
        for entry in &self.cascade {
            let hint = if entry.hinted {
                best_hint(header, markup)
            } else {
                None
            };
            let hint = hint.as_ref().unwrap_or(&self.empty_hint);
            let mut view = stream.view();
            let found = entry.detector.probe(&mut view, hint)?;
            debug!(
                offset,
                detector = entry.detector.name(),
                hint = hint.charset_name(),
                charset = found.map(|c| c.name()),
                "cascade step"
            );
            if entry.step == CascadeStep::Markup {
                markup = found;
            }
            if let Some(charset) = found {
                return Ok(Resolution {
                    charset,
                    step: entry.step,
                });
            }
        }

        debug!(offset, charset = self.fallback.name(), "cascade exhausted");
        Ok(Resolution {
            charset: self.fallback,
            step: CascadeStep::Fallback,
        })
    }
}
