//! Strategy comparison: what each cascade step would pick for a record, and
//! whether that charset decodes the payload cleanly.

use crate::decode::StrictDecoder;
use crate::pipeline::html_flavor;
use crate::record::RecordAdapter;
use crate::resolve::{best_hint, CharsetResolver};
use cctext_core::{CascadeStep, DetectionHint, RawRecord, ResolvedCharset, Result};
use serde::Serialize;
use std::io::Write;
use tracing::{error, warn};

pub const CSV_HEADER: &str = "offset,header,markup,universal,locale_hinted,resolved,\
header_ok,markup_ok,universal_ok,locale_hinted_ok,resolved_ok";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Ok,
    Malformed,
    /// The strategy produced no charset.
    Missing,
}

impl DecodeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeOutcome::Ok => "ok",
            DecodeOutcome::Malformed => "malformed",
            DecodeOutcome::Missing => "--",
        }
    }
}

/// Columns: header, markup, universal, hinted locale, resolved. The resolved
/// column is the charset decoding actually uses, so a leading BOM shows there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyRow {
    pub offset: u64,
    pub charsets: [Option<ResolvedCharset>; 5],
    pub outcomes: [DecodeOutcome; 5],
}

impl StrategyRow {
    pub fn to_csv(&self) -> String {
        let mut cells = vec![self.offset.to_string()];
        cells.extend(
            self.charsets
                .iter()
                .map(|c| c.map(|c| c.name()).unwrap_or("--").to_string()),
        );
        cells.extend(self.outcomes.iter().map(|o| o.as_str().to_string()));
        cells.join(",")
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnoseSummary {
    pub records: u64,
    pub rows: u64,
    pub failed: u64,
}

pub fn compare_strategies(
    resolver: &CharsetResolver,
    record: &mut RecordAdapter,
) -> Result<StrategyRow> {
    let offset = record.offset();
    let header = record.declared_charset();
    let resolved = resolver.resolve(record)?.charset;
    let stream = &*record.payload_stream();
    let resolved = StrictDecoder::new(resolved).effective_charset(stream.bytes());

    let probe = |step: CascadeStep, hint: &DetectionHint| -> Result<Option<ResolvedCharset>> {
        match resolver.cascade().iter().find(|e| e.step == step) {
            Some(entry) => entry.detector.probe(&mut stream.view(), hint),
            None => Ok(None),
        }
    };
    let empty = resolver.empty_hint();
    let markup = probe(CascadeStep::Markup, empty)?;
    let universal = probe(CascadeStep::Universal, empty)?;
    let hint = best_hint(header, markup);
    let locale = probe(CascadeStep::Locale, hint.as_ref().unwrap_or(empty))?;

    let charsets = [header, markup, universal, locale, Some(resolved)];
    let mut outcomes = [DecodeOutcome::Missing; 5];
    // Each distinct charset is decoded once.
    let mut tried: Vec<(ResolvedCharset, DecodeOutcome)> = Vec::new();
    for (slot, charset) in outcomes.iter_mut().zip(charsets) {
        let Some(cs) = charset else {
            continue;
        };
        if let Some((_, known)) = tried.iter().find(|(c, _)| *c == cs) {
            *slot = *known;
            continue;
        }
        let outcome = match StrictDecoder::new(cs).check(stream.view()) {
            Ok(_) => DecodeOutcome::Ok,
            Err(e) if e.is_malformed_input() => DecodeOutcome::Malformed,
            Err(e) => return Err(e),
        };
        tried.push((cs, outcome));
        *slot = outcome;
    }

    Ok(StrategyRow {
        offset,
        charsets,
        outcomes,
    })
}

/// Writes one CSV row per HTML or XHTML response.
pub fn run_diagnostics<I>(
    resolver: &CharsetResolver,
    records: I,
    out: &mut dyn Write,
) -> Result<DiagnoseSummary>
where
    I: IntoIterator<Item = Result<RawRecord>>,
{
    let mut summary = DiagnoseSummary::default();
    writeln!(out, "{CSV_HEADER}")?;
    for item in records {
        let raw = item.inspect_err(|e| error!(error = %e, "container fault, stopping"))?;
        summary.records += 1;
        let mut record = RecordAdapter::new(raw);
        if !record.is_response() || html_flavor(&record.mime_type()).is_none() {
            continue;
        }
        match compare_strategies(resolver, &mut record) {
            Ok(row) => {
                writeln!(out, "{}", row.to_csv())?;
                summary.rows += 1;
            }
            Err(e) => {
                warn!(offset = record.offset(), kind = e.kind(), "diagnostics failed: {e}");
                summary.failed += 1;
            }
        }
    }
    out.flush()?;
    Ok(summary)
}
