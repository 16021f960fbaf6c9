//! The per-record driver.
//!
//! Records are pulled one at a time. Non-responses are dropped unread, HTML and
//! XHTML responses go through resolve -> strict decode -> extract, and any
//! other MIME type is skipped. A fault inside one record (panics included) is
//! logged and the run moves on; a fault from the container itself ends the run.

use crate::decode::StrictDecoder;
use crate::record::RecordAdapter;
use crate::report::{tld_of, FaultEntry, JsonLines, UrlInfo};
use crate::resolve::CharsetResolver;
use crate::stats::{Stats, StatsFile};
use cctext_core::{
    CascadeStep, Error, ExtractInput, Extracted, Extractor, MimeType, RawRecord, ResolvedCharset,
    Result,
};
use serde::Serialize;
use std::any::Any;
use std::io::{Seek, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Name reported in fault entries.
    pub archive_name: String,
    pub stats_flush_every: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_name: "-".to_string(),
            stats_flush_every: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub records: u64,
    pub responses: u64,
    pub extracted: u64,
    /// Extracted, but no visible text.
    pub empty: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Where a run writes. Extracted text is required; the rest are optional.
pub struct RunOutputs<'o> {
    pub text: &'o mut dyn Write,
    pub faults: JsonLines<&'o mut dyn Write>,
    pub url_info: JsonLines<&'o mut dyn Write>,
    pub stats_file: Option<StatsFile>,
}

impl<'o> RunOutputs<'o> {
    pub fn text_only(text: &'o mut dyn Write) -> Self {
        Self {
            text,
            faults: JsonLines::discard(),
            url_info: JsonLines::discard(),
            stats_file: None,
        }
    }
}

/// `Some(xhtml)` for the two extractable MIME types.
pub fn html_flavor(mime: &MimeType) -> Option<bool> {
    match (mime.type_(), mime.subtype()) {
        ("text", "html") => Some(false),
        ("application", "xhtml+xml") => Some(true),
        _ => None,
    }
}

struct Processed {
    doc: Extracted,
    /// The charset the payload was decoded with.
    charset: ResolvedCharset,
    step: CascadeStep,
}

pub struct ResponsePipeline<'a> {
    resolver: &'a CharsetResolver,
    extractor: &'a dyn Extractor,
    config: PipelineConfig,
    stats: Stats,
}

impl<'a> ResponsePipeline<'a> {
    pub fn new(
        resolver: &'a CharsetResolver,
        extractor: &'a dyn Extractor,
        config: PipelineConfig,
    ) -> Self {
        Self {
            resolver,
            extractor,
            config,
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn run<I>(&mut self, records: I, outputs: &mut RunOutputs<'_>) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        let mut summary = RunSummary::default();
        for item in records {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    error!(archive = %self.config.archive_name, error = %e, "container fault, stopping");
                    self.finish(outputs)?;
                    return Err(e);
                }
            };
            summary.records += 1;

            let mut record = RecordAdapter::new(raw);
            if !record.is_response() {
                debug!(offset = record.offset(), warc_type = record.warc_type(), "not a response");
                continue;
            }
            summary.responses += 1;

            let result = catch_unwind(AssertUnwindSafe(|| self.process_response(&mut record)))
                .unwrap_or_else(|payload| Err(Error::Panic(panic_message(payload))));

            match result {
                Ok(None) => summary.skipped += 1,
                Ok(Some(p)) if p.doc.text.is_empty() => {
                    self.stats.bump("no-text-count");
                    summary.empty += 1;
                }
                Ok(Some(p)) => {
                    outputs.text.write_all(p.doc.text.as_bytes())?;
                    outputs.text.write_all(b"\n")?;
                    summary.extracted += 1;
                    self.record_url_info(&record, p, &mut outputs.url_info)?;
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        archive = %self.config.archive_name,
                        offset = record.offset(),
                        uri = record.target_uri().unwrap_or("(null)"),
                        kind = e.kind(),
                        "record failed: {e}"
                    );
                    self.stats.bump_value("faults", Some(e.kind()));
                    outputs.faults.write(&FaultEntry::new(
                        &self.config.archive_name,
                        record.offset(),
                        record.target_uri(),
                        &e,
                    ))?;
                }
            }

            if let Some(file) = outputs.stats_file.as_mut() {
                file.maybe_flush(&self.stats)?;
            }
        }

        self.finish(outputs)?;
        info!(
            records = summary.records,
            responses = summary.responses,
            extracted = summary.extracted,
            empty = summary.empty,
            skipped = summary.skipped,
            failed = summary.failed,
            "run complete"
        );
        Ok(summary)
    }

    fn finish(&mut self, outputs: &mut RunOutputs<'_>) -> Result<()> {
        outputs.text.flush()?;
        outputs.faults.flush()?;
        outputs.url_info.flush()?;
        if let Some(file) = outputs.stats_file.as_mut() {
            file.flush(&self.stats)?;
        }
        Ok(())
    }

    /// `Ok(None)` when the MIME type is not extractable.
    fn process_response(&mut self, record: &mut RecordAdapter) -> Result<Option<Processed>> {
        self.stats.bump("total-response-count");
        self.stats.bump_by("total-response-bytes", record.block_len() as u64);
        self.stats.bump_by("total-response-bytes-content", record.payload_len() as u64);

        if !record.has_http_header() {
            debug!(offset = record.offset(), "no HTTP header block, using default MIME type");
            self.stats.bump("no-http-header-count");
        }

        let mime = record.mime_type();
        let declared = record.declared_charset_name();
        self.stats.bump_value("mime-type", Some(mime.essence().as_str()));
        self.stats.bump_value("header-charset", declared.as_deref());

        let Some(xhtml) = html_flavor(&mime) else {
            debug!(offset = record.offset(), mime = %mime, "skipping non-html response");
            return Ok(None);
        };
        self.stats.bump_by("total-html-bytes", record.block_len() as u64);
        self.stats.bump_by("total-html-bytes-content", record.payload_len() as u64);

        let resolution = self.resolver.resolve(record)?;
        self.stats.bump_value("resolved-charset", Some(resolution.charset.name()));
        self.stats.bump_value("charset-step", Some(resolution.step.as_str()));

        let stream = record.payload_stream();
        stream.rewind()?;
        let decoded = StrictDecoder::new(resolution.charset).decode(&mut *stream)?;
        if decoded.unmappable > 0 {
            self.stats.bump_by("unmappable-chars", decoded.unmappable);
        }
        if decoded.charset != resolution.charset {
            debug!(
                offset = record.offset(),
                resolved = resolution.charset.name(),
                bom = decoded.charset.name(),
                "byte-order mark overrides resolved charset"
            );
            self.stats.bump("bom-override-count");
        }

        let doc = self.extractor.extract(&ExtractInput {
            text: &decoded.text,
            xhtml,
            declared_charset: declared.as_deref(),
        })?;
        Ok(Some(Processed {
            doc,
            charset: decoded.charset,
            step: resolution.step,
        }))
    }

    fn record_url_info(
        &mut self,
        record: &RecordAdapter,
        processed: Processed,
        log: &mut JsonLines<&mut dyn Write>,
    ) -> Result<()> {
        let content_language = record.header_value("content-language");
        let tld = record.target_uri().and_then(tld_of);
        self.stats.bump_value("header-language", content_language.as_deref());
        self.stats.bump_value("tld", tld.as_deref());

        let Some(url) = record.target_uri() else {
            return Ok(());
        };
        let mut declared_languages = processed.doc.language_hints;
        if let Some(lang) = content_language.filter(|l| !l.is_empty()) {
            declared_languages.insert(lang.to_ascii_lowercase());
        }
        log.write(&UrlInfo {
            url: url.to_string(),
            declared_languages,
            tld,
            charset: processed.charset.name(),
            step: processed.step.as_str(),
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}
