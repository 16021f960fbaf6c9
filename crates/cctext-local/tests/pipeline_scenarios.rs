use cctext_core::{Error, ExtractInput, Extracted, Extractor, RawRecord, Result};
use cctext_local::report::JsonLines;
use cctext_local::{
    BlockExtractor, CharsetResolver, PipelineConfig, ResponsePipeline, RunOutputs, RunSummary,
    StatsFile, WarcReader, DEFAULT_BUFFER_SIZE,
};
use std::cell::RefCell;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    text: String,
    xhtml: bool,
    declared_charset: Option<String>,
}

/// Records every call. Fails on `FAIL`, panics on `PANIC`, returns nothing on `EMPTY`.
#[derive(Default)]
struct Recorder {
    calls: RefCell<Vec<Call>>,
}

impl Extractor for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn extract(&self, input: &ExtractInput<'_>) -> Result<Extracted> {
        self.calls.borrow_mut().push(Call {
            text: input.text.to_string(),
            xhtml: input.xhtml,
            declared_charset: input.declared_charset.map(str::to_string),
        });
        if input.text.contains("PANIC") {
            panic!("extractor blew up");
        }
        if input.text.contains("FAIL") {
            return Err(Error::Extraction("refused".into()));
        }
        let text = if input.text.contains("EMPTY") {
            String::new()
        } else {
            format!("{}\n", input.text)
        };
        Ok(Extracted {
            engine: "recorder",
            text,
            language_hints: Default::default(),
        })
    }
}

fn http_record(offset: u64, warc_type: &str, content_type: Option<&str>, payload: &[u8]) -> RawRecord {
    let mut block = b"HTTP/1.1 200 OK\r\n".to_vec();
    if let Some(ct) = content_type {
        block.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
    }
    block.extend_from_slice(b"\r\n");
    let header_len = block.len();
    block.extend_from_slice(payload);
    RawRecord {
        offset,
        warc_type: warc_type.to_string(),
        target_uri: Some(format!("http://example.com/{offset}")),
        block,
        http_header_len: Some(header_len),
    }
}

struct Run {
    summary: Result<RunSummary>,
    text: String,
    faults: Vec<serde_json::Value>,
}

fn run_with(extractor: &dyn Extractor, records: Vec<Result<RawRecord>>) -> Run {
    let resolver = CharsetResolver::standard().unwrap();
    let config = PipelineConfig {
        archive_name: "test.warc".to_string(),
        stats_flush_every: None,
    };
    let mut text = Vec::new();
    let mut faults = Vec::new();
    let summary = {
        let mut outputs = RunOutputs {
            text: &mut text,
            faults: JsonLines::new(&mut faults as &mut dyn Write),
            url_info: JsonLines::discard(),
            stats_file: None,
        };
        ResponsePipeline::new(&resolver, extractor, config).run(records, &mut outputs)
    };
    Run {
        summary,
        text: String::from_utf8(text).unwrap(),
        faults: String::from_utf8(faults)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
    }
}

#[test]
fn html_pdf_and_revisit_are_dispatched_by_type() {
    let rec = Recorder::default();
    let run = run_with(
        &rec,
        vec![
            Ok(http_record(1, "response", Some("text/html; charset=utf-8"), b"<p>hi</p>")),
            Ok(http_record(2, "response", Some("application/pdf"), b"%PDF-1.4")),
            Ok(http_record(3, "revisit", Some("text/html"), b"<p>again</p>")),
        ],
    );
    let summary = run.summary.unwrap();
    assert_eq!(
        summary,
        RunSummary {
            records: 3,
            responses: 2,
            extracted: 1,
            empty: 0,
            skipped: 1,
            failed: 0,
        }
    );
    assert_eq!(
        *rec.calls.borrow(),
        vec![Call {
            text: "<p>hi</p>".to_string(),
            xhtml: false,
            declared_charset: Some("utf-8".to_string()),
        }]
    );
    assert_eq!(run.text, "<p>hi</p>\n\n");
}

#[test]
fn xhtml_is_extracted_as_xml() {
    let rec = Recorder::default();
    run_with(
        &rec,
        vec![Ok(http_record(1, "response", Some("application/xhtml+xml"), b"<p/>"))],
    )
    .summary
    .unwrap();
    let calls = rec.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].xhtml);
    assert_eq!(calls[0].declared_charset, None);
}

#[test]
fn text_plain_never_reaches_extraction() {
    let rec = Recorder::default();
    let run = run_with(
        &rec,
        vec![Ok(http_record(1, "response", Some("text/plain; charset=utf-8"), b"plain"))],
    );
    assert_eq!(run.summary.unwrap().skipped, 1);
    assert!(rec.calls.borrow().is_empty());
    assert_eq!(run.text, "");
}

#[test]
fn faults_in_one_record_do_not_stop_the_next() {
    let rec = Recorder::default();
    let run = run_with(
        &rec,
        vec![
            Ok(http_record(10, "response", Some("text/html"), b"FAIL")),
            Ok(http_record(20, "response", Some("text/html"), b"PANIC")),
            Ok(http_record(30, "revisit", None, b"")),
            Ok(http_record(40, "response", Some("text/html"), b"survivor")),
        ],
    );
    let summary = run.summary.unwrap();
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.extracted, 1);
    assert_eq!(run.text, "survivor\n\n");

    assert_eq!(run.faults.len(), 2);
    assert_eq!(run.faults[0]["archive"], "test.warc");
    assert_eq!(run.faults[0]["offset"], 10);
    assert_eq!(run.faults[0]["uri"], "http://example.com/10");
    assert_eq!(run.faults[0]["kind"], "extraction");
    assert_eq!(run.faults[1]["offset"], 20);
    assert_eq!(run.faults[1]["kind"], "panic");
    assert!(run.faults[1]["message"]
        .as_str()
        .unwrap()
        .contains("extractor blew up"));
}

#[test]
fn malformed_payload_is_a_decode_fault() {
    let rec = Recorder::default();
    let run = run_with(
        &rec,
        vec![Ok(http_record(
            5,
            "response",
            Some("text/html; charset=utf-8"),
            b"<p>\xff</p>",
        ))],
    );
    assert_eq!(run.summary.unwrap().failed, 1);
    assert!(rec.calls.borrow().is_empty());
    assert_eq!(run.faults[0]["kind"], "decode_malformed");
    assert_eq!(run.faults[0]["message"], "malformed input for UTF-8 at byte 3");
}

#[test]
fn response_without_http_header_defaults_to_octet_stream_and_is_skipped() {
    let rec = Recorder::default();
    let mut raw = http_record(7, "response", Some("text/html"), b"x");
    raw.http_header_len = None;
    let run = run_with(
        &rec,
        vec![
            Ok(raw),
            Ok(http_record(8, "response", Some("text/html"), b"next")),
        ],
    );
    let summary = run.summary.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.extracted, 1);
    assert!(run.faults.is_empty());
    assert_eq!(rec.calls.borrow().len(), 1);
    assert_eq!(run.text, "next\n\n");
}

#[test]
fn empty_extractions_are_counted_not_written() {
    let rec = Recorder::default();
    let run = run_with(
        &rec,
        vec![Ok(http_record(1, "response", Some("text/html"), b"EMPTY"))],
    );
    let summary = run.summary.unwrap();
    assert_eq!(summary.empty, 1);
    assert_eq!(summary.extracted, 0);
    assert_eq!(run.text, "");
}

#[test]
fn meta_charset_decodes_greek_without_header_charset() {
    let rec = Recorder::default();
    let payload =
        b"<html><head><meta charset=\"iso-8859-7\"></head><body>\xc1\xe8\xde\xed\xe1</body></html>";
    run_with(&rec, vec![Ok(http_record(1, "response", Some("text/html"), payload))])
        .summary
        .unwrap();
    let calls = rec.calls.borrow();
    assert!(calls[0].text.contains("Αθήνα"), "{}", calls[0].text);
    assert_eq!(calls[0].declared_charset, None);
}

#[test]
fn utf8_bom_wins_over_conflicting_header_charset() {
    let rec = Recorder::default();
    let mut payload = vec![0xEF, 0xBB, 0xBF];
    payload.extend_from_slice("<p>Привет</p>".as_bytes());
    run_with(
        &rec,
        vec![Ok(http_record(
            1,
            "response",
            Some("text/html; charset=windows-1251"),
            &payload,
        ))],
    )
    .summary
    .unwrap();
    let calls = rec.calls.borrow();
    assert_eq!(calls[0].text, "<p>Привет</p>");
    assert_eq!(calls[0].declared_charset.as_deref(), Some("windows-1251"));
}

#[test]
fn container_fault_halts_the_run() {
    let rec = Recorder::default();
    let run = run_with(
        &rec,
        vec![
            Ok(http_record(1, "response", Some("text/html"), b"first")),
            Err(Error::Container("truncated".into())),
            Ok(http_record(2, "response", Some("text/html"), b"never")),
        ],
    );
    assert_eq!(run.summary.unwrap_err().kind(), "container_format");
    assert_eq!(run.text, "first\n\n");
    assert_eq!(rec.calls.borrow().len(), 1);
    assert!(run.faults.is_empty());
}

fn warc_bytes(records: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, (warc_type, block)) in records.iter().enumerate() {
        write!(
            out,
            "WARC/1.0\r\nWARC-Type: {warc_type}\r\nWARC-Target-URI: http://site{i}.gr/\r\n\
             Content-Type: application/http; msgtype=response\r\nContent-Length: {}\r\n\r\n",
            block.len()
        )
        .unwrap();
        out.extend_from_slice(block);
        out.extend_from_slice(b"\r\n\r\n");
    }
    out
}

#[test]
fn end_to_end_over_a_warc_with_block_extractor() {
    let input = warc_bytes(&[
        ("warcinfo", &b"software: test\r\n"[..]),
        (
            "response",
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Language: el\r\n\r\n\
             <html lang=\"el\"><body><h1>Τίτλος</h1><p>Πρώτη   παράγραφος.</p></body></html>"
                .as_bytes(),
        ),
        (
            "response",
            &b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<body><p>second doc</p></body>"[..],
        ),
        (
            "response",
            &b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\r\n\x89PNG"[..],
        ),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let stats_path = dir.path().join("stats.json");
    let resolver = CharsetResolver::standard().unwrap();
    let extractor = BlockExtractor;
    let mut text = Vec::new();
    let mut url_info = Vec::new();
    let summary = {
        let mut outputs = RunOutputs {
            text: &mut text,
            faults: JsonLines::discard(),
            url_info: JsonLines::new(&mut url_info as &mut dyn Write),
            stats_file: Some(StatsFile::new(&stats_path, None)),
        };
        let reader = WarcReader::new(&input[..], DEFAULT_BUFFER_SIZE).unwrap();
        ResponsePipeline::new(&resolver, &extractor, PipelineConfig::default())
            .run(reader, &mut outputs)
            .unwrap()
    };

    assert_eq!(summary.records, 4);
    assert_eq!(summary.responses, 3);
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        String::from_utf8(text).unwrap(),
        "Τίτλος\nΠρώτη παράγραφος.\n\nsecond doc\n\n"
    );

    let stats: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&stats_path).unwrap()).unwrap();
    assert_eq!(stats["total-response-count"], 3);
    assert_eq!(stats["mime-type"]["text/html"], 2);
    assert_eq!(stats["mime-type"]["image/png"], 1);
    assert_eq!(stats["header-charset"]["utf-8"], 1);
    assert_eq!(stats["header-charset"]["__null"], 2);
    assert_eq!(stats["charset-step"]["header"], 1);
    assert_eq!(stats["tld"]["gr"], 2);

    let info: Vec<serde_json::Value> = String::from_utf8(url_info)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(info.len(), 2);
    assert_eq!(info[0]["url"], "http://site1.gr/");
    assert_eq!(info[0]["declared-languages"], serde_json::json!(["el"]));
    assert_eq!(info[0]["charset"], "UTF-8");
    assert_eq!(info[0]["step"], "header");
}
