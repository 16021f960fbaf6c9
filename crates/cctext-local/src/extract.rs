//! Text extraction engines.
//!
//! [`BlockExtractor`] emits the visible prose of a document, one block per
//! line. Everything outside `<body>` and inside non-prose elements (scripts,
//! forms, embedded media, navigation, preformatted text, foreign namespaces)
//! is dropped. [`Html2TextExtractor`] renders the document with `html2text`.

use cctext_core::{Error, ExtractInput, Extracted, Extractor, Result};
use html_scraper::{Html, Node};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use std::collections::BTreeSet;

pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

// Loosely follows the WHATWG rendering section.
const INVISIBLE_TAGS: &[&str] = &[
    // display: none
    "area", "base", "basefont", "datalist", "head", "link", "meta", "noembed", "noframes",
    "param", "rp", "script", "source", "style", "template", "track", "title",
    // never useful text
    "embed", "noscript", "picture",
    // forms
    "form", "fieldset", "legend", "label", "input", "button", "select", "optgroup", "option",
    "textarea", "keygen", "output", "progress", "meter", "details", "summary", "menuitem",
    "menu", "dialog",
    // replaced content
    "img", "iframe", "object", "video", "audio", "canvas", "map", "svg", "math", "applet",
    "bgsound",
    // frames
    "frame", "frameset",
    // struck-through text
    "del", "strike", "s",
    // non-prose uses
    "figure", "footer", "pre", "address", "nav", "listing", "plaintext", "xmp",
    // ruby
    "ruby", "rt",
];

const BLOCK_TAGS: &[&str] = &[
    "html", "body", "blockquote", "center", "div", "main", "p", "article", "aside",
    // tables
    "table", "caption", "colgroup", "col", "tbody", "thead", "tfoot", "tr", "td", "th",
    // lists
    "ol", "ul", "li", "dl", "dt", "dd",
    // sectioning
    "h1", "h2", "h3", "h4", "h5", "h6", "hgroup", "header",
    "br", "hr",
];

/// Drops noncharacters and collapses whitespace runs to one space.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.chars().filter(|c| !is_noncharacter(*c)).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_noncharacter(c: char) -> bool {
    let cp = c as u32;
    (0xFDD0..=0xFDEF).contains(&cp) || cp & 0xFFFE == 0xFFFE
}

/// Accumulates visible text from start/end/characters events.
struct BlockSink {
    // Starts hidden; only the inside of <body> is visible.
    invisible: u32,
    block: String,
    document: String,
    language_hints: BTreeSet<String>,
}

impl BlockSink {
    fn new() -> Self {
        Self {
            invisible: 1,
            block: String::new(),
            document: String::new(),
            language_hints: BTreeSet::new(),
        }
    }

    fn hides(html_ns: bool, name: &str) -> bool {
        !html_ns || INVISIBLE_TAGS.contains(&name)
    }

    fn start(&mut self, html_ns: bool, name: &str, attr: &dyn Fn(&str) -> Option<String>) {
        if html_ns {
            self.collect_language_hints(name, attr);
        }
        if Self::hides(html_ns, name) {
            self.invisible += 1;
            return;
        }
        if name == "body" {
            self.invisible = self.invisible.saturating_sub(1);
        }
        self.maybe_flush(name);
    }

    fn end(&mut self, html_ns: bool, name: &str) {
        if Self::hides(html_ns, name) {
            self.invisible = self.invisible.saturating_sub(1);
            return;
        }
        self.maybe_flush(name);
        if name == "body" {
            self.invisible += 1;
        }
    }

    fn characters(&mut self, text: &str) {
        if self.invisible == 0 {
            self.block.push_str(text);
        }
    }

    fn maybe_flush(&mut self, name: &str) {
        if self.invisible > 0 || !BLOCK_TAGS.contains(&name) {
            return;
        }
        let block = normalize_text(&self.block);
        self.block.clear();
        if !block.is_empty() {
            self.document.push_str(&block);
            self.document.push('\n');
        }
    }

    fn collect_language_hints(&mut self, name: &str, attr: &dyn Fn(&str) -> Option<String>) {
        let is = |key: &str, want: &str| attr(key).is_some_and(|v| v.trim().eq_ignore_ascii_case(want));
        let hints = match name {
            "meta"
                if is("http-equiv", "content-language")
                    || is("name", "language")
                    || is("name", "dc.language") =>
            {
                attr("content")
            }
            "html" => attr("lang"),
            _ => None,
        };
        let Some(hints) = hints else {
            return;
        };
        for tag in hints.split(',') {
            let tag: String = tag.chars().filter(|c| !c.is_whitespace()).collect();
            if !tag.is_empty() {
                self.language_hints.insert(tag.to_ascii_lowercase().replace('_', "-"));
            }
        }
    }

    fn finish(mut self, engine: &'static str) -> Extracted {
        // Text left open by a document without block structure.
        let tail = normalize_text(&self.block);
        if !tail.is_empty() && self.invisible == 0 {
            self.document.push_str(&tail);
            self.document.push('\n');
        }
        Extracted {
            engine,
            text: self.document,
            language_hints: self.language_hints,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BlockExtractor;

impl BlockExtractor {
    fn walk_html(&self, text: &str) -> BlockSink {
        let doc = Html::parse_document(text);
        let mut sink = BlockSink::new();
        // (node, closing)
        let mut stack = vec![(doc.tree.root(), false)];
        while let Some((node, closing)) = stack.pop() {
            match node.value() {
                Node::Element(el) => {
                    let html_ns = &*el.name.ns == HTML_NAMESPACE;
                    let name = el.name();
                    if closing {
                        sink.end(html_ns, name);
                        continue;
                    }
                    sink.start(html_ns, name, &|key| el.attr(key).map(str::to_string));
                    stack.push((node, true));
                    stack.extend(node.children().rev().map(|c| (c, false)));
                }
                Node::Text(t) => sink.characters(t),
                _ if !closing => stack.extend(node.children().rev().map(|c| (c, false))),
                _ => {}
            }
        }
        sink
    }

    fn walk_xhtml(&self, text: &str) -> Result<BlockSink> {
        let mut reader = NsReader::from_str(text);
        let mut sink = BlockSink::new();
        loop {
            match reader.read_resolved_event() {
                Ok((ns, Event::Start(e))) => {
                    let html_ns = is_html_ns(&ns);
                    let attrs = attributes(&e);
                    sink.start(html_ns, &local_name(&e), &|key| lookup(&attrs, key));
                }
                Ok((ns, Event::Empty(e))) => {
                    let html_ns = is_html_ns(&ns);
                    let name = local_name(&e);
                    let attrs = attributes(&e);
                    sink.start(html_ns, &name, &|key| lookup(&attrs, key));
                    sink.end(html_ns, &name);
                }
                Ok((ns, Event::End(e))) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    sink.end(is_html_ns(&ns), &name);
                }
                Ok((_, Event::Text(t))) => {
                    let s = t
                        .unescape()
                        .map_err(|e| Error::Extraction(format!("xhtml text: {e}")))?;
                    sink.characters(&s);
                }
                Ok((_, Event::CData(c))) => {
                    sink.characters(&String::from_utf8_lossy(&c.into_inner()));
                }
                Ok((_, Event::Eof)) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::Extraction(format!(
                        "xhtml parse error at byte {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }
        Ok(sink)
    }
}

fn is_html_ns(ns: &ResolveResult<'_>) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(n)) if *n == HTML_NAMESPACE.as_bytes())
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .filter_map(|a| a.ok())
        .filter_map(|a| {
            let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = a.unescape_value().ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

fn lookup(attrs: &[(String, String)], key: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

impl Extractor for BlockExtractor {
    fn name(&self) -> &'static str {
        "blocks"
    }

    fn extract(&self, input: &ExtractInput<'_>) -> Result<Extracted> {
        let sink = if input.xhtml {
            self.walk_xhtml(input.text)?
        } else {
            self.walk_html(input.text)
        };
        Ok(sink.finish(self.name()))
    }
}

/// Rendered plain text, one non-blank line per block.
#[derive(Debug, Clone, Copy)]
pub struct Html2TextExtractor {
    pub width: usize,
}

impl Default for Html2TextExtractor {
    fn default() -> Self {
        Self { width: 100 }
    }
}

impl Extractor for Html2TextExtractor {
    fn name(&self) -> &'static str {
        "html2text"
    }

    fn extract(&self, input: &ExtractInput<'_>) -> Result<Extracted> {
        let rendered = html2text::from_read(input.text.as_bytes(), self.width.max(10))
            .map_err(|e| Error::Extraction(e.to_string()))?;
        let mut text = String::new();
        for line in rendered.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
            text.push_str(line);
            text.push('\n');
        }
        Ok(Extracted {
            engine: self.name(),
            text,
            language_hints: BTreeSet::new(),
        })
    }
}
