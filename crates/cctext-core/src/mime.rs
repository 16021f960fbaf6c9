use std::collections::BTreeMap;
use std::fmt;

/// A parsed `Content-Type` value: lower-cased type/subtype plus parameters
/// keyed by lower-cased name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    type_: String,
    subtype: String,
    params: BTreeMap<String, String>,
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

impl MimeType {
    /// `application/octet-stream`, no parameters.
    pub fn octet_stream() -> Self {
        Self {
            type_: "application".to_string(),
            subtype: "octet-stream".to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Parse a header value. Returns `None` when the type/subtype pair is
    /// missing or not made of tokens. Malformed parameters are dropped.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let essence = parts.next()?.trim();
        let (t, s) = essence.split_once('/')?;
        let (t, s) = (t.trim(), s.trim());
        if !is_token(t) || !is_token(s) {
            return None;
        }

        let mut params = BTreeMap::new();
        for raw in parts {
            let Some((k, v)) = raw.split_once('=') else {
                continue;
            };
            let k = k.trim().to_ascii_lowercase();
            if !is_token(&k) {
                continue;
            }
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|x| x.strip_suffix('"'))
                .unwrap_or(v)
                .trim();
            if v.is_empty() {
                continue;
            }
            params.entry(k).or_insert_with(|| v.to_string());
        }

        Some(Self {
            type_: t.to_ascii_lowercase(),
            subtype: s.to_ascii_lowercase(),
            params,
        })
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (k, v) in &self.params {
            write!(f, "; {k}={v}")?;
        }
        Ok(())
    }
}
