//! Record tokenizers.
//!
//! Two grammars:
//! - attribute-value: `KEY - VALUE` lines, `//` terminates a record, `#` lines
//!   are metadata, lines starting with `/` continue the previous value
//! - stanza: `[Term]` headers open a record, blank lines close it, `key: value`
//!   lines, `!` comments, a trailing `\` folds the next line
//!
//! Both yield raw `(key, value)` pairs in file order; interpretation is left
//! to the parsers. Lines are decoded as UTF-8 and fall back to ISO-8859-1.

use crate::error::Result;
use regex::Regex;
use std::io::BufRead;
use tracing::{debug, warn};

/// One raw record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRecord {
    /// Stanza header (`Term`, `Typedef`); `None` for attribute-value records.
    pub kind: Option<String>,
    /// 1-based line of the record's first line.
    pub line: usize,
    pub fields: Vec<(String, String)>,
}

impl RawRecord {
    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn push(&mut self, key: &str, value: &str) {
        self.fields.push((key.trim().to_string(), value.trim().to_string()));
    }

    fn fold_into_last(&mut self, text: &str) -> bool {
        match self.fields.last_mut() {
            Some((_, value)) => {
                let text = text.trim();
                if !text.is_empty() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(text);
                }
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Line reading
// ============================================================================

struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        Ok(Some(decode_line(&self.buf)))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

// ============================================================================
// Attribute-value records
// ============================================================================

pub struct AttributeValueRecords<R> {
    lines: LineReader<R>,
    html: Regex,
    done: bool,
}

impl<R: BufRead> AttributeValueRecords<R> {
    pub fn new(reader: R) -> Result<Self> {
        Ok(Self {
            lines: LineReader::new(reader),
            html: Regex::new(r"<[^>]*>")?,
            done: false,
        })
    }

    fn read_record(&mut self) -> Result<Option<RawRecord>> {
        let mut record: Option<RawRecord> = None;
        while let Some(line) = self.lines.next_line()? {
            if line.starts_with('#') {
                continue;
            }
            if line.trim_end() == "//" {
                match record.take() {
                    Some(r) if !r.fields.is_empty() => return Ok(Some(r)),
                    _ => continue,
                }
            }
            let line = self.html.replace_all(&line, "");
            if let Some(rest) = line.strip_prefix('/') {
                let folded = record.as_mut().map(|r| r.fold_into_last(rest)).unwrap_or(false);
                if !folded {
                    warn!(line = self.lines.line_no, "continuation line outside a value");
                }
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = split_attribute_line(&line) else {
                warn!(line = self.lines.line_no, text = %line, "no `KEY - VALUE` separator, skipped");
                continue;
            };
            let line_no = self.lines.line_no;
            record
                .get_or_insert_with(|| RawRecord {
                    kind: None,
                    line: line_no,
                    fields: Vec::new(),
                })
                .push(key, value);
        }
        Ok(record.filter(|r| !r.fields.is_empty()))
    }
}

fn split_attribute_line(line: &str) -> Option<(&str, &str)> {
    if let Some((key, value)) = line.split_once(" - ") {
        return Some((key, value));
    }
    line.trim_end().strip_suffix(" -").map(|key| (key, ""))
}

impl<R: BufRead> Iterator for AttributeValueRecords<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// ============================================================================
// Stanza records
// ============================================================================

pub struct StanzaRecords<R> {
    lines: LineReader<R>,
    /// Header line already consumed for the next record.
    next_header: Option<(String, usize)>,
    done: bool,
}

impl<R: BufRead> StanzaRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LineReader::new(reader),
            next_header: None,
            done: false,
        }
    }

    fn read_line_folded(&mut self) -> Result<Option<String>> {
        let Some(mut line) = self.lines.next_line()? else {
            return Ok(None);
        };
        while line.ends_with('\\') {
            line.pop();
            match self.lines.next_line()? {
                Some(next) => line.push_str(&next),
                None => break,
            }
        }
        Ok(Some(line))
    }

    fn read_record(&mut self) -> Result<Option<RawRecord>> {
        let mut record = self.next_header.take().map(|(kind, line)| RawRecord {
            kind: Some(kind),
            line,
            fields: Vec::new(),
        });
        while let Some(line) = self.read_line_folded()? {
            let trimmed = line.trim();
            if let Some(kind) = stanza_header(trimmed) {
                let header = (kind.to_string(), self.lines.line_no);
                if record.is_some() {
                    self.next_header = Some(header);
                    return Ok(record);
                }
                record = Some(RawRecord {
                    kind: Some(header.0),
                    line: header.1,
                    fields: Vec::new(),
                });
                continue;
            }
            if trimmed.is_empty() {
                if record.is_some() {
                    return Ok(record);
                }
                continue;
            }
            if trimmed.starts_with('!') {
                continue;
            }
            let Some(current) = record.as_mut() else {
                // document header before the first stanza
                continue;
            };
            match trimmed.split_once(':') {
                Some((key, value)) => current.push(key, value),
                None => debug!(line = self.lines.line_no, text = trimmed, "stanza line without `key:`"),
            }
        }
        Ok(record)
    }
}

fn stanza_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']')
}

impl<R: BufRead> Iterator for StanzaRecords<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
