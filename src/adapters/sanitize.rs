//! Log sanitization for patient data and secrets.
//!
//! Every formatted log line goes through [`SanitizingMakeWriter`] before it
//! reaches its sink. The patterns redact:
//! - Patient vitals written as `key=value` or `key: value` (age, sex, height,
//!   weight, smoking), which is also how validation errors render them
//! - E-mail addresses and UUIDs that callers may use as patient references
//! - Secret-looking values (`key=...`, `token: ...`) and long hex digests
//!
//! Sanitizing is a fallback; patient values are never logged on purpose.
//! Input is capped (see `DRUGRISK_SANITIZE_MAX_BYTES`) so a huge line cannot
//! make logging expensive.

use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

struct Rule {
    regex: Regex,
    replacement: &'static str,
}

struct Rules {
    set: RegexSet,
    rules: Vec<Rule>,
}

static RULES: OnceLock<Rules> = OnceLock::new();

fn rules() -> &'static Rules {
    RULES.get_or_init(|| {
        let table: [(&'static str, &'static str); 5] = [
            (
                r"(?i)\b(age|sex|height|weight|smoking)(\s*[=:]\s*)(?:-?[0-9][0-9._]*(?:e[+-]?[0-9]+)?|-?inf|NaN)",
                "${1}${2}[REDACTED]",
            ),
            (
                r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
                "[REDACTED-UUID]",
            ),
            (
                r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
                "[REDACTED-EMAIL]",
            ),
            (
                r"(?i)\b(?:secret|password|seed|token|private[_-]?key|signing[_-]?key)\b\s*[:=]\s*\S{8,}",
                "[REDACTED-SECRET]",
            ),
            (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-KEY]"),
        ];

        let set = RegexSet::new(table.iter().map(|(p, _)| *p)).expect("Valid regex set");
        let rules = table
            .into_iter()
            .map(|(pattern, replacement)| Rule {
                regex: Regex::new(pattern).expect("Valid regex"),
                replacement,
            })
            .collect();
        Rules { set, rules }
    })
}

fn max_sanitize_bytes() -> usize {
    std::env::var("DRUGRISK_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

/// Redact patient data and secrets from a string.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);
    let rules = rules();

    let mut out = prefix.to_string();
    for idx in rules.set.matches(prefix).into_iter() {
        let rule = &rules.rules[idx];
        let replaced = rule.regex.replace_all(&out, rule.replacement).into_owned();
        out = replaced;
    }

    if truncated {
        out.push_str(" [TRUNCATED]");
    }
    out
}

/// Whether a string contains anything [`sanitize`] would redact.
#[must_use]
pub fn contains_sensitive(input: &str) -> bool {
    let (prefix, _) = truncate_to_char_boundary(input, max_sanitize_bytes());
    rules().set.is_match(prefix)
}

/// A `tracing_subscriber` writer factory that sanitizes each formatted line.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

/// Line-buffering writer produced by [`SanitizingMakeWriter`].
pub struct SanitizingWriter<W: std::io::Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: std::io::Write> SanitizingWriter<W> {
    fn write_sanitized(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let text = String::from_utf8_lossy(bytes);
        self.inner.write_all(sanitize(&text).as_bytes())
    }

    fn flush_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.write_sanitized(&line)?;
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // A line that never ends is written out (truncated) instead of growing forever.
        if self.buffer.len() > max_sanitize_bytes().saturating_mul(2) {
            let pending = std::mem::take(&mut self.buffer);
            self.write_sanitized(&pending)?;
            self.inner.write_all(b"\n")?;
            return Ok(buf.len());
        }

        self.flush_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_lines()?;
        if !self.buffer.is_empty() {
            let pending = std::mem::take(&mut self.buffer);
            self.write_sanitized(&pending)?;
        }
        self.inner.flush()
    }
}

impl<W: std::io::Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        let _ = std::io::Write::flush(self);
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            buffer: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_redacts_vitals() {
        let out = sanitize("patient rejected: age=151 out of range (0, 150); weight: 82.5");
        assert!(out.contains("age=[REDACTED]"));
        assert!(out.contains("weight: [REDACTED]"));
        assert!(!out.contains("151"));
        assert!(!out.contains("82.5"));
        assert!(out.contains("(0, 150)"));
    }

    #[test]
    fn test_redacts_non_finite_vitals() {
        assert_eq!(sanitize("height=NaN"), "height=[REDACTED]");
        assert_eq!(sanitize("height=-inf"), "height=[REDACTED]");
    }

    #[test]
    fn test_leaves_clinical_text_alone() {
        let line = "Scored drug=Avastin symptom=Nausea risk=0.25 severity=medium";
        assert_eq!(sanitize(line), line);
        assert!(!contains_sensitive(line));
    }

    #[test]
    fn test_redacts_identifiers() {
        let out = sanitize("ref 550e8400-e29b-41d4-a716-446655440000 from nurse@hospital.org");
        assert!(out.contains("[REDACTED-UUID]"));
        assert!(out.contains("[REDACTED-EMAIL]"));
    }

    #[test]
    fn test_redacts_secrets() {
        assert!(sanitize("seed=QWxhZGRpbjpvcGVuIHNlc2FtZQ==").contains("[REDACTED-SECRET]"));
        assert!(sanitize("digest 0123456789abcdef0123456789abcdef").contains("[REDACTED-KEY]"));
    }

    #[test]
    fn test_truncates_large_inputs() {
        let out = sanitize_with_limit("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(out, "abcdefghij [TRUNCATED]");
        // Never split a multi-byte character.
        let out = sanitize_with_limit("ééééé", 3);
        assert_eq!(out, "é [TRUNCATED]");
    }

    #[test]
    fn test_writer_sanitizes_per_line() {
        let mut sink = Vec::new();
        {
            let mut writer = SanitizingWriter {
                inner: &mut sink,
                buffer: Vec::new(),
            };
            writer.write_all(b"first age=40\nsecond ").expect("write");
            writer.write_all(b"sex=1").expect("write");
        }
        let text = String::from_utf8(sink).expect("utf8");
        assert_eq!(text, "first age=[REDACTED]\nsecond sex=[REDACTED]");
    }
}
