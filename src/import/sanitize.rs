//! Repair of malformed provider payloads.
//!
//! Some providers emit JSON with unescaped control characters or stray
//! text inside string fields, most often the destination-URL field, where
//! user-entered URLs end up embedded verbatim. The repair pass narrows
//! that field with a regex, cleans everything between it and a known-good
//! sentinel field, then canonically escapes any control characters left in
//! the payload.
//!
//! A payload that already parses is returned unchanged, byte for byte. A
//! payload that still fails to parse after repair is fatal for the page:
//! the error carries the offending text so an operator can inspect it, and
//! the job does not advance past the page on its own.

use regex::Regex;
use std::borrow::Cow;
use thiserror::Error;

/// Provider-specific field names driving the targeted repair step.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// The field known to contain broken values (the destination URL).
    pub url_field: &'static str,
    /// A field that reliably follows it and parses cleanly.
    pub sentinel_field: &'static str,
}

const SNIPPET_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("payload unparseable after repair: {source}; payload starts: {snippet}")]
    Unparseable {
        source: serde_json::Error,
        snippet: String,
    },
}

/// Parse a raw provider payload, repairing it first if needed.
pub fn parse_payload(raw: &str, fields: &FieldSpec) -> Result<serde_json::Value, SanitizeError> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Ok(value);
    }

    let repaired = repair_payload(raw, fields);
    serde_json::from_str(&repaired).map_err(|source| SanitizeError::Unparseable {
        source,
        snippet: snippet_of(raw),
    })
}

/// Repair a payload believed to be JSON. Input that already parses is
/// returned unchanged.
pub fn repair_payload<'a>(raw: &'a str, fields: &FieldSpec) -> Cow<'a, str> {
    if serde_json::from_str::<serde_json::Value>(raw).is_ok() {
        return Cow::Borrowed(raw);
    }

    // Narrow each destination-URL value: everything between the field name
    // and the sentinel field is treated as the value, with interleaved
    // noise cleaned in place.
    let pattern = format!(
        r#""{url}"\s*:\s*"((?s).*?)"\s*,\s*"{sentinel}""#,
        url = regex::escape(fields.url_field),
        sentinel = regex::escape(fields.sentinel_field),
    );
    let field_re = Regex::new(&pattern).expect("field spec pattern is a valid regex");

    let repaired = field_re.replace_all(raw, |caps: &regex::Captures| {
        format!(
            r#""{}":"{}","{}""#,
            fields.url_field,
            escape_url_value(&caps[1]),
            fields.sentinel_field
        )
    });

    // Canonically escape any raw control characters still present anywhere
    // in the payload; characters without a canonical escape are dropped.
    let mut out = String::with_capacity(repaired.len());
    for ch in repaired.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}

/// Clean one destination-URL value: escape backslashes and quotes, drop
/// control characters that have no canonical JSON escape. Characters with
/// a canonical escape are left for the global pass.
fn escape_url_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' | '\r' | '\t' | '\u{0008}' | '\u{000C}' => out.push(ch),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}

fn snippet_of(raw: &str) -> String {
    if raw.len() <= SNIPPET_LEN {
        return raw.to_string();
    }
    let mut end = SNIPPET_LEN;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: FieldSpec = FieldSpec {
        url_field: "long_url",
        sentinel_field: "created_at",
    };

    #[test]
    fn valid_payload_is_returned_unchanged() {
        let raw = r#"{ "links": [ { "long_url": "https://x.com", "created_at": "2024-01-01" } ] }"#;
        let repaired = repair_payload(raw, &FIELDS);
        assert!(matches!(repaired, Cow::Borrowed(_)));
        assert_eq!(repaired.as_ref(), raw);
    }

    #[test]
    fn raw_newline_in_url_survives_as_escape() {
        let raw = "{\"links\":[{\"long_url\":\"https://x.com/a\nb\",\"created_at\":\"2024-01-01\"}]}";
        assert!(serde_json::from_str::<serde_json::Value>(raw).is_err());

        let repaired = repair_payload(raw, &FIELDS);
        assert!(repaired.contains("\\n"));

        let value = parse_payload(raw, &FIELDS).unwrap();
        let url = value["links"][0]["long_url"].as_str().unwrap();
        assert_eq!(url, "https://x.com/a\nb");
    }

    #[test]
    fn stray_quote_in_url_is_escaped() {
        let raw = r#"{"links":[{"long_url":"https://x.com/a"b","created_at":"2024-01-01"}]}"#;
        let value = parse_payload(raw, &FIELDS).unwrap();
        let url = value["links"][0]["long_url"].as_str().unwrap();
        assert_eq!(url, "https://x.com/a\"b");
    }

    #[test]
    fn backslash_in_url_is_escaped() {
        let raw = "{\"links\":[{\"long_url\":\"https://x.com/a\\qb\",\"created_at\":\"2024-01-01\"}]}";
        assert!(serde_json::from_str::<serde_json::Value>(raw).is_err());
        let value = parse_payload(raw, &FIELDS).unwrap();
        let url = value["links"][0]["long_url"].as_str().unwrap();
        assert_eq!(url, "https://x.com/a\\qb");
    }

    #[test]
    fn control_character_outside_url_field_is_dropped() {
        let raw = "{\"links\":[{\"long_url\":\"https://x.com\",\"created_at\":\"2024-01-01\",\"title\":\"a\u{000B}b\"}]}";
        let value = parse_payload(raw, &FIELDS).unwrap();
        assert_eq!(value["links"][0]["title"].as_str().unwrap(), "ab");
    }

    #[test]
    fn unrecoverable_garbage_is_fatal_with_snippet() {
        let raw = "not json at all {{{";
        let err = parse_payload(raw, &FIELDS).unwrap_err();
        let SanitizeError::Unparseable { snippet, .. } = err;
        assert!(snippet.contains("not json"));
    }
}
