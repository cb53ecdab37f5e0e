use std::fmt;

use chrono::{DateTime, FixedOffset, Timelike};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::listing::ReleaseItem;

/// Order-independent digest of a branch listing (lowercase hex SHA-256).
///
/// Values read back from the state file are kept verbatim and never
/// validated, so any string is a legal fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Fingerprint(value.into())
    }

    /// Fingerprint a listing. Items are sorted by name on a copy first, so
    /// reordering the listing never changes the result.
    pub fn of(items: &[ReleaseItem]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_bytes(items));
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct CanonicalItem<'a> {
    name: &'a str,
    mod_time: String,
}

/// Compact JSON array of `{name, mod_time}` in name order, with `&`, `<`,
/// `>`, U+2028 and U+2029 escaped as `\uXXXX`.
fn canonical_bytes(items: &[ReleaseItem]) -> Vec<u8> {
    let mut sorted: Vec<&ReleaseItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let canonical: Vec<CanonicalItem<'_>> = sorted
        .into_iter()
        .map(|item| CanonicalItem {
            name: &item.name,
            mod_time: format_timestamp(&item.mod_time),
        })
        .collect();

    // Serializing plain strings cannot fail
    let json = serde_json::to_string(&canonical).unwrap_or_default();
    escape_html_chars(&json).into_bytes()
}

/// These characters only occur inside string literals, so escaping them in
/// the encoded document keeps it valid JSON with the same value.
fn escape_html_chars(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '&' | '<' | '>' | '\u{2028}' | '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out
}

/// RFC 3339 with nanoseconds, trailing zeros trimmed and `Z` for UTC.
fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    let mut out = ts.format("%Y-%m-%dT%H:%M:%S").to_string();

    let nanos = ts.nanosecond() % 1_000_000_000;
    if nanos != 0 {
        let frac = format!("{:09}", nanos);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }

    if ts.offset().local_minus_utc() == 0 {
        out.push('Z');
    } else {
        out.push_str(&ts.format("%:z").to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, ts: &str) -> ReleaseItem {
        ReleaseItem {
            name: name.to_string(),
            mod_time: DateTime::parse_from_rfc3339(ts).unwrap(),
        }
    }

    fn sample() -> Vec<ReleaseItem> {
        vec![
            item("Discord_255.0.ipa", "2024-11-19T05:12:40.190413201Z"),
            item("Discord_254.0.ipa", "2024-11-12T09:00:00Z"),
            item("Discord_256.0.ipa", "2024-11-26T10:30:00.5+02:00"),
        ]
    }

    #[test]
    fn test_order_independent() {
        let items = sample();
        let expected = Fingerprint::of(&items);

        let mut reversed = items.clone();
        reversed.reverse();
        assert_eq!(Fingerprint::of(&reversed), expected);

        let rotated = vec![items[1].clone(), items[2].clone(), items[0].clone()];
        assert_eq!(Fingerprint::of(&rotated), expected);
    }

    #[test]
    fn test_change_sensitivity() {
        let items = sample();
        let base = Fingerprint::of(&items);

        let mut added = items.clone();
        added.push(item("Discord_257.0.ipa", "2024-12-01T00:00:00Z"));
        assert_ne!(Fingerprint::of(&added), base);

        let removed = items[..2].to_vec();
        assert_ne!(Fingerprint::of(&removed), base);

        let mut touched = items.clone();
        touched[1] = item("Discord_254.0.ipa", "2024-11-12T09:00:01Z");
        assert_ne!(Fingerprint::of(&touched), base);
    }

    #[test]
    fn test_digest_shape() {
        let fp = Fingerprint::of(&sample());
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.short().len(), 8);
        assert_eq!(Fingerprint::new("abc").short(), "abc");
    }

    #[test]
    fn test_canonical_layout() {
        let items = vec![
            item("b.ipa", "2024-11-19T05:12:40.190000000Z"),
            item("a.ipa", "2024-11-12T09:00:00+02:00"),
        ];
        let bytes = canonical_bytes(&items);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"[{"name":"a.ipa","mod_time":"2024-11-12T09:00:00+02:00"},{"name":"b.ipa","mod_time":"2024-11-19T05:12:40.19Z"}]"#
        );
    }

    #[test]
    fn test_canonical_escapes_html_chars() {
        let items = vec![item("R&D <beta>\u{2028}.ipa", "2024-11-12T09:00:00Z")];
        let bytes = canonical_bytes(&items);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"[{"name":"R\u0026D \u003cbeta\u003e\u2028.ipa","mod_time":"2024-11-12T09:00:00Z"}]"#
        );

        // Still valid JSON carrying the original name
        let value: serde_json::Value = serde_json::from_slice(&canonical_bytes(&items)).unwrap();
        assert_eq!(value[0]["name"], "R&D <beta>\u{2028}.ipa");
    }

    #[test]
    fn test_empty_listing() {
        let fp = Fingerprint::of(&[]);
        // sha256("[]")
        assert_eq!(
            fp.as_str(),
            "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
        );
    }
}
