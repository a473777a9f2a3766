//! Canonical forms for content-addressed keys.
//!
//! Inputs that differ only in whitespace, letter case or JSON key order must
//! map to the same canonical form before hashing.

use serde_json::Value;

/// Trim, collapse whitespace runs to one space, lowercase.
pub fn canonicalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

const IDENTIFIER_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Normalize an external identifier such as a DOI.
///
/// DOIs are case-insensitive and commonly pasted as resolver URLs, so the
/// resolver prefix is dropped.
pub fn canonicalize_identifier(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let stripped = IDENTIFIER_PREFIXES
        .iter()
        .find_map(|prefix| lowered.strip_prefix(prefix))
        .unwrap_or(&lowered);
    stripped.trim().to_string()
}

/// Serialize JSON with object keys sorted at every depth and string values
/// passed through [`canonicalize_text`].
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => out.push_str(&Value::String(canonicalize_text(s)).to_string()),
        other => out.push_str(&other.to_string()),
    }
}
