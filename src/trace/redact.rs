//! Attribute redaction for trace artifacts

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::Attrs;

/// Attribute keys containing any of these fragments are never written in clear
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "token",
    "secret",
    "password",
    "authorization",
    "cookie",
    "key",
];

/// Keys that match a fragment but only ever carry stable identifiers
const CLEAR_KEYS: &[&str] = &["reason_token"];

fn is_sensitive(key: &str) -> bool {
    if CLEAR_KEYS.contains(&key) {
        return false;
    }
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|frag| lower.contains(frag))
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(s) => Value::String(digest_marker(s)),
        other => Value::String(digest_marker(&other.to_string())),
    }
}

fn digest_marker(text: &str) -> String {
    let digest = hex::encode(Sha256::digest(text.as_bytes()));
    format!("<redacted:{}>", &digest[..12])
}

/// Drop blank keys and replace values under sensitive keys with a short digest
pub fn sanitize_attrs(attrs: Attrs) -> Attrs {
    let mut out = Attrs::new();
    for (key, value) in attrs {
        let key = key.trim().to_string();
        if key.is_empty() {
            continue;
        }
        let cleaned = if is_sensitive(&key) {
            match value {
                Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
                other => redact_value(&other),
            }
        } else {
            match value {
                Value::Object(nested) => Value::Object(sanitize_attrs(nested)),
                other => other,
            }
        };
        out.insert(key, cleaned);
    }
    out
}
