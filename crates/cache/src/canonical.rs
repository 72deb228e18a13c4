//! Canonical JSON serialization and content digests for cache keys.
//!
//! Two semantically equal config objects must hash identically regardless of
//! the order their fields were produced in, so object keys are sorted
//! lexicographically at every nesting level before hashing. Arrays are
//! semantically ordered and serialize in their original order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of hex characters the digest is truncated to.
///
/// 64 bits of digest is a deliberate brevity/collision trade-off inherited
/// from existing cache layouts; lengthening it would orphan every stored
/// entry.
pub const DIGEST_LEN: usize = 16;

/// Serialize a JSON value canonically: compact, object keys sorted at every
/// level, arrays in original order.
#[must_use]
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
                write_canonical(&map[*key], out);
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
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 of the canonical serialization, truncated to [`DIGEST_LEN`] hex
/// characters.
#[must_use]
pub fn content_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(DIGEST_LEN);
    digest
}
