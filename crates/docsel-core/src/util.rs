use blake3::Hasher;
use chrono::Utc;
use serde_json::Value as JsonValue;

pub fn blake3_hex(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    let hash = hasher.finalize();
    hash.to_hex().to_string()
}

/// `<unix-millis>-<first 8 hex of blake3(doc)>`
pub fn timestamped_id(doc: &JsonValue) -> String {
    let digest = blake3_hex(doc.to_string().as_bytes());
    format!("{}-{}", Utc::now().timestamp_millis(), &digest[..8])
}

/// Lowercases and replaces every run of non-alphanumerics with a single `-`.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    if dash {
        out.pop();
    }
    out
}
