use sha2::{Digest, Sha256};

/// Content hash of a generated draft, used by the rescue loop guard.
///
/// SHA256 over the text with surrounding whitespace trimmed and internal runs
/// of whitespace collapsed to a single space. Case and punctuation are kept,
/// so any real edit changes the hash while a pure re-wrap does not.
pub fn content_hash(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
