//! Deterministic cache keys for question text

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// NFC-normalize, trim and collapse internal whitespace runs to one space
pub fn normalize_text(text: &str) -> String {
    let nfc: String = text.nfc().collect();
    nfc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `q:` followed by the SHA-256 hex digest of the normalized, lower-cased question
pub fn cache_key(question: &str) -> String {
    let normalized = normalize_text(question).to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("q:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shape() {
        let key = cache_key("What is RAG?");
        assert!(key.starts_with("q:"));
        assert_eq!(key.len(), 2 + 64);
    }

    #[test]
    fn test_whitespace_and_case_insensitive() {
        assert_eq!(
            cache_key("  What   is\tRAG?\n"),
            cache_key("what is rag?")
        );
    }

    #[test]
    fn test_unicode_forms_collapse() {
        // "café" precomposed vs. e + combining acute accent
        let composed = "caf\u{e9} menu";
        let decomposed = "cafe\u{301} menu";
        assert_ne!(composed, decomposed);
        assert_eq!(normalize_text(decomposed), composed);
        assert_eq!(cache_key(composed), cache_key(decomposed));
    }

    #[test]
    fn test_distinct_questions_distinct_keys() {
        assert_ne!(cache_key("what is rag"), cache_key("what is a rag"));
    }
}
