//! Deterministic request fingerprints used as response cache keys.
//!
//! A fingerprint is the SHA-256 digest of a length-prefixed encoding of
//! `(model_id, prompt, selected params)`. Length prefixes keep field
//! boundaries unambiguous (`model="a|b"` never collides with `model="a",
//! prompt="|b..."`). Params are visited in key order and each value is
//! rendered as compact JSON, so the same logical request always hashes the
//! same way.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::FingerprintParams;
use crate::error::Result;
use crate::providers::RequestParams;

/// Hex-encoded SHA-256 cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes fingerprints, selecting which params contribute to the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprinter {
    params: FingerprintParams,
}

impl Fingerprinter {
    pub fn new(params: FingerprintParams) -> Self {
        Self { params }
    }

    pub fn fingerprint(&self, prompt: &str, model_id: &str, params: &RequestParams) -> Fingerprint {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, b"agentpool.v1");
        update_field(&mut hasher, model_id.as_bytes());
        update_field(&mut hasher, prompt.as_bytes());

        let selected: Vec<(&String, &serde_json::Value)> = params
            .iter()
            .filter(|(name, _)| self.includes(name))
            .collect();
        hasher.update((selected.len() as u64).to_le_bytes());
        for (name, value) in selected {
            update_field(&mut hasher, name.as_bytes());
            update_field(&mut hasher, value.to_string().as_bytes());
        }

        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Key for an arbitrary serializable request (a conversation, a tool
    /// call) under `namespace`. The value is hashed as JSON with object keys
    /// sorted, so map insertion order does not matter. Never equal to a
    /// prompt key.
    pub fn for_value<T: Serialize + ?Sized>(namespace: &str, value: &T) -> Result<Fingerprint> {
        let canonical = serde_json::to_value(value)?.to_string();
        let mut hasher = Sha256::new();
        update_field(&mut hasher, b"agentpool.value.v1");
        update_field(&mut hasher, namespace.as_bytes());
        update_field(&mut hasher, canonical.as_bytes());
        Ok(Fingerprint(hex::encode(hasher.finalize())))
    }

    fn includes(&self, name: &str) -> bool {
        match &self.params {
            FingerprintParams::All => true,
            FingerprintParams::None => false,
            FingerprintParams::Only(names) => names.contains(name),
        }
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn params(pairs: &[(&str, serde_json::Value)]) -> RequestParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let fp = Fingerprinter::default();
        let p = params(&[("temperature", json!(0.2))]);
        let k1 = fp.fingerprint("hello", "openai:gpt-4o", &p);
        let k2 = fp.fingerprint("hello", "openai:gpt-4o", &p);
        assert_eq!(k1, k2);
        assert_eq!(k1.as_str().len(), 64);
        assert_eq!(k1.short().len(), 8);
    }

    #[test]
    fn test_fingerprint_sensitive_to_each_input() {
        let fp = Fingerprinter::default();
        let p = params(&[("temperature", json!(0.2))]);
        let base = fp.fingerprint("hello", "openai:gpt-4o", &p);
        assert_ne!(base, fp.fingerprint("hello!", "openai:gpt-4o", &p));
        assert_ne!(base, fp.fingerprint("hello", "anthropic:claude-3", &p));
        assert_ne!(
            base,
            fp.fingerprint("hello", "openai:gpt-4o", &params(&[("temperature", json!(0.3))]))
        );
        assert_ne!(base, fp.fingerprint("hello", "openai:gpt-4o", &RequestParams::new()));
    }

    #[test]
    fn test_fingerprint_no_separator_collision() {
        let fp = Fingerprinter::default();
        let empty = RequestParams::new();
        assert_ne!(
            fp.fingerprint("c", "a|b", &empty),
            fp.fingerprint("b|c", "a", &empty),
        );
        assert_ne!(
            fp.fingerprint("ab", "", &empty),
            fp.fingerprint("b", "a", &empty),
        );
    }

    #[test]
    fn test_param_insertion_order_irrelevant() {
        let fp = Fingerprinter::default();
        let mut a = RequestParams::new();
        a.insert("top_p".into(), json!(0.9));
        a.insert("max_tokens".into(), json!(256));
        let mut b = RequestParams::new();
        b.insert("max_tokens".into(), json!(256));
        b.insert("top_p".into(), json!(0.9));
        assert_eq!(fp.fingerprint("q", "m", &a), fp.fingerprint("q", "m", &b));
    }

    #[test]
    fn test_value_keys_are_namespaced_and_order_free() {
        use std::collections::HashMap;

        let mut a = HashMap::new();
        a.insert("role", "user");
        a.insert("content", "hello");
        let mut b = HashMap::new();
        b.insert("content", "hello");
        b.insert("role", "user");

        let ka = Fingerprinter::for_value("conversation", &a).unwrap();
        assert_eq!(ka, Fingerprinter::for_value("conversation", &b).unwrap());
        assert_ne!(ka, Fingerprinter::for_value("tool_call", &a).unwrap());

        let prompt_key = Fingerprinter::default().fingerprint("hello", "conversation", &RequestParams::new());
        assert_ne!(ka, prompt_key);
    }

    #[test]
    fn test_value_key_rejects_unencodable() {
        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), 3u8);
        assert!(Fingerprinter::for_value("conversation", &bad).is_err());
    }

    #[test]
    fn test_param_selection() {
        let only: BTreeSet<String> = ["temperature".to_string()].into_iter().collect();
        let fp = Fingerprinter::new(FingerprintParams::Only(only));
        let with_user = params(&[("temperature", json!(0.2)), ("user", json!("alice"))]);
        let other_user = params(&[("temperature", json!(0.2)), ("user", json!("bob"))]);
        assert_eq!(
            fp.fingerprint("q", "m", &with_user),
            fp.fingerprint("q", "m", &other_user)
        );

        let none = Fingerprinter::new(FingerprintParams::None);
        assert_eq!(
            none.fingerprint("q", "m", &with_user),
            none.fingerprint("q", "m", &RequestParams::new())
        );
    }
}
