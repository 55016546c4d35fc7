//! `SecretRegistry`: a process-wide set of sensitive values and their
//! encoded variants, masked out of text before it reaches a log sink.
//!
//! Masking operates over exact registered values rather than pattern
//! matching, since Kite's secrets are concrete environment values rather
//! than named patterns.

use std::collections::HashSet;
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

/// A registered secret value plus the hint shown when masking with hints
/// enabled (e.g. `"GITHUB_TOKEN"` for a value read via that env var).
#[derive(Clone)]
struct Registered {
    value: String,
    hint: String,
}

/// Process-wide registry of values to mask out of persisted text.
/// Registration is idempotent; there is no deregistration beyond
/// [`SecretRegistry::clear`] (test-only).
pub struct SecretRegistry {
    entries: RwLock<Vec<Registered>>,
    seen: RwLock<HashSet<String>>,
}

impl Default for SecretRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            seen: RwLock::new(HashSet::new()),
        }
    }

    /// Register `value` under `hint`. Also registers the value's
    /// URL-encoded and base64-encoded forms, since secrets frequently
    /// reappear in those forms inside headers and URLs. Empty values are
    /// ignored. Idempotent: re-registering the same value is a no-op.
    pub fn register(&self, value: &str, hint: &str) {
        if value.is_empty() {
            return;
        }

        let url_encoded = utf8_percent_encode(value, NON_ALPHANUMERIC).to_string();
        let base64_encoded = BASE64_STANDARD.encode(value.as_bytes());

        for variant in [value.to_string(), url_encoded, base64_encoded] {
            if variant.is_empty() {
                continue;
            }
            let mut seen = self.seen.write().expect("secret registry lock poisoned");
            if seen.insert(variant.clone()) {
                drop(seen);
                self.entries
                    .write()
                    .expect("secret registry lock poisoned")
                    .push(Registered {
                        value: variant,
                        hint: hint.to_string(),
                    });
            }
        }
    }

    /// Replace every registered value substring in `text` with `"***"`, or
    /// `"[<hint>:***]"` when `show_hints` is true. Applied repeatedly until
    /// no registered value remains, so overlapping registrations (a value
    /// and a longer value containing it) both get fully masked regardless
    /// of order.
    pub fn mask(&self, text: &str, show_hints: bool) -> String {
        let entries = self.entries.read().expect("secret registry lock poisoned");
        if entries.is_empty() {
            return text.to_string();
        }

        // Longest-first so a shorter registered value doesn't partially
        // consume a longer one and leave a dangling remainder unmasked.
        let mut sorted: Vec<&Registered> = entries.iter().collect();
        sorted.sort_by_key(|e| std::cmp::Reverse(e.value.len()));

        let mut result = text.to_string();
        loop {
            let mut replaced_any = false;
            for entry in &sorted {
                if entry.value.is_empty() {
                    continue;
                }
                if result.contains(&entry.value) {
                    let replacement = if show_hints {
                        format!("[{}:***]", entry.hint)
                    } else {
                        "***".to_string()
                    };
                    result = result.replace(&entry.value, &replacement);
                    replaced_any = true;
                }
            }
            if !replaced_any {
                break;
            }
        }
        result
    }

    pub fn clear(&self) {
        self.entries.write().expect("secret registry lock poisoned").clear();
        self.seen.write().expect("secret registry lock poisoned").clear();
    }
}
