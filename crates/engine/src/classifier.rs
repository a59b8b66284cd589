//! Sensitive field classification.
//!
//! A template has at most one credential slot: the first slot, in declaration
//! order, whose key is in the sensitive key set. Keys are compared exactly
//! and case-sensitively; slot keys are already lower-cased by the parser.

use tether_types::VariableSlot;

/// Key names treated as secrets when no configuration overrides them.
pub const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "api_key",
    "api_token",
    "access_token",
    "auth_token",
    "bearer_token",
    "client_secret",
    "secret",
    "token",
    "license_key",
    "password",
];

/// Configurable set of key names that hold secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveKeys {
    keys: Vec<String>,
}

impl Default for SensitiveKeys {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_KEYS.iter().copied())
    }
}

impl SensitiveKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for key in keys.into_iter().map(Into::into) {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        Self { keys: unique }
    }

    /// Returns `true` when `key` is an exact member of the set.
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.keys.iter().any(|candidate| candidate == key)
    }

    /// The credential slot: the first sensitive slot in declaration order.
    ///
    /// Later sensitive slots are ordinary fields as far as credential handling
    /// goes, even though [`is_sensitive`](Self::is_sensitive) still reports
    /// them so a UI can mask their input.
    pub fn credential_slot<'a>(&self, slots: &'a [VariableSlot]) -> Option<&'a VariableSlot> {
        slots.iter().find(|slot| self.is_sensitive(&slot.key))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}
