//! # Placeholder Discovery and Substitution
//!
//! Request descriptions mark user-supplied values with `{{NAME}}`
//! placeholders. This module finds them, turns them into ordered
//! [`VariableSlot`]s, and replaces them with concrete values.
//!
//! ## Template Syntax
//!
//! - `{{API_KEY}}` - a placeholder named `API_KEY` (slot key `api_key`)
//! - `{{ MODEL }}` - surrounding whitespace inside the braces is ignored
//! - Names are matched case-insensitively; `{{api_key}}` and `{{API_KEY}}`
//!   refer to the same slot.
//!
//! A few names are reserved for values the application supplies at dispatch
//! time (the user's prompt text, a screenshot, the system prompt). They are
//! [`RuntimePlaceholders`] and never become user-facing slots.
//!
//! ## Usage
//!
//! ```rust
//! use tether_engine::templates::{RuntimePlaceholders, collect_slots, substitute_placeholders};
//!
//! let runtime = RuntimePlaceholders::default();
//! let slots = collect_slots(["Bearer {{API_KEY}}", r#"{"q": "{{TEXT}}"}"#], &runtime);
//! assert_eq!(slots.len(), 1);
//! assert_eq!(slots[0].key, "api_key");
//!
//! let resolved = substitute_placeholders("Bearer {{API_KEY}}", |key| (key == "api_key").then(|| "sk-1".to_string()));
//! assert_eq!(resolved, "Bearer sk-1");
//! ```

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tether_types::VariableSlot;

/// Placeholder keys reserved for dispatch-time values.
pub const DEFAULT_RUNTIME_PLACEHOLDERS: &[&str] = &["text", "image", "system_prompt"];

static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.-]*)\s*\}\}").expect("placeholder pattern compiles"));

/// The set of placeholder keys filled by the application rather than the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePlaceholders {
    keys: Vec<String>,
}

impl Default for RuntimePlaceholders {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME_PLACEHOLDERS.iter().copied())
    }
}

impl RuntimePlaceholders {
    /// Build a set from placeholder names; names are normalized to slot keys.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = Vec::new();
        for name in names {
            let key = name.as_ref().trim().to_lowercase();
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        Self { keys }
    }

    /// An empty set: every placeholder becomes a user slot.
    pub fn none() -> Self {
        Self { keys: Vec::new() }
    }

    /// Returns `true` when `key` is filled at dispatch time.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|candidate| candidate == key)
    }

    /// The reserved keys in configuration order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Extracts placeholder names, as written, from a string in order of appearance.
///
/// Returned names do not include the `{{` or `}}` delimiters. Repeated names
/// are returned each time they occur.
pub fn extract_placeholders(value: &str) -> Vec<String> {
    PLACEHOLDER_PATTERN
        .captures_iter(value)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .collect()
}

/// Returns `true` when `value` still contains a placeholder.
pub fn contains_placeholder(value: &str) -> bool {
    PLACEHOLDER_PATTERN.is_match(value)
}

/// Collects the ordered, de-duplicated user slots referenced by `sources`.
///
/// Sources are scanned in the order given; the first spelling of a name wins
/// as the slot label. Runtime placeholders are skipped.
pub fn collect_slots<'a, I>(sources: I, runtime: &RuntimePlaceholders) -> Vec<VariableSlot>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut slots = Vec::new();

    for source in sources {
        for name in extract_placeholders(source) {
            let slot = VariableSlot::from_placeholder(&name);
            if runtime.contains(&slot.key) || !seen.insert(slot.key.clone()) {
                continue;
            }
            slots.push(slot);
        }
    }

    slots
}

/// Replaces every placeholder occurrence in `value`.
///
/// `resolve` receives the normalized slot key. Returning `None` substitutes an
/// empty string, so no placeholder survives substitution. Replacement text is
/// inserted literally and is not scanned again.
pub fn substitute_placeholders<F>(value: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    PLACEHOLDER_PATTERN
        .replace_all(value, |captures: &Captures| {
            let key = captures[1].to_lowercase();
            resolve(&key).unwrap_or_default()
        })
        .into_owned()
}

/// Replaces each placeholder with a fixed token. Used to validate URLs whose
/// host or path is itself a placeholder.
pub(crate) fn mask_placeholders(value: &str, token: &str) -> String {
    substitute_placeholders(value, |_| Some(token.to_string()))
}
