//! Shared data model for the Tether request template engine.
//!
//! Everything in this crate is plain data: provider definitions as persisted,
//! templates derived from them, the user's active selection, and the fully
//! resolved request handed to a dispatcher.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered header map. Insertion order is the order headers were declared in.
pub type HeaderMap = IndexMap<String, String>;

/// Ordered key/value map used for user overrides and runtime values.
pub type ValueMap = IndexMap<String, String>;

/// A provider the user can select, described by raw `curl` text.
///
/// Built-in definitions ship with the application and are read-only. Custom
/// definitions are created by the user and can be replaced or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDefinition {
    /// Unique identifier across built-in and custom providers.
    pub id: String,
    /// Raw command-line style request description.
    #[serde(rename = "curl")]
    pub description: String,
    /// Whether the user created this provider.
    #[serde(rename = "isCustom", default)]
    pub is_custom: bool,
}

impl ProviderDefinition {
    /// Build a read-only, built-in definition.
    pub fn builtin(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            is_custom: false,
        }
    }

    /// Build a user-created definition.
    pub fn custom(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            is_custom: true,
        }
    }
}

/// A named placeholder a template exposes for user input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableSlot {
    /// Normalized (lower-cased) placeholder name used as the override key.
    pub key: String,
    /// Placeholder name as written in the description, e.g. `API_KEY`.
    pub label: String,
}

impl VariableSlot {
    /// Build a slot from a placeholder name as it appears between the delimiters.
    pub fn from_placeholder(name: &str) -> Self {
        Self {
            key: name.to_lowercase(),
            label: name.to_string(),
        }
    }
}

/// Structured request derived from a [`ProviderDefinition`].
///
/// Templates are never stored or mutated in place; they are recomputed from
/// the provider description whenever needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// User-facing placeholders in declaration order, de-duplicated by key.
    #[serde(default)]
    pub variables: Vec<VariableSlot>,
}

impl RequestTemplate {
    /// Look up a slot by its key.
    pub fn slot(&self, key: &str) -> Option<&VariableSlot> {
        self.variables.iter().find(|slot| slot.key == key)
    }

    /// Returns `true` when the template exposes a slot with the given key.
    pub fn has_slot(&self, key: &str) -> bool {
        self.slot(key).is_some()
    }

    /// Iterate slot keys in declaration order.
    pub fn slot_keys(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|slot| slot.key.as_str())
    }
}

/// The single active provider selection and the values entered for it.
///
/// Updates are copy-on-write: every mutation helper returns a new selection
/// and leaves `self` untouched, so a failed validation never exposes a
/// half-applied edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    #[serde(rename = "provider")]
    pub provider_id: String,
    #[serde(rename = "variables", default)]
    pub overrides: ValueMap,
}

impl ProviderSelection {
    /// A fresh selection with no overrides.
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            overrides: ValueMap::new(),
        }
    }

    /// The override for `key`, or an empty string when unset.
    pub fn value(&self, key: &str) -> &str {
        self.overrides.get(key).map(String::as_str).unwrap_or("")
    }

    /// Copy of this selection with `key` set to `value`.
    pub fn with_override(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut overrides = self.overrides.clone();
        overrides.insert(key.into(), value.into());
        Self {
            provider_id: self.provider_id.clone(),
            overrides,
        }
    }

    /// Copy of this selection without `key`. Remaining keys keep their order.
    pub fn without_override(&self, key: &str) -> Self {
        let mut overrides = self.overrides.clone();
        overrides.shift_remove(key);
        Self {
            provider_id: self.provider_id.clone(),
            overrides,
        }
    }

    /// Copy of this selection keeping only the keys accepted by `keep`.
    pub fn retain_keys<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        let overrides = self
            .overrides
            .iter()
            .filter(|(key, _)| keep(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            provider_id: self.provider_id.clone(),
            overrides,
        }
    }
}

/// Fully resolved request with no placeholders left, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}
