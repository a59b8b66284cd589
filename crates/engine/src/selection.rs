//! # Variable Store / Selection State
//!
//! [`SelectionState`] is the single mutable piece of the engine: which
//! provider is selected, the template derived from it, and the values the
//! user entered for that template's slots.
//!
//! It is an ordinary owned value rather than a process-wide global, so an
//! application can hold as many independent selections as it needs.
//!
//! Invariants maintained here:
//!
//! - override keys are always a subset of the current template's slot keys;
//! - switching providers always starts from empty overrides;
//! - every edit replaces the override map wholesale after validation, so a
//!   rejected edit leaves the previous state untouched.

use tether_registry::ProviderRegistry;
use tether_types::{ProviderSelection, RequestTemplate, VariableSlot};
use thiserror::Error;
use tracing::{debug, warn};

use crate::classifier::SensitiveKeys;
use crate::parser::parse_description_with;
use crate::templates::RuntimePlaceholders;

/// What a [`SelectionError::NotFound`] failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Provider,
    CredentialSlot,
}

impl Missing {
    fn describe(&self, id: &str) -> String {
        match self {
            Missing::Provider => format!("provider not found: {id}"),
            Missing::CredentialSlot => format!("provider '{id}' has no credential field"),
        }
    }
}

/// Errors surfaced by selection operations. None of them modify state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// An unknown provider, or a template without a credential slot.
    #[error("{}", .missing.describe(.id))]
    NotFound { id: String, missing: Missing },
    #[error("no provider is selected")]
    NoSelection,
    #[error("'{key}' is not a variable of provider '{provider}'")]
    InvalidKey { key: String, provider: String },
    #[error("credential '{key}' must not be empty")]
    MissingCredential { key: String },
}

/// The active provider selection together with its derived template.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    selection: Option<ProviderSelection>,
    template: Option<RequestTemplate>,
    runtime: RuntimePlaceholders,
}

impl SelectionState {
    /// An empty state using the default runtime placeholders.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty state that treats `runtime` placeholders as dispatch-time values.
    pub fn with_runtime(runtime: RuntimePlaceholders) -> Self {
        Self {
            selection: None,
            template: None,
            runtime,
        }
    }

    /// Rebuild state from a persisted selection.
    ///
    /// A selection whose provider no longer exists is dropped, and override
    /// keys the current template does not expose are discarded.
    pub fn restore(&mut self, registry: &ProviderRegistry, saved: ProviderSelection) {
        self.selection = Some(saved);
        self.reconcile(registry);
    }

    /// The active selection, if any.
    pub fn selection(&self) -> Option<&ProviderSelection> {
        self.selection.as_ref()
    }

    /// Id of the selected provider.
    pub fn provider_id(&self) -> Option<&str> {
        self.selection.as_ref().map(|selection| selection.provider_id.as_str())
    }

    /// Template of the selected provider; `None` when nothing is selected or
    /// the provider description does not parse.
    pub fn template(&self) -> Option<&RequestTemplate> {
        self.template.as_ref()
    }

    /// Select a provider, resetting all overrides.
    ///
    /// The template is derived before this returns, so the next edit is
    /// validated against the new provider.
    pub fn select(&mut self, registry: &ProviderRegistry, provider_id: &str) -> Result<&ProviderSelection, SelectionError> {
        let definition = registry.get(provider_id).map_err(|_| SelectionError::NotFound {
            id: provider_id.to_string(),
            missing: Missing::Provider,
        })?;
        self.template = derive_template(&definition.description, provider_id, &self.runtime);
        debug!(provider = provider_id, "Selected provider");
        Ok(&*self.selection.insert(ProviderSelection::new(provider_id)))
    }

    /// Set the value of one template variable.
    pub fn set_override(&mut self, key: &str, value: &str) -> Result<(), SelectionError> {
        let selection = self.selection.as_ref().ok_or(SelectionError::NoSelection)?;
        let known = self.template.as_ref().is_some_and(|template| template.has_slot(key));
        if !known {
            return Err(SelectionError::InvalidKey {
                key: key.to_string(),
                provider: selection.provider_id.clone(),
            });
        }
        let updated = selection.with_override(key, value);
        self.selection = Some(updated);
        debug!(key, "Updated override");
        Ok(())
    }

    /// Remove the value of one variable, leaving the others untouched.
    ///
    /// Clearing a key that has no value is a no-op.
    pub fn clear_override(&mut self, key: &str) -> Result<(), SelectionError> {
        let selection = self.selection.as_ref().ok_or(SelectionError::NoSelection)?;
        if !selection.overrides.contains_key(key) {
            return Ok(());
        }
        let updated = selection.without_override(key);
        self.selection = Some(updated);
        debug!(key, "Cleared override");
        Ok(())
    }

    /// Value entered for `key`, or an empty string.
    ///
    /// Unset and empty are deliberately indistinguishable here.
    pub fn current_value(&self, key: &str) -> &str {
        self.selection.as_ref().map(|selection| selection.value(key)).unwrap_or("")
    }

    /// The credential slot of the current template, if it has one.
    pub fn credential_slot<'a>(&'a self, classifier: &SensitiveKeys) -> Option<&'a VariableSlot> {
        self.template
            .as_ref()
            .and_then(|template| classifier.credential_slot(&template.variables))
    }

    /// Store a value for the credential slot.
    pub fn submit_credential(&mut self, classifier: &SensitiveKeys, value: &str) -> Result<(), SelectionError> {
        let key = self.require_credential_key(classifier)?;
        if value.trim().is_empty() {
            return Err(SelectionError::MissingCredential { key });
        }
        self.set_override(&key, value)
    }

    /// Forget the value of the credential slot.
    pub fn remove_credential(&mut self, classifier: &SensitiveKeys) -> Result<(), SelectionError> {
        let key = self.require_credential_key(classifier)?;
        self.clear_override(&key)
    }

    /// Bring the state back in line with `registry` after providers changed.
    ///
    /// Drops the selection when its provider is gone; otherwise re-derives the
    /// template and prunes overrides to the new slot keys. Returns `true`
    /// when the selection changed.
    pub fn reconcile(&mut self, registry: &ProviderRegistry) -> bool {
        let Some(selection) = self.selection.as_ref() else {
            self.template = None;
            return false;
        };

        let Ok(definition) = registry.get(&selection.provider_id) else {
            debug!(provider = %selection.provider_id, "Selected provider no longer exists; clearing selection");
            self.clear();
            return true;
        };

        let template = derive_template(&definition.description, &definition.id, &self.runtime);
        let pruned = selection.retain_keys(|key| template.as_ref().is_some_and(|template| template.has_slot(key)));
        let changed = pruned != *selection;
        if changed {
            debug!(provider = %pruned.provider_id, "Dropped overrides not exposed by the current template");
        }
        self.selection = Some(pruned);
        self.template = template;
        changed
    }

    /// Forget the selection entirely.
    pub fn clear(&mut self) {
        self.selection = None;
        self.template = None;
    }

    pub fn runtime(&self) -> &RuntimePlaceholders {
        &self.runtime
    }

    fn require_credential_key(&self, classifier: &SensitiveKeys) -> Result<String, SelectionError> {
        let selection = self.selection.as_ref().ok_or(SelectionError::NoSelection)?;
        self.credential_slot(classifier)
            .map(|slot| slot.key.clone())
            .ok_or_else(|| SelectionError::NotFound {
                id: selection.provider_id.clone(),
                missing: Missing::CredentialSlot,
            })
    }
}

fn derive_template(description: &str, provider_id: &str, runtime: &RuntimePlaceholders) -> Option<RequestTemplate> {
    match parse_description_with(description, runtime) {
        Ok(template) => Some(template),
        Err(error) => {
            warn!(provider = provider_id, error = %error, "Provider description does not parse; no template available");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::ProviderDefinition;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(vec![
            ProviderDefinition::builtin(
                "openai",
                r#"curl https://api.openai.com/v1/chat/completions -H "Authorization: Bearer {{API_KEY}}" -d '{"model":"{{MODEL}}","q":"{{TEXT}}"}'"#,
            ),
            ProviderDefinition::builtin("local", "curl http://localhost:8080/{{REGION}}/chat -d '{\"m\":\"{{MODEL}}\"}'"),
            ProviderDefinition::builtin("broken", "curl -d '{unterminated"),
        ])
    }

    fn selected(provider: &str) -> SelectionState {
        let mut state = SelectionState::new();
        state.select(&registry(), provider).unwrap();
        state
    }

    #[test]
    fn select_unknown_provider_fails_without_changing_state() {
        let mut state = selected("openai");
        state.set_override("model", "gpt-4o").unwrap();
        let error = state.select(&registry(), "ghost").unwrap_err();
        assert_eq!(
            error,
            SelectionError::NotFound {
                id: "ghost".into(),
                missing: Missing::Provider
            }
        );
        assert_eq!(state.provider_id(), Some("openai"));
        assert_eq!(state.current_value("model"), "gpt-4o");
    }

    #[test]
    fn select_always_resets_overrides() {
        let registry = registry();
        let mut state = selected("openai");
        state.set_override("model", "gpt-4o").unwrap();
        state.set_override("api_key", "sk-1").unwrap();

        state.select(&registry, "local").unwrap();
        assert!(state.selection().unwrap().overrides.is_empty());
        assert_eq!(state.current_value("model"), "");

        state.set_override("model", "llama").unwrap();
        state.select(&registry, "local").unwrap();
        assert!(state.selection().unwrap().overrides.is_empty());
    }

    #[test]
    fn set_override_rejects_unknown_keys_and_leaves_overrides_unchanged() {
        let mut state = selected("openai");
        state.set_override("model", "gpt-4o").unwrap();
        let before = state.selection().cloned();

        let error = state.set_override("region", "eu").unwrap_err();
        assert!(matches!(error, SelectionError::InvalidKey { .. }));
        assert_eq!(state.selection().cloned(), before);
    }

    #[test]
    fn runtime_placeholders_are_not_overridable() {
        let mut state = selected("openai");
        assert!(matches!(state.set_override("text", "hi"), Err(SelectionError::InvalidKey { .. })));
    }

    #[test]
    fn set_override_without_selection() {
        let mut state = SelectionState::new();
        assert_eq!(state.set_override("model", "x"), Err(SelectionError::NoSelection));
        assert_eq!(state.current_value("model"), "");
    }

    #[test]
    fn clear_override_leaves_other_keys() {
        let mut state = selected("openai");
        state.set_override("model", "gpt-4o").unwrap();
        state.set_override("api_key", "sk-1").unwrap();
        state.clear_override("api_key").unwrap();
        assert_eq!(state.current_value("api_key"), "");
        assert_eq!(state.current_value("model"), "gpt-4o");
        state.clear_override("api_key").unwrap();
    }

    #[test]
    fn unparsable_provider_is_selected_without_template() {
        let mut state = selected("broken");
        assert_eq!(state.provider_id(), Some("broken"));
        assert!(state.template().is_none());
        assert!(matches!(state.set_override("anything", "x"), Err(SelectionError::InvalidKey { .. })));
    }

    #[test]
    fn credential_helpers() {
        let classifier = SensitiveKeys::default();
        let mut state = selected("openai");
        assert_eq!(state.credential_slot(&classifier).unwrap().key, "api_key");

        assert_eq!(
            state.submit_credential(&classifier, "  "),
            Err(SelectionError::MissingCredential { key: "api_key".into() })
        );
        state.submit_credential(&classifier, "sk-test-123").unwrap();
        assert_eq!(state.current_value("api_key"), "sk-test-123");
        state.remove_credential(&classifier).unwrap();
        assert_eq!(state.current_value("api_key"), "");
    }

    #[test]
    fn credential_helpers_without_credential_slot() {
        let classifier = SensitiveKeys::default();
        let mut state = selected("local");
        assert!(matches!(
            state.submit_credential(&classifier, "x"),
            Err(SelectionError::NotFound {
                missing: Missing::CredentialSlot,
                ..
            })
        ));
        let error = state.remove_credential(&classifier).unwrap_err();
        assert_eq!(error.to_string(), "provider 'local' has no credential field");
    }

    #[test]
    fn reconcile_drops_selection_of_removed_provider() {
        let mut registry = registry();
        registry.upsert_custom(ProviderDefinition::custom("mine", "curl https://mine.dev -H 'X-Key: {{API_KEY}}'")).unwrap();
        let mut state = SelectionState::new();
        state.select(&registry, "mine").unwrap();
        state.set_override("api_key", "secret").unwrap();

        registry.remove_custom("mine").unwrap();
        assert!(state.reconcile(&registry));
        assert!(state.selection().is_none());
        assert_eq!(state.current_value("api_key"), "");
    }

    #[test]
    fn reconcile_prunes_keys_after_provider_edit() {
        let mut registry = registry();
        registry.upsert_custom(ProviderDefinition::custom("mine", "curl https://mine.dev/{{A}}/{{B}}")).unwrap();
        let mut state = SelectionState::new();
        state.select(&registry, "mine").unwrap();
        state.set_override("a", "1").unwrap();
        state.set_override("b", "2").unwrap();

        registry.upsert_custom(ProviderDefinition::custom("mine", "curl https://mine.dev/{{A}}")).unwrap();
        assert!(state.reconcile(&registry));
        assert_eq!(state.current_value("a"), "1");
        assert_eq!(state.current_value("b"), "");
        assert!(!state.reconcile(&registry));
    }

    #[test]
    fn restore_discards_stale_keys() {
        let mut state = SelectionState::new();
        let saved = ProviderSelection::new("openai").with_override("model", "gpt").with_override("stale", "x");
        state.restore(&registry(), saved);
        assert_eq!(state.current_value("model"), "gpt");
        assert!(!state.selection().unwrap().overrides.contains_key("stale"));
    }

    #[test]
    fn restore_unknown_provider_yields_no_selection() {
        let mut state = SelectionState::new();
        state.restore(&registry(), ProviderSelection::new("gone").with_override("api_key", "k"));
        assert!(state.selection().is_none());
    }
}
