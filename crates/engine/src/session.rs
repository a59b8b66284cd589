//! # Provider Session
//!
//! [`ProviderSession`] is the explicit context object a UI talks to. It owns
//! the registry, the selection state, the composer, and the two persistence
//! collaborators, and exposes one method per inbound UI event:
//!
//! | UI event            | method                                   |
//! |---------------------|------------------------------------------|
//! | select provider     | [`select_provider`](ProviderSession::select_provider) |
//! | edit override       | [`set_override`](ProviderSession::set_override) |
//! | submit credential   | [`submit_credential`](ProviderSession::submit_credential) |
//! | remove credential   | [`remove_credential`](ProviderSession::remove_credential) |
//!
//! Every state change is persisted before the method returns. When a save
//! fails the in-memory state is rolled back, so memory and storage agree.
//! Custom provider edits save the reconciled selection first and the provider
//! list second; if the second save fails the stored selection is put back.

use tether_registry::{
    ProviderRegistry, RegistryError, load_with_store, remove_custom_and_persist, upsert_custom_and_persist,
};
use tether_types::{ProviderDefinition, ProviderSelection, RequestTemplate, ResolvedRequest, VariableSlot};
use tether_util::{ProviderStore, SelectionStore, StoreError, TetherConfig, field_title, mask_secret, redact_sensitive};
use thiserror::Error;
use tracing::{info, warn};

use crate::classifier::SensitiveKeys;
use crate::composer::{ComposeError, RequestComposer, RuntimeValues};
use crate::parser::parse_description_with;
use crate::selection::{SelectionError, SelectionState};
use crate::templates::RuntimePlaceholders;

/// Label shown for a custom provider whose description does not parse.
pub const CUSTOM_PROVIDER_LABEL: &str = "Custom Provider";

/// Classification and placeholder settings shared by the engine components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub sensitive_keys: SensitiveKeys,
    pub runtime: RuntimePlaceholders,
}

impl EngineSettings {
    /// Settings from a user config, falling back to the defaults per field.
    pub fn from_config(config: &TetherConfig) -> Self {
        let sensitive_keys = config
            .sensitive_keys
            .as_ref()
            .map(|keys| SensitiveKeys::new(keys.iter().cloned()))
            .unwrap_or_default();
        let runtime = config
            .runtime_placeholders
            .as_ref()
            .map(|names| RuntimePlaceholders::new(names.iter()))
            .unwrap_or_default();
        Self { sensitive_keys, runtime }
    }
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Render-ready description of one template variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub key: String,
    /// Placeholder name as written, e.g. `API_KEY`.
    pub label: String,
    /// Human-readable title, e.g. `Api Key`.
    pub title: String,
    /// Value for display; masked when the field is sensitive.
    pub display_value: String,
    pub is_set: bool,
    pub is_credential: bool,
    pub is_sensitive: bool,
}

/// The registry, the active selection, and their persistence.
pub struct ProviderSession {
    registry: ProviderRegistry,
    state: SelectionState,
    composer: RequestComposer,
    settings: EngineSettings,
    provider_store: Box<dyn ProviderStore>,
    selection_store: Box<dyn SelectionStore>,
}

impl ProviderSession {
    /// Open a session over the embedded catalog plus the stored custom
    /// providers, restoring the stored selection.
    pub fn open(
        settings: EngineSettings,
        provider_store: Box<dyn ProviderStore>,
        selection_store: Box<dyn SelectionStore>,
    ) -> Result<Self, SessionError> {
        let registry = load_with_store(provider_store.as_ref())?;
        Self::with_registry(registry, settings, provider_store, selection_store)
    }

    /// Open a session over an explicit registry.
    ///
    /// A stored selection that refers to a missing provider or carries keys
    /// the template no longer exposes is repaired and saved back.
    pub fn with_registry(
        registry: ProviderRegistry,
        settings: EngineSettings,
        provider_store: Box<dyn ProviderStore>,
        selection_store: Box<dyn SelectionStore>,
    ) -> Result<Self, SessionError> {
        let mut state = SelectionState::with_runtime(settings.runtime.clone());
        let saved = selection_store.load()?;
        if let Some(saved) = saved.clone() {
            state.restore(&registry, saved);
        }

        let session = Self {
            registry,
            state,
            composer: RequestComposer::new(settings.sensitive_keys.clone(), settings.runtime.clone()),
            settings,
            provider_store,
            selection_store,
        };

        if saved.as_ref() != session.state.selection() {
            warn!("Stored selection was stale and has been repaired");
            session.save_selection()?;
        }
        Ok(session)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// All providers in listing order.
    pub fn providers(&self) -> impl Iterator<Item = &ProviderDefinition> {
        self.registry.list()
    }

    /// Name to show for a provider: the id for built-ins, the target URL for
    /// custom providers.
    pub fn display_name(&self, definition: &ProviderDefinition) -> String {
        if !definition.is_custom {
            return definition.id.clone();
        }
        parse_description_with(&definition.description, &self.settings.runtime)
            .map(|template| template.url)
            .unwrap_or_else(|_| CUSTOM_PROVIDER_LABEL.to_string())
    }

    pub fn selection(&self) -> Option<&ProviderSelection> {
        self.state.selection()
    }

    /// Template of the selected provider, when it has one.
    pub fn template(&self) -> Option<&RequestTemplate> {
        self.state.template()
    }

    pub fn credential_slot(&self) -> Option<&VariableSlot> {
        self.state.credential_slot(&self.settings.sensitive_keys)
    }

    /// Value entered for `key`, or an empty string.
    pub fn current_value(&self, key: &str) -> &str {
        self.state.current_value(key)
    }

    /// Render-ready fields, credential first, then the rest in declaration order.
    pub fn fields(&self) -> Vec<FieldView> {
        let Some(template) = self.state.template() else {
            return Vec::new();
        };
        let credential_key = self.credential_slot().map(|slot| slot.key.clone());

        let mut fields: Vec<FieldView> = template
            .variables
            .iter()
            .map(|slot| {
                let is_credential = credential_key.as_deref() == Some(slot.key.as_str());
                let is_sensitive = is_credential || self.settings.sensitive_keys.is_sensitive(&slot.key);
                let value = self.state.current_value(&slot.key);
                FieldView {
                    key: slot.key.clone(),
                    label: slot.label.clone(),
                    title: field_title(&slot.key),
                    display_value: if is_sensitive { mask_secret(value) } else { value.to_string() },
                    is_set: !value.trim().is_empty(),
                    is_credential,
                    is_sensitive,
                }
            })
            .collect();
        fields.sort_by_key(|field| !field.is_credential);
        fields
    }

    pub fn select_provider(&mut self, provider_id: &str) -> Result<(), SessionError> {
        let previous = self.state.clone();
        self.state.select(&self.registry, provider_id)?;
        self.commit(previous)?;
        info!(provider = provider_id, "Provider selected");
        Ok(())
    }

    pub fn set_override(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        let previous = self.state.clone();
        self.state.set_override(key, value)?;
        self.commit(previous)
    }

    pub fn clear_override(&mut self, key: &str) -> Result<(), SessionError> {
        let previous = self.state.clone();
        self.state.clear_override(key)?;
        self.commit(previous)
    }

    pub fn submit_credential(&mut self, value: &str) -> Result<(), SessionError> {
        let previous = self.state.clone();
        self.state.submit_credential(&self.settings.sensitive_keys, value)?;
        self.commit(previous)
    }

    pub fn remove_credential(&mut self) -> Result<(), SessionError> {
        let previous = self.state.clone();
        self.state.remove_credential(&self.settings.sensitive_keys)?;
        self.commit(previous)
    }

    /// Add or replace a custom provider.
    ///
    /// When the replaced provider is the selected one its template is
    /// re-derived and overrides for vanished variables are dropped.
    pub fn upsert_custom_provider(&mut self, definition: ProviderDefinition) -> Result<(), SessionError> {
        let id = definition.id.clone();
        let mut next = self.registry.clone();
        next.upsert_custom(definition.clone())?;
        let staged = self.stage_selection(&next)?;
        let persisted = upsert_custom_and_persist(&mut self.registry, self.provider_store.as_ref(), definition);
        self.finish_registry_change(staged, persisted)?;
        info!(provider = %id, "Custom provider saved");
        Ok(())
    }

    /// Remove a custom provider. Removing the selected provider clears the selection.
    pub fn remove_custom_provider(&mut self, provider_id: &str) -> Result<ProviderDefinition, SessionError> {
        let mut next = self.registry.clone();
        next.remove_custom(provider_id)?;
        let staged = self.stage_selection(&next)?;
        let persisted = remove_custom_and_persist(&mut self.registry, self.provider_store.as_ref(), provider_id);
        let removed = self.finish_registry_change(staged, persisted)?;
        info!(provider = provider_id, "Custom provider removed");
        Ok(removed)
    }

    /// Compose the dispatchable request for the current selection.
    pub fn compose(&self, runtime_values: &RuntimeValues) -> Result<ResolvedRequest, SessionError> {
        Ok(self.composer.compose(&self.registry, self.state.selection(), runtime_values)?)
    }

    /// Hide the selection's secrets in `value`, e.g. a composed request part.
    pub fn mask_secrets(&self, value: &str) -> String {
        match self.state.selection() {
            Some(selection) => self.composer.mask_secrets(selection, value),
            None => redact_sensitive(value),
        }
    }

    /// Reconcile a copy of the selection against `next` and save it when it
    /// changed. Runs before the registry is saved, so a failure here leaves
    /// both stores and memory untouched.
    fn stage_selection(&self, next: &ProviderRegistry) -> Result<Option<SelectionState>, SessionError> {
        let mut staged = self.state.clone();
        if !staged.reconcile(next) {
            return Ok(None);
        }
        self.write_selection(staged.selection())?;
        Ok(Some(staged))
    }

    fn finish_registry_change<T>(
        &mut self,
        staged: Option<SelectionState>,
        persisted: Result<T, RegistryError>,
    ) -> Result<T, SessionError> {
        match persisted {
            Ok(value) => {
                if let Some(state) = staged {
                    self.state = state;
                }
                Ok(value)
            }
            Err(error) => {
                if staged.is_some()
                    && let Err(restore_error) = self.save_selection()
                {
                    warn!(error = %restore_error, "Restoring stored selection failed; it is repaired on next open");
                }
                Err(error.into())
            }
        }
    }

    fn commit(&mut self, previous: SelectionState) -> Result<(), SessionError> {
        if let Err(error) = self.save_selection() {
            warn!(error = %error, "Saving selection failed; restoring previous state");
            self.state = previous;
            return Err(error.into());
        }
        Ok(())
    }

    fn save_selection(&self) -> Result<(), StoreError> {
        self.write_selection(self.state.selection())
    }

    fn write_selection(&self, selection: Option<&ProviderSelection>) -> Result<(), StoreError> {
        match selection {
            Some(selection) => self.selection_store.save(selection),
            None => self.selection_store.clear(),
        }
    }
}
