use tether_types::ProviderDefinition;
use thiserror::Error;
use tracing::{debug, warn};

use crate::BUILTIN_CATALOG_JSON;

/// Errors surfaced by registry lookups and edits.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No provider with this id, or (for removal) the id names a built-in.
    #[error("provider not found: {id}")]
    NotFound { id: String },
    /// A custom provider tried to take an id owned by a built-in.
    #[error("provider '{id}' is built in and cannot be replaced")]
    BuiltinReadOnly { id: String },
    /// The embedded catalog could not be parsed.
    #[error("invalid built-in provider catalog: {0}")]
    Catalog(#[from] serde_json::Error),
    /// Persisting custom providers failed; the registry was left unchanged.
    #[error("failed to save custom providers: {0}")]
    Store(#[from] tether_util::StoreError),
}

/// All providers available for selection.
///
/// Listing order is fixed: built-ins in catalog order, then custom providers
/// in the order they were first added. Ids are unique across both groups.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    builtins: Vec<ProviderDefinition>,
    customs: Vec<ProviderDefinition>,
}

impl ProviderRegistry {
    /// Creates a registry holding the given built-ins and no custom providers.
    ///
    /// Every definition is marked as built-in. A repeated id keeps its first
    /// occurrence.
    pub fn new(builtins: Vec<ProviderDefinition>) -> Self {
        let mut unique: Vec<ProviderDefinition> = Vec::with_capacity(builtins.len());
        for mut definition in builtins {
            if unique.iter().any(|existing| existing.id == definition.id) {
                warn!(id = %definition.id, "Duplicate built-in provider id ignored");
                continue;
            }
            definition.is_custom = false;
            unique.push(definition);
        }
        Self {
            builtins: unique,
            customs: Vec::new(),
        }
    }

    /// Creates a registry from the catalog embedded at compile time.
    pub fn from_embedded_catalog() -> Result<Self, RegistryError> {
        Self::from_catalog_str(BUILTIN_CATALOG_JSON)
    }

    /// Creates a registry from a JSON array of `{id, curl}` records.
    pub fn from_catalog_str(catalog: &str) -> Result<Self, RegistryError> {
        let builtins: Vec<ProviderDefinition> = serde_json::from_str(catalog)?;
        debug!(count = builtins.len(), "Loaded built-in provider catalog");
        Ok(Self::new(builtins))
    }

    /// Adds previously persisted custom providers.
    ///
    /// Records colliding with a built-in are skipped; a repeated custom id
    /// replaces the earlier record, the same as [`upsert_custom`](Self::upsert_custom).
    pub fn with_custom(mut self, customs: Vec<ProviderDefinition>) -> Self {
        for definition in customs {
            if let Err(error) = self.upsert_custom(definition) {
                warn!(error = %error, "Skipping persisted custom provider");
            }
        }
        self
    }

    /// All providers in listing order.
    pub fn list(&self) -> impl Iterator<Item = &ProviderDefinition> {
        self.builtins.iter().chain(self.customs.iter())
    }

    /// Number of providers, built-in and custom.
    pub fn len(&self) -> usize {
        self.builtins.len() + self.customs.len()
    }

    /// Returns `true` when the registry holds no providers at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Custom providers in insertion order.
    pub fn custom_providers(&self) -> &[ProviderDefinition] {
        &self.customs
    }

    /// Look up a provider by id.
    pub fn get(&self, id: &str) -> Result<&ProviderDefinition, RegistryError> {
        self.list()
            .find(|definition| definition.id == id)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    /// Returns `true` when a provider with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_ok()
    }

    /// Replace the custom provider with the same id, or append a new one.
    ///
    /// The stored definition is always marked custom. An id that belongs to a
    /// built-in is rejected.
    pub fn upsert_custom(&mut self, mut definition: ProviderDefinition) -> Result<(), RegistryError> {
        if self.builtins.iter().any(|builtin| builtin.id == definition.id) {
            return Err(RegistryError::BuiltinReadOnly { id: definition.id });
        }
        definition.is_custom = true;
        match self.customs.iter_mut().find(|existing| existing.id == definition.id) {
            Some(existing) => {
                debug!(id = %definition.id, "Replacing custom provider");
                *existing = definition;
            }
            None => {
                debug!(id = %definition.id, "Adding custom provider");
                self.customs.push(definition);
            }
        }
        Ok(())
    }

    /// Remove a custom provider, returning it.
    ///
    /// Built-ins are never removable and report `NotFound`, as do unknown ids.
    pub fn remove_custom(&mut self, id: &str) -> Result<ProviderDefinition, RegistryError> {
        let Some(index) = self.customs.iter().position(|definition| definition.id == id) else {
            return Err(RegistryError::NotFound { id: id.to_string() });
        };
        debug!(id, "Removing custom provider");
        Ok(self.customs.remove(index))
    }
}
