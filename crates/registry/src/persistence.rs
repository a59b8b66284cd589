//! Shared custom provider persistence helpers.
//!
//! Edits are applied to the in-memory registry first and then saved. When the
//! save fails the registry is restored, so memory and disk never disagree.

use tether_types::ProviderDefinition;
use tether_util::ProviderStore;
use tracing::warn;

use crate::{ProviderRegistry, RegistryError};

/// Builds a registry from the embedded catalog plus the custom providers in `store`.
pub fn load_with_store(store: &dyn ProviderStore) -> Result<ProviderRegistry, RegistryError> {
    let customs = store.load_custom()?;
    Ok(ProviderRegistry::from_embedded_catalog()?.with_custom(customs))
}

/// Inserts or replaces a custom provider and persists the custom list.
pub fn upsert_custom_and_persist(
    registry: &mut ProviderRegistry,
    store: &dyn ProviderStore,
    definition: ProviderDefinition,
) -> Result<(), RegistryError> {
    let snapshot = registry.clone();
    registry.upsert_custom(definition)?;
    if let Err(error) = store.save_custom(registry.custom_providers()) {
        warn!(error = %error, "Saving custom providers failed; restoring previous registry");
        *registry = snapshot;
        return Err(error.into());
    }
    Ok(())
}

/// Removes a custom provider and persists the custom list.
pub fn remove_custom_and_persist(
    registry: &mut ProviderRegistry,
    store: &dyn ProviderStore,
    id: &str,
) -> Result<ProviderDefinition, RegistryError> {
    let snapshot = registry.clone();
    let removed = registry.remove_custom(id)?;
    if let Err(error) = store.save_custom(registry.custom_providers()) {
        warn!(error = %error, "Saving custom providers failed; restoring previous registry");
        *registry = snapshot;
        return Err(error.into());
    }
    Ok(removed)
}
