//! Keeps sensitive override values out of the selection file.
//!
//! [`KeychainSelectionStore`] wraps another [`SelectionStore`]. On save every
//! sensitive value is written to a [`SecretVault`] and replaced in the stored
//! record by a `${secret:NAME}` reference; on load the references are
//! resolved again. The OS keychain backend is [`KeyringVault`].

use std::collections::HashMap;
use std::sync::Mutex;

use tether_types::ProviderSelection;
use tracing::{debug, warn};

use super::{SelectionStore, StoreError};

static SERVICE: &str = "tether";

/// Named secret storage.
pub trait SecretVault: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, name: &str, value: &str) -> Result<(), StoreError>;
    /// Deleting a missing secret is not an error.
    fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Secrets in the OS keychain via `keyring`.
#[derive(Debug, Default)]
pub struct KeyringVault;

impl KeyringVault {
    fn entry(name: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(SERVICE, name).map_err(|error| keychain_error(name, error))
    }
}

impl SecretVault for KeyringVault {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        match Self::entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(keychain_error(name, error)),
        }
    }

    fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        Self::entry(name)?
            .set_password(value)
            .map_err(|error| keychain_error(name, error))?;
        debug!("Stored secret in keychain: {}", name);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        match Self::entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(keychain_error(name, error)),
        }
    }
}

fn keychain_error(name: &str, error: keyring::Error) -> StoreError {
    StoreError::Keychain {
        name: name.to_string(),
        error: error.to_string(),
    }
}

/// Process-local vault primarily used for unit testing.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    secrets: Mutex<HashMap<String, String>>,
}

impl SecretVault for InMemoryVault {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.secrets.lock().expect("vault lock poisoned").get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.secrets
            .lock()
            .expect("vault lock poisoned")
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.secrets.lock().expect("vault lock poisoned").remove(name);
        Ok(())
    }
}

/// Selection store that moves sensitive values into a [`SecretVault`].
pub struct KeychainSelectionStore<S> {
    inner: S,
    vault: Box<dyn SecretVault>,
    sensitive_keys: Vec<String>,
}

impl<S: SelectionStore> KeychainSelectionStore<S> {
    pub fn new(inner: S, vault: Box<dyn SecretVault>, sensitive_keys: Vec<String>) -> Self {
        Self {
            inner,
            vault,
            sensitive_keys,
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive_keys.iter().any(|candidate| candidate == key)
    }

    fn forget_secrets(&self, provider_id: &str, keep: &ProviderSelection) -> Result<(), StoreError> {
        for key in &self.sensitive_keys {
            let kept = keep.provider_id == provider_id
                && keep.overrides.get(key).is_some_and(|value| parse_reference(value).is_some());
            if kept {
                continue;
            }
            self.vault.delete(&secret_name(provider_id, key))?;
        }
        Ok(())
    }
}

impl<S: SelectionStore> SelectionStore for KeychainSelectionStore<S> {
    fn load(&self) -> Result<Option<ProviderSelection>, StoreError> {
        let Some(mut selection) = self.inner.load()? else {
            return Ok(None);
        };
        let mut unresolved = Vec::new();
        for (key, value) in selection.overrides.iter_mut() {
            let Some(name) = parse_reference(value) else {
                continue;
            };
            match self.vault.get(name)? {
                Some(secret) => *value = secret,
                None => {
                    warn!(key = %key, "Secret reference has no keychain entry; dropping it");
                    unresolved.push(key.clone());
                }
            }
        }
        for key in unresolved {
            selection.overrides.shift_remove(&key);
        }
        Ok(Some(selection))
    }

    fn save(&self, selection: &ProviderSelection) -> Result<(), StoreError> {
        let previous = self.inner.load()?;
        let mut stored = selection.clone();
        for (key, value) in stored.overrides.iter_mut() {
            if !self.is_sensitive(key) || value.is_empty() || parse_reference(value).is_some() {
                continue;
            }
            let name = secret_name(&selection.provider_id, key);
            self.vault.set(&name, value)?;
            *value = reference(&name);
        }
        self.inner.save(&stored)?;

        self.forget_secrets(&selection.provider_id, &stored)?;
        if let Some(previous) = previous
            && previous.provider_id != selection.provider_id
        {
            self.forget_secrets(&previous.provider_id, &stored)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let previous = self.inner.load()?;
        self.inner.clear()?;
        if let Some(previous) = previous {
            self.forget_secrets(&previous.provider_id, &ProviderSelection::default())?;
        }
        Ok(())
    }
}

fn secret_name(provider_id: &str, key: &str) -> String {
    format!("{provider_id}-{key}")
}

fn reference(name: &str) -> String {
    format!("${{secret:{name}}}")
}

fn parse_reference(value: &str) -> Option<&str> {
    value.strip_prefix("${secret:")?.strip_suffix('}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemorySelectionStore, JsonSelectionStore};
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Shares one vault between the store under test and the assertions.
    #[derive(Clone, Default)]
    struct SharedVault(Arc<InMemoryVault>);

    impl SecretVault for SharedVault {
        fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
            self.0.get(name)
        }
        fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
            self.0.set(name, value)
        }
        fn delete(&self, name: &str) -> Result<(), StoreError> {
            self.0.delete(name)
        }
    }

    fn keychain_store<S: SelectionStore>(inner: S, vault: &SharedVault) -> KeychainSelectionStore<S> {
        KeychainSelectionStore::new(inner, Box::new(vault.clone()), vec!["api_key".into(), "password".into()])
    }

    #[test]
    fn file_holds_references_and_load_resolves_them() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("selection.json");
        let vault = SharedVault::default();
        let store = keychain_store(JsonSelectionStore::new(&path).unwrap(), &vault);

        let selection = ProviderSelection::new("openai")
            .with_override("api_key", "sk-test-123")
            .with_override("model", "gpt-4o");
        store.save(&selection).unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(!on_disk.contains("sk-test-123"), "file: {on_disk}");
        assert!(on_disk.contains("${secret:openai-api_key}"));
        assert_eq!(vault.get("openai-api_key").unwrap().as_deref(), Some("sk-test-123"));
        assert_eq!(store.load().unwrap(), Some(selection));
    }

    #[test]
    fn removed_and_switched_credentials_leave_the_vault() {
        let vault = SharedVault::default();
        let store = keychain_store(InMemorySelectionStore::new(), &vault);

        store
            .save(&ProviderSelection::new("openai").with_override("api_key", "sk-1"))
            .unwrap();
        store.save(&ProviderSelection::new("openai")).unwrap();
        assert_eq!(vault.get("openai-api_key").unwrap(), None);

        store
            .save(&ProviderSelection::new("openai").with_override("api_key", "sk-2"))
            .unwrap();
        store
            .save(&ProviderSelection::new("claude").with_override("api_key", "sk-ant"))
            .unwrap();
        assert_eq!(vault.get("openai-api_key").unwrap(), None);
        assert_eq!(vault.get("claude-api_key").unwrap().as_deref(), Some("sk-ant"));

        store.clear().unwrap();
        assert_eq!(vault.get("claude-api_key").unwrap(), None);
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn dangling_reference_is_dropped_on_load() {
        let inner = InMemorySelectionStore::with_selection(
            ProviderSelection::new("openai")
                .with_override("api_key", "${secret:openai-api_key}")
                .with_override("model", "gpt-4o"),
        );
        let store = keychain_store(inner, &SharedVault::default());
        let loaded = store.load().unwrap().unwrap();
        assert!(!loaded.overrides.contains_key("api_key"));
        assert_eq!(loaded.value("model"), "gpt-4o");
    }
}
