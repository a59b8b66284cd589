use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tether_types::ProviderDefinition;
use tracing::{debug, warn};

use super::{StoreError, quarantine_unreadable, write_atomically};

/// Shared trait implemented by custom provider persistence backends.
///
/// Only user-created providers are persisted; built-ins ship with the binary.
pub trait ProviderStore: Send + Sync {
    /// Load the custom providers in their saved order.
    fn load_custom(&self) -> Result<Vec<ProviderDefinition>, StoreError>;

    /// Replace the saved custom providers with `providers`.
    fn save_custom(&self, providers: &[ProviderDefinition]) -> Result<(), StoreError>;
}

/// JSON-backed provider store: an ordered array of `{id, curl, isCustom}`.
pub struct JsonProviderStore {
    path: PathBuf,
    providers: Mutex<Vec<ProviderDefinition>>,
}

impl JsonProviderStore {
    /// Open the store at `path`, reading any existing file.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let providers = load_providers_file(&path)?;
        Ok(Self {
            path,
            providers: Mutex::new(providers),
        })
    }

    /// Access the underlying file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProviderStore for JsonProviderStore {
    fn load_custom(&self) -> Result<Vec<ProviderDefinition>, StoreError> {
        let providers = self.providers.lock().expect("provider store lock poisoned");
        Ok(providers.clone())
    }

    fn save_custom(&self, providers: &[ProviderDefinition]) -> Result<(), StoreError> {
        let mut cached = self.providers.lock().expect("provider store lock poisoned");
        let content = serde_json::to_vec_pretty(providers)?;
        write_atomically(&self.path, &content)?;
        *cached = providers.to_vec();
        debug!(path = %self.path.display(), count = providers.len(), "Saved custom providers");
        Ok(())
    }
}

/// In-memory provider store primarily used for unit testing.
#[derive(Default)]
pub struct InMemoryProviderStore {
    providers: Mutex<Vec<ProviderDefinition>>,
}

impl InMemoryProviderStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `providers`.
    pub fn with_providers(providers: Vec<ProviderDefinition>) -> Self {
        Self {
            providers: Mutex::new(providers),
        }
    }
}

impl ProviderStore for InMemoryProviderStore {
    fn load_custom(&self) -> Result<Vec<ProviderDefinition>, StoreError> {
        let providers = self.providers.lock().expect("provider store lock poisoned");
        Ok(providers.clone())
    }

    fn save_custom(&self, providers: &[ProviderDefinition]) -> Result<(), StoreError> {
        let mut cached = self.providers.lock().expect("provider store lock poisoned");
        *cached = providers.to_vec();
        Ok(())
    }
}

fn load_providers_file(path: &Path) -> Result<Vec<ProviderDefinition>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Vec<ProviderDefinition>>(&content) {
            Ok(providers) => Ok(providers
                .into_iter()
                .filter(|provider| {
                    if !provider.is_custom {
                        warn!(id = %provider.id, "Ignoring non-custom provider record in provider store");
                    }
                    provider.is_custom
                })
                .collect()),
            Err(error) => {
                let backup = quarantine_unreadable(path)?;
                warn!(
                    "Failed to parse provider store at {}: {}; moved it to {}",
                    path.display(),
                    error,
                    backup.display()
                );
                Ok(Vec::new())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(StoreError::Io(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_store_persists_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("providers.json");
        let store = JsonProviderStore::new(&path).unwrap();
        assert!(store.load_custom().unwrap().is_empty());

        let providers = vec![
            ProviderDefinition::custom("zeta", "curl https://z.example"),
            ProviderDefinition::custom("alpha", "curl https://a.example"),
        ];
        store.save_custom(&providers).unwrap();
        drop(store);

        let reloaded = JsonProviderStore::new(&path).unwrap();
        assert_eq!(reloaded.load_custom().unwrap(), providers);
    }

    #[test]
    fn json_store_skips_builtin_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("providers.json");
        fs::write(
            &path,
            r#"[{"id":"openai","curl":"curl x","isCustom":false},{"id":"mine","curl":"curl y","isCustom":true}]"#,
        )
        .unwrap();

        let store = JsonProviderStore::new(&path).unwrap();
        let ids: Vec<_> = store.load_custom().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["mine"]);
    }

    #[test]
    fn invalid_json_returns_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("providers.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonProviderStore::new(&path).unwrap();
        assert!(store.load_custom().unwrap().is_empty());
    }

    #[test]
    fn unreadable_file_is_kept_aside_before_saving() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("providers.json");
        let hand_edited = r#"[{"id":"a","curl":"curl https://a.example","isCustom":true},]"#;
        fs::write(&path, hand_edited).unwrap();

        let store = JsonProviderStore::new(&path).unwrap();
        store.save_custom(&[ProviderDefinition::custom("b", "curl https://b.example")]).unwrap();

        let backup = dir.path().join("providers.json.bak");
        assert_eq!(fs::read_to_string(backup).unwrap(), hand_edited);
        let reopened = JsonProviderStore::new(&path).unwrap();
        let ids: Vec<_> = reopened.load_custom().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("providers.json");
        let store = JsonProviderStore::new(&path).unwrap();
        store.save_custom(&[ProviderDefinition::custom("a", "curl https://a.example")]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn in_memory_store_round_trip() {
        let store = InMemoryProviderStore::new();
        store.save_custom(&[ProviderDefinition::custom("a", "curl https://a.example")]).unwrap();
        assert_eq!(store.load_custom().unwrap().len(), 1);
    }
}
