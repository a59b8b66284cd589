use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tether_types::ProviderSelection;
use tracing::{debug, warn};

use super::{StoreError, quarantine_unreadable, write_atomically};

/// Shared trait implemented by selection persistence backends.
pub trait SelectionStore: Send + Sync {
    /// The saved selection, if any.
    fn load(&self) -> Result<Option<ProviderSelection>, StoreError>;

    /// Replace the saved selection.
    fn save(&self, selection: &ProviderSelection) -> Result<(), StoreError>;

    /// Forget the saved selection.
    fn clear(&self) -> Result<(), StoreError>;
}

/// JSON-backed selection store holding a single `{provider, variables}` record.
pub struct JsonSelectionStore {
    path: PathBuf,
    selection: Mutex<Option<ProviderSelection>>,
}

impl JsonSelectionStore {
    /// Open the store at `path`, reading any existing file.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let selection = load_selection_file(&path)?;
        Ok(Self {
            path,
            selection: Mutex::new(selection),
        })
    }

    /// Access the underlying file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save_locked(&self, selection: Option<&ProviderSelection>) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(&selection)?;
        write_atomically(&self.path, &content)
    }
}

impl SelectionStore for JsonSelectionStore {
    fn load(&self) -> Result<Option<ProviderSelection>, StoreError> {
        let selection = self.selection.lock().expect("selection store lock poisoned");
        Ok(selection.clone())
    }

    fn save(&self, selection: &ProviderSelection) -> Result<(), StoreError> {
        let mut cached = self.selection.lock().expect("selection store lock poisoned");
        self.save_locked(Some(selection))?;
        *cached = Some(selection.clone());
        debug!(provider = %selection.provider_id, "Saved provider selection");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut cached = self.selection.lock().expect("selection store lock poisoned");
        self.save_locked(None)?;
        *cached = None;
        Ok(())
    }
}

/// In-memory selection store primarily used for unit testing.
#[derive(Default)]
pub struct InMemorySelectionStore {
    selection: Mutex<Option<ProviderSelection>>,
}

impl InMemorySelectionStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `selection`.
    pub fn with_selection(selection: ProviderSelection) -> Self {
        Self {
            selection: Mutex::new(Some(selection)),
        }
    }
}

impl SelectionStore for InMemorySelectionStore {
    fn load(&self) -> Result<Option<ProviderSelection>, StoreError> {
        let selection = self.selection.lock().expect("selection store lock poisoned");
        Ok(selection.clone())
    }

    fn save(&self, selection: &ProviderSelection) -> Result<(), StoreError> {
        let mut cached = self.selection.lock().expect("selection store lock poisoned");
        *cached = Some(selection.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut cached = self.selection.lock().expect("selection store lock poisoned");
        *cached = None;
        Ok(())
    }
}

fn load_selection_file(path: &Path) -> Result<Option<ProviderSelection>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Option<ProviderSelection>>(&content) {
            Ok(selection) => Ok(selection),
            Err(error) => {
                let backup = quarantine_unreadable(path)?;
                warn!(
                    "Failed to parse selection store at {}: {}; moved it to {}",
                    path.display(),
                    error,
                    backup.display()
                );
                Ok(None)
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(StoreError::Io(error)),
    }
}
