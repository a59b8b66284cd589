//! Utility layer shared by the Tether crates: shell lexing, redaction,
//! configuration, and the persistence collaborators.

pub mod config;
pub mod shell_lexing;
pub mod store;
pub mod text_processing;

pub use config::{SecretsBackend, TetherConfig, expand_tilde};
pub use shell_lexing::{LexError, split_shell_words};
pub use store::{
    InMemoryProviderStore, InMemorySelectionStore, InMemoryVault, JsonProviderStore, JsonSelectionStore, KeychainSelectionStore,
    KeyringVault, ProviderStore, SecretVault, SelectionStore, StoreError,
};
pub use text_processing::{field_title, mask_known_secret, mask_secret, redact_sensitive};
