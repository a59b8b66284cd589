//! Provider registry for Tether.
//!
//! This crate owns the set of provider definitions the user can choose from:
//! the built-in catalog embedded at compile time followed by user-created
//! custom providers, which are persisted through a
//! [`ProviderStore`](tether_util::ProviderStore).

pub mod models;
pub mod persistence;

pub use models::{ProviderRegistry, RegistryError};
pub use persistence::{load_with_store, remove_custom_and_persist, upsert_custom_and_persist};
pub use tether_types::ProviderDefinition;

/// Raw JSON of the built-in provider catalog.
pub const BUILTIN_CATALOG_JSON: &str = include_str!("../catalog/builtin_providers.json");
