//! # Tether Engine
//!
//! Turns a provider's curl-style description into a structured
//! [`RequestTemplate`](tether_types::RequestTemplate), tracks which provider
//! the user selected and the values they entered for its variables, and
//! composes the final request at dispatch time.
//!
//! ## Usage
//!
//! ```rust
//! use tether_engine::{RuntimeValues, parse_description};
//!
//! let template = parse_description(
//!     r#"curl https://api.example.com/v1 -H "Authorization: Bearer {{API_KEY}}" -d '{"q":"{{TEXT}}"}'"#,
//! )?;
//! assert_eq!(template.method, "POST");
//! assert_eq!(template.slot_keys().collect::<Vec<_>>(), vec!["api_key"]);
//!
//! let mut values = RuntimeValues::new();
//! values.insert("text".into(), "hello".into());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - **`parser`**: curl description to template
//! - **`templates`**: `{{NAME}}` placeholder extraction and substitution
//! - **`classifier`**: credential slot detection
//! - **`selection`**: the active provider and its overrides
//! - **`composer`**: template plus values to a dispatchable request
//! - **`session`**: the above wired to the registry and persistence

pub mod classifier;
pub mod composer;
pub mod parser;
pub mod selection;
pub mod session;
pub mod templates;

pub use classifier::{DEFAULT_SENSITIVE_KEYS, SensitiveKeys};
pub use composer::{ComposeError, RequestComposer, RuntimeValues};
pub use parser::{ParseError, parse_description, parse_description_with};
pub use selection::{Missing, SelectionError, SelectionState};
pub use session::{CUSTOM_PROVIDER_LABEL, EngineSettings, FieldView, ProviderSession, SessionError};
pub use templates::{DEFAULT_RUNTIME_PLACEHOLDERS, RuntimePlaceholders, contains_placeholder, extract_placeholders};
