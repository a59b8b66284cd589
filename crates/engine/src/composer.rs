//! # Request Composer
//!
//! Merges a provider's template with the user's overrides and the
//! dispatch-time runtime values into a [`ResolvedRequest`].
//!
//! Substitution is purely textual and covers the URL, header names and
//! values, and the body. Every occurrence of a placeholder is replaced; a
//! placeholder with no value becomes an empty string, so the result never
//! contains a placeholder that came from the template.

use tether_registry::ProviderRegistry;
use tether_types::{HeaderMap, ProviderSelection, RequestTemplate, ResolvedRequest, ValueMap};
use tether_util::{mask_known_secret, redact_sensitive};
use thiserror::Error;
use tracing::debug;

use crate::classifier::SensitiveKeys;
use crate::parser::{ParseError, parse_description_with, set_header};
use crate::templates::{RuntimePlaceholders, substitute_placeholders};

/// Values the application supplies at dispatch time, keyed by runtime
/// placeholder key (`text`, `image`, `system_prompt`, ...).
pub type RuntimeValues = ValueMap;

/// Errors that stop a request from being composed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("no provider is selected")]
    NoSelection,
    #[error("provider not found: {id}")]
    NotFound { id: String },
    #[error("provider '{provider}' has no usable template: {source}")]
    Parse {
        provider: String,
        #[source]
        source: ParseError,
    },
    /// The credential slot resolved to a blank value; the request must not be sent.
    #[error("credential '{key}' for provider '{provider}' is empty")]
    MissingCredential { provider: String, key: String },
}

/// Composes dispatchable requests from the registry and a selection.
#[derive(Debug, Clone, Default)]
pub struct RequestComposer {
    sensitive_keys: SensitiveKeys,
    runtime: RuntimePlaceholders,
}

impl RequestComposer {
    pub fn new(sensitive_keys: SensitiveKeys, runtime: RuntimePlaceholders) -> Self {
        Self { sensitive_keys, runtime }
    }

    /// Resolve `selection` through the registry and parser, then substitute.
    pub fn compose(
        &self,
        registry: &ProviderRegistry,
        selection: Option<&ProviderSelection>,
        runtime_values: &RuntimeValues,
    ) -> Result<ResolvedRequest, ComposeError> {
        let selection = selection.ok_or(ComposeError::NoSelection)?;
        let definition = registry.get(&selection.provider_id).map_err(|_| ComposeError::NotFound {
            id: selection.provider_id.clone(),
        })?;
        let template = parse_description_with(&definition.description, &self.runtime).map_err(|source| ComposeError::Parse {
            provider: definition.id.clone(),
            source,
        })?;

        if let Some(slot) = self.sensitive_keys.credential_slot(&template.variables)
            && selection.value(&slot.key).trim().is_empty()
        {
            return Err(ComposeError::MissingCredential {
                provider: selection.provider_id.clone(),
                key: slot.key.clone(),
            });
        }

        let resolved = self.resolve_template(&template, selection, runtime_values);
        debug!(
            provider = %selection.provider_id,
            method = %resolved.method,
            url = %self.mask_secrets(selection, &resolved.url),
            "Composed request"
        );
        Ok(resolved)
    }

    /// Substitute placeholders in an already parsed template.
    ///
    /// This performs no credential check. Header names are substituted too;
    /// a name that resolves to blank is dropped, and when two names resolve to
    /// the same header (ignoring case) the later value wins in the earlier
    /// header's position, as with repeated `-H` flags.
    pub fn resolve_template(
        &self,
        template: &RequestTemplate,
        selection: &ProviderSelection,
        runtime_values: &RuntimeValues,
    ) -> ResolvedRequest {
        let resolve = |key: &str| -> Option<String> {
            if self.runtime.contains(key) {
                runtime_values.get(key).cloned()
            } else {
                selection.overrides.get(key).cloned()
            }
        };

        let mut headers = HeaderMap::with_capacity(template.headers.len());
        for (name, value) in &template.headers {
            let name = substitute_placeholders(name, resolve);
            if name.trim().is_empty() {
                continue;
            }
            set_header(&mut headers, &name, substitute_placeholders(value, resolve));
        }

        ResolvedRequest {
            method: template.method.clone(),
            url: substitute_placeholders(&template.url, resolve),
            headers,
            body: template.body.as_deref().map(|body| substitute_placeholders(body, resolve)),
        }
    }

    /// Hide secrets in text derived from `selection`.
    ///
    /// Every sensitive override value is masked wherever it appears, then
    /// anything else that looks like a secret is redacted.
    pub fn mask_secrets(&self, selection: &ProviderSelection, value: &str) -> String {
        let masked = selection
            .overrides
            .iter()
            .filter(|(key, _)| self.sensitive_keys.is_sensitive(key))
            .fold(value.to_string(), |text, (_, secret)| mask_known_secret(&text, secret));
        redact_sensitive(&masked)
    }

    pub fn sensitive_keys(&self) -> &SensitiveKeys {
        &self.sensitive_keys
    }

    pub fn runtime(&self) -> &RuntimePlaceholders {
        &self.runtime
    }
}
