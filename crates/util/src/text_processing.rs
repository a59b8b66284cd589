//! # Text Processing Utilities
//!
//! Redaction of secret-looking values in free text, masking of known secret
//! values for display, and human-readable titles for variable keys.

use heck::ToTitleCase;
use once_cell::sync::Lazy;
use regex::Regex;

/// Character used when masking a secret for display.
pub const MASK_CHARACTER: char = '•';

/// Number of mask characters shown regardless of the secret's length.
const MASK_WIDTH: usize = 10;

/// Redacts values that look like secrets in a string.
///
/// Scans for authorization headers, bearer/basic credentials and
/// `key=value` / `"key": "value"` assignments whose key names suggest a
/// secret. Matching values are replaced with `[REDACTED]` while the key names
/// are preserved for debugging.
///
/// # Example
/// ```rust
/// use tether_util::text_processing::redact_sensitive;
///
/// let redacted = redact_sensitive("Authorization: Bearer sk-live-123");
/// assert_eq!(redacted, "Authorization: [REDACTED]");
///
/// let redacted = redact_sensitive(r#"{"api_key": "abc", "model": "gpt"}"#);
/// assert_eq!(redacted, r#"{"api_key": "[REDACTED]", "model": "gpt"}"#);
/// ```
pub fn redact_sensitive(input: &str) -> String {
    redact_sensitive_with(input, "[REDACTED]")
}

/// Redacts sensitive-looking values, using a custom replacement token.
pub fn redact_sensitive_with(input: &str, replacement: &str) -> String {
    let mut redacted = input.to_string();

    for pattern in get_redact_patterns().iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                let suffix = captures.get(3).map(|m| m.as_str()).unwrap_or("");
                format!("{}{}{}", prefix, replacement, suffix)
            })
            .to_string();
    }

    redacted
}

/// Replace every occurrence of a known secret value with a mask.
///
/// Unlike [`redact_sensitive`], which guesses from the shape of the text,
/// this masks an exact value that is already known to be secret (such as the
/// value entered into a credential slot). Blank secrets are ignored.
pub fn mask_known_secret(input: &str, secret: &str) -> String {
    if secret.trim().is_empty() {
        return input.to_string();
    }
    input.replace(secret, &mask_secret(secret))
}

/// Masked rendition of a secret for display.
///
/// The output has a fixed width so the length of the secret is not revealed.
/// An empty value stays empty so "not set" remains distinguishable in a UI.
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    std::iter::repeat_n(MASK_CHARACTER, MASK_WIDTH).collect()
}

/// Human-readable title for a variable key, e.g. `api_key` → `Api Key`.
pub fn field_title(key: &str) -> String {
    key.to_title_case()
}

/// Returns the compiled redaction patterns.
///
/// Capture group 1 is kept as a prefix, group 2 is the secret value, and the
/// optional group 3 is kept as a suffix.
pub fn get_redact_patterns() -> &'static Vec<Regex> {
    static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_redact_patterns);

    &REDACT_PATTERNS
}

fn build_redact_patterns() -> Vec<Regex> {
    let mut patterns = Vec::new();

    patterns.extend(build_authorization_patterns());
    patterns.extend(build_assignment_patterns());

    patterns
}

/// Captures authorization headers and inline bearer/basic credentials.
fn build_authorization_patterns() -> Vec<Regex> {
    vec![
        Regex::new(r"(?i)(authorization:\s*)([^\r\n]+)()").unwrap(),
        Regex::new(r"(?i)((?:x-api-key|api-key|x-goog-api-key):\s*)([^\r\n]+)()").unwrap(),
        Regex::new(r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)()").unwrap(),
    ]
}

/// Detects `key=value` and `"key": "value"` assignments with secret-looking keys.
fn build_assignment_patterns() -> Vec<Regex> {
    const KEYWORDS: &str = "api[_-]?key|api[_-]?token|access[_-]?token|auth[_-]?token|client[_-]?secret|secret|token|password|license[_-]?key";

    vec![
        Regex::new(&format!(r#"(?i)("[A-Za-z0-9_.-]*?(?:{KEYWORDS})[A-Za-z0-9_.-]*"\s*:\s*")([^"]*)(")"#)).unwrap(),
        Regex::new(&format!(r"(?i)([?&]?[A-Za-z0-9_]*?(?:{KEYWORDS})[A-Za-z0-9_]*=)([^\s&]+)()")).unwrap(),
        Regex::new(r"(?i)([?&]key=)([^\s&#]+)()").unwrap(),
    ]
}
