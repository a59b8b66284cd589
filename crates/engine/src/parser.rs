//! # Command Parser
//!
//! Turns a pasted `curl` command into a [`RequestTemplate`].
//!
//! Parsing is pure: no files are read, nothing is logged, and identical input
//! always produces an identical template. Only the parts of `curl` that shape
//! the request are interpreted; transport options (timeouts, proxies, output
//! files) are accepted and skipped.
//!
//! ```rust
//! use tether_engine::parser::parse_description;
//!
//! let template = parse_description(
//!     r#"curl https://api.example.com/v1/chat -H "Authorization: Bearer {{API_KEY}}" -d '{"model": "{{MODEL}}"}'"#,
//! )
//! .unwrap();
//! assert_eq!(template.method, "POST");
//! assert_eq!(template.headers["Authorization"], "Bearer {{API_KEY}}");
//! let keys: Vec<_> = template.slot_keys().collect();
//! assert_eq!(keys, vec!["api_key", "model"]);
//! ```

use tether_types::{HeaderMap, RequestTemplate};
use tether_util::{LexError, split_shell_words};
use thiserror::Error;

use crate::templates::{RuntimePlaceholders, collect_slots, mask_placeholders};

/// Errors produced when a description cannot be turned into a template.
///
/// A failed parse means "no template available"; callers are expected to
/// degrade (for example, render nothing) rather than abort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("request description is empty")]
    Empty,
    #[error("unterminated {quote} quote at byte {position}")]
    UnterminatedQuote { quote: char, position: usize },
    #[error("option {flag} requires a value")]
    MissingValue { flag: String },
    #[error("request description has no URL")]
    MissingUrl,
    #[error("malformed header '{header}': expected 'Name: value'")]
    MalformedHeader { header: String },
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        match error {
            LexError::UnterminatedQuote { quote, position } => ParseError::UnterminatedQuote { quote, position },
        }
    }
}

/// Parse a description using the default runtime placeholders.
pub fn parse_description(input: &str) -> Result<RequestTemplate, ParseError> {
    parse_description_with(input, &RuntimePlaceholders::default())
}

/// Parse a description, excluding `runtime` placeholders from the slots.
pub fn parse_description_with(input: &str, runtime: &RuntimePlaceholders) -> Result<RequestTemplate, ParseError> {
    let words = split_shell_words(input)?;
    let mut words = words.into_iter().peekable();
    if words.peek().is_none() {
        return Err(ParseError::Empty);
    }
    if words.peek().is_some_and(|word| word == "curl") {
        words.next();
    }

    let mut request = RequestParts::default();
    while let Some(word) = words.next() {
        if let Some(long_name) = word.strip_prefix("--").filter(|name| !name.is_empty()) {
            let option = long_option(long_name);
            let value = if option.takes_value() {
                Some(words.next().ok_or_else(|| ParseError::MissingValue { flag: word.clone() })?)
            } else {
                None
            };
            request.apply(option, value)?;
        } else if let Some(short_flags) = word.strip_prefix('-').filter(|flags| !flags.is_empty()) {
            apply_short_flags(&mut request, short_flags, &mut words)?;
        } else if request.url.is_none() {
            request.url = Some(word);
        }
    }

    request.finish(runtime)
}

/// What a recognised `curl` option does to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CurlOption {
    Method,
    Header,
    Data,
    Json,
    Url,
    UserAgent,
    Referer,
    Cookie,
    BearerToken,
    Get,
    Head,
    /// Known option whose value does not affect the request shape.
    SkipValue,
    /// Boolean option or unknown option; skipped on its own.
    Skip,
}

impl CurlOption {
    fn takes_value(self) -> bool {
        !matches!(self, CurlOption::Get | CurlOption::Head | CurlOption::Skip)
    }
}

fn long_option(name: &str) -> CurlOption {
    match name {
        "request" => CurlOption::Method,
        "header" => CurlOption::Header,
        "data" | "data-raw" | "data-binary" | "data-ascii" | "data-urlencode" => CurlOption::Data,
        "json" => CurlOption::Json,
        "url" => CurlOption::Url,
        "user-agent" => CurlOption::UserAgent,
        "referer" => CurlOption::Referer,
        "cookie" => CurlOption::Cookie,
        "oauth2-bearer" => CurlOption::BearerToken,
        "get" => CurlOption::Get,
        "head" => CurlOption::Head,
        "user" | "output" | "max-time" | "connect-timeout" | "write-out" | "proxy" | "cert" | "key" | "cacert" | "capath"
        | "retry" | "retry-delay" | "retry-max-time" | "limit-rate" | "form" | "form-string" | "upload-file" | "range"
        | "cookie-jar" | "config" | "resolve" | "interface" | "max-redirs" | "dump-header" | "trace" | "trace-ascii"
        | "stderr" | "proxy-user" | "keepalive-time" | "expect100-timeout" => CurlOption::SkipValue,
        _ => CurlOption::Skip,
    }
}

fn short_option(flag: char) -> CurlOption {
    match flag {
        'X' => CurlOption::Method,
        'H' => CurlOption::Header,
        'd' => CurlOption::Data,
        'A' => CurlOption::UserAgent,
        'e' => CurlOption::Referer,
        'b' => CurlOption::Cookie,
        'G' => CurlOption::Get,
        'I' => CurlOption::Head,
        'u' | 'o' | 'm' | 'w' | 'x' | 'E' | 'T' | 'F' | 'r' | 'c' | 'K' | 'y' | 'Y' | 'z' | 'U' | 'P' | 'Q' | 't' | 'D' => {
            CurlOption::SkipValue
        }
        _ => CurlOption::Skip,
    }
}

/// Applies a cluster of short flags such as `-sSL`, `-XPOST`, or `-H value`.
///
/// The first flag that takes a value consumes the rest of the word, or the
/// next word when nothing follows it.
fn apply_short_flags<I>(request: &mut RequestParts, flags: &str, words: &mut I) -> Result<(), ParseError>
where
    I: Iterator<Item = String>,
{
    for (index, flag) in flags.char_indices() {
        let option = short_option(flag);
        if !option.takes_value() {
            request.apply(option, None)?;
            continue;
        }
        let attached = &flags[index + flag.len_utf8()..];
        let value = if attached.is_empty() {
            words.next().ok_or_else(|| ParseError::MissingValue { flag: format!("-{flag}") })?
        } else {
            attached.to_string()
        };
        return request.apply(option, Some(value));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct RequestParts {
    method: Option<String>,
    url: Option<String>,
    headers: HeaderMap,
    data: Vec<String>,
    json: bool,
    get: bool,
    head: bool,
}

impl RequestParts {
    fn apply(&mut self, option: CurlOption, value: Option<String>) -> Result<(), ParseError> {
        let value = value.unwrap_or_default();
        match option {
            CurlOption::Method => self.method = Some(value.trim().to_uppercase()),
            CurlOption::Header => self.apply_header(&value)?,
            CurlOption::Data => self.data.push(value),
            CurlOption::Json => {
                self.json = true;
                self.data.push(value);
            }
            CurlOption::Url => {
                if self.url.is_none() {
                    self.url = Some(value);
                }
            }
            CurlOption::UserAgent => set_header(&mut self.headers, "User-Agent", value),
            CurlOption::Referer => set_header(&mut self.headers, "Referer", value),
            CurlOption::Cookie => set_header(&mut self.headers, "Cookie", value),
            CurlOption::BearerToken => set_header(&mut self.headers, "Authorization", format!("Bearer {value}")),
            CurlOption::Get => self.get = true,
            CurlOption::Head => self.head = true,
            CurlOption::SkipValue | CurlOption::Skip => {}
        }
        Ok(())
    }

    /// `Name: value` sets a header, `Name;` sets it to an empty value, and
    /// `Name:` with nothing after the colon removes it (curl semantics).
    fn apply_header(&mut self, raw: &str) -> Result<(), ParseError> {
        let malformed = || ParseError::MalformedHeader { header: raw.to_string() };

        if let Some((name, value)) = raw.split_once(':') {
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(malformed());
            }
            let value = value.trim();
            if value.is_empty() {
                remove_header(&mut self.headers, name);
            } else {
                set_header(&mut self.headers, name, value.to_string());
            }
            return Ok(());
        }

        if let Some(name) = raw.trim().strip_suffix(';') {
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(malformed());
            }
            set_header(&mut self.headers, name, String::new());
            return Ok(());
        }

        Err(malformed())
    }

    fn finish(mut self, runtime: &RuntimePlaceholders) -> Result<RequestTemplate, ParseError> {
        let raw_url = self.url.take().filter(|url| !url.trim().is_empty()).ok_or(ParseError::MissingUrl)?;
        let mut url = normalize_url(raw_url.trim());

        let payload = (!self.data.is_empty()).then(|| {
            let separator = if self.json { "" } else { "&" };
            self.data.join(separator)
        });

        let body = if self.get {
            if let Some(query) = payload {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query);
            }
            None
        } else {
            payload
        };

        if self.json {
            set_header_if_absent(&mut self.headers, "Content-Type", "application/json");
            set_header_if_absent(&mut self.headers, "Accept", "application/json");
        }

        validate_url(&url)?;

        let method = match self.method.filter(|method| !method.is_empty()) {
            Some(method) => method,
            None if self.head => "HEAD".to_string(),
            None if body.is_some() => "POST".to_string(),
            None => "GET".to_string(),
        };

        let header_text: Vec<&str> = self
            .headers
            .iter()
            .flat_map(|(name, value)| [name.as_str(), value.as_str()])
            .collect();
        let variables = collect_slots(
            std::iter::once(url.as_str())
                .chain(header_text.iter().copied())
                .chain(body.as_deref()),
            runtime,
        );

        Ok(RequestTemplate {
            method,
            url,
            headers: self.headers,
            body,
            variables,
        })
    }
}

/// curl assumes `http://` when the URL has no scheme.
fn normalize_url(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

fn validate_url(url: &str) -> Result<(), ParseError> {
    let masked = mask_placeholders(url, "placeholder");
    url::Url::parse(&masked).map(|_| ()).map_err(|error| ParseError::InvalidUrl {
        url: url.to_string(),
        reason: error.to_string(),
    })
}

/// Sets a header, replacing an existing one with the same case-insensitive
/// name in place so declaration order is preserved.
/// Insert or replace a header, matching names case-insensitively. A
/// replaced header keeps its original name and position.
pub(crate) fn set_header(headers: &mut HeaderMap, name: &str, value: String) {
    match headers.keys().position(|existing| existing.eq_ignore_ascii_case(name)) {
        Some(index) => {
            if let Some((_, existing_value)) = headers.get_index_mut(index) {
                *existing_value = value;
            }
        }
        None => {
            headers.insert(name.to_string(), value);
        }
    }
}

fn set_header_if_absent(headers: &mut HeaderMap, name: &str, value: &str) {
    if !headers.keys().any(|existing| existing.eq_ignore_ascii_case(name)) {
        headers.insert(name.to_string(), value.to_string());
    }
}

fn remove_header(headers: &mut HeaderMap, name: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> RequestTemplate {
        parse_description(input).expect("description parses")
    }

    #[test]
    fn defaults_to_get_without_body() {
        let template = parse("curl https://api.example.com/v1/models");
        assert_eq!(template.method, "GET");
        assert_eq!(template.url, "https://api.example.com/v1/models");
        assert!(template.headers.is_empty());
        assert!(template.body.is_none());
        assert!(template.variables.is_empty());
    }

    #[test]
    fn body_implies_post_unless_method_given() {
        assert_eq!(parse("curl https://x.dev -d a=1").method, "POST");
        assert_eq!(parse("curl -X put https://x.dev -d a=1").method, "PUT");
        assert_eq!(parse("curl --request PATCH https://x.dev").method, "PATCH");
    }

    #[test]
    fn leading_curl_is_optional() {
        assert_eq!(parse("https://x.dev/a").url, "https://x.dev/a");
    }

    #[test]
    fn parses_multiline_command_with_headers_and_json_body() {
        let input = r#"curl https://api.openai.com/v1/chat/completions \
  -H "Content-Type: application/json" \
  -H "Authorization: Bearer {{API_KEY}}" \
  -d '{"model": "{{MODEL}}", "messages": [{"role": "user", "content": "{{TEXT}}"}]}'"#;
        let template = parse(input);

        assert_eq!(template.method, "POST");
        assert_eq!(template.url, "https://api.openai.com/v1/chat/completions");
        let headers: Vec<_> = template.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(headers, vec![("Content-Type", "application/json"), ("Authorization", "Bearer {{API_KEY}}")]);
        assert_eq!(
            template.body.as_deref(),
            Some(r#"{"model": "{{MODEL}}", "messages": [{"role": "user", "content": "{{TEXT}}"}]}"#)
        );
        let keys: Vec<_> = template.slot_keys().collect();
        assert_eq!(keys, vec!["api_key", "model"]);
    }

    #[test]
    fn slots_follow_url_headers_body_order() {
        let template = parse(r#"curl "https://{{HOST}}/v1?key={{API_KEY}}" -H "X-Region: {{REGION}}" -d '{"m":"{{MODEL}}","k":"{{API_KEY}}"}'"#);
        let labels: Vec<_> = template.variables.iter().map(|slot| slot.label.as_str()).collect();
        assert_eq!(labels, vec!["HOST", "API_KEY", "REGION", "MODEL"]);
    }

    #[test]
    fn attached_short_values_and_clusters() {
        let template = parse("curl -sSL -XPOST -HAccept:text/plain https://x.dev");
        assert_eq!(template.method, "POST");
        assert_eq!(template.headers["Accept"], "text/plain");
    }

    #[test]
    fn skips_transport_options_with_values() {
        let template = parse("curl -m 30 --connect-timeout 5 -o out.json --compressed https://x.dev/a");
        assert_eq!(template.url, "https://x.dev/a");
        assert_eq!(template.method, "GET");
    }

    #[test]
    fn duplicate_headers_replace_in_place() {
        let template = parse("curl https://x.dev -H 'A: 1' -H 'B: 2' -H 'a: 3'");
        let headers: Vec<_> = template.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(headers, vec![("A", "3"), ("B", "2")]);
    }

    #[test]
    fn header_semicolon_and_removal_forms() {
        let template = parse("curl https://x.dev -H 'X-Empty;' -H 'X-Gone: 1' -H 'X-Gone:'");
        assert_eq!(template.headers.get("X-Empty").map(String::as_str), Some(""));
        assert!(!template.headers.contains_key("X-Gone"));
    }

    #[test]
    fn header_value_may_contain_colons() {
        let template = parse("curl https://x.dev -H 'Referer: https://a.dev:8080/x'");
        assert_eq!(template.headers["Referer"], "https://a.dev:8080/x");
    }

    #[test]
    fn json_flag_sets_content_headers() {
        let template = parse(r#"curl --json '{"a":1}' -H 'accept: text/event-stream' https://x.dev"#);
        assert_eq!(template.method, "POST");
        assert_eq!(template.headers["Content-Type"], "application/json");
        assert_eq!(template.headers["accept"], "text/event-stream");
        assert!(!template.headers.contains_key("Accept"));
    }

    #[test]
    fn repeated_data_is_joined() {
        assert_eq!(parse("curl https://x.dev -d a=1 --data-raw b=2").body.as_deref(), Some("a=1&b=2"));
    }

    #[test]
    fn get_flag_moves_data_into_query() {
        let template = parse("curl -G https://x.dev/search?x=1 -d q={{QUERY}}");
        assert_eq!(template.method, "GET");
        assert_eq!(template.url, "https://x.dev/search?x=1&q={{QUERY}}");
        assert!(template.body.is_none());
        assert_eq!(template.variables[0].key, "query");
    }

    #[test]
    fn head_and_header_helpers() {
        let template = parse("curl -I -A tether/1.0 -e https://ref.dev -b 'a=b' --oauth2-bearer {{TOKEN}} https://x.dev");
        assert_eq!(template.method, "HEAD");
        assert_eq!(template.headers["User-Agent"], "tether/1.0");
        assert_eq!(template.headers["Referer"], "https://ref.dev");
        assert_eq!(template.headers["Cookie"], "a=b");
        assert_eq!(template.headers["Authorization"], "Bearer {{TOKEN}}");
    }

    #[test]
    fn url_without_scheme_gets_http() {
        assert_eq!(parse("curl localhost:11434/api/chat").url, "http://localhost:11434/api/chat");
    }

    #[test]
    fn url_option_is_accepted() {
        assert_eq!(parse("curl --url https://x.dev/a -X POST").url, "https://x.dev/a");
    }

    #[test]
    fn placeholder_in_host_is_valid() {
        let template = parse("curl https://{{HOST}}/v1/chat");
        assert_eq!(template.variables[0].key, "host");
    }

    #[test]
    fn runtime_placeholders_can_be_disabled() {
        let template = parse_description_with("curl https://x.dev -d '{{TEXT}}'", &RuntimePlaceholders::none()).unwrap();
        assert_eq!(template.variables[0].key, "text");
    }

    #[test]
    fn parsing_is_deterministic() {
        let input = "curl https://x.dev -H 'A: {{B}}' -d '{{C}}'";
        assert_eq!(parse(input), parse(input));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_description(""), Err(ParseError::Empty));
        assert_eq!(parse_description("   \n "), Err(ParseError::Empty));
        assert_eq!(parse_description("curl"), Err(ParseError::MissingUrl));
        assert_eq!(parse_description("curl -H 'A: b'"), Err(ParseError::MissingUrl));
        assert!(matches!(parse_description("curl https://x.dev -d '{"), Err(ParseError::UnterminatedQuote { .. })));
        assert!(matches!(parse_description("curl https://x.dev -H"), Err(ParseError::MissingValue { .. })));
        assert!(matches!(parse_description("curl https://x.dev -H nocolon"), Err(ParseError::MalformedHeader { .. })));
        assert!(matches!(parse_description("curl https://x.dev -H ': v'"), Err(ParseError::MalformedHeader { .. })));
        assert!(matches!(parse_description("curl 'http://exa mple.com'"), Err(ParseError::InvalidUrl { .. })));
    }
}
