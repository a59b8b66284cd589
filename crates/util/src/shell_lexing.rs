//! # Shell-like Lexing Utilities
//!
//! This module provides utilities for tokenizing shell-like input, supporting
//! single and double quotes, backslash escapes, line continuations, and
//! position tracking. It is the first stage of turning a pasted `curl`
//! command into a request template.

use std::borrow::Cow;

use thiserror::Error;

/// Errors produced while lexing shell-like input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// A quote was opened but never closed.
    #[error("unterminated {quote} quote starting at byte {position}")]
    UnterminatedQuote { quote: char, position: usize },
}

/// Split input into shell words, removing quotes and escapes.
///
/// This is the owned, fully-unquoted counterpart of [`lex_shell_like_ranged`]:
/// each returned string is the argument a POSIX shell would pass to the
/// program.
///
/// # Arguments
/// * `input` - The raw command line, possibly spanning several lines
///
/// # Returns
/// The words in order, or a [`LexError`] when a quote is left open
///
/// # Example
/// ```rust
/// use tether_util::shell_lexing::split_shell_words;
///
/// let words = split_shell_words("curl -H 'Accept: */*' \\\n  \"https://x.dev/a b\"").unwrap();
/// assert_eq!(words, vec!["curl", "-H", "Accept: */*", "https://x.dev/a b"]);
/// ```
pub fn split_shell_words(input: &str) -> Result<Vec<String>, LexError> {
    let normalized = join_line_continuations(input);
    Ok(lex_shell_like_ranged(&normalized)?
        .into_iter()
        .map(|token| unquote_token(token.text))
        .collect())
}

/// Token with original byte positions.
///
/// The text keeps its quotes and escapes exactly as written.
#[derive(Debug, Clone)]
pub struct LexToken<'a> {
    /// The text content of the token
    pub text: &'a str,
    /// The starting byte position in the original string
    pub start: usize,
    /// The ending byte position in the original string
    pub end: usize,
}

/// Tokenize input returning borrowed slices and byte ranges.
///
/// Quoted segments are kept intact (quotes included) so callers can map
/// tokens back onto the source text for diagnostics.
///
/// # Example
/// ```rust
/// use tether_util::shell_lexing::lex_shell_like_ranged;
///
/// let tokens = lex_shell_like_ranged("cmd 'arg with spaces'").unwrap();
/// assert_eq!(tokens[1].text, "'arg with spaces'");
/// assert_eq!(tokens[1].start, 4);
/// ```
pub fn lex_shell_like_ranged(input: &str) -> Result<Vec<LexToken<'_>>, LexError> {
    let mut tokens = Vec::new();
    let mut current_index = 0usize;
    let bytes = input.as_bytes();

    while current_index < bytes.len() {
        current_index = skip_whitespace(bytes, current_index);

        if current_index >= bytes.len() {
            break;
        }

        let start = current_index;
        current_index = parse_token(bytes, current_index)?;

        tokens.push(LexToken {
            text: &input[start..current_index],
            start,
            end: current_index,
        });
    }

    Ok(tokens)
}

/// Removes backslash-newline pairs outside single quotes.
///
/// A shell treats `\` at the end of a line as a continuation marker, which is
/// how multi-line `curl` snippets are usually pasted.
pub fn join_line_continuations(input: &str) -> Cow<'_, str> {
    if !input.contains("\\\n") && !input.contains("\\\r\n") {
        return Cow::Borrowed(input);
    }

    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_single_quotes = false;
    let mut in_double_quotes = false;

    while let Some(character) = chars.next() {
        match character {
            '\'' if !in_double_quotes => {
                in_single_quotes = !in_single_quotes;
                output.push(character);
            }
            '"' if !in_single_quotes => {
                in_double_quotes = !in_double_quotes;
                output.push(character);
            }
            '\\' if !in_single_quotes => match chars.peek().copied() {
                Some('\n') => {
                    chars.next();
                }
                Some('\r') => {
                    chars.next();
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    } else {
                        output.push_str("\\\r");
                    }
                }
                Some(next) => {
                    // keep the escape pair together so an escaped quote does not toggle state
                    chars.next();
                    output.push('\\');
                    output.push(next);
                }
                None => output.push('\\'),
            },
            _ => output.push(character),
        }
    }

    Cow::Owned(output)
}

/// Strip quoting from a single raw token.
///
/// Single-quoted text is literal. Inside double quotes a backslash only
/// escapes `"`, `\`, `$` and `` ` ``. Outside quotes a backslash escapes any
/// character.
pub fn unquote_token(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_single_quotes = false;
    let mut in_double_quotes = false;

    while let Some(character) = chars.next() {
        match character {
            '\'' if !in_double_quotes => in_single_quotes = !in_single_quotes,
            '"' if !in_single_quotes => in_double_quotes = !in_double_quotes,
            '\\' if in_single_quotes => output.push(character),
            '\\' if in_double_quotes => match chars.peek().copied() {
                Some(next @ ('"' | '\\' | '$' | '`')) => {
                    chars.next();
                    output.push(next);
                }
                _ => output.push('\\'),
            },
            '\\' => {
                if let Some(next) = chars.next() {
                    output.push(next);
                }
            }
            _ => output.push(character),
        }
    }

    output
}

fn skip_whitespace(bytes: &[u8], start_index: usize) -> usize {
    let mut index = start_index;
    while index < bytes.len() && bytes[index].is_ascii_whitespace() {
        index += 1;
    }
    index
}

/// Parses a single token from the input bytes.
///
/// Stops at unquoted whitespace or the end of input. Returns an error when
/// input ends inside a quoted section.
fn parse_token(bytes: &[u8], start_index: usize) -> Result<usize, LexError> {
    let mut index = start_index;
    let mut open_quote: Option<(u8, usize)> = None;

    while index < bytes.len() {
        let byte = bytes[index];

        match open_quote {
            Some((b'\'', _)) => {
                if byte == b'\'' {
                    open_quote = None;
                }
            }
            Some((quote, _)) => {
                if byte == b'\\' && index + 1 < bytes.len() {
                    index += 2;
                    continue;
                }
                if byte == quote {
                    open_quote = None;
                }
            }
            None => {
                if byte == b'\\' && index + 1 < bytes.len() {
                    index += 2;
                    continue;
                }
                if byte == b'\'' || byte == b'"' {
                    open_quote = Some((byte, index));
                } else if byte.is_ascii_whitespace() {
                    break;
                }
            }
        }

        index += 1;
    }

    if let Some((quote, position)) = open_quote {
        return Err(LexError::UnterminatedQuote {
            quote: quote as char,
            position,
        });
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokenization() {
        let words = split_shell_words("hello world").unwrap();
        assert_eq!(words, vec!["hello", "world"]);
    }

    #[test]
    fn test_quotes_are_removed() {
        let words = split_shell_words(r#"cmd 'arg with spaces' "double quoted""#).unwrap();
        assert_eq!(words, vec!["cmd", "arg with spaces", "double quoted"]);
    }

    #[test]
    fn test_single_quotes_keep_backslashes_and_double_quotes() {
        let words = split_shell_words(r#"-d '{"a":"b\n"}'"#).unwrap();
        assert_eq!(words, vec!["-d", r#"{"a":"b\n"}"#]);
    }

    #[test]
    fn test_escapes_inside_double_quotes() {
        let words = split_shell_words(r#""say \"hi\" \n""#).unwrap();
        assert_eq!(words, vec![r#"say "hi" \n"#]);
    }

    #[test]
    fn test_escaped_spaces_outside_quotes() {
        let words = split_shell_words("path\\ with\\ spaces").unwrap();
        assert_eq!(words, vec!["path with spaces"]);
    }

    #[test]
    fn test_adjacent_quoted_segments_join() {
        let words = split_shell_words(r#"Bearer' '"{{TOKEN}}""#).unwrap();
        assert_eq!(words, vec!["Bearer {{TOKEN}}"]);
    }

    #[test]
    fn test_line_continuations() {
        let input = "curl https://api.example.com \\\n  -H 'A: b' \\\r\n  -X POST";
        let words = split_shell_words(input).unwrap();
        assert_eq!(words, vec!["curl", "https://api.example.com", "-H", "A: b", "-X", "POST"]);
    }

    #[test]
    fn test_continuation_inside_single_quotes_is_literal() {
        let words = split_shell_words("'a\\\nb'").unwrap();
        assert_eq!(words, vec!["a\\\nb"]);
    }

    #[test]
    fn test_empty_quoted_argument_survives() {
        let words = split_shell_words("-H ''").unwrap();
        assert_eq!(words, vec!["-H", ""]);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(split_shell_words("").unwrap().is_empty());
        assert!(split_shell_words("   \t  \n  ").unwrap().is_empty());
    }

    #[test]
    fn test_unterminated_quote_reports_position() {
        let error = split_shell_words("curl -d '{\"a\": 1}").unwrap_err();
        assert_eq!(error, LexError::UnterminatedQuote { quote: '\'', position: 8 });
    }

    #[test]
    fn test_ranged_tokenization() {
        let tokens = lex_shell_like_ranged("hello world").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!((tokens[0].start, tokens[0].end), (0, 5));
        assert_eq!((tokens[1].start, tokens[1].end), (6, 11));
    }
}
