//! Tolerant parsing for truncated JSON.
//!
//! Tool-call arguments stream as raw JSON fragments, so at any point
//! mid-stream the accumulated string is usually a *prefix* of a JSON
//! document. [`parse_partial`] turns such a prefix into the best-effort
//! [`Value`] it implies: open strings, objects, and arrays are closed at the
//! truncation point, partial literals (`tru`, `fal`, `nul`) are completed,
//! dangling numbers are trimmed to their valid prefix, and incomplete escape
//! sequences are dropped. A dangling object key with no value yet is
//! omitted.
//!
//! Parsing fails only when the input cannot be a prefix of any JSON
//! document (`{"a" 1`). The *strict* parse performed when a tool call ends
//! is a different operation — [`ToolCall::parsed_arguments`] — and a string
//! accepted here can still fail there.
//!
//! [`ToolCall::parsed_arguments`]: crate::ToolCall::parsed_arguments

use serde_json::{Map, Value};

/// The value implied by a (possibly truncated) JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct Partial {
    pub value: Value,
    /// `true` when the input was a complete JSON document.
    pub complete: bool,
}

/// The input is not a prefix of any JSON document.
#[derive(Debug, thiserror::Error)]
#[error("not a prefix of any JSON document at byte {position}: {message}")]
pub struct PartialJsonError {
    pub position: usize,
    pub message: String,
}

/// Parses a possibly-truncated JSON string.
pub fn parse_partial(input: &str) -> Result<Partial, PartialJsonError> {
    let mut cursor = Cursor { input, pos: 0 };
    cursor.skip_ws();
    if cursor.peek().is_none() {
        // An empty prefix implies no value yet.
        return Ok(Partial {
            value: Value::Null,
            complete: false,
        });
    }
    match cursor.parse_value() {
        Ok(value) => {
            cursor.skip_ws();
            if let Some(c) = cursor.peek() {
                return Err(cursor.invalid(format!("unexpected trailing character {c:?}")));
            }
            Ok(Partial {
                value,
                complete: true,
            })
        }
        Err(Step::Truncated(value)) => Ok(Partial {
            value: value.unwrap_or(Value::Null),
            complete: false,
        }),
        Err(Step::Invalid(err)) => Err(err),
    }
}

/// How a parse attempt stopped short of a complete value.
enum Step {
    /// Input ended mid-value; carries the best-effort value, if any.
    Truncated(Option<Value>),
    Invalid(PartialJsonError),
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\n' | '\r')) {
            self.pos += 1;
        }
    }

    fn invalid(&self, message: impl Into<String>) -> PartialJsonError {
        PartialJsonError {
            position: self.pos,
            message: message.into(),
        }
    }

    fn parse_value(&mut self) -> Result<Value, Step> {
        match self.peek() {
            None => Err(Step::Truncated(None)),
            Some('{') => self.parse_object(),
            Some('[') => self.parse_array(),
            Some('"') => self.parse_string().map(Value::String),
            Some('t') => self.parse_literal("true", Value::Bool(true)),
            Some('f') => self.parse_literal("false", Value::Bool(false)),
            Some('n') => self.parse_literal("null", Value::Null),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) => Err(Step::Invalid(
                self.invalid(format!("unexpected character {c:?}")),
            )),
        }
    }

    fn parse_object(&mut self) -> Result<Value, Step> {
        self.bump(); // {
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(Step::Truncated(Some(Value::Object(map)))),
                Some('}') => {
                    self.bump();
                    return Ok(Value::Object(map));
                }
                Some('"') => {}
                Some(c) => {
                    return Err(Step::Invalid(
                        self.invalid(format!("expected object key, found {c:?}")),
                    ));
                }
            }
            let key = match self.parse_string() {
                Ok(key) => key,
                // A truncated key implies no member yet.
                Err(Step::Truncated(_)) => return Err(Step::Truncated(Some(Value::Object(map)))),
                Err(invalid) => return Err(invalid),
            };
            self.skip_ws();
            match self.bump() {
                None => return Err(Step::Truncated(Some(Value::Object(map)))),
                Some(':') => {}
                Some(c) => {
                    return Err(Step::Invalid(
                        self.invalid(format!("expected ':' after object key, found {c:?}")),
                    ));
                }
            }
            self.skip_ws();
            match self.parse_value() {
                Ok(value) => {
                    map.insert(key, value);
                }
                Err(Step::Truncated(value)) => {
                    if let Some(value) = value {
                        map.insert(key, value);
                    }
                    return Err(Step::Truncated(Some(Value::Object(map))));
                }
                Err(invalid) => return Err(invalid),
            }
            self.skip_ws();
            match self.peek() {
                None => return Err(Step::Truncated(Some(Value::Object(map)))),
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    return Ok(Value::Object(map));
                }
                Some(c) => {
                    return Err(Step::Invalid(
                        self.invalid(format!("expected ',' or '}}' in object, found {c:?}")),
                    ));
                }
            }
            // Tolerate a trailing comma before the closing brace.
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, Step> {
        self.bump(); // [
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(Step::Truncated(Some(Value::Array(items)))),
                Some(']') => {
                    self.bump();
                    return Ok(Value::Array(items));
                }
                _ => {}
            }
            match self.parse_value() {
                Ok(value) => items.push(value),
                Err(Step::Truncated(value)) => {
                    if let Some(value) = value {
                        items.push(value);
                    }
                    return Err(Step::Truncated(Some(Value::Array(items))));
                }
                Err(invalid) => return Err(invalid),
            }
            self.skip_ws();
            match self.peek() {
                None => return Err(Step::Truncated(Some(Value::Array(items)))),
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    return Ok(Value::Array(items));
                }
                Some(c) => {
                    return Err(Step::Invalid(
                        self.invalid(format!("expected ',' or ']' in array, found {c:?}")),
                    ));
                }
            }
            self.skip_ws();
            if self.peek() == Some(']') {
                self.bump();
                return Ok(Value::Array(items));
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, Step> {
        self.bump(); // "
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(Step::Truncated(Some(Value::String(out)))),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    // Input ended mid-escape; drop the incomplete sequence.
                    None => return Err(Step::Truncated(Some(Value::String(out)))),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('b') => out.push('\u{0008}'),
                    Some('f') => out.push('\u{000C}'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => match self.parse_unicode_escape()? {
                        Some(c) => out.push(c),
                        None => return Err(Step::Truncated(Some(Value::String(out)))),
                    },
                    Some(c) => {
                        return Err(Step::Invalid(
                            self.invalid(format!("invalid escape character {c:?}")),
                        ));
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Parses the four hex digits after `\u`, combining surrogate pairs.
    /// Returns `None` when the input ends mid-sequence.
    fn parse_unicode_escape(&mut self) -> Result<Option<char>, Step> {
        let Some(first) = self.parse_hex4()? else {
            return Ok(None);
        };
        if (0xD800..0xDC00).contains(&first) {
            // High surrogate: needs a following \uXXXX low surrogate.
            if self.peek() != Some('\\') {
                return Ok(if self.peek().is_none() {
                    None
                } else {
                    Some(char::REPLACEMENT_CHARACTER)
                });
            }
            self.bump();
            match self.bump() {
                None => return Ok(None),
                Some('u') => {}
                Some(c) => {
                    return Err(Step::Invalid(
                        self.invalid(format!("expected low surrogate escape, found {c:?}")),
                    ));
                }
            }
            let Some(second) = self.parse_hex4()? else {
                return Ok(None);
            };
            if !(0xDC00..0xE000).contains(&second) {
                return Ok(Some(char::REPLACEMENT_CHARACTER));
            }
            let combined = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
            return Ok(char::from_u32(combined).or(Some(char::REPLACEMENT_CHARACTER)));
        }
        Ok(char::from_u32(first).or(Some(char::REPLACEMENT_CHARACTER)))
    }

    fn parse_hex4(&mut self) -> Result<Option<u32>, Step> {
        let mut value = 0u32;
        for _ in 0..4 {
            match self.bump() {
                None => return Ok(None),
                Some(c) => match c.to_digit(16) {
                    Some(d) => value = value * 16 + d,
                    None => {
                        return Err(Step::Invalid(
                            self.invalid(format!("invalid hex digit {c:?} in unicode escape")),
                        ));
                    }
                },
            }
        }
        Ok(Some(value))
    }

    fn parse_number(&mut self) -> Result<Value, Step> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some('0'..='9' | '-' | '+' | '.' | 'e' | 'E')
        ) {
            self.bump();
        }
        let token = &self.input[start..self.pos];
        if self.peek().is_none() {
            // Truncated number: trim back to the longest valid prefix.
            let trimmed = token.trim_end_matches(['-', '+', '.', 'e', 'E']);
            if trimmed.is_empty() || trimmed == "-" {
                return Err(Step::Truncated(None));
            }
            let value = serde_json::from_str(trimmed).map_err(|_| {
                Step::Invalid(self.invalid(format!("invalid number token {token:?}")))
            })?;
            return Err(Step::Truncated(Some(value)));
        }
        serde_json::from_str(token)
            .map_err(|_| Step::Invalid(self.invalid(format!("invalid number token {token:?}"))))
    }

    fn parse_literal(&mut self, literal: &'static str, value: Value) -> Result<Value, Step> {
        for expected in literal.chars() {
            match self.bump() {
                None => return Err(Step::Truncated(Some(value))),
                Some(c) if c == expected => {}
                Some(c) => {
                    return Err(Step::Invalid(self.invalid(format!(
                        "invalid literal: expected {expected:?}, found {c:?}"
                    ))));
                }
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value_of(input: &str) -> Value {
        parse_partial(input).unwrap().value
    }

    #[test]
    fn test_complete_document() {
        let parsed = parse_partial(r#"{"q": "rust", "limit": 5}"#).unwrap();
        assert!(parsed.complete);
        assert_eq!(parsed.value, json!({"q": "rust", "limit": 5}));
    }

    #[test]
    fn test_open_string_closed() {
        assert_eq!(value_of(r#"{"q": "ru"#), json!({"q": "ru"}));
    }

    #[test]
    fn test_dangling_key_dropped() {
        assert_eq!(value_of(r#"{"q": "rust", "lim"#), json!({"q": "rust"}));
        assert_eq!(value_of(r#"{"q": "rust", "limit":"#), json!({"q": "rust"}));
    }

    #[test]
    fn test_truncated_number_trimmed() {
        assert_eq!(value_of(r#"{"n": 12."#), json!({"n": 12}));
        assert_eq!(value_of(r#"{"n": 1e"#), json!({"n": 1}));
        assert_eq!(value_of(r#"[1, 2, -"#), json!([1, 2]));
        assert_eq!(value_of("-12.5e3"), json!(-12500.0));
    }

    #[test]
    fn test_partial_literals_completed() {
        assert_eq!(value_of(r#"{"ok": tru"#), json!({"ok": true}));
        assert_eq!(value_of(r#"{"ok": f"#), json!({"ok": false}));
        assert_eq!(value_of(r#"[nul"#), json!([null]));
    }

    #[test]
    fn test_nested_truncation() {
        assert_eq!(
            value_of(r#"{"a": {"b": [1, {"c": "x"#),
            json!({"a": {"b": [1, {"c": "x"}]}})
        );
    }

    #[test]
    fn test_trailing_comma_tolerated() {
        assert_eq!(value_of(r#"{"a": 1,"#), json!({"a": 1}));
        assert_eq!(value_of(r#"[1, 2,"#), json!([1, 2]));
        let parsed = parse_partial(r#"{"a": 1,}"#).unwrap();
        assert_eq!(parsed.value, json!({"a": 1}));
    }

    #[test]
    fn test_incomplete_escape_dropped() {
        assert_eq!(value_of(r#"{"s": "a\"#), json!({"s": "a"}));
        assert_eq!(value_of(r#"{"s": "a\u00"#), json!({"s": "a"}));
        assert_eq!(value_of(r#"{"s": "a\n"#), json!({"s": "a\n"}));
    }

    #[test]
    fn test_unicode_escape_complete() {
        assert_eq!(value_of(r#""é""#), json!("é"));
        assert_eq!(value_of(r#""😀""#), json!("😀"));
    }

    #[test]
    fn test_empty_input_is_null_incomplete() {
        let parsed = parse_partial("").unwrap();
        assert!(!parsed.complete);
        assert_eq!(parsed.value, Value::Null);
    }

    #[test]
    fn test_invalid_inputs_error() {
        assert!(parse_partial(r#"{"a" 1}"#).is_err());
        assert!(parse_partial(r#"{"ok": trx"#).is_err());
        assert!(parse_partial(r#"{"a": 1} extra"#).is_err());
        assert!(parse_partial("{1: 2}").is_err());
    }

    #[test]
    fn test_incomplete_flag() {
        assert!(!parse_partial(r#"{"a": 1"#).unwrap().complete);
        assert!(parse_partial(r#"{"a": 1}"#).unwrap().complete);
    }
}
