use regex::Regex;

use crate::ConfigError;

/// Validation applied to a response body before it may be committed.
#[derive(Debug, Clone, Default)]
pub enum ResponseTest {
    #[default]
    None,
    /// Body must contain this substring.
    Contains(String),
    /// Body must match this regular expression.
    Matches(Regex),
}

impl ResponseTest {
    /// Build a regex predicate.
    ///
    /// Accepts plain patterns as well as delimited ones such as `/"ok":\s*true/i`;
    /// the delimiters are stripped and trailing flags become inline flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPredicate`] if the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        let translated = strip_delimiters(pattern).unwrap_or_else(|| pattern.to_string());
        Regex::new(&translated)
            .map(ResponseTest::Matches)
            .map_err(|e| ConfigError::InvalidPredicate(format!("regex {pattern:?}: {e}")))
    }

    /// Whether `body` satisfies the predicate.
    #[must_use]
    pub fn passes(&self, body: &str) -> bool {
        match self {
            ResponseTest::None => true,
            ResponseTest::Contains(needle) => body.contains(needle.as_str()),
            ResponseTest::Matches(re) => re.is_match(body),
        }
    }

    /// Stable textual form, used in error messages and key derivation.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            ResponseTest::None => "none".to_string(),
            ResponseTest::Contains(needle) => format!("contains:{needle}"),
            ResponseTest::Matches(re) => format!("regex:{}", re.as_str()),
        }
    }
}

fn closing_delimiter(open: char) -> char {
    match open {
        '(' => ')',
        '{' => '}',
        '[' => ']',
        '<' => '>',
        other => other,
    }
}

/// Translate a delimited pattern (`/body/flags`) into a bare regex with inline
/// flags. Returns `None` when the pattern is not in delimited form.
fn strip_delimiters(pattern: &str) -> Option<String> {
    let open = pattern.chars().next()?;
    if open.is_alphanumeric() || open.is_whitespace() || open == '\\' {
        return None;
    }
    let close = closing_delimiter(open);
    let end = pattern.rfind(close)?;
    if end == 0 {
        return None;
    }
    let body = &pattern[open.len_utf8()..end];
    let flags = &pattern[end + close.len_utf8()..];
    if !flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'U' | 'u')) {
        return None;
    }

    let inline: String = flags.chars().filter(|&c| c != 'u').collect();
    if inline.is_empty() {
        Some(body.to_string())
    } else {
        Some(format!("(?{inline}){body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_always_passes() {
        assert!(ResponseTest::None.passes(""));
    }

    #[test]
    fn contains_matches_substring() {
        let test = ResponseTest::Contains("\"rates\"".into());
        assert!(test.passes(r#"{"rates":{}}"#));
        assert!(!test.passes(r#"{"error":"quota"}"#));
    }

    #[test]
    fn delimited_regex_with_flags() {
        let test = ResponseTest::regex(r#"/"STATUS":\s*"ok"/i"#).unwrap();
        assert!(test.passes(r#"{"status": "OK"}"#));
        assert_eq!(test.describe(), r#"regex:(?i)"STATUS":\s*"ok""#);
    }

    #[test]
    fn bracket_delimiters_are_stripped() {
        let test = ResponseTest::regex("{^\\{}").unwrap();
        assert!(test.passes("{\"a\":1}"));
        assert!(!test.passes("[1]"));
    }

    #[test]
    fn plain_patterns_are_left_alone() {
        assert_eq!(strip_delimiters("^foo$"), None);
        assert_eq!(strip_delimiters("/api/v1"), None);
        assert_eq!(strip_delimiters(".*ok.*"), None);
        let test = ResponseTest::regex("/api/v1").unwrap();
        assert!(test.passes("GET /api/v1/rates"));
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let err = ResponseTest::regex("/([a-z]/").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPredicate(_)));
    }
}
