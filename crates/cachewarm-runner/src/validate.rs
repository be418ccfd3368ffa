use cachewarm_core::{ContentFormat, ResponseTest};
use serde::de::IgnoredAny;

use crate::error::Failure;

/// Check that a fetched body is well-formed for `format` and passes `test`.
///
/// # Errors
///
/// Returns [`Failure::Validation`] describing the first check that failed.
pub fn validate(body: &[u8], format: ContentFormat, test: &ResponseTest) -> Result<(), Failure> {
    match format {
        ContentFormat::Json => {
            serde_json::from_slice::<IgnoredAny>(body)
                .map_err(|e| Failure::Validation(format!("invalid JSON: {e}")))?;
        }
        ContentFormat::Text => {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Err(Failure::Validation("empty body".to_string()));
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    if !test.passes(&text) {
        return Err(Failure::Validation(format!(
            "response failed test {}",
            test.describe()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_must_parse() {
        assert!(validate(br#"{"a":1}"#, ContentFormat::Json, &ResponseTest::None).is_ok());
        let err = validate(b"<html>", ContentFormat::Json, &ResponseTest::None).unwrap_err();
        assert!(err.to_string().starts_with("ValidationError: invalid JSON"));
        assert!(validate(b"", ContentFormat::Json, &ResponseTest::None).is_err());
    }

    #[test]
    fn text_must_not_be_blank() {
        assert!(validate(b"hello", ContentFormat::Text, &ResponseTest::None).is_ok());
        assert_eq!(
            validate(b" \n", ContentFormat::Text, &ResponseTest::None).unwrap_err(),
            Failure::Validation("empty body".into())
        );
    }

    #[test]
    fn predicate_is_applied_after_format() {
        let test = ResponseTest::Contains("\"ok\":true".into());
        assert!(validate(br#"{"ok":true}"#, ContentFormat::Json, &test).is_ok());
        let err = validate(br#"{"ok":false}"#, ContentFormat::Json, &test).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValidationError: response failed test contains:\"ok\":true"
        );
    }
}
