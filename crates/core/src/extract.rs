//! Structured output extraction.
//!
//! Models wrap JSON in prose and markdown fences, truncate it, or return
//! the right syntax with the wrong shape. [`extract`] turns raw model text
//! into a schema-validated value or a classified [`ExtractionError`] small
//! enough to send back to the model in a retry prompt.

use serde_json::Value;
use thiserror::Error;

use crate::schema::{Schema, SchemaIssue};

/// Characters of offending text kept in error previews.
pub const PREVIEW_CHARS: usize = 300;

/// Schema issues kept in a [`ExtractionError::Schema`].
pub const MAX_REPORTED_ISSUES: usize = 5;

/// Why model text could not be turned into a structured value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    /// The extracted text is not valid JSON.
    #[error("response is not valid JSON: {message} (text: {preview})")]
    Syntax { message: String, preview: String },

    /// Valid JSON that the schema rejected.
    #[error("response does not match the expected schema: {}", join_issues(.issues))]
    Schema { issues: Vec<SchemaIssue> },
}

impl ExtractionError {
    /// Correction instructions to send back to the model.
    pub fn retry_feedback(&self) -> String {
        match self {
            Self::Syntax { message, .. } => format!(
                "Your previous response could not be parsed as JSON ({message}). \
                 Respond again with only valid JSON."
            ),
            Self::Schema { issues } => {
                let mut out = String::from(
                    "Your previous response was valid JSON but did not match the required schema:\n",
                );
                for issue in issues {
                    out.push_str(&format!("- {issue}\n"));
                }
                out.push_str("Respond again with corrected JSON only.");
                out
            }
        }
    }
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

fn join_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Syntax-only parse failure from [`parse_json`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to parse JSON: {message}")]
pub struct ParseError {
    pub message: String,
    pub preview: String,
}

impl From<ParseError> for ExtractionError {
    fn from(e: ParseError) -> Self {
        Self::Syntax {
            message: e.message,
            preview: e.preview,
        }
    }
}

/// The JSON candidate inside `text`: the first fenced block's interior if
/// there is one, otherwise the whole text. Always trimmed.
pub fn extract_candidate(text: &str) -> &str {
    fenced_block(text).unwrap_or(text).trim()
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // An optional language tag runs up to the first whitespace.
    let tag_len = after.find(char::is_whitespace).unwrap_or(after.len());
    let body_start = if tag_len > 0 && is_language_tag(&after[..tag_len]) {
        tag_len
    } else {
        0
    };
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

fn is_language_tag(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

/// First [`PREVIEW_CHARS`] characters of `text`, marked when cut.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Parse the JSON candidate in `text` without any schema check.
pub fn parse_json(text: &str) -> Result<Value, ParseError> {
    let candidate = extract_candidate(text);
    serde_json::from_str(candidate).map_err(|e| ParseError {
        message: e.to_string(),
        preview: preview(candidate),
    })
}

/// Validate an already-parsed value, bounding the reported issues.
pub fn validate_value<S>(value: Value, schema: &S) -> ExtractionResult<S::Output>
where
    S: Schema + ?Sized,
{
    schema.validate(value).map_err(|mut issues| {
        if issues.is_empty() {
            issues.push(SchemaIssue::new("/", "value rejected by schema"));
        }
        issues.truncate(MAX_REPORTED_ISSUES);
        ExtractionError::Schema { issues }
    })
}

/// Extract, parse and validate structured output from raw model text.
pub fn extract<S>(text: &str, schema: &S) -> ExtractionResult<S::Output>
where
    S: Schema + ?Sized,
{
    let value = parse_json(text)?;
    validate_value(value, schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{JsonSchema, TypedSchema};
    use serde::Deserialize;
    use serde_json::json;

    fn point_schema() -> JsonSchema {
        JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "x": { "type": "number" },
                "y": { "type": "number" }
            },
            "required": ["x", "y"]
        }))
        .unwrap()
    }

    #[test]
    fn candidate_plain_text_is_trimmed() {
        assert_eq!(extract_candidate("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn candidate_from_language_tagged_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nHope that helps!";
        assert_eq!(extract_candidate(text), "{\"a\": 1}");
    }

    #[test]
    fn candidate_from_bare_fence() {
        assert_eq!(extract_candidate("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn candidate_from_inline_fence() {
        assert_eq!(extract_candidate("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn candidate_from_single_line_tagged_fence() {
        assert_eq!(extract_candidate("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(
            parse_json("Result: ```json {\"a\": [1, 2]} ``` done").unwrap(),
            json!({"a": [1, 2]})
        );
    }

    #[test]
    fn unclosed_fence_falls_back_to_whole_text() {
        assert_eq!(extract_candidate("```json\n{\"a\":1}"), "```json\n{\"a\":1}");
    }

    #[test]
    fn fence_wrapping_is_transparent() {
        let raw = r#"{"x": 1.5, "y": -2}"#;
        let fenced = format!("```json\n{raw}\n```");
        let schema = point_schema();
        let direct = extract(raw, &schema).unwrap();
        let wrapped = extract(&fenced, &schema).unwrap();
        let parsed: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(direct, wrapped);
        assert_eq!(direct, parsed);
    }

    #[test]
    fn malformed_json_is_a_syntax_failure() {
        for bad in ["{\"x\": 1,", "not json at all", "```json\n{x: 1}\n```", ""] {
            match extract(bad, &point_schema()) {
                Err(ExtractionError::Syntax { message, .. }) => assert!(!message.is_empty()),
                other => panic!("expected syntax failure for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn syntax_preview_is_bounded() {
        let long = format!("{{\"x\": \"{}", "a".repeat(2000));
        let Err(ExtractionError::Syntax { preview, .. }) = extract(&long, &point_schema()) else {
            panic!("expected syntax failure");
        };
        assert!(preview.chars().count() <= PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn wrong_shape_is_a_schema_failure_with_bounded_issues() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "a": {"type": "string"}, "b": {"type": "string"}, "c": {"type": "string"},
                "d": {"type": "string"}, "e": {"type": "string"}, "f": {"type": "string"},
                "g": {"type": "string"}
            }
        }))
        .unwrap();
        let text = r#"{"a":1,"b":2,"c":3,"d":4,"e":5,"f":6,"g":7}"#;
        let Err(ExtractionError::Schema { issues }) = extract(text, &schema) else {
            panic!("expected schema failure");
        };
        assert_eq!(issues.len(), MAX_REPORTED_ISSUES);
        assert!(issues.iter().all(|i| !i.path.is_empty() && !i.message.is_empty()));
    }

    #[test]
    fn typed_extraction() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Point {
            x: f64,
            y: f64,
        }
        let schema = TypedSchema::<Point>::new();
        let point = extract("Sure!\n```json\n{\"x\": 1, \"y\": 2}\n```", &schema).unwrap();
        assert_eq!(point, Point { x: 1.0, y: 2.0 });
    }

    #[test]
    fn parse_json_only_checks_syntax() {
        assert_eq!(parse_json("```\n{\"z\": true}\n```").unwrap(), json!({"z": true}));
        let err = parse_json("{oops").unwrap_err();
        assert_eq!(err.preview, "{oops");
    }

    #[test]
    fn retry_feedback_lists_issues() {
        let err = ExtractionError::Schema {
            issues: vec![SchemaIssue::new("/x", "expected number")],
        };
        let feedback = err.retry_feedback();
        assert!(feedback.contains("/x: expected number"));
        assert!(err.to_string().contains("/x: expected number"));
    }
}
