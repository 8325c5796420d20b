use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Raised when a model response cannot be repaired into valid JSON. Carries
/// the cleaned string so callers can log what was actually attempted.
#[derive(Debug, Error)]
#[error("model response is not valid JSON after repair: {message}")]
pub struct RepairError {
    pub message: String,
    pub cleaned: String,
}

/// Extracts and repairs a JSON object from raw model output. The repair
/// rules are a fixed, total function of the input string; no model call
/// happens here. Applied identically to extraction, synthesis, and
/// classification responses.
#[derive(Debug)]
pub struct ResponseParser {
    trailing_comma: Regex,
}

impl ResponseParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            trailing_comma: Regex::new(r",\s*([}\]])")
                .context("failed to compile trailing comma regex")?,
        })
    }

    /// Repair order: fence strip, outermost-object slice, control-char
    /// scrub, trailing-comma removal, strict parse with one retry of the
    /// comma pass. Field-level content is never guessed.
    pub fn parse(&self, raw: &str) -> std::result::Result<Value, RepairError> {
        let unfenced = strip_markdown_fences(raw);
        let sliced = slice_outer_object(unfenced).ok_or_else(|| RepairError {
            message: "no JSON object found in response".to_string(),
            cleaned: unfenced.to_string(),
        })?;

        let scrubbed = scrub_control_chars(sliced);
        let cleaned = self
            .trailing_comma
            .replace_all(&scrubbed, "$1")
            .into_owned();

        match serde_json::from_str(&cleaned) {
            Ok(value) => Ok(value),
            Err(first_error) => {
                let recleaned = self.trailing_comma.replace_all(&cleaned, "$1").into_owned();
                serde_json::from_str(&recleaned).map_err(|_| RepairError {
                    message: first_error.to_string(),
                    cleaned: recleaned,
                })
            }
        }
    }
}

fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    clean.strip_suffix("```").unwrap_or(clean).trim()
}

/// Slice between the first `{` and the last `}`, discarding any prose the
/// model added around the object.
fn slice_outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start <= end { Some(&text[start..=end]) } else { None }
}

/// Raw control characters routinely break strict JSON parsers when a model
/// echoes OCR artifacts; each becomes a single space.
fn scrub_control_chars(text: &str) -> String {
    text.chars()
        .map(|ch| {
            let code = ch as u32;
            if code < 0x20 || code == 0x7F { ' ' } else { ch }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::ResponseParser;
    use serde_json::json;

    fn parser() -> ResponseParser {
        ResponseParser::new().expect("parser should build")
    }

    #[test]
    fn clean_json_round_trips_unchanged() {
        let value = json!({"summary": "요약", "timeline": [{"page": 3}]});
        let raw = serde_json::to_string(&value).expect("serializable fixture");
        assert_eq!(parser().parse(&raw).expect("clean json parses"), value);
    }

    #[test]
    fn trailing_commas_are_removed() {
        let parsed = parser().parse(r#"{"a": 1,}"#).expect("repairable json");
        assert_eq!(parsed, json!({"a": 1}));

        let parsed = parser()
            .parse(r#"{"items": [1, 2, 3,],}"#)
            .expect("repairable json");
        assert_eq!(parsed, json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn markdown_fences_and_prose_are_stripped() {
        let raw = "Here is the result:\n```json\n{\"a\": 1}\n```\nLet me know!";
        assert_eq!(parser().parse(raw).expect("fenced json parses"), json!({"a": 1}));
    }

    #[test]
    fn control_characters_become_spaces() {
        let raw = "{\"a\": \"x\u{0001}y\"}";
        let parsed = parser().parse(raw).expect("scrubbed json parses");
        assert_eq!(parsed, json!({"a": "x y"}));
    }

    #[test]
    fn unrepairable_response_reports_cleaned_string() {
        let error = parser()
            .parse("the model refused to answer")
            .expect_err("no object present");
        assert!(error.message.contains("no JSON object"));

        let error = parser()
            .parse(r#"{"a": totally not json}"#)
            .expect_err("broken object");
        assert!(error.cleaned.contains("totally not json"));
    }
}
