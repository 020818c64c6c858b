//! Validation of raw backend text before it reaches the workflow state.

use std::sync::LazyLock;

use jsonschema::{Validator, validator_for};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::errors::AgentError;
use crate::core::types::TestCase;

/// A fenced block whose opening and closing fences each start a line.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[ \t]*([\w.+-]*)[^\n]*\n(.*?)^[ \t]*```[ \t]*\r?$")
        .expect("fence regex should compile")
});

static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bInput:").expect("input regex should compile"));

static OUTPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bOutput:").expect("output regex should compile"));

/// Anything that ends an example's output text.
static EXAMPLE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bInput:|\bExample\s*\d+\s*:|\bConstraints:|\bExplanation:|\bFollow[- ]up:")
        .expect("example end regex should compile")
});

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[A-Za-z_]\w*\s*=\s*(.*)$").expect("assignment regex should compile")
});

/// Fenced blocks in order, as (lowercased tag, body).
fn fenced_blocks(text: &str) -> impl Iterator<Item = (String, &str)> {
    FENCE_RE.captures_iter(text).filter_map(|caps| {
        let tag = caps.get(1)?.as_str().to_ascii_lowercase();
        Some((tag, caps.get(2)?.as_str()))
    })
}

/// Extract the first python or untagged fenced block. A block holding only
/// comments or whitespace is rejected.
pub fn extract_code_block(text: &str) -> Result<String, AgentError> {
    let code = fenced_blocks(text)
        .find(|(tag, _)| matches!(tag.as_str(), "" | "python" | "python3" | "py"))
        .map(|(_, body)| body.trim().to_string())
        .ok_or_else(|| AgentError::InvalidOutput("no fenced code block in response".to_string()))?;
    let has_statement = code.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    });
    if !has_statement {
        return Err(AgentError::InvalidOutput(
            "code block is empty or contains only comments".to_string(),
        ));
    }
    Ok(code)
}

/// Compile an embedded schema.
pub fn compile_schema(source: &str) -> Validator {
    let schema: Value = serde_json::from_str(source).expect("embedded schema should be JSON");
    validator_for(&schema).expect("embedded schema should compile")
}

/// Locate the JSON object in a response: a ```json fence, else the outermost braces.
fn json_text(text: &str) -> Option<&str> {
    if let Some((_, body)) = fenced_blocks(text).find(|(tag, _)| tag == "json") {
        return Some(body.trim());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Parse a JSON payload, validate it against `schema`, and deserialize it.
pub fn parse_json_payload<T: DeserializeOwned>(
    text: &str,
    schema: &Validator,
) -> Result<T, AgentError> {
    let raw = json_text(text)
        .ok_or_else(|| AgentError::InvalidOutput("no JSON object in response".to_string()))?;
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| AgentError::InvalidOutput(format!("unparseable JSON: {err}")))?;
    if !schema.is_valid(&value) {
        let messages = schema
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(AgentError::InvalidOutput(format!(
            "schema validation failed: {}",
            messages.join("; ")
        )));
    }
    serde_json::from_value(value)
        .map_err(|err| AgentError::InvalidOutput(format!("payload shape mismatch: {err}")))
}

/// Pull `Input: ... Output: ...` examples out of a problem description.
///
/// Examples whose text cannot be read are skipped.
pub fn extract_examples(description: &str) -> Vec<TestCase> {
    let mut cases = Vec::new();
    let starts: Vec<usize> = INPUT_RE.find_iter(description).map(|m| m.end()).collect();

    for start in starts {
        let rest = &description[start..];
        let Some(output) = OUTPUT_RE.find(rest) else {
            continue;
        };
        let input_text = rest[..output.start()].trim();
        let after_output = &rest[output.end()..];
        let output_end = EXAMPLE_END_RE
            .find(after_output)
            .map_or(after_output.len(), |m| m.start());
        let output_text = after_output[..output_end].trim();
        if input_text.is_empty() || output_text.is_empty() {
            continue;
        }
        cases.push(TestCase {
            id: format!("example_{}", cases.len() + 1),
            input: parse_arguments(input_text),
            expected: parse_value(output_text),
        });
    }

    cases
}

/// Split `a = [1,2], b = 3` into positional values. Text without assignments is one value.
pub fn parse_arguments(text: &str) -> Vec<Value> {
    let parts = split_top_level(text);
    let assigned: Vec<&str> = parts
        .iter()
        .filter_map(|part| {
            ASSIGNMENT_RE
                .captures(part)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
        })
        .collect();
    if !assigned.is_empty() && assigned.len() == parts.len() {
        return assigned.into_iter().map(parse_value).collect();
    }
    vec![parse_value(text)]
}

/// Split on commas outside brackets and quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '{' | '(') => depth += 1,
            (None, ']' | '}' | ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Read one literal: JSON first, then quoted strings, booleans, null and numbers. Falls back to text.
pub fn parse_value(text: &str) -> Value {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value;
    }
    let quoted = text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"'))
            || (text.starts_with('\'') && text.ends_with('\'')));
    if quoted {
        return Value::String(text[1..text.len() - 1].to_string());
    }
    if text.starts_with('[') && text.ends_with(']') {
        let swapped = text.replace('\'', "\"");
        if let Ok(value) = serde_json::from_str::<Value>(&swapped) {
            return value;
        }
    }
    match text.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" => return Value::Null,
        _ => {}
    }
    Value::String(text.to_string())
}
