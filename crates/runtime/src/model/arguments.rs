//! Tool-call argument decoding.

use serde_json::{Map, Value};

/// Turn whatever the back-end sent as tool arguments into a key/value map.
///
/// Objects pass through; strings are parsed as JSON; `null` and blank
/// strings mean "no arguments". Anything else is a diagnostic.
pub fn decode_arguments(raw: &Value) -> Result<Map<String, Value>, String> {
    match raw {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!(
                "tool arguments must be a JSON object, got {}",
                json_kind(&other)
            )),
            Err(e) => Err(format!("tool arguments are not valid JSON: {e}")),
        },
        other => Err(format!(
            "tool arguments must be a JSON object, got {}",
            json_kind(other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
