//! Step output references and input binding.
//!
//! A step's input map (and condition operands) may reference prior step
//! outputs with the form `${stepId.path.to.field}`. References are resolved
//! lazily against *completed* results only, navigating object keys and
//! numeric array indices.

use serde_json::{Map, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Source of completed step results during resolution.
pub trait ResultLookup {
    fn completed(&self, step_id: &str) -> Option<&Value>;
}

impl ResultLookup for std::collections::HashMap<String, Value> {
    fn completed(&self, step_id: &str) -> Option<&Value> {
        self.get(step_id)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An input reference that could not be resolved.
///
/// This is a hard failure for the step carrying the reference — and only
/// for that step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The referenced step does not exist or has no completed result.
    #[error("reference '{0}' names a step with no completed result")]
    UnknownStep(String),

    /// The referenced path does not exist inside the step's result.
    #[error("reference '{0}' does not resolve to a value")]
    UnresolvedPath(String),
}

// ---------------------------------------------------------------------------
// Reference parsing and path navigation
// ---------------------------------------------------------------------------

/// Split a whole-string reference `${stepId.path}` into (step_id, path).
///
/// Partial interpolation is not supported: anything that is not exactly one
/// `${…}` expression is treated as a literal.
pub fn parse_reference(raw: &str) -> Option<(&str, &str)> {
    let body = raw.strip_prefix("${")?.strip_suffix('}')?;
    if body.is_empty() || body.contains("${") {
        return None;
    }
    match body.split_once('.') {
        Some((step_id, path)) if !step_id.is_empty() => Some((step_id, path)),
        _ => Some((body, "")),
    }
}

/// Navigate a dot-separated path of object keys and array indices.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(fields) => fields.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve one reference against completed results.
pub fn resolve_reference(raw: &str, results: &dyn ResultLookup) -> Result<Value, BindError> {
    let (step_id, path) =
        parse_reference(raw).ok_or_else(|| BindError::UnresolvedPath(raw.to_string()))?;
    let root = results
        .completed(step_id)
        .ok_or_else(|| BindError::UnknownStep(raw.to_string()))?;
    resolve_path(root, path)
        .cloned()
        .ok_or_else(|| BindError::UnresolvedPath(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Input binding
// ---------------------------------------------------------------------------

/// Replace every `${stepId.path}` string in the input map, recursing into
/// nested objects and arrays. Non-reference values pass through untouched.
pub fn bind_inputs(
    input: &Map<String, Value>,
    results: &dyn ResultLookup,
) -> Result<Map<String, Value>, BindError> {
    let mut bound = Map::with_capacity(input.len());
    for (key, value) in input {
        bound.insert(key.clone(), bind_value(value, results)?);
    }
    Ok(bound)
}

fn bind_value(value: &Value, results: &dyn ResultLookup) -> Result<Value, BindError> {
    match value {
        Value::String(raw) if parse_reference(raw).is_some() => resolve_reference(raw, results),
        Value::Object(fields) => {
            let mut bound = Map::with_capacity(fields.len());
            for (key, nested) in fields {
                bound.insert(key.clone(), bind_value(nested, results)?);
            }
            Ok(Value::Object(bound))
        }
        Value::Array(items) => {
            let bound = items
                .iter()
                .map(|item| bind_value(item, results))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(bound))
        }
        other => Ok(other.clone()),
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn results() -> HashMap<String, Value> {
        HashMap::from([
            ("step1".to_string(), json!({ "a": { "b": 42 }, "flag": true })),
            ("step2".to_string(), json!({ "items": [10, 20, 30] })),
        ])
    }

    #[test]
    fn nested_path_resolves() {
        let value = resolve_reference("${step1.a.b}", &results()).unwrap();
        assert_eq!(value, json!(42));
    }

    #[test]
    fn whole_result_resolves_without_a_path() {
        let value = resolve_reference("${step1}", &results()).unwrap();
        assert_eq!(value["flag"], json!(true));
    }

    #[test]
    fn array_index_segments_resolve() {
        let value = resolve_reference("${step2.items.1}", &results()).unwrap();
        assert_eq!(value, json!(20));
    }

    #[test]
    fn missing_path_is_an_unresolved_error() {
        let err = resolve_reference("${step1.a.z}", &results()).unwrap_err();
        assert!(matches!(err, BindError::UnresolvedPath(_)));
    }

    #[test]
    fn unknown_step_is_reported_as_such() {
        let err = resolve_reference("${ghost.a}", &results()).unwrap_err();
        assert!(matches!(err, BindError::UnknownStep(_)));
    }

    #[test]
    fn binding_recurses_into_objects_and_arrays() {
        let input = json!({
            "distance": "${step1.a.b}",
            "options": { "flag": "${step1.flag}" },
            "list": ["${step2.items.0}", "literal"],
            "untouched": "plain string",
        });

        let bound = bind_inputs(input.as_object().unwrap(), &results()).unwrap();
        assert_eq!(bound["distance"], json!(42));
        assert_eq!(bound["options"]["flag"], json!(true));
        assert_eq!(bound["list"], json!([10, "literal"]));
        assert_eq!(bound["untouched"], json!("plain string"));
    }

    #[test]
    fn non_reference_strings_pass_through() {
        assert!(parse_reference("plain").is_none());
        assert!(parse_reference("${}").is_none());
        assert!(parse_reference("prefix ${step1.a}").is_none());
    }

    #[test]
    fn one_bad_reference_fails_the_whole_binding() {
        let input = json!({ "ok": "${step1.flag}", "bad": "${step1.nope}" });
        assert!(bind_inputs(input.as_object().unwrap(), &results()).is_err());
    }
}
