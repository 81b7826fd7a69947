//! Input and output validation against a tool descriptor.

use serde_json::{Map, Value};

use tools::ToolDescriptor;

use crate::ExecutionError;

/// Check every declared input parameter against the supplied values.
///
/// # Errors
/// `VALIDATION_ERROR` when a required parameter is absent, or a present
/// parameter does not match its declared kind.
pub fn validate_input(
    descriptor: &ToolDescriptor,
    input: &Map<String, Value>,
) -> Result<(), ExecutionError> {
    for spec in &descriptor.inputs {
        match input.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    return Err(ExecutionError::Validation(format!(
                        "tool '{}': required parameter '{}' is missing",
                        descriptor.id, spec.name
                    )));
                }
            }
            Some(value) => {
                if !spec.kind.matches(value) {
                    return Err(ExecutionError::Validation(format!(
                        "tool '{}': parameter '{}' is not a valid {:?}",
                        descriptor.id, spec.name, spec.kind
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Declared output fields absent from the result.
///
/// Advisory only — a tool may legitimately omit optional outputs, so the
/// service logs these as warnings instead of failing the execution.
pub fn missing_outputs(descriptor: &ToolDescriptor, result: &Value) -> Vec<String> {
    if descriptor.outputs.is_empty() {
        return Vec::new();
    }
    match result.as_object() {
        Some(fields) => descriptor
            .outputs
            .iter()
            .filter(|name| !fields.contains_key(*name))
            .cloned()
            .collect(),
        // A non-object result cannot carry named fields at all.
        None => descriptor.outputs.clone(),
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tools::{ParamKind, ParamSpec};

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("buffer", "Buffer", "builtin:buffer")
            .with_input(ParamSpec::required("geometry", ParamKind::Geometry))
            .with_input(ParamSpec::required("distance", ParamKind::Number))
            .with_input(ParamSpec::optional("units", ParamKind::String))
            .with_output("result")
            .with_output("area")
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn well_formed_input_passes() {
        let input = object(json!({
            "geometry": { "type": "Point", "coordinates": [0, 0] },
            "distance": 10.0,
        }));
        assert!(validate_input(&descriptor(), &input).is_ok());
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let input = object(json!({ "distance": 10.0 }));
        let err = validate_input(&descriptor(), &input).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("geometry"));
    }

    #[test]
    fn null_counts_as_missing() {
        let input = object(json!({ "geometry": null, "distance": 1 }));
        assert!(validate_input(&descriptor(), &input).is_err());
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let input = object(json!({
            "geometry": { "type": "Point" },
            "distance": "ten",
        }));
        let err = validate_input(&descriptor(), &input).unwrap_err();
        assert!(err.to_string().contains("distance"));
    }

    #[test]
    fn optional_parameter_may_be_absent_but_must_match_kind() {
        let base = object(json!({ "geometry": { "type": "Point" }, "distance": 1 }));
        assert!(validate_input(&descriptor(), &base).is_ok());

        let mut bad = base;
        bad.insert("units".into(), json!(5));
        assert!(validate_input(&descriptor(), &bad).is_err());
    }

    #[test]
    fn missing_outputs_are_reported_not_fatal() {
        let missing = missing_outputs(&descriptor(), &json!({ "result": {} }));
        assert_eq!(missing, vec!["area"]);

        let none = missing_outputs(&descriptor(), &json!({ "result": {}, "area": 1 }));
        assert!(none.is_empty());
    }

    #[test]
    fn non_object_result_misses_every_declared_output() {
        let missing = missing_outputs(&descriptor(), &json!(42));
        assert_eq!(missing.len(), 2);
    }
}
