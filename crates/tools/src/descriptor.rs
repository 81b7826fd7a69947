//! Tool descriptors — what a tool declares about itself.
//!
//! A descriptor is supplied by the surrounding catalog and is read-only to
//! this workspace: identity, a loadable reference to the executable
//! implementation, declared input parameters, and declared output fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ParamKind
// ---------------------------------------------------------------------------

/// Primitive kind a declared input parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
    /// Any JSON object; geometries arrive as GeoJSON-style objects.
    Geometry,
}

impl ParamKind {
    /// Check a concrete JSON value against this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Array => value.is_array(),
            ParamKind::Geometry => value.is_object(),
        }
    }
}

// ---------------------------------------------------------------------------
// ParamSpec
// ---------------------------------------------------------------------------

/// One declared input parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self { name: name.into(), kind, required: true }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self { name: name.into(), kind, required: false }
    }
}

// ---------------------------------------------------------------------------
// ToolDescriptor
// ---------------------------------------------------------------------------

/// A complete tool declaration.
///
/// `code_ref` names the registered [`ExecutableTool`](crate::ExecutableTool)
/// implementation. A descriptor without one is valid to construct and pass
/// around — the catalog lists tools that are not yet loadable — but any
/// attempt to execute it is rejected with a validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique identity within the catalog.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Loadable reference to the executable implementation.
    pub code_ref: Option<String>,
    /// Declared input parameters.
    pub inputs: Vec<ParamSpec>,
    /// Declared output field names.
    pub outputs: Vec<String>,
}

impl ToolDescriptor {
    /// Create a descriptor whose implementation is registered under `code_ref`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        code_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code_ref: Some(code_ref.into()),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Create a descriptor with no loadable implementation.
    pub fn unloadable(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code_ref: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Add a declared input parameter.
    pub fn with_input(mut self, spec: ParamSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    /// Add a declared output field name.
    pub fn with_output(mut self, field: impl Into<String>) -> Self {
        self.outputs.push(field.into());
        self
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn param_kind_matching() {
        assert!(ParamKind::String.matches(&json!("x")));
        assert!(ParamKind::Number.matches(&json!(1.5)));
        assert!(ParamKind::Boolean.matches(&json!(true)));
        assert!(ParamKind::Array.matches(&json!([1, 2])));
        assert!(ParamKind::Geometry.matches(&json!({ "type": "Point" })));

        assert!(!ParamKind::Number.matches(&json!("1.5")));
        assert!(!ParamKind::Geometry.matches(&json!([1, 2])));
    }

    #[test]
    fn builder_accumulates_declarations() {
        let descriptor = ToolDescriptor::new("buffer", "Buffer", "builtin:buffer")
            .with_input(ParamSpec::required("geometry", ParamKind::Geometry))
            .with_input(ParamSpec::optional("distance", ParamKind::Number))
            .with_output("result");

        assert_eq!(descriptor.inputs.len(), 2);
        assert_eq!(descriptor.outputs, vec!["result"]);
        assert_eq!(descriptor.code_ref.as_deref(), Some("builtin:buffer"));
    }

    #[test]
    fn unloadable_descriptor_has_no_code_ref() {
        let descriptor = ToolDescriptor::unloadable("ghost", "Ghost");
        assert!(descriptor.code_ref.is_none());
    }
}
