//! Workflow validation — run before a workflow is accepted for execution.
//!
//! Rules enforced:
//! 1. Step IDs must be unique within the workflow.
//! 2. Every `depends_on` entry must reference a declared step ID.
//! 3. A step may only depend on steps declared *before* it — execution is
//!    in declaration order, so a forward dependency would fail at run time
//!    on every execution.

use std::collections::HashMap;

use crate::{EngineError, ExecutionStep};

/// Validate a workflow's step list.
///
/// # Errors
/// - [`EngineError::DuplicateStepId`] if two steps share an ID.
/// - [`EngineError::UnknownStepReference`] if a dependency names a missing
///   step.
/// - [`EngineError::ForwardDependency`] if a dependency names a
///   later-declared step.
pub fn validate_workflow(steps: &[ExecutionStep]) -> Result<(), EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure step IDs are unique, remembering declaration positions.
    // -----------------------------------------------------------------------
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        if positions.insert(step.id.as_str(), index).is_some() {
            return Err(EngineError::DuplicateStepId(step.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2/3. Validate dependency references and their declaration order.
    // -----------------------------------------------------------------------
    for (index, step) in steps.iter().enumerate() {
        for reference in &step.depends_on {
            match positions.get(reference.as_str()) {
                None => {
                    return Err(EngineError::UnknownStepReference {
                        step_id: step.id.clone(),
                        reference: reference.clone(),
                    });
                }
                Some(&dep_index) if dep_index >= index => {
                    return Err(EngineError::ForwardDependency {
                        step_id: step.id.clone(),
                        reference: reference.clone(),
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use uuid::Uuid;

    fn make_step(id: &str, depends_on: &[&str]) -> ExecutionStep {
        ExecutionStep {
            id: id.to_string(),
            track_id: Uuid::new_v4(),
            tool_id: "mock".into(),
            input: Map::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            condition: None,
            max_retries: 3,
            timeout_ms: 300_000,
        }
    }

    #[test]
    fn well_ordered_chain_is_valid() {
        let steps = vec![
            make_step("a", &[]),
            make_step("b", &["a"]),
            make_step("c", &["a", "b"]),
        ];
        assert!(validate_workflow(&steps).is_ok());
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let steps = vec![make_step("a", &[]), make_step("a", &[])];
        assert!(matches!(
            validate_workflow(&steps),
            Err(EngineError::DuplicateStepId(id)) if id == "a"
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let steps = vec![make_step("a", &["ghost"])];
        assert!(matches!(
            validate_workflow(&steps),
            Err(EngineError::UnknownStepReference { reference, .. }) if reference == "ghost"
        ));
    }

    #[test]
    fn forward_dependency_is_rejected() {
        // 'a' depends on 'b', but 'b' runs after 'a'.
        let steps = vec![make_step("a", &["b"]), make_step("b", &[])];
        assert!(matches!(
            validate_workflow(&steps),
            Err(EngineError::ForwardDependency { step_id, reference }) if step_id == "a" && reference == "b"
        ));
    }

    #[test]
    fn self_dependency_is_a_forward_dependency() {
        let steps = vec![make_step("a", &["a"])];
        assert!(matches!(
            validate_workflow(&steps),
            Err(EngineError::ForwardDependency { .. })
        ));
    }

    #[test]
    fn empty_workflow_is_valid() {
        assert!(validate_workflow(&[]).is_ok());
    }
}
