//! Tool registry — descriptors by id, runners by code reference.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{ExecutableTool, ToolDescriptor};

/// Maps tool ids to descriptors and code references to runnable
/// implementations.
///
/// The registry is populated once at startup and then shared read-only, so a
/// plain `HashMap` behind `Arc<ToolRegistry>` is enough.
#[derive(Default)]
pub struct ToolRegistry {
    descriptors: HashMap<String, ToolDescriptor>,
    runners: HashMap<String, Arc<dyn ExecutableTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor together with its implementation.
    ///
    /// The runner is keyed by the descriptor's `code_ref`; a descriptor
    /// without one is registered as catalog-only (visible but not runnable).
    pub fn register(&mut self, descriptor: ToolDescriptor, runner: Arc<dyn ExecutableTool>) {
        if let Some(code_ref) = descriptor.code_ref.clone() {
            self.runners.insert(code_ref, runner);
        }
        self.descriptors.insert(descriptor.id.clone(), descriptor);
    }

    /// Register a catalog-only descriptor with no implementation.
    pub fn register_descriptor(&mut self, descriptor: ToolDescriptor) {
        self.descriptors.insert(descriptor.id.clone(), descriptor);
    }

    /// Look up a descriptor by tool id.
    pub fn descriptor(&self, tool_id: &str) -> Option<&ToolDescriptor> {
        self.descriptors.get(tool_id)
    }

    /// Look up a runnable implementation by code reference.
    pub fn runner(&self, code_ref: &str) -> Option<Arc<dyn ExecutableTool>> {
        self.runners.get(code_ref).cloned()
    }

    /// All registered descriptors, in no particular order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.descriptors.values()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTool;
    use serde_json::json;

    #[test]
    fn registered_tool_is_resolvable_by_id_and_code_ref() {
        let mut registry = ToolRegistry::new();
        let descriptor = ToolDescriptor::new("echo", "Echo", "builtin:echo");
        registry.register(descriptor, Arc::new(MockTool::returning("echo", json!({}))));

        assert!(registry.descriptor("echo").is_some());
        assert!(registry.runner("builtin:echo").is_some());
        assert!(registry.runner("builtin:missing").is_none());
    }

    #[test]
    fn catalog_only_descriptor_has_no_runner() {
        let mut registry = ToolRegistry::new();
        registry.register_descriptor(ToolDescriptor::unloadable("ghost", "Ghost"));

        assert!(registry.descriptor("ghost").is_some());
        assert_eq!(registry.descriptors().count(), 1);
    }
}
