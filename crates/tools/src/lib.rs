//! `tools` crate — the `ExecutableTool` trait, tool descriptors, and the registry.
//!
//! Every analysis tool — built-in and externally loaded alike — must implement
//! [`ExecutableTool`]. The executor crate dispatches execution through this
//! trait object; the descriptor tells it what inputs the tool declares.

pub mod descriptor;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use descriptor::{ParamKind, ParamSpec, ToolDescriptor};
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use traits::{ExecutableTool, ProgressSender, ToolContext};
