//! `executor` crate — the Execution Service and its isolated context pool.
//!
//! One `execute` call brokers one tool invocation: validate the input against
//! the descriptor, spawn exactly one isolated execution context, track
//! progress through an explicit state machine, enforce the timeout, and
//! settle the caller's future with the result or a typed error.

pub mod context;
pub mod error;
pub mod progress;
pub mod service;
pub mod validation;

pub use context::ContextPool;
pub use error::ExecutionError;
pub use progress::{ExecutionProgress, ExecutionStatus};
pub use service::{ExecutionOptions, ExecutionOutcome, ExecutionService, ServiceConfig};

#[cfg(test)]
mod service_tests;
