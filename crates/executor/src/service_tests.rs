//! Integration tests for the Execution Service.
//!
//! These use `MockTool` so no real tool implementation is required; timer
//! behaviour runs under tokio's paused test clock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use tools::mock::MockTool;
use tools::{ParamKind, ParamSpec, ToolDescriptor, ToolRegistry};

use crate::{
    ContextPool, ExecutionError, ExecutionOptions, ExecutionService, ExecutionStatus,
    ServiceConfig,
};

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// Build a service with a single registered mock tool.
fn service_with(tool: MockTool) -> (ExecutionService, ToolDescriptor) {
    let descriptor = ToolDescriptor::new("buffer", "Buffer", "builtin:buffer")
        .with_input(ParamSpec::required("distance", ParamKind::Number))
        .with_output("result");

    let mut registry = ToolRegistry::new();
    registry.register(descriptor.clone(), Arc::new(tool));

    let service = ExecutionService::new(
        Arc::new(registry),
        ContextPool::new(),
        ServiceConfig::default(),
    );
    (service, descriptor)
}

#[tokio::test]
async fn valid_request_resolves_to_completed_result() {
    let (service, descriptor) = service_with(MockTool::returning(
        "buffer",
        json!({ "result": { "rings": 1 } }),
    ));

    let outcome = service
        .execute(
            &descriptor,
            object(json!({ "distance": 10.0 })),
            ExecutionOptions::default(),
        )
        .await
        .expect("execution should succeed");

    assert_eq!(outcome.result["result"]["rings"], 1);
    assert!(outcome.warnings.is_empty());

    let progress = service.progress(&outcome.execution_id).expect("record kept");
    assert_eq!(progress.status, ExecutionStatus::Completed);
    assert_eq!(progress.progress, 100);
    assert!(progress.finished_at.is_some());
}

#[tokio::test]
async fn missing_required_input_never_spawns_a_context() {
    let (service, descriptor) = service_with(MockTool::returning("buffer", json!({})));

    let err = service
        .execute(&descriptor, object(json!({})), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(service.pool().active(), 0);
    // No progress record was ever created for the rejected request.
    assert!(service.list().is_empty());
}

#[tokio::test]
async fn descriptor_without_code_ref_is_a_validation_error() {
    let (service, _) = service_with(MockTool::returning("buffer", json!({})));
    let ghost = ToolDescriptor::unloadable("ghost", "Ghost");

    let err = service
        .execute(&ghost, object(json!({})), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn unregistered_code_ref_is_a_validation_error() {
    let (service, _) = service_with(MockTool::returning("buffer", json!({})));
    let unknown = ToolDescriptor::new("clip", "Clip", "builtin:clip");

    let err = service
        .execute(&unknown, object(json!({})), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn skipping_input_validation_accepts_incomplete_input() {
    let (service, descriptor) = service_with(MockTool::returning("buffer", json!({ "result": 1 })));

    let outcome = service
        .execute(
            &descriptor,
            object(json!({})),
            ExecutionOptions { validate_input: false, ..Default::default() },
        )
        .await
        .expect("validation was disabled");

    assert_eq!(outcome.result["result"], 1);
}

#[tokio::test]
async fn fatal_tool_failure_is_not_retryable() {
    let (service, descriptor) = service_with(MockTool::failing_fatal("buffer", "bad geometry"));

    let err = service
        .execute(
            &descriptor,
            object(json!({ "distance": 1 })),
            ExecutionOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "EXECUTION_ERROR");
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("bad geometry"));
}

#[tokio::test]
async fn retryable_tool_failure_keeps_the_retryable_bit() {
    let (service, descriptor) = service_with(MockTool::failing_retryable("buffer", "flaky io"));

    let err = service
        .execute(
            &descriptor,
            object(json!({ "distance": 1 })),
            ExecutionOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Execution { retryable: true, .. }));
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_the_request_and_marks_the_record() {
    let (service, descriptor) = service_with(MockTool::hanging("buffer"));
    let service = Arc::new(service);

    let err = service
        .execute(
            &descriptor,
            object(json!({ "distance": 1 })),
            ExecutionOptions { timeout: Some(Duration::from_millis(50)), ..Default::default() },
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "TIMEOUT");
    assert!(err.is_retryable());

    let records = service.list();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_immediate_and_late_reports_are_ignored() {
    let (service, descriptor) = service_with(MockTool::delayed(
        "buffer",
        Duration::from_secs(5),
        json!({ "result": 1 }),
    ));
    let service = Arc::new(service);

    let task = {
        let service = service.clone();
        let descriptor = descriptor.clone();
        tokio::spawn(async move {
            service
                .execute(
                    &descriptor,
                    object(json!({ "distance": 1 })),
                    ExecutionOptions::default(),
                )
                .await
        })
    };

    // Let the execution get underway, then cancel it mid-flight.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let records = service.list();
    assert_eq!(records.len(), 1);
    let execution_id = records[0].execution_id.clone();
    assert!(!records[0].status.is_terminal());

    service.cancel(&execution_id);

    let progress = service.progress(&execution_id).expect("record kept");
    assert_eq!(progress.status, ExecutionStatus::Cancelled);

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "EXECUTION_ERROR");
    assert!(!err.is_retryable());

    // The context eventually completes and reports success; the record must
    // stay cancelled.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let progress = service.progress(&execution_id).expect("record kept");
    assert_eq!(progress.status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn progress_reports_are_monotonic_and_observable() {
    let (service, descriptor) = service_with(
        MockTool::returning("buffer", json!({ "result": 1 })).with_progress(vec![30, 20, 80]),
    );

    let outcome = service
        .execute(
            &descriptor,
            object(json!({ "distance": 1 })),
            ExecutionOptions::default(),
        )
        .await
        .expect("execution should succeed");

    // Terminal record pins progress at 100; the out-of-order 20 never
    // lowered the observed value on the way there.
    let progress = service.progress(&outcome.execution_id).unwrap();
    assert_eq!(progress.progress, 100);
    assert_eq!(progress.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn missing_declared_outputs_are_advisory_warnings() {
    let (service, descriptor) = service_with(MockTool::returning("buffer", json!({ "extra": 1 })));

    let outcome = service
        .execute(
            &descriptor,
            object(json!({ "distance": 1 })),
            ExecutionOptions::default(),
        )
        .await
        .expect("missing outputs are not fatal");

    assert_eq!(outcome.warnings, vec!["result"]);
}

#[tokio::test]
async fn removed_records_are_no_longer_tracked() {
    let (service, descriptor) = service_with(MockTool::returning("buffer", json!({ "result": 1 })));

    let outcome = service
        .execute(
            &descriptor,
            object(json!({ "distance": 1 })),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();

    assert!(service.progress(&outcome.execution_id).is_some());
    service.remove(&outcome.execution_id);
    assert!(service.progress(&outcome.execution_id).is_none());
}

#[tokio::test]
async fn subscription_delivers_the_terminal_state() {
    let (service, descriptor) = service_with(MockTool::delayed(
        "buffer",
        Duration::from_millis(20),
        json!({ "result": 1 }),
    ));
    let service = Arc::new(service);

    let task = {
        let service = service.clone();
        let descriptor = descriptor.clone();
        tokio::spawn(async move {
            service
                .execute(
                    &descriptor,
                    object(json!({ "distance": 1 })),
                    ExecutionOptions::default(),
                )
                .await
        })
    };

    // Find the in-flight execution and watch it finish.
    let mut rx = loop {
        if let Some(record) = service.list().into_iter().next() {
            break service.subscribe(&record.execution_id).expect("tracked");
        }
        tokio::task::yield_now().await;
    };

    while !rx.borrow().status.is_terminal() {
        rx.changed().await.expect("sender alive while tracked");
    }
    assert_eq!(rx.borrow().status, ExecutionStatus::Completed);

    task.await.unwrap().expect("execution succeeded");
}
