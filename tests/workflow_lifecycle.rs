//! End-to-end workflow scenarios over the in-memory store: full
//! discovery → execution → finalization passes driven to terminal states.

mod common;

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cascade_core::handler::{StepContext, StepHandler, StepHandlerError};
use cascade_core::models::{StepTemplate, TaskTemplate};
use cascade_core::orchestration::FinalizationAction;
use cascade_core::state_machine::{TaskState, WorkflowStepState};
use cascade_core::store::WorkflowStore;

use common::{
    fast_config, AlwaysFailHandler, CountingHandler, FlakyHandler, RateLimitedOnceHandler,
    SlowHandler, SucceedHandler, TestHarness,
};

fn linear_template() -> TaskTemplate {
    TaskTemplate::new(
        "linear",
        "test",
        "1.0.0",
        vec![
            StepTemplate::new("s1", "s1_handler"),
            StepTemplate::new("s2", "s2_handler").depends_on(&["s1"]),
            StepTemplate::new("s3", "s3_handler").depends_on(&["s2"]),
            StepTemplate::new("s4", "s4_handler").depends_on(&["s3"]),
        ],
    )
}

fn diamond_template(branch_retry_limit: i32) -> TaskTemplate {
    TaskTemplate::new(
        "diamond",
        "test",
        "1.0.0",
        vec![
            StepTemplate::new("root", "root_handler"),
            StepTemplate::new("left", "left_handler").depends_on(&["root"]),
            StepTemplate::new("right", "right_handler")
                .depends_on(&["root"])
                .with_retry_limit(branch_retry_limit),
            StepTemplate::new("merge", "merge_handler").depends_on(&["left", "right"]),
        ],
    )
}

#[tokio::test]
async fn linear_dag_completes_when_all_handlers_succeed() {
    let harness = TestHarness::new(fast_config());
    for name in ["s1", "s2", "s3", "s4"] {
        harness
            .registry
            .register_handler(format!("{name}_handler"), Arc::new(SucceedHandler));
    }

    let task = harness.create_task(&linear_template()).await;
    let outcome = harness.run_until_terminal(task.task_id, 10).await;

    assert_eq!(outcome.finalization.action, FinalizationAction::Completed);
    assert_eq!(harness.task_state(task.task_id).await, TaskState::Complete);

    let task_row = harness.store.task(task.task_id).await.unwrap().unwrap();
    assert!(task_row.complete);

    for name in ["s1", "s2", "s3", "s4"] {
        let step = harness.step_by_name(task.task_id, name).await;
        assert!(step.processed, "step {name} should be processed");
        assert!(!step.in_process);
        assert_eq!(
            harness.step_state(step.workflow_step_id).await,
            WorkflowStepState::Complete
        );
        assert_eq!(step.results.as_ref().unwrap()["status"], "ok");
    }
}

#[tokio::test]
async fn transient_failure_keeps_task_pending_then_recovers() {
    let harness = TestHarness::new(fast_config());
    harness
        .registry
        .register_handler("s1_handler", Arc::new(SucceedHandler));
    harness
        .registry
        .register_handler("s2_handler", Arc::new(FlakyHandler::failing(1)));
    harness
        .registry
        .register_handler("s3_handler", Arc::new(SucceedHandler));
    harness
        .registry
        .register_handler("s4_handler", Arc::new(SucceedHandler));

    let task = harness.create_task(&linear_template()).await;

    // Pass 1 executes s1; pass 2 attempts s2, which fails once.
    harness.coordinator.run_pass(task.task_id).await.unwrap();
    let outcome = harness.coordinator.run_pass(task.task_id).await.unwrap();

    assert_eq!(outcome.finalization.action, FinalizationAction::Reenqueued);
    assert_eq!(harness.task_state(task.task_id).await, TaskState::Pending);

    let s2 = harness.step_by_name(task.task_id, "s2").await;
    assert_eq!(
        harness.step_state(s2.workflow_step_id).await,
        WorkflowStepState::Error
    );
    assert_eq!(s2.attempts, 1);
    assert!(s2.attempts < s2.retry_limit);
    assert!(!s2.processed);

    // Retry succeeds and the workflow runs to completion.
    let outcome = harness.run_until_terminal(task.task_id, 10).await;
    assert_eq!(outcome.finalization.action, FinalizationAction::Completed);

    let s2 = harness.step_by_name(task.task_id, "s2").await;
    assert!(s2.processed);
    assert_eq!(s2.attempts, 1);
    assert_eq!(s2.results.as_ref().unwrap()["attempt"], 2);
}

#[tokio::test]
async fn diamond_with_exhausted_branch_blocks_and_fails_task() {
    let harness = TestHarness::new(fast_config());
    harness
        .registry
        .register_handler("root_handler", Arc::new(SucceedHandler));
    harness
        .registry
        .register_handler("left_handler", Arc::new(SucceedHandler));
    harness
        .registry
        .register_handler("right_handler", Arc::new(AlwaysFailHandler::retryable()));
    harness
        .registry
        .register_handler("merge_handler", Arc::new(SucceedHandler));

    let task = harness.create_task(&diamond_template(2)).await;
    let outcome = harness.run_until_terminal(task.task_id, 10).await;

    assert_eq!(outcome.finalization.action, FinalizationAction::Failed);
    assert_eq!(harness.task_state(task.task_id).await, TaskState::Error);

    let right = harness.step_by_name(task.task_id, "right").await;
    assert_eq!(right.attempts, 2);
    assert!(right.retries_exhausted());
    assert_eq!(
        harness.step_state(right.workflow_step_id).await,
        WorkflowStepState::Error
    );

    // The healthy branch completed; the convergence step never became ready.
    let left = harness.step_by_name(task.task_id, "left").await;
    assert!(left.processed);
    let merge = harness.step_by_name(task.task_id, "merge").await;
    assert!(!merge.processed);
    assert_eq!(
        harness.step_state(merge.workflow_step_id).await,
        WorkflowStepState::Pending
    );
}

#[tokio::test]
async fn permanent_failure_voids_retry_budget_immediately() {
    let harness = TestHarness::new(fast_config());
    harness
        .registry
        .register_handler("root_handler", Arc::new(SucceedHandler));
    harness
        .registry
        .register_handler("left_handler", Arc::new(SucceedHandler));
    harness
        .registry
        .register_handler("right_handler", Arc::new(AlwaysFailHandler::permanent()));
    harness
        .registry
        .register_handler("merge_handler", Arc::new(SucceedHandler));

    let task = harness.create_task(&diamond_template(5)).await;
    let outcome = harness.run_until_terminal(task.task_id, 10).await;

    assert_eq!(outcome.finalization.action, FinalizationAction::Failed);
    let right = harness.step_by_name(task.task_id, "right").await;
    assert_eq!(right.attempts, 1);
    assert!(!right.retryable);
}

#[tokio::test]
async fn concurrent_passes_never_double_execute_a_step() {
    let harness = TestHarness::new(fast_config());
    let invocations = Arc::new(AtomicUsize::new(0));
    harness.registry.register_handler(
        "only_handler",
        Arc::new(CountingHandler::new(
            invocations.clone(),
            Duration::from_millis(50),
        )),
    );

    let template = TaskTemplate::new(
        "single",
        "test",
        "1.0.0",
        vec![StepTemplate::new("only", "only_handler")],
    );
    let task = harness.create_task(&template).await;

    // Two simultaneous passes over the same task: the in_process claim plus
    // the readiness filter must exclude the step from one of them.
    let (a, b) = tokio::join!(
        harness.coordinator.run_pass(task.task_id),
        harness.coordinator.run_pass(task.task_id),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let outcome = harness.run_until_terminal(task.task_id, 5).await;
    assert_eq!(outcome.finalization.action, FinalizationAction::Completed);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_in_one_step_does_not_affect_siblings() {
    let harness = TestHarness::new(fast_config());
    harness.registry.register_handler(
        "slow_handler",
        Arc::new(SlowHandler {
            delay: Duration::from_secs(300),
        }),
    );
    harness
        .registry
        .register_handler("fast_handler", Arc::new(SucceedHandler));

    // Three independent roots, executed concurrently; the slow one times
    // out at 1s and has no retry budget left afterwards.
    let template = TaskTemplate::new(
        "parallel",
        "test",
        "1.0.0",
        vec![
            StepTemplate::new("slow", "slow_handler")
                .with_timeout_seconds(1)
                .with_retry_limit(1),
            StepTemplate::new("fast_a", "fast_handler"),
            StepTemplate::new("fast_b", "fast_handler"),
        ],
    );
    let task = harness.create_task(&template).await;
    let outcome = harness.run_until_terminal(task.task_id, 5).await;

    // Siblings in the same batch completed and were recorded complete.
    for name in ["fast_a", "fast_b"] {
        let step = harness.step_by_name(task.task_id, name).await;
        assert!(step.processed, "sibling {name} should have completed");
    }

    let slow = harness.step_by_name(task.task_id, "slow").await;
    assert!(!slow.processed);
    assert_eq!(
        harness.step_state(slow.workflow_step_id).await,
        WorkflowStepState::Error
    );
    assert_eq!(outcome.finalization.action, FinalizationAction::Failed);

    let transitions = harness
        .store
        .step_transitions(slow.workflow_step_id)
        .await
        .unwrap();
    let failure = transitions.last().unwrap();
    assert!(failure.reason.as_ref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn rate_limit_hint_drives_reenqueue_delay() {
    let mut config = fast_config();
    config.backoff.buffer_seconds = 5;
    let harness = TestHarness::new(config);
    harness
        .registry
        .register_handler("api_handler", Arc::new(RateLimitedOnceHandler::new(120)));

    let template = TaskTemplate::new(
        "rate_limited",
        "test",
        "1.0.0",
        vec![StepTemplate::new("call_api", "api_handler")],
    );
    let task = harness.create_task(&template).await;

    let outcome = harness.coordinator.run_pass(task.task_id).await.unwrap();

    assert_eq!(outcome.finalization.action, FinalizationAction::Reenqueued);
    let delay = outcome.finalization.delay_seconds.unwrap();
    assert!(
        (120..=130).contains(&delay),
        "expected backoff-derived delay, got {delay}"
    );

    let step = harness.step_by_name(task.task_id, "call_api").await;
    assert_eq!(step.backoff_request_seconds, Some(120));
    assert_eq!(harness.task_state(task.task_id).await, TaskState::Pending);
}

#[tokio::test]
async fn parent_results_are_visible_to_children() {
    struct EchoParentHandler;

    #[async_trait]
    impl StepHandler for EchoParentHandler {
        async fn process(&self, context: &StepContext) -> Result<Value, StepHandlerError> {
            let parent_status = context
                .previous_results
                .get("a")
                .and_then(|v| v.get("status"))
                .cloned()
                .unwrap_or(Value::Null);
            Ok(json!({"parent_status": parent_status}))
        }
    }

    let harness = TestHarness::new(fast_config());
    harness
        .registry
        .register_handler("a_handler", Arc::new(SucceedHandler));
    harness
        .registry
        .register_handler("b_handler", Arc::new(EchoParentHandler));

    let template = TaskTemplate::new(
        "chained",
        "test",
        "1.0.0",
        vec![
            StepTemplate::new("a", "a_handler"),
            StepTemplate::new("b", "b_handler").depends_on(&["a"]),
        ],
    );
    let task = harness.create_task(&template).await;
    harness.run_until_terminal(task.task_id, 5).await;

    let b = harness.step_by_name(task.task_id, "b").await;
    assert_eq!(b.results.as_ref().unwrap()["parent_status"], "ok");
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let harness = TestHarness::new(fast_config());
    harness
        .registry
        .register_handler("s1_handler", Arc::new(SucceedHandler));

    let template = TaskTemplate::new(
        "observed",
        "test",
        "1.0.0",
        vec![StepTemplate::new("s1", "s1_handler")],
    );

    let mut receiver = harness.publisher.subscribe();
    let task = harness.create_task(&template).await;
    harness.run_until_terminal(task.task_id, 5).await;

    let mut seen = std::collections::HashSet::new();
    while let Ok(event) = receiver.try_recv() {
        seen.insert(event.name);
    }

    for expected in [
        "task.initialized",
        "workflow.viable_steps_discovered",
        "step.execution_started",
        "step.execution_completed",
        "step.transition",
        "task.transition",
        "task.finalization_completed",
        "task.completed",
    ] {
        assert!(seen.contains(expected), "missing event {expected}");
    }
}

#[tokio::test]
async fn unknown_handler_binding_is_a_permanent_failure() {
    let harness = TestHarness::new(fast_config());
    // Nothing registered under "ghost_handler".
    let template = TaskTemplate::new(
        "unbound",
        "test",
        "1.0.0",
        vec![StepTemplate::new("ghost", "ghost_handler").with_retry_limit(5)],
    );
    let task = harness.create_task(&template).await;
    let outcome = harness.run_until_terminal(task.task_id, 5).await;

    assert_eq!(outcome.finalization.action, FinalizationAction::Failed);
    let ghost = harness.step_by_name(task.task_id, "ghost").await;
    assert!(!ghost.retryable);
    assert_eq!(ghost.attempts, 1);
}
