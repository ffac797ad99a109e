//! End-to-end chain behaviour in both execution modes

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

use flock_core::context::FEEDBACK_KEY;
use flock_core::llm::{LLMProvider, LLMRequest, LLMResponse};
use flock_core::prelude::*;

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn stub(responses: Value) -> Arc<StubEvaluator> {
    let evaluator = object(responses)
        .into_iter()
        .fold(StubEvaluator::new(), |stub, (field, value)| stub.with_response(field, value));
    Arc::new(evaluator)
}

/// Replies with the same text to every request
struct FixedReply(String);

#[async_trait]
impl LLMProvider for FixedReply {
    async fn generate_request(&self, _request: &LLMRequest) -> Result<LLMResponse> {
        Ok(LLMResponse {
            content: self.0.clone(),
            usage: None,
        })
    }
}

/// A greets, B shouts the greeting
fn greeting_flock(config: FlockConfig) -> Flock {
    let mut flock = Flock::new(config);
    flock.add_agent(
        FlockAgent::builder("A")
            .input("")
            .output("greeting: str")
            .evaluator(stub(json!({"greeting": "hello"})))
            .router(Arc::new(DefaultRouter::to("B")))
            .build(),
    );
    flock.add_agent(
        FlockAgent::builder("B")
            .input("greeting")
            .output("shout: str")
            .evaluator(stub(json!({"shout": "HELLO"})))
            .build(),
    );
    flock
}

#[tokio::test]
async fn test_two_agent_chain() {
    let flock = greeting_flock(FlockConfig::default());
    let run = flock.run("A", Map::new()).await.unwrap();

    let history = run.context.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].agent, "A");
    assert_eq!(history[0].data, object(json!({"greeting": "hello"})));
    assert_eq!(history[1].agent, "B");
    assert_eq!(history[1].data, object(json!({"shout": "HELLO"})));
    assert_eq!(history[1].called_from, "A");
    assert_eq!(history[0].hand_off.as_ref().unwrap().next_agent, "B");

    assert_eq!(run.result, history[1].data);
    assert_eq!(run.last_agent, "B");
    assert!(run.is_terminated());
    assert_eq!(run.context.get_variable("B.shout"), Some(&json!("HELLO")));
}

#[tokio::test]
async fn test_empty_decision_runs_once() {
    let mut flock = Flock::new(FlockConfig::default());
    flock.add_agent(
        FlockAgent::builder("A")
            .output("answer: int")
            .evaluator(stub(json!({"answer": 42})))
            .router(Arc::new(DefaultRouter::request(HandOffRequest::to(""))))
            .build(),
    );

    let run = flock.run("A", Map::new()).await.unwrap();
    assert_eq!(run.steps, 1);
    assert_eq!(run.result, object(json!({"answer": 42})));
    assert_eq!(run.state, ChainState::Terminated);
}

#[tokio::test]
async fn test_add_mode_extends_next_signature() {
    let mut flock = Flock::new(FlockConfig::default());
    flock.add_agent(
        FlockAgent::builder("A")
            .output("x: int, y: int")
            .evaluator(stub(json!({"x": 1, "y": 2})))
            .router(Arc::new(DefaultRouter::to("B").with_mode(HandOffMode::Add)))
            .build(),
    );
    // B echoes whatever it was given
    flock.add_agent(
        FlockAgent::builder("B")
            .input("z")
            .output("z, x, y")
            .evaluator(Arc::new(StubEvaluator::new()))
            .build(),
    );

    let run = flock.run("A", object(json!({"z": 0}))).await.unwrap();
    assert_eq!(run.result, object(json!({"z": 0, "x": 1, "y": 2})));
    assert_eq!(flock.agent("B").unwrap().input(), "z");
}

#[tokio::test]
async fn test_hand_off_input_reaches_next_agent_in_match_mode() {
    let mut flock = Flock::new(FlockConfig::default());
    flock.add_agent(
        FlockAgent::builder("A")
            .output("x: int")
            .evaluator(stub(json!({"x": 1})))
            .router(Arc::new(DefaultRouter::request(
                HandOffRequest::to("B").with_input(object(json!({"hint": "be brief"}))),
            )))
            .build(),
    );
    // B declares only x but echoes the hint it was handed
    flock.add_agent(
        FlockAgent::builder("B")
            .input("x")
            .output("x, hint")
            .evaluator(Arc::new(StubEvaluator::new()))
            .build(),
    );

    let run = flock.run("A", Map::new()).await.unwrap();
    assert_eq!(run.result, object(json!({"x": 1, "hint": "be brief"})));
    assert_eq!(flock.agent("B").unwrap().input(), "x");
}

#[tokio::test]
async fn test_low_confidence_terminates() {
    let provider = Arc::new(FixedReply(
        r#"{"next_agent": "B", "score": 0.4, "reasoning": "unsure"}"#.to_string(),
    ));
    let mut flock = greeting_flock(FlockConfig::default());
    let mut a = flock.agent("A").unwrap().as_ref().clone();
    a.set_router(Some(Arc::new(LlmRouter::new(
        provider,
        LlmRouterConfig {
            confidence_threshold: 0.6,
            ..Default::default()
        },
    ))));
    flock.add_agent(a);

    let run = flock.run("A", Map::new()).await.unwrap();
    assert_eq!(run.agents(), vec!["A"]);
    assert!(run.context.history()[0].hand_off.as_ref().unwrap().next_agent.is_empty());
}

#[tokio::test]
async fn test_feedback_retries_are_bounded() {
    let mut flock = Flock::new(FlockConfig::default());
    flock.add_agent(
        FlockAgent::builder("writer")
            .output("body: str")
            .evaluator(stub(json!({"body": "short"})))
            .module(Arc::new(AssertionModule::with_rules(
                "checks",
                vec![AssertionRule::MinLength {
                    field: "body".to_string(),
                    min: 10,
                }],
            )))
            .router(Arc::new(FeedbackRetryRouter::new(FeedbackRetryConfig {
                max_retries: 2,
                fallback_agent: Some("fallback".to_string()),
                ..Default::default()
            })))
            .build(),
    );
    flock.add_agent(
        FlockAgent::builder("fallback")
            .output("done: bool")
            .evaluator(stub(json!({"done": true})))
            .build(),
    );

    let run = flock.run("writer", Map::new()).await.unwrap();
    assert_eq!(run.agents(), vec!["writer", "writer", "writer", "fallback"]);

    let writer_runs = run.context.get_agent_history("writer");
    assert!(writer_runs[0].is_start());
    assert_eq!(writer_runs[1].called_from, "writer");
    assert!(run.context.get_variable(FEEDBACK_KEY).is_some());
    assert_eq!(
        run.context.get_variable("flock.retry_count.writer"),
        Some(&json!(0))
    );
}

#[tokio::test]
async fn test_missing_input_is_fatal() {
    let mut flock = Flock::new(FlockConfig::default());
    flock.add_agent(
        FlockAgent::builder("A")
            .input("topic")
            .evaluator(stub(json!({})))
            .build(),
    );

    let err = flock.run("A", Map::new()).await.unwrap_err();
    assert!(matches!(err, FlockError::Resolution { .. }));
}

#[tokio::test]
async fn test_deepcopy_is_isolated() {
    let flock = greeting_flock(FlockConfig::default());
    let run = flock.run("A", Map::new()).await.unwrap();

    let mut copy = run.context.deepcopy();
    copy.set_variable("A.greeting", json!("changed"));
    copy.state_mut().insert("extra".to_string(), json!(true));

    assert_eq!(run.context.get_variable("A.greeting"), Some(&json!("hello")));
    assert!(run.context.get_variable("extra").is_none());
    assert_eq!(copy.history().len(), run.context.history().len());
}

#[tokio::test]
async fn test_durable_run_matches_in_process_history() {
    let flock = greeting_flock(FlockConfig::default());
    let engine = LocalWorkflowEngine::new(&flock.config().durable);

    let local = flock.run("A", Map::new()).await.unwrap();
    let durable = flock.run_durable(&engine, "A", Map::new()).await.unwrap();

    let shape = |run: &RunResult| -> Vec<(String, Map<String, Value>, String, Option<String>)> {
        run.context
            .history()
            .iter()
            .map(|r| {
                (
                    r.agent.clone(),
                    r.data.clone(),
                    r.called_from.clone(),
                    r.hand_off.as_ref().map(|h| h.next_agent.clone()),
                )
            })
            .collect()
    };
    assert_eq!(shape(&local), shape(&durable));
    assert_eq!(local.result, durable.result);
    assert_eq!(durable.state, ChainState::Terminated);

    // Records carry the workflow clock, not wall time
    let started = durable.context.workflow_timestamp();
    assert!(durable.context.history().iter().all(|r| r.timestamp == started));
    assert!(!durable.context.workflow_id().is_empty());
}

#[tokio::test]
async fn test_durable_retries_transient_evaluation_errors() {
    let mut config = FlockConfig::default();
    config.durable.retry_policy = RetryPolicy::default()
        .with_maximum_attempts(3)
        .with_initial_interval(Duration::from_millis(1));

    let mut flock = Flock::new(config);
    flock.add_agent(
        FlockAgent::builder("flaky")
            .output("ok: bool")
            .evaluator(Arc::new(
                StubEvaluator::new()
                    .with_response("ok", json!(true))
                    .failing_times(2),
            ))
            .build(),
    );

    let engine = LocalWorkflowEngine::new(&flock.config().durable);
    let run = flock.run_durable(&engine, "flaky", Map::new()).await.unwrap();

    assert_eq!(run.result, object(json!({"ok": true})));
    assert_eq!(run.context.history().len(), 1);
}

#[tokio::test]
async fn test_durable_unknown_next_agent_is_not_retried() {
    let mut flock = Flock::new(FlockConfig::default());
    flock.add_agent(
        FlockAgent::builder("A")
            .evaluator(stub(json!({})))
            .router(Arc::new(DefaultRouter::to("ghost")))
            .build(),
    );

    let engine = LocalWorkflowEngine::new(&flock.config().durable);
    let err = flock.run_durable(&engine, "A", Map::new()).await.unwrap_err();
    assert!(matches!(err, FlockError::NextAgentNotFound(ref name) if name == "ghost"));
}

#[tokio::test]
async fn test_max_steps_from_config() {
    let mut config = FlockConfig::default();
    config.execution.max_steps = Some(2);

    let mut flock = Flock::new(config);
    flock.add_agent(
        FlockAgent::builder("loop")
            .evaluator(stub(json!({})))
            .router(Arc::new(DefaultRouter::to("loop")))
            .build(),
    );

    let run = flock.run("loop", Map::new()).await.unwrap();
    assert_eq!(run.steps, 2);
    assert_eq!(run.state, ChainState::Running);
}
