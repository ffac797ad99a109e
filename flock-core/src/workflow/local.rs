//! In-process orchestration loop

use chrono::Utc;

use super::activities::{NextStep, determine_next_agent, execute_agent};
use super::execution::{ChainState, RunResult};
use crate::context::FlockContext;
use crate::error::Result;
use crate::registry::Registry;

/// Run a chain from `start_agent` until no next agent is chosen.
///
/// Exactly one agent runs at a time. An agent's outputs are recorded in
/// `context` before the next agent's inputs are resolved. With `max_steps`
/// set, the chain stops after that many agent runs.
pub async fn run_local(
    registry: &Registry,
    start_agent: &str,
    mut context: FlockContext,
    max_steps: Option<usize>,
) -> Result<RunResult> {
    let run_id = context.run_id().to_string();
    let mut state = ChainState::Running;
    let mut step = NextStep::start(start_agent);
    let mut last_result;
    let mut steps = 0;

    tracing::info!(run_id = %run_id, start_agent = %start_agent, "Run started");

    loop {
        last_result = match execute_agent(registry, &step, &mut context, Utc::now()).await {
            Ok(result) => result,
            Err(err) => {
                state.advance(ChainState::Error, &run_id, &step.agent);
                return Err(err);
            }
        };
        steps += 1;

        state.advance(ChainState::Routing, &run_id, &step.agent);
        let next = match determine_next_agent(registry, &step.agent, &last_result, &mut context).await {
            Ok(next) => next,
            Err(err) => {
                state.advance(ChainState::Error, &run_id, &step.agent);
                return Err(err);
            }
        };

        let Some(next) = next else {
            state.advance(ChainState::Terminated, &run_id, &step.agent);
            break;
        };
        state.advance(ChainState::Running, &run_id, &next.agent);

        if max_steps.is_some_and(|max| steps >= max) {
            tracing::warn!(run_id = %run_id, steps, next_agent = %next.agent, "Step limit reached");
            break;
        }
        step = next;
    }

    tracing::info!(run_id = %run_id, steps, state = %state, "Run finished");
    Ok(RunResult {
        result: last_result,
        context,
        last_agent: step.agent,
        state,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FlockAgent;
    use crate::evaluators::StubEvaluator;
    use crate::routing::DefaultRouter;
    use serde_json::json;
    use std::sync::Arc;

    fn looping_registry() -> Registry {
        let registry = Registry::new();
        for (name, next) in [("ping", "pong"), ("pong", "ping")] {
            registry.register_agent(
                FlockAgent::builder(name)
                    .output("n: int")
                    .evaluator(Arc::new(StubEvaluator::new()))
                    .router(Arc::new(DefaultRouter::to(next)))
                    .build(),
            );
        }
        registry
    }

    #[tokio::test]
    async fn test_step_bound_stops_cycles() {
        let registry = looping_registry();
        let run = run_local(&registry, "ping", FlockContext::new(), Some(3))
            .await
            .unwrap();

        assert_eq!(run.steps, 3);
        assert_eq!(run.agents(), vec!["ping", "pong", "ping"]);
        assert_eq!(run.last_agent, "ping");
        assert_eq!(run.state, ChainState::Running);
    }

    #[tokio::test]
    async fn test_no_router_terminates_after_one_step() {
        let registry = Registry::new();
        registry.register_agent(
            FlockAgent::builder("solo")
                .output("answer")
                .evaluator(Arc::new(StubEvaluator::new().with_response("answer", json!(42))))
                .build(),
        );

        let run = run_local(&registry, "solo", FlockContext::new(), None).await.unwrap();
        assert!(run.is_terminated());
        assert_eq!(run.steps, 1);
        assert_eq!(run.result["answer"], 42);
    }

    #[tokio::test]
    async fn test_unknown_start_agent() {
        let err = run_local(&Registry::new(), "nobody", FlockContext::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::FlockError::AgentNotFound(_)));
    }
}
