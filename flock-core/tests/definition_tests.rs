//! Flocks defined in YAML, with registered tools, callables and providers

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex};

use flock_core::llm::{LLMProvider, LLMRequest, LLMResponse};
use flock_core::prelude::*;

/// Replays canned replies in order and keeps the requests it saw
struct ScriptedProvider {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<LLMRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<LLMRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate_request(&self, request: &LLMRequest) -> Result<LLMResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| "{}".to_string());
        Ok(LLMResponse {
            content,
            usage: None,
        })
    }
}

const RESEARCH_FLOCK: &str = r#"
name: research
model: test-model
start_agent: researcher
agents:
  - name: researcher
    input: "topic: str"
    output: "summary: str | One paragraph"
    evaluator:
      type: declarative
      max_tool_rounds: 2
    tools:
      - web::search
    handoff_router:
      type: default
      hand_off: reviewer
  - name: reviewer
    input: "summary"
    output: "verdict: str"
    evaluator:
      type: stub
      responses:
        verdict: approved
    modules:
      checks:
        type: assertion
        rules:
          - check: one_of
            field: verdict
            values: [approved, rejected]
"#;

fn search_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new("Search the web", |args: Value| {
        let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
        Ok(json!({"hits": [format!("result for {}", query)]}))
    }))
}

#[tokio::test]
async fn test_yaml_flock_with_tool_and_llm() {
    let provider = ScriptedProvider::new(&[
        r#"{"tool_call": {"name": "search", "arguments": {"query": "rust"}}}"#,
        r#"```json
{"summary": "Rust is a systems language."}
```"#,
    ]);

    let mut flock = Flock::new(FlockConfig::default());
    flock.registry().set_llm_provider(provider.clone());
    flock
        .registry()
        .register_tool("web::search", [Capability::Network], search_tool())
        .unwrap();

    // Network tools need the privileged policy
    let mut config = FlockConfig::default();
    config.tools.allow_privileged = true;
    flock.registry().set_tool_policy(ToolPolicy::from_config(&config.tools));

    flock.load_spec(&FlockSpec::from_yaml(RESEARCH_FLOCK).unwrap()).unwrap();
    assert_eq!(flock.name(), "research");
    assert_eq!(flock.start_agent(), Some("researcher"));
    assert_eq!(flock.agent("researcher").unwrap().model(), Some("test-model"));

    let mut input = Map::new();
    input.insert("topic".to_string(), json!("rust"));
    let run = flock.run("researcher", input).await.unwrap();

    assert_eq!(run.agents(), vec!["researcher", "reviewer"]);
    assert_eq!(run.result, json!({"verdict": "approved"}).as_object().cloned().unwrap());
    assert_eq!(
        run.context.get_variable("researcher.summary"),
        Some(&json!("Rust is a systems language."))
    );

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model.as_deref(), Some("test-model"));
    let tool_reply = &requests[1].messages.last().unwrap().content;
    assert!(tool_reply.contains("result for rust"));
}

#[tokio::test]
async fn test_denied_tool_fails_to_load() {
    let mut flock = Flock::new(FlockConfig::default());
    flock
        .registry()
        .register_tool("web::search", [Capability::Network], search_tool())
        .unwrap();

    let err = flock
        .load_spec(&FlockSpec::from_yaml(RESEARCH_FLOCK).unwrap())
        .unwrap_err();
    assert!(matches!(err, FlockError::Tool(_)));
}

#[tokio::test]
async fn test_callable_router_from_yaml() {
    let yaml = r#"
name: triage
agents:
  - name: intake
    input: "ticket: str"
    output: "ticket: str"
    evaluator: {type: stub}
    handoff_router: {type: default, callable: by_priority}
  - name: urgent
    input: "ticket"
    output: "ack: str"
    evaluator: {type: stub, responses: {ack: paged}}
  - name: backlog
    input: "ticket"
    output: "ack: str"
    evaluator: {type: stub, responses: {ack: queued}}
"#;

    let mut flock = Flock::new(FlockConfig::default());
    flock.registry().register_callable("by_priority", |result, _ctx| {
        let ticket = result.get("ticket").and_then(Value::as_str).unwrap_or_default();
        if ticket.contains("outage") {
            HandOffRequest::to("urgent")
        } else {
            HandOffRequest::to("backlog")
        }
    });
    flock.load_spec(&FlockSpec::from_yaml(yaml).unwrap()).unwrap();

    let inputs = ["db outage", "typo in docs"]
        .iter()
        .map(|t| json!({"ticket": t}).as_object().cloned().unwrap())
        .collect();
    let results = flock.run_batch("intake", inputs).await.unwrap();

    let acks: Vec<Value> = results
        .into_iter()
        .map(|r| r.unwrap().result["ack"].clone())
        .collect();
    assert_eq!(acks, vec![json!("paged"), json!("queued")]);
}

#[test]
fn test_unknown_component_type() {
    let yaml = r#"
agents:
  - name: a
    evaluator: {type: quantum}
"#;
    let err = Flock::from_yaml(yaml, FlockConfig::default()).unwrap_err();
    assert!(matches!(err, FlockError::Configuration(_)));
}

#[test]
fn test_definition_survives_json_round_trip() {
    let yaml = RESEARCH_FLOCK.replace("    tools:\n      - web::search\n", "");
    let flock = Flock::from_yaml(&yaml, FlockConfig::default()).unwrap();
    assert!(flock.agent("researcher").unwrap().tools().is_empty());

    let json = flock.to_json().unwrap();
    let back = Flock::from_json(&json, FlockConfig::default()).unwrap();

    assert_eq!(back.to_spec(), flock.to_spec());
    assert_eq!(back.agent("reviewer").unwrap().modules().len(), 1);
}
