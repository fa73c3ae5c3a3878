//! End-to-end tests for the agent loop over the public API.
//!
//! Everything here drives [`ChatEngine`] against a [`MockAdapter`], so
//! the full cycle — streaming, tool execution, approvals, client
//! handoff, structured output — runs without touching a network.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use runwire::engine::{approval_id_for, max_iterations};
use runwire::error::code;
use runwire::mock::MockAdapter;
use runwire::test_helpers::{collect_events, text_of, text_run, tool_call_run};
use runwire::tool::{ToolDefinition, ToolRegistry, tool_fn};
use runwire::{
    ChatEngine, ChatOptions, FinishReason, JsonSchema, Message, RunEvent, ToolCall, ToolCallResult,
};

fn engine_with(adapter: &Arc<MockAdapter>, registry: ToolRegistry) -> ChatEngine {
    ChatEngine::new(adapter.clone(), Arc::new(registry))
}

fn echo_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(tool_fn(
        ToolDefinition::new("echo", "Echoes its input"),
        |input| async move { Ok(input) },
    ));
    registry
}

fn user_options(text: &str) -> ChatOptions {
    ChatOptions {
        messages: vec![Message::user(text)],
        ..Default::default()
    }
}

#[tokio::test]
async fn hello_world_event_ordering() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(text_run("run-1", "Hello, world!"));
    let engine = engine_with(&adapter, ToolRegistry::new());

    let events = collect_events(engine.run(user_options("Say hello"))).await;

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            RunEvent::RunStarted { .. } => "started",
            RunEvent::TextMessageStart { .. } => "text_start",
            RunEvent::TextMessageContent { .. } => "text_content",
            RunEvent::TextMessageEnd { .. } => "text_end",
            RunEvent::RunFinished { .. } => "finished",
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(kinds.first(), Some(&"started"));
    assert_eq!(kinds.last(), Some(&"finished"));
    assert_eq!(kinds[1], "text_start");
    assert_eq!(kinds[kinds.len() - 2], "text_end");
    assert!(kinds[2..kinds.len() - 2].iter().all(|k| *k == "text_content"));

    assert_eq!(text_of(&events), "Hello, world!");
}

#[tokio::test]
async fn tool_call_round_trip_feeds_result_back() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(tool_call_run(
        "run-1",
        &[ToolCall::new("c1", "echo", r#"{"word":"hi"}"#)],
    ));
    adapter.queue_run(text_run("run-2", "The echo said hi"));
    let engine = engine_with(&adapter, echo_registry());

    let events = collect_events(engine.run(user_options("Echo hi"))).await;

    // Two full lifecycle pairs on one stream.
    let starts = events
        .iter()
        .filter(|e| matches!(e, RunEvent::RunStarted { .. }))
        .count();
    let finishes: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::RunFinished { finish_reason, .. } => Some(*finish_reason),
            _ => None,
        })
        .collect();
    assert_eq!(starts, 2);
    assert_eq!(
        finishes,
        vec![Some(FinishReason::ToolCalls), Some(FinishReason::Stop)]
    );

    // The second model call carried the assistant's calls and the result.
    let calls = adapter.recorded_calls();
    assert_eq!(calls.len(), 2);
    let second = &calls[1].messages;
    assert_eq!(second.len(), 3);
    let sent_call = second[1].tool_calls().next().unwrap();
    assert_eq!(sent_call.arguments, r#"{"word":"hi"}"#);
    let result = second[2].tool_results().next().unwrap();
    assert_eq!(result.tool_call_id, "c1");
    assert_eq!(result.tool_name, "echo");
    assert!(!result.is_error);
    // The echo tool returns its parsed input.
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&result.content).unwrap()["word"],
        "hi"
    );
}

#[tokio::test]
async fn parallel_tool_results_keep_call_order() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(tool_call_run(
        "run-1",
        &[
            ToolCall::new("c1", "echo", r#"{"n":1}"#),
            ToolCall::new("c2", "echo", r#"{"n":2}"#),
            ToolCall::new("c3", "echo", r#"{"n":3}"#),
        ],
    ));
    adapter.queue_run(text_run("run-2", "done"));
    let engine = engine_with(&adapter, echo_registry());

    collect_events(engine.run(user_options("three calls"))).await;

    let calls = adapter.recorded_calls();
    let results: Vec<String> = calls[1]
        .messages
        .iter()
        .flat_map(|m| m.tool_results())
        .map(|r| r.tool_call_id.clone())
        .collect();
    assert_eq!(results, vec!["c1", "c2", "c3"]);
}

#[tokio::test]
async fn iteration_limit_while_model_wants_tools_is_an_error() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(tool_call_run("run-1", &[ToolCall::new("c1", "echo", "{}")]));
    adapter.queue_run(tool_call_run("run-2", &[ToolCall::new("c2", "echo", "{}")]));
    let engine = engine_with(&adapter, echo_registry()).with_strategy(max_iterations(2));

    let events = collect_events(engine.run(user_options("loop forever"))).await;

    match events.last() {
        Some(RunEvent::RunError { error, .. }) => {
            assert_eq!(error.code.as_deref(), Some(code::ITERATION_LIMIT));
        }
        other => panic!("expected RUN_ERROR terminal, got {other:?}"),
    }
    assert_eq!(adapter.recorded_calls().len(), 2);
}

#[tokio::test]
async fn approval_flow_executes_after_decision() {
    let mut registry = ToolRegistry::new();
    registry.register(tool_fn(
        ToolDefinition::new("deploy", "Deploys the build").with_approval(),
        |_| async move { Ok(json!({"deployed": true})) },
    ));

    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(tool_call_run(
        "run-1",
        &[ToolCall::new("c1", "deploy", r#"{"env":"prod"}"#)],
    ));
    adapter.queue_run(text_run("run-2", "Deployed."));

    let mut engine = engine_with(&adapter, registry);
    let handle = engine.approval_handle();
    // Decisions queue up ahead of time; the loop reads them when the
    // call parks.
    handle.decide(approval_id_for("c1"), true);

    let events = collect_events(engine.run(user_options("ship it"))).await;

    let request = events
        .iter()
        .find_map(|e| match e {
            RunEvent::Custom { name, data, .. } if name == "approval-requested" => data.as_ref(),
            _ => None,
        })
        .expect("approval-requested event");
    assert_eq!(request["toolCallId"], "c1");
    assert_eq!(request["approval"]["id"], "approval_c1");
    assert_eq!(request["input"]["env"], "prod");

    assert!(matches!(
        events.last(),
        Some(RunEvent::RunFinished {
            finish_reason: Some(FinishReason::Stop),
            ..
        })
    ));
    let result = adapter.recorded_calls()[1]
        .messages
        .iter()
        .flat_map(|m| m.tool_results())
        .next()
        .cloned()
        .unwrap();
    assert!(!result.is_error);
    assert!(result.content.contains("deployed"));
}

#[tokio::test]
async fn declined_approval_becomes_error_result() {
    let mut registry = ToolRegistry::new();
    registry.register(tool_fn(
        ToolDefinition::new("deploy", "Deploys the build").with_approval(),
        |_| async move { Ok(json!("never runs")) },
    ));

    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(tool_call_run("run-1", &[ToolCall::new("c1", "deploy", "{}")]));
    adapter.queue_run(text_run("run-2", "Understood, not deploying."));

    let mut engine = engine_with(&adapter, registry);
    let handle = engine.approval_handle();
    handle.decide(approval_id_for("c1"), false);

    let events = collect_events(engine.run(user_options("ship it"))).await;

    assert!(matches!(events.last(), Some(RunEvent::RunFinished { .. })));
    let result = adapter.recorded_calls()[1]
        .messages
        .iter()
        .flat_map(|m| m.tool_results())
        .next()
        .cloned()
        .unwrap();
    assert!(result.is_error);
    assert_eq!(result.content, "User declined tool execution");
}

#[tokio::test]
async fn client_tool_handoff_round_trip() {
    let mut registry = ToolRegistry::new();
    registry.register_client(ToolDefinition::new(
        "pick_file",
        "Asks the user to pick a file",
    ));

    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(tool_call_run(
        "run-1",
        &[ToolCall::new("c1", "pick_file", r#"{"hint":"csv"}"#)],
    ));
    adapter.queue_run(text_run("run-2", "Got it"));

    let mut engine = engine_with(&adapter, registry);
    let handle = engine.approval_handle();
    handle.supply_tool_result(ToolCallResult::ok("c1", "pick_file", r#"{"path":"a.csv"}"#));

    let events = collect_events(engine.run(user_options("open my data"))).await;

    let handoff = events
        .iter()
        .find_map(|e| match e {
            RunEvent::Custom { name, data, .. } if name == "tool-input-available" => data.as_ref(),
            _ => None,
        })
        .expect("tool-input-available event");
    assert_eq!(handoff["toolName"], "pick_file");
    assert_eq!(handoff["input"]["hint"], "csv");

    let result = adapter.recorded_calls()[1]
        .messages
        .iter()
        .flat_map(|m| m.tool_results())
        .next()
        .cloned()
        .unwrap();
    assert_eq!(result.content, r#"{"path":"a.csv"}"#);
    assert!(!result.is_error);
}

#[tokio::test]
async fn parked_call_without_channel_ends_unterminated() {
    let mut registry = ToolRegistry::new();
    registry.register(tool_fn(
        ToolDefinition::new("wipe", "Dangerous").with_approval(),
        |_| async move { Ok(json!("wiped")) },
    ));

    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(tool_call_run("run-1", &[ToolCall::new("c1", "wipe", "{}")]));
    let engine = engine_with(&adapter, registry);

    let events = collect_events(engine.run(user_options("wipe it"))).await;

    // The request is surfaced, then the stream just ends: no terminal
    // event, so an HTTP layer can round-trip and resume later.
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Custom { name, .. } if name == "approval-requested"
    )));
    assert!(!matches!(
        events.last(),
        Some(RunEvent::RunFinished { .. }) | Some(RunEvent::RunError { .. })
    ));
}

#[tokio::test]
async fn pending_calls_in_conversation_resume_before_first_run() {
    // A conversation cut short mid-tool-call, as after an HTTP
    // round-trip: the assistant asked for a call nobody answered.
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(text_run("run-1", "Picking up where we left off"));
    let engine = engine_with(&adapter, echo_registry());

    let events = collect_events(engine.run(ChatOptions {
        messages: vec![
            Message::user("echo this"),
            Message::assistant_with_calls(
                "",
                vec![ToolCall::new("c9", "echo", r#"{"word":"resume"}"#)],
            ),
        ],
        ..Default::default()
    }))
    .await;

    // A synthetic lifecycle pair covers the resumed execution, then the
    // real model run follows.
    assert!(matches!(events[0], RunEvent::RunStarted { .. }));
    assert!(matches!(
        events[1],
        RunEvent::RunFinished {
            finish_reason: Some(FinishReason::ToolCalls),
            ..
        }
    ));

    // Only one real model call, and it saw the tool result.
    let calls = adapter.recorded_calls();
    assert_eq!(calls.len(), 1);
    let result = calls[0]
        .messages
        .iter()
        .flat_map(|m| m.tool_results())
        .next()
        .cloned()
        .unwrap();
    assert_eq!(result.tool_call_id, "c9");
}

#[tokio::test]
async fn structured_output_direct_pass_validates() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(text_run("run-1", r#"{"answer": 42}"#));
    let engine = engine_with(&adapter, ToolRegistry::new());

    let events = collect_events(engine.run(ChatOptions {
        messages: vec![Message::user("answer?")],
        output_schema: Some(JsonSchema::new(json!({
            "type": "object",
            "required": ["answer"],
            "properties": { "answer": { "type": "integer" } }
        }))),
        ..Default::default()
    }))
    .await;

    assert!(matches!(
        events.last(),
        Some(RunEvent::RunFinished {
            finish_reason: Some(FinishReason::Stop),
            ..
        })
    ));
    // The schema went to the adapter untouched: no tools in play.
    assert!(adapter.recorded_calls()[0].output_schema.is_some());
}

#[tokio::test]
async fn structured_output_mismatch_is_an_error() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(text_run("run-1", "not json at all"));
    let engine = engine_with(&adapter, ToolRegistry::new());

    let events = collect_events(engine.run(ChatOptions {
        messages: vec![Message::user("answer?")],
        output_schema: Some(JsonSchema::new(json!({"type": "object"}))),
        ..Default::default()
    }))
    .await;

    match events.last() {
        Some(RunEvent::RunError { error, .. }) => {
            assert_eq!(error.code.as_deref(), Some(code::SCHEMA_MISMATCH));
        }
        other => panic!("expected RUN_ERROR terminal, got {other:?}"),
    }
}

#[tokio::test]
async fn structured_output_with_tools_runs_final_pass() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(tool_call_run(
        "run-1",
        &[ToolCall::new("c1", "echo", r#"{"n":41}"#)],
    ));
    adapter.queue_run(text_run("run-2", "The answer is 42"));
    adapter.queue_run(text_run("run-3", r#"{"answer": 42}"#));
    let engine = engine_with(&adapter, echo_registry());

    let events = collect_events(engine.run(ChatOptions {
        messages: vec![Message::user("compute")],
        output_schema: Some(JsonSchema::new(json!({
            "type": "object",
            "required": ["answer"]
        }))),
        ..Default::default()
    }))
    .await;

    assert!(matches!(
        events.last(),
        Some(RunEvent::RunFinished {
            finish_reason: Some(FinishReason::Stop),
            ..
        })
    ));

    let calls = adapter.recorded_calls();
    assert_eq!(calls.len(), 3);
    // Intermediate runs keep tools and drop the schema; the final pass
    // does the opposite.
    assert!(calls[0].output_schema.is_none());
    assert!(!calls[0].tools.is_empty());
    assert!(calls[2].output_schema.is_some());
    assert!(calls[2].tools.is_empty());
    // The final pass sees the plain-text answer as conversation context.
    let last_messages = &calls[2].messages;
    assert_eq!(
        last_messages.last().unwrap().text(),
        "The answer is 42"
    );
}

#[tokio::test]
async fn cancellation_before_start_yields_no_events() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(text_run("run-1", "never seen"));
    let engine = engine_with(&adapter, ToolRegistry::new());

    let token = CancellationToken::new();
    token.cancel();
    let events = collect_events(engine.run(ChatOptions {
        messages: vec![Message::user("hi")],
        cancellation: Some(token),
        ..Default::default()
    }))
    .await;

    assert!(events.is_empty());
    assert_eq!(adapter.recorded_calls().len(), 0);
}

#[tokio::test]
async fn mid_stream_cancellation_ends_without_terminal() {
    use futures::StreamExt;

    let adapter = Arc::new(MockAdapter::new());
    adapter.queue_run(text_run("run-1", "Hello, world!"));
    let engine = engine_with(&adapter, ToolRegistry::new());

    let token = CancellationToken::new();
    let mut stream = engine.run(ChatOptions {
        messages: vec![Message::user("hi")],
        cancellation: Some(token.clone()),
        ..Default::default()
    });

    // Consume up to the first content delta, then cancel.
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        let is_content = matches!(event, RunEvent::TextMessageContent { .. });
        events.push(event);
        if is_content {
            token.cancel();
            break;
        }
    }
    events.extend(stream.collect::<Vec<_>>().await);

    // The partial events survive; nothing terminal follows the cancel.
    assert!(matches!(events[0], RunEvent::RunStarted { .. }));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, RunEvent::TextMessageContent { .. }))
    );
    assert!(!events.iter().any(RunEvent::is_terminal));
}
