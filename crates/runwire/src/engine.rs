//! Agent loop engine — model runs interleaved with automatic tool execution.
//!
//! [`ChatEngine::run`] drives the full agentic cycle: stream a model run,
//! collect the tool calls it produced, execute them, feed results back as
//! messages, and run the model again until it finishes without tool calls
//! (or the loop strategy stops it). Every inner event is forwarded to the
//! returned stream as it happens, so a consumer sees each iteration's
//! `RUN_STARTED`..`RUN_FINISHED` pair plus the tool traffic in between.
//!
//! # Approvals and client tools
//!
//! Calls whose definition sets `needs_approval`, and calls for client
//! tools, do not execute inside the loop. The engine emits a `CUSTOM`
//! event for each (`approval-requested` / `tool-input-available`) and
//! parks the call. With an [`ApprovalHandle`] attached, decisions and
//! client results arrive over a channel and the loop resumes once the
//! whole batch is answered. Without one, the engine emits the requests
//! and ends the stream unterminated so an HTTP layer can round-trip the
//! conversation and resume in a later request (the parked calls are then
//! picked up by the pending-call scan).
//!
//! # Termination
//!
//! The stream ends after a terminal event, or ends *without* one when the
//! run was cancelled or is waiting on an external decision. A loop
//! strategy that refuses another iteration while the model is still
//! asking for tools produces a `RUN_ERROR` with code `iteration_limit`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapter::{ChatOptions, DynAdapter};
use crate::error::{AiError, code};
use crate::event::{ErrorInfo, EventStream, FinishReason, RunEvent, UsageInfo, new_run_id};
use crate::message::{Message, ToolCall, ToolCallResult, pending_tool_calls};
use crate::schema::JsonSchema;
use crate::tool::{ToolCtx, ToolRegistry, execute_tool_calls};

/// Snapshot of loop progress handed to the loop strategy.
#[derive(Debug)]
pub struct LoopState<'a> {
    /// Completed model iterations so far.
    pub iteration_count: u32,
    /// The conversation as it stands, tool results included.
    pub messages: &'a [Message],
    /// Finish reason of the most recent run, if any.
    pub finish_reason: Option<FinishReason>,
}

/// Decides whether the loop may start another model iteration.
pub type LoopStrategy = Arc<dyn Fn(&LoopState<'_>) -> bool + Send + Sync>;

/// A strategy that allows up to `n` model iterations.
pub fn max_iterations(n: u32) -> LoopStrategy {
    Arc::new(move |state| state.iteration_count < n)
}

/// A decision message sent into a running loop.
enum Decision {
    Approval { approval_id: String, approved: bool },
    ClientResult(ToolCallResult),
}

/// Sender half for approval decisions and client tool results.
///
/// Cheap to clone; all clones feed the same running loop. Sends after the
/// loop has ended are silently dropped.
#[derive(Clone)]
pub struct ApprovalHandle {
    tx: mpsc::UnboundedSender<Decision>,
}

impl ApprovalHandle {
    /// Resolves a parked gated call. `approved: false` turns the call into
    /// a tool-error result visible to the model; it is never skipped.
    pub fn decide(&self, approval_id: impl Into<String>, approved: bool) {
        let _ = self.tx.send(Decision::Approval {
            approval_id: approval_id.into(),
            approved,
        });
    }

    /// Supplies the result of a client-executed tool call.
    pub fn supply_tool_result(&self, result: ToolCallResult) {
        let _ = self.tx.send(Decision::ClientResult(result));
    }
}

/// The approval id the engine derives for a gated tool call.
pub fn approval_id_for(tool_call_id: &str) -> String {
    format!("approval_{tool_call_id}")
}

/// Drives model runs and tool execution for one conversation.
pub struct ChatEngine {
    adapter: Arc<dyn DynAdapter>,
    registry: Arc<ToolRegistry>,
    strategy: LoopStrategy,
    decisions: Option<mpsc::UnboundedReceiver<Decision>>,
}

impl ChatEngine {
    /// An engine with the default strategy of five model iterations.
    pub fn new(adapter: Arc<dyn DynAdapter>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            adapter,
            registry,
            strategy: max_iterations(5),
            decisions: None,
        }
    }

    pub fn with_strategy(mut self, strategy: LoopStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Attaches a decision channel and returns its sender half. Without
    /// this, gated and client calls end the stream unterminated instead
    /// of waiting.
    pub fn approval_handle(&mut self) -> ApprovalHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.decisions = Some(rx);
        ApprovalHandle { tx }
    }

    /// Starts the loop. Consumes the engine; the stream owns all state.
    pub fn run(self, options: ChatOptions) -> EventStream {
        let (custom_tx, custom_rx) = mpsc::unbounded_channel();
        let state = EngineState {
            adapter: self.adapter,
            registry: self.registry,
            strategy: self.strategy,
            decisions: self.decisions,
            ctx: ToolCtx::with_emitter(custom_tx),
            custom_rx,
            options,
            engine_run_id: new_run_id(),
            last_run_id: None,
            model: None,
            iteration_count: 0,
            total_usage: UsageInfo::default(),
            current_text: String::new(),
            current_calls: Vec::new(),
            iteration_finish: None,
            last_finish: None,
            structured_pass: false,
            queue: std::collections::VecDeque::new(),
            phase: Phase::Bootstrap,
        };

        Box::pin(futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.queue.pop_front() {
                    return Some((event, state));
                }
                match std::mem::replace(&mut state.phase, Phase::Done) {
                    Phase::Done => return None,
                    Phase::Bootstrap => state.phase = phase_bootstrap(&mut state),
                    Phase::Start => state.phase = phase_start(&mut state).await,
                    Phase::Streaming(stream) => {
                        state.phase = phase_streaming(&mut state, stream).await;
                    }
                    Phase::RunTools {
                        calls,
                        append_assistant,
                    } => {
                        state.phase = phase_run_tools(&mut state, calls, append_assistant).await;
                    }
                    Phase::AwaitingDecisions(parked) => {
                        state.phase = phase_awaiting_decisions(&mut state, parked).await;
                    }
                }
            }
        }))
    }
}

enum Phase {
    /// Scan the inbound conversation for unanswered tool calls.
    Bootstrap,
    /// Strategy check, then launch the next model run.
    Start,
    /// Forward events from the in-flight model run.
    Streaming(EventStream),
    /// Execute a batch of tool calls. `append_assistant` is false when the
    /// calls came from the inbound conversation, which already holds the
    /// assistant message that made them.
    RunTools {
        calls: Vec<ToolCall>,
        append_assistant: bool,
    },
    /// Gated or client calls outstanding; waiting on the decision channel.
    AwaitingDecisions(ParkedBatch),
    /// Terminal state — unfold returns `None` once the queue drains.
    Done,
}

/// A tool-call batch with calls parked on external decisions.
struct ParkedBatch {
    /// Call ids in original batch order, for message ordering.
    order: Vec<String>,
    collected: HashMap<String, ToolCallResult>,
    gated: HashMap<String, ToolCall>,
    client: HashMap<String, ToolCall>,
}

struct EngineState {
    adapter: Arc<dyn DynAdapter>,
    registry: Arc<ToolRegistry>,
    strategy: LoopStrategy,
    decisions: Option<mpsc::UnboundedReceiver<Decision>>,
    ctx: ToolCtx,
    custom_rx: mpsc::UnboundedReceiver<RunEvent>,
    options: ChatOptions,
    /// Id for events the engine synthesizes before any model run exists.
    engine_run_id: String,
    last_run_id: Option<String>,
    model: Option<String>,
    iteration_count: u32,
    total_usage: UsageInfo,
    current_text: String,
    current_calls: Vec<(String, String, String)>,
    /// Finish reason seen within the current run.
    iteration_finish: Option<FinishReason>,
    /// Finish reason of the most recent completed run.
    last_finish: Option<FinishReason>,
    /// The current run is the final schema-constrained pass.
    structured_pass: bool,
    queue: std::collections::VecDeque<RunEvent>,
    phase: Phase,
}

impl EngineState {
    fn cancelled(&self) -> bool {
        self.options.is_cancelled()
    }

    /// Moves tool-emitted custom events into the outbound queue.
    fn drain_custom(&mut self) {
        while let Ok(event) = self.custom_rx.try_recv() {
            self.queue.push_back(event);
        }
    }

    fn loop_state(&self) -> LoopState<'_> {
        LoopState {
            iteration_count: self.iteration_count,
            messages: &self.options.messages,
            finish_reason: self.last_finish,
        }
    }

    /// Options for the next model run. Tool definitions come from the
    /// registry unless the caller supplied an explicit list. While tools
    /// are in play the output schema is withheld; it is applied on the
    /// final structured pass instead.
    fn run_options(&self) -> ChatOptions {
        let mut options = self.options.clone();
        if options.tools.is_empty() {
            options.tools = self.registry.definitions();
        }
        if self.structured_pass {
            options.tools.clear();
        } else if !options.tools.is_empty() {
            options.output_schema = None;
        }
        options
    }

    /// Whether a run is constrained by the output schema: either the
    /// explicit final pass, or a tool-less conversation where the first
    /// run already carries the schema.
    fn run_is_structured(&self) -> bool {
        self.options.output_schema.is_some()
            && (self.structured_pass || (self.options.tools.is_empty() && self.registry.is_empty()))
    }

    fn append_tool_results(&mut self, results: Vec<ToolCallResult>) {
        for result in results {
            self.options.messages.push(Message::tool_result(result));
        }
    }
}

fn phase_bootstrap(state: &mut EngineState) -> Phase {
    if state.cancelled() {
        return Phase::Done;
    }
    let pending = pending_tool_calls(&state.options.messages);
    if pending.is_empty() {
        return Phase::Start;
    }
    debug!(count = pending.len(), "resuming conversation with unanswered tool calls");
    // A synthetic run frames the resumed state: the calls were produced by
    // an earlier request, so this stream still opens with a lifecycle pair.
    state.queue.push_back(RunEvent::run_started(
        state.engine_run_id.clone(),
        state.model.clone(),
    ));
    state.queue.push_back(RunEvent::run_finished(
        state.engine_run_id.clone(),
        state.model.clone(),
        Some(FinishReason::ToolCalls),
        None,
    ));
    state.last_finish = Some(FinishReason::ToolCalls);
    Phase::RunTools {
        calls: pending,
        append_assistant: false,
    }
}

async fn phase_start(state: &mut EngineState) -> Phase {
    if state.cancelled() {
        return Phase::Done;
    }
    // The final structured pass is not an agentic iteration; the strategy
    // does not get to veto it.
    if !state.structured_pass && !(state.strategy)(&state.loop_state()) {
        if state.last_finish == Some(FinishReason::ToolCalls) {
            warn!(
                iterations = state.iteration_count,
                "loop strategy exhausted with tool calls outstanding"
            );
            state.queue.push_back(RunEvent::run_error(
                state.last_run_id.clone().or_else(|| Some(state.engine_run_id.clone())),
                state.model.clone(),
                AiError::IterationLimit {
                    iterations: state.iteration_count,
                }
                .to_error_info(),
            ));
        }
        return Phase::Done;
    }

    state.iteration_count += 1;
    state.current_text.clear();
    state.current_calls.clear();
    state.iteration_finish = None;
    debug!(
        iteration = state.iteration_count,
        structured = state.structured_pass,
        messages = state.options.messages.len(),
        "starting model run"
    );
    let options = state.run_options();
    let stream = state.adapter.events_boxed(&options).await;
    Phase::Streaming(stream)
}

async fn phase_streaming(state: &mut EngineState, mut stream: EventStream) -> Phase {
    let Some(event) = stream.next().await else {
        // No terminal event: the inner run was cancelled. End the outer
        // stream the same way.
        return Phase::Done;
    };

    match &event {
        RunEvent::RunStarted { run_id, model, .. } => {
            state.last_run_id = Some(run_id.clone());
            if model.is_some() {
                state.model = model.clone();
            }
        }
        RunEvent::TextMessageContent { delta, content, .. } => {
            // The cumulative field wins when the adapter supplies it.
            match content {
                Some(full) if !full.is_empty() => {
                    state.current_text.clear();
                    state.current_text.push_str(full);
                }
                _ => state.current_text.push_str(delta),
            }
        }
        RunEvent::ToolCallStart {
            tool_call_id,
            tool_name,
            ..
        } => {
            state
                .current_calls
                .push((tool_call_id.clone(), tool_name.clone(), String::new()));
        }
        RunEvent::ToolCallArgs {
            tool_call_id,
            delta,
            args,
            ..
        } => {
            if let Some((_, _, buffer)) =
                state.current_calls.iter_mut().find(|(id, _, _)| id == tool_call_id)
            {
                match args {
                    Some(full) if !full.is_empty() => {
                        buffer.clear();
                        buffer.push_str(full);
                    }
                    _ => buffer.push_str(delta),
                }
            }
        }
        RunEvent::RunFinished {
            finish_reason,
            usage,
            ..
        } => {
            state.total_usage.add_optional(usage.as_ref());
            // A stop arriving after tool_calls in the same run does not
            // displace it.
            let effective = if state.iteration_finish == Some(FinishReason::ToolCalls)
                && *finish_reason == Some(FinishReason::Stop)
            {
                Some(FinishReason::ToolCalls)
            } else {
                *finish_reason
            };
            state.iteration_finish = effective;
            state.last_finish = effective;
            return finish_run(state, event);
        }
        RunEvent::RunError { .. } => {
            state.queue.push_back(event);
            return Phase::Done;
        }
        _ => {}
    }

    state.queue.push_back(event);
    Phase::Streaming(stream)
}

/// Decides what follows a completed run and queues its terminal event
/// (possibly substituted by a policy error).
fn finish_run(state: &mut EngineState, event: RunEvent) -> Phase {
    match state.iteration_finish {
        // Truncated output is never a success.
        Some(FinishReason::Length) => {
            state.queue.push_back(RunEvent::run_error(
                state.last_run_id.clone(),
                state.model.clone(),
                AiError::Truncated.to_error_info(),
            ));
            Phase::Done
        }
        Some(FinishReason::ToolCalls) if !state.current_calls.is_empty() => {
            let calls: Vec<ToolCall> = state
                .current_calls
                .drain(..)
                .map(|(id, name, args)| ToolCall::new(id, name, args))
                .collect();
            state.queue.push_back(event);
            Phase::RunTools {
                calls,
                append_assistant: true,
            }
        }
        _ => {
            if state.run_is_structured() {
                if let Some(schema) = &state.options.output_schema {
                    if let Some(mismatch) = structured_mismatch(&state.current_text, schema) {
                        warn!(error = %mismatch, "structured output failed validation");
                        state.queue.push_back(RunEvent::run_error(
                            state.last_run_id.clone(),
                            state.model.clone(),
                            ErrorInfo::with_code(mismatch, code::SCHEMA_MISMATCH),
                        ));
                        return Phase::Done;
                    }
                }
                state.queue.push_back(event);
                return Phase::Done;
            }
            if state.options.output_schema.is_some() && !state.structured_pass {
                // The conversation involved tools; run one more pass with
                // the schema applied to produce the structured answer.
                debug!("starting final structured pass");
                state.queue.push_back(event);
                if !state.current_text.is_empty() {
                    let text = std::mem::take(&mut state.current_text);
                    state.options.messages.push(Message::assistant(text));
                }
                state.structured_pass = true;
                return Phase::Start;
            }
            state.queue.push_back(event);
            debug!(
                iterations = state.iteration_count,
                total_tokens = state.total_usage.total_tokens,
                "loop finished"
            );
            Phase::Done
        }
    }
}

async fn phase_run_tools(
    state: &mut EngineState,
    calls: Vec<ToolCall>,
    append_assistant: bool,
) -> Phase {
    if state.cancelled() {
        return Phase::Done;
    }
    let order: Vec<String> = calls.iter().map(|call| call.id.clone()).collect();
    if append_assistant {
        let text = std::mem::take(&mut state.current_text);
        state
            .options
            .messages
            .push(Message::assistant_with_calls(text, calls.clone()));
    }

    debug!(count = calls.len(), "executing tool batch");
    let outcome = execute_tool_calls(&state.registry, calls, &state.ctx).await;
    state.drain_custom();

    for call in &outcome.needs_approval {
        state.queue.push_back(approval_request_event(call));
    }
    for call in &outcome.needs_client {
        state.queue.push_back(client_handoff_event(call));
    }

    if outcome.needs_approval.is_empty() && outcome.needs_client.is_empty() {
        let mut results = outcome.results;
        results.sort_by_key(|r| order.iter().position(|id| *id == r.tool_call_id));
        state.append_tool_results(results);
        return Phase::Start;
    }

    if state.decisions.is_none() {
        // No decision channel: surface the requests and stop without a
        // terminal event. The caller resumes via the pending-call scan.
        debug!("parked tool calls with no decision channel, ending stream");
        return Phase::Done;
    }

    let mut parked = ParkedBatch {
        order,
        collected: HashMap::new(),
        gated: HashMap::new(),
        client: HashMap::new(),
    };
    for result in outcome.results {
        parked.collected.insert(result.tool_call_id.clone(), result);
    }
    for call in outcome.needs_approval {
        parked.gated.insert(call.id.clone(), call);
    }
    for call in outcome.needs_client {
        parked.client.insert(call.id.clone(), call);
    }
    Phase::AwaitingDecisions(parked)
}

async fn phase_awaiting_decisions(state: &mut EngineState, mut parked: ParkedBatch) -> Phase {
    if state.cancelled() {
        return Phase::Done;
    }
    let Some(decisions) = state.decisions.as_mut() else {
        return Phase::Done;
    };
    let Some(decision) = decisions.recv().await else {
        // All handles dropped while calls are parked.
        debug!("decision channel closed with calls outstanding, ending stream");
        return Phase::Done;
    };

    match decision {
        Decision::Approval {
            approval_id,
            approved,
        } => {
            let call_id = approval_id
                .strip_prefix("approval_")
                .unwrap_or(approval_id.as_str());
            let Some(call) = parked.gated.remove(call_id) else {
                warn!(approval_id, "decision for unknown approval id");
                return Phase::AwaitingDecisions(parked);
            };
            let result = if approved {
                let result = state.registry.execute_call(&call, &state.ctx).await;
                state.drain_custom();
                result
            } else {
                ToolCallResult::error(&call.id, &call.name, "User declined tool execution")
            };
            parked.collected.insert(call.id.clone(), result);
        }
        Decision::ClientResult(result) => {
            if parked.client.remove(&result.tool_call_id).is_none() {
                warn!(
                    tool_call_id = %result.tool_call_id,
                    "client result for a call that is not parked"
                );
                return Phase::AwaitingDecisions(parked);
            }
            parked.collected.insert(result.tool_call_id.clone(), result);
        }
    }

    if parked.gated.is_empty() && parked.client.is_empty() {
        let mut results: Vec<ToolCallResult> = parked.collected.into_values().collect();
        results.sort_by_key(|r| parked.order.iter().position(|id| *id == r.tool_call_id));
        state.append_tool_results(results);
        return Phase::Start;
    }
    Phase::AwaitingDecisions(parked)
}

fn approval_request_event(call: &ToolCall) -> RunEvent {
    RunEvent::custom(
        "approval-requested",
        Some(json!({
            "toolCallId": call.id,
            "toolName": call.name,
            "input": call_input(call),
            "approval": { "id": approval_id_for(&call.id) },
        })),
    )
}

fn client_handoff_event(call: &ToolCall) -> RunEvent {
    RunEvent::custom(
        "tool-input-available",
        Some(json!({
            "toolCallId": call.id,
            "toolName": call.name,
            "input": call_input(call),
        })),
    )
}

fn call_input(call: &ToolCall) -> Value {
    call.parsed_arguments()
        .unwrap_or_else(|_| Value::String(call.arguments.clone()))
}

/// Strict check of the final structured answer. Returns a description of
/// the failure, or `None` when the text satisfies the schema.
fn structured_mismatch(text: &str, schema: &JsonSchema) -> Option<String> {
    let value: Value = match serde_json::from_str(text.trim()) {
        Ok(value) => value,
        Err(err) => return Some(format!("response is not valid JSON: {err}")),
    };
    #[cfg(feature = "schema")]
    if let Err(err) = schema.validate(&value) {
        return Some(err.to_string());
    }
    #[cfg(not(feature = "schema"))]
    let _ = (value, schema);
    None
}
