//! The orchestration graph.
//!
//! A two-node state machine over one `ConversationState`:
//!
//! ```text
//!   reasoning ──(tool calls)──▶ executing-tools ──▶ reasoning
//!       │
//!       └──(no tool calls)──▶ done
//! ```
//!
//! The reasoning node binds a freshly aggregated tool set to each model
//! call; the execution node resolves calls against that same set, runs them
//! concurrently and appends results in request order. Runs are bounded by a
//! round-trip limit and a wall-clock budget; hitting either ends the run as
//! `Inconclusive`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::Value;

use super::errors::AgentError;
use super::types::{ConversationState, Message};
use crate::inference::{LanguageModel, ModelRequest, ToolCall};
use crate::tools::{HandoffDirective, ToolAggregator, ToolError, ToolSet};

/// Sender tag for messages appended by the reasoning node.
pub const NODE_REASONING: &str = "reasoning";
/// Sender tag for messages appended by the tool-execution node.
pub const NODE_TOOLS: &str = "tools";

/// Reply text used when a run stops without a final answer.
pub const INCONCLUSIVE_REPLY: &str =
    "I couldn't finish that just now. Could you try again or rephrase?";

/// Limits applied to every run.
#[derive(Debug, Clone, Copy)]
pub struct GraphConfig {
    pub max_round_trips: usize,
    pub run_timeout: Duration,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_round_trips: 8,
            run_timeout: Duration::from_secs(120),
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Reasoning,
    ExecutingTools,
    Done,
}

/// Why a run ended without a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RoundTripLimit,
    Timeout,
}

/// How a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Inconclusive { reason: StopReason },
}

/// The result of one graph run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub state: ConversationState,
    pub outcome: RunOutcome,
    /// Completed reasoning → tools → reasoning cycles.
    pub round_trips: usize,
    /// History length when the run started.
    pub start_len: usize,
}

impl RunResult {
    /// The user-visible answer.
    pub fn final_text(&self) -> String {
        match self.outcome {
            RunOutcome::Completed => self
                .state
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            RunOutcome::Inconclusive { .. } => INCONCLUSIVE_REPLY.to_string(),
        }
    }

    /// Messages this run appended.
    pub fn appended(&self) -> &[Message] {
        self.state.since(self.start_len)
    }

    /// The last handoff directive produced during this run.
    pub fn handoff(&self) -> Option<HandoffDirective> {
        HandoffDirective::find_in(self.appended())
    }
}

/// Reasoning/tool-execution controller.
pub struct OrchestrationGraph {
    model: Arc<dyn LanguageModel>,
    tools: ToolAggregator,
    config: GraphConfig,
}

impl OrchestrationGraph {
    pub fn new(model: Arc<dyn LanguageModel>, tools: ToolAggregator, config: GraphConfig) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Drive `state` until the model stops requesting tools or a bound is hit.
    ///
    /// Only model failures fail the run; everything tool-related becomes a
    /// tool-result message.
    pub async fn run(
        &self,
        mut state: ConversationState,
        system_prompt: &str,
        temperature: Option<f32>,
    ) -> Result<RunResult, AgentError> {
        let start_len = state.len();
        let mut round_trips = 0;
        let started = Instant::now();

        let driven = tokio::time::timeout(
            self.config.run_timeout,
            self.drive(&mut state, system_prompt, temperature, &mut round_trips),
        )
        .await;

        let outcome = match driven {
            Ok(result) => result?,
            Err(_) => {
                close_dangling_calls(
                    &mut state,
                    "run_timeout",
                    "the run ended before this call completed",
                );
                RunOutcome::Inconclusive {
                    reason: StopReason::Timeout,
                }
            }
        };

        match outcome {
            RunOutcome::Completed => tracing::info!(
                round_trips,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run completed"
            ),
            RunOutcome::Inconclusive { reason } => tracing::warn!(
                round_trips,
                ?reason,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run ended inconclusive"
            ),
        }

        Ok(RunResult {
            state,
            outcome,
            round_trips,
            start_len,
        })
    }

    async fn drive(
        &self,
        state: &mut ConversationState,
        system_prompt: &str,
        temperature: Option<f32>,
        round_trips: &mut usize,
    ) -> Result<RunOutcome, AgentError> {
        let mut node = Node::Reasoning;
        // Tool set bound to the most recent reasoning turn
        let mut bound = ToolSet::new();

        loop {
            match node {
                Node::Reasoning => {
                    bound = self.tools.aggregated_tools().await;
                    let message = self
                        .reason(state, &bound, system_prompt, temperature, *round_trips)
                        .await?;
                    let wants_tools = message.has_tool_calls();
                    state.push(NODE_REASONING, message);

                    if !wants_tools {
                        node = Node::Done;
                    } else if *round_trips >= self.config.max_round_trips {
                        close_dangling_calls(
                            state,
                            "round_trip_limit",
                            "the run reached its tool round-trip limit",
                        );
                        return Ok(RunOutcome::Inconclusive {
                            reason: StopReason::RoundTripLimit,
                        });
                    } else {
                        node = Node::ExecutingTools;
                    }
                }
                Node::ExecutingTools => {
                    let calls = state
                        .last()
                        .map(|m| m.tool_calls.clone())
                        .unwrap_or_default();
                    let results = join_all(calls.iter().map(|c| self.execute(&bound, c))).await;
                    state.append(NODE_TOOLS, results);
                    *round_trips += 1;
                    node = Node::Reasoning;
                }
                Node::Done => return Ok(RunOutcome::Completed),
            }
        }
    }

    /// One model call over the full history.
    async fn reason(
        &self,
        state: &ConversationState,
        tools: &ToolSet,
        system_prompt: &str,
        temperature: Option<f32>,
        round: usize,
    ) -> Result<Message, AgentError> {
        let request = ModelRequest {
            system_prompt: system_prompt.to_string(),
            messages: state.messages().to_vec(),
            tools: tools.definitions(),
            temperature,
        };

        let started = Instant::now();
        let response = tokio::time::timeout(self.config.model_timeout, self.model.complete(request))
            .await
            .map_err(|_| AgentError::ModelTimeout {
                timeout_secs: self.config.model_timeout.as_secs(),
            })??;

        tracing::info!(
            round,
            tools = tools.len(),
            tool_calls = response.tool_calls.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reasoning turn"
        );

        Ok(Message::assistant_with_calls(
            response.content.as_deref().unwrap_or_default(),
            response.tool_calls,
        ))
    }

    /// Execute one call against the bound tool set. Never fails.
    async fn execute(&self, tools: &ToolSet, call: &ToolCall) -> Message {
        let started = Instant::now();

        let payload = match tools.get(&call.name) {
            None => {
                tracing::warn!(tool = %call.name, "model requested unknown tool");
                ToolError::NotFound {
                    name: call.name.clone(),
                }
                .to_payload()
            }
            Some(tool) => {
                match tokio::time::timeout(self.config.tool_timeout, tool.invoke(call.arguments.clone()))
                    .await
                {
                    Ok(Ok(value)) => value,
                    Ok(Err(e)) => {
                        tracing::debug!(tool = %call.name, error = %e, "tool call rejected");
                        e.to_payload()
                    }
                    Err(_) => ToolError::Timeout {
                        tool: call.name.clone(),
                        timeout_ms: self.config.tool_timeout.as_millis() as u64,
                    }
                    .to_payload(),
                }
            }
        };

        tracing::info!(
            tool = %call.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool call finished"
        );
        Message::tool_result(&call.id, &call.name, &payload_text(payload))
    }
}

/// Tool-result message content: strings verbatim, other values as JSON.
fn payload_text(payload: Value) -> String {
    match payload {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Answer any tool calls left unanswered when a run was cut off, so the
/// history stays well-formed for the next turn.
fn close_dangling_calls(state: &mut ConversationState, kind: &str, message: &str) {
    let Some(last) = state.last() else {
        return;
    };
    if !last.has_tool_calls() {
        return;
    }
    let results = last
        .tool_calls
        .iter()
        .map(|call| {
            let payload = crate::tools::errors::error_payload(kind, &call.name, message);
            Message::tool_result(&call.id, &call.name, &payload.to_string())
        })
        .collect();
    state.append(NODE_TOOLS, results);
}

// ─── Tests ───────────────────────────────────────────────────────────────────
