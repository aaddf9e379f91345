//! One user turn: the safety race composed with the orchestration graph.
//!
//! The classifier and the graph start together. A non-empty safety verdict
//! always wins: the graph's output is discarded (cancelled if still running)
//! and nothing is spoken. A classifier error or timeout counts as "no
//! intervention".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::{AgentError, SpeechError};
use super::graph::{OrchestrationGraph, RunOutcome, RunResult};
use super::personas::Persona;
use super::safety::{is_session_start, SafetyClassifier};
use super::types::{ConversationState, Message};
use crate::tools::HandoffDirective;

/// Sender tag for the user's message.
pub const NODE_USER: &str = "user";
/// Sender tag for a safety reply.
pub const NODE_SAFETY: &str = "safety";

/// Receives final agent replies for audio synthesis.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, text: &str, voice_id: Option<&str>) -> Result<(), SpeechError>;
}

/// Which path produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Agent,
    Safety,
}

/// The outcome of one turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub text: String,
    pub source: ReplySource,
    pub outcome: RunOutcome,
    /// Persona switch requested during the turn; applies to the next turn.
    pub handoff: Option<HandoffDirective>,
    pub state: ConversationState,
}

/// Runs turns against a graph, optionally guarded by a safety classifier.
pub struct TurnRunner {
    graph: OrchestrationGraph,
    safety: Option<Arc<dyn SafetyClassifier>>,
    speech: Option<Arc<dyn SpeechSink>>,
    safety_timeout: Duration,
}

enum FirstSettled {
    Safety(Option<String>),
    Agent(Result<RunResult, AgentError>),
}

impl TurnRunner {
    pub fn new(graph: OrchestrationGraph) -> Self {
        Self {
            graph,
            safety: None,
            speech: None,
            safety_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_safety(mut self, classifier: Arc<dyn SafetyClassifier>) -> Self {
        self.safety = Some(classifier);
        self
    }

    pub fn with_speech(mut self, sink: Arc<dyn SpeechSink>) -> Self {
        self.speech = Some(sink);
        self
    }

    pub fn with_safety_timeout(mut self, timeout: Duration) -> Self {
        self.safety_timeout = timeout;
        self
    }

    pub fn graph(&self) -> &OrchestrationGraph {
        &self.graph
    }

    /// Run one turn for `input` on top of `state` under `persona`.
    pub async fn run_turn(
        &self,
        state: ConversationState,
        input: &str,
        persona: &Persona,
        memory: Option<&str>,
    ) -> Result<TurnReply, AgentError> {
        let mut agent_state = state.clone();
        agent_state.push(NODE_USER, Message::user(input));
        let system_prompt = persona.system_prompt(memory);

        let agent = self.graph.run(agent_state, &system_prompt, persona.temperature);

        let classifier = match &self.safety {
            Some(classifier) if !is_session_start(input) => classifier.clone(),
            _ => return self.agent_reply(agent.await?, persona).await,
        };

        let safety = self.classify(classifier.as_ref(), input);
        tokio::pin!(agent);
        tokio::pin!(safety);

        let first = tokio::select! {
            biased;
            verdict = &mut safety => FirstSettled::Safety(verdict),
            result = &mut agent => FirstSettled::Agent(result),
        };

        match first {
            FirstSettled::Safety(Some(text)) => Ok(safety_reply(state, input, text)),
            FirstSettled::Safety(None) => self.agent_reply(agent.await?, persona).await,
            FirstSettled::Agent(result) => match safety.await {
                Some(text) => Ok(safety_reply(state, input, text)),
                None => self.agent_reply(result?, persona).await,
            },
        }
    }

    /// Classifier verdict; errors and timeouts fail open.
    async fn classify(&self, classifier: &dyn SafetyClassifier, input: &str) -> Option<String> {
        match tokio::time::timeout(self.safety_timeout, classifier.check(input)).await {
            Ok(Ok(verdict)) => verdict.filter(|text| !text.trim().is_empty()),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "safety classifier failed, continuing without intervention");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.safety_timeout.as_millis() as u64,
                    "safety classifier timed out, continuing without intervention"
                );
                None
            }
        }
    }

    async fn agent_reply(&self, run: RunResult, persona: &Persona) -> Result<TurnReply, AgentError> {
        let text = run.final_text();
        let handoff = run.handoff();
        if let Some(directive) = &handoff {
            tracing::info!(from = %persona.id, to = %directive.target, "handoff requested");
        }

        if let Some(sink) = &self.speech {
            if !text.is_empty() {
                if let Err(e) = sink.speak(&text, persona.voice_id).await {
                    tracing::warn!(error = %e, "speech sink failed");
                }
            }
        }

        Ok(TurnReply {
            text,
            source: ReplySource::Agent,
            outcome: run.outcome,
            handoff,
            state: run.state,
        })
    }
}

fn safety_reply(mut state: ConversationState, input: &str, text: String) -> TurnReply {
    tracing::info!("safety interceptor triggered, agent output discarded");
    state.push(NODE_USER, Message::user(input));
    state.push(NODE_SAFETY, Message::assistant(&text));
    TurnReply {
        text,
        source: ReplySource::Safety,
        outcome: RunOutcome::Completed,
        handoff: None,
        state,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::super::errors::SafetyError;
    use super::super::graph::GraphConfig;
    use super::super::personas;
    use super::super::test_support::ScriptedModel;
    use super::*;
    use crate::inference::LanguageModel;
    use crate::tools::{ToolAggregator, ToolRegistry};

    struct StubSafety {
        verdict: Result<Option<&'static str>, ()>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubSafety {
        fn new(verdict: Result<Option<&'static str>, ()>) -> Self {
            Self {
                verdict,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl SafetyClassifier for StubSafety {
        async fn check(&self, _input: &str) -> Result<Option<String>, SafetyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.verdict {
                Ok(v) => Ok(v.map(str::to_string)),
                Err(()) => Err(SafetyError::ClassifierFailed {
                    reason: "classifier offline".into(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct CountingSink {
        spoken: std::sync::Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl SpeechSink for CountingSink {
        async fn speak(&self, text: &str, voice_id: Option<&str>) -> Result<(), SpeechError> {
            self.spoken
                .lock()
                .unwrap()
                .push((text.to_string(), voice_id.map(str::to_string)));
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl SpeechSink for FailingSink {
        async fn speak(&self, _text: &str, _voice_id: Option<&str>) -> Result<(), SpeechError> {
            Err(SpeechError::SynthesisFailed {
                reason: "no audio device".into(),
            })
        }
    }

    fn runner(model: Arc<dyn LanguageModel>) -> TurnRunner {
        TurnRunner::new(OrchestrationGraph::new(
            model,
            ToolAggregator::static_only(ToolRegistry::with_defaults()),
            GraphConfig::default(),
        ))
    }

    fn sydney() -> &'static Persona {
        personas::find("sydney").unwrap()
    }

    #[tokio::test]
    async fn test_safety_wins_and_skips_speech() {
        let sink = Arc::new(CountingSink::default());
        let runner = runner(Arc::new(ScriptedModel::new().then_text("agent says hi")))
            .with_safety(Arc::new(StubSafety::new(Ok(Some("please reach out")))))
            .with_speech(sink.clone());

        let reply = runner
            .run_turn(ConversationState::new(), "I want to give up", sydney(), None)
            .await
            .unwrap();

        assert_eq!(reply.text, "please reach out");
        assert_eq!(reply.source, ReplySource::Safety);
        assert_eq!(reply.state.len(), 2);
        assert_eq!(reply.state.sender(), Some(NODE_SAFETY));
        assert!(sink.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_safety_still_overrides_finished_agent() {
        let sink = Arc::new(CountingSink::default());
        let runner = runner(Arc::new(ScriptedModel::new().then_text("agent reply")))
            .with_safety(Arc::new(
                StubSafety::new(Ok(Some("crisis text"))).delayed(Duration::from_millis(50)),
            ))
            .with_speech(sink.clone());

        let reply = runner
            .run_turn(ConversationState::new(), "I want to give up", sydney(), None)
            .await
            .unwrap();
        assert_eq!(reply.text, "crisis text");
        assert!(reply
            .state
            .messages()
            .iter()
            .all(|m| m.content != "agent reply"));
        assert!(sink.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_safety_overrides_failed_agent() {
        let model = ScriptedModel::new().then_error(crate::inference::InferenceError::Timeout {
            duration_secs: 1,
        });
        let runner = runner(Arc::new(model)).with_safety(Arc::new(
            StubSafety::new(Ok(Some("crisis text"))).delayed(Duration::from_millis(20)),
        ));
        let reply = runner
            .run_turn(ConversationState::new(), "help", sydney(), None)
            .await
            .unwrap();
        assert_eq!(reply.source, ReplySource::Safety);
    }

    #[tokio::test]
    async fn test_classifier_failure_fails_open() {
        let sink = Arc::new(CountingSink::default());
        let runner = runner(Arc::new(ScriptedModel::new().then_text("agent reply")))
            .with_safety(Arc::new(StubSafety::new(Err(()))))
            .with_speech(sink.clone());

        let reply = runner
            .run_turn(ConversationState::new(), "hello", sydney(), None)
            .await
            .unwrap();
        assert_eq!(reply.text, "agent reply");
        assert_eq!(reply.source, ReplySource::Agent);
        assert_eq!(
            sink.spoken.lock().unwrap().as_slice(),
            &[("agent reply".to_string(), Some("alloy".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_classifier_timeout_fails_open() {
        let runner = runner(Arc::new(ScriptedModel::new().then_text("agent reply")))
            .with_safety(Arc::new(
                StubSafety::new(Ok(Some("too late"))).delayed(Duration::from_secs(5)),
            ))
            .with_safety_timeout(Duration::from_millis(20));

        let reply = runner
            .run_turn(ConversationState::new(), "hello", sydney(), None)
            .await
            .unwrap();
        assert_eq!(reply.source, ReplySource::Agent);
    }

    #[tokio::test]
    async fn test_empty_verdict_is_no_intervention() {
        let runner = runner(Arc::new(ScriptedModel::new().then_text("agent reply")))
            .with_safety(Arc::new(StubSafety::new(Ok(Some("  ")))));
        let reply = runner
            .run_turn(ConversationState::new(), "hello", sydney(), None)
            .await
            .unwrap();
        assert_eq!(reply.text, "agent reply");
    }

    #[tokio::test]
    async fn test_session_start_bypasses_safety() {
        let safety = Arc::new(StubSafety::new(Ok(Some("should not appear"))));
        let runner = runner(Arc::new(ScriptedModel::new().then_text("Welcome back!")))
            .with_safety(safety.clone());

        let reply = runner
            .run_turn(ConversationState::new(), "[SESSION_START]", sydney(), None)
            .await
            .unwrap();
        assert_eq!(reply.text, "Welcome back!");
        assert_eq!(safety.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_speech_failure_does_not_fail_turn() {
        let runner = runner(Arc::new(ScriptedModel::new().then_text("hi")))
            .with_speech(Arc::new(FailingSink));
        let reply = runner
            .run_turn(ConversationState::new(), "hello", sydney(), None)
            .await
            .unwrap();
        assert_eq!(reply.text, "hi");
    }

    #[tokio::test]
    async fn test_model_failure_without_safety_trigger_fails_turn() {
        let model = ScriptedModel::new().then_error(crate::inference::InferenceError::Timeout {
            duration_secs: 1,
        });
        let runner = runner(Arc::new(model)).with_safety(Arc::new(StubSafety::new(Ok(None))));
        let err = runner
            .run_turn(ConversationState::new(), "hello", sydney(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelInference { .. }));
    }

    #[tokio::test]
    async fn test_handoff_surfaces_on_reply() {
        let model = ScriptedModel::new()
            .then_calls(&[(
                "transfer_to_agent",
                json!({"targetAgentId": "luna", "reason": "stress"}),
            )])
            .then_text("Luna will take it from here.");
        let reply = runner(Arc::new(model))
            .run_turn(ConversationState::new(), "I'm stressed", sydney(), None)
            .await
            .unwrap();
        assert_eq!(reply.handoff.unwrap().target, "luna");
    }

    #[tokio::test]
    async fn test_memory_reaches_system_prompt() {
        let model = Arc::new(ScriptedModel::new().then_text("hi"));
        runner(model.clone())
            .run_turn(ConversationState::new(), "hello", sydney(), Some("Prefers tea."))
            .await
            .unwrap();
        assert!(model.requests()[0].system_prompt.ends_with("Prefers tea."));
    }

    #[tokio::test]
    async fn test_persona_temperature_reaches_model() {
        let model = Arc::new(ScriptedModel::new().then_text("booked").then_text("hey"));
        let runner = runner(model.clone());
        let marcus = personas::find("marcus").unwrap();
        let kai = personas::find("kai").unwrap();

        runner
            .run_turn(ConversationState::new(), "a cab", marcus, None)
            .await
            .unwrap();
        runner
            .run_turn(ConversationState::new(), "a run", kai, None)
            .await
            .unwrap();

        let requests = model.requests();
        assert_eq!(requests[0].temperature, marcus.temperature);
        assert!(requests[0].temperature.is_some());
        assert_eq!(requests[1].temperature, None);
    }
}
