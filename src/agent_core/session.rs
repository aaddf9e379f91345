//! A single user's conversation.
//!
//! Owns the history and the active persona. Handoff directives returned by a
//! turn switch the persona for the next turn only. Closing the session asks
//! the model for a short summary and stores it as the user's memory.

use std::sync::Arc;

use super::errors::AgentError;
use super::memory::MemoryStore;
use super::personas::{self, Persona};
use super::safety::is_session_start;
use super::turn::{TurnReply, TurnRunner};
use super::types::{ConversationState, Message};
use crate::inference::{ModelRequest, Role};

const SUMMARY_PROMPT: &str = "Summarize what you learned about the user in this conversation \
in at most five short sentences: preferences, plans, and anything worth remembering next time. \
Merge in the previous summary if one is given. Reply with the summary only.";

pub struct Session {
    user_id: String,
    persona: &'static Persona,
    state: ConversationState,
    memory_summary: Option<String>,
    runner: Arc<TurnRunner>,
    store: Arc<dyn MemoryStore>,
}

impl Session {
    /// Open a session, loading the user's memory. An unreadable store is
    /// logged and treated as "no memory".
    pub async fn start(
        runner: Arc<TurnRunner>,
        store: Arc<dyn MemoryStore>,
        user_id: &str,
        persona_id: &str,
    ) -> Result<Self, AgentError> {
        let persona = personas::find(persona_id).ok_or_else(|| AgentError::Config {
            reason: format!("unknown persona '{persona_id}'"),
        })?;

        let memory_summary = match store.load(user_id).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "memory load failed, starting fresh");
                None
            }
        };
        tracing::info!(
            user = %user_id,
            persona = %persona.id,
            has_memory = memory_summary.is_some(),
            "session started"
        );

        Ok(Self {
            user_id: user_id.to_string(),
            persona,
            state: ConversationState::new(),
            memory_summary,
            runner,
            store,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn persona(&self) -> &'static Persona {
        self.persona
    }

    pub fn history(&self) -> &ConversationState {
        &self.state
    }

    pub fn memory_summary(&self) -> Option<&str> {
        self.memory_summary.as_deref()
    }

    /// Run one turn and apply any handoff for the next one.
    pub async fn send(&mut self, input: &str) -> Result<TurnReply, AgentError> {
        let reply = self
            .runner
            .run_turn(
                self.state.clone(),
                input,
                self.persona,
                self.memory_summary.as_deref(),
            )
            .await?;

        self.state = reply.state.clone();

        if let Some(directive) = &reply.handoff {
            match personas::find(&directive.target) {
                Some(next) => {
                    tracing::info!(
                        user = %self.user_id,
                        from = %self.persona.id,
                        to = %next.id,
                        "persona switched"
                    );
                    self.persona = next;
                }
                None => tracing::warn!(persona = %directive.target, "handoff to unknown persona ignored"),
            }
        }
        Ok(reply)
    }

    /// Summarize the conversation into the user's memory.
    ///
    /// Returns the saved summary, or `None` when nothing was said.
    pub async fn close(self) -> Result<Option<String>, AgentError> {
        let transcript = transcript(&self.state);
        if transcript.is_empty() {
            return Ok(None);
        }

        let mut prompt = String::new();
        if let Some(previous) = &self.memory_summary {
            prompt.push_str(&format!("Previous summary:\n{previous}\n\n"));
        }
        prompt.push_str(&format!("Conversation:\n{transcript}"));

        let graph = self.runner.graph();
        let request = ModelRequest {
            system_prompt: SUMMARY_PROMPT.to_string(),
            messages: vec![Message::user(&prompt)],
            tools: Vec::new(),
            temperature: Some(0.3),
        };
        let response = tokio::time::timeout(graph.config().model_timeout, graph.model().complete(request))
            .await
            .map_err(|_| AgentError::ModelTimeout {
                timeout_secs: graph.config().model_timeout.as_secs(),
            })??;

        let summary = response.content.unwrap_or_default().trim().to_string();
        if summary.is_empty() {
            return Ok(None);
        }
        self.store.save(&self.user_id, &summary).await?;
        tracing::info!(user = %self.user_id, "session closed, memory saved");
        Ok(Some(summary))
    }
}

/// User and assistant text, one line each, without tool traffic or sentinels.
fn transcript(state: &ConversationState) -> String {
    state
        .messages()
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .filter_map(|m| match m.role {
            Role::User if !is_session_start(&m.content) => Some(format!("User: {}", m.content)),
            Role::Assistant => Some(format!("Assistant: {}", m.content)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
