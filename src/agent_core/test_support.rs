//! Scripted collaborators for agent-core unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::inference::{InferenceError, LanguageModel, ModelRequest, ModelResponse, ToolCall};

/// Replays queued responses; answers "done" once the queue is empty.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelResponse, InferenceError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Mutex<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_text(self, text: &str) -> Self {
        self.push(Ok(ModelResponse::text(text)))
    }

    /// One turn requesting the given `(name, args)` calls, in order.
    pub fn then_calls(self, calls: &[(&str, Value)]) -> Self {
        let calls = calls
            .iter()
            .map(|(name, args)| ToolCall::new(name, args.clone()))
            .collect();
        self.push(Ok(ModelResponse::calls(calls)))
    }

    pub fn then_error(self, error: InferenceError) -> Self {
        self.push(Err(error))
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    fn push(self, item: Result<ModelResponse, InferenceError>) -> Self {
        self.script.lock().unwrap().push_back(item);
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, InferenceError> {
        self.requests.lock().unwrap().push(request);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ModelResponse::text("done")))
    }
}

/// Requests the same tool call forever.
pub struct LoopingModel {
    pub tool: &'static str,
    pub calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for LoopingModel {
    async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelResponse::calls(vec![ToolCall::new(
            self.tool,
            serde_json::json!({}),
        )]))
    }
}
