//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::kernel::{EngineError, EngineLauncher, EngineMessage, ExecutionEngine};
use crate::model::{ChatDelta, ChatRequest, DeltaStream, ModelClient, ModelError};

#[derive(Debug, Clone)]
enum Reply {
    Messages(Vec<EngineMessage>),
    Hang,
    Exit,
}

/// Launches engines that answer code by substring match.
///
/// Code matching no rule gets an immediate idle status.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedLauncher {
    rules: Vec<(String, Reply)>,
    submissions: Arc<Mutex<Vec<String>>>,
    launches: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer code containing `pattern` with `messages` followed by idle.
    pub(crate) fn respond(mut self, pattern: &str, messages: Vec<EngineMessage>) -> Self {
        self.rules
            .push((pattern.to_string(), Reply::Messages(messages)));
        self
    }

    /// Never answer code containing `pattern`.
    pub(crate) fn hang_on(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Reply::Hang));
        self
    }

    /// Close the engine when it receives code containing `pattern`.
    pub(crate) fn exit_on(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Reply::Exit));
        self
    }

    /// Every code string submitted to any engine from this launcher.
    pub(crate) fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }

    pub(crate) fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn ExecutionEngine>, EngineError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            rules: self.rules.clone(),
            submissions: Arc::clone(&self.submissions),
            queue: VecDeque::new(),
            hung: false,
        }))
    }
}

struct ScriptedEngine {
    rules: Vec<(String, Reply)>,
    submissions: Arc<Mutex<Vec<String>>>,
    queue: VecDeque<EngineMessage>,
    hung: bool,
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn submit(&mut self, code: &str) -> Result<(), EngineError> {
        self.submissions.lock().unwrap().push(code.to_string());

        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| code.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        self.queue.clear();
        match reply {
            Some(Reply::Messages(messages)) => {
                self.queue.extend(messages);
                self.queue.push_back(EngineMessage::idle());
            }
            Some(Reply::Hang) => self.hung = true,
            Some(Reply::Exit) => {}
            None => self.queue.push_back(EngineMessage::idle()),
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<EngineMessage>, EngineError> {
        if self.hung {
            return std::future::pending().await;
        }
        Ok(self.queue.pop_front())
    }

    async fn shutdown(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Model client that replays one scripted delta list per request.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    rounds: Mutex<VecDeque<(Vec<ChatDelta>, Option<String>)>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the deltas of one round-trip.
    pub(crate) fn round(self, deltas: Vec<ChatDelta>) -> Self {
        self.rounds.lock().unwrap().push_back((deltas, None));
        self
    }

    /// Queue a round-trip whose stream fails after `deltas`.
    pub(crate) fn failing_round(self, deltas: Vec<ChatDelta>, message: &str) -> Self {
        self.rounds
            .lock()
            .unwrap()
            .push_back((deltas, Some(message.to_string())));
        self
    }

    /// Requests received so far.
    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream, ModelError> {
        self.requests.lock().unwrap().push(request);
        let (deltas, failure) = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::Stream("no scripted round left".into()))?;

        let mut items: Vec<Result<ChatDelta, ModelError>> = deltas.into_iter().map(Ok).collect();
        if let Some(message) = failure {
            items.push(Err(ModelError::Stream(message)));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Deltas streaming one `execute_code` call with the given code.
pub(crate) fn tool_call_round(code: &str) -> Vec<ChatDelta> {
    let arguments = serde_json::json!({ "code": code }).to_string();
    let mid = (0..=arguments.len() / 2)
        .rev()
        .find(|i| arguments.is_char_boundary(*i))
        .unwrap_or(0);
    let (head, tail) = arguments.split_at(mid);
    vec![
        ChatDelta::role("assistant"),
        ChatDelta::tool_name(crate::model::EXECUTE_CODE_TOOL),
        ChatDelta::arguments(head),
        ChatDelta::arguments(tail).with_finish(crate::model::FinishReason::ToolCall),
    ]
}

/// Deltas streaming a plain text answer.
pub(crate) fn text_round(text: &str) -> Vec<ChatDelta> {
    vec![
        ChatDelta::role("assistant"),
        ChatDelta::content(text).with_finish(crate::model::FinishReason::Stop),
    ]
}
