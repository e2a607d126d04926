//! OpenAI-compatible streaming chat client.
//!
//! Sends `{model, messages, functions, function_call: "auto", stream: true}` and turns
//! the server-sent events into [`ChatDelta`]s. Both the legacy `function_call` delta and
//! the `tool_calls` delta shapes are accepted.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, trace};

use super::types::{ChatDelta, ChatRequest, DeltaStream, FinishReason, ModelError};
use super::ModelClient;

/// Marker the server sends after the last chunk.
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    role: Option<String>,
    content: Option<String>,
    function_call: Option<WireFunction>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: Option<WireFunction>,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// Streaming client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream, ModelError> {
        let body = request_body(&request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Starting streaming chat request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log_http_error(status.as_u16(), &body);
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(e) if e.data.trim() == DONE_MARKER);
                futures::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        trace!(data = %event.data, "SSE chunk");
                        parse_chunk(&event.data).transpose()
                    }
                    Err(e) => Some(Err(ModelError::Stream(e.to_string()))),
                }
            });

        Ok(Box::pin(stream))
    }
}

/// Build the JSON body for a streaming request.
pub(crate) fn request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages,
        "stream": true,
    });
    if !request.tools.is_empty() {
        body["functions"] = json!(request.tools);
        body["function_call"] = json!("auto");
    }
    body
}

/// Decode one SSE `data:` payload.
///
/// Returns `Ok(None)` for keepalive chunks that carry no choices.
pub(crate) fn parse_chunk(data: &str) -> Result<Option<ChatDelta>, ModelError> {
    let chunk: WireChunk =
        serde_json::from_str(data).map_err(|e| ModelError::Decode(format!("{}: {}", e, data)))?;

    if let Some(err) = chunk.error {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| err.as_str().map(str::to_string))
            .unwrap_or_else(|| "An error occurred during streaming".to_string());
        return Err(ModelError::Api(message));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let WireDelta {
        role,
        content,
        function_call,
        tool_calls,
    } = choice.delta;

    let function = function_call.or_else(|| {
        tool_calls
            .and_then(|calls| calls.into_iter().next())
            .and_then(|call| call.function)
    });
    let (tool_name, tool_arguments) = match function {
        Some(f) => (f.name.filter(|n| !n.is_empty()), f.arguments),
        None => (None, None),
    };

    Ok(Some(ChatDelta {
        role,
        content,
        tool_name,
        tool_arguments,
        finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
    }))
}

/// Log common HTTP error patterns for debugging.
fn log_http_error(status: u16, body: &str) {
    match status {
        400 => error!("HTTP 400 Bad Request - likely invalid model name or request format"),
        401 => error!("HTTP 401 Unauthorized - API key may be missing or invalid"),
        403 => error!("HTTP 403 Forbidden - key may not have access to this model"),
        404 => error!("HTTP 404 Not Found - model name or API base may be wrong"),
        429 => error!("HTTP 429 Rate Limited - too many requests"),
        500..=599 => error!("HTTP {} Server Error - API issue", status),
        _ => error!("HTTP {} from model API", status),
    }

    if !body.is_empty() {
        error!("API Error Body: {}", body);
    }
}
