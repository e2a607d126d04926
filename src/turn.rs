//! Turn loop.
//!
//! One user input can take several model round-trips: the model calls a tool, the
//! result is folded back into the conversation, and the model is asked again. The loop
//! keeps requesting responses while the finish reason asks for one, publishing the
//! visible history after every delta.

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::conversation::DisplayHistory;
use crate::decoder::{StreamDecoder, TurnContext, TurnError};
use crate::model::{ChatRequest, FinishReason, ModelClient};

/// Model a turn talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTarget {
    /// Name sent to the API.
    pub model: String,
    /// Slicing budget for outbound requests.
    pub context_window: usize,
}

/// How a completed turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSummary {
    /// Model round-trips made.
    pub rounds: usize,
    pub finish_reason: FinishReason,
}

/// Drives model round-trips until the model stops asking for tool execution.
#[derive(Debug, Clone)]
pub struct TurnLoop {
    max_rounds: usize,
    updates: Option<mpsc::UnboundedSender<DisplayHistory>>,
}

impl TurnLoop {
    pub fn new(max_rounds: usize) -> Self {
        Self {
            max_rounds: max_rounds.max(1),
            updates: None,
        }
    }

    /// Send a copy of the visible history after every change.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<DisplayHistory>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    fn publish(&self, history: &DisplayHistory) {
        if let Some(tx) = &self.updates {
            // Receiver gone means nobody is watching; the turn still runs.
            let _ = tx.send(history.clone());
        }
    }

    fn fail(
        &self,
        decoder: &mut StreamDecoder,
        err: TurnError,
        ctx: &mut TurnContext<'_>,
    ) -> TurnError {
        let err = decoder.abort(err, ctx);
        self.publish(ctx.history);
        err
    }

    /// Run model round-trips while the decoder's finish reason wants a response.
    ///
    /// Nothing happens unless the finish reason is `new_input` or `tool_call`. A fatal
    /// error ends the turn with a diagnostic in the visible history; no round is retried.
    pub async fn run(
        &self,
        model: &dyn ModelClient,
        target: &TurnTarget,
        decoder: &mut StreamDecoder,
        ctx: &mut TurnContext<'_>,
    ) -> Result<TurnSummary, TurnError> {
        let mut rounds = 0;

        while decoder.finish_reason().wants_model_response() {
            if rounds >= self.max_rounds {
                return Err(self.fail(decoder, TurnError::TooManyRounds(rounds), ctx));
            }
            rounds += 1;

            ctx.history.begin_bot_reply();
            self.publish(ctx.history);

            let request = ChatRequest {
                model: target.model.clone(),
                messages: ctx
                    .conversation
                    .slice_for_request(&target.model, target.context_window),
                tools: decoder.tools().specs(),
            };
            info!(
                model = %target.model,
                messages = request.messages.len(),
                round = rounds,
                "Requesting model response"
            );

            let mut stream = match model.stream_chat(request).await {
                Ok(stream) => stream,
                Err(e) => return Err(self.fail(decoder, TurnError::Model(e), ctx)),
            };

            let mut finished = false;
            while let Some(item) = stream.next().await {
                let delta = match item {
                    Ok(delta) => delta,
                    Err(e) => return Err(self.fail(decoder, TurnError::Model(e), ctx)),
                };
                let terminal = delta.finish_reason.is_some();

                let fed = decoder.feed(delta, ctx).await;
                self.publish(ctx.history);
                fed?;

                if terminal {
                    finished = true;
                    break;
                }
            }

            if !finished {
                return Err(self.fail(decoder, TurnError::StreamEnded, ctx));
            }
            debug!(finish_reason = %decoder.finish_reason(), round = rounds, "Round complete");
        }

        Ok(TurnSummary {
            rounds,
            finish_reason: decoder.finish_reason(),
        })
    }
}

impl Default for TurnLoop {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_TOOL_ROUNDS)
    }
}
