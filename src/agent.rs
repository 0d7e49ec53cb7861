use std::sync::Arc;

use tracing::info;

use crate::error::{ChatError, Result};
use crate::llm::{LanguageModel, ModelReply};
use crate::message::Turn;
use crate::tool::ToolRegistry;
use crate::transcript::Transcript;

/// The conversation loop: alternates between the model and registered tools
/// until the model produces a final text reply.
///
/// One `respond` call drives one user turn through the state machine. Tool
/// calls within a round run sequentially in the order the model emitted them,
/// so tool-result turns land in a deterministic order. The number of rounds
/// is bounded; hitting the cap fails the turn instead of returning
/// partially-resolved state.
pub struct Agent<M: LanguageModel> {
    system_prompt: String,
    model: Arc<M>,
    tools: ToolRegistry,
    max_tool_rounds: usize,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            model,
            tools: ToolRegistry::new(),
            max_tool_rounds: 4,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    /// Run one user message through the loop, appending to `transcript`.
    /// Returns the final assistant text.
    ///
    /// A model failure leaves no assistant turn behind for the failed
    /// invocation; the user turn stays, so a retry of the request re-asks the
    /// same question.
    pub async fn respond(
        &self,
        transcript: &mut Transcript,
        user_message: impl Into<String>,
    ) -> Result<String> {
        let user_message = user_message.into();
        info!(role = "user", content = %user_message, "turn");
        transcript.push(Turn::user(user_message));

        let catalog = self.tools.describe();
        for _ in 0..self.max_tool_rounds {
            let reply = self
                .model
                .complete(&self.system_prompt, &catalog, transcript.turns())
                .await?;

            let (calls, content) = match reply {
                ModelReply::Text(content) => {
                    info!(role = "assistant", content = %content, "turn");
                    transcript.push(Turn::assistant(&content));
                    return Ok(content);
                }
                // A tool-call reply with no calls carries no work; treat it
                // as plain text.
                ModelReply::ToolCalls { calls, content } if calls.is_empty() => {
                    info!(role = "assistant", content = %content, "turn");
                    transcript.push(Turn::assistant(&content));
                    return Ok(content);
                }
                ModelReply::ToolCalls { calls, content } => (calls, content),
            };

            // Resolve every name before appending anything: an unknown tool
            // fails the turn, and failing after the append would leave an
            // assistant turn with calls that never get results.
            let mut resolved = Vec::with_capacity(calls.len());
            for call in &calls {
                let tool = self
                    .tools
                    .get(&call.name)
                    .ok_or_else(|| ChatError::ToolNotFound(call.name.clone()))?;
                resolved.push(tool);
            }

            transcript.push(Turn::assistant_with_calls(&content, calls.clone()));

            for (call, tool) in calls.iter().zip(resolved) {
                info!(tool = %call.name, args = %call.arguments, "dispatching tool call");
                // A failing tool never aborts the turn; the model gets the
                // diagnostic and can react conversationally.
                let output = match tool.call(call.arguments.clone()).await {
                    Ok(output) => output,
                    Err(err) => {
                        tracing::warn!(tool = %call.name, error = %err, "tool call failed");
                        format!("tool `{}` failed: {err}", call.name)
                    }
                };
                transcript.push(Turn::tool_result(&call.id, output));
            }
        }

        Err(ChatError::ToolLoopExceeded {
            rounds: self.max_tool_rounds,
        })
    }
}
