//! One tool-calling turn against the chat model.
//!
//! A turn starts from a fresh conversation holding only the user's input
//! (plus the optional system prompt) and runs:
//!
//! ```text
//!   Dispatch ──reply has tool_calls──▶ ExecuteTools ──▶ Dispatch
//!      │
//!      └──reply is final──▶ Done(answer)
//! ```
//!
//! Nothing carries over between turns. Tool results go back to the model as
//! `tool` messages. A tool name the registry does not know is reported back
//! to the model the same way, so it can recover; a tool that fails aborts
//! the turn.
//!
//! Tool executions are capped per turn by `agent.max_tool_calls`. Once the
//! cap is reached the next dispatch offers no tools, and a model that still
//! asks for one fails the turn.

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::llm::{ChatMessage, ChatModel, ToolCall, ToolSpec};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_tool_calls: usize,
    pub system_prompt: Option<String>,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_tool_calls: config.agent.max_tool_calls,
            system_prompt: config.llm.system_prompt.clone(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Long-lived handles shared by every turn of a session.
pub struct AgentContext {
    pub model: Box<dyn ChatModel>,
    pub tools: ToolRegistry,
    pub settings: AgentSettings,
}

impl AgentContext {
    pub fn new(model: Box<dyn ChatModel>, tools: ToolRegistry, settings: AgentSettings) -> Self {
        Self {
            model,
            tools,
            settings,
        }
    }
}

enum TurnState {
    Dispatch,
    ExecuteTools(Vec<ToolCall>),
    Done(String),
}

/// Answer `input` in a fresh conversation, calling tools as the model asks.
pub async fn run_turn(ctx: &AgentContext, input: &str) -> Result<String> {
    let mut messages = Vec::new();
    if let Some(prompt) = &ctx.settings.system_prompt {
        messages.push(ChatMessage::system(prompt.clone()));
    }
    messages.push(ChatMessage::user(input));

    let specs = ctx.tools.specs();
    let cap = ctx.settings.max_tool_calls;
    let mut executed = 0usize;
    let mut state = TurnState::Dispatch;

    loop {
        state = match state {
            TurnState::Dispatch => {
                let offered: &[ToolSpec] = if executed < cap { &specs } else { &[] };
                let reply = ctx
                    .model
                    .complete(&messages, offered)
                    .await
                    .with_context(|| format!("{} request failed", ctx.model.model_name()))?;

                if reply.tool_calls.is_empty() {
                    TurnState::Done(reply.text())
                } else if offered.is_empty() {
                    bail!(
                        "model kept requesting tools after the limit of {} tool calls",
                        cap
                    );
                } else {
                    let calls = reply.tool_calls.clone();
                    messages.push(reply);
                    TurnState::ExecuteTools(calls)
                }
            }
            TurnState::ExecuteTools(calls) => {
                for call in &calls {
                    // Every call id needs an answer, even past the cap.
                    let result = if executed < cap {
                        executed += 1;
                        execute_call(ctx, call).await?
                    } else {
                        format!("Tool call limit of {} reached; '{}' was not run.", cap, call.function.name)
                    };
                    messages.push(ChatMessage::tool_result(call, result));
                }
                TurnState::Dispatch
            }
            TurnState::Done(answer) => {
                tracing::debug!(tool_calls = executed, "turn complete");
                return Ok(answer);
            }
        };
    }
}

async fn execute_call(ctx: &AgentContext, call: &ToolCall) -> Result<String> {
    let name = call.function.name.as_str();
    let Some(tool) = ctx.tools.find(name) else {
        tracing::warn!(tool = name, "model requested unknown tool");
        return Ok(format!("Tool '{}' not found", name));
    };

    let params = call.parsed_arguments()?;
    tool.execute(params)
        .await
        .with_context(|| format!("tool '{}' failed", name))
}
