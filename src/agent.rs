//! The dive log agent: a hosted chat model bound to the tool layer.
//!
//! Each call to [`DiveAgent::respond`] is one user turn:
//!
//! ```text
//! preferences ──► system prompt
//! user text ────► history ──► model ──► tool calls? ──► dispatch (in order)
//!                                ▲                          │
//!                                └──── tool results ◄───────┘
//!                                text reply ──► AgentReply
//! ```
//!
//! Tool calls within a round run one after another in the order the model
//! listed them, so a create followed by a search sees the new entry. A turn
//! that fails leaves the history exactly as it was before the turn.

use serde::Serialize;
use std::sync::Arc;

use crate::error::{DiveLogError, DiveResult};
use crate::llm::{ChatMessage, ChatModel, Role};
use crate::models::UserPreference;
use crate::tools::{ToolContext, ToolRegistry};

const SYSTEM_PROMPT: &str = "\
Role:
- You are an administrative assistant for an avid scuba diver. You are professional, yet fun and engaging.

Tasks:
- Maintain and update the user's dive log.
- Answer questions about the user's dive history, both about a specific dive and questions that aggregate across the whole log.

Tools:
- search_dive_logs: always pass a query with the key terms from the question. Extract filters when the question names them (location, dive_type, max_depth, min_depth). Example: \"What wreck dives did I do in Thailand?\" becomes search_dive_logs(query=\"wreck dives\", location=\"Thailand\", dive_type=\"wreck\").
- get_all_dives: the complete history, most recent first, with totals. Use it for counts, totals, deepest dive and other aggregate questions.
- get_dive_log: one entry by id.
- create_dive_log: add a new dive. Use only the details the user gave you.
- get_user_preference / save_user_preference: read or store preferences such as depth_unit (meters or feet). Save a preference whenever the user states one.

Constraints:
- Only report information contained in tool results or the user's stored preferences.
- Never invent dives, sightings, depths or dates, and never fill in missing fields of a new entry.
- If the log does not contain the answer, say so.
- Cite specific details from the log (site, date, depth) when answering.
- Stored depths are in meters. When the user prefers feet, convert (1 m = 3.28084 ft).
- Diving puns are welcome as long as they do not get in the way of a useful answer.";

/// A single tool invocation made while answering a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: String,
    pub success: bool,
}

/// The agent's answer to one user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
}

pub struct DiveAgent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    ctx: ToolContext,
    max_tool_rounds: usize,
    history: Vec<ChatMessage>,
}

impl DiveAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        ctx: ToolContext,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            model,
            tools,
            ctx,
            max_tool_rounds: max_tool_rounds.max(1),
            history: Vec::new(),
        }
    }

    /// Conversation so far, without the system message.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Answer one user message, calling tools as the model requests.
    pub async fn respond(&mut self, input: &str) -> DiveResult<AgentReply> {
        let checkpoint = self.history.len();
        let result = self.run_turn(input).await;
        if result.is_err() {
            self.history.truncate(checkpoint);
        }
        result
    }

    async fn run_turn(&mut self, input: &str) -> DiveResult<AgentReply> {
        let preferences = self.ctx.store().list_preferences().await?;
        let system = ChatMessage::system(build_system_prompt(&preferences));

        self.history.push(ChatMessage::user(input));

        let definitions = self.tools.definitions();
        let mut invocations = Vec::new();

        for round in 0..=self.max_tool_rounds {
            let mut messages = Vec::with_capacity(self.history.len() + 1);
            messages.push(system.clone());
            messages.extend(self.history.iter().cloned());

            tracing::debug!(round, messages = messages.len(), "calling model");
            let reply = self.model.complete(&messages, &definitions).await?;

            if reply.tool_calls.is_empty() {
                let text = reply
                    .content
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| DiveLogError::upstream("model returned an empty reply"))?
                    .to_string();
                self.history.push(ChatMessage::assistant(text.clone()));
                return Ok(AgentReply {
                    text,
                    tool_calls: invocations,
                });
            }

            if round == self.max_tool_rounds {
                break;
            }

            let calls = reply.tool_calls.clone();
            self.history.push(ChatMessage {
                role: Role::Assistant,
                content: reply.content,
                tool_calls: reply.tool_calls,
                tool_call_id: None,
            });

            for call in calls {
                tracing::debug!(tool = %call.function.name, args = %call.function.arguments, "tool call");
                let outcome = self
                    .tools
                    .dispatch(&call.function.name, &call.function.arguments, &self.ctx)
                    .await;
                invocations.push(ToolInvocation {
                    name: call.function.name,
                    arguments: call.function.arguments,
                    success: outcome.success,
                });
                self.history
                    .push(ChatMessage::tool_result(call.id, outcome.payload.to_string()));
            }
        }

        Err(DiveLogError::upstream(format!(
            "model kept requesting tools after {} rounds",
            self.max_tool_rounds
        )))
    }
}

/// The system prompt with the user's stored preferences appended.
pub fn build_system_prompt(preferences: &[UserPreference]) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str("\n\nUser preferences:\n");
    if preferences.is_empty() {
        prompt.push_str("- none stored (report depths in meters)\n");
    } else {
        for pref in preferences {
            prompt.push_str(&format!("- {}: {}\n", pref.key, pref.value));
        }
    }
    prompt
}
