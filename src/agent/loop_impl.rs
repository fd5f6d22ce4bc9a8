//! Agent loop - the iteration state machine
//!
//! One query runs as: seed the conversation, then repeat
//! optimize → budget check → model call → dispatch or classify, until the
//! model returns an acceptable final answer or the iteration limit is hit.
//!
//! Only transport failures and iteration exhaustion leave the loop as
//! errors. Everything else (unknown tools, bad arguments, failed commands,
//! leaked tool-call text, premature stops) is fed back to the model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::session::{self, build_compact_summary, SessionScope, SessionState};
use crate::tools::{Progress, ToolDefinition, ToolDispatcher};
use crate::ui;
use crate::Result;

use super::context::Context;
use super::fallback::extract_tool_calls;
use super::heuristics::{classify_final, ResponseVerdict};
use super::llm::{Choice, FinishReason, LlmClient, ReasoningLevel};
use super::message::{Message, ToolCall, ToolResultTag};
use super::optimizer::ConversationOptimizer;
use super::tokens::{BudgetSignal, ContextBudget, UsageTotals};

/// Encouragements per query before short text is accepted as final.
const MAX_ENCOURAGEMENTS: usize = 3;

/// Format reminders per query before leaked tool-call text is accepted.
const MAX_FORMAT_REMINDERS: usize = 3;

const FORMAT_REMINDER: &str = "Your last reply contained a tool call written as plain text, \
so it was not executed. Call tools only through the structured tool-call interface. \
Do not write tool-call JSON or XML in your reply.";

const ENCOURAGEMENT: &str = "You stopped before the task was finished. Keep working with the \
available tools: explore the workspace, make the changes, and verify them. Reply with a \
final report only once the task is complete.";

const CONTINUE_PROMPT: &str = "Your reply was cut off. Continue exactly where you left off.";

const EMPTY_TOOL_OUTPUT: &str = "(no output)";

/// What to do with one model response.
enum Step {
    Continue,
    Finish(String),
}

/// The agent loop processes queries through the model and tool execution
pub struct AgentLoop<C: LlmClient> {
    client: C,
    dispatcher: ToolDispatcher,
    tools: Vec<ToolDefinition>,
    context: Context,
    optimizer: ConversationOptimizer,
    budget: ContextBudget,
    scope: SessionScope,
    usage: UsageTotals,
    messages: Vec<Message>,
    session_id: String,
    created_at: DateTime<Utc>,
    loaded_summary: Option<String>,
    compact_summary: Option<String>,
    max_iterations: usize,
    reasoning: Option<ReasoningLevel>,
    iterations: usize,
    total_iterations: usize,
    encouragements: usize,
    format_reminders: usize,
}

impl<C: LlmClient> AgentLoop<C> {
    /// Create a loop with a fresh session.
    pub fn new(client: C, dispatcher: ToolDispatcher, workspace: impl Into<PathBuf>) -> Self {
        let tools = dispatcher.definitions();
        let budget = ContextBudget::new(client.context_limit());
        let context = Context::new(workspace, tools.clone());

        let mut agent = Self {
            client,
            dispatcher,
            tools,
            context,
            optimizer: ConversationOptimizer::new(),
            budget,
            scope: SessionScope::new(),
            usage: UsageTotals::default(),
            messages: Vec::new(),
            session_id: String::new(),
            created_at: Utc::now(),
            loaded_summary: None,
            compact_summary: None,
            max_iterations: 50,
            reasoning: None,
            iterations: 0,
            total_iterations: 0,
            encouragements: 0,
            format_reminders: 0,
        };
        agent.start_session();
        agent
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_reasoning(mut self, reasoning: Option<ReasoningLevel>) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// Override the model's context ceiling.
    pub fn with_context_limit(mut self, limit: Option<usize>) -> Self {
        if let Some(limit) = limit {
            self.budget = ContextBudget::new(limit);
        }
        self
    }

    /// Compact summary of an earlier session, shown in the system prompt.
    pub fn with_previous_summary(mut self, summary: Option<String>) -> Self {
        self.context.set_previous_summary(summary);
        self.loaded_summary = self.context.previous_summary().map(str::to_string);
        self
    }

    /// Reset all per-session state and take a new session id.
    pub fn start_session(&mut self) {
        self.scope.reset();
        self.optimizer.reset();
        self.budget.reset();
        self.usage = UsageTotals::default();
        self.messages.clear();
        self.session_id = Uuid::new_v4().to_string();
        self.created_at = Utc::now();
        self.compact_summary = None;
        self.iterations = 0;
        self.total_iterations = 0;
        debug!("Started session {}", self.session_id);
    }

    /// Run one query to completion.
    pub async fn run(&mut self, query: &str) -> Result<String> {
        info!("Starting agent loop: {}", preview(query));
        let result = self.run_query(query).await;

        self.total_iterations += self.iterations;
        let summary = build_compact_summary(
            &self.session_id,
            &self.scope,
            &self.usage,
            self.total_iterations,
        );
        self.context.set_previous_summary(Some(summary.clone()));
        self.compact_summary = Some(summary);

        match &result {
            Ok(text) => info!(
                "Agent completed after {} iterations: {} chars, {}",
                self.iterations,
                text.len(),
                self.usage.summary()
            ),
            Err(e) => warn!("Agent stopped after {} iterations: {}", self.iterations, e),
        }
        result
    }

    async fn run_query(&mut self, query: &str) -> Result<String> {
        self.messages = self.context.seed(query);
        self.optimizer.reset();
        self.budget.reset();
        self.iterations = 0;
        self.encouragements = 0;
        self.format_reminders = 0;

        while self.iterations < self.max_iterations {
            self.iterations += 1;
            debug!("Iteration {}/{}", self.iterations, self.max_iterations);

            self.prepare();

            let response = self
                .client
                .send(&self.messages, &self.tools, self.reasoning)
                .await?;
            self.usage.record(&response.usage);

            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| Error::api("Response contained no choices"))?;

            if let Step::Finish(text) = self.handle_choice(choice).await {
                return Ok(text);
            }
        }

        Err(Error::IterationLimitExceeded {
            max_iterations: self.max_iterations,
        })
    }

    /// Optimize the conversation and compact harder once over budget.
    fn prepare(&mut self) {
        let messages = std::mem::take(&mut self.messages);
        let mut messages = self.optimizer.optimize(messages);

        let tokens = self.budget.estimate_tokens(&messages);
        if self.budget.observe(tokens) == BudgetSignal::CrossedThreshold {
            messages = self.optimizer.aggressive_optimize(messages);
            let after = self.budget.estimate_tokens(&messages);
            ui::print_warning(&format!(
                "Context near limit ({} of {} tokens); compacted older tool output to {}",
                tokens,
                self.budget.ceiling(),
                after
            ));
        }
        self.messages = messages;
    }

    async fn handle_choice(&mut self, choice: Choice) -> Step {
        let content = choice.content.unwrap_or_default();
        let reasoning = choice.reasoning_content;

        let mut calls = choice.tool_calls;
        if calls.is_empty() {
            calls = extract_tool_calls(Some(&content), reasoning.as_deref());
            if !calls.is_empty() {
                warn!("Model wrote {} tool calls as text; executing them", calls.len());
            }
        }

        if !calls.is_empty() {
            self.messages.push(
                Message::assistant_with_tools(content, calls.clone()).with_reasoning(reasoning),
            );
            self.dispatch_all(&calls).await;
            return Step::Continue;
        }

        if choice.finish_reason == FinishReason::Length {
            debug!("Response truncated by length, asking to continue");
            self.messages
                .push(Message::assistant(content).with_reasoning(reasoning));
            self.messages.push(Message::user(CONTINUE_PROMPT));
            return Step::Continue;
        }

        let nudge = match classify_final(&content) {
            ResponseVerdict::MalformedToolCall if self.format_reminders < MAX_FORMAT_REMINDERS => {
                self.format_reminders += 1;
                warn!(
                    "Tool-call text in final answer, reminding model ({}/{})",
                    self.format_reminders, MAX_FORMAT_REMINDERS
                );
                Some(FORMAT_REMINDER)
            }
            ResponseVerdict::Incomplete(reason) if self.encouragements < MAX_ENCOURAGEMENTS => {
                self.encouragements += 1;
                warn!(
                    "Response looks incomplete ({}), encouraging model ({}/{})",
                    reason, self.encouragements, MAX_ENCOURAGEMENTS
                );
                Some(ENCOURAGEMENT)
            }
            _ => None,
        };

        self.messages
            .push(Message::assistant(content.clone()).with_reasoning(reasoning));
        match nudge {
            Some(text) => {
                self.messages.push(Message::user(text));
                Step::Continue
            }
            None => Step::Finish(content),
        }
    }

    /// Run tool calls in order; each gets exactly one result message.
    async fn dispatch_all(&mut self, calls: &[ToolCall]) {
        for call in calls {
            let progress = Progress {
                iteration: self.iterations,
                tokens_used: self.budget.estimate_tokens(&self.messages),
                token_limit: self.budget.ceiling(),
            };
            let tag = ToolResultTag::new(&call.id, &call.name);

            let message = match self.dispatcher.execute(call, &mut self.scope, progress).await {
                Ok(outcome) => {
                    let text = if outcome.text.is_empty() {
                        EMPTY_TOOL_OUTPUT.to_string()
                    } else {
                        outcome.text
                    };
                    Message::tool_result(tag.with_target(outcome.target), text)
                }
                Err(e) => {
                    warn!("Tool {} failed: {}", call.name, e);
                    Message::tool_result(tag, format!("Error: {}", e))
                }
            };
            self.messages.push(message);
        }
    }

    /// Serialize the session, deriving a fresh compact summary.
    pub fn export_state(&self) -> Result<Vec<u8>> {
        let state = SessionState {
            session_id: self.session_id.clone(),
            messages: self.messages.clone(),
            previous_summary: self.loaded_summary.clone(),
            compact_summary: Some(build_compact_summary(
                &self.session_id,
                &self.scope,
                &self.usage,
                self.total_iterations,
            )),
            task_actions: self.scope.actions().to_vec(),
            todos: self.scope.todos.clone(),
            usage: self.usage.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
            legacy_summary: None,
        };
        session::export_state(&state)
    }

    /// Restore a full session from persisted bytes.
    pub fn import_state(&mut self, bytes: &[u8]) -> Result<()> {
        let state = session::import_state(bytes)?;

        self.start_session();
        self.session_id = state.session_id;
        self.created_at = state.created_at;
        self.messages = state.messages;
        self.usage = state.usage;
        self.scope.restore(state.task_actions, state.todos);
        self.loaded_summary = state.previous_summary;
        self.compact_summary = state.compact_summary;

        let summary = self
            .compact_summary
            .clone()
            .or_else(|| self.loaded_summary.clone());
        self.context.set_previous_summary(summary);
        Ok(())
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    pub fn usage(&self) -> &UsageTotals {
        &self.usage
    }

    /// Iterations used by the last query.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Iterations across all finished queries in this session.
    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    pub fn compact_summary(&self) -> Option<&str> {
        self.compact_summary.as_deref()
    }

    pub fn context_limit(&self) -> usize {
        self.budget.ceiling()
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    }
}
