//! Agent module - core agent logic.
//!
//! This module contains:
//! - Message types (Message, ToolCall, ToolResultTag)
//! - LLM client trait and the OpenAI-compatible implementation
//! - Conversation optimizer and context budget
//! - Agent loop for processing queries
//! - Context builder for prompts
//!
//! # Adding a New LLM Provider
//!
//! See [`llm`] for instructions.

mod context;
mod fallback;
mod heuristics;
mod loop_impl;
mod message;
mod optimizer;
pub mod tokens;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use context::Context;
pub use fallback::extract_tool_calls;
pub use heuristics::{classify_final, ResponseVerdict};
pub use llm::{create_client, LlmClient, LlmResponse, ReasoningLevel, Usage};
pub use loop_impl::AgentLoop;
pub use message::{Message, Role, ToolCall, ToolResultTag};
pub use optimizer::{CommandRecord, ConversationOptimizer, FileReadRecord, COMPACTED_MARKER, OPTIMIZED_MARKER};
pub use tokens::{ContextBudget, UsageTotals};
