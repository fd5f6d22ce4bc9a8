//! Token counting and budget management.
//!
//! Provides utilities for estimating token usage of a conversation and
//! deciding when it has grown close enough to the model's context ceiling
//! to warrant aggressive compaction.
//! Uses a simple heuristic: ~4 characters per token.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::llm::Usage;
use super::message::Message;

/// Characters per token estimate (conservative for GPT-style tokenizers).
const CHARS_PER_TOKEN: usize = 4;

/// Fraction of the ceiling at which aggressive compaction kicks in.
pub const THRESHOLD_RATIO: f64 = 0.80;

/// Once triggered, the flag re-arms only after usage falls below this fraction.
const REARM_RATIO: f64 = 0.70;

/// Estimate token count for a string, by characters rather than bytes.
#[inline]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate token count for a whole conversation.
///
/// Counts content, reasoning text and the tool-call arguments the client
/// sends back on every request.
pub fn estimate_messages(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| {
            let calls: usize = m
                .tool_calls
                .iter()
                .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments))
                .sum();
            estimate_tokens(&m.content)
                + m.reasoning_content.as_deref().map(estimate_tokens).unwrap_or(0)
                + calls
        })
        .sum()
}

/// Outcome of observing the conversation size against the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetSignal {
    /// Comfortably under the threshold.
    WithinBudget,
    /// Just crossed the threshold; run aggressive compaction now.
    CrossedThreshold,
    /// Still over the threshold, but compaction already ran for this plateau.
    AlreadyTriggered,
}

/// Context budget for one session.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    ceiling: usize,
    triggered: bool,
}

impl ContextBudget {
    /// Create a budget for a model with the given context ceiling (in tokens).
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
            triggered: false,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        estimate_messages(messages)
    }

    pub fn is_over_threshold(&self, tokens: usize) -> bool {
        tokens as f64 > self.ceiling as f64 * THRESHOLD_RATIO
    }

    /// Fraction of the ceiling in use.
    pub fn fraction(&self, tokens: usize) -> f64 {
        tokens as f64 / self.ceiling as f64
    }

    /// Whether aggressive compaction has fired for the current plateau.
    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Record a fresh estimate and report whether compaction should fire.
    ///
    /// The trigger is one-shot: repeated observations above the threshold
    /// report `AlreadyTriggered` until usage drops below the re-arm level.
    pub fn observe(&mut self, tokens: usize) -> BudgetSignal {
        if self.is_over_threshold(tokens) {
            if self.triggered {
                return BudgetSignal::AlreadyTriggered;
            }
            self.triggered = true;
            warn!(
                "Context at {:.0}% of {} tokens, compacting aggressively",
                self.fraction(tokens) * 100.0,
                self.ceiling
            );
            return BudgetSignal::CrossedThreshold;
        }

        if self.triggered && (tokens as f64) < self.ceiling as f64 * REARM_RATIO {
            debug!("Context back under {:.0}%, re-arming budget trigger", REARM_RATIO * 100.0);
            self.triggered = false;
        }
        BudgetSignal::WithinBudget
    }

    /// Clear the trigger at the start of a new query.
    pub fn reset(&mut self) {
        self.triggered = false;
    }
}

/// Running token and cost totals for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub model_calls: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub cached_tokens: usize,
    pub cost: f64,
}

impl UsageTotals {
    /// Add one model response's usage.
    pub fn record(&mut self, usage: &Usage) {
        self.model_calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.cached_tokens += usage.cached_tokens;
        self.cost += usage.estimated_cost;
    }

    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }

    /// Share of prompt tokens served from the provider cache.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.prompt_tokens == 0 {
            0.0
        } else {
            self.cached_tokens as f64 / self.prompt_tokens as f64
        }
    }

    /// Format as a compact summary string.
    pub fn summary(&self) -> String {
        format!(
            "{}↓ {}↑ ({} cached) ${:.4} over {} calls",
            self.prompt_tokens, self.completion_tokens, self.cached_tokens, self.cost, self.model_calls
        )
    }
}
