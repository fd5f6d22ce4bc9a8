use colored::*;
use terminal_size::{terminal_size, Height, Width};

use crate::agent::UsageTotals;
use crate::tools::Progress;

pub fn print_header(model: &str, provider: &str, workspace: &std::path::Path) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let line = "─".repeat(width.0 as usize);
    println!("{}", line.black().bold());

    let name = "tern".cyan().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}", name, version);
    println!("{}", format!("  {}  •  {}", model, provider).cyan());
    println!("  {}", workspace.to_string_lossy().black().bold());

    println!("{}", line.black().bold());
}

/// One line per tool call: `[iteration:(used/limit)] action target`.
pub fn print_progress(progress: &Progress, action: &str, target: &str) {
    let percent = if progress.token_limit == 0 {
        0.0
    } else {
        progress.tokens_used as f64 * 100.0 / progress.token_limit as f64
    };
    let budget = format!(
        "[{}:({}/{})]",
        progress.iteration, progress.tokens_used, progress.token_limit
    );
    let budget = if percent >= 80.0 {
        budget.red()
    } else if percent >= 50.0 {
        budget.yellow()
    } else {
        budget.black().bold()
    };
    println!("  {} {} {}", budget, action.green().bold(), one_line(target, 100));
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

/// End-of-session totals.
pub fn print_session_summary(usage: &UsageTotals, iterations: usize, actions: usize) {
    println!();
    println!("  {}", "Session summary".bold());
    println!("  {} {}", "iterations:".black().bold(), iterations);
    println!("  {} {}", "model calls:".black().bold(), usage.model_calls);
    println!(
        "  {} {} prompt / {} completion",
        "tokens:".black().bold(),
        usage.prompt_tokens,
        usage.completion_tokens
    );
    println!(
        "  {} {} ({:.0}%)",
        "cached:".black().bold(),
        usage.cached_tokens,
        usage.cache_hit_rate() * 100.0
    );
    println!("  {} ${:.4}", "cost:".black().bold(), usage.cost);
    println!("  {} {}", "actions:".black().bold(), actions);
}

fn one_line(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        format!("{}…", flat.chars().take(max).collect::<String>())
    }
}
