//! tern CLI entry point

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use tern::agent::llm::openai::context_limit_for;
use tern::agent::{create_client, AgentLoop, LlmClient};
use tern::config::Config;
use tern::session::SessionStore;
use tern::tools::ToolDispatcher;
use tern::ui;

#[derive(Parser)]
#[command(name = "tern")]
#[command(about = "tern - autonomous coding assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Run the agent on a task
    Agent {
        /// Task to run; omit for an interactive prompt
        #[arg(short, long)]
        message: Option<String>,

        /// Ignore the previous session's summary
        #[arg(long)]
        fresh: bool,

        /// Override the configured iteration limit
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Print the persisted summary of the last session
    Summary,

    /// Show configuration and budget facts
    Status,
}

/// How one query ended.
enum QueryOutcome {
    Finished,
    Failed(tern::Error),
    Interrupted,
}

/// What the interactive prompt produced.
#[derive(Debug, PartialEq)]
enum Prompt {
    Line(String),
    Eof,
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let path = tern::config::init()?;
            ui::print_success(&format!("Wrote {}", path.display()));
            println!("\nNext steps:");
            ui::print_step("Set \"api_key\" in the config, or export TERN_API_KEY");
            ui::print_step("Run: tern agent -m \"Describe this repository\"");
        }

        Commands::Agent {
            message,
            fresh,
            max_iterations,
        } => {
            let config = tern::config::load()?;
            run_agent(config, message, fresh, max_iterations).await?;
        }

        Commands::Summary => {
            let config = tern::config::load()?;
            let store = SessionStore::new(&config.state_file);
            match store.load_summary()? {
                Some(summary) => println!("{}", summary),
                None => println!("No previous session at {}", store.path().display()),
            }
        }

        Commands::Status => {
            let config = tern::config::load()?;
            let limit = config
                .context_limit
                .unwrap_or_else(|| context_limit_for(&config.model));
            let store = SessionStore::new(&config.state_file);

            println!("tern status\n");
            println!("Workspace: {:?}", config.workspace);
            println!("Provider: {}", config.provider);
            println!("Model: {}", config.model);
            println!(
                "API key: {}",
                if config.resolved_api_key().is_empty() { "not set" } else { "✓" }
            );
            println!("Context limit: {} tokens (compaction at {} tokens)", limit, limit * 4 / 5);
            println!("Max iterations: {}", config.max_iterations);
            println!(
                "Reasoning: {}",
                config.reasoning.map_or("model default".to_string(), |r| r.to_string())
            );
            println!(
                "Previous session: {}",
                if store.load_summary()?.is_some() { "✓" } else { "none" }
            );
        }
    }

    Ok(())
}

async fn run_agent(
    config: Config,
    message: Option<String>,
    fresh: bool,
    max_iterations: Option<usize>,
) -> Result<()> {
    let store = SessionStore::new(&config.state_file);
    let previous = if fresh {
        None
    } else {
        store.load_summary().unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable session state: {}", e);
            None
        })
    };

    let client = create_client(&config)?;
    let dispatcher = ToolDispatcher::local(
        config.workspace.clone(),
        Duration::from_secs(config.shell_timeout_secs),
    );
    let mut agent = AgentLoop::new(client, dispatcher, config.workspace.clone())
        .with_max_iterations(max_iterations.unwrap_or(config.max_iterations))
        .with_reasoning(config.reasoning)
        .with_context_limit(config.context_limit)
        .with_previous_summary(previous);

    ui::print_header(agent.client().model(), &config.provider, &config.workspace);

    if let Some(msg) = message {
        return match run_query(&mut agent, &store, &msg).await? {
            QueryOutcome::Interrupted => Ok(()),
            QueryOutcome::Finished => {
                print_totals(&agent);
                Ok(())
            }
            QueryOutcome::Failed(e) => {
                print_totals(&agent);
                Err(e.into())
            }
        };
    }

    println!("Interactive mode (type 'exit' to quit)\n");
    let mut lines = stdin_lines();
    loop {
        print!("\x1b[1;34mYou\x1b[0m: ");
        io::stdout().flush()?;

        let line = match next_prompt(&mut lines, tokio::signal::ctrl_c()).await? {
            Prompt::Line(line) => line,
            Prompt::Eof => break,
            Prompt::Interrupted => {
                println!();
                ui::print_warning("Interrupted");
                break;
            }
        };
        let input = line.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        if let QueryOutcome::Interrupted = run_query(&mut agent, &store, input).await? {
            // Totals were printed by run_query
            return Ok(());
        }
    }

    print_totals(&agent);
    Ok(())
}

/// Stdin lines, read on a dedicated thread so the prompt can race Ctrl-C.
fn stdin_lines() -> mpsc::UnboundedReceiver<io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Wait for the next input line or an interrupt, whichever comes first.
async fn next_prompt<F>(
    lines: &mut mpsc::UnboundedReceiver<io::Result<String>>,
    interrupt: F,
) -> io::Result<Prompt>
where
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        line = lines.recv() => match line {
            Some(line) => line.map(Prompt::Line),
            None => Ok(Prompt::Eof),
        },
        _ = interrupt => Ok(Prompt::Interrupted),
    }
}

fn print_totals<C: LlmClient>(agent: &AgentLoop<C>) {
    ui::print_session_summary(agent.usage(), agent.total_iterations(), agent.scope().actions().len());
}

/// Run one query, racing it against Ctrl-C. State is saved only when the
/// query ran to an end.
async fn run_query<C: LlmClient>(
    agent: &mut AgentLoop<C>,
    store: &SessionStore,
    query: &str,
) -> Result<QueryOutcome> {
    let result = tokio::select! {
        result = agent.run(query) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let outcome = match result {
        None => {
            println!();
            ui::print_warning("Interrupted; session state not saved");
            ui::print_session_summary(
                agent.usage(),
                agent.total_iterations() + agent.iterations(),
                agent.scope().actions().len(),
            );
            return Ok(QueryOutcome::Interrupted);
        }
        Some(Ok(text)) => {
            println!("\n\x1b[1;32mtern\x1b[0m: {}\n", text);
            QueryOutcome::Finished
        }
        Some(Err(e)) => {
            ui::print_error(&e.to_string());
            QueryOutcome::Failed(e)
        }
    };

    store.save(&agent.export_state()?)?;
    Ok(outcome)
}
