//! PreToolUse hook binary that delegates large operations to Gemini.
//!
//! # Examples
//!
//! ```sh
//! # As a hook (reads the tool call from stdin)
//! echo '{"tool":"Read","parameters":{"file_path":"src/lib.rs"}}' | gemini-bridge
//!
//! # Sweep expired cache entries, logs, and captures
//! gemini-bridge maintenance
//!
//! # Show the configuration a run in this directory would use
//! gemini-bridge config --workdir .
//! ```

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gemini_bridge::hook::HookResponse;
use gemini_bridge::{Bridge, BridgeConfig, ToolInvocation, capture, logging, maintenance};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Delegate large reads, globs, greps, and tasks to the Gemini CLI.
#[derive(Parser)]
#[command(name = "gemini-bridge", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one hook call from stdin (the default).
    Hook,
    /// Remove cache entries, logs, and captures past their retention.
    Maintenance,
    /// Print the resolved configuration as JSON.
    Config {
        /// Project directory whose config file should apply.
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Hook) {
        Command::Hook => {
            let code = run_hook().await;
            std::process::exit(code);
        }
        Command::Maintenance => {
            let config = BridgeConfig::load(&current_dir());
            logging::init(&config);
            maintenance::sweep(&config);
        }
        Command::Config { workdir } => {
            let config = BridgeConfig::load(&workdir.unwrap_or_else(current_dir));
            match serde_json::to_string_pretty(&config.to_layer()) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error: failed to render config: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Read stdin, respond on stdout, and return the exit code.
async fn run_hook() -> i32 {
    let mut raw = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut raw).await {
        emit(&HookResponse::invalid_input(e));
        return 1;
    }

    let parsed = ToolInvocation::parse(&raw);
    let working_dir = parsed
        .as_ref()
        .ok()
        .and_then(|inv| inv.as_ref())
        .and_then(|inv| inv.working_directory.clone())
        .unwrap_or_else(current_dir);

    let config = BridgeConfig::load(&working_dir);
    logging::init(&config);
    if config.capture_inputs && !raw.trim().is_empty() {
        capture::save_logged(&config.capture_dir(), &raw);
    }

    let bridge = Bridge::new(config);
    let outcome = bridge.respond(parsed).await;
    emit(&outcome.response);
    debug!("Hook finished with exit code {}", outcome.exit_code);

    maintenance::maybe_spawn(bridge.config(), &working_dir);
    outcome.exit_code
}

fn emit(response: &HookResponse) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", response.to_json());
    let _ = stdout.flush();
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
