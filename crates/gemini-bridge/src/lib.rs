//! PreToolUse hook that hands large reads, globs, greps, and tasks to the
//! Gemini CLI.
//!
//! A coding assistant runs `gemini-bridge` before each tool call and pipes
//! the call in as JSON. The bridge resolves the files the call touches,
//! measures them, and decides whether the remote large-context engine
//! should look at them instead. It answers with one JSON document:
//!
//! - `{"decision":"approve"}` to let the tool run normally, or
//! - `{"decision":"block","reason":"Gemini analysis (...)"}` to replace the
//!   tool result with the engine's analysis.
//!
//! Every failure degrades to `approve`; the assistant's original action is
//! never lost.
//!
//! # Where to find things
//!
//! - **Input and output:** [`hook::input`] parses both hook schemas,
//!   [`hook::response`] renders the decision document.
//! - **The per-run flow:** [`Bridge`](hook::Bridge) in [`hook::pipeline`].
//! - **Which files a call touches:** [`hook::extract`], with `@` path
//!   notation handled by [`paths`].
//! - **Whether to delegate:** [`decision::DecisionEngine`], fed by
//!   [`estimate::SizeReport`].
//! - **Calling the engine:** [`engine::Invoker`] around an
//!   [`engine::AnalysisEngine`]; [`engine::GeminiCli`] is the real one.
//! - **Shared state between runs:** [`cache`] and [`rate_limit`], both
//!   file-backed under the state directory.
//! - **Settings:** [`config::BridgeConfig`].
//!
//! # Example
//!
//! ```ignore
//! use gemini_bridge::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::new(BridgeConfig::default());
//! let outcome = bridge
//!     .handle_raw(r#"{"tool":"Read","parameters":{"file_path":"src/main.rs"}}"#)
//!     .await;
//! println!("{}", outcome.response.to_json());
//! ```

pub mod cache;
pub mod capture;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod hook;
pub mod logging;
pub mod maintenance;
pub mod paths;
pub mod rate_limit;

pub use config::BridgeConfig;
pub use hook::{Bridge, HookOutcome, HookResponse, ToolInvocation};
