//! The PreToolUse hook surface: input parsing, file extraction, the
//! per-run pipeline, and the response document.

pub mod extract;
pub mod input;
pub mod pipeline;
pub mod response;

pub use input::{Operation, ToolInvocation};
pub use pipeline::{Bridge, HookOutcome};
pub use response::{Decision, HookResponse};
