//! Instruction text sent to the analysis engine.
//!
//! The instruction is chosen by operation and, for tasks, by the intent the
//! prompt expresses. File contents are sent separately, each framed by
//! [`frame_file`].

use std::path::Path;

use crate::hook::input::Operation;

/// Which instruction variant to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// A single file read.
    ReadFile,
    /// Several files from a glob or grep.
    MultiFile,
    /// A task asking where something is.
    TaskSearch,
    /// A task asking for review or explanation.
    TaskAnalyze,
    /// Any other task.
    Task,
}

const SEARCH_KEYWORDS: &[&str] = &["search", "find", "locate", "where", "grep", "look for"];
const ANALYZE_KEYWORDS: &[&str] = &[
    "analy",
    "review",
    "explain",
    "understand",
    "summar",
    "architecture",
    "audit",
];

impl PromptKind {
    /// Pick the variant for `operation`. Search intent wins over analyze
    /// intent when a task prompt mentions both.
    pub fn classify(operation: Operation, prompt: &str) -> Self {
        match operation {
            Operation::ReadFile => Self::ReadFile,
            Operation::GlobPattern | Operation::GrepSearch => Self::MultiFile,
            Operation::RunTask => {
                let lower = prompt.to_lowercase();
                if SEARCH_KEYWORDS.iter().any(|k| lower.contains(k)) {
                    Self::TaskSearch
                } else if ANALYZE_KEYWORDS.iter().any(|k| lower.contains(k)) {
                    Self::TaskAnalyze
                } else {
                    Self::Task
                }
            }
        }
    }
}

/// Build the instruction for one engine call.
pub fn build_instruction(operation: Operation, prompt: &str, file_count: usize) -> String {
    let kind = PromptKind::classify(operation, prompt);
    let mut text = match kind {
        PromptKind::ReadFile => "You are assisting another coding assistant that asked to read the \
             file below. Summarize its purpose, structure, key types and functions, and anything \
             surprising. Be concise; cite line-level details only where they matter."
            .to_string(),
        PromptKind::MultiFile => format!(
            "You are assisting another coding assistant that matched {file_count} files. Give an \
             overview of what these files contain, how they relate, and where the most relevant \
             code lives. Reference files by path."
        ),
        PromptKind::TaskSearch => format!(
            "You are assisting another coding assistant with a search across {file_count} files. \
             Locate everything relevant to the request and answer with file paths and the \
             matching symbols or passages. Say plainly if nothing matches."
        ),
        PromptKind::TaskAnalyze => format!(
            "You are assisting another coding assistant with an analysis of {file_count} files. \
             Explain the architecture, responsibilities, and data flow, then list concrete \
             issues or risks you notice with file references."
        ),
        PromptKind::Task => format!(
            "You are assisting another coding assistant with a task that involves {file_count} \
             files. Provide the information from these files that the task needs, referencing \
             files by path."
        ),
    };
    let request = prompt.trim();
    if !request.is_empty() {
        text.push_str("\n\nRequest: ");
        text.push_str(request);
    }
    text
}

/// Frame one file's content for the engine's stdin.
pub fn frame_file(path: &Path, content: &str) -> String {
    format!("=== File: {} ===\n{content}\n", path.display())
}
