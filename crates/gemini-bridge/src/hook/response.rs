//! The decision document written to stdout.
//!
//! Canonical shape:
//!
//! ```json
//! {"decision":"approve"}
//! {"decision":"approve","reason":"Gemini delegation failed: ...; continuing normally"}
//! {"decision":"block","reason":"Gemini analysis (task, 5 files, 3.2s):\n\n..."}
//! ```
//!
//! `block` means "do not run the tool, use this reason instead": it is only
//! ever produced for a successful delegated analysis.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hook::input::Operation;

/// What the assistant should do with its tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Run the tool normally.
    Approve,
    /// Skip the tool; the reason replaces its result.
    Block,
}

/// Serialized hook response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl HookResponse {
    /// Proceed with no commentary.
    pub fn proceed() -> Self {
        Self {
            decision: Decision::Approve,
            reason: None,
        }
    }

    /// Proceed, telling the assistant why nothing was delegated.
    pub fn proceed_with(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Approve,
            reason: Some(reason.into()),
        }
    }

    /// Replace the tool call with a delegated analysis.
    pub fn analysis(
        operation: Operation,
        file_count: usize,
        elapsed: Duration,
        cached: bool,
        text: &str,
    ) -> Self {
        let cached = if cached { ", cached" } else { "" };
        Self {
            decision: Decision::Block,
            reason: Some(format!(
                "Gemini analysis ({operation}, {file_count} files, {:.1}s{cached}):\n\n{text}",
                elapsed.as_secs_f64()
            )),
        }
    }

    /// A delegation was attempted and failed; fall back to the tool.
    pub fn delegation_failed(error: impl std::fmt::Display) -> Self {
        Self::proceed_with(format!(
            "Gemini delegation failed: {error}; continuing normally"
        ))
    }

    /// The hook input could not be understood.
    pub fn invalid_input(error: impl std::fmt::Display) -> Self {
        Self::proceed_with(format!("invalid hook input: {error}"))
    }

    pub fn is_block(&self) -> bool {
        self.decision == Decision::Block
    }

    /// Single-line JSON, falling back to a bare approve.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"decision":"approve"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_proceed_has_no_reason_field() {
        assert_eq!(HookResponse::proceed().to_json(), r#"{"decision":"approve"}"#);
    }

    #[test]
    fn failure_still_approves() {
        let r = HookResponse::delegation_failed("analysis engine returned empty output");
        assert_eq!(r.decision, Decision::Approve);
        assert_eq!(
            r.reason.as_deref(),
            Some("Gemini delegation failed: analysis engine returned empty output; continuing normally")
        );
    }

    #[test]
    fn analysis_blocks_with_header() {
        let r = HookResponse::analysis(
            Operation::RunTask,
            5,
            Duration::from_millis(3210),
            true,
            "All good.",
        );
        assert!(r.is_block());
        assert_eq!(
            r.reason.as_deref(),
            Some("Gemini analysis (task, 5 files, 3.2s, cached):\n\nAll good.")
        );
    }

    #[test]
    fn json_round_trips_through_the_wire_shape() {
        let json = HookResponse::invalid_input("malformed JSON").to_json();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["decision"], "approve");
        assert_eq!(v["reason"], "invalid hook input: malformed JSON");
    }
}
