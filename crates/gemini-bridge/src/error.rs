//! Error types for every stage of a hook execution.
//!
//! None of these reach the calling assistant as a failure: the pipeline
//! converts each one into a decision document (see [`crate::hook::response`]).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why the path normalizer refused an input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("path traversal not allowed")]
    Traversal,
    #[error("base directory '{0}' is inside a protected system location")]
    SensitiveBase(String),
}

/// Problems with the hook document read from stdin.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("hook input must be a JSON object")]
    NotAnObject,
}

/// Failures of the external analysis engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("analysis engine unavailable: {0}")]
    Unavailable(String),
    #[error("analysis engine timed out after {:.0}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("analysis engine exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("analysis engine returned empty output")]
    EmptyOutput,
    #[error("analysis engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a delegated analysis call as a whole.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("no valid content to analyze (files missing, unreadable, or oversized)")]
    NoValidContent,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Problems loading a configuration layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_shows_seconds() {
        let err = EngineError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "analysis engine timed out after 30s");
    }

    #[test]
    fn invoke_error_is_transparent_over_engine_error() {
        let err = InvokeError::from(EngineError::EmptyOutput);
        assert_eq!(err.to_string(), "analysis engine returned empty output");
    }
}
