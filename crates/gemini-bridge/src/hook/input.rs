//! Parsing of the hook document the assistant writes to stdin.
//!
//! Two schema generations are in circulation and both are accepted:
//!
//! ```json
//! { "tool": "Read", "parameters": { "file_path": "src/main.rs" },
//!   "context": { "working_directory": "/work/project" } }
//!
//! { "tool_name": "Read", "tool_input": { "file_path": "src/main.rs" },
//!   "cwd": "/work/project" }
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::InputError;

/// The tool operations the bridge knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadFile,
    GlobPattern,
    GrepSearch,
    RunTask,
}

impl Operation {
    /// Map an assistant tool name to an operation. Unknown tools yield `None`.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "read" | "read_file" => Some(Self::ReadFile),
            "glob" | "glob_pattern" => Some(Self::GlobPattern),
            "grep" | "grep_search" => Some(Self::GrepSearch),
            "task" | "run_task" => Some(Self::RunTask),
            _ => None,
        }
    }

    /// Stable identifier used in cache keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::GlobPattern => "glob",
            Self::GrepSearch => "grep",
            Self::RunTask => "task",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Typed parameter structs ────────────────────────────────────────

/// Parameters of the `Read` tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReadFileArgs {
    #[serde(alias = "path")]
    pub file_path: String,
}

/// Parameters of the `Glob` tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GlobArgs {
    pub pattern: String,
    pub path: Option<String>,
}

/// Parameters of the `Grep` tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GrepArgs {
    pub pattern: String,
    pub path: Option<String>,
}

/// Parameters of the `Task` tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskArgs {
    pub prompt: String,
    pub description: Option<String>,
}

/// Operation-specific request carried by a [`ToolInvocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    ReadFile(ReadFileArgs),
    GlobPattern(GlobArgs),
    GrepSearch(GrepArgs),
    RunTask(TaskArgs),
    /// A tool the bridge does not route; always proceeds normally.
    Unknown,
}

impl ToolRequest {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::ReadFile(_) => Some(Operation::ReadFile),
            Self::GlobPattern(_) => Some(Operation::GlobPattern),
            Self::GrepSearch(_) => Some(Operation::GrepSearch),
            Self::RunTask(_) => Some(Operation::RunTask),
            Self::Unknown => None,
        }
    }
}

/// One tool-use event, parsed once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Tool name exactly as the assistant sent it.
    pub tool_name: String,
    pub request: ToolRequest,
    /// Directory the assistant was acting in, if it said.
    pub working_directory: Option<PathBuf>,
}

impl ToolInvocation {
    /// Parse raw stdin text.
    ///
    /// Returns `Ok(None)` for blank input, which is the normal "nothing to
    /// do" case rather than an error.
    pub fn parse(raw: &str) -> Result<Option<Self>, InputError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(obj) = value else {
            return Err(InputError::NotAnObject);
        };
        Self::from_object(&obj).map(Some)
    }

    fn from_object(obj: &Map<String, Value>) -> Result<Self, InputError> {
        let tool_name = first_str(obj, &["tool", "tool_name"])
            .unwrap_or_default()
            .to_string();
        let params = ["parameters", "tool_input"]
            .iter()
            .find_map(|k| obj.get(*k))
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let request = match Operation::from_tool_name(&tool_name) {
            Some(Operation::ReadFile) => ToolRequest::ReadFile(serde_json::from_value(params)?),
            Some(Operation::GlobPattern) => ToolRequest::GlobPattern(serde_json::from_value(params)?),
            Some(Operation::GrepSearch) => ToolRequest::GrepSearch(serde_json::from_value(params)?),
            Some(Operation::RunTask) => ToolRequest::RunTask(serde_json::from_value(params)?),
            None => ToolRequest::Unknown,
        };

        let working_directory = obj
            .get("context")
            .and_then(|c| c.get("working_directory"))
            .and_then(Value::as_str)
            .or_else(|| first_str(obj, &["cwd"]))
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            tool_name,
            request,
            working_directory,
        })
    }

    pub fn operation(&self) -> Option<Operation> {
        self.request.operation()
    }
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_nothing_to_do() {
        assert!(ToolInvocation::parse("").unwrap().is_none());
        assert!(ToolInvocation::parse("  \n").unwrap().is_none());
    }

    #[test]
    fn legacy_schema_parses() {
        let inv = ToolInvocation::parse(
            r#"{"tool":"Read","parameters":{"file_path":"src/main.rs"},
                "context":{"working_directory":"/work/p"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(inv.operation(), Some(Operation::ReadFile));
        assert_eq!(
            inv.request,
            ToolRequest::ReadFile(ReadFileArgs {
                file_path: "src/main.rs".into()
            })
        );
        assert_eq!(inv.working_directory, Some(PathBuf::from("/work/p")));
    }

    #[test]
    fn current_schema_parses() {
        let inv = ToolInvocation::parse(
            r#"{"tool_name":"Glob","tool_input":{"pattern":"**/*.rs","path":"src"},"cwd":"/w"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            inv.request,
            ToolRequest::GlobPattern(GlobArgs {
                pattern: "**/*.rs".into(),
                path: Some("src".into()),
            })
        );
        assert_eq!(inv.working_directory, Some(PathBuf::from("/w")));
    }

    #[test]
    fn context_directory_wins_over_cwd() {
        let inv = ToolInvocation::parse(
            r#"{"tool":"Grep","parameters":{"pattern":"x"},
                "context":{"working_directory":"/ctx"},"cwd":"/cwd"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(inv.working_directory, Some(PathBuf::from("/ctx")));
    }

    #[test]
    fn unknown_tool_is_not_an_error() {
        let inv = ToolInvocation::parse(r#"{"tool_name":"Bash","tool_input":{"command":"ls"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(inv.request, ToolRequest::Unknown);
        assert_eq!(inv.operation(), None);
    }

    #[test]
    fn task_fields_are_read() {
        let inv = ToolInvocation::parse(
            r#"{"tool_name":"Task","tool_input":{"prompt":"analyze @src","description":"audit"}}"#,
        )
        .unwrap()
        .unwrap();
        let ToolRequest::RunTask(args) = inv.request else {
            panic!("expected task");
        };
        assert_eq!(args.prompt, "analyze @src");
        assert_eq!(args.description.as_deref(), Some("audit"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            ToolInvocation::parse("{not json"),
            Err(InputError::Malformed(_))
        ));
        assert!(matches!(
            ToolInvocation::parse("[1,2]"),
            Err(InputError::NotAnObject)
        ));
    }

    #[test]
    fn tool_names_map_case_insensitively() {
        assert_eq!(Operation::from_tool_name("TASK"), Some(Operation::RunTask));
        assert_eq!(Operation::from_tool_name("read_file"), Some(Operation::ReadFile));
        assert_eq!(Operation::from_tool_name("Write"), None);
    }
}
