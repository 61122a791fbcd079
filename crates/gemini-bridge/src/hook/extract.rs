//! Turns a [`ToolInvocation`] into the file set the decision engine weighs.
//!
//! Glob patterns are expanded by walking the directory tree and matching
//! relative paths with `globset`; nothing is ever handed to a shell.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use globset::GlobBuilder;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::input::{GlobArgs, GrepArgs, Operation, ReadFileArgs, TaskArgs, ToolInvocation, ToolRequest};
use crate::config::BridgeConfig;
use crate::paths::{contains_traversal, is_sensitive, normalize, resolve_against};

/// Directory names never descended into while expanding globs.
const SKIPPED_DIRS: &[&str] = &[".git"];

/// Bare tokens that look like a file name with an extension.
static FILE_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-./~]+\.[A-Za-z][A-Za-z0-9]{0,7}$")
        .expect("file-like token pattern is valid")
});

/// Everything downstream stages need from one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub operation: Operation,
    /// Absolute paths, capped at `max_files`.
    pub files: Vec<PathBuf>,
    pub working_dir: PathBuf,
    /// Text describing the request; the task prompt for `Task`.
    pub prompt: String,
}

/// Extract the file set for `invocation`.
///
/// Returns `None` for tools the bridge does not route. Security rejections
/// never surface as errors: they simply leave the file set empty.
pub fn extract(invocation: &ToolInvocation, config: &BridgeConfig) -> Option<Extracted> {
    let operation = invocation.operation()?;
    let working_dir = invocation
        .working_directory
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let ctx = Context {
        working_dir: &working_dir,
        config,
    };
    let (files, prompt) = match &invocation.request {
        ToolRequest::ReadFile(args) => ctx.read_file(args),
        ToolRequest::GlobPattern(args) => ctx.glob(args),
        ToolRequest::GrepSearch(args) => ctx.grep(args),
        ToolRequest::RunTask(args) => ctx.task(args),
        ToolRequest::Unknown => return None,
    };

    let mut files: Vec<PathBuf> = files
        .into_iter()
        .filter(|p| {
            let blocked = is_sensitive(p, &config.sensitive_paths);
            if blocked {
                debug!("Dropping protected path {}", p.display());
            }
            !blocked
        })
        .collect();
    files.truncate(config.max_files);

    Some(Extracted {
        operation,
        files,
        working_dir,
        prompt,
    })
}

struct Context<'a> {
    working_dir: &'a Path,
    config: &'a BridgeConfig,
}

impl Context<'_> {
    fn base(&self) -> String {
        self.working_dir.to_string_lossy().to_string()
    }

    /// Normalize `raw`, logging and swallowing rejections.
    fn normalized(&self, raw: &str) -> Option<String> {
        match normalize(raw, &self.base(), &self.config.sensitive_paths) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Rejected '{raw}': {e}");
                None
            }
        }
    }

    /// Normalize and resolve a single path argument.
    fn resolve_path(&self, raw: &str) -> Option<PathBuf> {
        let text = self.normalized(raw)?;
        let text = text.trim();
        if text.is_empty() {
            return Some(self.working_dir.to_path_buf());
        }
        Some(resolve_against(text, self.working_dir))
    }

    fn read_file(&self, args: &ReadFileArgs) -> (Vec<PathBuf>, String) {
        let prompt = format!("Read {}", args.file_path);
        if args.file_path.trim().is_empty() {
            return (Vec::new(), prompt);
        }
        let files = self.resolve_path(&args.file_path).into_iter().collect();
        (files, prompt)
    }

    fn glob(&self, args: &GlobArgs) -> (Vec<PathBuf>, String) {
        let root = match args.path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(p) => self.resolve_path(p),
            None => Some(self.working_dir.to_path_buf()),
        };
        let prompt = format!("Glob {} in {}", args.pattern, args.path.as_deref().unwrap_or("."));
        let Some(root) = root else {
            return (Vec::new(), prompt);
        };
        let Some(pattern) = self.normalized(&args.pattern) else {
            return (Vec::new(), prompt);
        };
        if is_sensitive(&root, &self.config.sensitive_paths) {
            warn!("Refusing to expand glob under protected path {}", root.display());
            return (Vec::new(), prompt);
        }
        (expand_glob(&root, &pattern, self.config.max_files), prompt)
    }

    fn grep(&self, args: &GrepArgs) -> (Vec<PathBuf>, String) {
        let path = args.path.as_deref().filter(|p| !p.trim().is_empty());
        let prompt = format!("Search for '{}' in {}", args.pattern, path.unwrap_or("."));
        let target = match path {
            Some(p) => self.resolve_path(p),
            None => Some(self.working_dir.to_path_buf()),
        };
        (target.into_iter().collect(), prompt)
    }

    fn task(&self, args: &TaskArgs) -> (Vec<PathBuf>, String) {
        let mut text = args.prompt.clone();
        if let Some(desc) = args.description.as_deref().filter(|d| !d.trim().is_empty()) {
            text = format!("{desc}\n{text}");
        }
        match self.normalized(&text) {
            Some(normalized) => {
                let files = extract_task_paths(&normalized, self.working_dir, self.config.max_files);
                (files, normalized)
            }
            None => (Vec::new(), text),
        }
    }
}

/// Expand `pattern` under `root` by walking the tree.
///
/// Absolute patterns are split at their first wildcard component, and the
/// literal prefix becomes the walk root. The walk is depth-limited unless
/// the pattern contains `**`. Results are in file-name order.
pub fn expand_glob(root: &Path, pattern: &str, max_files: usize) -> Vec<PathBuf> {
    let pattern = pattern.trim();
    if pattern.is_empty() || contains_traversal(pattern) || max_files == 0 {
        return Vec::new();
    }
    let (root, relative) = split_glob_base(root, pattern);
    let relative = relative.trim_start_matches("./").to_string();
    if relative.is_empty() {
        return Vec::new();
    }

    let matcher = match GlobBuilder::new(&relative).literal_separator(true).build() {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => {
            warn!("Invalid glob pattern '{relative}': {e}");
            return Vec::new();
        }
    };

    let mut walker = WalkDir::new(&root).follow_links(false).sort_by_file_name();
    if !relative.contains("**") {
        walker = walker.max_depth(relative.split('/').filter(|s| !s.is_empty()).count());
    }

    let mut files = Vec::new();
    let entries = walker.into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        e.depth() == 0 || !(e.file_type().is_dir() && SKIPPED_DIRS.iter().any(|d| name == *d))
    });
    for entry in entries.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&root) else {
            continue;
        };
        if matcher.is_match(rel) {
            files.push(entry.path().to_path_buf());
            if files.len() >= max_files {
                break;
            }
        }
    }
    debug!("Glob '{pattern}' under {} matched {} files", root.display(), files.len());
    files
}

/// Split an absolute pattern into (literal directory, remaining pattern).
fn split_glob_base(root: &Path, pattern: &str) -> (PathBuf, String) {
    let path = Path::new(pattern);
    if !path.is_absolute() {
        return (root.to_path_buf(), pattern.to_string());
    }
    let mut base = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();
    for component in path.components() {
        let text = component.as_os_str().to_string_lossy().to_string();
        let wild = text.contains(['*', '?', '[', '{']);
        if rest.is_empty() && !wild {
            base.push(component);
        } else if !matches!(component, Component::RootDir) {
            rest.push(text);
        }
    }
    if rest.is_empty() {
        // No wildcard at all: the pattern names one path.
        let name = base
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent = base.parent().map(Path::to_path_buf).unwrap_or(base.clone());
        return (parent, name);
    }
    (base, rest.join("/"))
}

/// Pull path-like tokens out of a (normalized) task prompt.
///
/// A token qualifies if it is absolute or looks like a file name with an
/// extension. Relative tokens are resolved against `working_dir`.
pub fn extract_task_paths(text: &str, working_dir: &Path, max_files: usize) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for raw in text.split_whitespace() {
        if files.len() >= max_files {
            break;
        }
        let token = raw
            .trim_matches(is_wrapping)
            .trim_end_matches('.')
            .trim_matches(is_wrapping);
        if token.is_empty() || token.contains("://") || contains_traversal(token) {
            continue;
        }
        let path_like = (token.starts_with('/') && token.len() > 1) || FILE_LIKE.is_match(token);
        if !path_like {
            continue;
        }
        let resolved = resolve_against(token, working_dir);
        if !files.contains(&resolved) {
            files.push(resolved);
        }
    }
    files
}

/// Punctuation that wraps paths in prose.
fn is_wrapping(c: char) -> bool {
    matches!(
        c,
        '"' | '\'' | '`' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | ',' | ';' | ':' | '!' | '?'
    )
}
