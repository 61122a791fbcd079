//! `@`-marker path normalization.
//!
//! The assistant refers to project files as `@src/main.rs`, meaning
//! "relative to the project root". [`normalize`] rewrites every marker in a
//! piece of text against a base directory:
//!
//! | Input | Output (base `/a/b`) |
//! |-------|----------------------|
//! | `@src/main.py` | `/a/b/src/main.py` |
//! | `@/` | `/a/b/` |
//! | `@./` | *(empty)* |
//!
//! The function is pure (no filesystem access) and fails closed: traversal
//! sequences anywhere in the input or base, or a base inside a protected
//! system location, produce a [`PathRejection`] and no output at all.

use std::path::{Path, PathBuf};

use crate::error::PathRejection;

/// The project-root marker.
pub const MARKER: char = '@';

/// Rewrite all `@` markers in `input` against `base_dir`.
///
/// A `@` is a marker only at the start of the text or after whitespace, a
/// quote, or an opening bracket, so `user@host` passes through untouched.
/// Runs of `/` produced by substitution are collapsed to one.
pub fn normalize(
    input: &str,
    base_dir: &str,
    sensitive: &[PathBuf],
) -> Result<String, PathRejection> {
    if contains_traversal(input) || contains_traversal(base_dir) {
        return Err(PathRejection::Traversal);
    }
    if is_sensitive(Path::new(base_dir), sensitive) {
        return Err(PathRejection::SensitiveBase(base_dir.to_string()));
    }
    if !input.contains(MARKER) {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len() + base_dir.len());
    let mut prev: Option<char> = None;
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        if c != MARKER || !starts_token(prev) {
            out.push(c);
            prev = Some(c);
            continue;
        }
        let rest = input.get(idx + c.len_utf8()..).unwrap_or("");
        if rest.starts_with("./") {
            // `@./` names the current directory and is elided.
            chars.next();
            chars.next();
        } else if rest.starts_with('/') {
            out.push_str(base_dir);
            out.push('/');
            chars.next();
        } else if rest.starts_with(|ch: char| ch.is_whitespace()) || rest.is_empty() {
            out.push(c);
        } else {
            out.push_str(base_dir);
            out.push('/');
        }
        prev = Some(c);
    }
    Ok(collapse_separators(&out))
}

/// Whether `text` contains a parent-directory traversal in any spelling.
pub fn contains_traversal(text: &str) -> bool {
    if text.contains("../") || text.contains("..\\") {
        return true;
    }
    text.split(|c: char| c.is_whitespace() || c == '/' || c == '\\' || c == '@')
        .any(|segment| segment == "..")
}

/// Whether `path` equals or lies under any of the `sensitive` prefixes.
///
/// Comparison is component-wise, so `/etcetera` is not under `/etc`.
pub fn is_sensitive(path: &Path, sensitive: &[PathBuf]) -> bool {
    sensitive
        .iter()
        .filter(|prefix| !prefix.as_os_str().is_empty())
        .any(|prefix| path.starts_with(prefix))
}

/// Resolve `raw` against `base`: absolute paths are kept, relative ones joined.
pub fn resolve_against(raw: &str, base: &Path) -> PathBuf {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

fn starts_token(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(p) => p.is_whitespace() || matches!(p, '"' | '\'' | '`' | '(' | '[' | '{' | ','),
    }
}

fn collapse_separators(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_slash = false;
    let mut prev_colon = false;
    for c in text.chars() {
        // Keep the `//` of URL schemes (`https://`).
        if c == '/' && last_slash && !prev_colon {
            continue;
        }
        if c == '/' {
            prev_colon = prev_colon && !last_slash;
            last_slash = true;
        } else {
            prev_colon = c == ':';
            last_slash = false;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensitive() -> Vec<PathBuf> {
        ["/etc", "/usr", "/bin", "/root", "/home/dev/.ssh"]
            .iter()
            .map(PathBuf::from)
            .collect()
    }

    fn norm(input: &str, base: &str) -> Result<String, PathRejection> {
        normalize(input, base, &sensitive())
    }

    #[test]
    fn dot_slash_marker_is_elided() {
        assert_eq!(norm("@./", "/a/b").unwrap(), "");
        assert_eq!(norm("@./src/lib.rs", "/a/b").unwrap(), "src/lib.rs");
    }

    #[test]
    fn bare_name_marker_joins_base() {
        assert_eq!(norm("@src/main.py", "/a/b").unwrap(), "/a/b/src/main.py");
    }

    #[test]
    fn slash_marker_maps_to_base() {
        assert_eq!(norm("@/", "/a/b").unwrap(), "/a/b/");
        assert_eq!(norm("@/docs/x.md", "/a/b").unwrap(), "/a/b/docs/x.md");
    }

    #[test]
    fn multiple_markers_are_all_substituted() {
        let out = norm("compare @src/a.rs with @src/b.rs please", "/p").unwrap();
        assert_eq!(out, "compare /p/src/a.rs with /p/src/b.rs please");
    }

    #[test]
    fn double_separators_collapse() {
        assert_eq!(norm("@src/x.rs", "/a/b/").unwrap(), "/a/b/src/x.rs");
        assert_eq!(norm("@/", "/a/b/").unwrap(), "/a/b/");
    }

    #[test]
    fn urls_keep_scheme_slashes() {
        let out = norm("see https://example.com/x and @README.md", "/p").unwrap();
        assert_eq!(out, "see https://example.com/x and /p/README.md");
    }

    #[test]
    fn embedded_at_is_not_a_marker() {
        assert_eq!(norm("mail user@host.org", "/p").unwrap(), "mail user@host.org");
    }

    #[test]
    fn traversal_fails_closed_for_any_base() {
        for base in ["/a/b", "/tmp", "/home/dev/project"] {
            assert_eq!(norm("@../secret", base), Err(PathRejection::Traversal));
            assert_eq!(norm("read ../../etc/passwd", base), Err(PathRejection::Traversal));
            assert_eq!(norm("..\\windows", base), Err(PathRejection::Traversal));
            assert_eq!(norm("@src/..", base), Err(PathRejection::Traversal));
        }
        assert_eq!(norm("@x", "/a/../etc"), Err(PathRejection::Traversal));
    }

    #[test]
    fn dotted_names_are_not_traversal() {
        assert_eq!(norm("@src/v1..2.txt", "/a").unwrap(), "/a/src/v1..2.txt");
        assert!(!contains_traversal("notes...md"));
    }

    #[test]
    fn sensitive_base_is_rejected() {
        for base in ["/etc", "/etc/nginx", "/usr/lib", "/root", "/home/dev/.ssh/keys"] {
            assert!(
                matches!(norm("@x.txt", base), Err(PathRejection::SensitiveBase(_))),
                "expected rejection for {base}"
            );
        }
        assert!(norm("@x.txt", "/etcetera").is_ok());
        assert!(norm("@x.txt", "/home/dev/project").is_ok());
    }

    #[test]
    fn marker_free_text_is_unchanged() {
        let text = "/a/b/src/main.py and plain words";
        assert_eq!(norm(text, "/a/b").unwrap(), text);
        let once = norm("@src/main.py", "/a/b").unwrap();
        assert_eq!(norm(&once, "/a/b").unwrap(), once);
    }

    #[test]
    fn lone_marker_passes_through() {
        assert_eq!(norm("email me @ noon", "/a").unwrap(), "email me @ noon");
    }

    #[test]
    fn resolve_against_joins_relative_paths() {
        assert_eq!(
            resolve_against("src/x.rs", Path::new("/p")),
            PathBuf::from("/p/src/x.rs")
        );
        assert_eq!(resolve_against("/abs/y.rs", Path::new("/p")), PathBuf::from("/abs/y.rs"));
    }
}
