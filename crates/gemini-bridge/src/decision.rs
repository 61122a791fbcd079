//! Delegation decision engine.
//!
//! [`DecisionEngine::decide`] is a pure function of the operation, the file
//! set, its [`SizeReport`], and the configured thresholds. Rules, first
//! match wins:
//!
//! 1. dry-run mode delegates unconditionally
//! 2. an empty file set is never delegated
//! 3. aggregate bytes above `max_total_size` are never delegated
//! 4. tokens above `local_token_limit` delegate if within `remote_token_limit`,
//!    otherwise the content is too large for either engine
//! 5. a task touching at least `min_files_for_delegation` files (and at
//!    least `min_total_size` bytes) delegates
//! 6. everything else stays local
//!
//! Independently of which rule fired, a file matching an exclusion pattern
//! forces a no-delegate verdict.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;

use crate::config::BridgeConfig;
use crate::estimate::SizeReport;
use crate::hook::input::Operation;

/// Why a verdict came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictReason {
    DryRun,
    NoFiles,
    PayloadTooLarge { total_bytes: u64, max_bytes: u64 },
    ExceedsLocalLimit { tokens: u64, local_limit: u64 },
    /// Over the remote engine's capacity as well; would need splitting.
    TooLargeForEitherEngine { tokens: u64, remote_limit: u64 },
    MultiFileTask { files: usize, total_bytes: u64 },
    BelowThresholds { tokens: u64, files: usize },
    ExcludedFile { path: PathBuf, pattern: String },
}

impl fmt::Display for VerdictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry-run mode delegates every request"),
            Self::NoFiles => write!(f, "no files to analyze"),
            Self::PayloadTooLarge {
                total_bytes,
                max_bytes,
            } => write!(
                f,
                "content too large to delegate ({total_bytes} bytes > {max_bytes} byte limit)"
            ),
            Self::ExceedsLocalLimit {
                tokens,
                local_limit,
            } => write!(
                f,
                "~{tokens} tokens exceeds the local limit of {local_limit}"
            ),
            Self::TooLargeForEitherEngine {
                tokens,
                remote_limit,
            } => write!(
                f,
                "content too large for either engine (~{tokens} tokens > remote limit of {remote_limit}); split the request"
            ),
            Self::MultiFileTask { files, total_bytes } => write!(
                f,
                "multi-file task ({files} files, {total_bytes} bytes) benefits from large-context analysis"
            ),
            Self::BelowThresholds { tokens, files } => write!(
                f,
                "below delegation thresholds (~{tokens} tokens, {files} files)"
            ),
            Self::ExcludedFile { path, pattern } => write!(
                f,
                "{} matches exclusion pattern '{pattern}'",
                path.display()
            ),
        }
    }
}

/// Outcome of one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub should_delegate: bool,
    pub reason: VerdictReason,
}

impl Verdict {
    fn delegate(reason: VerdictReason) -> Self {
        Self {
            should_delegate: true,
            reason,
        }
    }

    fn local(reason: VerdictReason) -> Self {
        Self {
            should_delegate: false,
            reason,
        }
    }
}

/// Thresholds the engine compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    pub dry_run: bool,
    pub min_files_for_delegation: usize,
    pub min_total_size: u64,
    pub max_total_size: u64,
    pub local_token_limit: u64,
    pub remote_token_limit: u64,
}

impl From<&BridgeConfig> for Thresholds {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            min_files_for_delegation: config.min_files_for_delegation,
            min_total_size: config.min_total_size,
            max_total_size: config.max_total_size,
            local_token_limit: config.local_token_limit,
            remote_token_limit: config.remote_token_limit,
        }
    }
}

/// Compiled filename exclusion patterns.
///
/// Patterns without a `/` are matched against the file name; patterns with
/// one are matched against the full path.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    patterns: Vec<String>,
    by_name: GlobSet,
    by_name_idx: Vec<usize>,
    by_path: GlobSet,
    by_path_idx: Vec<usize>,
}

impl ExclusionSet {
    /// Compile `patterns`. Invalid patterns are logged and skipped.
    pub fn new(patterns: &[String]) -> Self {
        let mut by_name = GlobSetBuilder::new();
        let mut by_path = GlobSetBuilder::new();
        let mut by_name_idx = Vec::new();
        let mut by_path_idx = Vec::new();
        for (i, pattern) in patterns.iter().enumerate() {
            // Resolved paths are absolute, so a relative path pattern may
            // match at any depth.
            let source = if pattern.contains('/') && !pattern.starts_with(['/', '*']) {
                format!("**/{pattern}")
            } else {
                pattern.clone()
            };
            let glob = match Glob::new(&source) {
                Ok(g) => g,
                Err(e) => {
                    warn!("Skipping invalid exclusion pattern '{pattern}': {e}");
                    continue;
                }
            };
            if pattern.contains('/') {
                by_path.add(glob);
                by_path_idx.push(i);
            } else {
                by_name.add(glob);
                by_name_idx.push(i);
            }
        }
        Self {
            patterns: patterns.to_vec(),
            by_name: by_name.build().unwrap_or_else(|_| GlobSet::empty()),
            by_name_idx,
            by_path: by_path.build().unwrap_or_else(|_| GlobSet::empty()),
            by_path_idx,
        }
    }

    /// The first pattern `path` matches, if any.
    pub fn matching_pattern(&self, path: &Path) -> Option<&str> {
        if let Some(name) = path.file_name()
            && let Some(&i) = self.by_name.matches(name).first()
        {
            return Some(&self.patterns[self.by_name_idx[i]]);
        }
        self.by_path
            .matches(path)
            .first()
            .map(|&i| self.patterns[self.by_path_idx[i]].as_str())
    }
}

/// The delegation decision engine, built once per execution.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    thresholds: Thresholds,
    exclusions: ExclusionSet,
}

impl DecisionEngine {
    pub fn new(thresholds: Thresholds, exclusions: ExclusionSet) -> Self {
        Self {
            thresholds,
            exclusions,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            Thresholds::from(config),
            ExclusionSet::new(&config.exclude_patterns),
        )
    }

    /// Decide whether `files` should go to the remote engine.
    pub fn decide(&self, operation: Operation, files: &[PathBuf], report: &SizeReport) -> Verdict {
        let verdict = self.apply_rules(operation, files, report);
        match self.excluded(files) {
            Some((path, pattern)) => Verdict::local(VerdictReason::ExcludedFile { path, pattern }),
            None => verdict,
        }
    }

    fn apply_rules(&self, operation: Operation, files: &[PathBuf], report: &SizeReport) -> Verdict {
        let t = &self.thresholds;
        if t.dry_run {
            return Verdict::delegate(VerdictReason::DryRun);
        }
        if files.is_empty() {
            return Verdict::local(VerdictReason::NoFiles);
        }
        if report.total_bytes > t.max_total_size {
            return Verdict::local(VerdictReason::PayloadTooLarge {
                total_bytes: report.total_bytes,
                max_bytes: t.max_total_size,
            });
        }
        let tokens = report.estimated_tokens;
        if tokens > t.local_token_limit {
            return if tokens <= t.remote_token_limit {
                Verdict::delegate(VerdictReason::ExceedsLocalLimit {
                    tokens,
                    local_limit: t.local_token_limit,
                })
            } else {
                Verdict::local(VerdictReason::TooLargeForEitherEngine {
                    tokens,
                    remote_limit: t.remote_token_limit,
                })
            };
        }
        if operation == Operation::RunTask
            && files.len() >= t.min_files_for_delegation
            && report.total_bytes >= t.min_total_size
        {
            return Verdict::delegate(VerdictReason::MultiFileTask {
                files: files.len(),
                total_bytes: report.total_bytes,
            });
        }
        Verdict::local(VerdictReason::BelowThresholds {
            tokens,
            files: files.len(),
        })
    }

    fn excluded(&self, files: &[PathBuf]) -> Option<(PathBuf, String)> {
        files.iter().find_map(|path| {
            self.exclusions
                .matching_pattern(path)
                .map(|pattern| (path.clone(), pattern.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_EXCLUDE_PATTERNS;

    fn thresholds() -> Thresholds {
        Thresholds::from(&BridgeConfig::default())
    }

    fn engine_with(thresholds: Thresholds) -> DecisionEngine {
        let patterns: Vec<String> = DEFAULT_EXCLUDE_PATTERNS.iter().map(|s| s.to_string()).collect();
        DecisionEngine::new(thresholds, ExclusionSet::new(&patterns))
    }

    fn engine() -> DecisionEngine {
        engine_with(thresholds())
    }

    fn files(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("/p/src/f{i}.rs"))).collect()
    }

    fn report(n: usize, bytes: u64) -> SizeReport {
        SizeReport::from_parts(n, n, bytes)
    }

    #[test]
    fn small_single_read_stays_local() {
        let v = engine().decide(Operation::ReadFile, &files(1), &report(1, 2048));
        assert!(!v.should_delegate);
        assert!(matches!(v.reason, VerdictReason::BelowThresholds { .. }));
    }

    #[test]
    fn multi_file_task_delegates() {
        let v = engine().decide(Operation::RunTask, &files(5), &report(5, 30 * 1024));
        assert!(v.should_delegate);
        assert_eq!(
            v.reason,
            VerdictReason::MultiFileTask {
                files: 5,
                total_bytes: 30 * 1024
            }
        );
    }

    #[test]
    fn multi_file_glob_below_tokens_stays_local() {
        let v = engine().decide(Operation::GlobPattern, &files(5), &report(5, 30 * 1024));
        assert!(!v.should_delegate);
    }

    #[test]
    fn tiny_multi_file_task_stays_local() {
        let v = engine().decide(Operation::RunTask, &files(4), &report(4, 100));
        assert!(!v.should_delegate);
    }

    #[test]
    fn over_local_token_limit_delegates() {
        let v = engine().decide(Operation::GlobPattern, &files(10), &report(10, 2 * 1024 * 1024));
        assert!(v.should_delegate);
        assert!(matches!(v.reason, VerdictReason::ExceedsLocalLimit { .. }));
    }

    #[test]
    fn over_remote_limit_is_distinct_oversize() {
        let t = Thresholds {
            max_total_size: u64::MAX,
            ..thresholds()
        };
        let v = engine_with(t).decide(Operation::GlobPattern, &files(10), &report(10, 4_000_000));
        assert!(!v.should_delegate);
        assert!(matches!(v.reason, VerdictReason::TooLargeForEitherEngine { .. }));
        assert!(v.reason.to_string().contains("too large for either engine"));
    }

    #[test]
    fn max_payload_beats_token_rule() {
        let v = engine().decide(
            Operation::GlobPattern,
            &files(10),
            &report(10, 11 * 1024 * 1024),
        );
        assert!(!v.should_delegate);
        assert!(matches!(v.reason, VerdictReason::PayloadTooLarge { .. }));
    }

    #[test]
    fn verdict_is_monotone_past_max_payload() {
        let engine = engine();
        let max = thresholds().max_total_size;
        let mut seen_local_past_max = false;
        for bytes in (0..=max * 2).step_by((max / 64) as usize) {
            let v = engine.decide(Operation::GlobPattern, &files(3), &report(3, bytes));
            if bytes > max {
                assert!(!v.should_delegate, "delegated at {bytes} bytes");
                seen_local_past_max = true;
            }
        }
        assert!(seen_local_past_max);
    }

    #[test]
    fn exclusion_overrides_every_rule() {
        let mut set = files(5);
        set.push(PathBuf::from("/p/config/server.pem"));
        for (op, bytes) in [
            (Operation::RunTask, 30 * 1024),
            (Operation::GlobPattern, 2 * 1024 * 1024),
        ] {
            let v = engine().decide(op, &set, &report(set.len(), bytes));
            assert!(!v.should_delegate);
            assert!(matches!(v.reason, VerdictReason::ExcludedFile { ref pattern, .. } if pattern == "*.pem"));
        }
    }

    #[test]
    fn exclusion_applies_in_dry_run() {
        let t = Thresholds {
            dry_run: true,
            ..thresholds()
        };
        let v = engine_with(t.clone()).decide(Operation::ReadFile, &[PathBuf::from("/p/.env")], &report(1, 10));
        assert!(!v.should_delegate);
        let v = engine_with(t).decide(Operation::ReadFile, &files(1), &report(1, 10));
        assert_eq!(v, Verdict::delegate(VerdictReason::DryRun));
    }

    #[test]
    fn exclusion_matches_names_not_directories() {
        let set = ExclusionSet::new(&["*credentials*".to_string(), "secrets/**".to_string()]);
        assert!(set.matching_pattern(Path::new("/p/aws_credentials.json")).is_some());
        assert!(set.matching_pattern(Path::new("/credentials_app/src/main.rs")).is_none());
        assert_eq!(
            set.matching_pattern(Path::new("secrets/db.yaml")),
            Some("secrets/**")
        );
    }

    #[test]
    fn relative_path_pattern_matches_resolved_absolute_path() {
        let set = ExclusionSet::new(&[
            "secrets/**".to_string(),
            "config/prod/*.yaml".to_string(),
            "/srv/private/**".to_string(),
        ]);
        assert_eq!(
            set.matching_pattern(Path::new("/home/me/project/secrets/db.yaml")),
            Some("secrets/**")
        );
        assert_eq!(
            set.matching_pattern(Path::new("/home/me/project/config/prod/app.yaml")),
            Some("config/prod/*.yaml")
        );
        assert_eq!(
            set.matching_pattern(Path::new("/srv/private/notes.md")),
            Some("/srv/private/**")
        );
        assert!(set.matching_pattern(Path::new("/home/me/project/src/secrets.rs")).is_none());
        assert!(set.matching_pattern(Path::new("/home/me/project/mysecrets/a.txt")).is_none());
    }

    #[test]
    fn empty_file_set_stays_local() {
        let v = engine().decide(Operation::RunTask, &[], &SizeReport::default());
        assert_eq!(v, Verdict::local(VerdictReason::NoFiles));
    }
}
