//! Aggregate size and token estimation for a resolved file set.
//!
//! There is no tokenizer here: tokens are approximated as bytes divided by
//! [`BYTES_PER_TOKEN`]. Missing paths and directories contribute zero.

use std::path::{Path, PathBuf};

/// Fixed bytes-per-token divisor used for every estimate.
pub const BYTES_PER_TOKEN: u64 = 4;

/// Size metrics for one file set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeReport {
    /// Number of paths in the set (existing or not).
    pub file_count: usize,
    /// Number of paths that are existing regular files.
    pub existing_files: usize,
    /// Sum of the byte sizes of the existing regular files.
    pub total_bytes: u64,
    /// `total_bytes / BYTES_PER_TOKEN`.
    pub estimated_tokens: u64,
}

impl SizeReport {
    /// Measure `files` on disk.
    pub fn measure(files: &[PathBuf]) -> Self {
        let mut existing_files = 0;
        let mut total_bytes = 0u64;
        for path in files {
            if let Some(size) = file_size(path) {
                existing_files += 1;
                total_bytes = total_bytes.saturating_add(size);
            }
        }
        Self::from_parts(files.len(), existing_files, total_bytes)
    }

    /// Build a report from already-known numbers.
    pub fn from_parts(file_count: usize, existing_files: usize, total_bytes: u64) -> Self {
        Self {
            file_count,
            existing_files,
            total_bytes,
            estimated_tokens: estimate_tokens(total_bytes),
        }
    }

    /// One-line summary for the log.
    pub fn to_log_string(&self) -> String {
        format!(
            "{} files ({} on disk), {} bytes, ~{} tokens",
            self.file_count, self.existing_files, self.total_bytes, self.estimated_tokens
        )
    }
}

/// Approximate token count for `bytes` of text.
pub fn estimate_tokens(bytes: u64) -> u64 {
    bytes / BYTES_PER_TOKEN
}

/// Size of `path` if it is an existing regular file.
pub fn file_size(path: &Path) -> Option<u64> {
    let meta = std::fs::metadata(path).ok()?;
    meta.is_file().then(|| meta.len())
}
