//! Raw hook input snapshots, for reproducing what the assistant sent.
//!
//! Only active with `capture_inputs`. Each run writes
//! `<capture_dir>/<YYYYmmdd_HHMMSS_fff>_<pid>.json` with stdin verbatim.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, warn};

/// File name for a snapshot taken now by this process.
fn snapshot_name() -> String {
    format!(
        "{}_{}.json",
        Local::now().format("%Y%m%d_%H%M%S_%3f"),
        std::process::id()
    )
}

/// Write `raw` into `dir`, returning the snapshot path.
pub fn save(dir: &Path, raw: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_name());
    fs::write(&path, raw)?;
    Ok(path)
}

/// [`save`], logging instead of failing.
pub fn save_logged(dir: &Path, raw: &str) {
    match save(dir, raw) {
        Ok(path) => debug!("Captured hook input to {}", path.display()),
        Err(e) => warn!("Failed to capture hook input: {e}"),
    }
}
