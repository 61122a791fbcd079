//! Retention sweeps over the state directory.
//!
//! The hook itself never waits on cleanup. After responding it may launch
//! `gemini-bridge maintenance` as a detached child (see [`maybe_spawn`]),
//! which runs [`sweep`] and exits.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::cache::{AnalysisCache, remove_older_than};
use crate::config::BridgeConfig;

/// Files removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_entries: usize,
    pub log_files: usize,
    pub captures: usize,
}

/// Remove expired cache entries, logs, and captures, judged by mtime.
pub fn sweep(config: &BridgeConfig) -> SweepReport {
    let cache = AnalysisCache::new(config.cache_dir(), config.cache_ttl);
    let report = SweepReport {
        cache_entries: logged("cache", cache.cleanup(config.cache_retention)),
        log_files: logged(
            "logs",
            remove_older_than(&config.log_dir(), config.log_retention, |p| {
                p.extension().is_some_and(|e| e == "log")
            }),
        ),
        captures: logged(
            "captures",
            remove_older_than(&config.capture_dir(), config.capture_retention, |p| {
                p.extension().is_some_and(|e| e == "json")
            }),
        ),
    };
    info!(
        "Maintenance removed {} cache entries, {} log files, {} captures",
        report.cache_entries, report.log_files, report.captures
    );
    report
}

fn logged(what: &str, result: std::io::Result<usize>) -> usize {
    result.unwrap_or_else(|e| {
        warn!("Maintenance sweep of {what} failed: {e}");
        0
    })
}

/// Roll a `probability`-percent die from sub-second clock noise.
pub fn should_run(probability: u8) -> bool {
    if probability == 0 {
        return false;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .subsec_nanos();
    // Mix in the pid so processes started in the same tick disagree.
    let roll = ((nanos / 1000) ^ std::process::id()) % 100;
    roll < u32::from(probability)
}

/// With `cleanup_probability` percent chance, start a detached
/// `<current_exe> maintenance` in `working_dir`, so the child resolves the
/// same project config. Never waits on or reports the child.
pub fn maybe_spawn(config: &BridgeConfig, working_dir: &Path) {
    if !should_run(config.cleanup_probability) {
        return;
    }
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            warn!("Cannot locate own executable for maintenance: {e}");
            return;
        }
    };
    match sweep_command(exe, config, working_dir).spawn() {
        Ok(child) => debug!("Launched maintenance sweep (pid {})", child.id()),
        Err(e) => warn!("Failed to launch maintenance sweep: {e}"),
    }
}

fn sweep_command(exe: PathBuf, config: &BridgeConfig, working_dir: &Path) -> Command {
    let mut command = Command::new(exe);
    command
        .arg("maintenance")
        .current_dir(working_dir)
        .env("GEMINI_BRIDGE_HOME", &config.state_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn probability_bounds() {
        assert!(!should_run(0));
        assert!(should_run(100));
    }

    #[test]
    fn sweep_removes_only_expired_files_of_each_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default().with_state_dir(dir.path());
        for d in [config.cache_dir(), config.log_dir(), config.capture_dir()] {
            fs::create_dir_all(&d).unwrap();
        }
        fs::write(config.cache_dir().join("k.json"), "{}").unwrap();
        fs::write(config.log_dir().join("2020-01-01.log"), "old").unwrap();
        fs::write(config.log_dir().join("README"), "not a log").unwrap();
        fs::write(config.capture_dir().join("20200101_000000_000_1.json"), "{}").unwrap();

        // Nothing is old enough under the defaults.
        assert_eq!(sweep(&config), SweepReport::default());

        std::thread::sleep(Duration::from_millis(20));
        config.cache_retention = Duration::from_millis(1);
        config.log_retention = Duration::from_millis(1);
        config.capture_retention = Duration::from_millis(1);
        assert_eq!(
            sweep(&config),
            SweepReport {
                cache_entries: 1,
                log_files: 1,
                captures: 1,
            }
        );
        assert!(config.log_dir().join("README").exists());
    }

    #[test]
    fn sweep_child_runs_in_the_invocation_directory() {
        let config = BridgeConfig::default().with_state_dir("/var/tmp/bridge-state");
        let command = sweep_command(
            PathBuf::from("/usr/local/bin/gemini-bridge"),
            &config,
            Path::new("/work/project"),
        );
        assert_eq!(command.get_current_dir(), Some(Path::new("/work/project")));
        assert_eq!(
            command.get_args().collect::<Vec<_>>(),
            vec![std::ffi::OsStr::new("maintenance")]
        );
        assert!(command.get_envs().any(|(k, v)| {
            k == "GEMINI_BRIDGE_HOME" && v == Some(std::ffi::OsStr::new("/var/tmp/bridge-state"))
        }));
    }

    #[test]
    fn sweep_of_empty_state_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::default().with_state_dir(dir.path().join("fresh"));
        assert_eq!(sweep(&config), SweepReport::default());
    }
}
