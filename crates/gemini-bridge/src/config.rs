//! Bridge configuration with layered overrides.
//!
//! [`BridgeConfig`] is resolved once per execution. Layers apply in this
//! order, later layers winning:
//!
//! 1. built-in defaults ([`BridgeConfig::default`])
//! 2. global file: `<config_dir>/gemini-bridge/config.json`
//! 3. project file: `<working_dir>/.gemini-bridge/config.json`
//! 4. environment variables (`GEMINI_MAX_FILES`, `DRY_RUN`, ...)
//!
//! Files hold a [`ConfigLayer`], where every field is optional:
//!
//! ```json
//! {
//!   "max_files": 40,
//!   "local_token_limit": 80000,
//!   "exclude_patterns": ["*.key", "*.pem"]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Directory name under the platform config dir for the global file.
pub const APP_DIR_NAME: &str = "gemini-bridge";

/// Project-local directory holding the project config file.
pub const PROJECT_DIR_NAME: &str = ".gemini-bridge";

/// File name of both the global and the project config file.
pub const CONFIG_FILE_NAME: &str = "config.json";

const HOUR_SECS: u64 = 3600;
const DAY_SECS: u64 = 24 * HOUR_SECS;

/// Filename patterns that never leave the machine.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "*.secret",
    "*.key",
    "*.env",
    ".env",
    ".env.*",
    "*.password",
    "*.token",
    "*.pem",
    "*.p12",
    "*.pfx",
    "*.crt",
    "*.cer",
    "id_rsa*",
    "id_ed25519*",
    "*credentials*",
    "*secrets*",
];

/// System locations a project root may never point into.
pub const DEFAULT_SENSITIVE_ROOTS: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/boot", "/root", "/sys", "/proc", "/dev",
];

/// Credential directories under the user's home that are equally off limits.
pub const DEFAULT_SENSITIVE_HOME_DIRS: &[&str] =
    &[".ssh", ".aws", ".gnupg", ".config/gcloud", ".kube"];

/// Resolved configuration for one hook execution.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Log verbosity: 0 errors only, 1 info, 2 debug, 3 trace. Default: `1`.
    pub debug_level: u8,
    /// Always delegate and never start the engine. Default: `false`.
    pub dry_run: bool,
    /// Save every raw hook input under `captured/`. Default: `false`.
    pub capture_inputs: bool,
    /// How long a cached analysis stays valid for reads. Default: 1 hour.
    pub cache_ttl: Duration,
    /// Minimum spacing between engine calls across processes. Default: 1s.
    pub rate_limit_interval: Duration,
    /// Hard limit on one engine call. Default: 30s.
    pub engine_timeout: Duration,
    /// Maximum files resolved per invocation and sent per call. Default: `20`.
    pub max_files: usize,
    /// Minimum file count for a task to be delegated on count alone. Default: `3`.
    pub min_files_for_delegation: usize,
    /// Minimum aggregate bytes for a multi-file task to be delegated. Default: 5 KiB.
    pub min_total_size: u64,
    /// Aggregate bytes above which nothing is delegated. Default: 10 MiB.
    pub max_total_size: u64,
    /// Per-file cap when packaging content for the engine. Default: 1 MiB.
    pub max_file_size: u64,
    /// Token count the local assistant handles comfortably. Default: `50_000`.
    pub local_token_limit: u64,
    /// Token capacity of the remote engine. Default: `800_000`.
    pub remote_token_limit: u64,
    /// Glob patterns for files that must never be delegated.
    pub exclude_patterns: Vec<String>,
    /// Path prefixes a project root may not live under.
    pub sensitive_paths: Vec<PathBuf>,
    /// Age after which cache entries are swept. Default: 24 hours.
    pub cache_retention: Duration,
    /// Age after which log files are swept. Default: 7 days.
    pub log_retention: Duration,
    /// Age after which captured inputs are swept. Default: 3 days.
    pub capture_retention: Duration,
    /// Percent chance of launching a maintenance sweep after a run. Default: `10`.
    pub cleanup_probability: u8,
    /// Engine executable. Default: `"gemini"`.
    pub engine_command: String,
    /// Arguments placed before the instruction prompt. Default: `["-p"]`.
    pub engine_args: Vec<String>,
    /// Root for cache, logs, captures, and the rate-limit stamp.
    pub state_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            debug_level: 1,
            dry_run: false,
            capture_inputs: false,
            cache_ttl: Duration::from_secs(3600),
            rate_limit_interval: Duration::from_secs(1),
            engine_timeout: Duration::from_secs(30),
            max_files: 20,
            min_files_for_delegation: 3,
            min_total_size: 5 * 1024,
            max_total_size: 10 * 1024 * 1024,
            max_file_size: 1024 * 1024,
            local_token_limit: 50_000,
            remote_token_limit: 800_000,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            sensitive_paths: default_sensitive_paths(),
            cache_retention: Duration::from_secs(24 * 3600),
            log_retention: Duration::from_secs(7 * 24 * 3600),
            capture_retention: Duration::from_secs(3 * 24 * 3600),
            cleanup_probability: 10,
            engine_command: "gemini".to_string(),
            engine_args: vec!["-p".to_string()],
            state_dir: default_state_dir(),
        }
    }
}

/// One optional-valued configuration layer, as stored in a config file.
///
/// Durations are in seconds (hours/days where the name says so).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_inputs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_files_for_delegation: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_total_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_token_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_token_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive_paths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_retention_hours: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_retention_days: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_retention_days: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_probability: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl ConfigLayer {
    /// Read a layer from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build a layer from environment variables.
    ///
    /// `lookup` returns the raw value for a variable name. Values that fail
    /// to parse are logged and left unset so lower layers keep their value.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            debug_level: env_parse(&lookup, "DEBUG_LEVEL"),
            dry_run: env_bool(&lookup, "DRY_RUN"),
            capture_inputs: env_bool(&lookup, "CAPTURE_INPUTS"),
            cache_ttl_secs: env_parse(&lookup, "GEMINI_CACHE_TTL"),
            rate_limit_secs: env_parse::<f64>(&lookup, "GEMINI_RATE_LIMIT")
                .filter(|v| v.is_finite() && *v >= 0.0),
            engine_timeout_secs: env_parse(&lookup, "GEMINI_TIMEOUT"),
            max_files: env_parse(&lookup, "GEMINI_MAX_FILES"),
            min_files_for_delegation: env_parse(&lookup, "MIN_FILES_FOR_GEMINI"),
            min_total_size: env_parse(&lookup, "MIN_FILE_SIZE_FOR_GEMINI"),
            max_total_size: env_parse(&lookup, "MAX_TOTAL_SIZE_FOR_GEMINI"),
            max_file_size: env_parse(&lookup, "GEMINI_MAX_FILE_SIZE"),
            local_token_limit: env_parse(&lookup, "CLAUDE_TOKEN_LIMIT"),
            remote_token_limit: env_parse(&lookup, "GEMINI_TOKEN_LIMIT"),
            exclude_patterns: lookup("GEMINI_EXCLUDE_PATTERNS").map(|v| split_list(&v, '|')),
            sensitive_paths: lookup("GEMINI_SENSITIVE_PATHS").map(|v| split_list(&v, ':')),
            cache_retention_hours: env_parse(&lookup, "CACHE_RETENTION_HOURS"),
            log_retention_days: env_parse(&lookup, "LOG_RETENTION_DAYS"),
            capture_retention_days: env_parse(&lookup, "CAPTURE_RETENTION_DAYS"),
            cleanup_probability: env_parse(&lookup, "CLEANUP_PROBABILITY"),
            engine_command: lookup("GEMINI_COMMAND").map(|v| v.trim().to_string()),
            engine_args: lookup("GEMINI_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect()),
            state_dir: lookup("GEMINI_BRIDGE_HOME").map(PathBuf::from),
        }
    }
}

impl BridgeConfig {
    /// Resolve the full configuration for a run in `working_dir`, reading
    /// the global and project files and the process environment.
    pub fn load(working_dir: &Path) -> Self {
        let global = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
        let project = working_dir.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME);
        Self::resolve(global.as_deref(), Some(&project), |key| {
            std::env::var(key).ok()
        })
    }

    /// Resolve from explicit file locations and an environment lookup.
    ///
    /// Missing files are skipped silently; unreadable or malformed files are
    /// logged and skipped.
    pub fn resolve(
        global_file: Option<&Path>,
        project_file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::default();
        for path in [global_file, project_file].into_iter().flatten() {
            if !path.is_file() {
                continue;
            }
            match ConfigLayer::from_file(path) {
                Ok(layer) => {
                    debug!("Applying config file {}", path.display());
                    config.apply(layer);
                }
                Err(e) => warn!("{e}"),
            }
        }
        config.apply(ConfigLayer::from_env(env));
        config
    }

    /// Overlay every field the layer sets.
    pub fn apply(&mut self, layer: ConfigLayer) {
        if let Some(v) = layer.debug_level {
            self.debug_level = v;
        }
        if let Some(v) = layer.dry_run {
            self.dry_run = v;
        }
        if let Some(v) = layer.capture_inputs {
            self.capture_inputs = v;
        }
        if let Some(v) = layer.cache_ttl_secs {
            self.cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = layer.rate_limit_secs {
            match Duration::try_from_secs_f64(v) {
                Ok(interval) => self.rate_limit_interval = interval,
                Err(e) => warn!("rate limit of {v}s is out of range ({e}); ignoring"),
            }
        }
        if let Some(v) = layer.engine_timeout_secs {
            self.engine_timeout = Duration::from_secs(v);
        }
        if let Some(v) = layer.max_files {
            self.max_files = v;
        }
        if let Some(v) = layer.min_files_for_delegation {
            self.min_files_for_delegation = v;
        }
        if let Some(v) = layer.min_total_size {
            self.min_total_size = v;
        }
        if let Some(v) = layer.max_total_size {
            self.max_total_size = v;
        }
        if let Some(v) = layer.max_file_size {
            self.max_file_size = v;
        }
        if let Some(v) = layer.local_token_limit {
            self.local_token_limit = v;
        }
        if let Some(v) = layer.remote_token_limit {
            self.remote_token_limit = v;
        }
        if let Some(v) = layer.exclude_patterns {
            self.exclude_patterns = v;
        }
        if let Some(v) = layer.sensitive_paths {
            self.sensitive_paths = v.iter().map(|p| expand_home(p)).collect();
        }
        if let Some(v) = layer.cache_retention_hours {
            self.cache_retention = Duration::from_secs(v.saturating_mul(HOUR_SECS));
        }
        if let Some(v) = layer.log_retention_days {
            self.log_retention = Duration::from_secs(v.saturating_mul(DAY_SECS));
        }
        if let Some(v) = layer.capture_retention_days {
            self.capture_retention = Duration::from_secs(v.saturating_mul(DAY_SECS));
        }
        if let Some(v) = layer.cleanup_probability {
            self.cleanup_probability = v.min(100);
        }
        if let Some(v) = layer.engine_command
            && !v.is_empty()
        {
            self.engine_command = v;
        }
        if let Some(v) = layer.engine_args {
            self.engine_args = v;
        }
        if let Some(v) = layer.state_dir {
            self.state_dir = v;
        }
    }

    /// Express the resolved values as a layer, e.g. for `gemini-bridge config`.
    pub fn to_layer(&self) -> ConfigLayer {
        ConfigLayer {
            debug_level: Some(self.debug_level),
            dry_run: Some(self.dry_run),
            capture_inputs: Some(self.capture_inputs),
            cache_ttl_secs: Some(self.cache_ttl.as_secs()),
            rate_limit_secs: Some(self.rate_limit_interval.as_secs_f64()),
            engine_timeout_secs: Some(self.engine_timeout.as_secs()),
            max_files: Some(self.max_files),
            min_files_for_delegation: Some(self.min_files_for_delegation),
            min_total_size: Some(self.min_total_size),
            max_total_size: Some(self.max_total_size),
            max_file_size: Some(self.max_file_size),
            local_token_limit: Some(self.local_token_limit),
            remote_token_limit: Some(self.remote_token_limit),
            exclude_patterns: Some(self.exclude_patterns.clone()),
            sensitive_paths: Some(
                self.sensitive_paths
                    .iter()
                    .map(|p| p.to_string_lossy().to_string())
                    .collect(),
            ),
            cache_retention_hours: Some(self.cache_retention.as_secs() / HOUR_SECS),
            log_retention_days: Some(self.log_retention.as_secs() / DAY_SECS),
            capture_retention_days: Some(self.capture_retention.as_secs() / DAY_SECS),
            cleanup_probability: Some(self.cleanup_probability),
            engine_command: Some(self.engine_command.clone()),
            engine_args: Some(self.engine_args.clone()),
            state_dir: Some(self.state_dir.clone()),
        }
    }

    /// Builder: relocate all persisted state (handy for tests).
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Builder: toggle dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builder: set the minimum spacing between engine calls.
    pub fn with_rate_limit(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir.join("cache")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn capture_dir(&self) -> PathBuf {
        self.state_dir.join("captured")
    }

    pub fn rate_limit_stamp(&self) -> PathBuf {
        self.state_dir.join("rate_limit.stamp")
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR_NAME))
}

fn default_sensitive_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = DEFAULT_SENSITIVE_ROOTS.iter().map(PathBuf::from).collect();
    if let Some(home) = dirs::home_dir() {
        paths.extend(DEFAULT_SENSITIVE_HOME_DIRS.iter().map(|d| home.join(d)));
    }
    paths
}

/// Expand a leading `~/` to the home directory.
fn expand_home(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            let err = ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            };
            warn!("{err}; ignoring");
            None
        }
    }
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("invalid boolean for {key}: '{raw}'; ignoring");
            None
        }
    }
}
