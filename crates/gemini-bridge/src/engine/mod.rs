//! Delegated analysis: packaging files, calling the engine, caching.
//!
//! [`AnalysisEngine`] is the seam to the external large-context model. The
//! production implementation, [`GeminiCli`], runs the Gemini command line
//! tool as a child process. [`Invoker`] wraps any engine with the cache,
//! per-file filtering, and the cross-process rate limiter.

pub mod prompt;

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::cache::{AnalysisCache, CacheKey};
use crate::config::BridgeConfig;
use crate::error::{EngineError, InvokeError};
use crate::hook::input::Operation;
use crate::rate_limit::RateLimiter;

/// Most stderr kept in a [`EngineError::NonZeroExit`].
const MAX_STDERR_CHARS: usize = 500;

/// Boxed future returned by [`AnalysisEngine::analyze`].
pub type EngineFuture<'a> = Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>>;

/// An opaque text-in, text-out analysis service.
pub trait AnalysisEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Analyze `content` according to `instruction`, run from `working_dir`.
    fn analyze<'a>(
        &'a self,
        instruction: &'a str,
        content: &'a str,
        working_dir: &'a Path,
    ) -> EngineFuture<'a>;
}

// ── Gemini CLI ─────────────────────────────────────────────────────

/// Runs `<command> <args...> <instruction>` with the file content on stdin.
#[derive(Debug, Clone)]
pub struct GeminiCli {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl GeminiCli {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.engine_command.clone(),
            config.engine_args.clone(),
            config.engine_timeout,
        )
    }

    async fn run(&self, instruction: &str, content: &str, working_dir: &Path) -> Result<String, EngineError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(instruction)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if working_dir.is_dir() {
            cmd.current_dir(working_dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                EngineError::Unavailable(format!("'{}' not found on PATH", self.command))
            } else {
                EngineError::Io(e)
            }
        })?;

        // Feed stdin concurrently so a large payload can't deadlock against
        // a child that is already filling its stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let payload = content.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    debug!("Engine closed stdin early: {e}");
                }
                let _ = stdin.shutdown().await;
            })
        });

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                if let Some(w) = writer {
                    w.abort();
                }
                return Err(EngineError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().chars().take(MAX_STDERR_CHARS).collect(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(EngineError::EmptyOutput);
        }
        Ok(stdout)
    }
}

impl AnalysisEngine for GeminiCli {
    fn name(&self) -> &str {
        &self.command
    }

    fn analyze<'a>(
        &'a self,
        instruction: &'a str,
        content: &'a str,
        working_dir: &'a Path,
    ) -> EngineFuture<'a> {
        Box::pin(self.run(instruction, content, working_dir))
    }
}

// ── Invoker ────────────────────────────────────────────────────────

/// Result of a successful [`Invoker::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub text: String,
    /// Served from the cache without calling the engine.
    pub cached: bool,
    /// Files that were (or, on a cache hit, were requested to be) analyzed.
    pub file_count: usize,
}

/// One file that survived filtering, with its content.
struct Packaged {
    path: PathBuf,
    content: String,
    bytes: u64,
}

/// Cache, filter, rate-limit, and call the engine.
pub struct Invoker {
    engine: Box<dyn AnalysisEngine>,
    cache: AnalysisCache,
    limiter: RateLimiter,
    max_files: usize,
    max_file_size: u64,
    dry_run: bool,
}

impl Invoker {
    pub fn new(engine: Box<dyn AnalysisEngine>, config: &BridgeConfig) -> Self {
        Self {
            engine,
            cache: AnalysisCache::new(config.cache_dir(), config.cache_ttl),
            limiter: RateLimiter::new(config.rate_limit_stamp(), config.rate_limit_interval),
            max_files: config.max_files,
            max_file_size: config.max_file_size,
            dry_run: config.dry_run,
        }
    }

    /// Analyze `files` for `operation`.
    ///
    /// A fresh cache entry short-circuits everything else. Otherwise the
    /// set is filtered to readable files within the size cap, the caller
    /// waits for its rate-limit slot, and the engine is called. Successful
    /// output is cached before it is returned.
    pub async fn invoke(
        &self,
        operation: Operation,
        files: &[PathBuf],
        working_dir: &Path,
        prompt: &str,
    ) -> Result<Analysis, InvokeError> {
        if self.dry_run {
            return self.dry_run_analysis(files).await;
        }

        let key = CacheKey::derive(operation, files, working_dir, prompt);
        if let Some(text) = self.cache.get(&key) {
            info!("Serving {operation} analysis from cache");
            return Ok(Analysis {
                text,
                cached: true,
                file_count: files.len(),
            });
        }

        let packaged = self.package(files).await;
        if packaged.is_empty() {
            return Err(InvokeError::NoValidContent);
        }

        let instruction = prompt::build_instruction(operation, prompt, packaged.len());
        let content: String = packaged
            .iter()
            .map(|p| prompt::frame_file(&p.path, &p.content))
            .collect();

        let waited = self.limiter.await_turn().await;
        info!(
            "Calling {} for {operation}: {} files, {} bytes (rate-limit wait {}ms)",
            self.engine.name(),
            packaged.len(),
            content.len(),
            waited.as_millis()
        );
        let text = self.engine.analyze(&instruction, &content, working_dir).await?;

        if let Err(e) = self.cache.put(&key, operation, &text) {
            warn!("Failed to cache analysis: {e}");
        }
        Ok(Analysis {
            text,
            cached: false,
            file_count: packaged.len(),
        })
    }

    async fn dry_run_analysis(&self, files: &[PathBuf]) -> Result<Analysis, InvokeError> {
        let packaged = self.package(files).await;
        if packaged.is_empty() {
            return Err(InvokeError::NoValidContent);
        }
        let bytes: u64 = packaged.iter().map(|p| p.bytes).sum();
        Ok(Analysis {
            text: format!(
                "[DRY RUN] would send {} files ({bytes} bytes) to Gemini",
                packaged.len()
            ),
            cached: false,
            file_count: packaged.len(),
        })
    }

    /// Keep existing regular files no larger than the per-file cap that can
    /// be read, up to `max_files`.
    async fn package(&self, files: &[PathBuf]) -> Vec<Packaged> {
        let mut kept = Vec::new();
        for path in files {
            if kept.len() >= self.max_files {
                break;
            }
            let meta = match tokio::fs::metadata(path).await {
                Ok(m) if m.is_file() => m,
                _ => {
                    debug!("Skipping {}: not a regular file", path.display());
                    continue;
                }
            };
            if meta.len() > self.max_file_size {
                debug!(
                    "Skipping {}: {} bytes exceeds per-file cap {}",
                    path.display(),
                    meta.len(),
                    self.max_file_size
                );
                continue;
            }
            match tokio::fs::read(path).await {
                Ok(bytes) => kept.push(Packaged {
                    path: path.clone(),
                    bytes: bytes.len() as u64,
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                }),
                Err(e) => debug!("Skipping {}: {e}", path.display()),
            }
        }
        kept
    }
}
