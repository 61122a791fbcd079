//! One hook execution, from parsed input to decision document.
//!
//! ```text
//! Start -> Extracted -> Decided(local)    -> approve
//!                    -> Decided(delegate) -> Invoking -> block (analysis)
//!                                                    -> approve (failure reason)
//! ```
//!
//! Every path ends in a [`HookResponse`]; nothing here returns an error or
//! retries a failed engine call.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::extract::extract;
use super::input::ToolInvocation;
use super::response::HookResponse;
use crate::config::BridgeConfig;
use crate::decision::{DecisionEngine, VerdictReason};
use crate::engine::{AnalysisEngine, GeminiCli, Invoker};
use crate::error::InputError;
use crate::estimate::SizeReport;

/// Response plus the process exit code that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    pub response: HookResponse,
    pub exit_code: i32,
}

impl HookOutcome {
    fn ok(response: HookResponse) -> Self {
        Self {
            response,
            exit_code: 0,
        }
    }
}

/// The assembled pipeline for one run.
pub struct Bridge {
    config: BridgeConfig,
    decisions: DecisionEngine,
    invoker: Invoker,
}

impl Bridge {
    /// Pipeline backed by the Gemini CLI.
    pub fn new(config: BridgeConfig) -> Self {
        let engine = GeminiCli::from_config(&config);
        Self::with_engine(config, Box::new(engine))
    }

    /// Pipeline backed by an arbitrary engine.
    pub fn with_engine(config: BridgeConfig, engine: Box<dyn AnalysisEngine>) -> Self {
        Self {
            decisions: DecisionEngine::from_config(&config),
            invoker: Invoker::new(engine, &config),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Parse raw stdin text and respond to it.
    pub async fn handle_raw(&self, raw: &str) -> HookOutcome {
        self.respond(ToolInvocation::parse(raw)).await
    }

    /// Respond to an already-attempted parse.
    ///
    /// Blank input approves silently. Malformed input approves with the
    /// parse error as reason and exit code 1.
    pub async fn respond(&self, parsed: Result<Option<ToolInvocation>, InputError>) -> HookOutcome {
        match parsed {
            Ok(Some(invocation)) => HookOutcome::ok(self.handle(&invocation).await),
            Ok(None) => {
                debug!("Empty hook input");
                HookOutcome::ok(HookResponse::proceed())
            }
            Err(e) => {
                warn!("Invalid hook input: {e}");
                HookOutcome {
                    response: HookResponse::invalid_input(e),
                    exit_code: 1,
                }
            }
        }
    }

    /// Decide and, if warranted, delegate one invocation.
    pub async fn handle(&self, invocation: &ToolInvocation) -> HookResponse {
        let Some(extracted) = extract(invocation, &self.config) else {
            debug!("Tool '{}' is not routed; proceeding", invocation.tool_name);
            return HookResponse::proceed();
        };
        let operation = extracted.operation;

        let report = SizeReport::measure(&extracted.files);
        debug!("{operation}: {}", report.to_log_string());

        let verdict = self.decisions.decide(operation, &extracted.files, &report);
        info!(
            "{operation}: {} ({})",
            if verdict.should_delegate { "delegate" } else { "local" },
            verdict.reason
        );
        if !verdict.should_delegate {
            return match verdict.reason {
                VerdictReason::TooLargeForEitherEngine { .. } => {
                    HookResponse::proceed_with(verdict.reason.to_string())
                }
                _ => HookResponse::proceed(),
            };
        }

        let start = Instant::now();
        match self
            .invoker
            .invoke(
                operation,
                &extracted.files,
                &extracted.working_dir,
                &extracted.prompt,
            )
            .await
        {
            Ok(analysis) => {
                let elapsed = start.elapsed();
                info!(
                    "{operation}: analysis ready in {:.1}s ({} chars{})",
                    elapsed.as_secs_f64(),
                    analysis.text.len(),
                    if analysis.cached { ", cached" } else { "" }
                );
                HookResponse::analysis(
                    operation,
                    analysis.file_count,
                    elapsed,
                    analysis.cached,
                    &analysis.text,
                )
            }
            Err(e) => {
                warn!("{operation}: delegation failed: {e}");
                HookResponse::delegation_failed(e)
            }
        }
    }
}
