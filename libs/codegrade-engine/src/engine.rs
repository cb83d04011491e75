/// Execution Orchestrator
///
/// **Core Responsibility:**
/// Drive one submission through the lifecycle state machine:
/// syntax check, workspace, compile, run, classify.
///
/// **Architectural Boundary:**
/// - Knows which adapter builds the commands, not what they are
/// - Knows nothing about scoring (see `evaluator`)
/// - Compile errors, crashes and timeouts are outcomes, not errors
///
/// **Concurrency:**
/// Every request holds one slot of a bounded pool while it touches the
/// filesystem or spawns processes. A request that cannot get a slot within
/// `pool.queue_wait_ms` fails with `EngineError::Busy`.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::languages::{adapter_for, Step};
use crate::metrics;
use crate::probe;
use crate::runner::{ProcessOutput, ProcessRunner};
use crate::syntax;
use crate::workspace::{Workspace, WorkspaceManager};
use codegrade_common::types::{
    ExecutionOutcome, ExecutionRequest, ExecutionState, Language, SyntaxReport,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Current state of one request, with every transition checked and logged
#[derive(Debug)]
struct Lifecycle {
    request_id: Uuid,
    language: Language,
    state: ExecutionState,
}

impl Lifecycle {
    fn new(request_id: Uuid, language: Language) -> Self {
        Self::resume(request_id, language, ExecutionState::Created)
    }

    fn resume(request_id: Uuid, language: Language, state: ExecutionState) -> Self {
        Self {
            request_id,
            language,
            state,
        }
    }

    fn advance(&mut self, next: ExecutionState) {
        if !self.state.can_advance_to(next) {
            warn!(
                request_id = %self.request_id,
                from = %self.state,
                to = %next,
                "Illegal state transition"
            );
        }
        debug!(request_id = %self.request_id, from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    /// Enter a terminal state and count it
    fn finish(&mut self, mut outcome: ExecutionOutcome) -> ExecutionOutcome {
        self.advance(outcome.state);
        outcome.state = self.state;
        let language = self.language.to_string();
        metrics::EXECUTIONS_TOTAL
            .with_label_values(&[language.as_str(), self.state.as_str()])
            .inc();
        outcome
    }
}

/// A pool slot; released on drop
#[derive(Debug)]
pub struct ExecutionSlot {
    _permit: OwnedSemaphorePermit,
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        metrics::IN_FLIGHT.dec();
    }
}

/// A submission that is ready to run: source written, compiled if needed
#[derive(Debug)]
pub struct Prepared {
    request_id: Uuid,
    language: Language,
    workspace: Workspace,
    run: Step,
    /// `RunPending` after a compile, `Created` for interpreted languages
    ready_state: ExecutionState,
}

impl Prepared {
    pub async fn release(self) {
        self.workspace.release().await;
    }
}

/// Result of `Engine::prepare`
#[derive(Debug)]
pub enum Preparation {
    Ready(Prepared),
    /// Syntax rejection or compile failure; the workspace is already gone
    Rejected(ExecutionOutcome),
}

pub struct Engine {
    config: Arc<EngineConfig>,
    workspaces: WorkspaceManager,
    runner: ProcessRunner,
    slots: Arc<Semaphore>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        metrics::init_metrics();

        let workspaces = WorkspaceManager::new(config.scratch_root.clone());
        let runner = ProcessRunner::new(config.max_output_bytes);
        let slots = Arc::new(Semaphore::new(config.pool.max_concurrent_executions));

        info!(
            scratch_root = %config.scratch_root.display(),
            max_concurrent = config.pool.max_concurrent_executions,
            queue_wait_ms = config.pool.queue_wait_ms,
            "Engine initialized"
        );

        Self {
            config: Arc::new(config),
            workspaces,
            runner,
            slots,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wait for a pool slot, giving up after `pool.queue_wait_ms`
    pub async fn acquire_slot(&self) -> EngineResult<ExecutionSlot> {
        let wait = Duration::from_millis(self.config.pool.queue_wait_ms);
        let start = Instant::now();

        match tokio::time::timeout(wait, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => {
                metrics::IN_FLIGHT.inc();
                Ok(ExecutionSlot { _permit: permit })
            }
            // the semaphore is never closed, treat it like a full pool
            Ok(Err(_)) | Err(_) => {
                let waited_ms = start.elapsed().as_millis() as u64;
                metrics::POOL_REJECTIONS.inc();
                warn!(waited_ms, "No execution slot available");
                Err(EngineError::Busy { waited_ms })
            }
        }
    }

    /// Reject limits and inputs the engine will not accept at all
    pub fn check_request(&self, time_limit_ms: u64, stdin_bytes: usize) -> EngineResult<()> {
        if time_limit_ms == 0 {
            return Err(EngineError::InvalidRequest(
                "time limit must be greater than zero".to_string(),
            ));
        }
        if time_limit_ms > self.config.max_time_limit_ms {
            return Err(EngineError::InvalidRequest(format!(
                "time limit of {} ms exceeds the maximum of {} ms",
                time_limit_ms, self.config.max_time_limit_ms
            )));
        }
        if stdin_bytes > self.config.max_stdin_bytes {
            return Err(EngineError::InvalidRequest(format!(
                "input of {} bytes exceeds the maximum of {} bytes",
                stdin_bytes, self.config.max_stdin_bytes
            )));
        }
        Ok(())
    }

    /// Run one program once
    #[instrument(skip_all, fields(language = %request.language, request_id = tracing::field::Empty))]
    pub async fn execute(&self, request: &ExecutionRequest) -> EngineResult<ExecutionOutcome> {
        self.check_request(request.wall_clock_limit_ms, request.stdin.len())?;
        let _slot = self.acquire_slot().await?;

        let prepared = match self.prepare(&request.source_code, request.language).await? {
            Preparation::Ready(prepared) => prepared,
            Preparation::Rejected(outcome) => return Ok(outcome),
        };
        tracing::Span::current().record("request_id", tracing::field::display(prepared.request_id));

        let outcome = self
            .run_prepared(&prepared, &request.stdin, request.wall_clock_limit_ms)
            .await;
        prepared.release().await;

        let outcome = outcome?;
        info!(
            state = %outcome.state,
            elapsed_ms = outcome.elapsed_ms,
            exit_code = ?outcome.exit_code,
            "Execution finished"
        );
        Ok(outcome)
    }

    /// Syntax check, allocate a workspace, write the source and compile it.
    ///
    /// The caller should hold an `ExecutionSlot`.
    pub async fn prepare(&self, source: &str, language: Language) -> EngineResult<Preparation> {
        let request_id = Uuid::new_v4();
        let mut lifecycle = Lifecycle::new(request_id, language);

        let report = syntax::validate(source, language, self.config.max_source_bytes);
        if !report.is_valid {
            let outcome = ExecutionOutcome::rejected(
                ExecutionState::SyntaxRejected,
                report.errors.join("; "),
            );
            return Ok(Preparation::Rejected(lifecycle.finish(outcome)));
        }

        let adapter = adapter_for(language, &self.config.toolchains);
        let workspace = self.workspaces.acquire().await?;
        workspace
            .write_file(&adapter.source_file_name(source), source)
            .await?;
        let plan = adapter.build_commands(workspace.path(), source);

        let ready_state = match plan.compile {
            None => ExecutionState::Created,
            Some(compile) => {
                lifecycle.advance(ExecutionState::CompilePending);
                lifecycle.advance(ExecutionState::Compiling);

                let failure = match self.compile(language, compile).await? {
                    Some(failure) => Some(failure),
                    None => missing_artifact(plan.artifact.as_deref()).await,
                };
                if let Some(failure) = failure {
                    workspace.release().await;
                    return Ok(Preparation::Rejected(lifecycle.finish(failure)));
                }

                lifecycle.advance(ExecutionState::RunPending);
                ExecutionState::RunPending
            }
        };

        Ok(Preparation::Ready(Prepared {
            request_id,
            language,
            workspace,
            run: plan.run,
            ready_state,
        }))
    }

    /// Run the compile step; `Some` carries the failed outcome
    async fn compile(&self, language: Language, step: Step) -> EngineResult<Option<ExecutionOutcome>> {
        let command = match step {
            Ok(command) => command,
            Err(missing) => {
                warn!(%language, error = %missing, "Compiler unavailable");
                return Ok(Some(ExecutionOutcome::rejected(
                    ExecutionState::CompileFailed,
                    missing.to_string(),
                )));
            }
        };

        let deadline = Duration::from_millis(self.config.compile_timeout_ms);
        let output = match self.runner.run(&command, "", deadline).await {
            Ok(output) => output,
            Err(e) if e.is_not_found() => {
                return Ok(Some(ExecutionOutcome::rejected(
                    ExecutionState::CompileFailed,
                    format!("toolchain missing: {}", e),
                )));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::COMPILE_DURATION
            .with_label_values(&[language.to_string().as_str()])
            .observe(output.elapsed_ms as f64 / 1000.0);

        if output.success() {
            debug!(elapsed_ms = output.elapsed_ms, "Compilation succeeded");
            return Ok(None);
        }

        let diagnostic = if output.timed_out {
            format!("compilation timed out after {} ms", self.config.compile_timeout_ms)
        } else {
            first_non_empty(&[&output.stderr, &output.stdout])
                .map(str::to_string)
                .unwrap_or_else(|| describe_exit(&output))
        };
        debug!(elapsed_ms = output.elapsed_ms, timed_out = output.timed_out, "Compilation failed");

        let mut outcome = ExecutionOutcome::rejected(ExecutionState::CompileFailed, diagnostic);
        outcome.stdout = output.stdout;
        outcome.elapsed_ms = output.elapsed_ms;
        outcome.exit_code = output.exit_code;
        Ok(Some(outcome))
    }

    /// Run a prepared submission once with `stdin` under `time_limit_ms`
    pub async fn run_prepared(
        &self,
        prepared: &Prepared,
        stdin: &str,
        time_limit_ms: u64,
    ) -> EngineResult<ExecutionOutcome> {
        let mut lifecycle =
            Lifecycle::resume(prepared.request_id, prepared.language, prepared.ready_state);
        lifecycle.advance(ExecutionState::Running);

        let command = match &prepared.run {
            Ok(command) => command,
            Err(missing) => {
                let outcome =
                    ExecutionOutcome::rejected(ExecutionState::RuntimeFailed, missing.to_string());
                return Ok(lifecycle.finish(outcome));
            }
        };

        let deadline = Duration::from_millis(time_limit_ms);
        let output = match self.runner.run(command, stdin, deadline).await {
            Ok(output) => output,
            Err(e) if e.is_not_found() => {
                let outcome = ExecutionOutcome::rejected(
                    ExecutionState::RuntimeFailed,
                    format!("toolchain missing: {}", e),
                );
                return Ok(lifecycle.finish(outcome));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::EXECUTION_DURATION
            .with_label_values(&[prepared.language.to_string().as_str()])
            .observe(output.elapsed_ms as f64 / 1000.0);

        Ok(lifecycle.finish(classify(output, time_limit_ms, self.config.max_output_bytes)))
    }

    pub fn validate_syntax(&self, source: &str, language: Language) -> SyntaxReport {
        syntax::validate(source, language, self.config.max_source_bytes)
    }

    /// Which toolchains are usable on this host
    pub async fn check_environment(&self) -> BTreeMap<String, bool> {
        let timeout = Duration::from_millis(self.config.probe_timeout_ms);
        probe::check_environment(&self.config.toolchains, &self.runner, timeout).await
    }

    /// Remove workspaces left behind by crashed processes
    pub async fn sweep_stale(&self, max_age: Duration) -> usize {
        self.workspaces.sweep_stale(max_age).await
    }
}

/// Map a finished run to its terminal outcome
/// A compiler that exits 0 without writing the artifact the run step needs
async fn missing_artifact(artifact: Option<&Path>) -> Option<ExecutionOutcome> {
    let artifact = artifact?;
    if tokio::fs::try_exists(artifact).await.unwrap_or(false) {
        return None;
    }
    let name = artifact
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.display().to_string());
    warn!(artifact = %artifact.display(), "Compiler reported success but produced no artifact");
    Some(ExecutionOutcome::rejected(
        ExecutionState::CompileFailed,
        format!("compiler produced no {}", name),
    ))
}

fn classify(output: ProcessOutput, time_limit_ms: u64, output_cap: usize) -> ExecutionOutcome {
    let (state, diagnostic) = if output.timed_out {
        (
            ExecutionState::TimedOut,
            Some(format!("execution exceeded time limit of {} ms", time_limit_ms)),
        )
    } else if output.exit_code == Some(0) {
        (ExecutionState::Completed, None)
    } else {
        let diagnostic = first_non_empty(&[&output.stderr])
            .map(str::to_string)
            .unwrap_or_else(|| describe_exit(&output));
        (ExecutionState::RuntimeFailed, Some(diagnostic))
    };

    let diagnostic = if output.truncated {
        let note = format!("output truncated at {} bytes", output_cap);
        Some(match diagnostic {
            Some(d) => format!("{}; {}", d, note),
            None => note,
        })
    } else {
        diagnostic
    };

    ExecutionOutcome {
        state,
        success: state == ExecutionState::Completed,
        stdout: output.stdout,
        stderr: output.stderr,
        elapsed_ms: output.elapsed_ms,
        exit_code: output.exit_code,
        timed_out: output.timed_out,
        diagnostic,
    }
}

fn first_non_empty<'a>(candidates: &[&'a String]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
}

fn describe_exit(output: &ProcessOutput) -> String {
    match (output.exit_code, output.signal) {
        (_, Some(11)) => "process terminated by signal 11 (segmentation fault)".to_string(),
        (_, Some(signal)) => format!("process terminated by signal {}", signal),
        (Some(code), None) => format!("process exited with code {}", code),
        (None, None) => "process ended without an exit status".to_string(),
    }
}
