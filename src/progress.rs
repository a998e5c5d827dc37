//! Progress events emitted while a build job runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{JobOutcome, JobState, ToolchainKind};
use crate::store::BuildStore;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started {
        job_id: Uuid,
        repo_id: String,
        kind: ToolchainKind,
        log_path: PathBuf,
        total_steps: usize,
    },

    StepStarted {
        index: usize,
        total: usize,
        label: String,
        command: String,
    },

    /// Emitted on every tick while a step's process is alive.
    Heartbeat {
        index: usize,
        label: String,
        elapsed: Duration,
    },

    StepFinished {
        index: usize,
        label: String,
        exit_code: Option<i32>,
        success: bool,
        elapsed: Duration,
    },

    Completed {
        state: JobState,
        log_path: PathBuf,
        elapsed: Duration,
    },
}

pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started {
                job_id,
                repo_id,
                kind,
                log_path,
                total_steps,
            } => {
                info!(
                    job = %job_id,
                    repo = %repo_id,
                    kind = %kind,
                    steps = total_steps,
                    log = %log_path.display(),
                    "Build started"
                );
            }
            ProgressEvent::StepStarted {
                index,
                total,
                label,
                command,
            } => {
                info!(step = index, total, label = %label, command = %command, "Step started");
            }
            ProgressEvent::Heartbeat {
                index,
                label,
                elapsed,
            } => {
                debug!(step = index, label = %label, elapsed_s = elapsed.as_secs(), "Still running");
            }
            ProgressEvent::StepFinished {
                index,
                label,
                exit_code,
                success,
                elapsed,
            } => {
                if *success {
                    info!(step = index, label = %label, elapsed_ms = elapsed.as_millis(), "Step finished");
                } else {
                    warn!(
                        step = index,
                        label = %label,
                        exit_code = ?exit_code,
                        elapsed_ms = elapsed.as_millis(),
                        "Step failed"
                    );
                }
            }
            ProgressEvent::Completed {
                state,
                log_path,
                elapsed,
            } => {
                info!(
                    state = ?state,
                    log = %log_path.display(),
                    elapsed_s = elapsed.as_secs(),
                    "Build finished"
                );
            }
        }
    }
}

/// Marks the target's last outcome as `Running` once a job is dispatched,
/// then forwards every event to `inner`. A process that dies mid-build leaves
/// that record behind, and it reads back as an interrupted, failed job.
pub struct OutcomeRecorder<'a> {
    store: &'a dyn BuildStore,
    inner: &'a dyn ProgressHandler,
}

impl<'a> OutcomeRecorder<'a> {
    pub fn new(store: &'a dyn BuildStore, inner: &'a dyn ProgressHandler) -> Self {
        Self { store, inner }
    }
}

impl ProgressHandler for OutcomeRecorder<'_> {
    fn on_progress(&self, event: &ProgressEvent) {
        if let ProgressEvent::Started {
            job_id,
            repo_id,
            log_path,
            ..
        } = event
        {
            let outcome = JobOutcome {
                job_id: *job_id,
                state: JobState::Running,
                exit_code: None,
                log_path: log_path.clone(),
                completed_at: None,
            };
            if let Err(err) = self.store.record_outcome(repo_id, &outcome) {
                warn!(repo = %repo_id, error = %err, "Failed to record running job");
            }
        }
        self.inner.on_progress(event);
    }
}

/// Terminal spinner refreshed on every heartbeat.
pub struct SpinnerHandler {
    bar: ProgressBar,
}

impl Default for SpinnerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinnerHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")
        {
            bar.set_style(style);
        }
        Self { bar }
    }
}

impl ProgressHandler for SpinnerHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { kind, log_path, .. } => {
                self.bar
                    .set_message(format!("Building with {kind} (log: {})", log_path.display()));
            }
            ProgressEvent::StepStarted {
                index,
                total,
                label,
                ..
            } => {
                self.bar.set_message(format!("[{index}/{total}] {label}"));
                self.bar.tick();
            }
            ProgressEvent::Heartbeat {
                index,
                label,
                elapsed,
            } => {
                self.bar
                    .set_message(format!("[{index}] {label} ({}s)", elapsed.as_secs()));
                self.bar.tick();
            }
            ProgressEvent::StepFinished {
                label,
                success: false,
                exit_code,
                ..
            } => {
                self.bar
                    .println(format!("step '{label}' failed (exit code {exit_code:?})"));
            }
            ProgressEvent::StepFinished { .. } => {}
            ProgressEvent::Completed {
                state, elapsed, ..
            } => {
                let verdict = match state {
                    JobState::Succeeded => "Build succeeded",
                    _ => "Build failed",
                };
                self.bar
                    .finish_with_message(format!("{verdict} in {}s", elapsed.as_secs()));
            }
        }
    }
}
