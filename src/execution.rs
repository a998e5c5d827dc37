use crate::core::{BuildConfig, BuildDescriptor, BuildJob, StepFailure};
use crate::error::BuildError;
use crate::exceptions;
use crate::jobs::JobRegistry;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::steps::{self, BuildStep, StepAction};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(1);

/// Redirects work from one directory tree to another, e.g. when sources were
/// copied to a faster mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl Relocation {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Parses `FROM=TO`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (from, to) = raw.split_once('=')?;
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() {
            return None;
        }
        Some(Self::new(from, to))
    }

    pub fn apply(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.from) {
            Ok(rest) => self.to.join(rest),
            Err(_) => path.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub log_dir: PathBuf,
    pub heartbeat: Duration,
    pub relocation: Option<Relocation>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("srcbuild-logs"),
            heartbeat: DEFAULT_HEARTBEAT,
            relocation: None,
        }
    }
}

/// Runs build steps as supervised child processes.
///
/// Every step writes stdout and stderr to the job's log file. The sequence
/// stops at the first failing step and nothing is retried.
#[derive(Clone, Default)]
pub struct ExecutionEngine {
    options: ExecutionOptions,
    registry: JobRegistry,
}

enum WorkerEvent {
    StepStarted {
        index: usize,
        total: usize,
        label: String,
        command: String,
    },
    StepFinished {
        index: usize,
        label: String,
        exit_code: Option<i32>,
        success: bool,
        elapsed: Duration,
    },
}

impl ExecutionEngine {
    pub fn new(options: ExecutionOptions) -> Self {
        Self {
            options,
            registry: JobRegistry::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn relocate_path(&self, path: &Path) -> PathBuf {
        match &self.options.relocation {
            Some(relocation) => relocation.apply(path),
            None => path.to_path_buf(),
        }
    }

    /// Applies the relocation hint, if any, to a descriptor.
    pub fn relocate(&self, descriptor: &BuildDescriptor) -> BuildDescriptor {
        BuildDescriptor {
            working_dir: self.relocate_path(&descriptor.working_dir),
            source_file: self.relocate_path(&descriptor.source_file),
            ..descriptor.clone()
        }
    }

    pub async fn execute(
        &self,
        descriptor: &BuildDescriptor,
        config: &BuildConfig,
        repo_id: &str,
        handler: &dyn ProgressHandler,
    ) -> Result<BuildJob, BuildError> {
        let descriptor = self.relocate(descriptor);
        let exception = exceptions::lookup(Some(repo_id), &descriptor.working_dir);
        if let Some(exception) = exception {
            info!(repo = repo_id, exception = exception.name, "Using project-specific build sequence");
        }
        for category in descriptor.kind.flag_categories() {
            let flags = config.flags(*category);
            if !flags.is_empty() {
                info!(repo = repo_id, key = category.key(), flags, "Passing configured flags");
            }
        }
        let steps = steps::steps_for(&descriptor, config, exception);
        self.execute_steps(&descriptor, repo_id, steps, handler).await
    }

    /// Runs an explicit step list for `descriptor`.
    pub async fn execute_steps(
        &self,
        descriptor: &BuildDescriptor,
        repo_id: &str,
        steps: Vec<BuildStep>,
        handler: &dyn ProgressHandler,
    ) -> Result<BuildJob, BuildError> {
        ensure_readable_dir(&descriptor.working_dir)?;

        let log_path = self.log_path_for(repo_id);
        let mut job = BuildJob::new(repo_id.to_string(), descriptor, log_path.clone());
        let _guard = self.registry.begin(repo_id, job.id)?;

        let mut log = create_log(&log_path)?;
        writeln!(
            log,
            "==> srcbuild job {} for '{}' ({}) in {}",
            job.id,
            repo_id,
            descriptor.kind,
            descriptor.working_dir.display()
        )?;
        preflight(&steps, &mut log)?;

        job.start()?;
        let started = Instant::now();
        handler.on_progress(&ProgressEvent::Started {
            job_id: job.id,
            repo_id: repo_id.to_string(),
            kind: descriptor.kind,
            log_path: log_path.clone(),
            total_steps: steps.len(),
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_steps(steps, log, tx));

        let mut ticker = tokio::time::interval(self.options.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        let mut current: Option<(usize, String, Instant)> = None;

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(WorkerEvent::StepStarted { index, total, label, command }) => {
                        current = Some((index, label.clone(), Instant::now()));
                        handler.on_progress(&ProgressEvent::StepStarted { index, total, label, command });
                    }
                    Some(WorkerEvent::StepFinished { index, label, exit_code, success, elapsed }) => {
                        current = None;
                        handler.on_progress(&ProgressEvent::StepFinished { index, label, exit_code, success, elapsed });
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some((index, label, since)) = &current {
                        handler.on_progress(&ProgressEvent::Heartbeat {
                            index: *index,
                            label: label.clone(),
                            elapsed: since.elapsed(),
                        });
                    }
                }
            }
        }

        let failure = worker
            .await
            .map_err(|err| BuildError::WorkerLost(err.to_string()))??;

        let mut log = OpenOptions::new().append(true).open(&log_path)?;
        match failure {
            None => {
                writeln!(log, "==> build succeeded")?;
                job.succeed()?;
                info!(repo = repo_id, job = %job.id, "Build succeeded");
            }
            Some(failure) => {
                writeln!(log, "==> build failed at step {} ({})", failure.index, failure.label)?;
                warn!(
                    repo = repo_id,
                    job = %job.id,
                    step = failure.index,
                    label = %failure.label,
                    log = %log_path.display(),
                    "Build failed"
                );
                job.fail(failure)?;
            }
        }

        self.registry.finish(&job);
        handler.on_progress(&ProgressEvent::Completed {
            state: job.state,
            log_path,
            elapsed: started.elapsed(),
        });
        debug_assert!(job.state.is_terminal());
        Ok(job)
    }

    fn log_path_for(&self, repo_id: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
        self.options
            .log_dir
            .join(format!("{}-{stamp}-{suffix}.log", sanitize(repo_id)))
    }
}

fn sanitize(repo_id: &str) -> String {
    let cleaned: String = repo_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "target".to_string()
    } else {
        cleaned
    }
}

fn ensure_readable_dir(dir: &Path) -> Result<(), BuildError> {
    match fs::read_dir(dir) {
        Ok(_) => Ok(()),
        Err(_) => Err(BuildError::WorkingDirMissing(dir.to_path_buf())),
    }
}

fn create_log(path: &Path) -> Result<File, BuildError> {
    let log_err = |source| BuildError::LogCreate {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(log_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_err)
}

fn preflight(steps: &[BuildStep], log: &mut File) -> std::io::Result<()> {
    for step in steps {
        if let StepAction::Run { program, .. } = &step.action {
            // Relative programs may live in a directory an earlier step creates.
            if program.contains('/') && !step.cwd.exists() {
                continue;
            }
            if !steps::program_available(program, &step.cwd) {
                warn!(program = %program, step = %step.label, "Program not found");
                writeln!(log, "==> warning: '{program}' was not found")?;
            }
        }
    }
    Ok(())
}

async fn run_steps(
    steps: Vec<BuildStep>,
    mut log: File,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> Result<Option<StepFailure>, BuildError> {
    let total = steps.len();
    for (position, step) in steps.into_iter().enumerate() {
        let index = position + 1;
        let command = step.action.to_string();
        writeln!(log, "==> [{index}/{total}] {}: {command}", step.label)?;
        let _ = events.send(WorkerEvent::StepStarted {
            index,
            total,
            label: step.label.clone(),
            command,
        });

        let started = Instant::now();
        let result = run_step(&step, &log).await;
        let elapsed = started.elapsed();

        let (exit_code, failure_reason) = match result {
            Ok(Some(0)) => (Some(0), None),
            Ok(code) => (
                code,
                Some(match code {
                    Some(code) => format!("exit status {code}"),
                    None => "terminated by signal".to_string(),
                }),
            ),
            Err(reason) => (None, Some(reason)),
        };

        match exit_code {
            Some(code) => writeln!(log, "==> [{index}/{total}] exit status: {code}")?,
            None => writeln!(log, "==> [{index}/{total}] {}", failure_reason.as_deref().unwrap_or("failed"))?,
        }
        let success = failure_reason.is_none();
        let _ = events.send(WorkerEvent::StepFinished {
            index,
            label: step.label.clone(),
            exit_code,
            success,
            elapsed,
        });

        if let Some(reason) = failure_reason {
            debug!(step = index, label = %step.label, reason = %reason, "Stopping step sequence");
            return Ok(Some(StepFailure {
                index,
                program: step.program().to_string(),
                label: step.label,
                exit_code,
                reason,
            }));
        }
    }
    Ok(None)
}

/// Returns the exit code (`None` when killed by a signal), or a reason when
/// the step could not run at all.
async fn run_step(step: &BuildStep, log: &File) -> Result<Option<i32>, String> {
    match &step.action {
        StepAction::CreateDir(dir) => tokio::fs::create_dir_all(dir)
            .await
            .map(|_| Some(0))
            .map_err(|err| format!("failed to create {}: {err}", dir.display())),
        StepAction::Run { program, args } => {
            let stdout = log.try_clone().map_err(|err| err.to_string())?;
            let stderr = log.try_clone().map_err(|err| err.to_string())?;
            let mut child = Command::new(program)
                .args(args)
                .current_dir(&step.cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::from(stdout))
                .stderr(Stdio::from(stderr))
                .spawn()
                .map_err(|err| format!("failed to start '{program}': {err}"))?;
            let status = child
                .wait()
                .await
                .map_err(|err| format!("failed to wait for '{program}': {err}"))?;
            Ok(status.code())
        }
    }
}
