use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::browser::{select_binary, Prompter, Selection};
use crate::config::{self, commit_proposal, find_override_document, resolve};
use crate::core::BuildDescriptor;
use crate::detection::{self, Classification};
use crate::execution::ExecutionEngine;
use crate::locator;
use crate::progress::{LoggingHandler, OutcomeRecorder, ProgressHandler, SpinnerHandler};
use crate::settings::Settings;
use crate::store::{BuildStore, JsonFileStore};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Detects, builds and locates the output of arbitrary source trees
#[derive(Parser, Debug)]
#[command(name = "srcbuild", version, about)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Verbose logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the build systems found in a source tree
    Detect(DetectArgs),
    /// Build a source tree and register its binary
    Build(BuildArgs),
    /// Search a built tree for executables
    Locate(LocateArgs),
    /// Show what is stored for a target
    Show(ShowArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    #[arg(long, value_name = "N", help = "Initial search depth")]
    pub max_depth: Option<usize>,

    #[arg(short = 'f', long, value_enum, default_value = "human")]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    #[arg(long, value_name = "ID", help = "Target identity (defaults to the directory name)")]
    pub id: Option<String>,

    #[arg(long, value_name = "N", help = "Pick the N-th detected build system (1-based)")]
    pub choice: Option<usize>,

    #[arg(
        short = 'y',
        long,
        help = "Accept override documents and the first binary candidate; \
                the browser still opens when no candidate is found"
    )]
    pub yes: bool,

    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    #[arg(long, help = "Log progress instead of drawing a spinner")]
    pub no_spinner: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LocateArgs {
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    #[arg(short = 'n', long, value_name = "NAME")]
    pub name: String,

    #[arg(short = 'f', long, value_enum, default_value = "human")]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[arg(value_name = "ID")]
    pub id: String,

    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,
}

pub fn handle_detect(args: &DetectArgs, settings: &Settings) -> i32 {
    let depth = args.max_depth.unwrap_or(settings.max_depth).max(1);
    let classification = detection::classify_with_escalation(&args.path, depth);

    match args.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&classification) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("Failed to serialise result: {err}");
                return EXIT_FAILURE;
            }
        },
        OutputFormat::Human => print_classification(&classification),
    }

    if classification.is_empty() {
        EXIT_FAILURE
    } else {
        EXIT_OK
    }
}

fn print_classification(classification: &Classification) {
    if classification.is_empty() {
        println!(
            "No build system found (searched to depth {})",
            classification.depth_searched
        );
        return;
    }
    for (i, descriptor) in classification.descriptors.iter().enumerate() {
        println!(
            "{}) {:<16} {}",
            i + 1,
            descriptor.kind.to_string(),
            descriptor.working_dir.display()
        );
    }
}

pub fn handle_locate(args: &LocateArgs, settings: &Settings) -> i32 {
    let report = locator::locate_with_report(&settings.relocate(&args.path), &args.name);
    match args.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("Failed to serialise result: {err}");
                return EXIT_FAILURE;
            }
        },
        OutputFormat::Human => {
            for candidate in &report.candidates {
                println!("{}", candidate.path.display());
            }
        }
    }
    if report.candidates.is_empty() {
        EXIT_FAILURE
    } else {
        EXIT_OK
    }
}

pub fn handle_show(args: &ShowArgs, settings: &Settings) -> i32 {
    let store = JsonFileStore::new(args.state.clone().unwrap_or_else(|| settings.state_path.clone()));
    match store.load(&args.id) {
        Ok(Some(record)) => {
            if let Some(outcome) = &record.last_outcome {
                if outcome.effective_state() != outcome.state {
                    eprintln!("Last build was interrupted; its log is incomplete.");
                }
            }
            match serde_json::to_string_pretty(&record) {
                Ok(json) => {
                    println!("{json}");
                    EXIT_OK
                }
                Err(err) => {
                    eprintln!("Failed to serialise record: {err}");
                    EXIT_FAILURE
                }
            }
        }
        Ok(None) => {
            eprintln!("No record for '{}'", args.id);
            EXIT_FAILURE
        }
        Err(err) => {
            eprintln!("Error: {err}");
            EXIT_FAILURE
        }
    }
}

pub async fn handle_build(args: &BuildArgs, settings: &Settings, quiet: bool) -> i32 {
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());
    match run_build(args, settings, quiet, &mut prompter).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            EXIT_FAILURE
        }
    }
}

/// Classify, resolve, execute and locate for one target.
pub async fn run_build<R: BufRead, W: Write>(
    args: &BuildArgs,
    settings: &Settings,
    quiet: bool,
    prompter: &mut Prompter<R, W>,
) -> Result<i32> {
    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("Source tree not found: {}", args.path.display()))?;
    let repo_id = match &args.id {
        Some(id) => id.clone(),
        None => root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Cannot derive a target id from {}", root.display()))?,
    };

    let mut options = settings.execution_options();
    if let Some(dir) = &args.log_dir {
        options.log_dir = dir.clone();
    }
    let engine = ExecutionEngine::new(options);
    let store = JsonFileStore::new(args.state.clone().unwrap_or_else(|| settings.state_path.clone()));
    let stored = store.load(&repo_id).context("Failed to read stored configuration")?;

    let detected = match stored.as_ref().and_then(|record| record.build_file.as_ref()) {
        Some(forced) => {
            info!(repo = %repo_id, file = %forced.display(), "Using forced build file");
            config::descriptor_from_build_file(&root.join(forced))?
        }
        None => match pick_descriptor(&root, args, settings, prompter)? {
            Pick::Chosen(descriptor) => descriptor,
            Pick::Exit(code) => return Ok(code),
        },
    };

    let document = find_override_document(&root)?;
    let mut resolution = resolve(&repo_id, &root, &detected, stored.as_ref(), document.as_ref())?;
    if let Some(proposal) = resolution.proposal.take() {
        println!("Override document found:");
        for line in &proposal.summary {
            println!("  {line}");
        }
        if args.yes || prompter.confirm("Apply these settings?")? {
            commit_proposal(&store, &repo_id, &proposal).context("Failed to store override values")?;
        } else {
            resolution = resolve(&repo_id, &root, &detected, stored.as_ref(), None)?;
        }
    }
    let resolved = resolution.resolved;
    debug!(config = ?resolved.config, "Resolved configuration");

    if !resolved.config.dependencies.is_empty() {
        let deps: Vec<&str> = resolved.config.dependencies.iter().map(String::as_str).collect();
        println!("Declared dependencies: {}", deps.join(" "));
    }

    let handler: Arc<dyn ProgressHandler> = if args.no_spinner || quiet {
        Arc::new(LoggingHandler)
    } else {
        Arc::new(SpinnerHandler::new())
    };
    let recorder = OutcomeRecorder::new(&store, handler.as_ref());
    let job = engine
        .execute(&resolved.descriptor, &resolved.config, &repo_id, &recorder)
        .await?;
    if let Err(err) = store.record_outcome(&repo_id, &job.outcome()) {
        warn!(error = %err, "Failed to record build outcome");
    }

    if let Some(failure) = &job.failure {
        eprintln!(
            "Build failed at step {} ({}, {}): {}",
            failure.index, failure.label, resolved.descriptor.kind, failure.reason
        );
        eprintln!("Log: {}", job.log_path.display());
        if !args.yes && prompter.confirm("Show the build log?")? {
            let log = fs::read_to_string(&job.log_path)
                .with_context(|| format!("Failed to read {}", job.log_path.display()))?;
            println!("{log}");
        }
        return Ok(EXIT_FAILURE);
    }

    let search_root = engine.relocate_path(&root);
    if let Some(known) = resolved.binary_path.as_ref().map(|p| engine.relocate_path(p)) {
        if known.is_file() {
            println!("Binary: {}", known.display());
            store.record_binary(&repo_id, &known)?;
            return Ok(EXIT_OK);
        }
        warn!(path = %known.display(), "Configured binary path does not exist, searching");
    }

    let target_name = store
        .load(&repo_id)?
        .and_then(|record| record.repo_name)
        .unwrap_or_else(|| repo_id.clone());
    let candidates = locator::locate(&search_root, &target_name);

    // An empty list always ends in the browser, even with --yes.
    let selection = match candidates.first() {
        Some(candidate) if args.yes => Selection::Selected(candidate.path.clone()),
        _ => select_binary(prompter, &candidates, &search_root)?,
    };

    match selection {
        Selection::Selected(path) => {
            store.record_binary(&repo_id, &path)?;
            println!("Binary: {}", path.display());
        }
        Selection::Aborted => println!("No binary registered for this build."),
    }
    Ok(EXIT_OK)
}

enum Pick {
    Chosen(BuildDescriptor),
    Exit(i32),
}

fn pick_descriptor<R: BufRead, W: Write>(
    root: &Path,
    args: &BuildArgs,
    settings: &Settings,
    prompter: &mut Prompter<R, W>,
) -> Result<Pick> {
    let classification = detection::classify_with_escalation(root, settings.max_depth);
    if classification.is_empty() {
        eprintln!(
            "No build system found in {} (searched to depth {})",
            root.display(),
            classification.depth_searched
        );
        return Ok(Pick::Exit(EXIT_FAILURE));
    }

    let descriptors = classification.descriptors;
    let index = match args.choice {
        Some(n) if (1..=descriptors.len()).contains(&n) => n - 1,
        Some(n) => {
            eprintln!("--choice {n} is out of range (1-{})", descriptors.len());
            return Ok(Pick::Exit(EXIT_USAGE));
        }
        None if args.yes => 0,
        None => match prompter.choose_descriptor(&descriptors)? {
            Some(i) => i,
            None => {
                println!("Build cancelled.");
                return Ok(Pick::Exit(EXIT_FAILURE));
            }
        },
    };
    Ok(Pick::Chosen(descriptors[index].clone()))
}
