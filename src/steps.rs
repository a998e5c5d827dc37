//! Fixed command sequences per toolchain.
//!
//! Each toolchain kind has one handler returning its ordered steps. Steps are
//! programs plus argument vectors, never shell pipelines.

use serde::Serialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::{BuildConfig, BuildDescriptor, ToolchainKind};
use crate::detection::is_executable_file;
use crate::exceptions::BuildException;

pub const BUILD_SUBDIR: &str = "build";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepAction {
    CreateDir(PathBuf),
    Run { program: String, args: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    pub label: String,
    pub action: StepAction,
    pub cwd: PathBuf,
}

impl BuildStep {
    pub fn run<I, S>(label: &str, cwd: &Path, program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.to_string(),
            action: StepAction::Run {
                program: program.to_string(),
                args: args.into_iter().map(Into::into).collect(),
            },
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn create_dir(label: &str, cwd: &Path, dir: PathBuf) -> Self {
        Self {
            label: label.to_string(),
            action: StepAction::CreateDir(dir),
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn program(&self) -> &str {
        match &self.action {
            StepAction::CreateDir(_) => "mkdir",
            StepAction::Run { program, .. } => program,
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepAction::CreateDir(dir) => write!(f, "mkdir -p {}", dir.display()),
            StepAction::Run { program, args } => {
                f.write_str(program)?;
                for arg in args {
                    if arg.contains(char::is_whitespace) {
                        write!(f, " '{arg}'")?;
                    } else {
                        write!(f, " {arg}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// The ordered steps for `descriptor`, with `exception` adjustments applied.
pub fn steps_for(
    descriptor: &BuildDescriptor,
    config: &BuildConfig,
    exception: Option<&BuildException>,
) -> Vec<BuildStep> {
    let dir = descriptor.working_dir.as_path();
    let extra_configure = exception.map(|e| e.configure_args).unwrap_or_default();
    let extra_make = exception.map(|e| e.make_args).unwrap_or_default();

    match descriptor.kind {
        ToolchainKind::CMake => cmake_steps(dir, config, extra_make),
        ToolchainKind::Autogen => {
            let mut steps = vec![script_step("autogen", dir, "autogen.sh", Vec::new())];
            steps.extend(configure_make_steps(dir, config, extra_configure, extra_make));
            steps
        }
        ToolchainKind::Autotools | ToolchainKind::CustomConfigure => {
            configure_make_steps(dir, config, extra_configure, extra_make)
        }
        ToolchainKind::Make => vec![make_step(dir, config, extra_make)],
        ToolchainKind::Gradle => vec![gradle_step(dir)],
        ToolchainKind::Maven => vec![BuildStep::run("maven", dir, "mvn", ["clean", "install"])],
        ToolchainKind::Python => vec![BuildStep::run(
            "setup.py",
            dir,
            "python3",
            ["setup.py", "build"],
        )],
        ToolchainKind::Node => vec![
            BuildStep::run("npm install", dir, "npm", ["install"]),
            BuildStep::run("npm build", dir, "npm", ["run", "build"]),
        ],
        ToolchainKind::Meson => meson_steps(dir, config),
    }
}

fn cmake_steps(dir: &Path, config: &BuildConfig, extra_make: &[&str]) -> Vec<BuildStep> {
    let build_dir = dir.join(BUILD_SUBDIR);
    let mut cmake_args = split_flags(&config.cmake_flags);
    cmake_args.push("..".to_string());
    vec![
        BuildStep::create_dir("build directory", dir, build_dir.clone()),
        BuildStep::run("cmake", &build_dir, "cmake", cmake_args),
        make_step(&build_dir, config, extra_make),
    ]
}

fn configure_make_steps(
    dir: &Path,
    config: &BuildConfig,
    extra_configure: &[&str],
    extra_make: &[&str],
) -> Vec<BuildStep> {
    let mut args: Vec<String> = extra_configure.iter().map(|a| a.to_string()).collect();
    args.extend(split_flags(&config.configure_flags));
    vec![
        script_step("configure", dir, "configure", args),
        make_step(dir, config, extra_make),
    ]
}

fn make_step(dir: &Path, config: &BuildConfig, extra: &[&str]) -> BuildStep {
    let mut args: Vec<String> = extra.iter().map(|a| a.to_string()).collect();
    args.extend(split_flags(&config.make_flags));
    BuildStep::run("make", dir, "make", args)
}

/// Runs `./<script>` directly when executable, through `sh` otherwise.
fn script_step(label: &str, dir: &Path, script: &str, args: Vec<String>) -> BuildStep {
    if is_executable_file(&dir.join(script)) {
        BuildStep::run(label, dir, &format!("./{script}"), args)
    } else {
        let mut sh_args = vec![script.to_string()];
        sh_args.extend(args);
        BuildStep::run(label, dir, "sh", sh_args)
    }
}

fn gradle_step(dir: &Path) -> BuildStep {
    if is_executable_file(&dir.join("gradlew")) {
        BuildStep::run("gradle", dir, "./gradlew", ["build"])
    } else {
        BuildStep::run("gradle", dir, "gradle", ["build"])
    }
}

fn meson_steps(dir: &Path, config: &BuildConfig) -> Vec<BuildStep> {
    let mut setup_args = vec!["setup".to_string(), BUILD_SUBDIR.to_string()];
    setup_args.extend(split_flags(&config.configure_flags));
    vec![
        BuildStep::run("meson setup", dir, "meson", setup_args),
        BuildStep::run("ninja", dir, "ninja", ["-C", BUILD_SUBDIR]),
    ]
}

/// Splits a flag string on whitespace, keeping quoted groups together.
pub fn split_flags(flags: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in flags.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    out.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        out.push(current);
    }
    out
}

/// Whether `program` can be spawned from `cwd`.
pub fn program_available(program: &str, cwd: &Path) -> bool {
    if program.contains('/') {
        return is_executable_file(&cwd.join(program));
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| is_executable_file(&dir.join(program))))
        .unwrap_or(false)
}
