use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolchainKind {
    CMake,
    Autotools,
    Autogen,
    CustomConfigure,
    Make,
    Python,
    Node,
    Meson,
    Gradle,
    Maven,
}

impl ToolchainKind {
    pub const ALL: [ToolchainKind; 10] = [
        ToolchainKind::CMake,
        ToolchainKind::Autotools,
        ToolchainKind::Autogen,
        ToolchainKind::CustomConfigure,
        ToolchainKind::Make,
        ToolchainKind::Python,
        ToolchainKind::Node,
        ToolchainKind::Meson,
        ToolchainKind::Gradle,
        ToolchainKind::Maven,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolchainKind::CMake => "cmake",
            ToolchainKind::Autotools => "autotools",
            ToolchainKind::Autogen => "autogen",
            ToolchainKind::CustomConfigure => "custom-configure",
            ToolchainKind::Make => "make",
            ToolchainKind::Python => "python",
            ToolchainKind::Node => "node",
            ToolchainKind::Meson => "meson",
            ToolchainKind::Gradle => "gradle",
            ToolchainKind::Maven => "maven",
        }
    }

    /// Parses a build method as written in override documents.
    pub fn from_method(method: &str) -> Option<Self> {
        let kind = match method.trim().to_ascii_lowercase().as_str() {
            "cmake" => ToolchainKind::CMake,
            "autotools" | "autoconf" => ToolchainKind::Autotools,
            "autogen" => ToolchainKind::Autogen,
            "configure" | "custom-configure" | "custom_configure" => {
                ToolchainKind::CustomConfigure
            }
            "make" | "makefile" => ToolchainKind::Make,
            "python" | "setup.py" => ToolchainKind::Python,
            "node" | "npm" => ToolchainKind::Node,
            "meson" => ToolchainKind::Meson,
            "gradle" => ToolchainKind::Gradle,
            "maven" | "mvn" => ToolchainKind::Maven,
            _ => return None,
        };
        Some(kind)
    }

    /// Infers the toolchain from a build file name, used for forced build files.
    pub fn from_build_file(file_name: &str) -> Option<Self> {
        let kind = match file_name {
            "CMakeLists.txt" => ToolchainKind::CMake,
            "autogen.sh" | "configure.ac" | "configure.in" => ToolchainKind::Autogen,
            "configure" => ToolchainKind::CustomConfigure,
            "Makefile" | "makefile" | "GNUmakefile" => ToolchainKind::Make,
            "setup.py" => ToolchainKind::Python,
            "package.json" => ToolchainKind::Node,
            "meson.build" => ToolchainKind::Meson,
            "build.gradle" | "build.gradle.kts" => ToolchainKind::Gradle,
            "pom.xml" => ToolchainKind::Maven,
            _ => return None,
        };
        Some(kind)
    }

    /// Flag categories this toolchain passes through to its steps.
    pub fn flag_categories(self) -> &'static [FlagCategory] {
        match self {
            ToolchainKind::CMake => &[FlagCategory::CMake, FlagCategory::Make],
            ToolchainKind::Autotools | ToolchainKind::Autogen | ToolchainKind::CustomConfigure => {
                &[FlagCategory::Configure, FlagCategory::Make]
            }
            ToolchainKind::Make => &[FlagCategory::Make],
            ToolchainKind::Meson => &[FlagCategory::Configure],
            ToolchainKind::Python
            | ToolchainKind::Node
            | ToolchainKind::Gradle
            | ToolchainKind::Maven => &[],
        }
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagCategory {
    Configure,
    Make,
    CMake,
}

impl FlagCategory {
    /// The override document key for this category.
    pub fn key(self) -> &'static str {
        match self {
            FlagCategory::Configure => "CONFIGURE_FLAGS",
            FlagCategory::Make => "MAKE_FLAGS",
            FlagCategory::CMake => "CMAKE_FLAGS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDescriptor {
    pub kind: ToolchainKind,
    pub working_dir: PathBuf,
    pub source_file: PathBuf,
    pub description: String,
}

impl BuildDescriptor {
    pub fn new(kind: ToolchainKind, working_dir: PathBuf, source_file: PathBuf) -> Self {
        let description = format!("{} ({})", kind, source_file.display());
        Self {
            kind,
            working_dir,
            source_file,
            description,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub configure_flags: String,
    pub make_flags: String,
    pub cmake_flags: String,
    pub dependencies: BTreeSet<String>,
}

impl BuildConfig {
    pub fn flags(&self, category: FlagCategory) -> &str {
        match category {
            FlagCategory::Configure => &self.configure_flags,
            FlagCategory::Make => &self.make_flags,
            FlagCategory::CMake => &self.cmake_flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryCandidate {
    pub path: PathBuf,
    pub is_executable: bool,
    pub matches_target_name: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// Where a failed job stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// 1-based position in the step sequence.
    pub index: usize,
    pub label: String,
    pub program: String,
    /// `None` when the step could not be spawned or was killed by a signal.
    pub exit_code: Option<i32>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: Uuid,
    pub repo_id: String,
    pub kind: ToolchainKind,
    pub working_dir: PathBuf,
    pub state: JobState,
    pub log_path: PathBuf,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub exit_code: Option<i32>,
    pub failure: Option<StepFailure>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl BuildJob {
    pub fn new(repo_id: String, descriptor: &BuildDescriptor, log_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo_id,
            kind: descriptor.kind,
            working_dir: descriptor.working_dir.clone(),
            state: JobState::Pending,
            log_path,
            created_at: unix_now(),
            started_at: None,
            completed_at: None,
            exit_code: None,
            failure: None,
        }
    }

    pub fn start(&mut self) -> Result<(), BuildError> {
        self.transition(JobState::Running)?;
        self.started_at = Some(unix_now());
        Ok(())
    }

    pub fn succeed(&mut self) -> Result<(), BuildError> {
        self.transition(JobState::Succeeded)?;
        self.completed_at = Some(unix_now());
        self.exit_code = Some(0);
        Ok(())
    }

    pub fn fail(&mut self, failure: StepFailure) -> Result<(), BuildError> {
        self.transition(JobState::Failed)?;
        self.completed_at = Some(unix_now());
        self.exit_code = failure.exit_code;
        self.failure = Some(failure);
        Ok(())
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }

    fn transition(&mut self, next: JobState) -> Result<(), BuildError> {
        let allowed = matches!(
            (self.state, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        );
        if !allowed {
            return Err(BuildError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn outcome(&self) -> JobOutcome {
        JobOutcome {
            job_id: self.id,
            state: self.state,
            exit_code: self.exit_code,
            log_path: self.log_path.clone(),
            completed_at: self.completed_at,
        }
    }
}

/// What the store keeps about the most recent job of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub log_path: PathBuf,
    pub completed_at: Option<u64>,
}

impl JobOutcome {
    /// A job recorded as still pending or running was interrupted before it
    /// could finish; its log is incomplete and it counts as failed.
    pub fn effective_state(&self) -> JobState {
        match self.state {
            JobState::Pending | JobState::Running => JobState::Failed,
            state => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> BuildDescriptor {
        BuildDescriptor::new(
            ToolchainKind::Make,
            PathBuf::from("/src"),
            PathBuf::from("/src/Makefile"),
        )
    }

    #[test]
    fn job_follows_lifecycle() {
        let mut job = BuildJob::new("demo".into(), &descriptor(), PathBuf::from("/tmp/x.log"));
        assert_eq!(job.state, JobState::Pending);
        job.start().unwrap();
        job.succeed().unwrap();
        assert!(job.succeeded());
        assert_eq!(job.exit_code, Some(0));
    }

    #[test]
    fn terminal_state_is_final() {
        let mut job = BuildJob::new("demo".into(), &descriptor(), PathBuf::from("/tmp/x.log"));
        job.start().unwrap();
        job.fail(StepFailure {
            index: 1,
            label: "make".into(),
            program: "make".into(),
            exit_code: Some(2),
            reason: "exit status 2".into(),
        })
        .unwrap();
        assert!(job.start().is_err());
        assert!(job.succeed().is_err());
        assert_eq!(job.state, JobState::Failed);
    }

    #[test]
    fn pending_cannot_finish() {
        let mut job = BuildJob::new("demo".into(), &descriptor(), PathBuf::from("/tmp/x.log"));
        assert!(job.succeed().is_err());
    }

    #[test]
    fn every_kind_parses_from_its_name() {
        for kind in ToolchainKind::ALL {
            assert_eq!(ToolchainKind::from_method(kind.name()), Some(kind));
        }
    }

    #[test]
    fn build_method_aliases() {
        assert_eq!(ToolchainKind::from_method("CMake"), Some(ToolchainKind::CMake));
        assert_eq!(ToolchainKind::from_method("npm"), Some(ToolchainKind::Node));
        assert_eq!(
            ToolchainKind::from_method("configure"),
            Some(ToolchainKind::CustomConfigure)
        );
        assert_eq!(ToolchainKind::from_method("scons"), None);
    }
}
