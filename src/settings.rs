//! Runtime settings.
//!
//! Read from the environment with defaults; CLI flags override afterwards.
//!
//! - `SRCBUILD_LOG_DIR`: directory for job logs, default `<tmp>/srcbuild-logs`
//! - `SRCBUILD_STATE`: JSON store path, default `<tmp>/srcbuild-state.json`
//! - `SRCBUILD_MAX_DEPTH`: initial classifier depth, default 2
//! - `SRCBUILD_HEARTBEAT_MS`: progress heartbeat interval, default 1000
//! - `SRCBUILD_RELOCATE`: `FROM=TO` working-directory relocation

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::detection::DEFAULT_MAX_DEPTH;
use crate::execution::{ExecutionOptions, Relocation, DEFAULT_HEARTBEAT};

#[derive(Debug, Clone)]
pub struct Settings {
    pub log_dir: PathBuf,
    pub state_path: PathBuf,
    pub max_depth: usize,
    pub heartbeat: Duration,
    pub relocation: Option<Relocation>,
}

impl Default for Settings {
    fn default() -> Self {
        let tmp = env::temp_dir();
        Self {
            log_dir: tmp.join("srcbuild-logs"),
            state_path: tmp.join("srcbuild-state.json"),
            max_depth: DEFAULT_MAX_DEPTH,
            heartbeat: DEFAULT_HEARTBEAT,
            relocation: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(dir) = lookup("SRCBUILD_LOG_DIR").filter(|v| !v.is_empty()) {
            settings.log_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("SRCBUILD_STATE").filter(|v| !v.is_empty()) {
            settings.state_path = PathBuf::from(path);
        }
        if let Some(depth) = parse_or_warn::<usize>("SRCBUILD_MAX_DEPTH", lookup("SRCBUILD_MAX_DEPTH")) {
            settings.max_depth = depth.max(1);
        }
        if let Some(ms) = parse_or_warn::<u64>("SRCBUILD_HEARTBEAT_MS", lookup("SRCBUILD_HEARTBEAT_MS")) {
            settings.heartbeat = Duration::from_millis(ms.max(10));
        }
        if let Some(raw) = lookup("SRCBUILD_RELOCATE") {
            settings.relocation = Relocation::parse(&raw);
            if settings.relocation.is_none() {
                warn!(value = %raw, "Ignoring malformed SRCBUILD_RELOCATE, expected FROM=TO");
            }
        }
        settings
    }

    /// Applies the relocation hint to an already-built tree.
    pub fn relocate(&self, path: &Path) -> PathBuf {
        let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        match &self.relocation {
            Some(relocation) => relocation.apply(&absolute),
            None => absolute,
        }
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            log_dir: self.log_dir.clone(),
            heartbeat: self.heartbeat,
            relocation: self.relocation.clone(),
        }
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Invalid setting, using default");
            None
        }
    }
}
