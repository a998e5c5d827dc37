//! Per-project build exceptions.
//!
//! A handful of well-known trees cannot be built with the generic sequence of
//! their toolchain. Each one gets a declarative record here: how to recognise
//! it and what to change in the generic steps. The table is closed; adding a
//! project means adding a record, not code.

use std::fs;
use std::path::Path;

use crate::core::ToolchainKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Target identity, compared case-insensitively.
    TargetName(&'static str),
    /// A root-level file whose contents include `marker`.
    RootFileContains {
        file: &'static str,
        marker: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildException {
    pub name: &'static str,
    pub matcher: Matcher,
    pub kind: ToolchainKind,
    /// Directory under the tree root the build runs in.
    pub subdir: Option<&'static str>,
    pub configure_args: &'static [&'static str],
    pub make_args: &'static [&'static str],
}

pub const EXCEPTIONS: &[BuildException] = &[
    BuildException {
        name: "atari800",
        matcher: Matcher::TargetName("atari800"),
        kind: ToolchainKind::Autogen,
        subdir: None,
        configure_args: &["--target=default"],
        make_args: &[],
    },
    BuildException {
        name: "mame",
        matcher: Matcher::RootFileContains {
            file: "makefile",
            marker: "MAME",
        },
        kind: ToolchainKind::Make,
        subdir: None,
        configure_args: &[],
        make_args: &["REGENIE=1"],
    },
    BuildException {
        name: "vice",
        matcher: Matcher::TargetName("vice"),
        kind: ToolchainKind::Autogen,
        subdir: Some("vice"),
        configure_args: &[],
        make_args: &[],
    },
];

/// Only the first 64 KiB of a marker file are searched.
const MARKER_SCAN_LIMIT: usize = 64 * 1024;

impl BuildException {
    pub fn matches(&self, target_name: Option<&str>, root: &Path) -> bool {
        match self.matcher {
            Matcher::TargetName(name) => {
                target_name.is_some_and(|target| target.eq_ignore_ascii_case(name))
            }
            Matcher::RootFileContains { file, marker } => file_contains(&root.join(file), marker),
        }
    }

    pub fn working_dir(&self, root: &Path) -> std::path::PathBuf {
        match self.subdir {
            Some(sub) => root.join(sub),
            None => root.to_path_buf(),
        }
    }

    /// The file that identifies this project inside its working directory.
    pub fn source_file(&self, root: &Path) -> std::path::PathBuf {
        let dir = self.working_dir(root);
        match self.matcher {
            Matcher::RootFileContains { file, .. } => root.join(file),
            Matcher::TargetName(_) => match self.kind {
                ToolchainKind::Autogen => dir.join("autogen.sh"),
                ToolchainKind::Make => dir.join("Makefile"),
                ToolchainKind::CMake => dir.join("CMakeLists.txt"),
                _ => dir,
            },
        }
    }
}

/// Finds the exception record for a target, by name or by root signature.
pub fn lookup(target_name: Option<&str>, root: &Path) -> Option<&'static BuildException> {
    EXCEPTIONS
        .iter()
        .find(|exception| exception.matches(target_name, root))
}

/// Exceptions recognisable from the tree alone, without knowing the target name.
pub fn root_signature(root: &Path) -> Option<&'static BuildException> {
    EXCEPTIONS.iter().find(|exception| {
        matches!(exception.matcher, Matcher::RootFileContains { .. }) && exception.matches(None, root)
    })
}

fn file_contains(path: &Path, marker: &str) -> bool {
    if !path.is_file() {
        return false;
    }
    match fs::read(path) {
        Ok(bytes) => {
            let end = bytes.len().min(MARKER_SCAN_LIMIT);
            String::from_utf8_lossy(&bytes[..end]).contains(marker)
        }
        Err(_) => false,
    }
}
