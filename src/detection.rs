use crate::core::{BuildDescriptor, ToolchainKind};
use crate::exceptions;
use serde::Serialize;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

pub const DEFAULT_MAX_DEPTH: usize = 2;
pub const ESCALATED_MAX_DEPTH: usize = 3;

const MAKEFILE_NAMES: [&str; 3] = ["Makefile", "makefile", "GNUmakefile"];
const SKIPPED_DIRS: [&str; 1] = ["node_modules"];

/// Single-purpose build files. They never compete with each other or with
/// the configure/cmake/make group.
const STANDALONE_SIGNATURES: [(&str, ToolchainKind); 6] = [
    ("setup.py", ToolchainKind::Python),
    ("package.json", ToolchainKind::Node),
    ("meson.build", ToolchainKind::Meson),
    ("build.gradle", ToolchainKind::Gradle),
    ("build.gradle.kts", ToolchainKind::Gradle),
    ("pom.xml", ToolchainKind::Maven),
];

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub descriptors: Vec<BuildDescriptor>,
    pub depth_searched: usize,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

pub async fn detect_build_systems(path: &Path) -> Classification {
    let root = path.to_path_buf();
    let fallback = root.clone();
    tokio::task::spawn_blocking(move || classify_with_escalation(&root, DEFAULT_MAX_DEPTH))
        .await
        .unwrap_or_else(|err| {
            tracing::error!(error = %err, path = %fallback.display(), "Classifier task failed");
            Classification {
                descriptors: Vec::new(),
                depth_searched: DEFAULT_MAX_DEPTH,
            }
        })
}

/// Classifies at `max_depth`, retrying once at the escalated depth when
/// nothing is found.
pub fn classify_with_escalation(root: &Path, max_depth: usize) -> Classification {
    let descriptors = classify(root, max_depth);
    if !descriptors.is_empty() || max_depth >= ESCALATED_MAX_DEPTH {
        return Classification {
            descriptors,
            depth_searched: max_depth,
        };
    }

    debug!(
        root = %root.display(),
        depth = ESCALATED_MAX_DEPTH,
        "No build signature found, escalating search depth"
    );
    Classification {
        descriptors: classify(root, ESCALATED_MAX_DEPTH),
        depth_searched: ESCALATED_MAX_DEPTH,
    }
}

/// Returns build descriptors for `root` in discovery order.
///
/// Signature files are looked for up to `max_depth` levels below `root`
/// (files directly in `root` are at depth 1). Directories are visited
/// depth-first with siblings sorted by name, so the result is stable for a
/// given file-system snapshot.
pub fn classify(root: &Path, max_depth: usize) -> Vec<BuildDescriptor> {
    if !root.is_dir() || max_depth == 0 {
        return Vec::new();
    }

    if let Some(descriptor) = root_special_case(root) {
        info!(
            root = %root.display(),
            kind = %descriptor.kind,
            "Matched root-level special signature"
        );
        return vec![descriptor];
    }

    let mut descriptors: Vec<BuildDescriptor> = Vec::new();
    let walker = WalkDir::new(root)
        .max_depth(max_depth - 1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_dir() {
            continue;
        }
        for descriptor in classify_dir(entry.path()) {
            if nested_in_same_kind(&descriptors, &descriptor) {
                debug!(
                    dir = %descriptor.working_dir.display(),
                    kind = %descriptor.kind,
                    "Skipping nested build file of an enclosing project"
                );
                continue;
            }
            debug!(
                dir = %descriptor.working_dir.display(),
                kind = %descriptor.kind,
                "Found build signature"
            );
            descriptors.push(descriptor);
        }
    }

    descriptors
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Sub-project CMakeLists.txt, meson.build and recursive Makefiles belong to
/// the enclosing project of the same kind. Other kinds nest as independent
/// projects (monorepo packages, helper setup.py trees).
fn nested_in_same_kind(found: &[BuildDescriptor], candidate: &BuildDescriptor) -> bool {
    if !matches!(
        candidate.kind,
        ToolchainKind::CMake | ToolchainKind::Meson | ToolchainKind::Make
    ) {
        return false;
    }
    found.iter().any(|existing| {
        existing.kind == candidate.kind
            && candidate.working_dir != existing.working_dir
            && candidate.working_dir.starts_with(&existing.working_dir)
    })
}

fn root_special_case(root: &Path) -> Option<BuildDescriptor> {
    if let Some(exception) = exceptions::root_signature(root) {
        return Some(
            BuildDescriptor::new(
                exception.kind,
                exception.working_dir(root),
                exception.source_file(root),
            )
            .with_description(format!("{} ({} build)", exception.name, exception.kind)),
        );
    }

    autogen_descriptor(root)
}

fn autogen_descriptor(dir: &Path) -> Option<BuildDescriptor> {
    let script = dir.join("autogen.sh");
    if script.is_file() && autoconf_input(dir).is_some() {
        Some(
            BuildDescriptor::new(ToolchainKind::Autogen, dir.to_path_buf(), script)
                .with_description(format!("autogen.sh + configure script in {}", dir.display())),
        )
    } else {
        None
    }
}

fn autoconf_input(dir: &Path) -> Option<PathBuf> {
    ["configure.ac", "configure.in"]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn classify_dir(dir: &Path) -> Vec<BuildDescriptor> {
    let mut found = Vec::new();

    if let Some(primary) = primary_descriptor(dir) {
        found.push(primary);
    }

    for (file_name, kind) in STANDALONE_SIGNATURES {
        let file = dir.join(file_name);
        if !file.is_file() {
            continue;
        }
        // build.gradle and build.gradle.kts describe the same project.
        if found.iter().any(|d| d.kind == kind) {
            continue;
        }
        found.push(BuildDescriptor::new(kind, dir.to_path_buf(), file));
    }

    found
}

/// Picks the single winner among autogen, configure, CMake and Makefile.
fn primary_descriptor(dir: &Path) -> Option<BuildDescriptor> {
    if let Some(descriptor) = autogen_descriptor(dir) {
        return Some(descriptor);
    }

    let configure = dir.join("configure");
    if is_executable_file(&configure) {
        let kind = if autoconf_input(dir).is_some() || is_autoconf_generated(&configure) {
            ToolchainKind::Autotools
        } else {
            ToolchainKind::CustomConfigure
        };
        return Some(BuildDescriptor::new(kind, dir.to_path_buf(), configure));
    }

    let cmake = dir.join("CMakeLists.txt");
    if cmake.is_file() {
        return Some(BuildDescriptor::new(ToolchainKind::CMake, dir.to_path_buf(), cmake));
    }

    if let Some(makefile) = MAKEFILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
    {
        return Some(BuildDescriptor::new(ToolchainKind::Make, dir.to_path_buf(), makefile));
    }

    // A lone autogen.sh still bootstraps a configure script.
    let script = dir.join("autogen.sh");
    if script.is_file() {
        return Some(BuildDescriptor::new(ToolchainKind::Autogen, dir.to_path_buf(), script));
    }

    None
}

fn is_autoconf_generated(configure: &Path) -> bool {
    fs::read(configure)
        .map(|bytes| {
            let head = &bytes[..bytes.len().min(4096)];
            String::from_utf8_lossy(head).contains("Generated by GNU Autoconf")
        })
        .unwrap_or(false)
}

pub(crate) fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
