//! Build configuration resolution.
//!
//! Sources, highest priority first:
//!
//! 1. a build file forced for the target in the store,
//! 2. the override document found at the tree root,
//! 3. values stored by a previous session,
//! 4. auto-detected defaults (empty flags).
//!
//! Every field is merged on its own. An override document is never written
//! back by [`resolve`]; it comes back as a [`ProposedUpdate`] that the caller
//! commits with [`commit_proposal`] once the user has confirmed it.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::{BuildConfig, BuildDescriptor, ToolchainKind};
use crate::error::{ConfigError, StoreError};
use crate::exceptions;
use crate::store::{BuildStore, TargetRecord};

pub const OVERRIDE_FILE_NAMES: [&str; 2] = ["srcbuild.conf", ".srcbuild"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverrideDocument {
    pub path: Option<PathBuf>,
    pub repo_name: Option<String>,
    pub repo_url: Option<String>,
    pub build_method: Option<String>,
    pub dependencies: Option<BTreeSet<String>>,
    pub build_file: Option<PathBuf>,
    pub configure_flags: Option<String>,
    pub make_flags: Option<String>,
    pub cmake_flags: Option<String>,
    pub binary_path: Option<PathBuf>,
    pub notes: Option<String>,
}

impl OverrideDocument {
    /// Parses `KEY=VALUE` lines. Anything that is not a recognised assignment
    /// is skipped.
    pub fn parse(text: &str) -> Self {
        let mut doc = OverrideDocument::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = split_assignment(line) else {
                continue;
            };
            let value = unquote(value.trim()).to_string();
            match key {
                "REPO_NAME" => doc.repo_name = Some(value),
                "REPO_URL" => doc.repo_url = Some(value),
                "BUILD_METHOD" => doc.build_method = Some(value),
                "DEPENDENCIES" => doc.dependencies = Some(parse_dependencies(&value)),
                "BUILD_FILE" => doc.build_file = Some(PathBuf::from(value)),
                "CONFIGURE_FLAGS" => doc.configure_flags = Some(value),
                "MAKE_FLAGS" => doc.make_flags = Some(value),
                "CMAKE_FLAGS" => doc.cmake_flags = Some(value),
                "BINARY_PATH" => doc.binary_path = Some(PathBuf::from(value)),
                "NOTES" => doc.notes = Some(value),
                other => debug!(key = other, "Ignoring unrecognised override key"),
            }
        }
        doc
    }

    pub fn is_empty(&self) -> bool {
        let path = self.path.clone();
        *self == OverrideDocument { path, ..Default::default() }
    }

    /// Human-readable `KEY = value` lines for confirmation prompts.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                lines.push(format!("{key} = {value}"));
            }
        };
        push("REPO_NAME", self.repo_name.clone());
        push("REPO_URL", self.repo_url.clone());
        push("BUILD_METHOD", self.build_method.clone());
        push(
            "DEPENDENCIES",
            self.dependencies
                .as_ref()
                .map(|deps| deps.iter().cloned().collect::<Vec<_>>().join(" ")),
        );
        push("BUILD_FILE", self.build_file.as_ref().map(|p| p.display().to_string()));
        push("CONFIGURE_FLAGS", self.configure_flags.clone());
        push("MAKE_FLAGS", self.make_flags.clone());
        push("CMAKE_FLAGS", self.cmake_flags.clone());
        push("BINARY_PATH", self.binary_path.as_ref().map(|p| p.display().to_string()));
        push("NOTES", self.notes.clone());
        lines
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphabetic() || c == '_');
    valid.then_some((key, value))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_dependencies(value: &str) -> BTreeSet<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|dep| !dep.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads the first override document present at `root`, if any.
pub fn find_override_document(root: &Path) -> Result<Option<OverrideDocument>, ConfigError> {
    for name in OVERRIDE_FILE_NAMES {
        let path = root.join(name);
        if !path.is_file() {
            continue;
        }
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::OverrideRead {
            path: path.clone(),
            source,
        })?;
        let mut doc = OverrideDocument::parse(&text);
        info!(path = %path.display(), "Found override document");
        doc.path = Some(path);
        return Ok(Some(doc));
    }
    Ok(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfigSource {
    ForcedBuildFile,
    Document,
    Stored,
    Exception,
    Detected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub descriptor: BuildDescriptor,
    pub descriptor_source: ConfigSource,
    pub config: BuildConfig,
    pub binary_path: Option<PathBuf>,
}

/// Values from an override document waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposedUpdate {
    pub document: Option<PathBuf>,
    pub config: BuildConfig,
    pub build_file: Option<PathBuf>,
    pub binary_path: Option<PathBuf>,
    pub repo_name: Option<String>,
    pub repo_url: Option<String>,
    pub notes: Option<String>,
    pub summary: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub resolved: ResolvedConfig,
    pub proposal: Option<ProposedUpdate>,
}

pub fn resolve(
    repo_id: &str,
    root: &Path,
    descriptor: &BuildDescriptor,
    stored: Option<&TargetRecord>,
    document: Option<&OverrideDocument>,
) -> Result<Resolution, ConfigError> {
    let (descriptor, descriptor_source) = resolve_descriptor(repo_id, root, descriptor, stored, document)?;
    let config = merge_config(stored.map(|record| &record.config), document);

    let binary_path = document
        .and_then(|doc| doc.binary_path.as_ref())
        .map(|path| absolutize(root, path))
        .or_else(|| stored.and_then(|record| record.binary_path.clone()));

    let proposal = document.filter(|doc| !doc.is_empty()).map(|doc| ProposedUpdate {
        document: doc.path.clone(),
        config: config.clone(),
        build_file: doc.build_file.as_ref().map(|path| absolutize(root, path)),
        binary_path: doc.binary_path.as_ref().map(|path| absolutize(root, path)),
        repo_name: doc.repo_name.clone(),
        repo_url: doc.repo_url.clone(),
        notes: doc.notes.clone(),
        summary: doc.summary(),
    });

    debug!(
        repo = repo_id,
        kind = %descriptor.kind,
        source = ?descriptor_source,
        "Resolved build configuration"
    );

    Ok(Resolution {
        resolved: ResolvedConfig {
            descriptor,
            descriptor_source,
            config,
            binary_path,
        },
        proposal,
    })
}

fn resolve_descriptor(
    repo_id: &str,
    root: &Path,
    detected: &BuildDescriptor,
    stored: Option<&TargetRecord>,
    document: Option<&OverrideDocument>,
) -> Result<(BuildDescriptor, ConfigSource), ConfigError> {
    if let Some(forced) = stored.and_then(|record| record.build_file.as_ref()) {
        let descriptor = descriptor_from_build_file(&absolutize(root, forced))?;
        return Ok((descriptor, ConfigSource::ForcedBuildFile));
    }

    if let Some(doc) = document {
        if let Some(build_file) = &doc.build_file {
            let mut descriptor = descriptor_from_build_file(&absolutize(root, build_file))?;
            if let Some(kind) = doc.build_method.as_deref().and_then(ToolchainKind::from_method) {
                descriptor.kind = kind;
            }
            return Ok((descriptor, ConfigSource::Document));
        }
        if let Some(method) = &doc.build_method {
            match ToolchainKind::from_method(method) {
                Some(kind) => {
                    let mut descriptor = detected.clone();
                    descriptor.kind = kind;
                    descriptor.description = format!("{} (from override document)", kind);
                    return Ok((descriptor, ConfigSource::Document));
                }
                None => warn!(method = %method, "Unknown BUILD_METHOD in override document"),
            }
        }
    }

    if let Some(exception) = exceptions::lookup(Some(repo_id), root) {
        let working_dir = exception.working_dir(root);
        if working_dir.is_dir() {
            let descriptor = BuildDescriptor::new(
                exception.kind,
                working_dir,
                exception.source_file(root),
            )
            .with_description(format!("{} ({} build)", exception.name, exception.kind));
            return Ok((descriptor, ConfigSource::Exception));
        }
    }

    Ok((detected.clone(), ConfigSource::Detected))
}

fn merge_config(stored: Option<&BuildConfig>, document: Option<&OverrideDocument>) -> BuildConfig {
    let base = stored.cloned().unwrap_or_default();
    let Some(doc) = document else {
        return base;
    };
    BuildConfig {
        configure_flags: doc.configure_flags.clone().unwrap_or(base.configure_flags),
        make_flags: doc.make_flags.clone().unwrap_or(base.make_flags),
        cmake_flags: doc.cmake_flags.clone().unwrap_or(base.cmake_flags),
        dependencies: doc.dependencies.clone().unwrap_or(base.dependencies),
    }
}

/// Builds a descriptor for an explicitly named build file.
pub fn descriptor_from_build_file(path: &Path) -> Result<BuildDescriptor, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::BuildFileMissing(path.to_path_buf()));
    }
    let kind = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(ToolchainKind::from_build_file)
        .ok_or_else(|| ConfigError::UnknownBuildFile(path.to_path_buf()))?;
    let working_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(BuildDescriptor::new(kind, working_dir, path.to_path_buf())
        .with_description(format!("{} (forced build file {})", kind, path.display())))
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Persists a confirmed override proposal.
pub fn commit_proposal(
    store: &dyn BuildStore,
    repo_id: &str,
    proposal: &ProposedUpdate,
) -> Result<(), StoreError> {
    let mut record = store.load(repo_id)?.unwrap_or_default();
    record.config = proposal.config.clone();
    if proposal.build_file.is_some() {
        record.build_file = proposal.build_file.clone();
    }
    if proposal.binary_path.is_some() {
        record.binary_path = proposal.binary_path.clone();
    }
    if proposal.repo_name.is_some() {
        record.repo_name = proposal.repo_name.clone();
    }
    if proposal.repo_url.is_some() {
        record.repo_url = proposal.repo_url.clone();
    }
    if proposal.notes.is_some() {
        record.notes = proposal.notes.clone();
    }
    store.save(repo_id, &record)?;
    info!(repo = repo_id, "Committed override document values");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_values_and_skips_noise() {
        let doc = OverrideDocument::parse(
            "# comment\n\nMAKE_FLAGS=\"-j4\"\nCMAKE_FLAGS='-DX=1'\nnot an assignment\n\
             lower_case=ok\nBAD-KEY=1\nFUTURE_KEY=whatever\nDEPENDENCIES=\"libsdl2-dev, zlib1g-dev  cmake\"\n",
        );
        assert_eq!(doc.make_flags.as_deref(), Some("-j4"));
        assert_eq!(doc.cmake_flags.as_deref(), Some("-DX=1"));
        let deps: Vec<_> = doc.dependencies.unwrap().into_iter().collect();
        assert_eq!(deps, vec!["cmake", "libsdl2-dev", "zlib1g-dev"]);
    }

    #[test]
    fn value_may_contain_equals_signs() {
        let doc = OverrideDocument::parse("CONFIGURE_FLAGS=--prefix=/opt/x --enable-sdl=2\n");
        assert_eq!(doc.configure_flags.as_deref(), Some("--prefix=/opt/x --enable-sdl=2"));
    }

    #[test]
    fn unmatched_quotes_are_kept() {
        assert_eq!(unquote("\"abc"), "\"abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn document_with_only_unknown_keys_is_empty() {
        assert!(OverrideDocument::parse("SOMETHING=1\n").is_empty());
    }
}
