//! Finding the executable a build produced.
//!
//! Three tiers, each tried only when the previous one found nothing:
//! name affinity near the root, conventional output directories, and a full
//! recursive scan.
//!
//! Name affinity is a case-insensitive substring match in both directions.
//! Short target names can therefore match unrelated files; exact matches are
//! ordered first to keep the common case right.

use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::core::BinaryCandidate;
use crate::detection::is_executable_file;

pub const NAME_SEARCH_DEPTH: usize = 3;

pub const CONVENTIONAL_DIRS: [&str; 12] = [
    "build",
    "bin",
    "build/bin",
    "build/src",
    "build/Release",
    "build/release",
    "Release",
    "src",
    "target/release",
    "dist",
    "out",
    "output",
];

/// Extensions that mark scripts and data files rather than build outputs.
const NON_BINARY_EXTENSIONS: [&str; 9] = ["sh", "py", "pl", "txt", "md", "yml", "yaml", "json", "cmake"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchTier {
    NameAffinity,
    ConventionalDirs,
    FullScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NativeFormat {
    Elf,
    MachO,
    Pe,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocateReport {
    /// The tier that produced the candidates; `None` when every tier came up empty.
    pub tier: Option<SearchTier>,
    pub candidates: Vec<BinaryCandidate>,
}

pub fn locate(search_root: &Path, target_name: &str) -> Vec<BinaryCandidate> {
    locate_with_report(search_root, target_name).candidates
}

pub fn locate_with_report(search_root: &Path, target_name: &str) -> LocateReport {
    let tiers: [(SearchTier, fn(&Path, &str) -> Vec<BinaryCandidate>); 3] = [
        (SearchTier::NameAffinity, name_affinity_search),
        (SearchTier::ConventionalDirs, conventional_dir_search),
        (SearchTier::FullScan, full_scan),
    ];

    for (tier, search) in tiers {
        let candidates = search(search_root, target_name);
        debug!(tier = ?tier, found = candidates.len(), "Binary search tier finished");
        if !candidates.is_empty() {
            info!(
                root = %search_root.display(),
                tier = ?tier,
                found = candidates.len(),
                "Located binary candidates"
            );
            return LocateReport {
                tier: Some(tier),
                candidates,
            };
        }
    }

    LocateReport {
        tier: None,
        candidates: Vec::new(),
    }
}

/// Tier 1: native executables near the root whose name relates to the target.
pub fn name_affinity_search(root: &Path, target_name: &str) -> Vec<BinaryCandidate> {
    let paths = walk_files(root, Some(NAME_SEARCH_DEPTH))
        .filter(|path| file_name_of(path).is_some_and(|name| name_affinity(&name, target_name)))
        .filter(|path| is_executable_file(path) && native_format(path).is_some());
    finalize(paths, target_name)
}

/// Tier 2: any executable directly inside a conventional output directory.
pub fn conventional_dir_search(root: &Path, target_name: &str) -> Vec<BinaryCandidate> {
    let mut paths = Vec::new();
    for dir in CONVENTIONAL_DIRS {
        let dir = root.join(dir);
        if !dir.is_dir() {
            continue;
        }
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect(),
            Err(_) => continue,
        };
        entries.sort();
        paths.extend(
            entries
                .into_iter()
                .filter(|path| is_executable_file(path) && !has_non_binary_extension(path)),
        );
    }
    finalize(paths.into_iter(), target_name)
}

/// Tier 3: every native executable in the tree.
pub fn full_scan(root: &Path, target_name: &str) -> Vec<BinaryCandidate> {
    let paths = walk_files(root, None)
        .filter(|path| is_executable_file(path) && native_format(path).is_some());
    finalize(paths, target_name)
}

/// Sniffs the executable format from the file's magic bytes.
pub fn native_format(path: &Path) -> Option<NativeFormat> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path).ok()?;
    let read = file.read(&mut magic).ok()?;
    if read >= 4 && magic == [0x7f, b'E', b'L', b'F'] {
        return Some(NativeFormat::Elf);
    }
    if read >= 4 {
        let word = u32::from_be_bytes(magic);
        if matches!(word, 0xfeedface | 0xfeedfacf | 0xcefaedfe | 0xcffaedfe | 0xcafebabe) {
            return Some(NativeFormat::MachO);
        }
    }
    if read >= 2 && &magic[..2] == b"MZ" {
        return Some(NativeFormat::Pe);
    }
    None
}

pub fn name_affinity(file_name: &str, target_name: &str) -> bool {
    let file = file_name.to_lowercase();
    let target = target_name.to_lowercase();
    if file.is_empty() || target.is_empty() {
        return false;
    }
    file.contains(&target) || target.contains(&file)
}

fn exact_match(path: &Path, target_name: &str) -> bool {
    let by_name = file_name_of(path).is_some_and(|name| name.eq_ignore_ascii_case(target_name));
    let by_stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.eq_ignore_ascii_case(target_name));
    by_name || by_stem
}

fn finalize(paths: impl Iterator<Item = PathBuf>, target_name: &str) -> Vec<BinaryCandidate> {
    let mut seen = HashSet::new();
    let mut candidates: Vec<BinaryCandidate> = paths
        .filter(|path| seen.insert(path.clone()))
        .map(|path| BinaryCandidate {
            is_executable: is_executable_file(&path),
            matches_target_name: file_name_of(&path)
                .is_some_and(|name| name_affinity(&name, target_name)),
            path,
        })
        .collect();
    // Stable: discovery order is kept within each group.
    candidates.sort_by_key(|candidate| !exact_match(&candidate.path, target_name));
    candidates
}

fn walk_files(root: &Path, max_depth: Option<usize>) -> impl Iterator<Item = PathBuf> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }
    walker
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden_dir(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with('.')
}

fn has_non_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| NON_BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_is_bidirectional_and_case_insensitive() {
        assert!(name_affinity("ZEsarUX", "zesarux"));
        assert!(name_affinity("zesarux-bin", "zesarux"));
        assert!(name_affinity("fuse", "fuse-emulator"));
        assert!(!name_affinity("helper", "zesarux"));
        assert!(!name_affinity("", "zesarux"));
    }

    #[test]
    fn exact_match_accepts_extension() {
        assert!(exact_match(Path::new("/x/Zesarux.exe"), "zesarux"));
        assert!(!exact_match(Path::new("/x/zesarux-bin"), "zesarux"));
    }
}
