use srcbuild::config::{
    commit_proposal, find_override_document, resolve, ConfigSource, OverrideDocument,
};
use srcbuild::core::{BuildConfig, BuildDescriptor, BuildJob, JobState, ToolchainKind};
use srcbuild::error::ConfigError;
use srcbuild::store::{BuildStore, JsonFileStore, MemoryStore, TargetRecord};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn cmake_descriptor(root: &Path) -> BuildDescriptor {
    BuildDescriptor::new(ToolchainKind::CMake, root.to_path_buf(), root.join("CMakeLists.txt"))
}

fn record_with_cmake_flags(flags: &str) -> TargetRecord {
    TargetRecord {
        config: BuildConfig {
            cmake_flags: flags.to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_document_and_stored_flags_merge_per_field() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let stored = record_with_cmake_flags("-DFOO=1");
    let doc = OverrideDocument::parse("MAKE_FLAGS=\"-j4\"\n");

    let resolution = resolve("demo", root, &cmake_descriptor(root), Some(&stored), Some(&doc)).unwrap();

    assert_eq!(resolution.resolved.config.make_flags, "-j4");
    assert_eq!(resolution.resolved.config.cmake_flags, "-DFOO=1");
    assert_eq!(resolution.resolved.descriptor_source, ConfigSource::Detected);
}

#[test]
fn test_document_value_wins_over_stored_value() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let stored = record_with_cmake_flags("-DFOO=1");
    let doc = OverrideDocument::parse("CMAKE_FLAGS=-DFOO=2\n");

    let resolution = resolve("demo", root, &cmake_descriptor(root), Some(&stored), Some(&doc)).unwrap();

    assert_eq!(resolution.resolved.config.cmake_flags, "-DFOO=2");
}

#[test]
fn test_resolve_does_not_touch_store_until_commit() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let store = MemoryStore::new().with_record("demo", record_with_cmake_flags("-DFOO=1"));
    let doc = OverrideDocument::parse("MAKE_FLAGS=-j8\nREPO_NAME=demo-app\n");

    let stored = store.load("demo").unwrap();
    let resolution = resolve("demo", root, &cmake_descriptor(root), stored.as_ref(), Some(&doc)).unwrap();
    let proposal = resolution.proposal.expect("document should produce a proposal");

    let untouched = store.load("demo").unwrap().unwrap();
    assert_eq!(untouched.config.make_flags, "");
    assert_eq!(untouched.repo_name, None);

    commit_proposal(&store, "demo", &proposal).unwrap();

    let committed = store.load("demo").unwrap().unwrap();
    assert_eq!(committed.config.make_flags, "-j8");
    assert_eq!(committed.config.cmake_flags, "-DFOO=1");
    assert_eq!(committed.repo_name.as_deref(), Some("demo-app"));
}

#[test]
fn test_resolution_is_idempotent() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let store = MemoryStore::new();
    let doc = OverrideDocument::parse("CONFIGURE_FLAGS=--prefix=/opt\nDEPENDENCIES=libsdl2-dev, zlib1g-dev\n");
    let descriptor = cmake_descriptor(root);

    let first = resolve("demo", root, &descriptor, None, Some(&doc)).unwrap();
    commit_proposal(&store, "demo", first.proposal.as_ref().unwrap()).unwrap();

    let stored = store.load("demo").unwrap();
    let second = resolve("demo", root, &descriptor, stored.as_ref(), Some(&doc)).unwrap();

    assert_eq!(first.resolved, second.resolved);
    assert_eq!(second.resolved.config.dependencies.len(), 2);
}

#[test]
fn test_no_document_means_no_proposal() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let stored = record_with_cmake_flags("-DBAR=ON");

    let resolution = resolve("demo", root, &cmake_descriptor(root), Some(&stored), None).unwrap();

    assert!(resolution.proposal.is_none());
    assert_eq!(resolution.resolved.config, stored.config);
}

#[test]
fn test_stored_build_file_is_forced() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("port/unix")).unwrap();
    fs::write(root.join("port/unix/Makefile"), "all:\n").unwrap();
    let stored = TargetRecord {
        build_file: Some(PathBuf::from("port/unix/Makefile")),
        ..Default::default()
    };

    let resolution = resolve("demo", root, &cmake_descriptor(root), Some(&stored), None).unwrap();

    assert_eq!(resolution.resolved.descriptor_source, ConfigSource::ForcedBuildFile);
    assert_eq!(resolution.resolved.descriptor.kind, ToolchainKind::Make);
    assert_eq!(resolution.resolved.descriptor.working_dir, root.join("port/unix"));
}

#[test]
fn test_missing_forced_build_file_is_an_error() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let stored = TargetRecord {
        build_file: Some(PathBuf::from("gone/Makefile")),
        ..Default::default()
    };

    let err = resolve("demo", root, &cmake_descriptor(root), Some(&stored), None).unwrap_err();

    assert!(matches!(err, ConfigError::BuildFileMissing(_)));
}

#[test]
fn test_build_method_overrides_detected_kind() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let doc = OverrideDocument::parse("BUILD_METHOD=make\n");

    let resolution = resolve("demo", root, &cmake_descriptor(root), None, Some(&doc)).unwrap();

    assert_eq!(resolution.resolved.descriptor.kind, ToolchainKind::Make);
    assert_eq!(resolution.resolved.descriptor_source, ConfigSource::Document);
    assert_eq!(resolution.resolved.descriptor.working_dir, root);
}

#[test]
fn test_named_exception_applies_when_subdir_exists() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("vice")).unwrap();
    fs::write(root.join("vice/autogen.sh"), "#!/bin/sh\n").unwrap();

    let resolution = resolve("vice", root, &cmake_descriptor(root), None, None).unwrap();

    assert_eq!(resolution.resolved.descriptor_source, ConfigSource::Exception);
    assert_eq!(resolution.resolved.descriptor.kind, ToolchainKind::Autogen);
    assert_eq!(resolution.resolved.descriptor.working_dir, root.join("vice"));
}

#[test]
fn test_relative_binary_path_is_anchored_at_root() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let doc = OverrideDocument::parse("BINARY_PATH=build/demo\n");

    let resolution = resolve("demo", root, &cmake_descriptor(root), None, Some(&doc)).unwrap();

    assert_eq!(resolution.resolved.binary_path, Some(root.join("build/demo")));
}

#[test]
fn test_first_override_file_name_wins() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("srcbuild.conf"), "MAKE_FLAGS=-j2\n").unwrap();
    fs::write(dir.path().join(".srcbuild"), "MAKE_FLAGS=-j16\n").unwrap();

    let doc = find_override_document(dir.path()).unwrap().unwrap();

    assert_eq!(doc.make_flags.as_deref(), Some("-j2"));
    assert_eq!(doc.path, Some(dir.path().join("srcbuild.conf")));
}

#[test]
fn test_json_store_keeps_last_outcome() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.json");
    let root = dir.path();
    let mut job = BuildJob::new("demo".to_string(), &cmake_descriptor(root), root.join("demo.log"));
    job.start().unwrap();

    {
        let store = JsonFileStore::new(&state);
        store.save("demo", &record_with_cmake_flags("-DX=1")).unwrap();
        // Recorded mid-run, as if the process died before finishing.
        store.record_outcome("demo", &job.outcome()).unwrap();
    }

    let reopened = JsonFileStore::new(&state);
    let record = reopened.load("demo").unwrap().unwrap();
    assert_eq!(record.config.cmake_flags, "-DX=1");
    let outcome = record.last_outcome.unwrap();
    assert_eq!(outcome.state, JobState::Running);
    assert_eq!(outcome.effective_state(), JobState::Failed);
    assert_eq!(outcome.job_id, job.id);
}
