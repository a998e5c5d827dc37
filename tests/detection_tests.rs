use srcbuild::core::ToolchainKind;
use srcbuild::detection::{classify, classify_with_escalation, DEFAULT_MAX_DEPTH, ESCALATED_MAX_DEPTH};
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::tempdir;

fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
}

fn write_executable(root: &Path, rel: &str, contents: &str) {
    write_file(root, rel, contents);
    fs::set_permissions(root.join(rel), fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_single_cmake_project() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "CMakeLists.txt", "project(demo)\n");

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, ToolchainKind::CMake);
    assert_eq!(found[0].working_dir, dir.path());
    assert_eq!(found[0].source_file, dir.path().join("CMakeLists.txt"));
}

#[test]
fn test_cmake_wins_over_makefile_in_same_dir() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "CMakeLists.txt", "project(demo)\n");
    write_file(dir.path(), "Makefile", "all:\n\techo hi\n");

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, ToolchainKind::CMake);
    assert!(found.iter().all(|d| d.kind != ToolchainKind::Make));
}

#[test]
fn test_autogen_pair_beats_configure_script() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "autogen.sh", "#!/bin/sh\nautoreconf -i\n");
    write_file(dir.path(), "configure.ac", "AC_INIT([demo], [1.0])\n");
    write_executable(dir.path(), "configure", "#!/bin/sh\n");
    write_file(dir.path(), "Makefile", "all:\n");

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, ToolchainKind::Autogen);
    assert_eq!(found[0].source_file, dir.path().join("autogen.sh"));
}

#[test]
fn test_configure_without_autoconf_input_is_custom() {
    let dir = tempdir().unwrap();
    write_executable(dir.path(), "configure", "#!/bin/sh\necho custom\n");

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, ToolchainKind::CustomConfigure);
}

#[test]
fn test_generated_configure_is_autotools() {
    let dir = tempdir().unwrap();
    write_executable(
        dir.path(),
        "configure",
        "#! /bin/sh\n# Generated by GNU Autoconf 2.71 for demo 1.0.\n",
    );

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(found[0].kind, ToolchainKind::Autotools);
}

#[test]
fn test_empty_tree_reports_escalated_depth() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "README.md", "nothing to build\n");
    write_file(dir.path(), "docs/index.md", "# docs\n");

    let result = classify_with_escalation(dir.path(), DEFAULT_MAX_DEPTH);

    assert!(result.is_empty());
    assert_eq!(result.depth_searched, ESCALATED_MAX_DEPTH);
}

#[test]
fn test_escalation_finds_deeper_project() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "vendor/lib/Makefile", "all:\n");

    assert!(classify(dir.path(), DEFAULT_MAX_DEPTH).is_empty());

    let result = classify_with_escalation(dir.path(), DEFAULT_MAX_DEPTH);
    assert_eq!(result.depth_searched, ESCALATED_MAX_DEPTH);
    assert_eq!(result.descriptors.len(), 1);
    assert_eq!(result.descriptors[0].kind, ToolchainKind::Make);
    assert_eq!(result.descriptors[0].working_dir, dir.path().join("vendor/lib"));
}

#[test]
fn test_no_escalation_when_first_pass_finds_something() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "Makefile", "all:\n");
    write_file(dir.path(), "a/b/CMakeLists.txt", "project(deep)\n");

    let result = classify_with_escalation(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(result.depth_searched, DEFAULT_MAX_DEPTH);
    assert_eq!(result.descriptors.len(), 1);
    assert_eq!(result.descriptors[0].kind, ToolchainKind::Make);
}

#[test]
fn test_sibling_projects_in_discovery_order() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "beta/CMakeLists.txt", "project(beta)\n");
    write_file(dir.path(), "alpha/Makefile", "all:\n");
    write_file(dir.path(), "gamma/setup.py", "from setuptools import setup\n");

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);
    let dirs: Vec<_> = found
        .iter()
        .map(|d| d.working_dir.file_name().unwrap().to_string_lossy().into_owned())
        .collect();

    assert_eq!(dirs, vec!["alpha", "beta", "gamma"]);
    assert_eq!(found[2].kind, ToolchainKind::Python);

    let again = classify(dir.path(), DEFAULT_MAX_DEPTH);
    assert_eq!(found, again);
}

#[test]
fn test_nested_cmake_subprojects_are_skipped() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "CMakeLists.txt", "add_subdirectory(src)\n");
    write_file(dir.path(), "src/CMakeLists.txt", "add_executable(demo main.c)\n");

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].working_dir, dir.path());
}

#[test]
fn test_nested_packages_are_reported_separately() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "package.json", "{\"name\": \"workspace\"}\n");
    write_file(dir.path(), "setup.py", "from setuptools import setup\n");
    write_file(dir.path(), "client/package.json", "{\"name\": \"client\"}\n");
    write_file(dir.path(), "tools/setup.py", "from setuptools import setup\n");

    let found: Vec<_> = classify(dir.path(), DEFAULT_MAX_DEPTH)
        .into_iter()
        .map(|d| (d.kind, d.working_dir))
        .collect();

    assert_eq!(
        found,
        vec![
            (ToolchainKind::Python, dir.path().to_path_buf()),
            (ToolchainKind::Node, dir.path().to_path_buf()),
            (ToolchainKind::Node, dir.path().join("client")),
            (ToolchainKind::Python, dir.path().join("tools")),
        ]
    );
}

#[test]
fn test_nested_makefile_under_make_project_is_skipped() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "Makefile", "all:\n\t$(MAKE) -C lib\n");
    write_file(dir.path(), "lib/Makefile", "all:\n");

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].working_dir, dir.path());
}

#[test]
fn test_standalone_signatures_coexist_with_primary() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "Makefile", "all:\n");
    write_file(dir.path(), "package.json", "{}\n");
    write_file(dir.path(), "build.gradle", "\n");
    write_file(dir.path(), "build.gradle.kts", "\n");

    let kinds: Vec<_> = classify(dir.path(), DEFAULT_MAX_DEPTH)
        .into_iter()
        .map(|d| d.kind)
        .collect();

    assert_eq!(
        kinds,
        vec![ToolchainKind::Make, ToolchainKind::Node, ToolchainKind::Gradle]
    );
}

#[test]
fn test_hidden_and_node_modules_dirs_are_ignored() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), ".git/Makefile", "all:\n");
    write_file(dir.path(), "node_modules/pkg/Makefile", "all:\n");

    let result = classify_with_escalation(dir.path(), DEFAULT_MAX_DEPTH);

    assert!(result.is_empty());
}

#[test]
fn test_mame_style_makefile_short_circuits() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "makefile", "# MAME makefile\nall:\n");
    write_file(dir.path(), "3rdparty/zlib/CMakeLists.txt", "project(zlib)\n");

    let found = classify(dir.path(), DEFAULT_MAX_DEPTH);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, ToolchainKind::Make);
    assert!(found[0].description.starts_with("mame"));
}

#[test]
fn test_missing_root_is_empty() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    assert!(classify(&missing, DEFAULT_MAX_DEPTH).is_empty());
}
