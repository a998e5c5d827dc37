use srcbuild::browser::{select_binary, Prompter, Selection};
use srcbuild::core::{BinaryCandidate, BuildDescriptor, ToolchainKind};
use std::fs;
use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

type TestPrompter = Prompter<Cursor<Vec<u8>>, Vec<u8>>;

fn prompter(input: &str) -> TestPrompter {
    Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

fn output_of(prompter: TestPrompter) -> String {
    String::from_utf8(prompter.into_output()).unwrap()
}

fn executable(root: &Path, rel: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"\x7fELF").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn candidate(path: PathBuf) -> BinaryCandidate {
    BinaryCandidate {
        path,
        is_executable: true,
        matches_target_name: true,
    }
}

#[test]
fn test_browse_descends_and_selects() {
    let dir = tempdir().unwrap();
    let tool = executable(dir.path(), "bin/tool");
    fs::create_dir_all(dir.path().join("src")).unwrap();

    let mut p = prompter("1\n1\n");
    let selection = p.browse(dir.path()).unwrap();

    assert_eq!(selection, Selection::Selected(tool));
    let output = output_of(p);
    assert!(output.contains("1) bin/"));
    assert!(output.contains("2) src/"));
    assert!(output.contains("1) tool"));
}

#[test]
fn test_browse_zero_goes_to_parent() {
    let dir = tempdir().unwrap();
    executable(dir.path(), "bin/tool");
    let app = executable(dir.path(), "src/app");

    let mut p = prompter("0\n2\n1\n");
    let selection = p.browse(&dir.path().join("bin")).unwrap();

    assert_eq!(selection, Selection::Selected(app));
}

#[test]
fn test_browse_hides_dotfiles_and_plain_files() {
    let dir = tempdir().unwrap();
    executable(dir.path(), ".hidden/tool");
    fs::write(dir.path().join("README"), "docs\n").unwrap();
    let run = executable(dir.path(), "run");

    let mut p = prompter("1\n");
    let selection = p.browse(dir.path()).unwrap();

    assert_eq!(selection, Selection::Selected(run));
    let output = output_of(p);
    assert!(!output.contains(".hidden"));
    assert!(!output.contains("README"));
}

#[test]
fn test_browse_quit_and_end_of_input_abort() {
    let dir = tempdir().unwrap();
    executable(dir.path(), "tool");

    let mut quit = prompter("q\n");
    assert_eq!(quit.browse(dir.path()).unwrap(), Selection::Aborted);

    let mut eof = prompter("");
    assert_eq!(eof.browse(dir.path()).unwrap(), Selection::Aborted);
}

#[test]
fn test_browse_reprompts_on_invalid_input() {
    let dir = tempdir().unwrap();
    let tool = executable(dir.path(), "tool");

    let mut p = prompter("42\nabc\n1\n");
    let selection = p.browse(dir.path()).unwrap();

    assert_eq!(selection, Selection::Selected(tool));
    let output = output_of(p);
    assert!(output.contains("Invalid choice: 42"));
    assert!(output.contains("Invalid choice: abc"));
}

#[test]
fn test_empty_candidates_fall_through_to_browser() {
    let dir = tempdir().unwrap();
    let tool = executable(dir.path(), "tool");

    let mut p = prompter("1\n");
    let selection = select_binary(&mut p, &[], dir.path()).unwrap();

    assert_eq!(selection, Selection::Selected(tool));
    assert!(output_of(p).contains("No binary found automatically"));
}

#[test]
fn test_candidate_selection() {
    let dir = tempdir().unwrap();
    let first = executable(dir.path(), "build/demo");
    let second = executable(dir.path(), "build/demo-debug");
    let candidates = vec![candidate(first), candidate(second.clone())];

    let mut p = prompter("2\n");
    assert_eq!(
        select_binary(&mut p, &candidates, dir.path()).unwrap(),
        Selection::Selected(second)
    );

    let mut quit = prompter("q\n");
    assert_eq!(
        select_binary(&mut quit, &candidates, dir.path()).unwrap(),
        Selection::Aborted
    );
}

#[test]
fn test_candidate_prompt_can_switch_to_browser() {
    let dir = tempdir().unwrap();
    let listed = executable(dir.path(), "build/demo");
    let other = executable(dir.path(), "tools/other");

    let mut p = prompter("b\n2\n1\n");
    let selection = select_binary(&mut p, &[candidate(listed)], dir.path()).unwrap();

    assert_eq!(selection, Selection::Selected(other));
}

#[test]
fn test_confirm_accepts_yes_and_rejects_at_eof() {
    let mut p = prompter("maybe\nY\n");
    assert!(p.confirm("Apply?").unwrap());
    assert!(output_of(p).contains("Please answer y or n."));

    let mut no = prompter("n\n");
    assert!(!no.confirm("Apply?").unwrap());

    let mut eof = prompter("");
    assert!(!eof.confirm("Apply?").unwrap());
}

#[test]
fn test_choose_descriptor() {
    let root = Path::new("/src/demo");
    let make = BuildDescriptor::new(ToolchainKind::Make, root.to_path_buf(), root.join("Makefile"));
    let node = BuildDescriptor::new(ToolchainKind::Node, root.join("web"), root.join("web/package.json"));

    let mut single = prompter("");
    assert_eq!(single.choose_descriptor(&[make.clone()]).unwrap(), Some(0));

    let mut p = prompter("3\n2\n");
    assert_eq!(p.choose_descriptor(&[make.clone(), node.clone()]).unwrap(), Some(1));

    let mut quit = prompter("q\n");
    assert_eq!(quit.choose_descriptor(&[make, node]).unwrap(), None);
}
