//! Interactive selection over line-based input and output.
//!
//! Generic over `BufRead`/`Write` so the same code drives a terminal and tests.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::core::{BinaryCandidate, BuildDescriptor};
use crate::detection::is_executable_file;

/// Result of an interactive pick. `Aborted` is an explicit quit, distinct
/// from a selection, so callers never register an empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Selected(PathBuf),
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateChoice {
    Picked(usize),
    Browse,
    Quit,
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Reads one trimmed line; `None` at end of input.
    fn read_answer(&mut self) -> io::Result<Option<String>> {
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        loop {
            write!(self.output, "{question} [y/n]: ")?;
            match self.read_answer()?.as_deref().map(str::to_ascii_lowercase).as_deref() {
                None => return Ok(false),
                Some("y") | Some("yes") => return Ok(true),
                Some("n") | Some("no") => return Ok(false),
                Some(_) => writeln!(self.output, "Please answer y or n.")?,
            }
        }
    }

    /// Asks which of several build systems to use. `None` means quit.
    pub fn choose_descriptor(&mut self, descriptors: &[BuildDescriptor]) -> io::Result<Option<usize>> {
        if descriptors.len() == 1 {
            return Ok(Some(0));
        }
        writeln!(self.output, "Multiple build systems found:")?;
        for (i, descriptor) in descriptors.iter().enumerate() {
            writeln!(
                self.output,
                "  {}) {} in {}",
                i + 1,
                descriptor.description,
                descriptor.working_dir.display()
            )?;
        }
        loop {
            write!(self.output, "Select [1-{}], q to quit: ", descriptors.len())?;
            let Some(answer) = self.read_answer()? else {
                return Ok(None);
            };
            if is_quit(&answer) {
                return Ok(None);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=descriptors.len()).contains(&n) => return Ok(Some(n - 1)),
                _ => writeln!(self.output, "Invalid choice: {answer}")?,
            }
        }
    }

    pub fn choose_candidate(&mut self, candidates: &[BinaryCandidate]) -> io::Result<CandidateChoice> {
        writeln!(self.output, "Possible binaries:")?;
        for (i, candidate) in candidates.iter().enumerate() {
            writeln!(self.output, "  {}) {}", i + 1, candidate.path.display())?;
        }
        loop {
            write!(
                self.output,
                "Select [1-{}], b to browse, q to quit: ",
                candidates.len()
            )?;
            let Some(answer) = self.read_answer()? else {
                return Ok(CandidateChoice::Quit);
            };
            if is_quit(&answer) {
                return Ok(CandidateChoice::Quit);
            }
            if answer.eq_ignore_ascii_case("b") {
                return Ok(CandidateChoice::Browse);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=candidates.len()).contains(&n) => {
                    return Ok(CandidateChoice::Picked(n - 1))
                }
                _ => writeln!(self.output, "Invalid choice: {answer}")?,
            }
        }
    }

    /// Numbered directory browser starting at `start`.
    ///
    /// Subdirectories are listed first, then executable files. `0` goes to
    /// the parent, a directory number descends, a file number selects it and
    /// `q` aborts.
    pub fn browse(&mut self, start: &Path) -> io::Result<Selection> {
        let mut current = start.to_path_buf();
        loop {
            let (dirs, files) = list_dir(&current);
            writeln!(self.output, "\n{}", current.display())?;
            writeln!(self.output, "  0) ..")?;
            for (i, dir) in dirs.iter().enumerate() {
                writeln!(self.output, "  {}) {}/", i + 1, display_name(dir))?;
            }
            for (i, file) in files.iter().enumerate() {
                writeln!(self.output, "  {}) {}", dirs.len() + i + 1, display_name(file))?;
            }
            write!(self.output, "Select an entry, q to quit: ")?;

            let Some(answer) = self.read_answer()? else {
                return Ok(Selection::Aborted);
            };
            if is_quit(&answer) {
                return Ok(Selection::Aborted);
            }
            match answer.parse::<usize>() {
                Ok(0) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    }
                }
                Ok(n) if n <= dirs.len() => current = dirs[n - 1].clone(),
                Ok(n) if n <= dirs.len() + files.len() => {
                    return Ok(Selection::Selected(files[n - dirs.len() - 1].clone()))
                }
                _ => writeln!(self.output, "Invalid choice: {answer}")?,
            }
        }
    }
}

/// Confirms one of `candidates`, falling through to the browser when there
/// are none or the user asks for it.
pub fn select_binary<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    candidates: &[BinaryCandidate],
    browse_root: &Path,
) -> io::Result<Selection> {
    if candidates.is_empty() {
        writeln!(prompter.output, "No binary found automatically, browse for it.")?;
        return prompter.browse(browse_root);
    }
    match prompter.choose_candidate(candidates)? {
        CandidateChoice::Picked(i) => Ok(Selection::Selected(candidates[i].path.clone())),
        CandidateChoice::Browse => prompter.browse(browse_root),
        CandidateChoice::Quit => Ok(Selection::Aborted),
    }
}

fn is_quit(answer: &str) -> bool {
    answer.eq_ignore_ascii_case("q") || answer.eq_ignore_ascii_case("quit")
}

fn list_dir(dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if path.is_dir() {
                dirs.push(path);
            } else if is_executable_file(&path) {
                files.push(path);
            }
        }
    }
    dirs.sort();
    files.sort();
    (dirs, files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
