//! Script store: the ordered command sequence loaded from one source
//!
//! Loading is wholesale: each load rebuilds the command list, the derived
//! test-boundary index, and the declared version from scratch. Malformed
//! lines and version re-declarations are non-fatal; they are recorded as
//! diagnostics for the caller to surface.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;

use crate::common::{Error, Result};

use super::{Command, CommandKind};

/// A non-fatal problem noticed while loading a script
#[derive(Debug, Clone, PartialEq)]
pub enum LoadDiagnostic {
    /// A line the parser demoted to `Unknown`
    MalformedCommand { line_number: usize, line: String },
    /// A second `scriptVersion` declaration (the first one wins)
    VersionRedeclared { line_number: usize, line: String },
}

impl std::fmt::Display for LoadDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedCommand { line_number, line } => {
                write!(f, "poorly formed command on line {line_number}: {line}")
            }
            Self::VersionRedeclared { line_number, line } => {
                write!(f, "re-declaration of version on line {line_number}: {line}")
            }
        }
    }
}

/// The full ordered command sequence parsed from one source
#[derive(Debug, Default)]
pub struct Script {
    commands: Vec<Command>,
    test_starts: Vec<usize>,
    version: Option<String>,
    diagnostics: Vec<LoadDiagnostic>,
}

impl Script {
    /// Load a script file, replacing any previously loaded script
    ///
    /// An unreadable file is the only hard error. Malformed lines are
    /// recorded as diagnostics and kept in the sequence as `Unknown`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::script_open(&path.display().to_string(), &e))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse a script line-by-line from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut script = Self::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(Error::ScriptRead)?;
            let line_number = index + 1;
            let command = Command::parse(&line, line_number);

            match &command.kind {
                CommandKind::Unknown => {
                    tracing::warn!(line_number, line = %command.line, "malformed command");
                    script.diagnostics.push(LoadDiagnostic::MalformedCommand {
                        line_number,
                        line: command.line.clone(),
                    });
                }
                CommandKind::ScriptVersion(version) => {
                    if script.version.is_some() {
                        tracing::warn!(line_number, "script version re-declared");
                        script.diagnostics.push(LoadDiagnostic::VersionRedeclared {
                            line_number,
                            line: command.line.clone(),
                        });
                    } else {
                        script.version = Some(version.clone());
                    }
                }
                CommandKind::Test(_) => {
                    script.test_starts.push(script.commands.len());
                }
                _ => {}
            }

            script.commands.push(command);
        }

        Ok(script)
    }

    /// Number of tests in the script
    pub fn test_count(&self) -> usize {
        self.test_starts.len()
    }

    /// Name of test `n`, if it exists
    pub fn test_name(&self, n: usize) -> Option<&str> {
        let index = *self.test_starts.get(n)?;
        match &self.commands[index].kind {
            CommandKind::Test(name) => Some(name),
            _ => None,
        }
    }

    /// Find a test index by exact name
    pub fn find_test_by_name(&self, name: &str) -> Option<usize> {
        (0..self.test_count()).find(|&i| self.test_name(i) == Some(name))
    }

    /// Declared script version (first declaration wins)
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Problems noticed while loading
    pub fn diagnostics(&self) -> &[LoadDiagnostic] {
        &self.diagnostics
    }

    /// All commands in file order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Command-index range belonging to test `n`
    ///
    /// The range includes the `test` command itself and everything up to
    /// the next `test` command or end of file. Empty for an out-of-range
    /// index.
    pub fn test_span(&self, n: usize) -> Range<usize> {
        match self.test_starts.get(n) {
            None => 0..0,
            Some(&start) => {
                let end = self
                    .test_starts
                    .get(n + 1)
                    .copied()
                    .unwrap_or(self.commands.len());
                start..end
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn load(text: &str) -> Script {
        Script::from_reader(Cursor::new(text.to_string())).unwrap()
    }

    #[test]
    fn empty_source() {
        let script = load("");
        assert_eq!(script.test_count(), 0);
        assert!(script.version().is_none());
        assert!(script.diagnostics().is_empty());
    }

    #[test]
    fn test_boundaries_and_names() {
        let script = load(
            "scriptVersion 1.0\n\
             test Alpha\n\
             sleep 10\n\
             test Beta\n\
             readline_a\n",
        );
        assert_eq!(script.test_count(), 2);
        assert_eq!(script.test_name(0), Some("Alpha"));
        assert_eq!(script.test_name(1), Some("Beta"));
        assert_eq!(script.test_name(2), None);
        assert_eq!(script.find_test_by_name("Beta"), Some(1));
        assert_eq!(script.find_test_by_name("Gamma"), None);
    }

    #[test]
    fn span_computation() {
        // 12 commands with tests at indices 2, 5 and 9
        let mut text = String::new();
        for i in 0..12 {
            if i == 2 || i == 5 || i == 9 {
                text.push_str(&format!("test T{i}\n"));
            } else {
                text.push_str("# filler\n");
            }
        }
        let script = load(&text);
        assert_eq!(script.test_span(0), 2..5);
        assert_eq!(script.test_span(1), 5..9);
        assert_eq!(script.test_span(2), 9..12);
        assert_eq!(script.test_span(3), 0..0);
    }

    #[test]
    fn first_version_wins() {
        let script = load("scriptVersion 1.0\nscriptVersion 2.0\n");
        assert_eq!(script.version(), Some("1.0"));
        assert_eq!(script.diagnostics().len(), 1);
        assert!(matches!(
            script.diagnostics()[0],
            LoadDiagnostic::VersionRedeclared { line_number: 2, .. }
        ));
    }

    #[test]
    fn malformed_lines_are_diagnosed_not_fatal() {
        let script = load("test T1\nexpect zero 1 2\nsleep 5\n");
        assert_eq!(script.test_count(), 1);
        assert_eq!(script.commands().len(), 3);
        assert_eq!(script.diagnostics().len(), 1);
        assert!(matches!(
            &script.diagnostics()[0],
            LoadDiagnostic::MalformedCommand { line_number: 2, line } if line == "expect zero 1 2"
        ));
    }

    #[test]
    fn unreadable_file_is_a_hard_error() {
        assert!(Script::load(Path::new("/nonexistent/script.txt")).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basic.txt");
        std::fs::write(&path, "scriptVersion 3.2\ntest Smoke\nsleep 1\n").unwrap();

        let script = Script::load(&path).unwrap();
        assert_eq!(script.version(), Some("3.2"));
        assert_eq!(script.test_count(), 1);
        assert_eq!(script.test_span(0), 1..3);
    }
}
