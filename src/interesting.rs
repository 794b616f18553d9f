//! Implementations of the `IsInteresting` oracle trait.

use crate::error::{Error, Result};
use crate::traits::IsInteresting;
use is_executable::IsExecutable;
use std::ffi::OsString;
use std::fs;
use std::path;
use std::process;

/// An `IsInteresting` implementation that rejects empty testcases, and
/// accepts all others.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NonEmpty;

impl IsInteresting for NonEmpty {
    fn is_interesting(&mut self, testcase: &path::Path) -> Result<bool> {
        let len = fs::File::open(testcase)?.metadata()?.len();
        Ok(len != 0)
    }
}

/// Spawn a subprocess that runs a user-provided condition program to
/// determine whether a testcase is interesting.
///
/// The program is invoked with the configured condition arguments followed
/// by the path of the testcase file. An exit status of `0` means
/// interesting; any other exit status means not interesting.
///
/// ### Example
///
/// With a condition script `grep_magic.sh` like this:
///
/// ```bash
/// #!/usr/bin/env bash
/// # grep exits 0 if it found any matches, 1 otherwise, so this reduces the
/// # testcase towards the smallest file still containing the word "magic".
/// grep magic "${@: -1}"
/// ```
///
/// a reduction driven by `Script::new("grep_magic.sh", vec![])` preserves
/// the word `magic`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Script {
    program: path::PathBuf,
    args: Vec<OsString>,
}

impl Script {
    /// Construct an oracle that runs `program` with `args` and the testcase
    /// path appended.
    ///
    /// Returns `Error::Config` if the program does not exist or is not
    /// executable.
    pub fn new<S>(program: S, args: Vec<OsString>) -> Result<Script>
    where
        S: AsRef<path::Path>,
    {
        let program = program.as_ref();
        if !program.is_file() {
            return Err(Error::Config(format!(
                "condition script does not exist: {}",
                program.display()
            )));
        }
        if !program.is_executable() {
            return Err(Error::Config(format!(
                "condition script is not executable: {}",
                program.display()
            )));
        }
        let program = program.canonicalize()?;
        Ok(Script { program, args })
    }
}

impl IsInteresting for Script {
    fn is_interesting(&mut self, testcase: &path::Path) -> Result<bool> {
        let mut cmd = process::Command::new(&self.program);

        cmd.stdout(process::Stdio::null())
            .stderr(process::Stdio::null())
            .stdin(process::Stdio::null());

        cmd.args(&self.args).arg(testcase);

        let status = cmd
            .spawn()
            .map_err(|e| Error::Oracle(format!("failed to spawn {}: {}", self.program.display(), e)))?
            .wait()
            .map_err(|e| Error::Oracle(format!("failed to wait on {}: {}", self.program.display(), e)))?;
        Ok(status.success())
    }
}

/// Given two oracles, combine them into a single oracle that reports a
/// testcase interesting only when both do.
///
/// `And` short-circuits, which is helpful when one judgement is
/// significantly faster than the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct And<T, U> {
    first: T,
    second: U,
}

impl<T, U> And<T, U> {
    /// Combine `first` and `second` into a single `first && second` oracle.
    pub fn new(first: T, second: U) -> And<T, U> {
        And { first, second }
    }
}

impl<T, U> IsInteresting for And<T, U>
where
    T: IsInteresting,
    U: IsInteresting,
{
    fn init(&mut self) -> Result<()> {
        self.first.init()?;
        self.second.init()
    }

    fn is_interesting(&mut self, testcase: &path::Path) -> Result<bool> {
        Ok(self.first.is_interesting(testcase)? && self.second.is_interesting(testcase)?)
    }

    fn cleanup(&mut self) -> Result<()> {
        let first = self.first.cleanup();
        self.second.cleanup()?;
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    #[test]
    fn non_empty_judges_by_length() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = dir.path().join("a.txt");

        fs::write(&path, b"").unwrap();
        assert!(!NonEmpty.is_interesting(&path).unwrap());

        fs::write(&path, b"x").unwrap();
        assert!(NonEmpty.is_interesting(&path).unwrap());
    }

    #[test]
    fn script_requires_an_executable() {
        let dir = TempDir::new("lithium-test").unwrap();
        let missing = dir.path().join("nope.sh");
        assert!(Script::new(&missing, vec![]).is_err());
    }

    #[test]
    fn and_short_circuits() {
        struct Always(bool, usize);
        impl IsInteresting for Always {
            fn is_interesting(&mut self, _: &path::Path) -> Result<bool> {
                self.1 += 1;
                Ok(self.0)
            }
        }

        let dir = TempDir::new("lithium-test").unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"x").unwrap();

        let mut both = And::new(Always(false, 0), Always(true, 0));
        assert!(!both.is_interesting(&path).unwrap());
        assert_eq!(both.first.1, 1);
        assert_eq!(both.second.1, 0);
    }
}
