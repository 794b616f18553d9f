//! The reduction engine: owns the testcase, the strategy, the oracle, and
//! the temp directory where intermediate artifacts are archived.

use crate::error::Result;
use crate::test_case::Testcase;
use crate::traits::{IsInteresting, Strategy, TestRunner};
use crate::util::quantity;
use log::{info, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

/// A configured reduction run.
///
/// ### Example
///
/// ```no_run
/// use lithium::interesting;
/// use lithium::reducer::Lithium;
/// use lithium::strategies::Minimize;
/// use lithium::test_case::{SplitMode, Testcase};
///
/// # fn main() -> lithium::error::Result<()> {
/// let mut lithium = Lithium::new();
/// lithium.set_strategy(Box::new(Minimize::default()));
/// lithium.set_condition(Box::new(interesting::Script::new("./crashes.sh", vec![])?));
/// lithium.set_testcase(Testcase::load("crash.js", SplitMode::Line)?);
/// let exit_code = lithium.run()?;
/// # let _ = exit_code;
/// # Ok(())
/// # }
/// ```
pub struct Lithium {
    strategy: Option<Box<dyn Strategy>>,
    testcase: Option<Testcase>,
    condition: Option<Box<dyn IsInteresting>>,
    temp_dir: Option<PathBuf>,
    extension: String,
    test_count: usize,
    test_total: usize,
    temp_file_count: usize,
    last_interesting: Option<Testcase>,
}

impl fmt::Debug for Lithium {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Lithium")
            .field("strategy", &self.strategy)
            .field("testcase", &self.testcase)
            .field("temp_dir", &self.temp_dir)
            .field("test_count", &self.test_count)
            .field("test_total", &self.test_total)
            .field("temp_file_count", &self.temp_file_count)
            .finish()
    }
}

impl Default for Lithium {
    fn default() -> Lithium {
        Lithium::new()
    }
}

impl Lithium {
    /// An unconfigured engine.
    pub fn new() -> Lithium {
        Lithium {
            strategy: None,
            testcase: None,
            condition: None,
            temp_dir: None,
            extension: String::new(),
            test_count: 0,
            test_total: 0,
            temp_file_count: 1,
            last_interesting: None,
        }
    }

    /// Set the reduction strategy.
    pub fn set_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.strategy = Some(strategy);
    }

    /// Set the testcase to reduce.
    pub fn set_testcase(&mut self, testcase: Testcase) {
        self.extension = testcase.extension().to_string();
        self.testcase = Some(testcase);
    }

    /// Set the interestingness oracle.
    pub fn set_condition(&mut self, condition: Box<dyn IsInteresting>) {
        self.condition = Some(condition);
    }

    /// Use an existing directory for intermediate artifacts instead of
    /// creating a fresh `tmpN` directory.
    pub fn set_temp_dir<P: Into<PathBuf>>(&mut self, temp_dir: P) {
        self.temp_dir = Some(temp_dir.into());
    }

    /// How many candidates have been judged so far.
    pub fn test_count(&self) -> usize {
        self.test_count
    }

    /// The cumulative number of atoms across all judged candidates.
    pub fn test_total(&self) -> usize {
        self.test_total
    }

    /// Run the reduction to completion and return the process exit code.
    pub fn run(&mut self) -> Result<i32> {
        if let Some(condition) = self.condition.as_mut() {
            condition.init()?;
        }

        if self.temp_dir.is_none() {
            let dir = create_temp_dir()?;
            info!(
                "Intermediate files will be stored in {}{}.",
                dir.display(),
                std::path::MAIN_SEPARATOR
            );
            self.temp_dir = Some(dir);
        }

        let strategy = self.strategy.take().expect("no strategy has been set");
        let testcase = self.testcase.take().expect("no testcase has been set");
        let atom = testcase.atom();

        let outcome = strategy.main(testcase, self);
        self.strategy = Some(strategy);

        let cleaned = match self.condition.as_mut() {
            Some(condition) => condition.cleanup(),
            None => Ok(()),
        };

        // Make sure we exit with the last interesting testcase on disk, even
        // when the strategy failed part-way.
        if let Some(last) = &self.last_interesting {
            if let Err(e) = last.dump() {
                warn!(
                    "Unable to write the last interesting testcase to {}: {}",
                    last.filename().display(),
                    e
                );
            }
        }

        let code = outcome?;
        cleaned?;

        info!("  Tests performed: {}", self.test_count);
        info!("  Test total: {}", quantity(self.test_total, atom));

        Ok(code)
    }
}

impl TestRunner for Lithium {
    fn interesting(&mut self, testcase: &Testcase, write_it: bool) -> Result<bool> {
        if write_it {
            testcase.dump()?;
        }

        self.test_count += 1;
        self.test_total += testcase.len();

        let condition = self.condition.as_mut().expect("no condition has been set");
        let interesting = condition.is_interesting(testcase.filename())?;

        // Save an extra copy of the file inside the temp directory. This is
        // useful if you're reducing an assertion and encounter a crash: it
        // gives you a way to try to reproduce the crash.
        let tag = if interesting { "interesting" } else { "boring" };
        let archive = self.temp_filename(tag, true);
        testcase.dump_to(archive)?;

        if interesting {
            self.last_interesting = Some(testcase.clone());
        }

        Ok(interesting)
    }

    fn temp_filename(&mut self, stem: &str, use_number: bool) -> PathBuf {
        let mut name = if use_number {
            let numbered = format!("{}-{}", self.temp_file_count, stem);
            self.temp_file_count += 1;
            numbered
        } else {
            stem.to_string()
        };
        name.push_str(&self.extension);
        self.temp_dir
            .as_ref()
            .expect("no temp dir has been set")
            .join(name)
    }
}

// Create a fresh `tmpN` directory in the working directory, counting up
// until an unused name is found.
fn create_temp_dir() -> Result<PathBuf> {
    let mut index = 1usize;
    loop {
        let dir = PathBuf::from(format!("tmp{}", index));
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => index += 1,
            Err(e) => return Err(e.into()),
        }
    }
}
