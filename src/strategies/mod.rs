//! Reduction strategies and the iterator protocol that drives them.
//!
//! A strategy enumerates candidate reductions of the current best testcase
//! and offers each one to the [`ReductionIterator`], which de-duplicates
//! candidates, consults the oracle through the engine's
//! [`TestRunner`](../traits/trait.TestRunner.html), and tracks the best
//! interesting testcase seen so far.

use crate::error::{Error, Result};
use crate::test_case::Testcase;
use crate::traits::{Strategy, TestRunner};
use crate::util::is_power_of_two;
use clap::{App, Arg, ArgMatches};
use log::{debug, info};
use sha2::{Digest, Sha512};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

mod balanced;
mod collapse_braces;
mod minimize;
mod replace_arguments;
mod replace_properties;
mod surrounding;

pub use self::balanced::MinimizeBalancedPairs;
pub use self::collapse_braces::CollapseEmptyBraces;
pub use self::minimize::Minimize;
pub use self::replace_arguments::ReplaceArgumentsByGlobals;
pub use self::replace_properties::ReplacePropertiesByGlobals;
pub use self::surrounding::MinimizeSurroundingPairs;

/// The name of the strategy used when `--strategy` is not given.
pub const DEFAULT: &str = "minimize";

/// The names of every available strategy, for CLI help and validation.
pub const NAMES: &[&str] = &[
    "check-only",
    "minimize",
    "minimize-around",
    "minimize-balanced",
    "minimize-collapse-brace",
    "replace-arguments-by-globals",
    "replace-properties-by-globals",
];

/// Look up a strategy by its CLI name.
pub fn by_name(name: &str) -> Result<Box<dyn Strategy>> {
    match name {
        "check-only" => Ok(Box::new(CheckOnly)),
        "minimize" => Ok(Box::new(Minimize::default())),
        "minimize-around" => Ok(Box::new(MinimizeSurroundingPairs::default())),
        "minimize-balanced" => Ok(Box::new(MinimizeBalancedPairs::default())),
        "minimize-collapse-brace" => Ok(Box::new(CollapseEmptyBraces::default())),
        "replace-arguments-by-globals" => Ok(Box::new(ReplaceArgumentsByGlobals::default())),
        "replace-properties-by-globals" => Ok(Box::new(ReplacePropertiesByGlobals::default())),
        _ => Err(Error::Config(format!("unknown strategy: {}", name))),
    }
}

/// Stateful cursor over one reduction.
///
/// Every candidate offered through [`try_testcase`](#method.try_testcase) is
/// hashed over `before`, each part, and `after`; a candidate seen before is
/// skipped without consulting the oracle. A novel candidate is judged
/// immediately and, on success, becomes the new best testcase.
pub struct ReductionIterator<'a> {
    runner: &'a mut dyn TestRunner,
    best: Testcase,
    attempt: Option<Testcase>,
    last_feedback: Option<bool>,
    any_success: bool,
    tried: HashSet<Vec<u8>>,
    description: String,
}

impl<'a> fmt::Debug for ReductionIterator<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReductionIterator")
            .field("best", &self.best)
            .field("attempt", &self.attempt)
            .field("last_feedback", &self.last_feedback)
            .field("any_success", &self.any_success)
            .field("tried", &self.tried.len())
            .field("description", &self.description)
            .finish()
    }
}

fn candidate_hash(testcase: &Testcase) -> Vec<u8> {
    // Hash before/after too, since different testcase types may split them
    // inconsistently.
    let mut hasher = Sha512::new();
    hasher.update(testcase.before());
    for part in testcase.parts() {
        hasher.update(part);
    }
    hasher.update(testcase.after());
    hasher.finalize().to_vec()
}

impl<'a> ReductionIterator<'a> {
    /// Start a reduction of `testcase`, judging candidates through `runner`.
    pub fn new(testcase: Testcase, runner: &'a mut dyn TestRunner) -> ReductionIterator<'a> {
        ReductionIterator {
            runner,
            best: testcase,
            attempt: None,
            last_feedback: None,
            any_success: false,
            tried: HashSet::new(),
            description: "Reduction".into(),
        }
    }

    /// Offer a candidate to the oracle.
    ///
    /// Returns `Ok(None)` if a byte-identical candidate was already offered
    /// during this reduction, and `Ok(Some(verdict))` otherwise.
    pub fn try_testcase(
        &mut self,
        testcase: Testcase,
        description: &str,
    ) -> Result<Option<bool>> {
        assert!(self.attempt.is_none(), "Already attempting a testcase");

        if !self.tried.insert(candidate_hash(&testcase)) {
            return Ok(None);
        }

        self.last_feedback = None;
        self.description = description.to_string();
        debug!("Attempting: {}", self.description);
        self.attempt = Some(testcase);

        let success = self
            .runner
            .interesting(self.attempt.as_ref().unwrap(), true)?;
        if success {
            info!("{} was successful", self.description);
        } else {
            info!("{} made the file uninteresting", self.description);
        }
        self.feedback(success);
        Ok(Some(success))
    }

    /// Record the oracle's verdict for the pending attempt.
    ///
    /// Panics if no attempt is pending or feedback was already given.
    pub fn feedback(&mut self, success: bool) {
        let attempt = self.attempt.take().expect("No testcase being attempted");
        assert!(self.last_feedback.is_none(), "Already got feedback");
        self.last_feedback = Some(success);
        if success {
            self.best = attempt;
            self.any_success = true;
        }
    }

    /// The verdict of the latest attempt.
    ///
    /// Panics if no attempt has been judged yet.
    pub fn last_feedback(&self) -> bool {
        self.last_feedback.expect("No feedback received yet")
    }

    /// The best interesting testcase seen so far.
    pub fn testcase(&self) -> &Testcase {
        &self.best
    }

    /// Whether any attempt has been accepted.
    pub fn reduced(&self) -> bool {
        self.any_success
    }

    /// A human-readable description of the latest attempt.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// A numbered path inside the temp directory, for round artifacts.
    pub fn temp_filename(&mut self, stem: &str) -> PathBuf {
        self.runner.temp_filename(stem, true)
    }

    /// Finish the reduction, yielding the best testcase and whether any
    /// reduction was successful.
    pub fn finish(self) -> (Testcase, bool) {
        (self.best, self.any_success)
    }
}

/// Whether a chunk size is repeated after a round that removed something.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repeat {
    /// Repeat every chunk size that removed chunks.
    Always,
    /// Only repeat the final (smallest) chunk size.
    Last,
    /// Never repeat a chunk size.
    Never,
}

/// Options shared by the minimize family of strategies.
#[derive(Clone, Debug)]
pub struct ChunkOptions {
    /// Smallest chunk size to try; must be a power of two.
    pub min: usize,
    /// Largest chunk size to try; must be a power of two.
    pub max: usize,
    /// Repeat behavior for chunk sizes that removed something.
    pub repeat: Repeat,
    /// Treat the first round as if it removed chunks, so it may repeat.
    pub repeat_first_round: bool,
    /// Stop gracefully after this much wall-clock time.
    pub stop_after: Option<Duration>,
}

impl Default for ChunkOptions {
    fn default() -> ChunkOptions {
        ChunkOptions {
            min: 1,
            max: 1 << 30,
            repeat: Repeat::Last,
            repeat_first_round: false,
            stop_after: None,
        }
    }
}

impl ChunkOptions {
    /// The deadline implied by `stop_after`, measured from now.
    pub fn deadline(&self) -> Option<Instant> {
        self.stop_after.map(|limit| Instant::now() + limit)
    }
}

pub(crate) fn add_chunk_args<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
    app.arg(
        Arg::with_name("min")
            .long("min")
            .takes_value(true)
            .value_name("N")
            .help("Minimum chunk size; must be a power of two. default: 1"),
    )
    .arg(
        Arg::with_name("max")
            .long("max")
            .takes_value(true)
            .value_name("N")
            .help("Maximum chunk size; must be a power of two. default: about half of the file"),
    )
    .arg(
        Arg::with_name("repeat")
            .long("repeat")
            .takes_value(true)
            .possible_values(&["always", "last", "never"])
            .help("Whether to repeat a chunk size if chunks are removed. default: last"),
    )
    .arg(
        Arg::with_name("chunk-size")
            .long("chunk-size")
            .takes_value(true)
            .value_name("N")
            .help("Shortcut for repeat=never, min=n, max=n. Chunk size must be a power of two."),
    )
    .arg(
        Arg::with_name("repeat-first-round")
            .long("repeat-first-round")
            .help("Treat the first round as if it removed chunks; possibly repeat it."),
    )
    .arg(
        Arg::with_name("max-run-time")
            .long("max-run-time")
            .takes_value(true)
            .value_name("SECS")
            .help("If reduction takes more than n seconds, stop (and print instructions for continuing)."),
    )
}

fn parse_number(matches: &ArgMatches, name: &str) -> Result<Option<usize>> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| Error::Config(format!("--{} requires a number, got {:?}", name, value))),
    }
}

pub(crate) fn process_chunk_args(options: &mut ChunkOptions, matches: &ArgMatches) -> Result<()> {
    if let Some(chunk_size) = parse_number(matches, "chunk-size")? {
        options.min = chunk_size;
        options.max = chunk_size;
        options.repeat = Repeat::Never;
    } else {
        if let Some(min) = parse_number(matches, "min")? {
            options.min = min;
        }
        if let Some(max) = parse_number(matches, "max")? {
            options.max = max;
        }
        options.repeat = match matches.value_of("repeat") {
            None => options.repeat,
            Some("always") => Repeat::Always,
            Some("last") => Repeat::Last,
            Some("never") => Repeat::Never,
            Some(other) => {
                return Err(Error::Config(format!("unknown repeat mode: {}", other)));
            }
        };
    }
    options.repeat_first_round = matches.is_present("repeat-first-round");
    if let Some(secs) = parse_number(matches, "max-run-time")? {
        options.stop_after = Some(Duration::from_secs(secs as u64));
    }

    if !is_power_of_two(options.min) {
        return Err(Error::Config("Min must be a power of two.".into()));
    }
    if !is_power_of_two(options.max) {
        return Err(Error::Config("Max must be a power of two.".into()));
    }
    Ok(())
}

// The index of the next surviving chunk at or after `from`, if any.
pub(crate) fn index_s(summary: &[u8], from: usize) -> Option<usize> {
    (from.min(summary.len())..summary.len()).find(|&i| summary[i] == b'S')
}

// The index of the last surviving chunk before `until`, if any.
pub(crate) fn rindex_s(summary: &[u8], until: usize) -> Option<usize> {
    (0..until.min(summary.len())).rev().find(|&i| summary[i] == b'S')
}

pub(crate) fn count_s(summary: &[u8]) -> usize {
    summary.iter().filter(|&&c| c == b'S').count()
}

// Render a chunk summary in space-separated groups of two, like the round
// reports do.
pub(crate) fn printable_summary(summary: &[u8]) -> String {
    summary
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Only check whether the testcase is interesting; never reduce it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckOnly;

impl Strategy for CheckOnly {
    fn name(&self) -> &'static str {
        "check-only"
    }

    fn reduce(&self, iterator: &mut ReductionIterator) -> Result<()> {
        // check doesn't reduce, only checks
        let testcase = iterator.testcase().clone();
        iterator.try_testcase(testcase, "Check")?;
        Ok(())
    }

    fn main(&self, testcase: Testcase, runner: &mut dyn TestRunner) -> Result<i32> {
        let result = runner.interesting(&testcase, false)?;
        info!(
            "Lithium result: {}interesting.",
            if result { "" } else { "not " }
        );
        Ok(if result { 0 } else { 1 })
    }
}
