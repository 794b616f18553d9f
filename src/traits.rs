//! Interfaces between the reduction engine, the strategies, and the oracle.

use crate::error;
use crate::strategies::ReductionIterator;
use crate::test_case::Testcase;
use crate::util::{quantity, summary_header};
use log::info;
use std::fmt;
use std::path;

/// An oracle that decides whether a candidate testcase is *interesting*.
///
/// Interestingness is whatever behavior the user is trying to preserve while
/// the testcase shrinks: a crash, an assertion, a particular output line. A
/// candidate that is not interesting is abandoned.
///
/// The judgement should be deterministic and idempotent: a reduction is only
/// meaningful if re-running the oracle on the final file reproduces it.
pub trait IsInteresting {
    /// Called once before the first judgement.
    fn init(&mut self) -> error::Result<()> {
        Ok(())
    }

    /// Return `true` if the testcase written at `testcase` is interesting,
    /// `false` otherwise.
    fn is_interesting(&mut self, testcase: &path::Path) -> error::Result<bool>;

    /// Called once after the last judgement, even if the reduction failed.
    fn cleanup(&mut self) -> error::Result<()> {
        Ok(())
    }
}

/// The engine-side services a running strategy needs: judging candidates and
/// naming intermediate artifacts.
///
/// The engine's implementation writes each candidate to the testcase file,
/// consults the [`IsInteresting`] oracle on it, and archives a copy of every
/// attempt inside the temp directory.
///
/// [`IsInteresting`]: trait.IsInteresting.html
pub trait TestRunner {
    /// Judge a candidate. When `write_it` is true the candidate is written to
    /// its file first, so the oracle can inspect it on disk; when false the
    /// file is assumed to hold these bytes already.
    fn interesting(&mut self, testcase: &Testcase, write_it: bool) -> error::Result<bool>;

    /// A path for the next intermediate artifact. When `use_number` is true
    /// the name is prefixed with a monotonic sequence number so artifacts
    /// sort in the order they were produced.
    fn temp_filename(&mut self, stem: &str, use_number: bool) -> path::PathBuf;
}

/// A reduction strategy: a recipe for enumerating candidate reductions of a
/// testcase and keeping the ones the oracle accepts.
pub trait Strategy: fmt::Debug {
    /// The name this strategy is selected by on the command line.
    fn name(&self) -> &'static str;

    /// Register any strategy-specific command line options.
    fn add_args<'a, 'b>(&self, app: clap::App<'a, 'b>) -> clap::App<'a, 'b> {
        app
    }

    /// Consume the options registered by `add_args` after parsing.
    fn process_args(&mut self, _matches: &clap::ArgMatches) -> error::Result<()> {
        Ok(())
    }

    /// Drive one reduction: offer candidates through the iterator until no
    /// further reduction is possible.
    fn reduce(&self, iterator: &mut ReductionIterator) -> error::Result<()>;

    /// The process exit code when the run completed but nothing was removed.
    fn exit_code_when_not_reduced(&self) -> i32 {
        0
    }

    /// Run the standard drive loop: check that the original testcase is
    /// interesting, reduce it, and write the best result back to disk.
    ///
    /// Returns the process exit code: `0` after a completed run, `1` when the
    /// original testcase is not interesting.
    fn main(&self, testcase: Testcase, runner: &mut dyn TestRunner) -> error::Result<i32> {
        testcase.dump_to(runner.temp_filename("original", false))?;

        if testcase.is_empty() {
            info!(
                "The file has {} so there's nothing for Lithium to try to remove!",
                quantity(0, testcase.atom())
            );
            return Ok(0);
        }

        let atom = testcase.atom();
        let orig_len = quantity(testcase.len(), atom);
        info!("The original testcase has {}.", orig_len);

        info!("Checking that the original testcase is 'interesting'...");
        if !runner.interesting(&testcase, false)? {
            info!("Lithium result: the original testcase is not 'interesting'!");
            return Ok(1);
        }

        let mut iterator = ReductionIterator::new(testcase, runner);
        self.reduce(&mut iterator)?;

        let (best, reduced) = iterator.finish();
        best.dump()?;

        summary_header();
        info!("  Initial size: {}", orig_len);
        info!("  Final size: {}", quantity(best.len(), atom));

        Ok(if reduced {
            0
        } else {
            self.exit_code_when_not_reduced()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_interesting_is_object_safe() {
        #[allow(dead_code)]
        fn take_is_interesting_by_trait_object(_: &dyn IsInteresting) {}
    }

    #[test]
    fn strategy_is_object_safe() {
        #[allow(dead_code)]
        fn take_strategy_by_trait_object(_: &dyn Strategy) {}
    }
}
