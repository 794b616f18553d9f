//! Line-based minimization that collapses empty braces between rounds.

use super::minimize::Minimize;
use super::{add_chunk_args, process_chunk_args, ChunkOptions, ReductionIterator};
use crate::error::Result;
use crate::test_case::Testcase;
use crate::traits::Strategy;
use clap::{App, ArgMatches};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::fs;
use std::io::Write;

lazy_static! {
    static ref EMPTY_BRACES: Regex = Regex::new(r"(?s-u)\{\s+\}").unwrap();
}

/// Perform standard line based reduction but collapse empty braces at the
/// end of each round. This ensures that empty braces are reduced in a single
/// pass of the reduction strategy.
///
/// ```text
/// // Original
/// function foo() {
/// }
///
/// // Post-processed
/// function foo() { }
/// ```
#[derive(Clone, Debug, Default)]
pub struct CollapseEmptyBraces {
    /// Chunk schedule configuration.
    pub options: ChunkOptions,
}

impl CollapseEmptyBraces {
    // Collapse braces separated by whitespace, re-split the rewritten file,
    // and offer the result to the oracle.
    fn collapse_braces(&self, iterator: &mut ReductionIterator) -> Result<()> {
        let raw = iterator.testcase().parts().concat();
        let modified = EMPTY_BRACES.replace_all(&raw, &b"{ }"[..]);

        // Nothing to do if no braces were collapsed.
        if modified.as_ref() == raw.as_slice() {
            return Ok(());
        }

        let filename = iterator.testcase().filename().to_path_buf();
        {
            let mut file = fs::File::create(&filename)?;
            file.write_all(iterator.testcase().before())?;
            file.write_all(&modified)?;
            file.write_all(iterator.testcase().after())?;
        }

        // Re-split the rewritten testcase so the next round sees the
        // collapsed braces as single atoms.
        let reloaded = Testcase::load(&filename, iterator.testcase().mode().clone())?;
        iterator.try_testcase(reloaded, "Collapse empty braces")?;
        Ok(())
    }
}

impl Strategy for CollapseEmptyBraces {
    fn name(&self) -> &'static str {
        "minimize-collapse-brace"
    }

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        add_chunk_args(app)
    }

    fn process_args(&mut self, matches: &ArgMatches) -> Result<()> {
        process_chunk_args(&mut self.options, matches)
    }

    fn reduce(&self, iterator: &mut ReductionIterator) -> Result<()> {
        let minimize = Minimize {
            options: self.options.clone(),
        };
        minimize.reduce_with_hook(iterator, &mut |iterator| self.collapse_braces(iterator))
    }
}
