//! Classical delta debugging over a power-of-two chunk schedule.

use super::{
    add_chunk_args, process_chunk_args, ChunkOptions, ReductionIterator, Repeat,
};
use crate::error::Result;
use crate::traits::Strategy;
use crate::util::{largest_power_of_two_smaller_than, quantity};
use clap::{App, ArgMatches};
use log::{info, warn};
use std::cmp;
use std::time::Instant;

/// The main reduction algorithm.
///
/// This strategy attempts to remove chunks which might not be interesting
/// code, but which can be removed independently of any other. This happens
/// frequently with values which are computed, but either after the execution,
/// or never used to influence the interesting part:
///
/// ```text
/// a = compute();
/// b = compute();   <-- !!!
/// interesting(a);
/// c = compute();   <-- !!!
/// ```
#[derive(Clone, Debug, Default)]
pub struct Minimize {
    /// Chunk schedule configuration.
    pub options: ChunkOptions,
}

impl Minimize {
    // The drive loop, shared with CollapseEmptyBraces which injects a
    // post-round rewrite.
    pub(crate) fn reduce_with_hook(
        &self,
        iterator: &mut ReductionIterator,
        post_round: &mut dyn FnMut(&mut ReductionIterator) -> Result<()>,
    ) -> Result<()> {
        let mut chunk_size = cmp::min(
            self.options.max,
            largest_power_of_two_smaller_than(iterator.testcase().len()),
        );
        let min_chunk_size = cmp::min(chunk_size, cmp::max(self.options.min, 1));
        let mut chunk_end = iterator.testcase().len();
        let mut removed_chunks = self.options.repeat_first_round;
        let deadline = self.options.deadline();

        loop {
            if deadline.map_or(false, |deadline| Instant::now() > deadline) {
                warn!(
                    "Lithium result: run time elapsed, please perform another pass using \
                     the same arguments"
                );
                return Ok(());
            }

            // A negative chunk index means the round is over.
            if chunk_end < chunk_size {
                let artifact = iterator.temp_filename(&format!("did-round-{}", chunk_size));
                iterator.testcase().dump_to(artifact)?;

                // If the testcase is empty, end minimization.
                if iterator.testcase().is_empty() {
                    info!(
                        "Lithium result: succeeded, reduced to: {}",
                        quantity(iterator.testcase().len(), iterator.testcase().atom())
                    );
                    break;
                }

                post_round(iterator)?;

                if chunk_size <= min_chunk_size {
                    // Repeat mode is last or always and at least one chunk
                    // was removed during the last round: repeat.
                    if removed_chunks
                        && (self.options.repeat == Repeat::Always
                            || self.options.repeat == Repeat::Last)
                    {
                        info!("Starting another round of chunk size {}", chunk_size);
                        chunk_end = iterator.testcase().len();
                    } else {
                        info!(
                            "Lithium result: succeeded, reduced to: {}",
                            quantity(iterator.testcase().len(), iterator.testcase().atom())
                        );
                        break;
                    }
                } else if removed_chunks
                    && self.options.repeat == Repeat::Always
                    && chunk_size < iterator.testcase().len()
                {
                    info!("Starting another round of chunk size {}", chunk_size);
                    chunk_end = iterator.testcase().len();
                } else {
                    chunk_end = iterator.testcase().len();
                    while chunk_size > 1 {
                        chunk_size >>= 1;
                        // Only settle on a chunk size smaller than the number
                        // of remaining parts, so a whole-file chunk isn't
                        // wasted on an already-failed attempt.
                        if chunk_size < iterator.testcase().len() {
                            break;
                        }
                    }

                    info!("");
                    info!("Reducing chunk size to {}", chunk_size);
                }

                removed_chunks = false;
            }

            let chunk_start = chunk_end.saturating_sub(chunk_size);
            let description = format!(
                "Removing chunk from {} to {} of {}",
                chunk_start,
                chunk_end,
                iterator.testcase().len()
            );
            let mut candidate = iterator.testcase().clone();
            candidate.rmslice(chunk_start, chunk_end);
            if iterator.try_testcase(candidate, &description)? == Some(true) {
                removed_chunks = true;
                // Skip the removed region rather than rescanning it.
                chunk_end = chunk_start;
            } else if chunk_size <= 2 {
                // Decrement by one so chunk sizes 1 and 2 fully cover the
                // file regardless of earlier removals.
                chunk_end -= 1;
            } else {
                chunk_end -= chunk_size;
            }
        }

        if chunk_size == 1 && !removed_chunks && self.options.repeat != Repeat::Never {
            info!(
                "  Removing any single {} from the final file makes it uninteresting!",
                iterator.testcase().atom()
            );
        }

        Ok(())
    }
}

impl Strategy for Minimize {
    fn name(&self) -> &'static str {
        "minimize"
    }

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        add_chunk_args(app)
    }

    fn process_args(&mut self, matches: &ArgMatches) -> Result<()> {
        process_chunk_args(&mut self.options, matches)
    }

    fn reduce(&self, iterator: &mut ReductionIterator) -> Result<()> {
        self.reduce_with_hook(iterator, &mut |_| Ok(()))
    }
}
