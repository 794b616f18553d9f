//! Removal of chunk pairs surrounding code that must be kept.

use super::{
    add_chunk_args, count_s, index_s, printable_summary, process_chunk_args, rindex_s,
    ChunkOptions, ReductionIterator, Repeat,
};
use crate::error::Result;
use crate::traits::Strategy;
use crate::util::{divide_rounding_up, largest_power_of_two_smaller_than, quantity};
use clap::{App, ArgMatches};
use log::{info, warn};
use std::cmp;
use std::time::Instant;

/// This strategy attempts to remove pairs of chunks which might be
/// surrounding interesting code, but which cannot be removed independently
/// of each other. This happens frequently with patterns such as:
///
/// ```text
/// a = 42;
/// while (true) {
///    b = foo(a);      <-- !!!
///    interesting();
///    a = bar(b);      <-- !!!
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MinimizeSurroundingPairs {
    /// Chunk schedule configuration.
    pub options: ChunkOptions,
}

// The outer chunk-size loop shared by the pair strategies: run rounds of
// `round` at halving chunk sizes, repeating sizes according to `options`.
pub(crate) fn pairs_reduction(
    options: &ChunkOptions,
    iterator: &mut ReductionIterator,
    mut round: impl FnMut(usize, Option<Instant>, &mut ReductionIterator) -> Result<bool>,
) -> Result<()> {
    let mut chunk_size = cmp::min(
        options.max,
        largest_power_of_two_smaller_than(iterator.testcase().len()),
    );
    let final_chunk_size = cmp::max(options.min, 1);
    let deadline = options.deadline();

    loop {
        let any_chunks_removed = round(chunk_size, deadline, iterator)?;

        let artifact = iterator.temp_filename(&format!("did-round-{}", chunk_size));
        iterator.testcase().dump_to(artifact)?;

        if deadline.map_or(false, |deadline| Instant::now() > deadline) {
            warn!(
                "Lithium result: run time elapsed, please perform another pass using \
                 the same arguments"
            );
            return Ok(());
        }

        let last = chunk_size <= final_chunk_size;

        if any_chunks_removed
            && (options.repeat == Repeat::Always || (options.repeat == Repeat::Last && last))
        {
            // Repeat with the same chunk size.
            continue;
        }

        if last {
            break;
        }

        chunk_size >>= 1;
    }

    if final_chunk_size == 1 && options.repeat != Repeat::Never {
        info!(
            "  Removing any single {} from the final file makes it uninteresting!",
            iterator.testcase().atom()
        );
    }

    Ok(())
}

// Log the standard end-of-round report for a pair strategy.
pub(crate) fn log_round_summary(
    chunk_size: usize,
    summary: &[u8],
    atoms_surviving: usize,
    atoms_removed: usize,
    atom: &str,
) {
    info!("");
    info!("Done with a round of chunk size {}!", chunk_size);
    info!(
        "{} survived; {} removed.",
        quantity(count_s(summary), "chunk"),
        quantity(summary.iter().filter(|&&c| c == b'-').count(), "chunk")
    );
    info!(
        "{} survived; {} removed.",
        quantity(atoms_surviving, atom),
        quantity(atoms_removed, atom)
    );
    info!("Which chunks survived: {}", printable_summary(summary));
    info!("");
}

impl MinimizeSurroundingPairs {
    // One run through the testcase, removing surrounding pairs of chunks of
    // size `chunk_size`. Returns whether anything was removed.
    fn try_removing_chunks(
        &self,
        chunk_size: usize,
        deadline: Option<Instant>,
        iterator: &mut ReductionIterator,
    ) -> Result<bool> {
        let mut chunks_removed = 0usize;
        let mut atoms_removed = 0usize;

        let atoms_initial = iterator.testcase().len();
        let num_chunks = divide_rounding_up(atoms_initial, chunk_size);

        // Not enough chunks to remove surrounding blocks.
        if num_chunks < 3 {
            return Ok(false);
        }

        info!(
            "Starting a round with chunks of {}.",
            quantity(chunk_size, iterator.testcase().atom())
        );

        let mut summary = vec![b'S'; num_chunks];
        let mut chunk_start = chunk_size;
        let mut before_chunk_idx = 0usize;
        let mut keep_chunk_idx = 1usize;
        let mut after_chunk_idx = 2usize;

        'walk: while chunk_start + chunk_size < iterator.testcase().len() {
            if deadline.map_or(false, |deadline| Instant::now() > deadline) {
                return Ok(chunks_removed > 0);
            }

            let chunk_bef_start = chunk_start.saturating_sub(chunk_size);
            let chunk_bef_end = chunk_start;
            let chunk_aft_start = cmp::min(iterator.testcase().len(), chunk_start + chunk_size);
            let chunk_aft_end = cmp::min(iterator.testcase().len(), chunk_aft_start + chunk_size);
            let description = format!(
                "Removing chunk #{} & #{} of {} chunks of size {}",
                before_chunk_idx, after_chunk_idx, num_chunks, chunk_size
            );

            let mut suggestion = iterator.testcase().clone();
            suggestion.rmslice(chunk_aft_start, chunk_aft_end);
            suggestion.rmslice(chunk_bef_start, chunk_bef_end);
            if iterator.try_testcase(suggestion, &description)? == Some(true) {
                chunks_removed += 2;
                atoms_removed += chunk_bef_end - chunk_bef_start;
                atoms_removed += chunk_aft_end - chunk_aft_start;
                summary[before_chunk_idx] = b'-';
                summary[after_chunk_idx] = b'-';

                // The kept chunk's start is now sooner, since the chunk
                // before it is gone.
                chunk_start = chunk_start.saturating_sub(chunk_size);
                match rindex_s(&summary, keep_chunk_idx) {
                    // Keep removing surrounding chunks of the same part.
                    Some(idx) => before_chunk_idx = idx,
                    None => {
                        // No surviving chunk remains on the left-hand side;
                        // shift everything over by one surviving chunk.
                        before_chunk_idx = keep_chunk_idx;
                        keep_chunk_idx = match index_s(&summary, keep_chunk_idx + 1) {
                            Some(idx) => idx,
                            None => break 'walk,
                        };
                        chunk_start += chunk_size;
                    }
                }
            } else {
                // Shift the chunk cursors to the next surviving chunk.
                before_chunk_idx = keep_chunk_idx;
                keep_chunk_idx = after_chunk_idx;
                chunk_start += chunk_size;
            }

            after_chunk_idx = match index_s(&summary, keep_chunk_idx + 1) {
                Some(idx) => idx,
                None => break 'walk,
            };
        }

        let atoms_surviving = atoms_initial - atoms_removed;
        log_round_summary(
            chunk_size,
            &summary,
            atoms_surviving,
            atoms_removed,
            iterator.testcase().atom(),
        );

        Ok(chunks_removed > 0)
    }
}

impl Strategy for MinimizeSurroundingPairs {
    fn name(&self) -> &'static str {
        "minimize-around"
    }

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        add_chunk_args(app)
    }

    fn process_args(&mut self, matches: &ArgMatches) -> Result<()> {
        process_chunk_args(&mut self.options, matches)
    }

    fn reduce(&self, iterator: &mut ReductionIterator) -> Result<()> {
        let options = self.options.clone();
        pairs_reduction(&options, iterator, |chunk_size, deadline, iterator| {
            self.try_removing_chunks(chunk_size, deadline, iterator)
        })
    }
}
