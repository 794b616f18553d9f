//! Removal of bracket-balanced chunk pairs, with optional relocation of
//! interior chunks.

use super::surrounding::{log_round_summary, pairs_reduction};
use super::{
    add_chunk_args, count_s, index_s, process_chunk_args, ChunkOptions, ReductionIterator,
};
use crate::error::Result;
use crate::traits::Strategy;
use crate::util::{divide_rounding_up, quantity};
use clap::{App, Arg, ArgMatches};
use log::info;
use std::cmp;
use std::time::Instant;

/// This strategy attempts to remove balanced chunks which might be
/// surrounding interesting code, but which cannot be removed independently
/// of each other. This happens frequently with patterns such as:
///
/// ```text
/// ...;
/// if (cond) {        <-- !!!
///    ...;
///    interesting();
///    ...;
/// }                  <-- !!!
/// ...;
/// ```
///
/// The value of the condition might not be interesting, but in order to
/// reach the interesting code we still have to compute it, and keep extra
/// code alive.
#[derive(Clone, Debug, Default)]
pub struct MinimizeBalancedPairs {
    /// Chunk schedule configuration.
    pub options: ChunkOptions,
    /// Try relocating interior chunks out of a pair whose removal was
    /// rejected. This can introduce reducing loops, hence opt-in.
    pub with_experimental_move: bool,
}

// Split `lst` five ways and reassemble with the `[start, start + step)`
// window moved to the far side of the `[start + step, stop + step)` span.
fn split_five<T: Clone>(
    lst: &[T],
    step: usize,
    ignore_before: usize,
    start: usize,
    stop: usize,
) -> [Vec<T>; 5] {
    let len = lst.len();
    let a = ignore_before.min(len);
    let b = start.min(len);
    let c = (start + step).min(len);
    let d = (stop + step).min(len);
    [
        lst[..a].to_vec(),
        lst[a..b].to_vec(),
        lst[b..c].to_vec(),
        lst[c..d].to_vec(),
        lst[d..].to_vec(),
    ]
}

fn join_moved_after<T: Clone>(parts: [Vec<T>; 5]) -> Vec<T> {
    let [head, gap, window, span, tail] = parts;
    [head, gap, span, window, tail].concat()
}

fn join_moved_before<T: Clone>(parts: [Vec<T>; 5]) -> Vec<T> {
    let [head, gap, window, span, tail] = parts;
    [head, window, gap, span, tail].concat()
}

fn move_after<T: Clone>(lst: &[T], step: usize, ignore: usize, start: usize, stop: usize) -> Vec<T> {
    join_moved_after(split_five(lst, step, ignore, start, stop))
}

fn move_before<T: Clone>(
    lst: &[T],
    step: usize,
    ignore: usize,
    start: usize,
    stop: usize,
) -> Vec<T> {
    join_moved_before(split_five(lst, step, ignore, start, stop))
}

// Per-chunk count of `open` minus `close` over the chunk's parts.
fn count_diff(parts: &[Vec<u8>], chunk: usize, chunk_size: usize, open: u8, close: u8) -> i64 {
    let start = cmp::min(parts.len(), chunk * chunk_size);
    let end = cmp::min(parts.len(), start + chunk_size);
    parts[start..end]
        .iter()
        .flat_map(|part| part.iter())
        .map(|&byte| {
            if byte == open {
                1
            } else if byte == close {
                -1
            } else {
                0
            }
        })
        .sum()
}

impl MinimizeBalancedPairs {
    // One run through the testcase at `chunk_size`, removing balanced chunks
    // and pairs. Returns whether anything was removed.
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
        if num_chunks < 2 {
            return Ok(false);
        }

        info!(
            "Starting a round with chunks of {}.",
            quantity(chunk_size, iterator.testcase().atom())
        );

        let mut summary = vec![b'S'; num_chunks];
        let parts = iterator.testcase().parts();
        let mut curly: Vec<i64> = (0..num_chunks)
            .map(|i| count_diff(parts, i, chunk_size, b'{', b'}'))
            .collect();
        let mut square: Vec<i64> = (0..num_chunks)
            .map(|i| count_diff(parts, i, chunk_size, b'[', b']'))
            .collect();
        let mut normal: Vec<i64> = (0..num_chunks)
            .map(|i| count_diff(parts, i, chunk_size, b'(', b')'))
            .collect();
        let mut chunk_start = 0usize;
        let mut lhs_chunk_idx = 0usize;

        'walk: while chunk_start < iterator.testcase().len() {
            if deadline.map_or(false, |deadline| Instant::now() > deadline) {
                return Ok(chunks_removed > 0);
            }

            let description = format!(
                "chunk #{} of {} chunks of size {}",
                lhs_chunk_idx, num_chunks, chunk_size
            );

            debug_assert_eq!(
                count_s(&summary[..lhs_chunk_idx]) * chunk_size,
                chunk_start,
                "the chunk_start should correspond to the lhs_chunk_idx modulo the \
                 removed chunks"
            );

            let mut chunk_lhs_start = chunk_start;
            let mut chunk_lhs_end =
                cmp::min(iterator.testcase().len(), chunk_lhs_start + chunk_size);

            let mut n_curly = curly[lhs_chunk_idx];
            let mut n_square = square[lhs_chunk_idx];
            let mut n_normal = normal[lhs_chunk_idx];

            // If the chunk is already balanced, try to remove it alone.
            if n_curly == 0 && n_square == 0 && n_normal == 0 {
                let mut suggestion = iterator.testcase().clone();
                suggestion.rmslice(chunk_lhs_start, chunk_lhs_end);
                if iterator.try_testcase(suggestion, &format!("Removing {}", description))?
                    == Some(true)
                {
                    chunks_removed += 1;
                    atoms_removed += chunk_lhs_end - chunk_lhs_start;
                    summary[lhs_chunk_idx] = b'-';
                } else {
                    chunk_start += chunk_size;
                }
                lhs_chunk_idx = match index_s(&summary, lhs_chunk_idx + 1) {
                    Some(idx) => idx,
                    None => break 'walk,
                };
                continue;
            }

            // Otherwise look for the nearest chunk that brings all three
            // bracket counts back to zero.
            let mut rhs_chunk_idx = lhs_chunk_idx;
            for idx in lhs_chunk_idx + 1..num_chunks {
                rhs_chunk_idx = idx;
                if summary[idx] != b'S' {
                    continue;
                }
                n_curly += curly[idx];
                n_square += square[idx];
                n_normal += normal[idx];
                if n_curly < 0 || n_square < 0 || n_normal < 0 {
                    // An interior count went negative; no matching chunk
                    // exists from here.
                    break;
                }
                if n_curly == 0 && n_square == 0 && n_normal == 0 {
                    break;
                }
            }

            // No match: skip this chunk.
            if n_curly != 0 || n_square != 0 || n_normal != 0 {
                info!("Skipping {} because it is 'uninteresting'.", description);
                chunk_start += chunk_size;
                lhs_chunk_idx = match index_s(&summary, lhs_chunk_idx + 1) {
                    Some(idx) => idx,
                    None => break 'walk,
                };
                continue;
            }

            // We have a match; check if removing both ends is interesting.
            let mut chunk_rhs_start = chunk_lhs_start
                + chunk_size * count_s(&summary[lhs_chunk_idx..rhs_chunk_idx]);
            chunk_rhs_start = cmp::min(iterator.testcase().len(), chunk_rhs_start);
            let mut chunk_rhs_end =
                cmp::min(iterator.testcase().len(), chunk_rhs_start + chunk_size);

            let description = format!(
                "chunk #{} & #{} of {} chunks of size {}",
                lhs_chunk_idx, rhs_chunk_idx, num_chunks, chunk_size
            );

            let mut suggestion = iterator.testcase().clone();
            suggestion.rmslice(chunk_rhs_start, chunk_rhs_end);
            suggestion.rmslice(chunk_lhs_start, chunk_lhs_end);
            if iterator.try_testcase(suggestion, &format!("Removing {}", description))?
                == Some(true)
            {
                chunks_removed += 2;
                atoms_removed += chunk_lhs_end - chunk_lhs_start;
                atoms_removed += chunk_rhs_end - chunk_rhs_start;
                summary[lhs_chunk_idx] = b'-';
                summary[rhs_chunk_idx] = b'-';
                lhs_chunk_idx = match index_s(&summary, lhs_chunk_idx + 1) {
                    Some(idx) => idx,
                    None => break 'walk,
                };
                continue;
            }

            // Removing the pair makes the failure disappear. As we are
            // looking for removing chunks (braces), we need to make the
            // content within the braces as minimal as possible, so let us
            // try to see if we can move the interior chunks outside the
            // braces.

            if !self.with_experimental_move {
                chunk_start += chunk_size;
                lhs_chunk_idx = match index_s(&summary, lhs_chunk_idx + 1) {
                    Some(idx) => idx,
                    None => break 'walk,
                };
                continue;
            }

            let orig_chunk_idx = lhs_chunk_idx;
            let mut stay_on_same_chunk = false;
            let mut chunk_mid_start = chunk_lhs_end;
            let mut mid_chunk_idx = match index_s(&summary, lhs_chunk_idx + 1) {
                Some(idx) => idx,
                None => break 'walk,
            };

            while chunk_mid_start < chunk_rhs_start {
                debug_assert_eq!(
                    count_s(&summary[..mid_chunk_idx]) * chunk_size,
                    chunk_mid_start,
                    "the chunk_mid_start should correspond to the mid_chunk_idx modulo \
                     the removed chunks"
                );

                let description = format!(
                    "chunk #{} of {} chunks of size {}",
                    mid_chunk_idx, num_chunks, chunk_size
                );

                // Only balanced interior chunks can be relocated.
                if curly[mid_chunk_idx] != 0
                    || square[mid_chunk_idx] != 0
                    || normal[mid_chunk_idx] != 0
                {
                    info!("Keeping {} because it is 'uninteresting'.", description);
                    chunk_mid_start += chunk_size;
                    mid_chunk_idx = match index_s(&summary, mid_chunk_idx + 1) {
                        Some(idx) => idx,
                        None => break 'walk,
                    };
                    continue;
                }

                let parts = split_five(
                    iterator.testcase().parts(),
                    chunk_size,
                    chunk_lhs_start,
                    chunk_mid_start,
                    chunk_rhs_start,
                );
                let reducible = split_five(
                    iterator.testcase().reducible(),
                    chunk_size,
                    chunk_lhs_start,
                    chunk_mid_start,
                    chunk_rhs_start,
                );

                // Try moving the chunk after the right brace.
                let suggestion = iterator.testcase().with_parts(
                    join_moved_after(parts.clone()),
                    join_moved_after(reducible.clone()),
                );
                if iterator.try_testcase(suggestion, &format!("->Moving {}", description))?
                    == Some(true)
                {
                    chunk_rhs_start -= chunk_size;
                    chunk_rhs_end -= chunk_size;
                    summary = move_after(&summary, 1, lhs_chunk_idx, mid_chunk_idx, rhs_chunk_idx);
                    curly = move_after(&curly, 1, lhs_chunk_idx, mid_chunk_idx, rhs_chunk_idx);
                    square = move_after(&square, 1, lhs_chunk_idx, mid_chunk_idx, rhs_chunk_idx);
                    normal = move_after(&normal, 1, lhs_chunk_idx, mid_chunk_idx, rhs_chunk_idx);
                    rhs_chunk_idx -= 1;
                    mid_chunk_idx = match index_s(&summary, mid_chunk_idx + 1) {
                        Some(idx) => idx,
                        None => break 'walk,
                    };
                    continue;
                }

                // Try moving the chunk before the left brace.
                let suggestion = iterator
                    .testcase()
                    .with_parts(join_moved_before(parts), join_moved_before(reducible));
                if iterator.try_testcase(suggestion, &format!("<-Moving {}", description))?
                    == Some(true)
                {
                    chunk_lhs_start += chunk_size;
                    chunk_lhs_end += chunk_size;
                    chunk_mid_start += chunk_size;
                    summary = move_before(&summary, 1, lhs_chunk_idx, mid_chunk_idx, rhs_chunk_idx);
                    curly = move_before(&curly, 1, lhs_chunk_idx, mid_chunk_idx, rhs_chunk_idx);
                    square = move_before(&square, 1, lhs_chunk_idx, mid_chunk_idx, rhs_chunk_idx);
                    normal = move_before(&normal, 1, lhs_chunk_idx, mid_chunk_idx, rhs_chunk_idx);
                    lhs_chunk_idx += 1;
                    mid_chunk_idx = match index_s(&summary, mid_chunk_idx + 1) {
                        Some(idx) => idx,
                        None => break 'walk,
                    };
                    stay_on_same_chunk = true;
                    continue;
                }

                chunk_mid_start += chunk_size;
                mid_chunk_idx = match index_s(&summary, mid_chunk_idx + 1) {
                    Some(idx) => idx,
                    None => break 'walk,
                };
            }

            let _ = (chunk_lhs_end, chunk_rhs_end);
            lhs_chunk_idx = orig_chunk_idx;
            if !stay_on_same_chunk {
                chunk_start += chunk_size;
                lhs_chunk_idx = match index_s(&summary, lhs_chunk_idx + 1) {
                    Some(idx) => idx,
                    None => break 'walk,
                };
            }
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

impl Strategy for MinimizeBalancedPairs {
    fn name(&self) -> &'static str {
        "minimize-balanced"
    }

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        add_chunk_args(app).arg(
            Arg::with_name("with-experimental-move")
                .long("with-experimental-move")
                .help(
                    "Moving chunks is still a bit experimental, and it can introduce \
                     reducing loops. Use at own risk!",
                ),
        )
    }

    fn process_args(&mut self, matches: &ArgMatches) -> Result<()> {
        process_chunk_args(&mut self.options, matches)?;
        self.with_experimental_move = matches.is_present("with-experimental-move");
        Ok(())
    }

    fn reduce(&self, iterator: &mut ReductionIterator) -> Result<()> {
        let options = self.options.clone();
        pairs_reduction(&options, iterator, |chunk_size, deadline, iterator| {
            self.try_removing_chunks(chunk_size, deadline, iterator)
        })
    }
}
