//! Rewriting of dotted property accesses into bare globals.

use super::{
    add_chunk_args, printable_summary, process_chunk_args, ChunkOptions, ReductionIterator,
    Repeat,
};
use crate::error::Result;
use crate::traits::Strategy;
use crate::util::{divide_rounding_up, largest_power_of_two_smaller_than, quantity};
use clap::{App, ArgMatches};
use log::info;
use regex::bytes::{NoExpand, Regex};
use std::cmp;

/// This strategy attempts to remove members, such that other strategies can
/// then move the lines outside the functions. The goal is to rename
/// variables at the same time, such that the program remains valid, while
/// removing the dependency on the object the member is part of:
///
/// ```text
/// function Foo() {
///   this.list = [];
/// }
/// Foo.prototype.push = function(a) {
///   this.list.push(a);
/// }
/// ```
///
/// might become:
///
/// ```text
/// function Foo() {
///   list = [];
/// }
/// push = function(a) {
///   list.push(a);
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct ReplacePropertiesByGlobals {
    /// Chunk schedule configuration.
    pub options: ChunkOptions,
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

// The identifiers on the right-hand side of dotted accesses in `line`, in
// order of appearance.
fn dotted_words(line: &[u8]) -> Vec<Vec<u8>> {
    let mut words = Vec::new();
    for i in 0..line.len() {
        if line[i] != b'.' || i == 0 || !is_word_byte(line[i - 1]) {
            continue;
        }
        let mut end = i + 1;
        while end < line.len() && is_word_byte(line[end]) {
            end += 1;
        }
        if end > i + 1 {
            words.push(line[i + 1..end].to_vec());
        }
    }
    words
}

impl ReplacePropertiesByGlobals {
    // One run through the testcase at `chunk_size`, shortening dotted
    // accesses. Returns how many bytes were removed.
    fn try_making_globals(
        &self,
        chunk_size: usize,
        num_chars: usize,
        iterator: &mut ReductionIterator,
    ) -> Result<usize> {
        let mut num_removed_chars = 0usize;
        let num_chunks = divide_rounding_up(iterator.testcase().len(), chunk_size);
        let final_chunk_size = cmp::max(self.options.min, 1);

        // Map identifiers to the parts in which they appear after a dot,
        // preserving first-seen order.
        let mut words: Vec<(Vec<u8>, Vec<usize>)> = Vec::new();
        for (chunk, line) in iterator.testcase().parts().iter().enumerate() {
            if !iterator.testcase().reducible()[chunk] {
                continue;
            }
            for word in dotted_words(line) {
                match words.iter_mut().find(|(known, _)| *known == word) {
                    Some((_, chunks)) => chunks.push(chunk),
                    None => words.push((word, vec![chunk])),
                }
            }
        }

        // All patterns have been removed successfully.
        if words.is_empty() {
            return Ok(0);
        }

        info!(
            "Starting a round with chunks of {}.",
            quantity(chunk_size, iterator.testcase().atom())
        );
        let mut summary = vec![b'S'; num_chunks];

        for (word, chunks) in &words {
            // Group the occurrences by chunk index, preserving order.
            let mut chunk_indexes: Vec<(usize, Vec<usize>)> = Vec::new();
            for &chunk_start in chunks {
                let chunk_idx = chunk_start / chunk_size;
                match chunk_indexes.iter_mut().find(|(idx, _)| *idx == chunk_idx) {
                    Some((_, starts)) => starts.push(chunk_start),
                    None => chunk_indexes.push((chunk_idx, vec![chunk_start])),
                }
            }

            let word_text = String::from_utf8_lossy(word).into_owned();
            let pattern = Regex::new(&format!(r"(?-u)[\w_.]+\.{}", word_text))
                .expect("dotted words are plain identifiers");

            for (chunk_idx, chunk_starts) in &chunk_indexes {
                // Unless this is the final size, only try removing grouped
                // prefixes; single occurrences wait for the final size so
                // they can be removed individually.
                if chunk_starts.len() == 1 && final_chunk_size != chunk_size {
                    continue;
                }

                let description = format!(
                    "'{}' in chunk #{} of {} chunks of size {}",
                    word_text, chunk_idx, num_chunks, chunk_size
                );

                let mut maybe_removed = 0usize;
                let mut candidate = iterator.testcase().clone();
                for &chunk_start in chunk_starts {
                    let old = candidate.parts()[chunk_start].clone();
                    let subst = pattern.replace_all(&old, NoExpand(word)).into_owned();
                    maybe_removed += old.len() - subst.len();
                    candidate.set_part(chunk_start, subst);
                }

                if iterator
                    .try_testcase(candidate, &format!("Removing prefixes of {}", description))?
                    == Some(true)
                {
                    num_removed_chars += maybe_removed;
                    summary[*chunk_idx] = b's';
                }
            }
        }

        let num_surviving_chars = num_chars - num_removed_chars;
        info!("");
        info!("Done with a round of chunk size {}!", chunk_size);
        info!(
            "{} survived; {} shortened.",
            quantity(summary.iter().filter(|&&c| c == b'S').count(), "chunk"),
            quantity(summary.iter().filter(|&&c| c == b's').count(), "chunk")
        );
        info!(
            "{} survived; {} removed.",
            quantity(num_surviving_chars, "character"),
            quantity(num_removed_chars, "character")
        );
        info!("Which chunks survived: {}", printable_summary(&summary));
        info!("");

        Ok(num_removed_chars)
    }
}

impl Strategy for ReplacePropertiesByGlobals {
    fn name(&self) -> &'static str {
        "replace-properties-by-globals"
    }

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        add_chunk_args(app)
    }

    fn process_args(&mut self, matches: &ArgMatches) -> Result<()> {
        process_chunk_args(&mut self.options, matches)
    }

    fn reduce(&self, iterator: &mut ReductionIterator) -> Result<()> {
        let mut chunk_size = cmp::min(
            self.options.max,
            2 * largest_power_of_two_smaller_than(iterator.testcase().len()),
        );
        let final_chunk_size = cmp::max(self.options.min, 1);

        let orig_num_chars: usize = iterator
            .testcase()
            .parts()
            .iter()
            .map(|part| part.len())
            .sum();
        let mut num_chars = orig_num_chars;

        loop {
            let num_removed_chars = self.try_making_globals(chunk_size, num_chars, iterator)?;
            num_chars -= num_removed_chars;

            let artifact = iterator.temp_filename(&format!("did-round-{}", chunk_size));
            iterator.testcase().dump_to(artifact)?;

            let last = chunk_size <= final_chunk_size;

            if num_removed_chars > 0
                && (self.options.repeat == Repeat::Always
                    || (self.options.repeat == Repeat::Last && last))
            {
                // Repeat with the same chunk size.
            } else if last {
                break;
            } else {
                chunk_size >>= 1;
            }
        }

        info!("  Initial size: {}", quantity(orig_num_chars, "character"));
        info!("  Final size: {}", quantity(num_chars, "character"));

        if final_chunk_size == 1 && self.options.repeat != Repeat::Never {
            info!(
                "  Removing any single {} from the final file makes it uninteresting!",
                iterator.testcase().atom()
            );
        }

        Ok(())
    }
}
