//! Replacement of function arguments with global assignments.

use super::{add_chunk_args, process_chunk_args, ChunkOptions, ReductionIterator, Repeat};
use crate::error::Result;
use crate::traits::Strategy;
use crate::util::quantity;
use clap::{App, ArgMatches};
use lazy_static::lazy_static;
use log::info;
use regex::bytes::Regex;

lazy_static! {
    // Function definition with at least one argument: either a function
    // statement or an assignment of a function expression.
    static ref FN_DEF: Regex = Regex::new(
        r"(?-u)(?:function\s+(\w+)|(\w+)\s*=\s*function)\s*\((\s*\w+\s*(?:,\s*\w+\s*)*)\)"
    )
    .unwrap();
    // Anonymous function definition surrounded by parentheses (an IIFE head).
    static ref ANON_DEF: Regex = Regex::new(
        r"(?-u)\(function\s*\w*\s*\(((?:\s*\w+\s*(?:,\s*\w+\s*)*)?)\)\s*\{"
    )
    .unwrap();
    // Call of an anonymous function (an IIFE tail).
    static ref ANON_CALL: Regex =
        Regex::new(r"(?-u)\}\s*\)\s*\(((?:[^()]|\([^,()]*\))*)\)").unwrap();
    // Function calls, and some definitions.
    static ref FN_CALL: Regex =
        Regex::new(r"(?-u)((\w+)\s*\(((?:[^()]|\([^,()]*\))*)\))").unwrap();
}

/// This strategy attempts to replace arguments by globals: for each named
/// argument of a function we add a setter of the global of the same name
/// before the function call. The goal is to remove functions by making
/// empty argument lists instead:
///
/// ```text
/// function foo(a,b) {
///   list = a + b;
/// }
/// foo(2, 3)
/// ```
///
/// becomes:
///
/// ```text
/// function foo() {
///   list = a + b;
/// }
/// a = 2;
/// b = 3;
/// foo()
/// ```
///
/// The next logical step is inlining the body of the function at the call
/// site.
#[derive(Clone, Debug, Default)]
pub struct ReplaceArgumentsByGlobals {
    /// Repeat configuration; the chunk sizes are unused here.
    pub options: ChunkOptions,
}

#[derive(Debug)]
struct CallSite {
    values: Vec<Vec<u8>>,
    chunk: usize,
    pattern: Vec<u8>,
}

#[derive(Debug)]
struct Function {
    // The formal argument names, once a definition has been seen.
    defs: Option<Vec<Vec<u8>>>,
    // The argument list exactly as written in the definition.
    args_pattern: Vec<u8>,
    def_chunk: usize,
    uses: Vec<CallSite>,
}

#[derive(Debug)]
struct AnonFunction {
    defs: Vec<Vec<u8>>,
    def_chunk: usize,
    values: Vec<Vec<u8>>,
    use_chunk: usize,
}

// Split an argument list on commas, keeping surrounding whitespace with
// each argument.
fn split_args(list: &[u8]) -> Vec<Vec<u8>> {
    if list.is_empty() {
        return Vec::new();
    }
    list.split(|&byte| byte == b',')
        .map(|arg| arg.to_vec())
        .collect()
}

fn join_comma(args: &[Vec<u8>]) -> Vec<u8> {
    args.join(&[b','][..])
}

// Replace the first occurrence of `needle` in `haystack`. An empty needle
// leaves the input untouched.
fn replace_first(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return haystack.to_vec();
    }
    match haystack
        .windows(needle.len())
        .position(|window| window == needle)
    {
        Some(pos) => {
            let mut out = Vec::with_capacity(haystack.len() - needle.len() + replacement.len());
            out.extend_from_slice(&haystack[..pos]);
            out.extend_from_slice(replacement);
            out.extend_from_slice(&haystack[pos + needle.len()..]);
            out
        }
        None => haystack.to_vec(),
    }
}

fn capture_bytes(caps: &regex::bytes::Captures, group: usize) -> Vec<u8> {
    caps.get(group).map_or(Vec::new(), |m| m.as_bytes().to_vec())
}

impl ReplaceArgumentsByGlobals {
    // One run through the testcase, stripping argument lists and hoisting
    // actuals into global assignments. Returns how many arguments moved.
    fn try_arguments_as_globals(&self, iterator: &mut ReductionIterator) -> Result<usize> {
        let atom = iterator.testcase().atom();
        let mut num_moved_arguments = 0usize;
        let mut num_survived_arguments = 0usize;

        // Scan for named definitions, IIFE heads and tails, and call sites.
        // The IIFE stack pairs each tail with the innermost open head.
        let mut functions: Vec<(Vec<u8>, Function)> = Vec::new();
        let mut anonymous_queue: Vec<AnonFunction> = Vec::new();
        let mut anonymous_stack: Vec<(Vec<Vec<u8>>, usize)> = Vec::new();

        for (chunk, line) in iterator.testcase().parts().iter().enumerate() {
            if !iterator.testcase().reducible()[chunk] {
                continue;
            }

            for caps in FN_DEF.captures_iter(line) {
                let fun = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .expect("one of the name groups always matches")
                    .as_bytes()
                    .to_vec();
                let args_pattern = capture_bytes(&caps, 3);
                let args = split_args(&args_pattern);
                match functions.iter_mut().find(|(name, _)| *name == fun) {
                    Some((_, function)) => {
                        function.defs = Some(args);
                        function.args_pattern = args_pattern;
                        function.def_chunk = chunk;
                    }
                    None => functions.push((
                        fun,
                        Function {
                            defs: Some(args),
                            args_pattern,
                            def_chunk: chunk,
                            uses: Vec::new(),
                        },
                    )),
                }
            }

            for caps in ANON_DEF.captures_iter(line) {
                let args = split_args(&capture_bytes(&caps, 1));
                anonymous_stack.push((args, chunk));
            }

            for caps in ANON_CALL.captures_iter(line) {
                let (defs, def_chunk) = match anonymous_stack.pop() {
                    Some(head) => head,
                    None => continue,
                };
                let actuals = capture_bytes(&caps, 1);
                if actuals.is_empty() && defs.is_empty() {
                    continue;
                }
                anonymous_queue.push(AnonFunction {
                    defs,
                    def_chunk,
                    values: split_args(&actuals),
                    use_chunk: chunk,
                });
            }

            for caps in FN_CALL.captures_iter(line) {
                let pattern = capture_bytes(&caps, 1);
                let fun = capture_bytes(&caps, 2);
                let values = split_args(&capture_bytes(&caps, 3));
                let site = CallSite {
                    values,
                    chunk,
                    pattern,
                };
                match functions.iter_mut().find(|(name, _)| *name == fun) {
                    Some((_, function)) => function.uses.push(site),
                    None => functions.push((
                        fun,
                        Function {
                            defs: None,
                            args_pattern: Vec::new(),
                            def_chunk: 0,
                            uses: vec![site],
                        },
                    )),
                }
            }
        }

        // All patterns have been removed successfully.
        if functions.is_empty() && anonymous_queue.is_empty() {
            return Ok(0);
        }

        info!("Starting removing function arguments.");

        for (fun, function) in &functions {
            let description = format!("arguments of '{}'", String::from_utf8_lossy(fun));
            let arg_defs = match &function.defs {
                Some(defs) if !function.uses.is_empty() => defs,
                _ => {
                    info!("Ignoring {} because it is 'uninteresting'.", description);
                    continue;
                }
            };
            let def_chunk = function.def_chunk;

            // Remove the arguments from the definition and prepend global
            // assignments of the actuals at every call site.
            let mut candidate = iterator.testcase().clone();
            let subst = replace_first(&candidate.parts()[def_chunk], &function.args_pattern, b"");
            candidate.set_part(def_chunk, subst);

            for site in &function.uses {
                if site.chunk == def_chunk && site.values == *arg_defs {
                    continue;
                }
                let mut values = site.values.clone();
                while values.len() < arg_defs.len() {
                    values.push(b"undefined".to_vec());
                }
                let mut setters = Vec::new();
                for (arg, value) in arg_defs.iter().zip(&values) {
                    setters.extend_from_slice(arg);
                    setters.extend_from_slice(b" = ");
                    setters.extend_from_slice(value);
                    setters.extend_from_slice(b";\n");
                }
                let mut part = setters;
                part.extend_from_slice(&candidate.parts()[site.chunk]);
                candidate.set_part(site.chunk, part);
            }
            let maybe_moved_arguments = arg_defs.len();

            if iterator.try_testcase(candidate, &format!("Removing {}", description))?
                == Some(true)
            {
                num_moved_arguments += maybe_moved_arguments;
            } else {
                num_survived_arguments += maybe_moved_arguments;
            }

            // Then try each call site individually, replacing the whole call
            // with an argument-less one.
            for site in &function.uses {
                if site.chunk == def_chunk && site.values == *arg_defs {
                    continue;
                }

                let mut candidate = iterator.testcase().clone();
                let mut empty_call = fun.clone();
                empty_call.extend_from_slice(b"()");
                let subst = replace_first(&candidate.parts()[site.chunk], &site.pattern, &empty_call);
                if subst == candidate.parts()[site.chunk] {
                    continue;
                }
                candidate.set_part(site.chunk, subst);
                let maybe_moved_arguments = site.values.len();

                let description = format!("Removing {} at {} #{}", description, atom, site.chunk);
                if iterator.try_testcase(candidate, &description)? == Some(true)
                {
                    num_moved_arguments += maybe_moved_arguments;
                } else {
                    num_survived_arguments += maybe_moved_arguments;
                }
            }
        }

        // Remove the arguments of immediately-invoked anonymous functions,
        // declaring the actuals as vars inside the body instead.
        for anon in &anonymous_queue {
            let mut noop_changes = 0;
            let mut candidate = iterator.testcase().clone();

            let arg_defs = &anon.defs;
            let def_chunk = anon.def_chunk;
            let use_chunk = anon.use_chunk;
            let description = format!(
                "arguments of anonymous function at #{} {}",
                atom, def_chunk
            );

            // Remove the arguments of the function.
            let subst = replace_first(&candidate.parts()[def_chunk], &join_comma(arg_defs), b"");
            if subst == candidate.parts()[def_chunk] {
                noop_changes += 1;
            }
            candidate.set_part(def_chunk, subst);

            // Replace the arguments by their value in the scope of the
            // function.
            let mut values = anon.values.clone();
            while values.len() < arg_defs.len() {
                values.push(b"undefined".to_vec());
            }
            let mut setters = Vec::new();
            for (arg, value) in arg_defs.iter().zip(&values) {
                setters.extend_from_slice(b"var ");
                setters.extend_from_slice(arg);
                setters.extend_from_slice(b" = ");
                setters.extend_from_slice(value);
                setters.extend_from_slice(b";\n");
            }
            let mut part = candidate.parts()[def_chunk].clone();
            part.extend_from_slice(b"\n");
            part.extend_from_slice(&setters);
            if part == candidate.parts()[def_chunk] {
                noop_changes += 1;
            }
            candidate.set_part(def_chunk, part);

            // Remove the arguments of the anonymous function call.
            let subst = replace_first(&candidate.parts()[use_chunk], &join_comma(&anon.values), b"");
            if subst == candidate.parts()[use_chunk] {
                noop_changes += 1;
            }
            candidate.set_part(use_chunk, subst);
            let maybe_moved_arguments = values.len();

            if noop_changes == 3 {
                continue;
            }

            if iterator.try_testcase(candidate, &format!("Removing {}", description))?
                == Some(true)
            {
                num_moved_arguments += maybe_moved_arguments;
            } else {
                num_survived_arguments += maybe_moved_arguments;
            }
        }

        info!("");
        info!("Done with this round!");
        info!("{} moved;", quantity(num_moved_arguments, "argument"));
        info!("{} survived.", quantity(num_survived_arguments, "argument"));

        Ok(num_moved_arguments)
    }
}

impl Strategy for ReplaceArgumentsByGlobals {
    fn name(&self) -> &'static str {
        "replace-arguments-by-globals"
    }

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        add_chunk_args(app)
    }

    fn process_args(&mut self, matches: &ArgMatches) -> Result<()> {
        process_chunk_args(&mut self.options, matches)
    }

    fn reduce(&self, iterator: &mut ReductionIterator) -> Result<()> {
        let mut round_number = 0usize;
        loop {
            let num_removed_arguments = self.try_arguments_as_globals(iterator)?;

            round_number += 1;
            let artifact = iterator.temp_filename(&format!("did-round-{}", round_number));
            iterator.testcase().dump_to(artifact)?;

            if num_removed_arguments > 0
                && (self.options.repeat == Repeat::Always || self.options.repeat == Repeat::Last)
            {
                // Repeat the whole pass.
            } else {
                break;
            }
        }
        Ok(())
    }
}
