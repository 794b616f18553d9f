//! End-to-end reduction scenarios driven through the `Lithium` engine with
//! in-process oracles.

use lithium::error::Result;
use lithium::reducer::Lithium;
use lithium::strategies::{
    CheckOnly, CollapseEmptyBraces, Minimize, MinimizeBalancedPairs, MinimizeSurroundingPairs,
    ReplaceArgumentsByGlobals, ReplacePropertiesByGlobals,
};
use lithium::test_case::{SplitMode, Testcase};
use lithium::traits::{IsInteresting, Strategy};
use std::fs;
use std::path::Path;
use tempdir::TempDir;

// An oracle that re-reads the candidate file and applies a predicate to its
// bytes, like a condition script would.
struct FileCheck<F>(F);

impl<F> IsInteresting for FileCheck<F>
where
    F: FnMut(&[u8]) -> bool,
{
    fn is_interesting(&mut self, testcase: &Path) -> Result<bool> {
        let data = fs::read(testcase)?;
        Ok((self.0)(&data))
    }
}

struct Reduction {
    exit_code: i32,
    final_bytes: Vec<u8>,
    test_count: usize,
}

fn run_reduction<F>(
    strategy: Box<dyn Strategy>,
    mode: SplitMode,
    input: &[u8],
    check: F,
) -> Reduction
where
    F: FnMut(&[u8]) -> bool + 'static,
{
    run_reduction_with(strategy, mode, input, check, |_| {})
}

fn run_reduction_with<F, P>(
    strategy: Box<dyn Strategy>,
    mode: SplitMode,
    input: &[u8],
    check: F,
    prepare: P,
) -> Reduction
where
    F: FnMut(&[u8]) -> bool + 'static,
    P: FnOnce(&mut Testcase),
{
    let work = TempDir::new("lithium-scenario").unwrap();
    let artifacts = TempDir::new("lithium-artifacts").unwrap();
    let path = work.path().join("a.txt");
    fs::write(&path, input).unwrap();

    let mut testcase = Testcase::load(&path, mode).unwrap();
    prepare(&mut testcase);

    let mut lithium = Lithium::new();
    lithium.set_strategy(strategy);
    lithium.set_condition(Box::new(FileCheck(check)));
    lithium.set_testcase(testcase);
    lithium.set_temp_dir(artifacts.path());

    let exit_code = lithium.run().unwrap();
    Reduction {
        exit_code,
        final_bytes: fs::read(&path).unwrap(),
        test_count: lithium.test_count(),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn split_on<'a>(data: &'a [u8], separator: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + separator.len() <= data.len() {
        if &data[i..i + separator.len()] == separator {
            pieces.push(&data[start..i]);
            start = i + separator.len();
            i = start;
        } else {
            i += 1;
        }
    }
    pieces.push(&data[start..]);
    pieces
}

fn count(data: &[u8], byte: u8) -> usize {
    data.iter().filter(|&&b| b == byte).count()
}

#[test]
fn minimize_reduces_to_single_interesting_line() {
    for mode in [SplitMode::Line, SplitMode::Char, SplitMode::symbol()] {
        let result = run_reduction(
            Box::new(Minimize::default()),
            mode,
            b"x\n\nx\nx\no\nx\nx\nx\n",
            |data| contains(data, b"o\n"),
        );
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.final_bytes, b"o\n");
    }
}

#[test]
fn minimize_result_is_one_minimal() {
    // With repeat=last, no single remaining line can be removable.
    let result = run_reduction(
        Box::new(Minimize::default()),
        SplitMode::Line,
        b"a\no\nb\no\nc\n",
        |data| count(data, b'o') >= 2,
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"o\no\n");
}

#[test]
fn minimize_respects_non_reducible_parts() {
    let result = run_reduction_with(
        Box::new(Minimize::default()),
        SplitMode::Line,
        b"x\n\nx\nx\no\nx\nx\nx\n",
        |data| contains(data, b"o\n"),
        |testcase| testcase.set_reducible(0, false),
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"x\no\n");

    let result = run_reduction_with(
        Box::new(Minimize::default()),
        SplitMode::Line,
        b"x\n\nx\nx\no\nx\nx\nx\n",
        |data| contains(data, b"o\n"),
        |testcase| {
            let last = testcase.len() - 1;
            testcase.set_reducible(last, false);
        },
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"o\nx\n");
}

#[test]
fn minimize_preserves_dd_frame() {
    let result = run_reduction(
        Box::new(Minimize::default()),
        SplitMode::Line,
        b"header DDBEGIN\nx\no\nx\nDDEND trailer\n",
        |data| contains(data, b"o\n"),
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"header DDBEGIN\no\nDDEND trailer\n");
}

#[test]
fn minimize_empty_testcase_is_a_no_op() {
    let result = run_reduction(
        Box::new(Minimize::default()),
        SplitMode::Line,
        b"",
        |_| true,
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"");
    assert_eq!(result.test_count, 0);
}

#[test]
fn minimize_uninteresting_original_exits_one() {
    let result = run_reduction(
        Box::new(Minimize::default()),
        SplitMode::Line,
        b"x\nx\n",
        |_| false,
    );
    assert_eq!(result.exit_code, 1);
    // The file is left untouched.
    assert_eq!(result.final_bytes, b"x\nx\n");
}

#[test]
fn check_only_reports_interestingness() {
    let result = run_reduction(Box::new(CheckOnly), SplitMode::Line, b"o\n", |data| {
        contains(data, b"o\n")
    });
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"o\n");
    assert_eq!(result.test_count, 1);

    let result = run_reduction(Box::new(CheckOnly), SplitMode::Line, b"x\n", |data| {
        contains(data, b"o\n")
    });
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.final_bytes, b"x\n");
}

#[test]
fn surrounding_pairs_reduce_to_kept_line() {
    let result = run_reduction(
        Box::new(MinimizeSurroundingPairs::default()),
        SplitMode::Line,
        b"x\nx\nx\no\nx\nx\nx\n",
        |data| {
            if !contains(data, b"o\n") {
                return false;
            }
            let pieces = split_on(data, b"o\n");
            pieces.windows(2).all(|pair| pair[0] == pair[1])
        },
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"o\n");
}

fn balanced_around_o(data: &[u8]) -> bool {
    if !contains(data, b"o\n") {
        return false;
    }
    let pieces = split_on(data, b"o\n");
    let (head, tail) = (pieces[0], pieces[pieces.len() - 1]);
    count(head, b'{') == count(tail, b'}')
        && count(head, b'(') == count(tail, b')')
        && count(head, b'[') == count(tail, b']')
}

#[test]
fn balanced_pairs_reduce_to_kept_line() {
    for mode in [SplitMode::Line, SplitMode::symbol()] {
        let result = run_reduction(
            Box::new(MinimizeBalancedPairs::default()),
            mode,
            b"[\n[\nxxx{\no\n}\n]\n]\n",
            balanced_around_o,
        );
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.final_bytes, b"o\n");
    }
}

#[test]
fn balanced_pairs_with_experimental_move() {
    let strategy = MinimizeBalancedPairs {
        with_experimental_move: true,
        ..MinimizeBalancedPairs::default()
    };
    let result = run_reduction(
        Box::new(strategy),
        SplitMode::Line,
        b"[\n[\nxxx{\no\n}\n]\n]\n",
        balanced_around_o,
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"o\n");
}

#[test]
fn replace_properties_rewrites_to_globals() {
    let original: &[u8] = b"function Foo() {\n  this.list = [];\n}\n\
Foo.prototype.push = function(a) {\n  this.list.push(a);\n}\n\
Foo.prototype.last = function() {\n  return this.list.pop();\n}\n";
    let expected: &[u8] = b"function Foo() {\n  list = [];\n}\n\
push = function(a) {\n  list.push(a);\n}\n\
last = function() {\n  return list.pop();\n}\n";
    let valid: Vec<Vec<u8>> = vec![
        original.to_vec(),
        b"function Foo() {\n  this.list = [];\n}\n\
Foo.prototype.push = function(a) {\n  this.list.push(a);\n}\n\
last = function() {\n  return this.list.pop();\n}\n"
            .to_vec(),
        b"function Foo() {\n  this.list = [];\n}\n\
push = function(a) {\n  this.list.push(a);\n}\n\
Foo.prototype.last = function() {\n  return this.list.pop();\n}\n"
            .to_vec(),
        b"function Foo() {\n  this.list = [];\n}\n\
push = function(a) {\n  this.list.push(a);\n}\n\
last = function() {\n  return this.list.pop();\n}\n"
            .to_vec(),
        b"function Foo() {\n  list = [];\n}\n\
Foo.prototype.push = function(a) {\n  list.push(a);\n}\n\
Foo.prototype.last = function() {\n  return list.pop();\n}\n"
            .to_vec(),
        b"function Foo() {\n  list = [];\n}\n\
Foo.prototype.push = function(a) {\n  list.push(a);\n}\n\
last = function() {\n  return list.pop();\n}\n"
            .to_vec(),
        b"function Foo() {\n  list = [];\n}\n\
push = function(a) {\n  list.push(a);\n}\n\
Foo.prototype.last = function() {\n  return list.pop();\n}\n"
            .to_vec(),
        expected.to_vec(),
    ];

    let result = run_reduction(
        Box::new(ReplacePropertiesByGlobals::default()),
        SplitMode::Line,
        original,
        move |data| valid.iter().any(|form| form == data),
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, expected);
}

#[test]
fn replace_properties_char_mode_changes_nothing() {
    let original: &[u8] = b"function Foo() {\n  this.list = [];\n}\n";
    let result = run_reduction(
        Box::new(ReplacePropertiesByGlobals::default()),
        SplitMode::Char,
        original,
        |_| true,
    );
    // Single-byte atoms carry no dotted accesses, so no candidate is ever
    // produced.
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, original);
}

#[test]
fn replace_arguments_hoists_actuals_to_globals() {
    let original: &[u8] = b"function foo(a,b) {\n  list = a + b;\n}\nfoo(2,3)\n";
    let expected: &[u8] = b"function foo() {\n  list = a + b;\n}\na = 2;\nb = 3;\nfoo()\n";
    let valid: Vec<Vec<u8>> = vec![
        original.to_vec(),
        b"function foo(a) {\n  list = a + b;\n}\nb = 3;\nfoo(2)\n".to_vec(),
        b"function foo(a) {\n  list = a + b;\n}\nb = 3;\nfoo(2,3)\n".to_vec(),
        b"function foo(b) {\n  list = a + b;\n}\na = 2;\nfoo(3)\n".to_vec(),
        b"function foo() {\n  list = a + b;\n}\na = 2;\nb = 3;\nfoo(2,3)\n".to_vec(),
        expected.to_vec(),
    ];

    let result = run_reduction(
        Box::new(ReplaceArgumentsByGlobals::default()),
        SplitMode::Line,
        original,
        move |data| valid.iter().any(|form| form == data),
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, expected);
}

#[test]
fn collapse_braces_without_needed_brace() {
    let result = run_reduction(
        Box::new(CollapseEmptyBraces::default()),
        SplitMode::Line,
        b"x\nxxx{\nx\n}\no\n",
        |data| contains(data, b"o\n") && count(data, b'{') == count(data, b'}'),
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"o\n");
}

#[test]
fn collapse_braces_with_needed_brace() {
    let result = run_reduction(
        Box::new(CollapseEmptyBraces::default()),
        SplitMode::Line,
        b"x\nxxx{\nx\n}\no\n",
        |data| count(data, b'{') == 1 && count(data, b'{') == count(data, b'}'),
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.final_bytes, b"xxx{ }\n");
}

#[test]
fn artifacts_are_archived_per_attempt() {
    let work = TempDir::new("lithium-scenario").unwrap();
    let artifacts = TempDir::new("lithium-artifacts").unwrap();
    let path = work.path().join("a.txt");
    fs::write(&path, b"x\no\n").unwrap();

    let mut lithium = Lithium::new();
    lithium.set_strategy(Box::new(Minimize::default()));
    lithium.set_condition(Box::new(FileCheck(|data: &[u8]| contains(data, b"o\n"))));
    lithium.set_testcase(Testcase::load(&path, SplitMode::Line).unwrap());
    lithium.set_temp_dir(artifacts.path());
    assert_eq!(lithium.run().unwrap(), 0);

    let names: Vec<String> = fs::read_dir(artifacts.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|name| name == "original.txt"));
    assert!(names.iter().any(|name| name.contains("-interesting")));
    assert!(names.iter().any(|name| name.contains("-did-round-")));
}
