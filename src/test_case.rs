//! The testcase model: a file to be reduced, split into reducible atoms.
//!
//! A loaded testcase is an immutable `before` prefix, an ordered list of
//! `parts` (the atoms a strategy may remove or rewrite), and an immutable
//! `after` suffix. The prefix and suffix are populated from `DDBEGIN` /
//! `DDEND` marker lines when present; otherwise the whole file is reducible.
//!
//! A parallel `reducible` vector marks atoms that must be preserved: a part
//! with `reducible == false` is never removed and never rewritten, which
//! allows mixing reducible and non-reducible content in one file.

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Default byte set that symbol-delimiter splitting cuts *before*.
pub const DEFAULT_CUT_BEFORE: &[u8] = b"]}:";

/// Default byte set that symbol-delimiter splitting cuts *after*.
pub const DEFAULT_CUT_AFTER: &[u8] = b"?=;{[";

lazy_static! {
    // One in-string token: a complete escape sequence, or a single byte.
    static ref JS_TOKEN: Regex = Regex::new(
        r"(?s-u)\A(\\u[0-9A-Fa-f]{4}|\\x[0-9A-Fa-f]{2}|\\u\{[0-9A-Fa-f]+\}|\\.|.)"
    ).unwrap();
    static ref JS_QUOTE: Regex = Regex::new(r#"(?-u)['"]"#).unwrap();
}

/// How a testcase file is split into reducible atoms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitMode {
    /// One atom per input line, including its trailing newline.
    Line,

    /// One atom per byte.
    Char,

    /// One atom per byte, but only within JS string literals. Escape
    /// sequences are kept intact, and everything between string contents
    /// (including the quotes themselves) is merged into single atoms.
    JsStr,

    /// One atom per token between delimiter bytes.
    Symbol {
        /// Split the file before any of these bytes.
        cut_before: Vec<u8>,
        /// Split the file after any of these bytes.
        cut_after: Vec<u8>,
    },
}

impl SplitMode {
    /// Symbol-delimiter splitting with the default cut byte sets.
    pub fn symbol() -> SplitMode {
        SplitMode::Symbol {
            cut_before: DEFAULT_CUT_BEFORE.to_vec(),
            cut_after: DEFAULT_CUT_AFTER.to_vec(),
        }
    }

    /// A human-readable name for one atom of this split mode.
    pub fn atom(&self) -> &'static str {
        match *self {
            SplitMode::Line => "line",
            SplitMode::Char => "char",
            SplitMode::JsStr => "jsstr char",
            SplitMode::Symbol { .. } => "symbol-delimiter",
        }
    }
}

// Parsing state threaded through JsStr splitting, so that a string literal
// can span multiple input lines.
#[derive(Debug, Default)]
struct JsState {
    // The quote byte of the string we are currently inside, if any.
    in_str: Option<u8>,
    // Indices into `parts` which are in-string characters.
    chars: Vec<usize>,
}

/// A testcase file, loaded and split into reducible atoms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Testcase {
    before: Vec<u8>,
    after: Vec<u8>,
    parts: Vec<Vec<u8>>,
    reducible: Vec<bool>,
    filename: PathBuf,
    extension: String,
    mode: SplitMode,
}

impl Testcase {
    /// Load and split a testcase from disk.
    ///
    /// Returns `Error::Load` when the file has a `DDEND` line before any
    /// `DDBEGIN` line, or a `DDBEGIN` line with no `DDEND` line after it.
    pub fn load<P: AsRef<Path>>(path: P, mode: SplitMode) -> Result<Testcase> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut testcase = Testcase {
            before: Vec::new(),
            after: Vec::new(),
            parts: Vec::new(),
            reducible: Vec::new(),
            filename: path.to_path_buf(),
            extension,
            mode,
        };

        let mut reader = BufReader::new(fs::File::open(path)?);
        let mut state = JsState::default();
        testcase.read_lines(&mut reader, &mut state)?;

        if let SplitMode::Char = testcase.mode {
            if (!testcase.before.is_empty() || !testcase.after.is_empty())
                && !testcase.parts.is_empty()
            {
                // Move the line break at the end of the last line out of the
                // reducible parts so the DDEND line doesn't get glued to
                // another line.
                testcase.parts.pop();
                let mut after = b"\n".to_vec();
                after.extend_from_slice(&testcase.after);
                testcase.after = after;
            }
        }

        if let SplitMode::JsStr = testcase.mode {
            testcase.finish_js(&mut state)?;
        }

        testcase.reducible = vec![true; testcase.parts.len()];
        Ok(testcase)
    }

    fn read_lines<R: BufRead>(&mut self, reader: &mut R, state: &mut JsState) -> Result<()> {
        let mut head: Vec<Vec<u8>> = Vec::new();
        let mut found_begin = false;

        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let has_begin = contains_token(&line, b"DDBEGIN");
            let has_end = contains_token(&line, b"DDEND");
            head.push(line);
            if has_begin {
                found_begin = true;
                break;
            }
            if has_end {
                return Err(Error::Load(format!(
                    "The testcase ({}) has a line containing 'DDEND' without a line \
                     containing 'DDBEGIN' before it.",
                    self.filename.display()
                )));
            }
        }

        if !found_begin {
            // No markers; the whole file is reducible.
            for line in &head {
                self.split_parts(line, state);
            }
            return Ok(());
        }

        self.before = head.concat();

        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Err(Error::Load(format!(
                    "The testcase ({}) has a line containing 'DDBEGIN' but no line \
                     containing 'DDEND'.",
                    self.filename.display()
                )));
            }
            if contains_token(&line, b"DDEND") {
                self.after = line;
                reader.read_to_end(&mut self.after)?;
                return Ok(());
            }
            self.split_parts(&line, state);
        }
    }

    fn split_parts(&mut self, line: &[u8], state: &mut JsState) {
        match self.mode {
            SplitMode::Line => self.parts.push(line.to_vec()),
            SplitMode::Char => self.parts.extend(line.iter().map(|&b| vec![b])),
            SplitMode::JsStr => self.split_js(line, state),
            SplitMode::Symbol { .. } => self.split_symbol(line),
        }
    }

    fn split_symbol(&mut self, line: &[u8]) {
        let (cut_before, cut_after) = match self.mode {
            SplitMode::Symbol {
                ref cut_before,
                ref cut_after,
            } => (cut_before, cut_after),
            _ => unreachable!("split_symbol requires symbol mode"),
        };

        // Each token is an optional leading cut-before byte, then a run of
        // non-delimiter bytes, ended inclusively by a cut-after byte or
        // exclusively by the next cut-before byte or end of line.
        let mut pos = 0;
        while pos < line.len() {
            let start = pos;
            if cut_before.contains(&line[pos]) {
                pos += 1;
            }
            while pos < line.len()
                && !cut_before.contains(&line[pos])
                && !cut_after.contains(&line[pos])
            {
                pos += 1;
            }
            if pos < line.len() && cut_after.contains(&line[pos]) {
                pos += 1;
            }
            self.parts.push(line[start..pos].to_vec());
        }
    }

    fn split_js(&mut self, line: &[u8], state: &mut JsState) {
        let mut last = 0;
        loop {
            let rest = &line[last..];
            let end;
            if let Some(quote) = state.in_str {
                let m = match JS_TOKEN.find(rest) {
                    Some(m) => m,
                    None => break,
                };
                end = m.end();
                state.chars.push(self.parts.len());
                if m.as_bytes().len() == 1 && m.as_bytes()[0] == quote {
                    // The closing quote is not an in-string character.
                    state.in_str = None;
                    state.chars.pop();
                }
            } else {
                let m = match JS_QUOTE.find(rest) {
                    Some(m) => m,
                    None => break,
                };
                state.in_str = Some(rest[m.start()]);
                end = m.end();
            }
            self.parts.push(rest[..end].to_vec());
            last += end;
        }
        if last != line.len() {
            self.parts.push(line[last..].to_vec());
        }
    }

    // After all lines have been split, resolve an unterminated string and
    // merge the runs of non-string parts.
    fn finish_js(&mut self, state: &mut JsState) -> Result<()> {
        // If we hit EOF while looking for the end of a string, rewind to the
        // part that opened it and reparse the remainder as non-string data.
        while let Some(quote) = state.in_str {
            let idx = (0..self.parts.len())
                .rev()
                .find(|&i| self.parts[i].last() == Some(&quote) && !state.chars.contains(&i))
                .ok_or_else(|| {
                    Error::Load(format!(
                        "error while backtracking from unmatched {}",
                        quote as char
                    ))
                })?;
            let rest = self.parts.split_off(idx + 1).concat();
            state.chars.retain(|&c| c < idx);
            state.in_str = None;
            self.split_js(&rest, state);
        }

        let mut chars = std::mem::take(&mut state.chars);
        if chars.is_empty() {
            return Ok(());
        }

        // Everything before the first in-string character belongs to the
        // immutable prefix, and everything after the last one to the suffix.
        let offset = chars[0];
        if offset > 0 {
            let header: Vec<u8> = self.parts.drain(..offset).flatten().collect();
            self.before.extend_from_slice(&header);
            for c in &mut chars {
                *c -= offset;
            }
        }
        let offset = *chars.last().unwrap() + 1;
        if offset < self.parts.len() {
            let mut footer = self.parts.split_off(offset).concat();
            footer.extend_from_slice(&self.after);
            self.after = footer;
        }

        // Merge each interior run of non-string parts into a single part.
        // Parsing was line-wise, so a run can span several parts.
        let mut i = 0;
        while i + 1 < chars.len() {
            let (char1, char2) = (chars[i], chars[i + 1]);
            if char2 - char1 > 2 {
                let merged: Vec<u8> = self
                    .parts
                    .splice(char1 + 1..char2, std::iter::empty())
                    .flatten()
                    .collect();
                self.parts.insert(char1 + 1, merged);
                let eliminated = char2 - char1 - 2;
                for c in &mut chars[i + 1..] {
                    *c -= eliminated;
                }
            }
            i += 1;
        }

        Ok(())
    }

    /// Write the testcase to its original location on disk.
    pub fn dump(&self) -> Result<()> {
        self.dump_to(&self.filename)
    }

    /// Write the testcase to the given path.
    pub fn dump_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = fs::File::create(path)?;
        let mut file = io::BufWriter::new(file);
        file.write_all(&self.before)?;
        for part in &self.parts {
            file.write_all(part)?;
        }
        file.write_all(&self.after)?;
        file.flush()?;
        Ok(())
    }

    /// Remove the parts in `[begin, end)`, except that non-reducible parts
    /// within the range are kept in place.
    pub fn rmslice(&mut self, begin: usize, end: usize) {
        let begin = begin.min(self.parts.len());
        let end = end.max(begin).min(self.parts.len());

        let mut kept_parts = Vec::new();
        let mut kept_reducible = Vec::new();
        for i in begin..end {
            if !self.reducible[i] {
                kept_parts.push(self.parts[i].clone());
                kept_reducible.push(false);
            }
        }
        self.parts.splice(begin..end, kept_parts);
        self.reducible.splice(begin..end, kept_reducible);
    }

    /// The number of reducible atoms.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether there are no atoms at all.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// A human-readable name for one atom, for logging.
    pub fn atom(&self) -> &'static str {
        self.mode.atom()
    }

    /// The immutable prefix preceding the reducible atoms.
    pub fn before(&self) -> &[u8] {
        &self.before
    }

    /// The immutable suffix following the reducible atoms.
    pub fn after(&self) -> &[u8] {
        &self.after
    }

    /// The reducible atoms.
    pub fn parts(&self) -> &[Vec<u8>] {
        &self.parts
    }

    /// Which atoms may be removed or rewritten.
    pub fn reducible(&self) -> &[bool] {
        &self.reducible
    }

    /// Replace the bytes of one part. The part keeps its reducibility.
    pub fn set_part(&mut self, index: usize, data: Vec<u8>) {
        self.parts[index] = data;
    }

    /// Mark one part as reducible or not.
    pub fn set_reducible(&mut self, index: usize, reducible: bool) {
        self.reducible[index] = reducible;
    }

    /// A copy of this testcase with the given parts and reducibility vector
    /// in place of the current ones.
    pub fn with_parts(&self, parts: Vec<Vec<u8>>, reducible: Vec<bool>) -> Testcase {
        assert_eq!(parts.len(), reducible.len());
        Testcase {
            parts,
            reducible,
            ..self.clone()
        }
    }

    /// The path this testcase was loaded from.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// The file extension of the loaded path, including the leading dot, or
    /// an empty string.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The split mode this testcase was loaded with.
    pub fn mode(&self) -> &SplitMode {
        &self.mode
    }
}

fn contains_token(line: &[u8], token: &[u8]) -> bool {
    line.windows(token.len()).any(|window| window == token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn line_split_and_round_trip() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"hello");

        let testcase = Testcase::load(&path, SplitMode::Line).unwrap();
        assert_eq!(testcase.before(), b"");
        assert_eq!(testcase.parts(), [b"hello".to_vec()]);
        assert_eq!(testcase.after(), b"");
        assert_eq!(testcase.extension(), ".txt");
        assert_eq!(testcase.reducible(), [true]);

        fs::remove_file(&path).unwrap();
        testcase.dump().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");

        let other = dir.path().join("b.txt");
        testcase.dump_to(&other).unwrap();
        assert_eq!(fs::read(&other).unwrap(), b"hello");
    }

    #[test]
    fn line_split_dd_markers() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"pre\nDDBEGIN\ndata\n2\nDDEND\npost\n");

        let testcase = Testcase::load(&path, SplitMode::Line).unwrap();
        assert_eq!(testcase.before(), b"pre\nDDBEGIN\n");
        assert_eq!(testcase.parts(), [b"data\n".to_vec(), b"2\n".to_vec()]);
        assert_eq!(testcase.after(), b"DDEND\npost\n");
    }

    #[test]
    fn char_split_dd_markers() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"pre\nDDBEGIN\ndata\n2\nDDEND\npost\n");

        let testcase = Testcase::load(&path, SplitMode::Char).unwrap();
        assert_eq!(testcase.before(), b"pre\nDDBEGIN\n");
        let expected: Vec<Vec<u8>> = b"data\n2".iter().map(|&b| vec![b]).collect();
        assert_eq!(testcase.parts(), &expected[..]);
        assert_eq!(testcase.after(), b"\nDDEND\npost\n");
    }

    #[test]
    fn char_split_no_markers() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"ab\nc");

        let testcase = Testcase::load(&path, SplitMode::Char).unwrap();
        let expected: Vec<Vec<u8>> = b"ab\nc".iter().map(|&b| vec![b]).collect();
        assert_eq!(testcase.parts(), &expected[..]);
        assert_eq!(testcase.after(), b"");
    }

    #[test]
    fn jsstr_split_escapes_and_merging() {
        let dir = TempDir::new("lithium-test").unwrap();
        let data: &[u8] = b"pre\nDDBEGIN\ndata\n2\n'\\u{123}\"1\\x32\\023\n'\n\"\"\n\"\\u12345Xyz\"\nData\xFF\n\"x\xFF\" something\nDDEND\npost\n";
        let path = write_file(&dir, "a.txt", data);

        let testcase = Testcase::load(&path, SplitMode::JsStr).unwrap();
        assert_eq!(testcase.before(), b"pre\nDDBEGIN\ndata\n2\n'");
        let expected: Vec<Vec<u8>> = vec![
            b"\\u{123}".to_vec(),
            b"\"".to_vec(),
            b"1".to_vec(),
            b"\\x32".to_vec(),
            b"\\0".to_vec(),
            b"2".to_vec(),
            b"3".to_vec(),
            b"\n".to_vec(),
            b"'\n\"\"\n\"".to_vec(),
            b"\\u1234".to_vec(),
            b"5".to_vec(),
            b"X".to_vec(),
            b"y".to_vec(),
            b"z".to_vec(),
            b"\"\nData\xFF\n\"".to_vec(),
            b"x".to_vec(),
            b"\xFF".to_vec(),
        ];
        assert_eq!(testcase.parts(), &expected[..]);
        assert_eq!(testcase.after(), b"\" something\nDDEND\npost\n");
    }

    #[test]
    fn jsstr_split_simple() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"'xabcx'");

        let testcase = Testcase::load(&path, SplitMode::JsStr).unwrap();
        assert_eq!(testcase.before(), b"'");
        let expected: Vec<Vec<u8>> = b"xabcx".iter().map(|&b| vec![b]).collect();
        assert_eq!(testcase.parts(), &expected[..]);
        assert_eq!(testcase.after(), b"'");
    }

    #[test]
    fn jsstr_split_backtracks_unmatched_quote() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"'x'abcx'");

        let testcase = Testcase::load(&path, SplitMode::JsStr).unwrap();
        assert_eq!(testcase.before(), b"'");
        assert_eq!(testcase.parts(), [b"x".to_vec()]);
        assert_eq!(testcase.after(), b"'abcx'");
    }

    #[test]
    fn jsstr_split_backtracks_into_other_quote() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"'x\"abc\"x");

        let testcase = Testcase::load(&path, SplitMode::JsStr).unwrap();
        assert_eq!(testcase.before(), b"'x\"");
        assert_eq!(
            testcase.parts(),
            [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(testcase.after(), b"\"x");
    }

    #[test]
    fn symbol_split() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"pre\nDDBEGIN\nd{a}ta\n2\nDDEND\npost\n");

        let testcase = Testcase::load(&path, SplitMode::symbol()).unwrap();
        assert_eq!(testcase.before(), b"pre\nDDBEGIN\n");
        assert_eq!(
            testcase.parts(),
            [b"d{".to_vec(), b"a".to_vec(), b"}ta\n".to_vec(), b"2\n".to_vec()]
        );
        assert_eq!(testcase.after(), b"DDEND\npost\n");
    }

    #[test]
    fn symbol_split_leading_delimiters() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"pre\nDDBEGIN\n{data\n2}\n}DDEND\npost\n");

        let testcase = Testcase::load(&path, SplitMode::symbol()).unwrap();
        assert_eq!(testcase.before(), b"pre\nDDBEGIN\n");
        assert_eq!(
            testcase.parts(),
            [
                b"{".to_vec(),
                b"data\n".to_vec(),
                b"2".to_vec(),
                b"}\n".to_vec()
            ]
        );
        assert_eq!(testcase.after(), b"}DDEND\npost\n");
    }

    #[test]
    fn dd_marker_errors() {
        let dir = TempDir::new("lithium-test").unwrap();
        for (data, needle) in [
            (&b"DDEND\n"[..], "'DDEND' without"),
            (&b"DDBEGIN DDEND\n"[..], "'DDBEGIN' but no"),
            (&b"DDEND DDBEGIN\n"[..], "'DDBEGIN' but no"),
            (&b"DDBEGIN\n"[..], "'DDBEGIN' but no"),
        ] {
            let path = write_file(&dir, "a.txt", data);
            let err = Testcase::load(&path, SplitMode::Line).unwrap_err();
            let message = err.to_string();
            assert!(
                message.contains(needle),
                "{:?} should mention {:?}",
                message,
                needle
            );
        }
    }

    #[test]
    fn rmslice_keeps_non_reducible_parts() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"a\nb\nc\nd\n");

        let mut testcase = Testcase::load(&path, SplitMode::Line).unwrap();
        testcase.set_reducible(1, false);
        testcase.rmslice(0, 3);
        assert_eq!(testcase.parts(), [b"b\n".to_vec(), b"d\n".to_vec()]);
        assert_eq!(testcase.reducible(), [false, true]);

        testcase.rmslice(0, 2);
        assert_eq!(testcase.parts(), [b"b\n".to_vec()]);
        assert_eq!(testcase.reducible(), [false]);
    }

    #[test]
    fn rmslice_clamps_out_of_range() {
        let dir = TempDir::new("lithium-test").unwrap();
        let path = write_file(&dir, "a.txt", b"a\nb\n");

        let mut testcase = Testcase::load(&path, SplitMode::Line).unwrap();
        testcase.rmslice(1, 100);
        assert_eq!(testcase.parts(), [b"a\n".to_vec()]);
    }

    #[test]
    fn round_trip_is_identity_for_every_mode() {
        let dir = TempDir::new("lithium-test").unwrap();
        let data: &[u8] = b"function foo() {\n  'bar\\n';\n}\nfoo();\n";
        for mode in [
            SplitMode::Line,
            SplitMode::Char,
            SplitMode::JsStr,
            SplitMode::symbol(),
        ] {
            let path = write_file(&dir, "a.txt", data);
            let testcase = Testcase::load(&path, mode).unwrap();
            let copy = dir.path().join("b.txt");
            testcase.dump_to(&copy).unwrap();
            assert_eq!(fs::read(&copy).unwrap(), data);

            let reloaded = Testcase::load(&copy, testcase.mode().clone()).unwrap();
            assert_eq!(reloaded.before(), testcase.before());
            assert_eq!(reloaded.parts(), testcase.parts());
            assert_eq!(reloaded.after(), testcase.after());
        }
    }
}
