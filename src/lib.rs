//! Lithium, an automated testcase reduction tool.
//!
//! Given a testcase file that exhibits some *interesting* behavior when fed
//! to an external program, and an oracle that can recognize that behavior,
//! Lithium repeatedly shrinks the file while preserving interestingness,
//! producing a small reproducer.
//!
//! The file is split into reducible atoms by a [`Testcase`] splitter (lines,
//! bytes, JS string characters, or symbol-delimited tokens). A reduction
//! [`Strategy`] then enumerates candidate reductions, consults the oracle for
//! each one, and keeps the smallest interesting testcase seen so far.
//!
//! [`Testcase`]: test_case/struct.Testcase.html
//! [`Strategy`]: traits/trait.Strategy.html

#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

pub mod error;
pub mod interesting;
pub mod reducer;
pub mod strategies;
pub mod test_case;
pub mod traits;
pub mod util;
