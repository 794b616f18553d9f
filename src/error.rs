//! Custom errors and results.

use std::error;
use std::fmt;
use std::io;

/// The kinds of errors that can happen when running `lithium`.
#[derive(Debug)]
pub enum Error {
    /// The testcase file could not be loaded, usually because of mismatched
    /// `DDBEGIN`/`DDEND` markers.
    Load(String),

    /// A configuration value was invalid, for example a `--min` that is not a
    /// power of two, or an unknown strategy name.
    Config(String),

    /// The user-supplied condition script misbehaved.
    Oracle(String),

    /// An IO error.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Load(ref details) => fmt::Display::fmt(details, f),
            Error::Config(ref details) => fmt::Display::fmt(details, f),
            Error::Oracle(ref details) => {
                write!(f, "Misbehaving condition script: {}", details)
            }
            Error::Io(ref e) => fmt::Display::fmt(e, f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// A `Result` whose `Err` variant is `lithium::error::Error`.
pub type Result<T> = ::std::result::Result<T, Error>;
