use std::{fmt, io, result};

/// Errors produced by this crate.
///
/// Variants mirror the failure modes a caller can actually recover from;
/// everything else (`Fatal`) signals a broken invariant inside the index
/// itself and should be treated as a bug report.
#[derive(Debug)]
pub enum Error {
    /// Bad construction-time configuration, or an on-disk index opened
    /// with incompatible parameters.
    Configuration(String),
    /// I/O failure while touching the state-store or bucket-store files.
    Index(String),
    /// A single entry cannot fit into an empty bucket even at the maximum
    /// bucket depth.
    KeyTooLarge(String),
    /// An invariant was violated while walking or mutating the directory.
    Corruption(String),
    /// Internal error: a broken assumption inside the implementation.
    Fatal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::Index(msg) => write!(f, "index error: {}", msg),
            Error::KeyTooLarge(msg) => write!(f, "key too large: {}", msg),
            Error::Corruption(msg) => write!(f, "corruption: {}", msg),
            Error::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Index(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Construct an [`Error`] of the given variant from a `format!`-style
/// message, or lift a `Result<T, E: ToString>` into `Result<T, Error>` by
/// tagging the failure with the given variant.
///
/// This mirrors the `err_at!` idiom used throughout the reference
/// implementation this crate is modeled on, vendored locally because the
/// crate that defines it there is not part of this crate's dependency
/// stack.
///
/// ```ignore
/// err_at!(Corruption, msg: "walk exceeded {} bits", 64)?;
/// let buf = err_at!(Index, fs::read(path))?;
/// ```
#[macro_export]
macro_rules! err_at {
    ($variant:ident, msg: $($arg:tt)+) => {
        Err($crate::Error::$variant(format!($($arg)+)))
    };
    ($variant:ident, $expr:expr) => {
        match $expr {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::Error::$variant(err.to_string())),
        }
    };
    ($variant:ident, $expr:expr, $($arg:tt)+) => {
        match $expr {
            Ok(val) => Ok(val),
            Err(err) => {
                Err($crate::Error::$variant(format!("{}: {}", format!($($arg)+), err)))
            }
        }
    };
}
