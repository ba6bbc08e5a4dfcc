use std::fmt::Display;

/// EmberDB errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// An IO error from the underlying filesystem.
    Io(String),
    /// A WAL frame that is truncated, oversized, or fails its checksum.
    CorruptFrame(String),
    /// A truncated or otherwise malformed sstable index block.
    CorruptIndex(String),
    /// An unreadable manifest file.
    CorruptManifest(String),
    /// Invalid user input, typically a malformed key, value, or command.
    InvalidInput(String),
    /// The data directory is already locked by another process.
    Locked(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::CorruptFrame(msg) => write!(f, "corrupt wal frame: {msg}"),
            Error::CorruptIndex(msg) => write!(f, "corrupt sstable index: {msg}"),
            Error::CorruptManifest(msg) => write!(f, "corrupt manifest: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Locked(msg) => write!(f, "data directory locked: {msg}"),
        }
    }
}

/// Constructs an Error::InvalidInput for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidInput(format!($($args)*)) };
}

/// An EmberDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptManifest(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Io(err.to_string())
    }
}
