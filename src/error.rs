//! Error taxonomy for the crate: open/format/I/O/resource/protocol failures,
//! matching the kinds spec'd for the on-disk index (see design notes §7).
//! Library code always returns `Result<T, Error>`; only the CLI binary loosens
//! this into a printed diagnostic and process exit code.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure to open or create the backing file itself.
    #[error("open: {path}: {source}")]
    Open { path: PathBuf, #[source] source: io::Error },

    /// The file exists but is not a valid colacask file: truncated header,
    /// wrong magic, or an unsupported version.
    #[error("{path}: {kind}")]
    Format { path: PathBuf, kind: FormatErrorKind },

    /// An underlying read/write/pread/pwrite/mmap/mremap/fallocate/msync call
    /// failed after the byte-I/O facility's internal retries were exhausted.
    #[error("{context}: {source}")]
    Io { context: String, #[source] source: io::Error },

    /// Allocation of scratch buffers, stream arrays, or the merge heap failed.
    #[error("resource exhausted: {context}")]
    Resource { context: String },

    /// A protocol-level misuse: duplicate key insertion, write to a read-only
    /// handle, etc.
    #[error("protocol error: {context}")]
    Protocol { context: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatErrorKind {
    Truncated,
    BadMagic { found: u32 },
    UnsupportedVersion { found: u32 },
}

impl fmt::Display for FormatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatErrorKind::Truncated => write!(f, "file truncated (header incomplete)"),
            FormatErrorKind::BadMagic { found } => {
                write!(f, "bad magic: found {:#010x}", found)
            }
            FormatErrorKind::UnsupportedVersion { found } => {
                write!(f, "unsupported version: {}", found)
            }
        }
    }
}

impl Error {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io { context: context.into(), source }
    }

    pub fn resource(context: impl Into<String>) -> Self {
        Error::Resource { context: context.into() }
    }

    pub fn protocol(context: impl Into<String>) -> Self {
        Error::Protocol { context: context.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
