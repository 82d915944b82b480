//! Binary rank file
//!
//! One file per data directory holds the result of the last full computation
//! plus every incremental append since:
//!
//! ```text
//! magic:i32 | version:i32 | count:i32 | f64[count] | {id:i32, rank:f64}*
//! ```
//!
//! Everything is big-endian. The number of ranked nodes is derived from the
//! file length, so an append is visible to the next reader load without any
//! header rewrite.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{
    fingerprint, fingerprint_term, Header, DEFAULT_PAGE_BUDGET, MAGIC, MAX_RECORD_ID, PAGE_SIZE,
    RECORD_SIZE, VERSION,
};
pub use reader::RankFileReader;
pub use writer::{append_records, Appended, RankFileAppender, RankFileWriter, Written};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Rank file errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// The file is not a rank file this version understands
    #[error("Invalid rank file {path:?}: {reason}, a full recomputation is required")]
    Format { path: PathBuf, reason: String },

    /// I/O error while reading
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error while writing
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Node id does not fit in a record
    #[error("Node id {0} does not fit in a rank record")]
    IdOverflow(u64),
}

pub type StorageResult<T> = Result<T, StorageError>;
