//! Rank file writers
//!
//! [`RankFileWriter`] produces a complete file from a rank array.
//! [`RankFileAppender`] extends an existing file with records for ids that were
//! not ranked yet.

use super::format::{encode_record, fingerprint_term, Header, MAX_RECORD_ID, PAGE_SIZE, RECORD_SIZE};
use super::{StorageError, StorageResult};
use bytes::BytesMut;
use graphrank_algorithms::{compute_thresholds, Interrupt, DEFAULT_PRECISION};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Summary of a complete write
#[derive(Debug, Clone, PartialEq)]
pub struct Written {
    pub thresholds: Vec<f64>,
    pub records: u64,
    pub fingerprint: u64,
}

/// Summary of an append
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Appended {
    /// Records appended
    pub written: u64,
    /// XOR of the appended records' fingerprint terms
    pub fingerprint: u64,
    /// The interrupt was raised before every record was appended
    pub interrupted: bool,
}

/// Writes a full rank file
#[derive(Debug, Clone, Copy)]
pub struct RankFileWriter {
    precision: f64,
}

impl Default for RankFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RankFileWriter {
    pub fn new() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }

    /// Factor between adjacent threshold buckets
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// Write header and one record per id of `ranks` to `path`, replacing any
    /// existing file. The data is fsynced before returning.
    pub fn write(&self, path: impl AsRef<Path>, ranks: &[f64]) -> StorageResult<Written> {
        let path = path.as_ref();
        if let Some(last_id) = (ranks.len() as u64).checked_sub(1) {
            if last_id > MAX_RECORD_ID {
                return Err(StorageError::IdOverflow(last_id));
            }
        }

        let thresholds = compute_thresholds(ranks, self.precision);
        let header = Header::new(thresholds);
        debug!("Writing {} thresholds to {:?}", header.thresholds.len(), path);

        let write_err = |source| StorageError::Write {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(write_err)?;
        let mut out = BufWriter::new(file);

        let mut buf = BytesMut::with_capacity((PAGE_SIZE * RECORD_SIZE) as usize);
        header.encode(&mut buf);
        out.write_all(&buf).map_err(write_err)?;

        let mut fingerprint = 0u64;
        for (page, values) in ranks.chunks(PAGE_SIZE as usize).enumerate() {
            buf.clear();
            let first_id = page as u64 * PAGE_SIZE;
            for (offset, rank) in values.iter().enumerate() {
                let id = first_id + offset as u64;
                encode_record(&mut buf, id, *rank)?;
                fingerprint ^= fingerprint_term(id, *rank);
            }
            out.write_all(&buf).map_err(write_err)?;
        }

        let file = out.into_inner().map_err(|e| write_err(e.into_error()))?;
        file.sync_all().map_err(write_err)?;

        info!("Wrote {} rank records to {:?}", ranks.len(), path);
        Ok(Written {
            thresholds: header.thresholds,
            records: ranks.len() as u64,
            fingerprint,
        })
    }
}

/// Appends records to an existing rank file
pub struct RankFileAppender {
    path: PathBuf,
    out: BufWriter<File>,
    next_id: u64,
    buf: BytesMut,
    appended: Appended,
}

impl RankFileAppender {
    /// Open `path` for appending records starting at `first_id`.
    ///
    /// The file must end exactly after the record of `first_id - 1`.
    pub fn open(path: impl AsRef<Path>, first_id: u64) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let read_err = |source| StorageError::Read {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&path)
            .map_err(read_err)?;

        let mut handle = &file;
        let header = Header::read_from(&mut handle, &path)?;
        let len = file.metadata().map_err(read_err)?.len();
        let expected = header.len() + first_id * RECORD_SIZE;
        if len != expected {
            return Err(StorageError::Format {
                path,
                reason: format!(
                    "file is {} bytes long, expected {} before appending id {}",
                    len, expected, first_id
                ),
            });
        }

        debug!("Appending to {:?} from id {}", path, first_id);
        Ok(Self {
            path,
            out: BufWriter::new(file),
            next_id: first_id,
            buf: BytesMut::with_capacity(RECORD_SIZE as usize),
            appended: Appended::default(),
        })
    }

    /// Id the next record will carry
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn append(&mut self, rank: f64) -> StorageResult<()> {
        let id = self.next_id;
        self.buf.clear();
        encode_record(&mut self.buf, id, rank)?;
        self.out.write_all(&self.buf).map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.appended.fingerprint ^= fingerprint_term(id, rank);
        self.appended.written += 1;
        self.next_id += 1;
        Ok(())
    }

    /// Flush and fsync everything appended so far
    pub fn finish(self) -> StorageResult<Appended> {
        let path = self.path;
        let write_err = |source| StorageError::Write {
            path: path.clone(),
            source,
        };
        let file = self
            .out
            .into_inner()
            .map_err(|e| write_err(e.into_error()))?;
        file.sync_all().map_err(write_err)?;
        Ok(self.appended)
    }
}

/// Append `ranks` to the file at `path` as ids `first_id..`.
///
/// The interrupt is checked before every record; records written before it
/// was raised stay in the file.
pub fn append_records(
    path: impl AsRef<Path>,
    first_id: u64,
    ranks: impl IntoIterator<Item = f64>,
    interrupt: &Interrupt,
) -> StorageResult<Appended> {
    let mut appender = RankFileAppender::open(path, first_id)?;
    let mut interrupted = false;
    for rank in ranks {
        if interrupt.is_raised() {
            warn!("Append interrupted at id {}", appender.next_id());
            interrupted = true;
            break;
        }
        appender.append(rank)?;
    }
    let mut appended = appender.finish()?;
    appended.interrupted = interrupted;
    Ok(appended)
}
