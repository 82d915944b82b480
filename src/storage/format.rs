//! Header and record codec

use super::{StorageError, StorageResult};
use bytes::{Buf, BufMut};
use std::io::Read;
use std::path::Path;

/// File magic
pub const MAGIC: i32 = 0x10ad77fe;
/// Format version
pub const VERSION: i32 = 1;
/// Size of one `{id:i32, rank:f64}` record
pub const RECORD_SIZE: u64 = 12;
/// Records per reader page
pub const PAGE_SIZE: u64 = 1000;
/// Pages a reader keeps resident before it starts evicting
pub const DEFAULT_PAGE_BUDGET: usize = 1000;
/// Largest id a record can carry
pub const MAX_RECORD_ID: u64 = i32::MAX as u64;

const PREFIX_LEN: usize = 12;

/// Everything in front of the first record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub thresholds: Vec<f64>,
}

impl Header {
    pub fn new(thresholds: Vec<f64>) -> Self {
        Self { thresholds }
    }

    /// Encoded length in bytes
    pub fn len(&self) -> u64 {
        PREFIX_LEN as u64 + 8 * self.thresholds.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(MAGIC);
        buf.put_i32(VERSION);
        buf.put_i32(self.thresholds.len() as i32);
        for threshold in &self.thresholds {
            buf.put_f64(*threshold);
        }
    }

    /// Read and validate a header from the start of `reader`
    pub fn read_from(reader: &mut impl Read, path: &Path) -> StorageResult<Self> {
        let mut prefix = [0u8; PREFIX_LEN];
        reader.read_exact(&mut prefix).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => format_error(path, "file is truncated"),
            _ => StorageError::Read {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let mut buf = &prefix[..];
        let magic = buf.get_i32();
        if magic != MAGIC {
            return Err(format_error(path, format!("bad magic {:#010x}", magic)));
        }
        let version = buf.get_i32();
        if version != VERSION {
            return Err(format_error(path, format!("unsupported version {}", version)));
        }
        let count = buf.get_i32();
        if count < 0 || count % 2 != 0 {
            return Err(format_error(path, format!("bad threshold count {}", count)));
        }

        let mut raw = vec![0u8; count as usize * 8];
        reader.read_exact(&mut raw).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => format_error(path, "thresholds are truncated"),
            _ => StorageError::Read {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let mut buf = &raw[..];
        let thresholds = (0..count).map(|_| buf.get_f64()).collect();

        Ok(Self { thresholds })
    }
}

fn format_error(path: &Path, reason: impl Into<String>) -> StorageError {
    StorageError::Format {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Append one record to `buf`
pub fn encode_record(buf: &mut impl BufMut, id: u64, rank: f64) -> StorageResult<()> {
    if id > MAX_RECORD_ID {
        return Err(StorageError::IdOverflow(id));
    }
    buf.put_i32(id as i32);
    buf.put_f64(rank);
    Ok(())
}

/// Rank of one record, the id field is skipped
pub fn decode_rank(buf: &mut impl Buf) -> f64 {
    buf.advance(4);
    buf.get_f64()
}

/// Contribution of one record to the file fingerprint
pub fn fingerprint_term(id: u64, rank: f64) -> u64 {
    (id as f64 * (rank + 1.0)).to_bits()
}

/// XOR of every record's contribution
pub fn fingerprint(ranks: &[f64]) -> u64 {
    ranks
        .iter()
        .enumerate()
        .fold(0, |acc, (id, rank)| acc ^ fingerprint_term(id as u64, *rank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_header_layout() {
        let header = Header::new(vec![0.25, 0.5]);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(buf.len() as u64, header.len());
        assert_eq!(&buf[..4], &[0x10, 0xad, 0x77, 0xfe]);
        assert_eq!(&buf[4..8], &[0, 0, 0, 1]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 2]);

        let decoded = Header::read_from(&mut &buf[..], Path::new("mem")).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let mut buf = BytesMut::new();
        buf.put_i32(0x12345678);
        buf.put_i32(VERSION);
        buf.put_i32(0);

        let err = Header::read_from(&mut &buf[..], Path::new("mem")).unwrap_err();
        assert!(matches!(err, StorageError::Format { .. }));
        assert!(err.to_string().contains("recomputation"));
    }

    #[test]
    fn test_bad_version_is_format_error() {
        let mut buf = BytesMut::new();
        buf.put_i32(MAGIC);
        buf.put_i32(2);
        buf.put_i32(0);

        let err = Header::read_from(&mut &buf[..], Path::new("mem")).unwrap_err();
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn test_truncated_header() {
        let err = Header::read_from(&mut &[0x10u8, 0xad][..], Path::new("mem")).unwrap_err();
        assert!(matches!(err, StorageError::Format { .. }));
    }

    #[test]
    fn test_record_layout() {
        let mut buf = BytesMut::new();
        encode_record(&mut buf, 7, 0.5).unwrap();
        assert_eq!(buf.len() as u64, RECORD_SIZE);
        assert_eq!(&buf[..4], &[0, 0, 0, 7]);

        let mut slice = &buf[..];
        assert_eq!(decode_rank(&mut slice), 0.5);
    }

    #[test]
    fn test_record_id_overflow() {
        let mut buf = BytesMut::new();
        let err = encode_record(&mut buf, MAX_RECORD_ID + 1, 0.1).unwrap_err();
        assert!(matches!(err, StorageError::IdOverflow(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_fingerprint_folds_terms() {
        let ranks = [0.0, 0.2, 0.8];
        let expected = fingerprint_term(0, 0.0) ^ fingerprint_term(1, 0.2) ^ fingerprint_term(2, 0.8);
        assert_eq!(fingerprint(&ranks), expected);
        // Slot 0 contributes the bit pattern of 0.0
        assert_eq!(fingerprint_term(0, 0.7), 0);
    }
}
