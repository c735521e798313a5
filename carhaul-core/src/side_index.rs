//! Sorted multihash→offset side-index codec (CARv2 MultihashIndexSorted).
//!
//! ## Artifact Layout
//!
//! ```text
//! varint(0x0401)
//! i32-le: multihash-code count
//! per code:
//!   u64-le: multihash code
//!   i32-le: width-bucket count
//!   per bucket:
//!     u32-le: entry width (digest length + 8)
//!     u64-le: total entry bytes (count * width)
//!     entries, sorted by digest bytes: digest || u64-le frame offset
//! ```
//!
//! All integer fields are little-endian fixed-width; only the leading codec
//! is a varint. The writer accepts entries in stream order and sorts once
//! at [`SideIndexWriter::finish`]; the reader yields entries bucket by
//! bucket, so a single-hash-function index (the usual case) comes back
//! fully sorted.

use crate::varint::{decode_varint, encode_varint, VarintError};
use multihash::Multihash;
use std::collections::BTreeMap;

/// Multicodec of the sorted multihash index artifact.
pub const MULTIHASH_INDEX_SORTED_CODEC: u64 = 0x0401;

/// Errors from side-index encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum SideIndexError {
    /// The artifact ended mid-field.
    #[error("side index truncated")]
    Truncated,

    /// Leading codec is not [`MULTIHASH_INDEX_SORTED_CODEC`].
    #[error("unsupported side index codec: 0x{0:04x}")]
    UnsupportedCodec(u64),

    /// A bucket declared an entry width of 8 or less (no digest bytes).
    #[error("invalid side index entry width: {0}")]
    InvalidWidth(u32),

    /// A bucket's byte length is not a multiple of its entry width.
    #[error("side index bucket length {length} not divisible by width {width}")]
    RaggedBucket { length: u64, width: u32 },

    /// Digest bytes could not be wrapped as a multihash.
    #[error("invalid multihash in side index: {0}")]
    InvalidMultihash(String),

    /// Bytes remained after the last declared bucket.
    #[error("{0} trailing bytes after side index")]
    TrailingBytes(usize),
}

/// Incremental writer: `add` entries in any order, `finish` to a sorted
/// artifact.
#[derive(Debug, Default)]
pub struct SideIndexWriter {
    entries: Vec<(Multihash<64>, u64)>,
}

impl SideIndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one block: its multihash and the byte offset of its frame.
    pub fn add(&mut self, multihash: Multihash<64>, offset: u64) {
        self.entries.push((multihash, offset));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort and serialize.
    pub fn finish(self) -> Vec<u8> {
        // code → digest width → sorted (digest, offset) entries
        let mut codes: BTreeMap<u64, BTreeMap<u32, Vec<(Vec<u8>, u64)>>> = BTreeMap::new();
        for (mh, offset) in self.entries {
            codes
                .entry(mh.code())
                .or_default()
                .entry(mh.size() as u32)
                .or_default()
                .push((mh.digest().to_vec(), offset));
        }

        let mut out = Vec::new();
        encode_varint(MULTIHASH_INDEX_SORTED_CODEC, &mut out);
        out.extend_from_slice(&(codes.len() as i32).to_le_bytes());
        for (code, buckets) in codes {
            out.extend_from_slice(&code.to_le_bytes());
            out.extend_from_slice(&(buckets.len() as i32).to_le_bytes());
            for (digest_len, mut entries) in buckets {
                entries.sort();
                let width = digest_len + 8;
                out.extend_from_slice(&width.to_le_bytes());
                out.extend_from_slice(&(entries.len() as u64 * width as u64).to_le_bytes());
                for (digest, offset) in entries {
                    out.extend_from_slice(&digest);
                    out.extend_from_slice(&offset.to_le_bytes());
                }
            }
        }
        out
    }
}

/// Decode a side-index artifact into `(multihash, offset)` entries.
pub fn decode(bytes: &[u8]) -> Result<Vec<(Multihash<64>, u64)>, SideIndexError> {
    let (codec, mut pos) = decode_varint(bytes).map_err(|e| match e {
        VarintError::Eof => SideIndexError::Truncated,
        VarintError::Overflow => SideIndexError::UnsupportedCodec(u64::MAX),
    })?;
    if codec != MULTIHASH_INDEX_SORTED_CODEC {
        return Err(SideIndexError::UnsupportedCodec(codec));
    }

    let code_count = read_i32(bytes, &mut pos)?;
    let mut entries = Vec::new();
    for _ in 0..code_count {
        let code = read_u64(bytes, &mut pos)?;
        let bucket_count = read_i32(bytes, &mut pos)?;
        for _ in 0..bucket_count {
            let width = read_u32(bytes, &mut pos)?;
            let length = read_u64(bytes, &mut pos)?;
            if width <= 8 {
                return Err(SideIndexError::InvalidWidth(width));
            }
            if length % width as u64 != 0 {
                return Err(SideIndexError::RaggedBucket { length, width });
            }
            let digest_len = (width - 8) as usize;
            for _ in 0..length / width as u64 {
                let digest = read_slice(bytes, &mut pos, digest_len)?;
                let mh = Multihash::<64>::wrap(code, digest)
                    .map_err(|e| SideIndexError::InvalidMultihash(e.to_string()))?;
                let offset = read_u64(bytes, &mut pos)?;
                entries.push((mh, offset));
            }
        }
    }

    if pos != bytes.len() {
        return Err(SideIndexError::TrailingBytes(bytes.len() - pos));
    }
    Ok(entries)
}

fn read_slice<'a>(
    bytes: &'a [u8],
    pos: &mut usize,
    len: usize,
) -> Result<&'a [u8], SideIndexError> {
    let end = pos.checked_add(len).ok_or(SideIndexError::Truncated)?;
    if end > bytes.len() {
        return Err(SideIndexError::Truncated);
    }
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}

fn read_i32(bytes: &[u8], pos: &mut usize) -> Result<i32, SideIndexError> {
    let slice = read_slice(bytes, pos, 4)?;
    Ok(i32::from_le_bytes(slice.try_into().expect("4-byte slice")))
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32, SideIndexError> {
    let slice = read_slice(bytes, pos, 4)?;
    Ok(u32::from_le_bytes(slice.try_into().expect("4-byte slice")))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64, SideIndexError> {
    let slice = read_slice(bytes, pos, 8)?;
    Ok(u64::from_le_bytes(slice.try_into().expect("8-byte slice")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn mh_of(data: &[u8]) -> Multihash<64> {
        let digest: [u8; 32] = Sha256::digest(data).into();
        Multihash::<64>::wrap(0x12, &digest).unwrap()
    }

    #[test]
    fn test_roundtrip_sorted() {
        let mut writer = SideIndexWriter::new();
        // Stream order is arbitrary.
        writer.add(mh_of(b"cherry"), 300);
        writer.add(mh_of(b"apple"), 100);
        writer.add(mh_of(b"banana"), 200);
        assert_eq!(writer.len(), 3);

        let bytes = writer.finish();
        let entries = decode(&bytes).unwrap();
        assert_eq!(entries.len(), 3);

        // Output sorted by digest bytes.
        let digests: Vec<&[u8]> = entries.iter().map(|(mh, _)| mh.digest()).collect();
        let mut sorted = digests.clone();
        sorted.sort();
        assert_eq!(digests, sorted);

        // Offsets follow their multihashes.
        for (mh, offset) in &entries {
            let expected = [(mh_of(b"cherry"), 300), (mh_of(b"apple"), 100), (mh_of(b"banana"), 200)]
                .iter()
                .find(|(m, _)| m == mh)
                .map(|(_, o)| *o)
                .unwrap();
            assert_eq!(*offset, expected);
        }
    }

    #[test]
    fn test_empty_index() {
        let bytes = SideIndexWriter::new().finish();
        let entries = decode(&bytes).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_codec_prefix() {
        let bytes = SideIndexWriter::new().finish();
        let (codec, _) = decode_varint(&bytes).unwrap();
        assert_eq!(codec, MULTIHASH_INDEX_SORTED_CODEC);
    }

    #[test]
    fn test_unsupported_codec() {
        let mut bytes = Vec::new();
        encode_varint(0x0400, &mut bytes);
        bytes.extend_from_slice(&0i32.to_le_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(SideIndexError::UnsupportedCodec(0x0400))
        ));
    }

    #[test]
    fn test_truncated() {
        let mut writer = SideIndexWriter::new();
        writer.add(mh_of(b"entry"), 42);
        let bytes = writer.finish();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 5]),
            Err(SideIndexError::Truncated)
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = SideIndexWriter::new().finish();
        bytes.extend_from_slice(b"junk");
        assert!(matches!(
            decode(&bytes),
            Err(SideIndexError::TrailingBytes(4))
        ));
    }

    #[test]
    fn test_large_offsets_survive() {
        let mut writer = SideIndexWriter::new();
        let offset = u64::MAX - 7;
        writer.add(mh_of(b"far"), offset);
        let entries = decode(&writer.finish()).unwrap();
        assert_eq!(entries[0].1, offset);
    }
}
