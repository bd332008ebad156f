//! Fixed-layout binary codec for persisted records.
//!
//! Every integer is written big-endian with no padding and no version byte.
//! Variable-length fields carry a `u32` length prefix. Decoding never trusts
//! a length prefix for allocation: it reads at most the bytes actually
//! present and reports [`CodecError::Truncated`] when they run out.

mod records;

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::sequence::EditCount;

/// Errors raised while encoding or decoding a record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input ended before the named field was complete.
    #[error("record truncated while reading {field}")]
    Truncated {
        /// Field being read.
        field: &'static str,
    },

    /// Bytes remained after a complete record was decoded.
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),

    /// A flag byte held a value outside its domain.
    #[error("invalid value {value} for {field}")]
    InvalidFlag {
        /// Field being read.
        field: &'static str,
        /// Raw byte found.
        value: u8,
    },

    /// The decoded fields do not form a valid record.
    #[error("inconsistent record: {0}")]
    Inconsistent(String),

    /// A field is too large for its fixed-width encoding.
    #[error("{field} length {len} does not fit its encoding")]
    FieldOverflow {
        /// Field being written.
        field: &'static str,
        /// Offending length or value.
        len: usize,
    },

    /// A storage key is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Underlying writer failed.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// A record with a deterministic byte encoding.
pub trait Record: Sized {
    /// Write the record's fields in order.
    fn write_to<W: Write>(&self, writer: &mut W) -> CodecResult<()>;

    /// Read one record, leaving any following bytes unread.
    fn read_from<R: Read>(reader: &mut R) -> CodecResult<Self>;

    /// Encode into a fresh buffer.
    fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Decode a buffer holding exactly one record.
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut cursor = bytes;
        let record = Self::read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(CodecError::TrailingBytes(cursor.len()));
        }
        Ok(record)
    }
}

fn truncated(field: &'static str) -> impl FnOnce(io::Error) -> CodecError {
    move |err| match err.kind() {
        io::ErrorKind::UnexpectedEof => CodecError::Truncated { field },
        _ => CodecError::Io(err),
    }
}

fn write_err(err: io::Error) -> CodecError {
    CodecError::Io(err)
}

pub(crate) fn read_u8<R: Read>(r: &mut R, field: &'static str) -> CodecResult<u8> {
    r.read_u8().map_err(truncated(field))
}

pub(crate) fn read_i8<R: Read>(r: &mut R, field: &'static str) -> CodecResult<i8> {
    r.read_i8().map_err(truncated(field))
}

pub(crate) fn read_u32<R: Read>(r: &mut R, field: &'static str) -> CodecResult<u32> {
    r.read_u32::<BigEndian>().map_err(truncated(field))
}

pub(crate) fn read_u64<R: Read>(r: &mut R, field: &'static str) -> CodecResult<u64> {
    r.read_u64::<BigEndian>().map_err(truncated(field))
}

pub(crate) fn read_f64<R: Read>(r: &mut R, field: &'static str) -> CodecResult<f64> {
    r.read_f64::<BigEndian>().map_err(truncated(field))
}

pub(crate) fn read_bool<R: Read>(r: &mut R, field: &'static str) -> CodecResult<bool> {
    match read_u8(r, field)? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(CodecError::InvalidFlag { field, value }),
    }
}

/// Read exactly `len` bytes without pre-allocating `len`.
pub(crate) fn read_exact_vec<R: Read>(r: &mut R, len: usize, field: &'static str) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf).map_err(truncated(field))?;
    if buf.len() != len {
        return Err(CodecError::Truncated { field });
    }
    Ok(buf)
}

pub(crate) fn read_bytes<R: Read>(r: &mut R, field: &'static str) -> CodecResult<Vec<u8>> {
    let len = read_u32(r, field)? as usize;
    read_exact_vec(r, len, field)
}

pub(crate) fn read_string<R: Read>(r: &mut R, field: &'static str) -> CodecResult<String> {
    String::from_utf8(read_bytes(r, field)?)
        .map_err(|_| CodecError::Inconsistent(format!("{field} is not valid UTF-8")))
}

pub(crate) fn read_counts<R: Read>(r: &mut R, field: &'static str) -> CodecResult<Vec<EditCount>> {
    let len = read_u32(r, field)?;
    (0..len).map(|_| read_u32(r, field)).collect()
}

pub(crate) fn write_u8<W: Write>(w: &mut W, value: u8) -> CodecResult<()> {
    w.write_u8(value).map_err(write_err)
}

pub(crate) fn write_i8<W: Write>(w: &mut W, value: i8) -> CodecResult<()> {
    w.write_i8(value).map_err(write_err)
}

pub(crate) fn write_u32<W: Write>(w: &mut W, value: u32) -> CodecResult<()> {
    w.write_u32::<BigEndian>(value).map_err(write_err)
}

pub(crate) fn write_u64<W: Write>(w: &mut W, value: u64) -> CodecResult<()> {
    w.write_u64::<BigEndian>(value).map_err(write_err)
}

pub(crate) fn write_f64<W: Write>(w: &mut W, value: f64) -> CodecResult<()> {
    w.write_f64::<BigEndian>(value).map_err(write_err)
}

pub(crate) fn write_len<W: Write>(w: &mut W, len: usize, field: &'static str) -> CodecResult<()> {
    let len32 = u32::try_from(len).map_err(|_| CodecError::FieldOverflow { field, len })?;
    write_u32(w, len32)
}

pub(crate) fn write_bytes<W: Write>(w: &mut W, bytes: &[u8], field: &'static str) -> CodecResult<()> {
    write_len(w, bytes.len(), field)?;
    w.write_all(bytes).map_err(write_err)
}

pub(crate) fn write_counts<W: Write>(w: &mut W, counts: &[EditCount], field: &'static str) -> CodecResult<()> {
    write_len(w, counts.len(), field)?;
    counts.iter().try_for_each(|&c| write_u32(w, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_beyond_input_is_truncation() {
        let mut input: &[u8] = &[0, 0, 0, 9, b'A', b'C'];
        let err = read_bytes(&mut input, "backbone").unwrap_err();
        assert!(matches!(err, CodecError::Truncated { field: "backbone" }));
    }

    #[test]
    fn huge_length_prefix_does_not_allocate() {
        let mut input: &[u8] = &[0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            read_counts(&mut input, "edit_sites"),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn bool_rejects_out_of_range_bytes() {
        let mut input: &[u8] = &[2];
        assert!(matches!(
            read_bool(&mut input, "has_mutation"),
            Err(CodecError::InvalidFlag { value: 2, .. })
        ));
    }

    #[test]
    fn integers_are_big_endian() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0x0102_0304).unwrap();
        write_u64(&mut buf, 5).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 5]);
    }
}
