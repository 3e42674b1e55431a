//! Log format parser using nom
//!
//! File format:
//! ```text
//! TIERKV01\n
//! [version: u32 little-endian]
//! ...records...
//! ```
//!
//! Record format:
//! ```text
//! [op: u8][key_len: u32 LE][value_len: u32 LE][key bytes][value bytes]
//! ```
//!
//! `op` is 1 for a put and 2 for a delete. Delete records carry an empty value.

use nom::{
    bytes::complete::tag,
    bytes::streaming::take,
    combinator::map_opt,
    number::complete::le_u32 as complete_le_u32,
    number::streaming::{le_u32, le_u8},
    sequence::tuple,
    IResult,
};

use crate::error::{Error, Result};

/// Magic header for tierkv log files
pub const TIERKV_MAGIC: &[u8] = b"TIERKV01\n";

/// Current log format version
pub const FORMAT_VERSION: u32 = 1;

/// Length of the file header in bytes
pub const HEADER_LEN: usize = TIERKV_MAGIC.len() + 4;

/// Length of the fixed part of a record in bytes
pub const RECORD_HEADER_LEN: usize = 9;

/// Kind of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordOp {
    /// Key was written
    Put = 1,
    /// Key was removed
    Delete = 2,
}

impl RecordOp {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(RecordOp::Put),
            2 => Some(RecordOp::Delete),
            _ => None,
        }
    }
}

/// A single record borrowed from the log buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    /// Record kind
    pub op: RecordOp,
    /// Key bytes
    pub key: &'a [u8],
    /// Value bytes (empty for deletes)
    pub value: &'a [u8],
}

/// Parse the log file header and return the format version
pub fn parse_header(input: &[u8]) -> Result<u32> {
    if input.len() < HEADER_LEN {
        return Err(Error::Parse("Input too short for header".to_string()));
    }

    let parsed: IResult<&[u8], (&[u8], u32)> = tuple((tag(TIERKV_MAGIC), complete_le_u32))(input);
    match parsed {
        Ok((_, (_, version))) if version == FORMAT_VERSION => Ok(version),
        Ok((_, (_, version))) => Err(Error::Parse(format!("Unsupported log version {}", version))),
        Err(_) => Err(Error::Parse("Invalid tierkv magic header".to_string())),
    }
}

/// Create a log file header
pub fn create_header(version: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(TIERKV_MAGIC);
    header.extend_from_slice(&version.to_le_bytes());
    header
}

/// Parse one record.
///
/// Uses streaming parsers so a torn tail (a record cut short by a crash) yields
/// `nom::Err::Incomplete` instead of a hard error.
pub fn parse_record(input: &[u8]) -> IResult<&[u8], Record<'_>> {
    let (input, op) = map_opt(le_u8, RecordOp::from_byte)(input)?;
    let (input, key_len) = le_u32(input)?;
    let (input, value_len) = le_u32(input)?;
    let (input, key) = take(key_len)(input)?;
    let (input, value) = take(value_len)(input)?;
    Ok((input, Record { op, key, value }))
}

/// Encode one record
pub fn encode_record(op: RecordOp, key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + key.len() + value.len());
    buf.push(op as u8);
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf
}
