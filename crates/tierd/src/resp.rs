//! RESP (REdis Serialization Protocol) parser and serializer
//!
//! Implements the RESP2 subset needed by Redis clients: simple strings,
//! errors, integers, bulk strings and arrays.

use bytes::{Buf, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Maximum bulk string size (512MB)
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array size (1M elements)
const MAX_ARRAY_SIZE: usize = 1024 * 1024;

/// Malformed client input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// First byte is not a RESP type marker
    #[error("unknown RESP type '{0}'")]
    UnknownType(char),
    /// A length or integer line did not parse
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    /// Simple string or error line is not UTF-8
    #[error("invalid UTF-8 in line")]
    InvalidUtf8,
    /// Bulk string payload not followed by CRLF
    #[error("expected CRLF after bulk string")]
    MissingCrlf,
    /// Bulk string above the size limit
    #[error("bulk string too large: {0} bytes")]
    BulkTooLarge(usize),
    /// Array above the element limit
    #[error("array too large: {0} elements")]
    ArrayTooLarge(usize),
}

/// RESP data types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -Error message\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n
    BulkString(Option<Vec<u8>>),
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Error reply
    pub fn error(message: impl Into<String>) -> Self {
        RespValue::Error(message.into())
    }

    /// Non-null bulk string
    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    /// Null bulk string
    pub fn null() -> Self {
        RespValue::BulkString(None)
    }

    /// Array of bulk strings
    pub fn bulk_array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        RespValue::Array(Some(items.into_iter().map(RespValue::bulk).collect()))
    }

    /// Borrow the payload of a bulk or simple string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Serialize to RESP format
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Error(e) => {
                out.push(b'-');
                out.extend_from_slice(e.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(i) => out.extend_from_slice(format!(":{}\r\n", i).as_bytes()),
            RespValue::BulkString(None) => out.extend_from_slice(b"$-1\r\n"),
            RespValue::BulkString(Some(data)) => {
                out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => out.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.write_to(out);
                }
            }
        }
    }

    /// Parse one value from the front of `buf`
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when more data is needed.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, ProtocolError> {
        if buf.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&buf[..]);
        match parse_value(&mut cursor)? {
            Some(value) => {
                let pos = cursor.position() as usize;
                buf.advance(pos);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

fn parse_value(cursor: &mut Cursor<&[u8]>) -> Result<Option<RespValue>, ProtocolError> {
    if !cursor.has_remaining() {
        return Ok(None);
    }

    match cursor.get_u8() {
        b'+' => Ok(read_text(cursor)?.map(RespValue::SimpleString)),
        b'-' => Ok(read_text(cursor)?.map(RespValue::Error)),
        b':' => Ok(read_number(cursor)?.map(RespValue::Integer)),
        b'$' => parse_bulk_string(cursor),
        b'*' => parse_array(cursor),
        other => Err(ProtocolError::UnknownType(other as char)),
    }
}

fn read_text(cursor: &mut Cursor<&[u8]>) -> Result<Option<String>, ProtocolError> {
    match read_line(cursor) {
        Some(line) => String::from_utf8(line)
            .map(Some)
            .map_err(|_| ProtocolError::InvalidUtf8),
        None => Ok(None),
    }
}

fn read_number(cursor: &mut Cursor<&[u8]>) -> Result<Option<i64>, ProtocolError> {
    match read_line(cursor) {
        Some(line) => {
            let text = String::from_utf8_lossy(&line);
            text.parse::<i64>()
                .map(Some)
                .map_err(|_| ProtocolError::InvalidNumber(text.into_owned()))
        }
        None => Ok(None),
    }
}

fn parse_bulk_string(cursor: &mut Cursor<&[u8]>) -> Result<Option<RespValue>, ProtocolError> {
    let len = match read_number(cursor)? {
        Some(len) => len,
        None => return Ok(None),
    };

    if len < 0 {
        return Ok(Some(RespValue::BulkString(None)));
    }

    let len = len as usize;
    if len > MAX_BULK_STRING_SIZE {
        return Err(ProtocolError::BulkTooLarge(len));
    }

    if cursor.remaining() < len + 2 {
        return Ok(None);
    }

    let mut data = vec![0u8; len];
    cursor.copy_to_slice(&mut data);

    if cursor.get_u8() != b'\r' || cursor.get_u8() != b'\n' {
        return Err(ProtocolError::MissingCrlf);
    }

    Ok(Some(RespValue::BulkString(Some(data))))
}

fn parse_array(cursor: &mut Cursor<&[u8]>) -> Result<Option<RespValue>, ProtocolError> {
    let len = match read_number(cursor)? {
        Some(len) => len,
        None => return Ok(None),
    };

    if len < 0 {
        return Ok(Some(RespValue::Array(None)));
    }

    let len = len as usize;
    if len > MAX_ARRAY_SIZE {
        return Err(ProtocolError::ArrayTooLarge(len));
    }

    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        match parse_value(cursor)? {
            Some(item) => items.push(item),
            None => return Ok(None),
        }
    }

    Ok(Some(RespValue::Array(Some(items))))
}

fn read_line(cursor: &mut Cursor<&[u8]>) -> Option<Vec<u8>> {
    let start = cursor.position() as usize;
    let slice = &cursor.get_ref()[start..];

    let end = slice.windows(2).position(|window| window == b"\r\n")?;
    let line = slice[..end].to_vec();
    cursor.set_position((start + end + 2) as u64);
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8]) -> RespValue {
        let mut buf = BytesMut::from(data);
        let val = RespValue::parse(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        assert_eq!(val.serialize(), data);
        val
    }

    #[test]
    fn test_scalars() {
        assert_eq!(roundtrip(b"+OK\r\n"), RespValue::ok());
        assert_eq!(roundtrip(b"-ERR boom\r\n"), RespValue::error("ERR boom"));
        assert_eq!(roundtrip(b":-42\r\n"), RespValue::Integer(-42));
        assert_eq!(roundtrip(b"$6\r\nfoobar\r\n"), RespValue::bulk("foobar"));
        assert_eq!(roundtrip(b"$-1\r\n"), RespValue::null());
    }

    #[test]
    fn test_command_array() {
        let val = roundtrip(b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
        assert_eq!(val, RespValue::bulk_array(["SET", "key", "value"]));
    }

    #[test]
    fn test_pipelined_commands() {
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n"[..]);

        let first = RespValue::parse(&mut buf).unwrap().unwrap();
        let second = RespValue::parse(&mut buf).unwrap().unwrap();

        assert_eq!(first, RespValue::bulk_array(["PING"]));
        assert_eq!(second, RespValue::bulk_array(["GET", "k"]));
        assert!(RespValue::parse(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_incomplete_data() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$6\r\nfoo"[..]);
        assert!(RespValue::parse(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn test_binary_bulk_payload() {
        let val = roundtrip(b"$4\r\na\r\nb\r\n");
        assert_eq!(val.as_bytes(), Some(&b"a\r\nb"[..]));
    }

    #[test]
    fn test_unknown_type() {
        let mut buf = BytesMut::from(&b"?what\r\n"[..]);
        assert_eq!(
            RespValue::parse(&mut buf),
            Err(ProtocolError::UnknownType('?'))
        );
    }
}
