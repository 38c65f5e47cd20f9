//! # RESP2 Wire Codec
//!
//! Purpose: Turn command arguments into RESP2 request frames and read reply
//! frames back off a buffered stream, one frame per call.
//!
//! ## Design Principles
//! 1. **Bounded by Construction**: Every length read off the wire is checked
//!    against a limit before anything is allocated for it, so a corrupted
//!    header becomes `KvError::Protocol` and never an abort.
//! 2. **Nil Is Its Own Value**: `$-1` and `*-1` both decode to `Nil`; `*0` is
//!    an empty array.
//! 3. **Append-Only Encoding**: Requests are appended to a caller buffer so a
//!    pipeline can queue many frames before one flush.

use std::io::{BufRead, Read};

use kvpipe_common::{KvError, KvResult};

/// Largest bulk string accepted, matching the server's `proto-max-bulk-len`.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Largest array element count accepted.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;
/// Deepest array nesting accepted.
pub const MAX_NESTING: usize = 32;

/// Longest header line (tag, digits, CRLF) or simple/error line accepted.
const MAX_LINE_LEN: usize = 64 * 1024;
/// Up-front reservation cap; larger payloads grow as bytes arrive.
const PREALLOC_BYTES: usize = 64 * 1024;
const PREALLOC_ITEMS: usize = 64;
const CRLF: &[u8] = b"\r\n";

/// One decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status line such as `+OK`.
    Simple(Vec<u8>),
    /// Error line, without the leading `-`.
    Error(Vec<u8>),
    Integer(i64),
    Bulk(Vec<u8>),
    Array(Vec<RespValue>),
    /// Null bulk string or null array.
    Nil,
}

impl RespValue {
    /// Decodes a textual reply (status or bulk string).
    ///
    /// Error replies become `KvError::Server`. Nil, integer and array
    /// replies, as well as non-UTF-8 text, are `UnexpectedResponse`.
    pub fn into_string(self) -> KvResult<String> {
        let bytes = match self {
            RespValue::Simple(text) | RespValue::Bulk(text) => text,
            RespValue::Error(message) => return Err(KvError::Server { message }),
            _ => return Err(KvError::UnexpectedResponse),
        };
        String::from_utf8(bytes).map_err(|_| KvError::UnexpectedResponse)
    }

    /// Returns true for a `+PONG` or bulk `PONG` reply.
    pub fn is_pong(&self) -> bool {
        matches!(self, RespValue::Simple(text) | RespValue::Bulk(text) if text == b"PONG")
    }
}

/// Appends one request frame for `args` to `out`.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    let payload: usize = args.iter().map(|arg| arg.len() + 16).sum();
    out.reserve(payload + 16);

    push_header(out, b'*', args.len());
    for arg in args {
        push_header(out, b'$', arg.len());
        out.extend_from_slice(arg);
        out.extend_from_slice(CRLF);
    }
}

fn push_header(out: &mut Vec<u8>, tag: u8, len: usize) {
    out.push(tag);
    let mut digits = [0u8; 20];
    let mut start = digits.len();
    let mut rest = len;
    loop {
        start -= 1;
        digits[start] = b'0' + (rest % 10) as u8;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }
    out.extend_from_slice(&digits[start..]);
    out.extend_from_slice(CRLF);
}

/// Reads exactly one reply frame. `line_buf` is scratch space reused
/// between calls.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> KvResult<RespValue> {
    read_frame(reader, line_buf, 0)
}

fn read_frame<R: BufRead>(reader: &mut R, line: &mut Vec<u8>, depth: usize) -> KvResult<RespValue> {
    read_line(reader, line)?;
    let (&tag, body) = line.split_first().ok_or(KvError::Protocol)?;

    match tag {
        b'+' => Ok(RespValue::Simple(body.to_vec())),
        b'-' => Ok(RespValue::Error(body.to_vec())),
        b':' => parse_integer(body).map(RespValue::Integer),
        b'$' => match parse_length(body, MAX_BULK_LEN)? {
            Some(len) => read_bulk_body(reader, len).map(RespValue::Bulk),
            None => Ok(RespValue::Nil),
        },
        b'*' => match parse_length(body, MAX_ARRAY_LEN)? {
            Some(count) => read_elements(reader, line, count, depth),
            None => Ok(RespValue::Nil),
        },
        _ => Err(KvError::Protocol),
    }
}

fn read_bulk_body<R: BufRead>(reader: &mut R, len: usize) -> KvResult<Vec<u8>> {
    // `len + 2` cannot overflow: `len` is at most MAX_BULK_LEN.
    let framed = len + CRLF.len();
    let mut data = Vec::with_capacity(framed.min(PREALLOC_BYTES));
    reader.by_ref().take(framed as u64).read_to_end(&mut data)?;
    if data.len() < framed {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    if !data.ends_with(CRLF) {
        return Err(KvError::Protocol);
    }
    data.truncate(len);
    Ok(data)
}

fn read_elements<R: BufRead>(
    reader: &mut R,
    line: &mut Vec<u8>,
    count: usize,
    depth: usize,
) -> KvResult<RespValue> {
    if depth >= MAX_NESTING {
        return Err(KvError::Protocol);
    }
    let mut items = Vec::with_capacity(count.min(PREALLOC_ITEMS));
    for _ in 0..count {
        items.push(read_frame(reader, line, depth + 1)?);
    }
    Ok(RespValue::Array(items))
}

/// Fills `buf` with the next line minus its CRLF.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> KvResult<()> {
    buf.clear();
    let read = reader.by_ref().take(MAX_LINE_LEN as u64).read_until(b'\n', buf)?;
    if read == 0 {
        // Peer closed the stream between replies.
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    if !buf.ends_with(CRLF) {
        // Either an over-long line or a bare LF.
        return Err(KvError::Protocol);
    }
    buf.truncate(buf.len() - CRLF.len());
    Ok(())
}

/// Parses a `$`/`*` length. `-1` is nil; any other negative value or a value
/// above `max` is a protocol error.
fn parse_length(text: &[u8], max: usize) -> KvResult<Option<usize>> {
    if text == b"-1" {
        return Ok(None);
    }
    let value = parse_integer(text)?;
    usize::try_from(value)
        .ok()
        .filter(|len| *len <= max)
        .map(Some)
        .ok_or(KvError::Protocol)
}

/// Strict decimal parse; overflow is a protocol error rather than a clamp.
fn parse_integer(text: &[u8]) -> KvResult<i64> {
    let (negative, digits) = match text {
        [b'-', rest @ ..] => (true, rest),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(KvError::Protocol);
    }
    // Accumulate toward negative so i64::MIN parses.
    let negated = digits
        .iter()
        .try_fold(0i64, |acc, &d| acc.checked_mul(10)?.checked_sub(i64::from(d - b'0')))
        .ok_or(KvError::Protocol)?;
    if negative {
        Ok(negated)
    } else {
        negated.checked_neg().ok_or(KvError::Protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(raw: &[u8]) -> KvResult<RespValue> {
        let mut reader = Cursor::new(raw.to_vec());
        let mut line = Vec::new();
        read_response(&mut reader, &mut line)
    }

    #[test]
    fn frames_queue_back_to_back() {
        let mut buf = Vec::new();
        encode_command(&[b"PING"], &mut buf);
        encode_command(&[b"SET", b"k", b"v", b"EX", b"10"], &mut buf);
        assert_eq!(
            &buf,
            b"*1\r\n$4\r\nPING\r\n*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nEX\r\n$2\r\n10\r\n"
        );
    }

    #[test]
    fn empty_argument_and_multi_digit_lengths() {
        let mut buf = Vec::new();
        let long = vec![b'x'; 1234];
        encode_command(&[b"GET", b""], &mut buf);
        encode_command(&[long.as_slice()], &mut buf);
        assert!(buf.starts_with(b"*2\r\n$3\r\nGET\r\n$0\r\n\r\n*1\r\n$1234\r\nxxx"));
    }

    #[test]
    fn decodes_each_reply_kind() {
        assert_eq!(decode(b"+OK\r\n").unwrap(), RespValue::Simple(b"OK".to_vec()));
        assert_eq!(decode(b"-ERR bad\r\n").unwrap(), RespValue::Error(b"ERR bad".to_vec()));
        assert_eq!(decode(b":-42\r\n").unwrap(), RespValue::Integer(-42));
        assert_eq!(decode(b"$5\r\nhe\r\no\r\n").unwrap(), RespValue::Bulk(b"he\r\no".to_vec()));
        assert_eq!(decode(b"$0\r\n\r\n").unwrap(), RespValue::Bulk(Vec::new()));
    }

    #[test]
    fn null_array_differs_from_empty_array() {
        assert_eq!(decode(b"*-1\r\n").unwrap(), RespValue::Nil);
        assert_eq!(decode(b"$-1\r\n").unwrap(), RespValue::Nil);
        assert_eq!(decode(b"*0\r\n").unwrap(), RespValue::Array(Vec::new()));
        assert!(matches!(decode(b"*-2\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b"$-5\r\n"), Err(KvError::Protocol)));
    }

    #[test]
    fn decodes_nested_array() {
        let value = decode(b"*3\r\n:1\r\n*1\r\n+x\r\n$-1\r\n").unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Integer(1),
                RespValue::Array(vec![RespValue::Simple(b"x".to_vec())]),
                RespValue::Nil,
            ])
        );
    }

    #[test]
    fn replies_are_consumed_in_order() {
        let mut reader = Cursor::new(b"+OK\r\n-ERR nope\r\n$2\r\nok\r\n".to_vec());
        let mut line = Vec::new();
        let first = read_response(&mut reader, &mut line).unwrap();
        let second = read_response(&mut reader, &mut line).unwrap();
        let third = read_response(&mut reader, &mut line).unwrap();
        assert_eq!(first.into_string().unwrap(), "OK");
        assert!(matches!(second.into_string(), Err(KvError::Server { .. })));
        assert_eq!(third.into_string().unwrap(), "ok");
    }

    #[test]
    fn huge_lengths_are_rejected_before_allocating() {
        assert!(matches!(decode(b"$9223372036854775807\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b"*9223372036854775807\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b"$536870913\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b"*1048577\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b"$99999999999999999999\r\n"), Err(KvError::Protocol)));
    }

    #[test]
    fn truncated_payload_under_the_limit_is_an_io_fault() {
        let err = decode(b"$536870912\r\nabc").unwrap_err();
        assert!(err.is_connection_fault());
        let err = decode(b"*1000\r\n:1\r\n").unwrap_err();
        assert!(err.is_connection_fault());
    }

    #[test]
    fn nesting_is_bounded() {
        let mut raw = b"*1\r\n".repeat(MAX_NESTING + 1);
        raw.extend_from_slice(b":1\r\n");
        assert!(matches!(decode(&raw), Err(KvError::Protocol)));

        let mut raw = b"*1\r\n".repeat(MAX_NESTING);
        raw.extend_from_slice(b":1\r\n");
        assert!(decode(&raw).is_ok());
    }

    #[test]
    fn integers_parse_strictly() {
        assert_eq!(decode(b":-9223372036854775808\r\n").unwrap(), RespValue::Integer(i64::MIN));
        assert_eq!(decode(b":9223372036854775807\r\n").unwrap(), RespValue::Integer(i64::MAX));
        assert!(matches!(decode(b":9223372036854775808\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b":12a\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b":-\r\n"), Err(KvError::Protocol)));
    }

    #[test]
    fn bad_framing_is_a_protocol_error() {
        assert!(matches!(decode(b"?what\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b"+OK\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b"\r\n"), Err(KvError::Protocol)));
        assert!(matches!(decode(b"$3\r\nabcXY"), Err(KvError::Protocol)));
    }

    #[test]
    fn endless_line_is_cut_off() {
        let mut raw = vec![b'+'; MAX_LINE_LEN + 10];
        raw.extend_from_slice(b"\r\n");
        assert!(matches!(decode(&raw), Err(KvError::Protocol)));
    }

    #[test]
    fn eof_is_an_io_fault() {
        assert!(decode(b"").unwrap_err().is_connection_fault());
    }

    #[test]
    fn into_string_rejects_non_text() {
        assert!(matches!(RespValue::Nil.into_string(), Err(KvError::UnexpectedResponse)));
        assert!(matches!(RespValue::Integer(1).into_string(), Err(KvError::UnexpectedResponse)));
        assert!(matches!(
            RespValue::Simple(vec![0xff, 0xfe]).into_string(),
            Err(KvError::UnexpectedResponse)
        ));
    }

    #[test]
    fn recognises_pong() {
        assert!(RespValue::Simple(b"PONG".to_vec()).is_pong());
        assert!(RespValue::Bulk(b"PONG".to_vec()).is_pong());
        assert!(!RespValue::Simple(b"OK".to_vec()).is_pong());
        assert!(!RespValue::Error(b"PONG".to_vec()).is_pong());
    }
}
