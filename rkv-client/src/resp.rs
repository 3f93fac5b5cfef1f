//! # RESP Encoding and Parsing
//!
//! Purpose: Encode client commands and parse server replies, keeping
//! allocations under control.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Arguments and bulk strings are length-prefixed raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors, never a guess.
//! 5. **Null Is Not Empty**: `$-1` and `*-1` decode to `None`, distinct from
//!    empty payloads.

use std::io::{self, BufRead};

use bytes::{BufMut, BytesMut};

use crate::error::{ClientError, ClientResult, ProtocolError, ServerError};

/// Largest bulk string the decoder accepts (512 MiB).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Deepest array nesting the decoder follows before giving up.
pub const MAX_DEPTH: usize = 64;

const CRLF: &[u8] = b"\r\n";

/// Reply value decoded from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// +OK or +PONG style replies.
    Status(Vec<u8>),
    /// -ERR ... replies. A successful exchange, not a transport failure.
    Error(ServerError),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays, with None for null. Items may nest.
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Short variant name used in `UnexpectedType` errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(Some(_)) => "bulk",
            Reply::Bulk(None) => "null bulk",
            Reply::Array(Some(_)) => "array",
            Reply::Array(None) => "null array",
        }
    }

    /// True for `$-1` and `*-1`.
    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }

    /// Converts an error reply into `ClientError::Server`, passing others through.
    pub fn into_result(self) -> ClientResult<Reply> {
        match self {
            Reply::Error(err) => Err(ClientError::Server(err)),
            other => Ok(other),
        }
    }

    pub fn into_status(self) -> ClientResult<Vec<u8>> {
        match self.into_result()? {
            Reply::Status(text) => Ok(text),
            other => Err(unexpected("status", &other)),
        }
    }

    pub fn into_integer(self) -> ClientResult<i64> {
        match self.into_result()? {
            Reply::Integer(value) => Ok(value),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Returns the bulk payload, `None` for a null bulk.
    pub fn into_bulk(self) -> ClientResult<Option<Vec<u8>>> {
        match self.into_result()? {
            Reply::Bulk(data) => Ok(data),
            other => Err(unexpected("bulk", &other)),
        }
    }

    /// Returns the array items, `None` for a null array.
    pub fn into_array(self) -> ClientResult<Option<Vec<Reply>>> {
        match self.into_result()? {
            Reply::Array(items) => Ok(items),
            other => Err(unexpected("array", &other)),
        }
    }
}

fn unexpected(expected: &'static str, actual: &Reply) -> ClientError {
    ClientError::UnexpectedType {
        expected,
        actual: actual.type_name(),
    }
}

/// Ordered command arguments; the first one is the verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(verb: impl Arg) -> Self {
        let mut args = Vec::with_capacity(4);
        args.push(verb.into_arg());
        Command { args }
    }

    /// Appends one argument.
    pub fn arg(mut self, value: impl Arg) -> Self {
        self.args.push(value.into_arg());
        self
    }

    /// Appends every item of `values` as its own argument.
    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Arg,
    {
        self.args.extend(values.into_iter().map(Arg::into_arg));
        self
    }

    pub fn verb(&self) -> &[u8] {
        &self.args[0]
    }

    pub fn as_slices(&self) -> impl Iterator<Item = &[u8]> {
        self.args.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Values that can be sent as a single command argument.
pub trait Arg {
    fn into_arg(self) -> Vec<u8>;
}

impl Arg for &str {
    fn into_arg(self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Arg for String {
    fn into_arg(self) -> Vec<u8> {
        self.into_bytes()
    }
}

impl Arg for &String {
    fn into_arg(self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Arg for &[u8] {
    fn into_arg(self) -> Vec<u8> {
        self.to_vec()
    }
}

impl<const N: usize> Arg for &[u8; N] {
    fn into_arg(self) -> Vec<u8> {
        self.to_vec()
    }
}

impl Arg for Vec<u8> {
    fn into_arg(self) -> Vec<u8> {
        self
    }
}

impl Arg for &Vec<u8> {
    fn into_arg(self) -> Vec<u8> {
        self.clone()
    }
}

impl Arg for f64 {
    fn into_arg(self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

macro_rules! int_arg {
    ($($ty:ty),*) => {
        $(
            impl Arg for $ty {
                fn into_arg(self) -> Vec<u8> {
                    let mut out = Vec::with_capacity(20);
                    push_i128(&mut out, self as i128);
                    out
                }
            }
        )*
    };
}

int_arg!(i32, i64, u32, u64, usize);

/// Encodes a command as an array of bulk strings into `out`.
pub fn encode_command(command: &Command, out: &mut BytesMut) {
    out.reserve(16 + command.args.iter().map(|a| a.len() + 16).sum::<usize>());
    out.put_u8(b'*');
    put_decimal(out, command.len() as i128);
    out.put_slice(CRLF);
    for arg in &command.args {
        out.put_u8(b'$');
        put_decimal(out, arg.len() as i128);
        out.put_slice(CRLF);
        out.put_slice(arg);
        out.put_slice(CRLF);
    }
}

/// Reference encoder for replies, the server-side framing.
pub fn encode_reply(reply: &Reply, out: &mut Vec<u8>) {
    match reply {
        Reply::Status(text) => {
            out.push(b'+');
            out.extend_from_slice(text);
        }
        Reply::Error(err) => {
            out.push(b'-');
            out.extend_from_slice(err.to_string().as_bytes());
        }
        Reply::Integer(value) => {
            out.push(b':');
            push_i128(out, *value as i128);
        }
        Reply::Bulk(None) => out.extend_from_slice(b"$-1"),
        Reply::Bulk(Some(data)) => {
            out.push(b'$');
            push_i128(out, data.len() as i128);
            out.extend_from_slice(CRLF);
            out.extend_from_slice(data);
        }
        Reply::Array(None) => out.extend_from_slice(b"*-1"),
        Reply::Array(Some(items)) => {
            out.push(b'*');
            push_i128(out, items.len() as i128);
            out.extend_from_slice(CRLF);
            for item in items {
                encode_reply(item, out);
            }
            // Items carry their own terminators.
            return;
        }
    }
    out.extend_from_slice(CRLF);
}

/// Reads exactly one reply from the buffered reader.
///
/// `line_buf` is scratch space reused across calls. Transport failures come
/// back as `ClientError::Transport`, framing failures as
/// `ClientError::Protocol`.
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Reply> {
    read_nested(reader, line_buf, 0)
}

fn read_nested<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> ClientResult<Reply> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::TooDeep(MAX_DEPTH).into());
    }

    read_line(reader, line_buf)?;
    let (&tag, body) = line_buf.split_first().ok_or(ProtocolError::Truncated)?;

    match tag {
        b'+' => Ok(Reply::Status(body.to_vec())),
        b'-' => Ok(Reply::Error(ServerError::parse(body))),
        b':' => Ok(Reply::Integer(parse_i64(body)?)),
        b'$' => {
            let len = parse_len(body)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_len(body)?;
            read_array(reader, len, line_buf, depth)
        }
        other => Err(ProtocolError::UnknownTag(other).into()),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: Option<usize>) -> ClientResult<Reply> {
    let len = match len {
        Some(len) => len,
        None => return Ok(Reply::Bulk(None)),
    };

    let mut data = vec![0u8; len];
    read_exact(reader, &mut data)?;

    let mut crlf = [0u8; 2];
    read_exact(reader, &mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(ProtocolError::MissingCrlf.into());
    }

    Ok(Reply::Bulk(Some(data)))
}

fn read_array<R: BufRead>(
    reader: &mut R,
    len: Option<usize>,
    line_buf: &mut Vec<u8>,
    depth: usize,
) -> ClientResult<Reply> {
    let len = match len {
        Some(len) => len,
        None => return Ok(Reply::Array(None)),
    };

    // Cap the up-front allocation; the count comes from the wire.
    let mut items = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        items.push(read_nested(reader, line_buf, depth + 1)?);
    }
    Ok(Reply::Array(Some(items)))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 || buf.last() != Some(&b'\n') {
        return Err(ProtocolError::Truncated.into());
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ProtocolError::MissingCrlf.into());
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn read_exact<R: BufRead>(reader: &mut R, buf: &mut [u8]) -> ClientResult<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::Truncated.into()),
        Err(err) => Err(err.into()),
    }
}

/// Parses a length header: `-1` is null, other negatives are rejected.
fn parse_len(data: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let len = parse_i64(data)?;
    match len {
        -1 => Ok(None),
        0..=MAX_BULK_LEN => Ok(Some(len as usize)),
        _ => Err(ProtocolError::InvalidLength(len)),
    }
}

fn parse_i64(data: &[u8]) -> Result<i64, ProtocolError> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, data),
    };
    if digits.is_empty() {
        return Err(ProtocolError::InvalidInteger);
    }

    // Accumulate on the negative side so i64::MIN parses.
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ProtocolError::InvalidInteger);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_sub((b - b'0') as i64))
            .ok_or(ProtocolError::InvalidInteger)?;
    }

    if negative {
        Ok(value)
    } else {
        value.checked_neg().ok_or(ProtocolError::InvalidInteger)
    }
}

fn put_decimal(out: &mut BytesMut, value: i128) {
    let mut buf = [0u8; 40];
    let len = format_i128(value, &mut buf);
    out.put_slice(&buf[..len]);
}

fn push_i128(out: &mut Vec<u8>, value: i128) {
    let mut buf = [0u8; 40];
    let len = format_i128(value, &mut buf);
    out.extend_from_slice(&buf[..len]);
}

fn format_i128(value: i128, buf: &mut [u8; 40]) -> usize {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut magnitude = value.unsigned_abs();
    let mut len = 0;
    if magnitude == 0 {
        buf[0] = b'0';
        return 1;
    }
    while magnitude > 0 {
        buf[len] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
        len += 1;
    }
    if value < 0 {
        buf[len] = b'-';
        len += 1;
    }
    buf[..len].reverse();
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(bytes: &[u8]) -> ClientResult<Reply> {
        let mut reader = Cursor::new(bytes.to_vec());
        let mut line = Vec::new();
        read_reply(&mut reader, &mut line)
    }

    fn encode(reply: &Reply) -> Vec<u8> {
        let mut out = Vec::new();
        encode_reply(reply, &mut out);
        out
    }

    fn protocol_error(result: ClientResult<Reply>) -> ProtocolError {
        match result {
            Err(ClientError::Protocol(err)) => err,
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn encodes_set_command() {
        let mut buf = BytesMut::new();
        encode_command(&Command::new("SET").arg("foo").arg("bar"), &mut buf);
        assert_eq!(&buf[..], b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    }

    #[test]
    fn encodes_binary_and_numeric_arguments() {
        let mut buf = BytesMut::new();
        let cmd = Command::new("SET").arg(&b"a\r\n\0"[..]).arg(-42i64);
        encode_command(&cmd, &mut buf);
        assert_eq!(&buf[..], b"*3\r\n$3\r\nSET\r\n$4\r\na\r\n\0\r\n$3\r\n-42\r\n");
    }

    #[test]
    fn command_collects_arguments() {
        let cmd = Command::new("DEL").args(["a", "b", "c"]);
        assert_eq!(cmd.verb(), b"DEL");
        assert_eq!(cmd.len(), 4);
        let args: Vec<&[u8]> = cmd.as_slices().collect();
        assert_eq!(args[3], b"c");
    }

    #[test]
    fn parses_simple_string() {
        assert_eq!(decode(b"+OK\r\n").unwrap(), Reply::Status(b"OK".to_vec()));
    }

    #[test]
    fn parses_bulk_string() {
        assert_eq!(
            decode(b"$5\r\nhello\r\n").unwrap(),
            Reply::Bulk(Some(b"hello".to_vec()))
        );
    }

    #[test]
    fn null_bulk_differs_from_empty_bulk() {
        let empty = decode(b"$0\r\n\r\n").unwrap();
        let null = decode(b"$-1\r\n").unwrap();
        assert_eq!(empty, Reply::Bulk(Some(Vec::new())));
        assert_eq!(null, Reply::Bulk(None));
        assert_ne!(empty, null);
    }

    #[test]
    fn null_array_differs_from_empty_array() {
        assert_eq!(decode(b"*0\r\n").unwrap(), Reply::Array(Some(Vec::new())));
        assert_eq!(decode(b"*-1\r\n").unwrap(), Reply::Array(None));
    }

    #[test]
    fn parses_integer() {
        assert_eq!(decode(b":42\r\n").unwrap(), Reply::Integer(42));
        assert_eq!(decode(b":-7\r\n").unwrap(), Reply::Integer(-7));
        assert_eq!(
            decode(b":-9223372036854775808\r\n").unwrap(),
            Reply::Integer(i64::MIN)
        );
    }

    #[test]
    fn parses_error() {
        assert_eq!(
            decode(b"-ERR bad\r\n").unwrap(),
            Reply::Error(ServerError::new("ERR", "bad"))
        );
    }

    #[test]
    fn bulk_payload_may_contain_crlf() {
        assert_eq!(
            decode(b"$4\r\n\r\n\r\n\r\n").unwrap(),
            Reply::Bulk(Some(b"\r\n\r\n".to_vec()))
        );
    }

    #[test]
    fn parses_scan_style_reply() {
        let reply = decode(b"*2\r\n$2\r\n17\r\n*2\r\n$1\r\na\r\n$-1\r\n").unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![
                Reply::Bulk(Some(b"17".to_vec())),
                Reply::Array(Some(vec![Reply::Bulk(Some(b"a".to_vec())), Reply::Bulk(None)])),
            ]))
        );
    }

    #[test]
    fn reference_encoding_decodes_to_equal_reply() {
        let reply = Reply::Array(Some(vec![
            Reply::Status(b"OK".to_vec()),
            Reply::Error(ServerError::new("WRONGTYPE", "wrong kind")),
            Reply::Integer(-1),
            Reply::Bulk(Some(b"bin\r\n\0ary".to_vec())),
            Reply::Array(Some(vec![
                Reply::Array(Some(vec![Reply::Bulk(None), Reply::Array(None)])),
                Reply::Array(Some(Vec::new())),
                Reply::Bulk(Some(Vec::new())),
            ])),
            Reply::Array(None),
        ]));
        assert_eq!(decode(&encode(&reply)).unwrap(), reply);
    }

    #[test]
    fn reads_one_reply_at_a_time() {
        let mut reader = Cursor::new(b"+OK\r\n:1\r\n".to_vec());
        let mut line = Vec::new();
        assert_eq!(read_reply(&mut reader, &mut line).unwrap(), Reply::Status(b"OK".to_vec()));
        assert_eq!(read_reply(&mut reader, &mut line).unwrap(), Reply::Integer(1));
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(protocol_error(decode(b"?what\r\n")), ProtocolError::UnknownTag(b'?'));
    }

    #[test]
    fn rejects_negative_lengths_other_than_minus_one() {
        assert_eq!(protocol_error(decode(b"$-2\r\n")), ProtocolError::InvalidLength(-2));
        assert_eq!(protocol_error(decode(b"*-5\r\n")), ProtocolError::InvalidLength(-5));
    }

    #[test]
    fn rejects_truncated_frames() {
        assert_eq!(protocol_error(decode(b"$5\r\nhel")), ProtocolError::Truncated);
        assert_eq!(protocol_error(decode(b"*2\r\n:1\r\n")), ProtocolError::Truncated);
        assert_eq!(protocol_error(decode(b"+OK")), ProtocolError::Truncated);
        assert_eq!(protocol_error(decode(b"")), ProtocolError::Truncated);
    }

    #[test]
    fn rejects_bad_terminators_and_integers() {
        assert_eq!(protocol_error(decode(b"+OK\n")), ProtocolError::MissingCrlf);
        assert_eq!(protocol_error(decode(b"$2\r\nabXY")), ProtocolError::MissingCrlf);
        assert_eq!(protocol_error(decode(b":12a\r\n")), ProtocolError::InvalidInteger);
        assert_eq!(protocol_error(decode(b":-\r\n")), ProtocolError::InvalidInteger);
    }

    #[test]
    fn rejects_runaway_nesting() {
        let mut bytes = Vec::new();
        for _ in 0..=MAX_DEPTH + 1 {
            bytes.extend_from_slice(b"*1\r\n");
        }
        bytes.extend_from_slice(b":1\r\n");
        assert_eq!(protocol_error(decode(&bytes)), ProtocolError::TooDeep(MAX_DEPTH));
    }

    #[test]
    fn typed_accessors_report_mismatch() {
        match Reply::Integer(1).into_bulk() {
            Err(ClientError::UnexpectedType { expected, actual }) => {
                assert_eq!(expected, "bulk");
                assert_eq!(actual, "integer");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(matches!(
            Reply::Error(ServerError::new("ERR", "no")).into_status(),
            Err(ClientError::Server(_))
        ));
        assert_eq!(Reply::Bulk(None).into_bulk().unwrap(), None);
    }
}
