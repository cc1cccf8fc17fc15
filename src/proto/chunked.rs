//! Transfer-coding state machine: identity-by-length, chunked, eof and upgrade framing.
//!
//! Adapted from `xitca-http`'s `h1::proto::codec::TransferCoding` / `ChunkedState`, with
//! the buffer type narrowed from `PagedBytesMut` to plain `bytes::BytesMut` since this
//! crate's Connection buffers are not paged.

use std::io;

use bytes::{Buf, Bytes, BytesMut};

/// Coder for request-body decoding and response-body encoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransferCoding {
    /// No body expected/sent.
    Eof,
    /// Fixed `Content-Length`.
    Length(u64),
    /// Decoder for `Transfer-Encoding: chunked` request bodies.
    DecodeChunked(ChunkedState, u64),
    /// Encoder for chunked response bodies (content_length == -1, §9 sentinel discipline).
    EncodeChunked,
    /// CONNECT upgrade: pass bytes through untouched.
    Upgrade,
}

impl TransferCoding {
    pub const fn eof() -> Self {
        Self::Eof
    }

    pub const fn length(len: u64) -> Self {
        Self::Length(len)
    }

    pub const fn decode_chunked() -> Self {
        Self::DecodeChunked(ChunkedState::Size, 0)
    }

    pub const fn encode_chunked() -> Self {
        Self::EncodeChunked
    }

    pub const fn upgrade() -> Self {
        Self::Upgrade
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Encode one body chunk. Skips zero-length input: an app-yielded empty chunk must
    /// not produce a premature chunk terminator (§4.D).
    pub fn encode(&mut self, mut bytes: Bytes, buf: &mut BytesMut) {
        if bytes.is_empty() {
            return;
        }
        match self {
            Self::Upgrade => buf.extend_from_slice(&bytes),
            Self::EncodeChunked => encode_chunk(&bytes, buf),
            Self::Length(rem) => {
                let len = bytes.len() as u64;
                if *rem >= len {
                    buf.extend_from_slice(&bytes);
                    *rem -= len;
                } else {
                    let rem_usize = *rem as usize;
                    buf.extend_from_slice(&bytes.split_to(rem_usize));
                    *rem = 0;
                }
            }
            Self::Eof => tracing::warn!(target: "wsgi_boost::proto", "encode called on Eof coder"),
            Self::DecodeChunked(..) => unreachable!("DecodeChunked is a request-body decoder"),
        }
    }

    /// Emit the terminator for this encoding, if any (`0\r\n\r\n` for chunked).
    pub fn encode_eof(&mut self, buf: &mut BytesMut) {
        match self {
            Self::Eof | Self::Upgrade | Self::Length(0) => {}
            Self::EncodeChunked => buf.extend_from_slice(b"0\r\n\r\n"),
            Self::Length(n) => tracing::warn!(target: "wsgi_boost::proto", remaining = n, "body ended before declared Content-Length"),
            Self::DecodeChunked(..) => unreachable!("DecodeChunked is a request-body decoder"),
        }
    }

    /// Decode one unit of request body from `src`, advancing `self`'s internal state.
    pub fn decode(&mut self, src: &mut BytesMut) -> ChunkResult {
        match self {
            Self::Length(0) | Self::DecodeChunked(ChunkedState::End, _) => {
                *self = Self::Eof;
                ChunkResult::Eof
            }
            Self::Eof => ChunkResult::AlreadyEof,
            _ if src.is_empty() => ChunkResult::InsufficientData,
            Self::Length(rem) => ChunkResult::Ok(bounded_split(rem, src)),
            Self::Upgrade => ChunkResult::Ok(src.split().freeze()),
            Self::DecodeChunked(state, size) => loop {
                let mut buf = None;
                *state = match state.step(src, size, &mut buf) {
                    Ok(Some(next)) => next,
                    Ok(None) => return ChunkResult::InsufficientData,
                    Err(e) => return ChunkResult::Err(e),
                };
                if matches!(state, ChunkedState::End) {
                    return self.decode(src);
                }
                if let Some(buf) = buf {
                    return ChunkResult::Ok(buf);
                }
            },
        }
    }
}

fn encode_chunk(bytes: &Bytes, buf: &mut BytesMut) {
    // chunk size lines are rare enough per response that the allocation here doesn't matter.
    let len_hex = format!("{:x}", bytes.len());
    buf.extend_from_slice(len_hex.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(bytes);
    buf.extend_from_slice(b"\r\n");
}

fn bounded_split(rem: &mut u64, buf: &mut BytesMut) -> Bytes {
    let len = buf.len() as u64;
    if *rem >= len {
        *rem -= len;
        buf.split().freeze()
    } else {
        let rem_usize = *rem as usize;
        *rem = 0;
        buf.split_to(rem_usize).freeze()
    }
}

#[derive(Debug)]
pub enum ChunkResult {
    Ok(Bytes),
    Err(io::Error),
    InsufficientData,
    Eof,
    AlreadyEof,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChunkedState {
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

macro_rules! byte {
    ($rdr:ident) => {
        if $rdr.len() > 0 {
            let b = $rdr[0];
            $rdr.advance(1);
            b
        } else {
            return Ok(None);
        }
    };
}

impl ChunkedState {
    fn step(&mut self, body: &mut BytesMut, size: &mut u64, buf: &mut Option<Bytes>) -> io::Result<Option<Self>> {
        match *self {
            Self::Size => Self::read_size(body, size),
            Self::SizeLws => Self::read_size_lws(body),
            Self::Extension => Self::read_extension(body),
            Self::SizeLf => Self::read_size_lf(body, size),
            Self::Body => Self::read_body(body, size, buf),
            Self::BodyCr => Self::read_body_cr(body),
            Self::BodyLf => Self::read_body_lf(body),
            Self::Trailer => Self::read_trailer(body),
            Self::TrailerLf => Self::read_trailer_lf(body),
            Self::EndCr => Self::read_end_cr(body),
            Self::EndLf => Self::read_end_lf(body),
            Self::End => Ok(Some(Self::End)),
        }
    }

    fn read_size(rdr: &mut BytesMut, size: &mut u64) -> io::Result<Option<Self>> {
        macro_rules! or_overflow {
            ($e:expr) => {
                match $e {
                    Some(v) => v,
                    None => return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size: overflow")),
                }
            };
        }
        match byte!(rdr) {
            b @ b'0'..=b'9' => {
                *size = or_overflow!(size.checked_mul(16));
                *size = or_overflow!(size.checked_add((b - b'0') as u64));
            }
            b @ b'a'..=b'f' => {
                *size = or_overflow!(size.checked_mul(16));
                *size = or_overflow!(size.checked_add((b + 10 - b'a') as u64));
            }
            b @ b'A'..=b'F' => {
                *size = or_overflow!(size.checked_mul(16));
                *size = or_overflow!(size.checked_add((b + 10 - b'A') as u64));
            }
            b'\t' | b' ' => return Ok(Some(Self::SizeLws)),
            b';' => return Ok(Some(Self::Extension)),
            b'\r' => return Ok(Some(Self::SizeLf)),
            _ => return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid chunk size digit")),
        }
        Ok(Some(Self::Size))
    }

    fn read_size_lws(rdr: &mut BytesMut) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\t' | b' ' => Ok(Some(Self::SizeLws)),
            b';' => Ok(Some(Self::Extension)),
            b'\r' => Ok(Some(Self::SizeLf)),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid chunk size linear whitespace")),
        }
    }

    fn read_extension(rdr: &mut BytesMut) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\r' => Ok(Some(Self::SizeLf)),
            b'\n' => Err(io::Error::new(io::ErrorKind::InvalidData, "chunk extension contains bare newline")),
            _ => Ok(Some(Self::Extension)),
        }
    }

    fn read_size_lf(rdr: &mut BytesMut, size: &mut u64) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\n' if *size > 0 => Ok(Some(Self::Body)),
            b'\n' if *size == 0 => Ok(Some(Self::EndCr)),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid chunk size LF")),
        }
    }

    fn read_body(rdr: &mut BytesMut, rem: &mut u64, buf: &mut Option<Bytes>) -> io::Result<Option<Self>> {
        if rdr.is_empty() {
            Ok(None)
        } else {
            *buf = Some(bounded_split(rem, rdr));
            Ok(Some(if *rem > 0 { Self::Body } else { Self::BodyCr }))
        }
    }

    fn read_body_cr(rdr: &mut BytesMut) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\r' => Ok(Some(Self::BodyLf)),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid chunk body CR")),
        }
    }

    fn read_body_lf(rdr: &mut BytesMut) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\n' => Ok(Some(Self::Size)),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid chunk body LF")),
        }
    }

    fn read_trailer(rdr: &mut BytesMut) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\r' => Ok(Some(Self::TrailerLf)),
            _ => Ok(Some(Self::Trailer)),
        }
    }

    fn read_trailer_lf(rdr: &mut BytesMut) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\n' => Ok(Some(Self::EndCr)),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid trailer end LF")),
        }
    }

    fn read_end_cr(rdr: &mut BytesMut) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\r' => Ok(Some(Self::EndLf)),
            _ => Ok(Some(Self::Trailer)),
        }
    }

    fn read_end_lf(rdr: &mut BytesMut) -> io::Result<Option<Self>> {
        match byte!(rdr) {
            b'\n' => Ok(Some(Self::End)),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid chunk end LF")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_single_chunk() {
        let mut buf = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n"[..]);
        match TransferCoding::decode_chunked().decode(&mut buf) {
            ChunkResult::Ok(b) => assert_eq!(&b[..], b"1234567890abcdef"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_reaches_eof_then_already_eof() {
        let mut buf = BytesMut::from(&b"3\r\nabc\r\n0\r\n\r\n"[..]);
        let mut coder = TransferCoding::decode_chunked();
        assert!(matches!(coder.decode(&mut buf), ChunkResult::Ok(_)));
        assert!(matches!(coder.decode(&mut buf), ChunkResult::Eof));
        assert!(matches!(coder.decode(&mut buf), ChunkResult::AlreadyEof));
    }

    #[test]
    fn encode_chunked_roundtrip() {
        let mut encoder = TransferCoding::encode_chunked();
        let mut buf = BytesMut::new();
        encoder.encode(Bytes::from_static(b"aaa"), &mut buf);
        encoder.encode(Bytes::from_static(b""), &mut buf);
        encoder.encode(Bytes::from_static(b"bbbb"), &mut buf);
        encoder.encode_eof(&mut buf);
        assert_eq!(&buf[..], b"3\r\naaa\r\n4\r\nbbbb\r\n0\r\n\r\n");
    }

    #[test]
    fn encode_length_truncates_past_declared_size() {
        let mut encoder = TransferCoding::length(4);
        let mut buf = BytesMut::new();
        encoder.encode(Bytes::from_static(b"abcdef"), &mut buf);
        assert_eq!(&buf[..], b"abcd");
    }
}
