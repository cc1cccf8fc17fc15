//! Connection (§4.B / §3): one socket, two byte-buffers, and the deadline-timer scheme.
//!
//! Grounded on `wsgi_boost::connection::Connection` in the original source, whose
//! `read_header`/`read_into_buffer`/`read_line`/`flush` are reproduced here as async
//! methods. The C++ `deadline_timer` armed before every I/O op and cancelled on
//! completion is realized as a `tokio::time::timeout` wrapped around each op: the timer
//! is "armed" for the duration of the `.await` and implicitly "cancelled" the instant
//! the future resolves, which is the same lifetime the original timer had. On expiry we
//! shut the socket down, exactly as the source's timer callback does.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub struct Connection<S> {
    stream: S,
    in_buf: BytesMut,
    out_buf: BytesMut,
    /// unread request body bytes; -1 = unknown/no body (§3 invariant iii).
    bytes_left: i64,
    content_length: i64,
    header_timeout: Duration,
    content_timeout: Duration,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline timer expired")
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        header_timeout: Duration,
        content_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            in_buf: BytesMut::with_capacity(8 * 1024),
            out_buf: BytesMut::with_capacity(8 * 1024),
            bytes_left: -1,
            content_length: -1,
            header_timeout,
            content_timeout,
            peer_addr,
            local_addr,
        }
    }

    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Read until `\r\n\r\n`, consume those bytes, return the header block (terminator
    /// included). Armed with the header-phase timeout.
    pub async fn read_header(&mut self) -> io::Result<Bytes> {
        match tokio::time::timeout(self.header_timeout, self.fill_until_header_end()).await {
            Ok(res) => res,
            Err(_) => {
                self.shutdown().await;
                Err(timed_out())
            }
        }
    }

    async fn fill_until_header_end(&mut self) -> io::Result<Bytes> {
        loop {
            if let Some(pos) = find_double_crlf(&self.in_buf) {
                return Ok(self.in_buf.split_to(pos + 4).freeze());
            }
            let n = self.stream.read_buf(&mut self.in_buf).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed before header completed"));
            }
        }
    }

    /// Initialize `bytes_left` for the request body. -1 means "no body expected".
    pub fn set_post_content_length(&mut self, cl: i64) {
        self.bytes_left = cl;
        self.content_length = cl;
    }

    pub const fn post_content_length(&self) -> i64 {
        self.content_length
    }

    pub const fn bytes_left(&self) -> i64 {
        self.bytes_left
    }

    /// Ensure the input buffer holds at least `want` additional body bytes (bounded by
    /// `bytes_left`); `want < 0` means "whatever is left". Returns `false` once the body
    /// is exhausted. The whole request body is drained before the app runs (see
    /// `app/mod.rs`'s module doc), so every call here happens before the interpreter
    /// lock is ever acquired and is always armed with the content-phase timeout.
    pub async fn read_into_buffer(&mut self, want: i64) -> io::Result<bool> {
        if self.bytes_left <= 0 {
            return Ok(false);
        }
        let residual = self.in_buf.len() as i64;
        let need = if want >= 0 {
            if want <= residual {
                return Ok(true);
            }
            self.bytes_left.min(want - residual)
        } else {
            self.bytes_left - residual
        };
        if need <= 0 {
            return Ok(true);
        }
        let need = need as usize;

        let fill = async {
            self.in_buf.reserve(need);
            let mut read_total = 0usize;
            while read_total < need {
                let n = self.stream.read_buf(&mut self.in_buf).await?;
                if n == 0 {
                    break;
                }
                read_total += n;
            }
            Ok::<_, io::Error>(read_total)
        };

        let read_total = match tokio::time::timeout(self.content_timeout, fill).await {
            Ok(res) => res?,
            Err(_) => {
                self.shutdown().await;
                return Err(timed_out());
            }
        };
        Ok(read_total > 0)
    }

    /// Read up to `length` body bytes (or all remaining bytes if `length <= 0`).
    pub async fn read_bytes(&mut self, length: i64) -> io::Result<Bytes> {
        if !self.read_into_buffer(length).await? {
            return Ok(Bytes::new());
        }
        let size = if length > 0 { length.min(self.bytes_left) } else { self.bytes_left };
        let size = size.max(0) as usize;
        let data = self.in_buf.split_to(size.min(self.in_buf.len()));
        self.bytes_left -= data.len() as i64;
        Ok(data.freeze())
    }

    /// Read one LF-terminated line from the body, growing the input buffer in 128-byte
    /// increments. The byte counter is decremented by exactly the number of body bytes
    /// consumed on each step, including the LF when one is found (§9 open question,
    /// decided): never double-counted across partial fills, never skipped.
    pub async fn read_line(&mut self) -> io::Result<Bytes> {
        let mut line = BytesMut::new();
        loop {
            if let Some(pos) = memchr(b'\n', &self.in_buf) {
                let chunk = self.in_buf.split_to(pos + 1);
                self.bytes_left -= chunk.len() as i64;
                line.extend_from_slice(&chunk);
                return Ok(line.freeze());
            }
            let avail = self.in_buf.len() as i64;
            line.extend_from_slice(&self.in_buf);
            self.in_buf.clear();
            self.bytes_left -= avail;
            if self.bytes_left <= 0 {
                return Ok(line.freeze());
            }
            let want = self.bytes_left.min(128);
            match self.read_into_buffer(want).await {
                Ok(true) => continue,
                Ok(false) | Err(_) => return Ok(line.freeze()),
            }
        }
    }

    /// Append to the output buffer without touching the socket.
    pub fn buffer_output(&mut self, data: &[u8]) {
        self.out_buf.extend_from_slice(data);
    }

    pub fn buffer_output_bytes(&mut self, data: BytesMut) {
        if self.out_buf.is_empty() {
            self.out_buf = data;
        } else {
            self.out_buf.unsplit(data);
        }
    }

    /// Write the entire output buffer, armed with the content-phase timeout. The app
    /// bridge never writes to the socket while the interpreter lock is held (§4.F's
    /// redesign note: the whole response is framed into memory first), so every flush
    /// happens after the lock has already been released.
    pub async fn flush(&mut self) -> io::Result<()> {
        if self.out_buf.is_empty() {
            return Ok(());
        }
        let write_all = async {
            while self.out_buf.has_remaining() {
                let n = self.stream.write(&self.out_buf).await?;
                if n == 0 {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write output buffer"));
                }
                self.out_buf.advance(n);
            }
            self.stream.flush().await
        };
        match tokio::time::timeout(self.content_timeout, write_all).await {
            Ok(res) => res,
            Err(_) => {
                self.shutdown().await;
                Err(timed_out())
            }
        }
    }

    /// Close both directions of the socket unconditionally. Any in-flight op observes
    /// this as an I/O error, matching the source's timer-expiry behaviour.
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::duplex;

    fn conn(stream: tokio::io::DuplexStream) -> Connection<tokio::io::DuplexStream> {
        Connection::new(
            stream,
            "127.0.0.1:1".parse().unwrap(),
            "127.0.0.1:2".parse().unwrap(),
            Duration::from_secs(5),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn read_header_consumes_up_to_double_crlf() {
        let (client, server) = duplex(1024);
        let mut c = conn(server);
        let mut client = client;
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nBODY").await.unwrap();
        let head = c.read_header().await.unwrap();
        assert_eq!(&head[..], b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[tokio::test]
    async fn read_line_counts_body_bytes_including_terminator() {
        let (mut client, server) = duplex(1024);
        let mut c = conn(server);
        c.set_post_content_length(6);
        client.write_all(b"ab\ncd").await.unwrap();
        let line = c.read_line().await.unwrap();
        assert_eq!(&line[..], b"ab\n");
        // "ab\n" is 3 bytes; bytes_left started at 6, so 3 remain.
        assert_eq!(c.bytes_left(), 3);
    }

    #[tokio::test]
    async fn read_bytes_respects_declared_length() {
        let (mut client, server) = duplex(1024);
        let mut c = conn(server);
        c.set_post_content_length(5);
        client.write_all(b"hello").await.unwrap();
        let data = c.read_bytes(5).await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert_eq!(c.bytes_left(), 0);
    }
}
