//! Response emitter (§4.D): status line + injected headers + caller headers, then
//! identity or chunked body framing.

use bytes::{Bytes, BytesMut};
use http::StatusCode;

use super::chunked::TransferCoding;
use super::request::Version;

const SERVER_HEADER: &str = "wsgi-boost";

pub struct Response {
    pub version: Version,
    pub status: StatusCode,
    /// caller-provided headers, emitted verbatim in order (no dedup: a WSGI app may
    /// legitimately emit multiple `Set-Cookie` lines).
    pub headers: Vec<(String, String)>,
    pub keep_alive: bool,
    header_sent: bool,
    /// -1 = unknown/chunked (§9 sentinel discipline).
    pub content_length: i64,
}

impl Response {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            status: StatusCode::OK,
            headers: Vec::new(),
            keep_alive: matches!(version, Version::Http11),
            header_sent: false,
            content_length: -1,
        }
    }

    pub const fn header_sent(&self) -> bool {
        self.header_sent
    }

    /// Reset for reuse across a keep-alive cycle (Connection invariant iv: the output
    /// buffer, and this cursor, must be clean before the next request begins).
    pub fn reset(&mut self, version: Version) {
        self.version = version;
        self.status = StatusCode::OK;
        self.headers.clear();
        self.keep_alive = matches!(version, Version::Http11);
        self.header_sent = false;
        self.content_length = -1;
    }

    /// Set the `Content-Length` the app (or static responder) declared, switching off
    /// chunked framing.
    pub fn set_content_length(&mut self, len: u64) {
        self.content_length = len as i64;
    }

    /// Write the status line + injected headers + caller headers into `buf`, flip
    /// `header_sent`, and return the body encoder this response commits to.
    ///
    /// Must only be called once; callers check `header_sent()` first (data model
    /// invariant i: "once header_sent is true, no further header mutations are
    /// allowed").
    pub fn write_head(&mut self, buf: &mut BytesMut, date: &[u8]) -> TransferCoding {
        debug_assert!(!self.header_sent, "write_head called twice");

        buf.extend_from_slice(self.version.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.status.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.status.canonical_reason().unwrap_or("").as_bytes());
        buf.extend_from_slice(b"\r\n");

        write_header_line(buf, "Server", SERVER_HEADER);
        buf.extend_from_slice(b"Date: ");
        buf.extend_from_slice(date);
        buf.extend_from_slice(b"\r\n");
        write_header_line(buf, "Connection", if self.keep_alive { "keep-alive" } else { "close" });

        let encoding = if self.content_length >= 0 {
            write_header_line(buf, "Content-Length", &self.content_length.to_string());
            TransferCoding::length(self.content_length as u64)
        } else {
            write_header_line(buf, "Transfer-Encoding", "chunked");
            TransferCoding::encode_chunked()
        };

        for (name, value) in &self.headers {
            write_header_line(buf, name, value);
        }

        buf.extend_from_slice(b"\r\n");
        self.header_sent = true;
        encoding
    }

    /// `send_message(status, text)`: a `text/plain` body error shortcut (§4.D).
    pub fn send_message(&mut self, buf: &mut BytesMut, date: &[u8], status: StatusCode, text: &str) {
        self.status = status;
        self.headers = vec![("Content-Type".into(), "text/plain; charset=utf-8".into())];
        self.set_content_length(text.len() as u64);
        let mut encoding = self.write_head(buf, date);
        encoding.encode(Bytes::copy_from_slice(text.as_bytes()), buf);
        encoding.encode_eof(buf);
    }

    /// `send_html(status, title, h1, body)`: a small HTML template error shortcut (§4.D).
    pub fn send_html(&mut self, buf: &mut BytesMut, date: &[u8], status: StatusCode, title: &str, h1: &str, body: &str) {
        let html = format!(
            "<!DOCTYPE html><html><head><title>{title}</title></head><body><h1>{h1}</h1><p>{body}</p></body></html>"
        );
        self.status = status;
        self.headers = vec![("Content-Type".into(), "text/html; charset=utf-8".into())];
        self.set_content_length(html.len() as u64);
        let mut encoding = self.write_head(buf, date);
        encoding.encode(Bytes::from(html.into_bytes()), buf);
        encoding.encode_eof(buf);
    }
}

fn write_header_line(buf: &mut BytesMut, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_body_framing() {
        let mut resp = Response::new(Version::Http11);
        resp.set_content_length(5);
        let mut buf = BytesMut::new();
        let mut enc = resp.write_head(&mut buf, b"Mon, 01 Jan 2024 00:00:00 GMT");
        enc.encode(Bytes::from_static(b"hello"), &mut buf);
        enc.encode_eof(&mut buf);
        let text = String::from_utf8(buf.to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("hello"));
        assert!(resp.header_sent());
    }

    #[test]
    fn chunked_body_framing_skips_empty_chunks() {
        let mut resp = Response::new(Version::Http11);
        let mut buf = BytesMut::new();
        let mut enc = resp.write_head(&mut buf, b"Mon, 01 Jan 2024 00:00:00 GMT");
        enc.encode(Bytes::from_static(b"aaa"), &mut buf);
        enc.encode(Bytes::from_static(b""), &mut buf);
        enc.encode(Bytes::from_static(b"bbbb"), &mut buf);
        enc.encode_eof(&mut buf);
        let text = String::from_utf8(buf.to_vec()).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(text.ends_with("3\r\naaa\r\n4\r\nbbbb\r\n0\r\n\r\n"));
    }

    #[test]
    fn send_message_sets_plain_text_and_length() {
        let mut resp = Response::new(Version::Http11);
        let mut buf = BytesMut::new();
        resp.send_message(&mut buf, b"Mon, 01 Jan 2024 00:00:00 GMT", StatusCode::NOT_FOUND, "nope");
        let text = String::from_utf8(buf.to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("nope"));
    }
}
