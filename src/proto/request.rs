//! Request parser (§4.C): request line + headers out of a `\r\n\r\n`-terminated block,
//! plus the body-length and persistence policies.

use http::Method;

use crate::error::Parse;

use super::header::Headers;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }
}

pub struct Request {
    pub method: Method,
    /// raw request-target as sent on the wire, e.g. `/a/b?c=d`.
    pub target: String,
    pub path: String,
    /// query string with no leading `?`; empty if absent.
    pub query: String,
    pub version: Version,
    pub headers: Headers,
    pub keep_alive: bool,
    /// -1 = no body expected (§9 sentinel discipline mirrored on the request side).
    pub content_length: i64,
}

impl Request {
    /// Parse a complete header block (as produced by `Connection::read_header`).
    ///
    /// `max_headers` bounds the header count the same way `httparse` bounds it; a
    /// request line with anything but exactly three whitespace-separated tokens, or a
    /// malformed `HTTP/1.x` token, is a 400.
    pub fn parse(buf: &[u8], max_headers: usize) -> Result<Self, Parse> {
        let mut raw_headers = vec![httparse::EMPTY_HEADER; max_headers];
        let mut raw = httparse::Request::new(&mut raw_headers);

        let status = raw.parse(buf).map_err(|_| Parse::RequestLine)?;
        if status.is_partial() {
            return Err(Parse::HeaderTooLarge);
        }

        let method_str = raw.method.ok_or(Parse::RequestLine)?;
        let method = Method::from_bytes(method_str.as_bytes()).map_err(|_| Parse::RequestLine)?;

        let target = raw.path.ok_or(Parse::RequestLine)?.to_owned();
        let (path, query) = split_target(&target);

        let version = match raw.version.ok_or(Parse::RequestLine)? {
            1 => Version::Http11,
            0 => Version::Http10,
            _ => return Err(Parse::RequestLine),
        };

        let mut headers = Headers::new();
        for h in raw.headers.iter() {
            let value = std::str::from_utf8(h.value).map_err(|_| Parse::HeaderValue)?;
            headers.insert_joined(h.name, value.trim());
        }

        let keep_alive = match version {
            Version::Http11 => !headers.has_token("Connection", "close"),
            Version::Http10 => headers.has_token("Connection", "keep-alive"),
        };

        let content_length = body_length(&method, &headers)?;

        Ok(Self {
            method,
            target,
            path,
            query,
            version,
            headers,
            keep_alive,
            content_length,
        })
    }

    /// `Expect: 100-continue` is only honoured when the declared body is non-empty
    /// (open question, §9: decided against firing the handshake for an empty body).
    pub fn expects_continue(&self) -> bool {
        self.content_length > 0 && self.headers.has_token("Expect", "100-continue")
    }
}

/// Request line target split at the first `?`, mirroring `PATH_INFO`/`QUERY_STRING` (§4.F).
fn split_target(target: &str) -> (String, String) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), query.to_owned()),
        None => (target.to_owned(), String::new()),
    }
}

/// Body-length policy (§4.C step 3): body-bearing methods require a valid
/// `Content-Length`; everything else has no body.
fn body_length(method: &Method, headers: &Headers) -> Result<i64, Parse> {
    let requires_body = matches!(method.as_str(), "POST" | "PUT" | "PATCH");
    match headers.get("Content-Length") {
        Some(v) => v.trim().parse::<i64>().ok().filter(|n| *n >= 0).ok_or(Parse::MissingContentLength),
        None if requires_body => Err(Parse::MissingContentLength),
        None => Ok(-1),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(buf: &[u8]) -> Request {
        Request::parse(buf, 32).unwrap()
    }

    #[test]
    fn parses_request_line_and_splits_query() {
        let req = parse(b"GET /a/b?c=d HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.path, "/a/b");
        assert_eq!(req.query, "c=d");
        assert_eq!(req.version, Version::Http11);
        assert!(req.keep_alive);
        assert_eq!(req.content_length, -1);
    }

    #[test]
    fn http10_defaults_to_close() {
        let req = parse(b"GET / HTTP/1.0\r\n\r\n");
        assert!(!req.keep_alive);
        let req = parse(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
        assert!(req.keep_alive);
    }

    #[test]
    fn post_without_content_length_is_length_required() {
        let err = Request::parse(b"POST / HTTP/1.1\r\n\r\n", 32).unwrap_err();
        assert!(matches!(err, Parse::MissingContentLength));
    }

    #[test]
    fn duplicate_headers_are_joined() {
        let req = parse(b"GET / HTTP/1.1\r\nX-A: 1\r\nX-A: 2\r\n\r\n");
        assert_eq!(req.headers.get("x-a"), Some("1, 2"));
    }

    #[test]
    fn zero_length_body_does_not_expect_continue() {
        let req = parse(b"POST / HTTP/1.1\r\nContent-Length: 0\r\nExpect: 100-continue\r\n\r\n");
        assert!(!req.expects_continue());
    }

    #[test]
    fn nonzero_length_body_expects_continue() {
        let req = parse(b"POST / HTTP/1.1\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n");
        assert!(req.expects_continue());
    }
}
