//! Environment construction (§4.F step 1): copies request metadata into a mapping
//! passed to the app. A Rust struct stands in for the original's dynamically-typed
//! dict — every key PEP-3333 mandates has a named, typed field instead of a
//! `HashMap<String, PyObject>` lookup, which is the idiomatic shape for a fixed,
//! well-known key set.

use std::net::SocketAddr;

use super::input::InputStream;
use crate::proto::Request;

pub struct Environ {
    pub request_method: String,
    pub script_name: &'static str,
    pub path_info: String,
    pub query_string: String,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub server_name: String,
    pub server_port: u16,
    pub server_protocol: &'static str,
    pub remote_addr: String,
    pub remote_host: String,
    pub remote_port: u16,
    /// `HTTP_<NAME>` entries, `Content-Type`/`Content-Length` excluded (step requires
    /// skipping them since they're surfaced as `CONTENT_TYPE`/`CONTENT_LENGTH` instead).
    pub http_headers: Vec<(String, String)>,
    pub wsgi_version: (u8, u8),
    pub wsgi_url_scheme: &'static str,
    pub wsgi_multithread: bool,
    pub wsgi_multiprocess: bool,
    pub wsgi_run_once: bool,
    pub wsgi_input: InputStream,
}

impl Environ {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        req: &Request,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        host_name: &str,
        url_scheme: &'static str,
        multithread: bool,
        body: bytes::Bytes,
    ) -> Self {
        let mut http_headers = Vec::with_capacity(req.headers.len());
        for (name, value) in req.headers.iter() {
            if name.eq_ignore_ascii_case("Content-Type") || name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            http_headers.push((format!("HTTP_{}", transform_header_name(name)), value.to_owned()));
        }

        Self {
            request_method: req.method.as_str().to_owned(),
            script_name: "",
            path_info: req.path.clone(),
            query_string: req.query.clone(),
            content_type: req.headers.get("Content-Type").map(str::to_owned),
            content_length: (req.content_length >= 0).then(|| req.content_length.to_string()),
            server_name: host_name.to_owned(),
            server_port: local_addr.port(),
            server_protocol: req.version.as_str(),
            remote_addr: peer_addr.ip().to_string(),
            remote_host: peer_addr.ip().to_string(),
            remote_port: peer_addr.port(),
            http_headers,
            wsgi_version: (1, 0),
            wsgi_url_scheme: url_scheme,
            wsgi_multithread: multithread,
            wsgi_multiprocess: false,
            wsgi_run_once: false,
            wsgi_input: InputStream::new(body),
        }
    }
}

/// `X-My-Header` -> `X_MY_HEADER`, the `HTTP_` prefix is applied by the caller.
fn transform_header_name(name: &str) -> String {
    name.chars().map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() }).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::proto::Request;

    #[test]
    fn builds_environ_from_request() {
        let req = Request::parse(b"GET /a?b=c HTTP/1.1\r\nHost: x\r\nX-Trace-Id: 42\r\nContent-Type: text/plain\r\n\r\n", 32).unwrap();
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        let local: SocketAddr = "10.0.0.2:8080".parse().unwrap();
        let env = Environ::build(&req, peer, local, "example.com", "http", true, bytes::Bytes::new());
        assert_eq!(env.request_method, "GET");
        assert_eq!(env.path_info, "/a");
        assert_eq!(env.query_string, "b=c");
        assert_eq!(env.content_type.as_deref(), Some("text/plain"));
        assert!(env.http_headers.iter().any(|(k, v)| k == "HTTP_X_TRACE_ID" && v == "42"));
        assert!(!env.http_headers.iter().any(|(k, _)| k.starts_with("HTTP_CONTENT")));
        assert_eq!(env.remote_port, 5555);
        assert_eq!(env.server_port, 8080);
    }
}
