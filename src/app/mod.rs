//! App bridge (§4.F): environment construction, `start_response`/`write` callables, and
//! the iteration loop that frames the app's byte-chunk iterable onto the wire.
//!
//! **Deliberate redesign vs. the original source.** The C++ implementation streams
//! `wsgi.input` lazily straight off the socket while the app runs, because the app runs
//! synchronously *inside* the same call that holds the interpreter lock and the Boost.Asio
//! coroutine. Rust has no equivalent of "call into a foreign interpreter that itself
//! recursively calls back into blocking socket reads" without either an async trait
//! (which no longer models "the app runs synchronously under the lock") or driving a
//! nested async I/O future from inside synchronous app code on the same OS thread (a
//! real deadlock hazard on a single-threaded executor, since nothing would be left to
//! poll the socket's readiness). Section 4.F already carves out one case of eager body
//! pre-buffering (the 100-continue path); this crate generalizes it: the full declared
//! request body is drained asynchronously *before* the app is invoked, and `wsgi.input`
//! is a synchronous in-memory cursor over that buffer. `WsgiApp::call` is therefore a
//! plain synchronous function, exactly mirroring the original's blocking call into the
//! hosted interpreter, with no async anywhere inside app code.

pub mod environ;
pub mod errors;
pub mod file_wrapper;
pub mod input;

pub use environ::Environ;
pub use errors::ErrorStream;
pub use file_wrapper::FileWrapper;
pub use input::InputStream;

use bytes::{Bytes, BytesMut};
use http::StatusCode;

use crate::error::{Error, Result};
use crate::lock::InterpreterLock;
use crate::proto::{Response, TransferCoding};

/// A hosted application. `call` must invoke `start_response` exactly once with its
/// final status/headers before returning (§4.F dispatch contract); the returned
/// iterator yields body chunks, or an error once header framing has already committed
/// (every error from this point on is necessarily post-header).
pub trait WsgiApp: Send + Sync {
    fn call(
        &self,
        environ: Environ,
        start_response: &mut StartResponse,
    ) -> std::result::Result<Box<dyn Iterator<Item = std::result::Result<Bytes, String>> + Send>, String>;
}

/// Captures the app's `start_response(status, headers, exc_info=None)` call.
#[derive(Default)]
pub struct StartResponse {
    pub status: Option<StatusCode>,
    pub headers: Vec<(String, String)>,
    headers_sent: bool,
}

impl StartResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// If `exc_info` is provided and headers were already sent, this must be treated as
    /// re-raising the original exception rather than silently accepting the rewrite
    /// (§4.F): callers check `headers_sent()` for exactly this reason before this call,
    /// so by the time we get here with `exc_info.is_some()` it can only mean the app
    /// tried to recover after the point of no return.
    pub fn start(&mut self, status: StatusCode, headers: Vec<(String, String)>, exc_info: Option<&str>) -> Result<()> {
        if exc_info.is_some() && self.headers_sent {
            return Err(Error::AppPostHeader(exc_info.unwrap().to_owned()));
        }
        self.status = Some(status);
        self.headers = headers;
        Ok(())
    }

    pub fn mark_sent(&mut self) {
        self.headers_sent = true;
    }

    pub const fn headers_sent(&self) -> bool {
        self.headers_sent
    }
}

/// Drive the app to completion: invoke it, commit its status/headers to `resp`, write
/// the response head, then frame every yielded chunk. `HEAD` requests run the app (so
/// `start_response` still executes and headers are still correct) but the body is
/// discarded, matching the static responder's head-request handling.
///
/// The interpreter lock is acquired fresh for `call` and for every `iter.next()` call
/// and dropped immediately after each one returns (§5 rule: release the lock between
/// chunks, not once for the whole iteration) — only the `Iterator::next()` call itself,
/// which may re-enter the hosted app, runs under the token; encoding the returned bytes
/// onto `buf` does not.
pub async fn run_app(
    app: &dyn WsgiApp,
    environ: Environ,
    head_request: bool,
    resp: &mut Response,
    buf: &mut BytesMut,
    date: &[u8],
    lock: &InterpreterLock,
) -> Result<()> {
    let mut start_response = StartResponse::new();
    let mut iter = {
        let token = lock.acquire().await;
        token.held();
        app.call(environ, &mut start_response).map_err(Error::AppSynchronous)?
    };

    resp.status = start_response.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let declared_length = start_response
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.parse::<u64>().ok());
    resp.headers = start_response
        .headers
        .into_iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("Content-Length"))
        .collect();
    match declared_length {
        Some(len) => resp.set_content_length(len),
        None => resp.content_length = -1,
    }

    let mut encoding: TransferCoding = resp.write_head(buf, date);
    start_response.mark_sent();

    if !head_request {
        loop {
            let chunk = {
                let token = lock.acquire().await;
                token.held();
                iter.next()
            };
            match chunk {
                None => break,
                Some(Ok(bytes)) => encoding.encode(bytes, buf),
                Some(Err(message)) => return Err(Error::AppPostHeader(message)),
            }
        }
    }
    encoding.encode_eof(buf);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::proto::{Request, Version};

    struct EchoApp;

    impl WsgiApp for EchoApp {
        fn call(
            &self,
            environ: Environ,
            start_response: &mut StartResponse,
        ) -> std::result::Result<Box<dyn Iterator<Item = std::result::Result<Bytes, String>> + Send>, String> {
            start_response
                .start(StatusCode::OK, vec![("Content-Type".into(), "text/plain".into())], None)
                .map_err(|e| e.to_string())?;
            let body = environ.path_info.into_bytes();
            Ok(Box::new(std::iter::once(Ok(Bytes::from(body)))))
        }
    }

    #[tokio::test]
    async fn run_app_writes_head_and_body() {
        let req = Request::parse(b"GET /hi HTTP/1.1\r\n\r\n", 16).unwrap();
        let peer = "127.0.0.1:1".parse().unwrap();
        let local = "127.0.0.1:2".parse().unwrap();
        let environ = Environ::build(&req, peer, local, "x", "http", true, Bytes::new());
        let mut resp = Response::new(Version::Http11);
        let mut buf = BytesMut::new();
        let lock = InterpreterLock::new();
        run_app(&EchoApp, environ, false, &mut resp, &mut buf, b"Mon, 01 Jan 2024 00:00:00 GMT", &lock)
            .await
            .unwrap();
        let text = String::from_utf8(buf.to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("/hi"));
    }

    #[tokio::test]
    async fn head_request_skips_body() {
        let req = Request::parse(b"HEAD /hi HTTP/1.1\r\n\r\n", 16).unwrap();
        let peer = "127.0.0.1:1".parse().unwrap();
        let local = "127.0.0.1:2".parse().unwrap();
        let environ = Environ::build(&req, peer, local, "x", "http", true, Bytes::new());
        let mut resp = Response::new(Version::Http11);
        let mut buf = BytesMut::new();
        let lock = InterpreterLock::new();
        run_app(&EchoApp, environ, true, &mut resp, &mut buf, b"Mon, 01 Jan 2024 00:00:00 GMT", &lock)
            .await
            .unwrap();
        let text = String::from_utf8(buf.to_vec()).unwrap();
        assert!(!text.ends_with("/hi"));
    }
}
