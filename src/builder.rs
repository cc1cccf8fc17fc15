//! Configuration surface (§7.2), grounded in the teacher's `Builder`: every toggle
//! named in §6 plus the ambient worker/timeout knobs. Construction is infallible;
//! `build()` can fail only on a malformed bind address (resolved, not bound — the
//! actual `bind`/`listen` syscalls happen inside [`crate::Server::start`], per §4.G's
//! "resolves and binds the endpoint" belonging to `start()` rather than construction).

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::server::{Server, ServerOptions};

pub struct Builder {
    worker_threads: usize,
    header_timeout: Duration,
    content_timeout: Duration,
    reuse_address: bool,
    backlog: i32,
    shutdown_timeout: Duration,
    host_name: String,
    url_scheme: &'static str,
    max_headers: usize,
    max_body_bytes: u64,
    use_gzip: bool,
    static_cache_control: String,
    #[cfg(feature = "tls")]
    tls: Option<crate::tls::TlsPaths>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            header_timeout: Duration::from_secs(5),
            content_timeout: Duration::from_secs(300),
            reuse_address: true,
            backlog: 2048,
            shutdown_timeout: Duration::from_secs(30),
            host_name: String::from("localhost"),
            url_scheme: "http",
            max_headers: 64,
            max_body_bytes: 10 * 1024 * 1024,
            use_gzip: true,
            static_cache_control: String::from("public, max-age=3600"),
            #[cfg(feature = "tls")]
            tls: None,
        }
    }

    /// Number of worker executors (§4.A). Defaults to the detected hardware
    /// parallelism.
    ///
    /// # Panics
    /// When passed 0.
    pub fn worker_threads(mut self, num: usize) -> Self {
        assert_ne!(num, 0, "there must be at least one worker thread");
        self.worker_threads = num;
        self
    }

    /// Header-phase timeout (§5): default 5s.
    pub fn header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Content-phase timeout (§5): default 300s.
    pub fn content_timeout(mut self, timeout: Duration) -> Self {
        self.content_timeout = timeout;
        self
    }

    /// `SO_REUSEADDR` on the listening socket. Default on.
    pub fn reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = enabled;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// How long a graceful stop waits for in-flight connections to drain before the
    /// worker threads are joined regardless (§4.A).
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Value reported as `SERVER_NAME` in the environment (§4.F).
    pub fn host_name(mut self, name: impl Into<String>) -> Self {
        self.host_name = name.into();
        self
    }

    /// Value reported as `wsgi.url_scheme` (§4.F). Typically `"http"` or `"https"`.
    pub fn url_scheme(mut self, scheme: &'static str) -> Self {
        self.url_scheme = scheme;
        self
    }

    /// Upper bound on header count per request, mirrors `httparse`'s own limit.
    pub fn max_headers(mut self, max: usize) -> Self {
        self.max_headers = max;
        self
    }

    /// Upper bound on a request body's declared `Content-Length`; larger requests are
    /// rejected with 413 before the app is invoked.
    pub fn max_body_bytes(mut self, max: u64) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Whether the static responder may gzip compressible payloads (§4.E step 6).
    pub fn use_gzip(mut self, enabled: bool) -> Self {
        self.use_gzip = enabled;
        self
    }

    /// `Cache-Control` value injected on static responses; empty string omits the
    /// header entirely.
    pub fn static_cache_control(mut self, value: impl Into<String>) -> Self {
        self.static_cache_control = value.into();
        self
    }

    /// Enable TLS (§4.H): every accepted connection performs a rustls handshake before
    /// entering request parsing. `key_password` is the configurable password source
    /// named in §6 — consumed at bind time against the key file, but only to produce a
    /// clear error if the key turns out to be encrypted; decrypting a password-protected
    /// private key is certificate-loading glue, which this crate's Non-goals place out
    /// of scope, so `key_path` must name an unencrypted PEM key regardless.
    #[cfg(feature = "tls")]
    pub fn tls(mut self, cert_path: impl Into<std::path::PathBuf>, key_path: impl Into<std::path::PathBuf>, key_password: Option<String>) -> Self {
        self.tls = Some(crate::tls::TlsPaths {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            key_password,
        });
        self
    }

    /// Resolve `addr` and build a [`Server`] bound to it. The endpoint is not actually
    /// bound until [`Server::start`] is called; resolution happens here so a malformed
    /// address fails fast at construction time.
    pub fn build<A: ToSocketAddrs>(self, addr: A) -> io::Result<Server> {
        let bind_addr: SocketAddr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "could not resolve a socket address"))?;

        Ok(Server::new(ServerOptions {
            bind_addr,
            worker_threads: self.worker_threads,
            header_timeout: self.header_timeout,
            content_timeout: self.content_timeout,
            reuse_address: self.reuse_address,
            backlog: self.backlog,
            shutdown_timeout: self.shutdown_timeout,
            host_name: self.host_name,
            url_scheme: self.url_scheme,
            max_headers: self.max_headers,
            max_body_bytes: self.max_body_bytes,
            use_gzip: self.use_gzip,
            static_cache_control: self.static_cache_control,
            #[cfg(feature = "tls")]
            tls: self.tls,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_resolves_bind_addr() {
        let server = Builder::new().worker_threads(2).build("127.0.0.1:0").unwrap();
        assert!(!server.is_running());
    }

    #[test]
    #[should_panic(expected = "at least one worker thread")]
    fn zero_worker_threads_panics() {
        Builder::new().worker_threads(0);
    }
}
