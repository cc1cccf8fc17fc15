//! Server façade (§4.G): bind/listen, signal handling, route table, app registration,
//! and the start/stop lifecycle. One `Server` can be started, stopped, and started
//! again — each `start()` call rebuilds the reactor pool from scratch.

mod handle;

pub use handle::ServerHandle;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::WsgiApp;
use crate::lock::InterpreterLock;
use crate::net;
use crate::pipeline::PipelineConfig;
use crate::route::RouteTable;
use crate::signals::{Signal, Signals};
use crate::worker;

/// Runtime configuration resolved from [`crate::Builder`] (§7.2). Immutable for the
/// life of the `Server`; only the route table and the registered app can change
/// between `start()`/`stop()` cycles.
pub(crate) struct ServerOptions {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) worker_threads: usize,
    pub(crate) header_timeout: Duration,
    pub(crate) content_timeout: Duration,
    pub(crate) reuse_address: bool,
    pub(crate) backlog: i32,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) host_name: String,
    pub(crate) url_scheme: &'static str,
    pub(crate) max_headers: usize,
    pub(crate) max_body_bytes: u64,
    pub(crate) use_gzip: bool,
    pub(crate) static_cache_control: String,
    #[cfg(feature = "tls")]
    pub(crate) tls: Option<crate::tls::TlsPaths>,
}

pub struct Server {
    opts: ServerOptions,
    routes: Mutex<RouteTable>,
    app: Mutex<Option<Arc<dyn WsgiApp>>>,
    running: Arc<AtomicBool>,
    is_graceful: Arc<AtomicBool>,
    stop_tx: UnboundedSender<bool>,
    stop_rx: Mutex<Option<UnboundedReceiver<bool>>>,
    bound_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    pub(crate) fn new(opts: ServerOptions) -> Self {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        Self {
            opts,
            routes: Mutex::new(RouteTable::new()),
            app: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            is_graceful: Arc::new(AtomicBool::new(true)),
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
            bound_addr: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Compile `prefix` as a case-insensitive regex and register a static route
    /// (§3/§4.E). Rejected while the server is running, same restriction as `set_app`.
    pub fn add_static_route(&self, prefix: &str, content_root: impl Into<PathBuf>) -> Result<(), regex::Error> {
        if self.is_running() {
            warn!("add_static_route called while running; ignored");
            return Ok(());
        }
        self.routes.lock().unwrap().add(prefix, content_root)
    }

    /// Register the hosted application (§4.F). Rejected while the server is running.
    pub fn set_app(&self, app: Arc<dyn WsgiApp>) {
        if self.is_running() {
            warn!("set_app called while running; ignored");
            return;
        }
        *self.app.lock().unwrap() = Some(app);
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            stop_tx: self.stop_tx.clone(),
            running: self.running.clone(),
        }
    }

    /// The address actually bound by the most recent `start()` call. Useful when the
    /// configured port is `0` and the kernel assigns an ephemeral one. `None` before the
    /// first successful bind.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock().unwrap()
    }

    /// Request shutdown from outside the thread blocked in `start()` — equivalent to
    /// sending a signal. See [`ServerHandle::stop`] for the `graceful` meaning.
    pub fn stop(&self, graceful: bool) {
        let _ = self.stop_tx.send(graceful);
    }

    /// Bind, spawn the reactor pool, install signal handlers, and block the calling
    /// thread until `stop()`/[`ServerHandle::stop`] is called or INT/TERM/QUIT arrives
    /// (§6). Idempotent: a second call while already running is a no-op with a warning
    /// (§4.G).
    pub fn start(&self) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("start() called while already running; ignored");
            return Ok(());
        }

        let listener = net::bind(self.opts.bind_addr, self.opts.reuse_address, self.opts.backlog)?;
        *self.bound_addr.lock().unwrap() = listener.local_addr().ok();

        let routes = Arc::new(self.routes.lock().unwrap().clone());
        let app = self.app.lock().unwrap().clone();
        let lock = InterpreterLock::new();

        #[cfg(feature = "tls")]
        let tls = match &self.opts.tls {
            Some(paths) => {
                let server_config =
                    crate::tls::load_server_config(&paths.cert_path, &paths.key_path, paths.key_password.as_deref())?;
                worker::WorkerTls::Rustls(Arc::new(tokio_rustls::TlsAcceptor::from(server_config)))
            }
            None => worker::WorkerTls::Plain,
        };
        #[cfg(not(feature = "tls"))]
        let tls = worker::WorkerTls::Plain;

        let config = Arc::new(PipelineConfig {
            max_headers: self.opts.max_headers,
            host_name: self.opts.host_name.clone(),
            url_scheme: self.opts.url_scheme,
            multithread: self.opts.worker_threads > 1,
            max_body_bytes: self.opts.max_body_bytes,
            use_gzip: self.opts.use_gzip,
            static_cache_control: self.opts.static_cache_control.clone(),
        });

        self.is_graceful.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let worker::WorkerHandles { senders, join_handles } = worker::spawn_workers(
            self.opts.worker_threads,
            routes,
            app,
            lock,
            config,
            tls,
            self.opts.header_timeout,
            self.opts.content_timeout,
            self.opts.shutdown_timeout,
            self.is_graceful.clone(),
            cancel.clone(),
        );

        let acceptor_handle = worker::spawn_acceptor(listener, senders, cancel.clone());

        info!("server started on {}", self.opts.bind_addr);

        let mut stop_rx = self
            .stop_rx
            .lock()
            .unwrap()
            .take()
            .expect("start() re-entered before a prior stop() cycle completed");

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        rt.block_on(async {
            let mut signals = Signals::start();
            tokio::select! {
                sig = &mut signals => {
                    info!(signal = ?sig, "signal received");
                    self.is_graceful.store(matches!(sig, Signal::Term), Ordering::SeqCst);
                }
                graceful = stop_rx.recv() => {
                    if let Some(graceful) = graceful {
                        self.is_graceful.store(graceful, Ordering::SeqCst);
                    }
                }
            }
        });

        cancel.cancel();
        acceptor_handle.join().expect("acceptor thread panicked");
        for handle in join_handles {
            handle.join().expect("worker thread panicked");
        }

        *self.stop_rx.lock().unwrap() = Some(stop_rx);
        self.running.store(false, Ordering::SeqCst);
        info!("server stopped");
        Ok(())
    }
}
