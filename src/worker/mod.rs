//! Reactor pool (§4.A): one acceptor thread with its own short-lived current-thread
//! runtime hands accepted sockets off round-robin to `N` worker threads, each running
//! its own current-thread runtime plus a `LocalSet`. A Connection never leaves the
//! worker thread it lands on, which is the only synchronization the pipeline relies on
//! for its `!Send` state (the interpreter-lock token, the per-worker date cache).

mod counter;
mod shutdown;

pub(crate) use counter::Counter;

use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::WsgiApp;
use crate::date::DateService;
use crate::lock::InterpreterLock;
use crate::pipeline::{self, PipelineConfig};
use crate::route::RouteTable;

pub(crate) struct WorkerHandles {
    pub(crate) senders: Vec<UnboundedSender<std::net::TcpStream>>,
    pub(crate) join_handles: Vec<thread::JoinHandle<()>>,
}

/// How a worker should turn a freshly-adopted `TcpStream` into the stream `pipeline::serve`
/// drives. One value is built once in `Server::start` and shared (cloned, `Arc`-cheap) by
/// every worker thread.
#[derive(Clone)]
pub(crate) enum WorkerTls {
    Plain,
    #[cfg(feature = "tls")]
    Rustls(Arc<tokio_rustls::TlsAcceptor>),
}

/// Spawn `worker_threads` OS threads, each owning one executor. Returns the per-worker
/// handoff senders (for the acceptor to round-robin over) and the thread join handles
/// (for the server façade to wait on after cancellation).
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_workers(
    worker_threads: usize,
    routes: Arc<RouteTable>,
    app: Option<Arc<dyn WsgiApp>>,
    lock: InterpreterLock,
    config: Arc<PipelineConfig>,
    tls: WorkerTls,
    header_timeout: Duration,
    content_timeout: Duration,
    shutdown_timeout: Duration,
    is_graceful: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> WorkerHandles {
    let mut senders = Vec::with_capacity(worker_threads);
    let mut join_handles = Vec::with_capacity(worker_threads);

    for idx in 0..worker_threads {
        let (tx, mut rx) = unbounded_channel::<std::net::TcpStream>();
        senders.push(tx);

        let routes = routes.clone();
        let app = app.clone();
        let lock = lock.clone();
        let config = config.clone();
        let tls = tls.clone();
        let cancel = cancel.clone();
        let is_graceful = is_graceful.clone();

        let handle = thread::Builder::new()
            .name(format!("wsgi-boost-worker-{idx}"))
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build worker runtime");
                let local = tokio::task::LocalSet::new();

                local.block_on(&rt, async move {
                    let dates = Rc::new(DateService::new());
                    let counter = Counter::new();

                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            stream = rx.recv() => {
                                let Some(std_stream) = stream else { break };
                                match adopt(std_stream) {
                                    Some((tokio_stream, peer_addr, local_addr)) => {
                                        let guard = counter.guard();
                                        let routes = routes.clone();
                                        let app = app.clone();
                                        let lock = lock.clone();
                                        let dates = dates.clone();
                                        let config = config.clone();
                                        let tls = tls.clone();
                                        tokio::task::spawn_local(async move {
                                            match tls {
                                                WorkerTls::Plain => {
                                                    pipeline::serve(
                                                        tokio_stream, peer_addr, local_addr, routes, app, lock,
                                                        dates, config, header_timeout, content_timeout,
                                                    )
                                                    .await;
                                                }
                                                #[cfg(feature = "tls")]
                                                WorkerTls::Rustls(acceptor) => {
                                                    match crate::tls::accept(&acceptor, tokio_stream, header_timeout).await {
                                                        Ok(tls_stream) => {
                                                            pipeline::serve(
                                                                tls_stream, peer_addr, local_addr, routes, app, lock,
                                                                dates, config, header_timeout, content_timeout,
                                                            )
                                                            .await;
                                                        }
                                                        Err(e) => debug!(error = %e, "TLS handshake failed"),
                                                    }
                                                }
                                            }
                                            drop(guard);
                                        });
                                    }
                                    None => continue,
                                }
                            }
                        }
                    }

                    shutdown::wait_for_drain(&counter, shutdown_timeout, &is_graceful).await;
                    info!("worker {idx} stopped");
                });
            })
            .expect("failed to spawn worker thread");

        join_handles.push(handle);
    }

    WorkerHandles { senders, join_handles }
}

fn adopt(stream: std::net::TcpStream) -> Option<(tokio::net::TcpStream, std::net::SocketAddr, std::net::SocketAddr)> {
    let peer_addr = stream.peer_addr().ok()?;
    let local_addr = stream.local_addr().ok()?;
    let _ = stream.set_nodelay(true);
    let tokio_stream = tokio::net::TcpStream::from_std(stream).ok()?;
    Some((tokio_stream, peer_addr, local_addr))
}

/// Bind the listener into the acceptor's own runtime and hand accepted sockets off to
/// the worker pool round-robin. Converting back to `std::net::TcpListener` per accept
/// is how a socket crosses the thread boundary into a worker's own reactor (a
/// `tokio::net::TcpStream` is tied to the runtime that registered it).
pub(crate) fn spawn_acceptor(
    listener: std::net::TcpListener,
    senders: Vec<UnboundedSender<std::net::TcpStream>>,
    cancel: CancellationToken,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("wsgi-boost-acceptor".into())
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build acceptor runtime");

            rt.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(e) => {
                        error!("failed to adopt listener into acceptor runtime: {e}");
                        return;
                    }
                };

                let mut next = 0usize;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        accepted = listener.accept() => {
                            match accepted {
                                Ok((stream, _peer)) => {
                                    if let Ok(std_stream) = stream.into_std() {
                                        let idx = next % senders.len();
                                        next = next.wrapping_add(1);
                                        let _ = senders[idx].send(std_stream);
                                    }
                                }
                                Err(e) if connection_error(&e) => continue,
                                Err(e) => {
                                    error!("accept error: {e}");
                                    tokio::time::sleep(Duration::from_millis(500)).await;
                                }
                            }
                        }
                    }
                }
            });
        })
        .expect("failed to spawn acceptor thread")
}

/// Per-connection errors: the next `accept()` likely succeeds immediately, no backoff
/// needed. Mirrors the teacher's `connection_error` classifier.
fn connection_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(e.kind(), ConnectionRefused | ConnectionAborted | ConnectionReset)
}
