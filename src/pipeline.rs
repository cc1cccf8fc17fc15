//! Per-connection state machine (§9 design note): `AwaitHeader -> ParseHeader ->
//! {Dispatch: Static | App} -> EmitBody -> (keep-alive? AwaitHeader : Close)`.
//!
//! This is the orchestration layer that ties Connection (§4.B), the request parser and
//! response emitter (§4.C/D), the route table (§3), the static responder (§4.E) and the
//! app bridge (§4.F) together into the loop described in §2's control-flow paragraph.

use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info_span, warn, Instrument};

use crate::app::{self, Environ};
use crate::connection::Connection;
use crate::date::{DateService, DATE_VALUE_LENGTH};
use crate::error::Error;
use crate::lock::InterpreterLock;
use crate::proto::{Request, Response, Version};
use crate::route::{Dispatch, RouteTable};
use crate::static_file::{self, StaticResponder};

pub struct PipelineConfig {
    pub max_headers: usize,
    pub host_name: String,
    pub url_scheme: &'static str,
    pub multithread: bool,
    pub max_body_bytes: u64,
    pub use_gzip: bool,
    pub static_cache_control: String,
}

/// Serve one accepted connection to completion: repeat the state machine across
/// keep-alive reuse until the client closes, a fatal error occurs, or keep-alive is
/// declined.
pub async fn serve<S>(
    stream: S,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    routes: Arc<RouteTable>,
    app: Option<Arc<dyn app::WsgiApp>>,
    lock: InterpreterLock,
    dates: Rc<DateService>,
    config: Arc<PipelineConfig>,
    header_timeout: Duration,
    content_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let span = info_span!("connection", peer = %peer_addr);
    async move {
        let mut conn = Connection::new(stream, peer_addr, local_addr, header_timeout, content_timeout);
        loop {
            match serve_one(&mut conn, &routes, app.as_deref(), &lock, &dates, &config).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    debug!(error = %e, "connection terminated");
                    break;
                }
            }
        }
        conn.shutdown().await;
    }
    .instrument(span)
    .await;
}

/// Serve a single request/response cycle. Returns `Ok(true)` to loop back to
/// `AwaitHeader` (keep-alive reuse), `Ok(false)` to close, `Err` on a transport failure
/// that makes further use of the connection meaningless.
async fn serve_one<S>(
    conn: &mut Connection<S>,
    routes: &RouteTable,
    app: Option<&dyn app::WsgiApp>,
    lock: &InterpreterLock,
    dates: &DateService,
    config: &PipelineConfig,
) -> crate::error::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // AwaitHeader + ParseHeader
    let header_block = conn.read_header().await?;
    let req = match Request::parse(&header_block, config.max_headers) {
        Ok(req) => req,
        Err(parse_err) => {
            let mut resp = Response::new(Version::Http11);
            resp.keep_alive = false;
            let mut out = BytesMut::new();
            dates.with_date(|date| {
                resp.send_message(&mut out, date, parse_err.status(), &format!("Error {}: {}", parse_err.status().as_u16(), parse_err));
            });
            conn.buffer_output(&out);
            conn.flush().await?;
            return Ok(false);
        }
    };

    conn.set_post_content_length(req.content_length);

    if req.expects_continue() {
        let mut out = BytesMut::new();
        out.extend_from_slice(b"HTTP/1.1 100 Continue\r\n\r\n");
        conn.buffer_output(&out);
        conn.flush().await?;
    }

    // Drain the declared body eagerly, ahead of app dispatch (see app::mod's module doc
    // for why wsgi.input is a synchronous in-memory cursor rather than a lazy socket read).
    let body_len = req.content_length.max(0) as u64;
    if body_len > config.max_body_bytes {
        let mut resp = Response::new(req.version);
        resp.keep_alive = false;
        let mut out = BytesMut::new();
        dates.with_date(|date| {
            resp.send_message(&mut out, date, StatusCode::PAYLOAD_TOO_LARGE, "Error 413: request body too large");
        });
        conn.buffer_output(&out);
        conn.flush().await?;
        return Ok(false);
    }
    let body = if req.content_length > 0 {
        conn.read_bytes(req.content_length).await?
    } else {
        bytes::Bytes::new()
    };

    let mut resp = Response::new(req.version);
    resp.keep_alive = req.keep_alive;
    let mut out = BytesMut::new();
    let head_request = req.method == http::Method::HEAD;

    let outcome = match routes.dispatch(&req.path) {
        Dispatch::Static(route) => {
    let rel_path = RouteTable::strip_prefix(route, &req.path);
            let responder = StaticResponder::new(&route.content_root, config.use_gzip, &config.static_cache_control);
            let body_plan = responder.prepare(&req, &rel_path, &mut resp);
            let mut encoding = dates.with_date(|date| resp.write_head(&mut out, date));
            static_file::stream_body(body_plan, head_request, &mut encoding, &mut out)
                .await
                .map_err(Error::from)
        }
        Dispatch::App => {
            if let Some(app) = app {
                let environ = Environ::build(&req, conn.peer_addr(), conn.local_addr(), &config.host_name, config.url_scheme, config.multithread, body);
                // `run_app` re-acquires the interpreter lock itself, once per chunk, so the
                // date bytes are copied out here rather than held across the whole `.await`.
                let date = dates.with_date(|d| {
                    let mut copy = [0u8; DATE_VALUE_LENGTH];
                    copy.copy_from_slice(d);
                    copy
                });
                app::run_app(app, environ, head_request, &mut resp, &mut out, &date, lock).await
            } else {
                dates.with_date(|date| {
                    resp.send_message(&mut out, date, StatusCode::INTERNAL_SERVER_ERROR, "Error 500: no application registered");
                });
                Ok(())
            }
        }
    };

    if let Err(e) = outcome {
        warn!(error = %e, "request failed");
        if !resp.header_sent() {
            out.clear();
            resp.keep_alive = false;
            dates.with_date(|date| {
                resp.send_html(&mut out, date, e.status(), "Internal Server Error", "500 Internal Server Error", "The application raised an error before sending a response.");
            });
        } else {
            // App-post-header (§7): cannot rewrite status; terminate the connection.
            conn.buffer_output(&out);
            conn.flush().await?;
            return Ok(false);
        }
    }

    conn.buffer_output(&out);
    conn.flush().await?;

    Ok(resp.keep_alive)
}
