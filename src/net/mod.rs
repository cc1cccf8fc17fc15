//! Listener construction (§4.G step 2): resolve and bind the endpoint with
//! `SO_REUSEADDR` configurable, matching the teacher's `IntoListener` seam but narrowed
//! to the one socket family this host actually serves — TCP — since xitca's
//! Tcp/Udp/Unix generality has no counterpart in a single-protocol HTTP host.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Socket, Type};
use tracing::info;

/// Bind a non-blocking TCP listener at `addr`, honouring `reuse_address` and `backlog`.
pub fn bind(addr: SocketAddr, reuse_address: bool, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(reuse_address)?;
    #[cfg(unix)]
    socket.set_reuse_port(reuse_address)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    let listener: std::net::TcpListener = socket.into();
    info!("listening on {:?}", listener.local_addr().ok());
    Ok(listener)
}
