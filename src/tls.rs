//! TLS accept stub (§4.H), behind the `tls` feature.
//!
//! Identical to the plain accept path except the accepted stream goes through a
//! `rustls` handshake behind its own header-phase timer before the connection is
//! allowed to enter request parsing (§4.C). Socket options (`TCP_NODELAY`, linger,
//! shutdown) are applied to the underlying `TcpStream` before the handshake starts,
//! since `tokio_rustls::server::TlsStream` only exposes the plain I/O surface
//! afterwards.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

/// Cert/key paths plus the §6 "configurable password source for the TLS private key".
/// Stored on [`crate::Builder`] and resolved into a [`ServerConfig`] at bind time.
pub(crate) struct TlsPaths {
    pub(crate) cert_path: PathBuf,
    pub(crate) key_path: PathBuf,
    pub(crate) key_password: Option<String>,
}

/// Load a certificate chain + private key from PEM files and build a rustls server
/// config for one `ALPN`-less HTTP/1.1 listener.
///
/// `key_password` is consumed here, at bind time, matching §6's environment note — but
/// only to produce a clear error when it's needed and can't be honored. Decrypting a
/// password-protected private key is certificate-loading glue, which §3's Non-goals
/// place outside this crate's scope; `rustls_pemfile::private_key` only recognizes
/// unencrypted PKCS#1/PKCS#8/SEC1 PEM sections, so an `ENCRYPTED PRIVATE KEY` block
/// is reported as "no private key found" regardless of password, and we turn that into
/// a more specific error when a password was actually supplied.
pub fn load_server_config(cert_path: &Path, key_path: &Path, key_password: Option<&str>) -> io::Result<Arc<ServerConfig>> {
    let cert_file = std::fs::File::open(cert_path)?;
    let key_file = std::fs::File::open(key_path)?;
    let mut cert_reader = io::BufReader::new(cert_file);
    let mut key_reader = io::BufReader::new(key_file);

    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    let key = match rustls_pemfile::private_key(&mut key_reader)? {
        Some(key) => key,
        None if key_password.is_some() => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "key file has no unencrypted private key section; decrypting a password-protected \
                 key is outside this crate's scope (see Non-goals) — provide an unencrypted key",
            ));
        }
        None => return Err(io::Error::new(io::ErrorKind::InvalidData, "no private key found in key file")),
    };

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok(Arc::new(config))
}

/// Perform the TLS handshake on an already-accepted `TcpStream`, bounded by
/// `handshake_timeout` (reuses the header-phase timeout by convention: a stalled
/// handshake is indistinguishable from a stalled request header from the operator's
/// point of view).
pub async fn accept(acceptor: &TlsAcceptor, stream: TcpStream, handshake_timeout: Duration) -> io::Result<TlsStream<TcpStream>> {
    match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out")),
    }
}
